//! Health, model info, prediction and metrics commands

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, PredictRequest, PredictResponse};
use crate::output::{
    color_probability, color_status, print_info, print_json, print_table, print_warning,
    FieldRow, OutputFormat,
};

/// Row for the class confidence table
#[derive(Tabled)]
struct ConfidenceRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// Show server health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await.context("Failed to reach the model server")?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Status:  {}", color_status(&health.status));
            println!("Message: {}", health.message);
        }
    }

    if !health.is_healthy() {
        print_warning("The server is running without a model");
    }
    Ok(())
}

/// Show the model currently served
pub async fn show_model_info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.model_info().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("{}", "Model Info".bold());
            let mut rows = vec![
                FieldRow::new("Path", &info.model_path),
                FieldRow::new("Tracking URI", &info.mlflow_tracking_uri),
            ];
            if let Some(version) = &info.model_version {
                rows.push(FieldRow::new("Version", version));
            }
            if let Some(kind) = &info.model_kind {
                rows.push(FieldRow::new("Kind", kind));
            }
            if let Some(names) = &info.feature_names {
                rows.push(FieldRow::new("Features", names.join(", ")));
            }
            print_table(&rows);
        }
    }
    Ok(())
}

/// Request a prediction
pub async fn predict(
    client: &ApiClient,
    features: &[String],
    input: Option<&Path>,
    model: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = build_request(features, input, model)?;
    if request.features.is_empty() {
        anyhow::bail!("No features given; use --feature name=value or --input <file>");
    }

    let response = match client.predict(&request).await {
        Ok(response) => response,
        Err(e) if e.status() == Some(400) => {
            print_info("Run `mlserve info` to list the features the model expects");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_prediction(&response),
    }
    Ok(())
}

fn print_prediction(response: &PredictResponse) {
    println!("{}", "Prediction".bold());
    println!("{}", "=".repeat(40));
    println!("Model:      {} ({})", response.model_name.cyan(), response.model_version);
    println!("Prediction: {}", response.prediction.to_string().bold());
    if let Some(probability) = response.probability {
        println!("Probability: {}", color_probability(probability));
    }
    if let Some(confidence) = &response.confidence {
        println!();
        let rows: Vec<ConfidenceRow> = confidence
            .iter()
            .map(|(class, p)| ConfidenceRow {
                class: class.clone(),
                probability: color_probability(*p),
            })
            .collect();
        print_table(&rows);
    }
}

/// Print the metrics exposition, optionally keeping only one metric family
pub async fn show_metrics(client: &ApiClient, filter: Option<&str>) -> Result<()> {
    let text = client.metrics().await?;
    let lines = filter_metrics(&text, filter);
    if lines.is_empty() {
        print_info("No matching metrics");
        return Ok(());
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Lines of the exposition whose metric name starts with `prefix`
///
/// `# HELP`/`# TYPE` comments are kept for matching families.
pub fn filter_metrics<'a>(text: &'a str, prefix: Option<&str>) -> Vec<&'a str> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| match prefix {
            None => true,
            Some(prefix) => {
                let name = line
                    .strip_prefix("# HELP ")
                    .or_else(|| line.strip_prefix("# TYPE "))
                    .unwrap_or(line);
                name.starts_with(prefix)
            }
        })
        .collect()
}

/// Build a request from an optional JSON file and `name=value` flags
///
/// The file holds either a full request body or a bare feature object.
/// Flags override values read from the file.
pub fn build_request(
    features: &[String],
    input: Option<&Path>,
    model: Option<String>,
) -> Result<PredictRequest> {
    let mut request = match input {
        Some(path) => read_request_file(path)?,
        None => PredictRequest {
            features: Map::new(),
            model_name: None,
        },
    };

    for raw in features {
        let (name, value) = parse_feature(raw)?;
        request.features.insert(name, value);
    }
    if model.is_some() {
        request.model_name = model;
    }
    Ok(request)
}

fn read_request_file(path: &Path) -> Result<PredictRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    match value {
        Value::Object(map) if map.get("features").map_or(false, Value::is_object) => {
            serde_json::from_value(Value::Object(map))
                .with_context(|| format!("Invalid request in {}", path.display()))
        }
        Value::Object(features) => Ok(PredictRequest {
            features,
            model_name: None,
        }),
        _ => anyhow::bail!("{} must contain a JSON object", path.display()),
    }
}

/// Parse `name=value`; numeric values are sent as numbers, others as text
pub fn parse_feature(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid feature '{}', expected name=value", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid feature '{}', name is empty", raw);
    }

    let value = value.trim();
    let parsed = value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()));
    Ok((name.to_string(), parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_feature() {
        assert_eq!(
            parse_feature("sepal_length=5.1").unwrap(),
            ("sepal_length".to_string(), json!(5.1))
        );
        assert_eq!(
            parse_feature("color = red").unwrap(),
            ("color".to_string(), json!("red"))
        );
        assert!(parse_feature("no_value").is_err());
        assert!(parse_feature("=1").is_err());
    }

    #[test]
    fn test_build_request_from_flags() {
        let flags = vec!["b=2".to_string(), "a=1".to_string()];
        let request = build_request(&flags, None, Some("iris.json".into())).unwrap();
        let keys: Vec<&String> = request.features.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(request.model_name.as_deref(), Some("iris.json"));
    }

    #[test]
    fn test_build_request_from_file_with_overrides() {
        let mut file = tempfile_json(r#"{"features": {"x": 1.0, "y": 2.0}, "model_name": "m.json"}"#);
        file.flush().unwrap();

        let flags = vec!["y=5".to_string()];
        let request = build_request(&flags, Some(file.path()), None).unwrap();
        assert_eq!(request.features["x"], json!(1.0));
        assert_eq!(request.features["y"], json!(5.0));
        assert_eq!(request.model_name.as_deref(), Some("m.json"));
    }

    #[test]
    fn test_build_request_from_bare_feature_file() {
        let file = tempfile_json(r#"{"x": 1.0}"#);
        let request = build_request(&[], Some(file.path()), None).unwrap();
        assert_eq!(request.features["x"], json!(1.0));
        assert!(request.model_name.is_none());
    }

    #[test]
    fn test_filter_metrics() {
        let text = "# HELP http_requests_total Total\n\
                    # TYPE http_requests_total counter\n\
                    http_requests_total{endpoint=\"/health\"} 2\n\
                    # HELP model_prediction_count Count\n\
                    model_prediction_count{class_name=\"1\"} 4\n";
        let lines = filter_metrics(text, Some("model_prediction"));
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(" 4"));
        assert_eq!(filter_metrics(text, None).len(), 5);
    }

    fn tempfile_json(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
