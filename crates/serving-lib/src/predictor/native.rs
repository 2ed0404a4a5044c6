//! Native JSON model artifacts
//!
//! Small linear model families exported as JSON, tagged by `kind`. They
//! cover the toy classification/regression models the training pipeline
//! produces without pulling a full ML runtime into the serving path.

use super::{argmax, numeric_row, Model, Predictor, ProbabilisticModel};
use crate::models::{FeatureValue, Label};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A native model artifact as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeModelSpec {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    NearestCentroid(NearestCentroid),
}

impl NativeModelSpec {
    /// Parse and validate an artifact
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let spec: NativeModelSpec = serde_json::from_slice(bytes)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check that dimensions are consistent
    pub fn validate(&self) -> Result<()> {
        match self {
            NativeModelSpec::LinearRegression(m) => {
                check_schema_width(m.feature_names.as_deref(), m.coefficients.len())
            }
            NativeModelSpec::LogisticRegression(m) => {
                if m.classes.len() < 2 {
                    anyhow::bail!("logistic regression needs at least 2 classes");
                }
                let expected_rows = if m.classes.len() == 2 { 1 } else { m.classes.len() };
                if m.coefficients.len() != expected_rows {
                    anyhow::bail!(
                        "expected {} coefficient rows for {} classes, got {}",
                        expected_rows,
                        m.classes.len(),
                        m.coefficients.len()
                    );
                }
                if m.intercepts.len() != expected_rows {
                    anyhow::bail!(
                        "expected {} intercepts, got {}",
                        expected_rows,
                        m.intercepts.len()
                    );
                }
                let width = m.coefficients[0].len();
                if m.coefficients.iter().any(|row| row.len() != width) {
                    anyhow::bail!("coefficient rows have different widths");
                }
                check_schema_width(m.feature_names.as_deref(), width)
            }
            NativeModelSpec::NearestCentroid(m) => {
                if m.classes.is_empty() || m.classes.len() != m.centroids.len() {
                    anyhow::bail!(
                        "expected one centroid per class, got {} classes and {} centroids",
                        m.classes.len(),
                        m.centroids.len()
                    );
                }
                let width = m.centroids[0].len();
                if m.centroids.iter().any(|c| c.len() != width) {
                    anyhow::bail!("centroids have different widths");
                }
                check_schema_width(m.feature_names.as_deref(), width)
            }
        }
    }

    /// Wrap the model in its capability variant
    pub fn into_predictor(self) -> Predictor {
        match self {
            NativeModelSpec::LinearRegression(m) => Predictor::regressor(m),
            NativeModelSpec::LogisticRegression(m) => Predictor::classifier_with_proba(m),
            NativeModelSpec::NearestCentroid(m) => Predictor::classifier_only(m),
        }
    }
}

fn check_schema_width(feature_names: Option<&[String]>, width: usize) -> Result<()> {
    match feature_names {
        Some(names) if names.len() != width => anyhow::bail!(
            "{} feature names declared for {} coefficients",
            names.len(),
            width
        ),
        _ => Ok(()),
    }
}

fn check_row_width(row: &[f64], width: usize) -> Result<()> {
    if row.len() != width {
        anyhow::bail!("expected {} features, got {}", width, row.len());
    }
    Ok(())
}

fn dot(weights: &[f64], row: &[f64]) -> f64 {
    weights.iter().zip(row).map(|(w, x)| w * x).sum()
}

/// Ordinary least squares model: `y = w·x + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl Model for LinearRegression {
    fn kind(&self) -> &str {
        "linear_regression"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[FeatureValue]) -> Result<Label> {
        let x = numeric_row(row)?;
        check_row_width(&x, self.coefficients.len())?;
        Ok(Label::Float(dot(&self.coefficients, &x) + self.intercept))
    }
}

/// Logistic regression: sigmoid for two classes, softmax otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub classes: Vec<Label>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LogisticRegression {
    fn scores(&self, x: &[f64]) -> Result<Vec<f64>> {
        let width = self.coefficients.first().map(Vec::len).unwrap_or(0);
        check_row_width(x, width)?;
        Ok(self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| dot(w, x) + b)
            .collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Numerically stable softmax
pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

impl Model for LogisticRegression {
    fn kind(&self) -> &str {
        "logistic_regression"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[FeatureValue]) -> Result<Label> {
        let proba = self.predict_proba(row)?;
        let idx = argmax(&proba).ok_or_else(|| anyhow::anyhow!("empty probability row"))?;
        self.classes
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("class index {} out of range", idx))
    }
}

impl ProbabilisticModel for LogisticRegression {
    fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn predict_proba(&self, row: &[FeatureValue]) -> Result<Vec<f64>> {
        let x = numeric_row(row)?;
        let scores = self.scores(&x)?;
        if self.classes.len() == 2 {
            let positive = sigmoid(scores[0]);
            Ok(vec![1.0 - positive, positive])
        } else {
            Ok(softmax(&scores))
        }
    }
}

/// Assigns the class of the closest centroid; no probability output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestCentroid {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub classes: Vec<Label>,
    pub centroids: Vec<Vec<f64>>,
}

impl Model for NearestCentroid {
    fn kind(&self) -> &str {
        "nearest_centroid"
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, row: &[FeatureValue]) -> Result<Label> {
        let x = numeric_row(row)?;
        let width = self.centroids.first().map(Vec::len).unwrap_or(0);
        check_row_width(&x, width)?;
        let negated: Vec<f64> = self
            .centroids
            .iter()
            .map(|c| -c.iter().zip(&x).map(|(a, b)| (a - b).powi(2)).sum::<f64>())
            .collect();
        let idx = argmax(&negated).ok_or_else(|| anyhow::anyhow!("model has no centroids"))?;
        Ok(self.classes[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(values: &[f64]) -> Vec<FeatureValue> {
        values.iter().copied().map(FeatureValue::Number).collect()
    }

    #[test]
    fn test_linear_regression_predicts() {
        let spec = NativeModelSpec::from_slice(
            json!({
                "kind": "linear_regression",
                "feature_names": ["x1", "x2"],
                "coefficients": [2.0, 1.0],
                "intercept": 0.5
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        let predictor = spec.into_predictor();
        assert_eq!(predictor.capability(), "regressor");
        assert_eq!(predictor.predict(&row(&[1.0, 2.0])).unwrap(), Label::Float(4.5));
        assert_eq!(
            predictor.feature_names().unwrap(),
            &["x1".to_string(), "x2".to_string()]
        );
    }

    #[test]
    fn test_binary_logistic_regression() {
        let model = LogisticRegression {
            feature_names: None,
            classes: vec![Label::Integer(0), Label::Integer(1)],
            coefficients: vec![vec![1.0]],
            intercepts: vec![0.0],
        };
        let proba = model.predict_proba(&row(&[0.0])).unwrap();
        assert!((proba[0] - 0.5).abs() < 1e-12);
        assert!((proba[1] - 0.5).abs() < 1e-12);

        let proba = model.predict_proba(&row(&[3.0])).unwrap();
        assert!(proba[1] > 0.9);
        assert_eq!(model.predict(&row(&[3.0])).unwrap(), Label::Integer(1));
        assert_eq!(model.predict(&row(&[-3.0])).unwrap(), Label::Integer(0));
    }

    #[test]
    fn test_multiclass_logistic_regression_sums_to_one() {
        let model = LogisticRegression {
            feature_names: None,
            classes: vec!["setosa".into(), "versicolor".into(), "virginica".into()],
            coefficients: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, -1.0]],
            intercepts: vec![0.0, 0.0, 0.0],
        };
        let proba = model.predict_proba(&row(&[2.0, 0.0])).unwrap();
        assert_eq!(proba.len(), 3);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(model.predict(&row(&[2.0, 0.0])).unwrap(), Label::from("setosa"));
    }

    #[test]
    fn test_nearest_centroid_has_no_proba() {
        let spec = NativeModelSpec::NearestCentroid(NearestCentroid {
            feature_names: None,
            classes: vec![Label::Integer(0), Label::Integer(1)],
            centroids: vec![vec![0.0, 0.0], vec![10.0, 10.0]],
        });
        let predictor = spec.into_predictor();
        assert_eq!(predictor.capability(), "classifier_only");
        assert_eq!(predictor.predict(&row(&[9.0, 8.0])).unwrap(), Label::Integer(1));
        assert!(predictor.probabilities(&row(&[9.0, 8.0])).is_none());
    }

    #[test]
    fn test_validation_rejects_inconsistent_dimensions() {
        let bad = json!({
            "kind": "logistic_regression",
            "classes": [0, 1, 2],
            "coefficients": [[1.0, 2.0]],
            "intercepts": [0.0]
        });
        assert!(NativeModelSpec::from_slice(bad.to_string().as_bytes()).is_err());

        let bad_schema = json!({
            "kind": "linear_regression",
            "feature_names": ["a"],
            "coefficients": [1.0, 2.0]
        });
        assert!(NativeModelSpec::from_slice(bad_schema.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_row_width_mismatch_is_an_error() {
        let model = LinearRegression {
            feature_names: None,
            coefficients: vec![1.0, 1.0],
            intercept: 0.0,
        };
        assert!(model.predict(&row(&[1.0])).is_err());
        assert!(model.predict(&[FeatureValue::Text("a".into()), 1.0.into()]).is_err());
    }

    #[test]
    fn test_softmax_is_stable() {
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
    }
}
