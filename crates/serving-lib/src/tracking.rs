//! Model tracking service client
//!
//! Resolves `models:/` and `runs:/` references to artifact locations
//! through an MLflow-compatible REST API.

use crate::error::ModelLoadError;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Request timeout for tracking service calls
const TRACKING_TIMEOUT: Duration = Duration::from_secs(10);

/// A reference to a model held by the tracking service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingRef {
    /// `models:/<name>/<version-or-stage>`
    RegisteredModel { name: String, selector: String },
    /// `runs:/<run_id>/<artifact path>`
    Run { run_id: String, path: String },
}

impl TrackingRef {
    /// Parse a tracking URI; `None` if the identifier is not one
    pub fn parse(identifier: &str) -> Option<Self> {
        if let Some(rest) = identifier.strip_prefix("models:/") {
            let mut parts = rest.trim_matches('/').splitn(2, '/');
            let name = parts.next().filter(|s| !s.is_empty())?;
            let selector = parts.next().filter(|s| !s.is_empty()).unwrap_or("latest");
            return Some(TrackingRef::RegisteredModel {
                name: name.to_string(),
                selector: selector.to_string(),
            });
        }
        if let Some(rest) = identifier.strip_prefix("runs:/") {
            let mut parts = rest.trim_matches('/').splitn(2, '/');
            let run_id = parts.next().filter(|s| !s.is_empty())?;
            let path = parts.next().unwrap_or("");
            return Some(TrackingRef::Run {
                run_id: run_id.to_string(),
                path: path.to_string(),
            });
        }
        None
    }

    /// Name used for metric labels
    pub fn base_name(&self) -> &str {
        match self {
            TrackingRef::RegisteredModel { name, .. } => name,
            TrackingRef::Run { run_id, .. } => run_id,
        }
    }
}

/// A tracking reference resolved to a local artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub path: PathBuf,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadUriResponse {
    artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersionEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionEntry {
    version: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunEntry,
}

#[derive(Debug, Deserialize)]
struct RunEntry {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    artifact_uri: String,
}

/// Client for the tracking service REST API
#[derive(Debug, Clone)]
pub struct TrackingClient {
    client: Client,
    base_url: Url,
}

impl TrackingClient {
    pub fn new(tracking_uri: &str) -> Result<Self, ModelLoadError> {
        let client = Client::builder()
            .timeout(TRACKING_TIMEOUT)
            .build()
            .map_err(|e| ModelLoadError::Tracking(format!("failed to create HTTP client: {}", e)))?;
        let mut base_url = Url::parse(tracking_uri).map_err(|e| {
            ModelLoadError::Tracking(format!("invalid tracking URI {}: {}", tracking_uri, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    /// Resolve a reference to a local artifact path and, for registered
    /// models, the concrete version
    pub async fn resolve(&self, reference: &TrackingRef) -> Result<ResolvedArtifact, ModelLoadError> {
        match reference {
            TrackingRef::RegisteredModel { name, selector } => {
                let version = if selector.chars().all(|c| c.is_ascii_digit()) {
                    selector.clone()
                } else {
                    self.latest_version(name, selector).await?
                };
                let uri = self.download_uri(name, &version).await?;
                debug!(model = %name, version = %version, artifact_uri = %uri, "Resolved registered model");
                Ok(ResolvedArtifact {
                    path: artifact_uri_to_path(&uri)?,
                    version: Some(version),
                })
            }
            TrackingRef::Run { run_id, path } => {
                let url = self.endpoint("api/2.0/mlflow/runs/get")?;
                let response: RunResponse = self
                    .send(self.client.get(url).query(&[("run_id", run_id.as_str())]))
                    .await?;
                let root = artifact_uri_to_path(&response.run.info.artifact_uri)?;
                let path = if path.is_empty() { root } else { root.join(path) };
                debug!(run_id = %run_id, path = %path.display(), "Resolved run artifact");
                Ok(ResolvedArtifact { path, version: None })
            }
        }
    }

    async fn latest_version(&self, name: &str, selector: &str) -> Result<String, ModelLoadError> {
        let url = self.endpoint("api/2.0/mlflow/registered-models/get-latest-versions")?;
        let mut body = serde_json::json!({ "name": name });
        if !selector.eq_ignore_ascii_case("latest") {
            body["stages"] = serde_json::json!([selector]);
        }
        let response: LatestVersionsResponse =
            self.send(self.client.post(url).json(&body)).await?;
        response
            .model_versions
            .iter()
            .filter_map(|v| v.version.parse::<u64>().ok().map(|n| (n, &v.version)))
            .max_by_key(|(n, _)| *n)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| {
                ModelLoadError::Tracking(format!("no versions of model {} match {}", name, selector))
            })
    }

    async fn download_uri(&self, name: &str, version: &str) -> Result<String, ModelLoadError> {
        let url = self.endpoint("api/2.0/mlflow/model-versions/get-download-uri")?;
        let response: DownloadUriResponse = self
            .send(self.client.get(url).query(&[("name", name), ("version", version)]))
            .await?;
        Ok(response.artifact_uri)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ModelLoadError> {
        self.base_url
            .join(path)
            .map_err(|e| ModelLoadError::Tracking(format!("invalid endpoint {}: {}", path, e)))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ModelLoadError> {
        let response = request
            .send()
            .await
            .map_err(|e| ModelLoadError::Tracking(format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelLoadError::Tracking(format!("API error ({}): {}", status, body)));
        }
        response
            .json()
            .await
            .map_err(|e| ModelLoadError::Tracking(format!("failed to parse response: {}", e)))
    }
}

/// Map an artifact URI to a local path; only filesystem locations load
pub fn artifact_uri_to_path(uri: &str) -> Result<PathBuf, ModelLoadError> {
    if uri.starts_with("file:") {
        let url = Url::parse(uri)
            .map_err(|e| ModelLoadError::Tracking(format!("invalid artifact URI {}: {}", uri, e)))?;
        return url
            .to_file_path()
            .map_err(|_| ModelLoadError::Tracking(format!("invalid file URI {}", uri)));
    }
    match uri.split_once("://") {
        Some((scheme, _)) => Err(ModelLoadError::UnsupportedFormat(format!(
            "artifact scheme '{}' is not loadable: {}",
            scheme, uri
        ))),
        None if uri.contains(":/") => Err(ModelLoadError::UnsupportedFormat(format!(
            "artifact location is not loadable: {}",
            uri
        ))),
        None => Ok(PathBuf::from(uri)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registered_model() {
        assert_eq!(
            TrackingRef::parse("models:/iris/3"),
            Some(TrackingRef::RegisteredModel {
                name: "iris".into(),
                selector: "3".into()
            })
        );
        assert_eq!(
            TrackingRef::parse("models:/iris"),
            Some(TrackingRef::RegisteredModel {
                name: "iris".into(),
                selector: "latest".into()
            })
        );
        assert_eq!(TrackingRef::parse("models:/"), None);
        assert_eq!(TrackingRef::parse("iris.json"), None);
    }

    #[test]
    fn test_parse_run_reference() {
        let reference = TrackingRef::parse("runs:/abc123/model").unwrap();
        assert_eq!(
            reference,
            TrackingRef::Run {
                run_id: "abc123".into(),
                path: "model".into()
            }
        );
        assert_eq!(reference.base_name(), "abc123");
    }

    #[test]
    fn test_artifact_uri_to_path() {
        assert_eq!(
            artifact_uri_to_path("file:///mlruns/1/abc/artifacts/model").unwrap(),
            PathBuf::from("/mlruns/1/abc/artifacts/model")
        );
        assert_eq!(
            artifact_uri_to_path("/mlruns/1/abc").unwrap(),
            PathBuf::from("/mlruns/1/abc")
        );
        assert!(matches!(
            artifact_uri_to_path("s3://bucket/model"),
            Err(ModelLoadError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            artifact_uri_to_path("mlflow-artifacts:/1/abc"),
            Err(ModelLoadError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_registered_model_version() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/2.0/mlflow/model-versions/get-download-uri")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("name".into(), "iris".into()),
                mockito::Matcher::UrlEncoded("version".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"artifact_uri": "/mlruns/7/run/artifacts/model"}"#)
            .create_async()
            .await;

        let client = TrackingClient::new(&server.url()).unwrap();
        let resolved = client
            .resolve(&TrackingRef::parse("models:/iris/2").unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(resolved.path, PathBuf::from("/mlruns/7/run/artifacts/model"));
        assert_eq!(resolved.version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_resolve_latest_picks_highest_version() {
        let mut server = mockito::Server::new_async().await;
        let latest = server
            .mock("POST", "/api/2.0/mlflow/registered-models/get-latest-versions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"model_versions": [{"version": "3"}, {"version": "11"}]}"#)
            .create_async()
            .await;
        let download = server
            .mock("GET", "/api/2.0/mlflow/model-versions/get-download-uri")
            .match_query(mockito::Matcher::UrlEncoded("version".into(), "11".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"artifact_uri": "file:///models/iris/11"}"#)
            .create_async()
            .await;

        let client = TrackingClient::new(&server.url()).unwrap();
        let resolved = client
            .resolve(&TrackingRef::parse("models:/iris/latest").unwrap())
            .await
            .unwrap();

        latest.assert_async().await;
        download.assert_async().await;
        assert_eq!(resolved.version.as_deref(), Some("11"));
        assert_eq!(resolved.path, PathBuf::from("/models/iris/11"));
    }

    #[tokio::test]
    async fn test_resolve_run_joins_artifact_path() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/2.0/mlflow/runs/get")
            .match_query(mockito::Matcher::UrlEncoded("run_id".into(), "abc".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"run": {"info": {"artifact_uri": "/mlruns/0/abc/artifacts"}}}"#)
            .create_async()
            .await;

        let client = TrackingClient::new(&server.url()).unwrap();
        let resolved = client
            .resolve(&TrackingRef::parse("runs:/abc/model").unwrap())
            .await
            .unwrap();

        assert_eq!(resolved.path, PathBuf::from("/mlruns/0/abc/artifacts/model"));
        assert!(resolved.version.is_none());
    }

    #[tokio::test]
    async fn test_tracking_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/2.0/mlflow/model-versions/get-download-uri")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .with_body("RESOURCE_DOES_NOT_EXIST")
            .create_async()
            .await;

        let client = TrackingClient::new(&server.url()).unwrap();
        let err = client
            .resolve(&TrackingRef::parse("models:/missing/1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelLoadError::Tracking(ref msg) if msg.contains("404")));
    }
}
