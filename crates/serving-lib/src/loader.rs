//! Model artifact loading
//!
//! Resolves a model identifier to a [`Predictor`]. Identifiers are either
//! local artifact paths (relative to the model directory, or absolute) or
//! tracking-service references (`models:/...`, `runs:/...`).

use crate::error::ModelLoadError;
use crate::predictor::{NativeModelSpec, OnnxMetadata, OnnxModel, Predictor};
use crate::tracking::{TrackingClient, TrackingRef};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Version reported for artifacts without tracking metadata
pub const DEFAULT_MODEL_VERSION: &str = "1.0.0";

/// File names looked up inside a directory artifact, in order
const DIRECTORY_ARTIFACTS: &[&str] = &["model.json", "model.onnx"];

/// Configuration for the model loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory relative identifiers are resolved against
    pub model_dir: PathBuf,
    /// Tracking service base URI
    pub tracking_uri: String,
    /// Reuse loaded models while the artifact is unchanged
    pub cache_enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            tracking_uri: "http://localhost:5000".to_string(),
            cache_enabled: true,
        }
    }
}

/// A predictor together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedModel {
    /// Identifier the model was requested by
    pub identifier: String,
    /// Name used for metric labels
    pub base_name: String,
    pub version: String,
    /// Artifact file the predictor was read from
    pub artifact_path: PathBuf,
    pub predictor: Predictor,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    modified: Option<SystemTime>,
    model: LoadedModel,
}

/// Loads model artifacts from disk or through the tracking service
pub struct ModelLoader {
    config: LoaderConfig,
    tracking: TrackingClient,
    cache: DashMap<PathBuf, CacheEntry>,
}

impl ModelLoader {
    pub fn new(config: LoaderConfig) -> Result<Self, ModelLoadError> {
        let tracking = TrackingClient::new(&config.tracking_uri)?;
        Ok(Self {
            config,
            tracking,
            cache: DashMap::new(),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load the model named by `identifier`
    pub async fn load(&self, identifier: &str) -> Result<LoadedModel, ModelLoadError> {
        let (artifact_path, version, base_name) = match TrackingRef::parse(identifier) {
            Some(reference) => {
                let resolved = self.tracking.resolve(&reference).await?;
                (
                    resolve_artifact_file(&resolved.path)?,
                    resolved
                        .version
                        .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
                    reference.base_name().to_string(),
                )
            }
            None => {
                let path = self.local_path(identifier);
                (
                    resolve_artifact_file(&path)?,
                    DEFAULT_MODEL_VERSION.to_string(),
                    model_base_name(identifier),
                )
            }
        };

        let modified = std::fs::metadata(&artifact_path)
            .and_then(|m| m.modified())
            .ok();

        // Aliases of one artifact share a cache entry
        let cache_key = std::fs::canonicalize(&artifact_path).map_err(|source| ModelLoadError::Io {
            path: artifact_path.clone(),
            source,
        })?;

        if self.config.cache_enabled {
            if let Some(entry) = self.cache.get(&cache_key) {
                if entry.modified == modified {
                    debug!(model = %identifier, path = %cache_key.display(), "Using cached model");
                    return Ok(LoadedModel {
                        identifier: identifier.to_string(),
                        base_name,
                        version,
                        artifact_path,
                        ..entry.model.clone()
                    });
                }
            }
        }

        // ONNX optimization is CPU bound
        let path = artifact_path.clone();
        let predictor = tokio::task::spawn_blocking(move || load_artifact(&path))
            .await
            .map_err(|e| ModelLoadError::corrupt(&artifact_path, format!("load task failed: {}", e)))??;
        let model = LoadedModel {
            identifier: identifier.to_string(),
            base_name,
            version,
            artifact_path,
            predictor,
            loaded_at: Utc::now(),
        };

        info!(
            model = %model.identifier,
            version = %model.version,
            kind = %model.predictor.kind(),
            path = %model.artifact_path.display(),
            "Model loaded"
        );

        if self.config.cache_enabled {
            self.cache.insert(
                cache_key,
                CacheEntry {
                    modified,
                    model: model.clone(),
                },
            );
        }
        Ok(model)
    }

    /// Drop every cached model
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_models(&self) -> usize {
        self.cache.len()
    }

    fn local_path(&self, identifier: &str) -> PathBuf {
        let path = Path::new(identifier);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.model_dir.join(path)
        }
    }
}

/// Name used for metric labels: file stem of the last path segment
pub fn model_base_name(identifier: &str) -> String {
    if let Some(reference) = TrackingRef::parse(identifier) {
        return reference.base_name().to_string();
    }
    Path::new(identifier)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.split('.').next().unwrap_or(n))
        .filter(|n| !n.is_empty())
        .unwrap_or(identifier)
        .to_string()
}

/// Map an artifact location to the file holding the model
fn resolve_artifact_file(path: &Path) -> Result<PathBuf, ModelLoadError> {
    if path.is_dir() {
        return DIRECTORY_ARTIFACTS
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ModelLoadError::NotFound(path.join(DIRECTORY_ARTIFACTS[0])));
    }
    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

/// Read and deserialize an artifact file according to its extension
pub fn load_artifact(path: &Path) -> Result<Predictor, ModelLoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => {
            let bytes = read_artifact(path)?;
            let spec =
                NativeModelSpec::from_slice(&bytes).map_err(|e| ModelLoadError::corrupt(path, e))?;
            Ok(spec.into_predictor())
        }
        Some("onnx") => {
            let bytes = read_artifact(path)?;
            let metadata = read_onnx_metadata(path)?;
            let model =
                OnnxModel::from_bytes(&bytes, metadata).map_err(|e| ModelLoadError::corrupt(path, e))?;
            Ok(model.into_predictor())
        }
        _ => Err(ModelLoadError::UnsupportedFormat(path.display().to_string())),
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ModelLoadError> {
    std::fs::read(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => ModelLoadError::NotFound(path.to_path_buf()),
        _ => ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Sidecar metadata path for an ONNX artifact: `<artifact>.meta.json`
pub fn onnx_metadata_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn read_onnx_metadata(path: &Path) -> Result<OnnxMetadata, ModelLoadError> {
    let meta_path = onnx_metadata_path(path);
    if !meta_path.exists() {
        return Ok(OnnxMetadata::default());
    }
    let bytes = read_artifact(&meta_path)?;
    serde_json::from_slice(&bytes).map_err(|e| ModelLoadError::corrupt(&meta_path, e))
}
