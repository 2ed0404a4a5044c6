//! Server configuration

use anyhow::Result;
use serde::Deserialize;
use serving_lib::LoaderConfig;
use std::path::{Path, PathBuf};

/// Optional config file read from the working directory (`model-server.toml`)
const CONFIG_FILE: &str = "model-server";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory relative model identifiers are resolved against
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Identifier of the model served when a request names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Explicit startup model (path or tracking URI), overrides `default_model`
    #[serde(default = "default_model_path")]
    pub model_path: Option<String>,

    #[serde(default = "default_tracking_uri")]
    pub mlflow_tracking_uri: String,

    /// Feature mappings kept per model for statistics
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model_dir() -> PathBuf {
    std::env::var("MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"))
}

fn default_model() -> String {
    std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "iris_classification_model.json".to_string())
}

fn default_model_path() -> Option<String> {
    std::env::var("MODEL_PATH").ok().filter(|p| !p.is_empty())
}

fn default_tracking_uri() -> String {
    std::env::var("MLFLOW_TRACKING_URI").unwrap_or_else(|_| "http://localhost:5000".to_string())
}

fn default_buffer_capacity() -> usize {
    serving_lib::stats::DEFAULT_BUFFER_CAPACITY
}

fn default_cache_enabled() -> bool {
    true
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "model-server".to_string())
}

impl ServerConfig {
    /// Load configuration from `model-server.toml` (if present) and
    /// `SERVING_*` environment variables
    pub fn load() -> Result<Self> {
        Self::build(config::File::with_name(CONFIG_FILE).required(false))
    }

    /// Load configuration from a specific file plus the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(config::File::from(path).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("SERVING").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Model loaded at startup
    pub fn startup_model(&self) -> &str {
        self.model_path.as_deref().unwrap_or(&self.default_model)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            model_dir: self.model_dir.clone(),
            tracking_uri: self.mlflow_tracking_uri.clone(),
            cache_enabled: self.cache_enabled,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
