//! Model serving library
//!
//! This crate provides the core functionality for:
//! - Loading models from local artifacts or a tracking service
//! - Validating requests and running predictions
//! - Rolling feature statistics for drift monitoring
//! - Prometheus metrics, health checks and structured logging

pub mod error;
pub mod handler;
pub mod health;
pub mod loader;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod stats;
pub mod tracking;

pub use error::{ModelLoadError, ServingError, ServingResult, ValidationError};
pub use handler::PredictionService;
pub use health::{HealthResponse, HealthStatus, ReadinessResponse};
pub use loader::{LoadedModel, LoaderConfig, ModelLoader, DEFAULT_MODEL_VERSION};
pub use models::*;
pub use observability::{ServingMetrics, StructuredLogger};
pub use predictor::{Model, Predictor, ProbabilisticModel, ProbabilityOutput};
pub use stats::{FeatureStatistics, FeatureStatisticsBuffer};
