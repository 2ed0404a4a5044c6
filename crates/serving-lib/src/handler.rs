//! Prediction request handling
//!
//! [`PredictionService`] owns the startup model, resolves per-request model
//! overrides through the [`ModelLoader`], validates and arranges features,
//! runs inference off the async runtime and records the prediction in the
//! metrics registry.

use crate::error::{ModelLoadError, ServingError, ServingResult, ValidationError};
use crate::health::{HealthResponse, ReadinessResponse};
use crate::loader::{LoadedModel, ModelLoader};
use crate::models::{
    FeatureMap, FeatureValue, ModelInfoResponse, PredictionRequest, PredictionResponse,
};
use crate::observability::{ServingMetrics, StructuredLogger};
use crate::predictor::{Predictor, ProbabilityOutput};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Serves predictions for the startup model and for per-request overrides
pub struct PredictionService {
    loader: Arc<ModelLoader>,
    metrics: ServingMetrics,
    logger: StructuredLogger,
    default_model: String,
    current: RwLock<Option<LoadedModel>>,
}

impl PredictionService {
    pub fn new(
        loader: Arc<ModelLoader>,
        metrics: ServingMetrics,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            metrics,
            logger: StructuredLogger::new("model-server"),
            default_model: default_model.into(),
            current: RwLock::new(None),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(&self) -> &ServingMetrics {
        &self.metrics
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    /// Identifier of the model loaded at startup
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Load the startup model and make it current
    pub async fn load_default(&self) -> Result<LoadedModel, ModelLoadError> {
        match self.loader.load(&self.default_model).await {
            Ok(model) => {
                self.set_model(model.clone()).await;
                Ok(model)
            }
            Err(e) => {
                self.logger
                    .log_model_load_failed(&self.default_model, &e.to_string());
                Err(e)
            }
        }
    }

    /// Replace the current model
    pub async fn set_model(&self, model: LoadedModel) {
        self.logger
            .log_model_loaded(&model.identifier, &model.version, model.predictor.kind());
        self.metrics
            .set_model_info(&model.base_name, &model.version, model.predictor.kind());
        *self.current.write().await = Some(model);
    }

    pub async fn current_model(&self) -> Option<LoadedModel> {
        self.current.read().await.clone()
    }

    pub async fn is_model_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse::from_model_loaded(self.is_model_loaded().await)
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if self.is_model_loaded().await {
            ReadinessResponse::ready()
        } else {
            ReadinessResponse::not_ready(ServingError::ModelUnavailable.to_string())
        }
    }

    /// Describe the current model
    pub async fn model_info(&self) -> ServingResult<ModelInfoResponse> {
        let model = self
            .current_model()
            .await
            .ok_or(ServingError::ModelUnavailable)?;
        Ok(ModelInfoResponse {
            model_path: model.artifact_path.display().to_string(),
            mlflow_tracking_uri: self.loader.config().tracking_uri.clone(),
            model_version: model.version.clone(),
            model_kind: model.predictor.kind().to_string(),
            feature_names: model.predictor.feature_names().map(|n| n.to_vec()),
            loaded_at: model.loaded_at.timestamp(),
        })
    }

    /// Serve one prediction request
    pub async fn predict(&self, request: PredictionRequest) -> ServingResult<PredictionResponse> {
        let start = Instant::now();
        let model = self.resolve_model(request.model_name.as_deref()).await?;

        let row = match arrange_features(&model.predictor, &request.features) {
            Ok(row) => row,
            Err(e) => {
                debug!(model = %model.identifier, error = %e, "Rejected prediction request");
                self.metrics
                    .inc_prediction_errors(&model.base_name, "validation");
                return Err(e.into());
            }
        };

        let predictor = model.predictor.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let inference_start = Instant::now();
            let label = predictor.predict(&row)?;
            let probabilities = predictor.probabilities(&row);
            Ok::<_, anyhow::Error>((label, probabilities, inference_start.elapsed()))
        })
        .await
        .map_err(|e| anyhow::anyhow!("inference task failed: {}", e))
        .and_then(|result| result);

        let (label, probabilities, latency) = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(
                    model = %model.identifier,
                    kind = %model.predictor.kind(),
                    features = request.features.len(),
                    error = %format!("{:#}", e),
                    "Prediction failed"
                );
                self.metrics
                    .inc_prediction_errors(&model.base_name, "prediction");
                return Err(ServingError::Prediction(format!("{:#}", e)));
            }
        };

        let (probability, confidence) = match probabilities {
            Some(Ok(Some(ProbabilityOutput::Binary(p)))) => (Some(p), None),
            Some(Ok(Some(ProbabilityOutput::Multiclass(map)))) => (None, Some(map)),
            Some(Ok(None)) | None => (None, None),
            Some(Err(e)) => {
                self.logger
                    .log_probability_failure(&model.identifier, &format!("{:#}", e));
                (None, None)
            }
        };

        let predicted = label.to_string();
        self.metrics.record_feature_values(
            request
                .features
                .iter()
                .filter_map(|(name, value)| value.as_f64().map(|v| (name, vec![v]))),
        );
        self.metrics.record_prediction_with_latency(
            &model.base_name,
            &request.features,
            &predicted,
            latency,
        );
        self.logger
            .log_prediction(&model.identifier, &predicted, start.elapsed());

        Ok(PredictionResponse {
            prediction: label,
            probability,
            confidence,
            model_name: model.identifier,
            model_version: model.version,
        })
    }

    async fn resolve_model(&self, requested: Option<&str>) -> ServingResult<LoadedModel> {
        let current = self.current_model().await;
        match requested {
            Some(name) if current.as_ref().map(|m| m.identifier.as_str()) != Some(name) => {
                self.loader.load(name).await.map_err(|e| {
                    self.logger.log_model_load_failed(name, &e.to_string());
                    ServingError::ModelLoad(e)
                })
            }
            _ => current.ok_or(ServingError::ModelUnavailable),
        }
    }
}

/// Build the single input row for a predictor.
///
/// With a declared schema the row follows schema order and every schema
/// feature must be present; without one the request's own order is used.
/// Text values are rejected unless the predictor accepts them.
pub fn arrange_features(
    predictor: &Predictor,
    features: &FeatureMap,
) -> Result<Vec<FeatureValue>, ValidationError> {
    let named: Vec<(&str, &FeatureValue)> = match predictor.feature_names() {
        Some(schema) => {
            let missing: Vec<String> = schema
                .iter()
                .filter(|name| !features.contains_key(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ValidationError::MissingFeatures(missing));
            }
            schema
                .iter()
                .filter_map(|name| features.get(name).map(|v| (name.as_str(), v)))
                .collect()
        }
        None => features.iter().collect(),
    };

    if !predictor.accepts_text() {
        let text: Vec<String> = named
            .iter()
            .filter(|(_, v)| v.is_text())
            .map(|(name, _)| name.to_string())
            .collect();
        if !text.is_empty() {
            return Err(ValidationError::NonNumericFeatures(text));
        }
    }

    Ok(named.into_iter().map(|(_, v)| v.clone()).collect())
}
