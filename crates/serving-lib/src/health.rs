//! Health and readiness reporting for the model server
//!
//! Liveness (`/health`) always answers 200 and describes whether a model
//! is loaded; readiness (`/readyz`) fails until the startup model is ready.

use serde::{Deserialize, Serialize};

/// Health status reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// A model is loaded and predictions can be served
    Healthy,
    /// No model is loaded
    Error,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: "Model is loaded and ready for inference".to_string(),
        }
    }

    pub fn model_missing() -> Self {
        Self {
            status: HealthStatus::Error,
            message: "Model not loaded".to_string(),
        }
    }

    /// Health derived from whether a model is loaded
    pub fn from_model_loaded(loaded: bool) -> Self {
        if loaded {
            Self::healthy()
        } else {
            Self::model_missing()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Body of `GET /readyz`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: None,
        }
    }

    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_serialization() {
        let body = serde_json::to_value(HealthResponse::healthy()).unwrap();
        assert_eq!(
            body,
            json!({"status": "healthy", "message": "Model is loaded and ready for inference"})
        );

        let body = serde_json::to_value(HealthResponse::model_missing()).unwrap();
        assert_eq!(body, json!({"status": "error", "message": "Model not loaded"}));
    }

    #[test]
    fn test_health_from_model_state() {
        assert!(HealthResponse::from_model_loaded(true).is_healthy());
        assert!(!HealthResponse::from_model_loaded(false).is_healthy());
    }

    #[test]
    fn test_readiness_omits_reason_when_ready() {
        let body = serde_json::to_value(ReadinessResponse::ready()).unwrap();
        assert_eq!(body, json!({"ready": true}));

        let not_ready = ReadinessResponse::not_ready("Model not loaded");
        assert!(!not_ready.ready);
        assert_eq!(not_ready.reason.as_deref(), Some("Model not loaded"));
    }
}
