//! Mapping of serving errors to HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use serving_lib::{ServingError, ValidationError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the prediction service
    Serving(ServingError),
    /// Request body could not be read as the expected JSON
    InvalidBody(String),
}

impl From<ServingError> for ApiError {
    fn from(err: ServingError) -> Self {
        ApiError::Serving(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Serving(ServingError::ModelUnavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "detail": ServingError::ModelUnavailable.to_string() }),
            ),
            ApiError::Serving(ServingError::Validation(err)) => {
                let key = match err {
                    ValidationError::MissingFeatures(_) => "missing_features",
                    ValidationError::NonNumericFeatures(_) => "invalid_features",
                };
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "detail": err.to_string(), key: err.features() }),
                )
            }
            ApiError::Serving(err @ ServingError::Prediction(_)) => {
                tracing::error!(error = %err, "Prediction request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": err.to_string() }),
                )
            }
            ApiError::Serving(err @ ServingError::ModelLoad(_)) => {
                tracing::error!(error = %err, "Model could not be loaded for request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": err.to_string() }),
                )
            }
            ApiError::InvalidBody(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "detail": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serving_lib::ModelLoadError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_model_unavailable_is_503() {
        let response = ApiError::from(ServingError::ModelUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await, json!({"detail": "Model not loaded"}));
    }

    #[tokio::test]
    async fn test_missing_features_is_400_with_names() {
        let err = ServingError::Validation(ValidationError::MissingFeatures(vec![
            "petal_width".into(),
        ]));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["missing_features"], json!(["petal_width"]));
        assert!(body["detail"].as_str().unwrap().contains("petal_width"));
    }

    #[tokio::test]
    async fn test_load_and_prediction_errors_are_500() {
        let load = ServingError::ModelLoad(ModelLoadError::UnsupportedFormat("m.pkl".into()));
        let response = ApiError::from(load).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ApiError::from(ServingError::prediction("bad shape")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"detail": "Prediction error: bad shape"})
        );
    }
}
