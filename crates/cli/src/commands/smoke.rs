//! Smoke test against a deployed model server

use anyhow::Result;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;

use crate::client::{ApiClient, ClientResult, PredictRequest};
use crate::output::{print_error, print_info, print_success, print_warning};

/// Iris sample sent by the prediction check
const IRIS_SAMPLE: &[(&str, f64)] = &[
    ("sepal_length", 5.1),
    ("sepal_width", 3.5),
    ("petal_length", 1.4),
    ("petal_width", 0.2),
];

/// Retry policy for smoke checks
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    print_warning(&format!(
                        "Request failed (attempt {}/{}): {}",
                        attempt, self.attempts, e
                    ));
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn iris_request() -> PredictRequest {
    let features: Map<String, Value> = IRIS_SAMPLE
        .iter()
        .map(|(name, value)| (name.to_string(), Value::from(*value)))
        .collect();
    PredictRequest {
        features,
        model_name: None,
    }
}

/// Check that the server is healthy
async fn check_health(client: &ApiClient, policy: RetryPolicy) -> Result<()> {
    let health = policy.run(|| client.health()).await?;
    if !health.is_healthy() {
        anyhow::bail!("expected status 'healthy', got '{}'", health.status);
    }
    Ok(())
}

/// Check that the server answers a sample prediction
async fn check_prediction(client: &ApiClient, policy: RetryPolicy) -> Result<()> {
    let request = iris_request();
    let response = policy.run(|| client.predict(&request)).await?;
    if response.prediction.is_null() {
        anyhow::bail!("response has no prediction");
    }
    print_info(&format!("Prediction: {}", response.prediction));
    Ok(())
}

/// Run all smoke checks; fails if any check fails
pub async fn run(client: &ApiClient, policy: RetryPolicy) -> Result<()> {
    print_info(&format!("Running smoke tests against {}", client.base_url()));

    let mut failures = 0;

    match check_health(client, policy).await {
        Ok(()) => print_success("Health check passed"),
        Err(e) => {
            print_error(&format!("Health check failed: {:#}", e));
            failures += 1;
        }
    }

    match check_prediction(client, policy).await {
        Ok(()) => print_success("Prediction check passed"),
        Err(e) => {
            print_error(&format!("Prediction check failed: {:#}", e));
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} smoke check(s) failed", failures);
    }
    print_success("All smoke tests passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_wait(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(0))
    }

    async fn mock_health(server: &mut mockito::ServerGuard, status: &str) -> mockito::Mock {
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": status, "message": "m"}).to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_smoke_passes_against_healthy_server() {
        let mut server = mockito::Server::new_async().await;
        let _health = mock_health(&mut server, "healthy").await;
        let _predict = server
            .mock("POST", "/predict")
            .match_body(mockito::Matcher::PartialJson(json!({
                "features": {"sepal_length": 5.1, "petal_width": 0.2}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"prediction": 0, "model_name": "iris", "model_version": "1.0.0"})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        run(&client, no_wait(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_smoke_fails_without_model() {
        let mut server = mockito::Server::new_async().await;
        let _health = mock_health(&mut server, "error").await;
        let _predict = server
            .mock("POST", "/predict")
            .with_status(503)
            .with_body(r#"{"detail": "Model not loaded"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = run(&client, no_wait(1)).await.unwrap_err();
        assert!(err.to_string().contains("2 smoke check(s) failed"));
    }

    #[tokio::test]
    async fn test_health_retries_are_bounded() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/health")
            .with_status(502)
            .expect(2)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result = check_health(&client, no_wait(2)).await;
        assert!(result.is_err());
        failing.assert_async().await;
    }
}
