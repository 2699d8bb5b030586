//! API client for communicating with the AutoML server

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the AutoML server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse_json(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse_json(response).await
    }

    /// Make a DELETE request; `None` for an empty 204 response
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        parse_json(response).await.map(Some)
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => anyhow::bail!(
                "API error ({}): {} [{} during {}]",
                status,
                error.message,
                error.kind,
                error.stage
            ),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    response.json().await.context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub algorithms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingStep {
    pub step: String,
    pub status: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub accuracy: f64,
    pub f1_score: f64,
    pub auc_score: f64,
    pub training_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub dataset_id: String,
    pub target_column: String,
    pub training_steps: Vec<TrainingStep>,
    pub models: Vec<ModelSummary>,
    pub best_model: String,
    pub selection_metric: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub input_fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub dataset_id: String,
    pub model_name: String,
    pub artifact_version: u64,
    pub prediction: usize,
    pub label: String,
    pub probability: f64,
    pub risk_level: String,
    pub recommendation: String,
    pub top_contributing_features: Vec<FeatureContribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub version: u64,
    pub is_best: bool,
    pub algorithm: String,
    pub target_column: String,
    pub feature_names: Vec<String>,
    pub accuracy: f64,
    pub f1_score: f64,
    pub auc_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub dataset_id: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub dataset_id: String,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: std::collections::BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub stage: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(server: &mockito::ServerGuard) -> ApiClient {
        ApiClient::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_get_parses_model_list() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/models/telco")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"dataset_id":"telco","models":[{"model_name":"logistic","version":3,
                "is_best":true,"algorithm":"logistic","target_column":"Churn",
                "feature_names":["tenure"],"accuracy":0.9,"f1_score":0.8,"auc_score":0.95,
                "created_at":"2024-01-01T00:00:00Z"}]}"#,
            )
            .create_async()
            .await;

        let list: ModelList = client(&server).get("api/v1/models/telco").await.unwrap();
        mock.assert_async().await;
        assert_eq!(list.models.len(), 1);
        assert_eq!(list.models[0].version, 3);
        assert!(list.models[0].is_best);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/predict")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"kind":"artifact_not_found","stage":"inference","message":"artifact not found: telco/best"}"#,
            )
            .create_async()
            .await;

        let request = PredictRequest {
            dataset_id: "telco".to_string(),
            model_name: None,
            input_fields: serde_json::Map::new(),
        };
        let err = client(&server)
            .post::<Prediction, _>("api/v1/predict", &request)
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("404"));
        assert!(err.contains("artifact not found: telco/best"));
        assert!(err.contains("artifact_not_found during inference"));
    }

    #[tokio::test]
    async fn test_delete_no_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/v1/models/telco/logistic")
            .with_status(204)
            .create_async()
            .await;

        let body: Option<DeleteResponse> = client(&server)
            .delete("api/v1/models/telco/logistic")
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[test]
    fn test_train_request_omits_defaults() {
        let request = TrainRequest {
            dataset_id: "telco".to_string(),
            algorithms: Vec::new(),
            target_column: None,
            timeout_secs: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"dataset_id":"telco"}"#
        );
    }
}
