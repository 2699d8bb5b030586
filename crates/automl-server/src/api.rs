//! HTTP API for training, prediction, model management, health and metrics

use automl_lib::{
    dataset::record_from_json,
    health::{components, ComponentStatus, HealthRegistry},
    observability::PipelineMetrics,
    ArtifactKey, ArtifactStore, ErrorKind, InferenceEngine, PipelineError, PredictionResult,
    TrainingCoordinator, TrainingReport, TrainingRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    pub coordinator: TrainingCoordinator,
    pub engine: InferenceEngine,
    pub training_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        coordinator: TrainingCoordinator,
        engine: InferenceEngine,
        training_timeout: Option<Duration>,
    ) -> Self {
        Self {
            health_registry,
            metrics: PipelineMetrics::new(),
            coordinator,
            engine,
            training_timeout,
        }
    }

    fn store(&self) -> &Arc<dyn ArtifactStore> {
        self.engine.store()
    }
}

/// Pipeline error rendered as a structured body with a matching status
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::DatasetNotFound | ErrorKind::ArtifactNotFound => StatusCode::NOT_FOUND,
        ErrorKind::EmptyDataset
        | ErrorKind::NoTargetResolvable
        | ErrorKind::UnsupportedFileFormat
        | ErrorKind::InsufficientRows
        | ErrorKind::SchemaMismatch
        | ErrorKind::Parse => StatusCode::BAD_REQUEST,
        ErrorKind::AllModelsFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::Storage | ErrorKind::Serialization | ErrorKind::Integrity => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        if status.is_server_error() {
            error!(error = %self.0, stage = %self.0.stage(), "Request failed");
        }
        (status, Json(self.0.to_body())).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainBody {
    #[serde(flatten)]
    pub request: TrainingRequest,
    /// Overrides the server's default timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PredictBody {
    pub dataset_id: String,
    /// Defaults to the dataset's best model
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub input_fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
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

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub dataset_id: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub dataset_id: String,
    pub removed: usize,
}

/// Health check response - 200 while operational, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn train(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TrainBody>,
) -> Result<Json<TrainingReport>, ApiError> {
    let timeout = body
        .timeout_secs
        .map(Duration::from_secs)
        .or(state.training_timeout);
    info!(
        dataset_id = %body.request.dataset_id,
        algorithms = ?body.request.algorithms,
        "Training requested"
    );

    let outcome = state.coordinator.train(body.request, timeout).await;
    state
        .health_registry
        .record(components::TRAINER, &outcome)
        .await;
    Ok(Json(outcome?))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PredictBody>,
) -> Result<Json<PredictionResult>, ApiError> {
    let record = record_from_json(&body.input_fields);
    let outcome = state
        .engine
        .predict(&body.dataset_id, body.model_name.as_deref(), &record)
        .await;
    state
        .health_registry
        .record(components::INFERENCE, &outcome)
        .await;
    Ok(Json(outcome?))
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<ModelList>, ApiError> {
    let bundles = state.store().list(&dataset_id).await?;
    let models = bundles
        .into_iter()
        .map(|b| ModelInfo {
            algorithm: b.model.algorithm().name().to_string(),
            target_column: b.target_column().to_string(),
            feature_names: b.feature_names().to_vec(),
            model_name: b.key.model_name,
            version: b.version,
            is_best: b.is_best,
            accuracy: b.metrics.accuracy,
            f1_score: b.metrics.f1_score,
            auc_score: b.metrics.auc_score,
            created_at: b.created_at,
        })
        .collect();
    Ok(Json(ModelList { dataset_id, models }))
}

async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path((dataset_id, model_name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .store()
        .delete(&ArtifactKey::new(dataset_id, model_name))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_dataset_models(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let removed = state.store().delete_dataset(&dataset_id).await?;
    Ok(Json(DeleteResponse {
        dataset_id,
        removed,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/train", post(train))
        .route("/api/v1/predict", post(predict))
        .route(
            "/api/v1/models/:dataset_id",
            get(list_models).delete(delete_dataset_models),
        )
        .route("/api/v1/models/:dataset_id/:model_name", delete(delete_model))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
