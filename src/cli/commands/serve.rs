//! HTTP API server for integration with other systems.
//!
//! Exposes the chapter pipeline to a web front end.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::LaerError;
use crate::orchestrator::ChapterPipeline;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared application state.
struct AppState {
    pipeline: ChapterPipeline,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let pipeline = ChapterPipeline::from_settings(&settings)?;
    let app = router(Arc::new(AppState { pipeline }));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Laer API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Generate chapter", "POST /api/chapter/getInfo");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/chapter/getInfo", post(get_info))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetInfoRequest {
    chapter_id: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct GetInfoResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl GetInfoResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_info(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GetInfoRequest>, JsonRejection>,
) -> (StatusCode, Json<GetInfoResponse>) {
    let Ok(Json(req)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(GetInfoResponse::failed("invalid body")),
        );
    };

    match state.pipeline.process_chapter(&req.chapter_id).await {
        Ok(outcome) => {
            info!(
                "Generated chapter {} ({} questions)",
                outcome.chapter_id,
                outcome.questions.len()
            );
            (
                StatusCode::OK,
                Json(GetInfoResponse {
                    success: true,
                    error: None,
                }),
            )
        }
        Err(failure) => {
            error!("{}", failure);
            match failure.error {
                LaerError::NotFound { entity, .. } => (
                    StatusCode::NOT_FOUND,
                    Json(GetInfoResponse::failed(format!("{} not found", entity))),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(GetInfoResponse::failed(format!(
                        "failed while {}",
                        failure.stage
                    ))),
                ),
            }
        }
    }
}
