use crate::data::{EntitySnapshot, GenerationConfig, Timetable};
use crate::error::ScheduleError;
use crate::extract::audit_entries;
use crate::generate;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Address used when `TIMETABLE_ADDR` is not set.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Body of a generation request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerateRequest {
    pub entities: EntitySnapshot,
    #[serde(default)]
    pub config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

impl From<ScheduleError> for ErrorBody {
    fn from(err: ScheduleError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

async fn generate_handler(
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Timetable>, ApiError> {
    // each solve runs on its own blocking worker with its own model and search state
    let result = tokio::task::spawn_blocking(move || {
        let timetable = generate(&request.entities, &request.config)?;
        let violations = audit_entries(&request.entities, &request.config, timetable.entries());
        for violation in &violations {
            error!("Generated timetable breaks a hard rule: {}", violation);
        }
        Ok::<_, ScheduleError>(timetable)
    })
    .await;

    match result {
        Ok(Ok(timetable)) => Ok(Json(timetable)),
        Ok(Err(e)) => {
            warn!("Rejected generation request: {}", e);
            Err((StatusCode::UNPROCESSABLE_ENTITY, Json(e.into())))
        }
        Err(join_error) => {
            error!("Generation task failed: {}", join_error);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "timetable generation failed".into(),
                    kind: "internal".into(),
                }),
            ))
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router() -> Router {
    Router::new()
        .route("/v1/timetable/generate", post(generate_handler))
        .route("/health", get(health_handler))
}

/// Bind address from `TIMETABLE_ADDR`, falling back to [`DEFAULT_ADDR`].
pub fn bind_addr() -> Result<SocketAddr, std::net::AddrParseError> {
    std::env::var("TIMETABLE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
}

pub async fn run_server(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router()).await
}
