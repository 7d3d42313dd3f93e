use std::sync::{Mutex, MutexGuard};

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    ingest::IngestOptions,
    models::{GraphStats, TermCount},
    rag::SourceRef,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize, Default)]
pub struct IngestPayload {
    #[serde(default)]
    reset: bool,
}

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

#[derive(Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceRefBody>,
}

#[derive(Serialize, Deserialize)]
pub struct SourceRefBody {
    pub filename: String,
    pub score: f64,
    pub symptoms: Vec<String>,
    pub conditions: Vec<String>,
}

impl From<SourceRef> for SourceRefBody {
    fn from(s: SourceRef) -> Self {
        Self {
            filename: s.filename,
            score: s.score,
            symptoms: s.symptoms,
            conditions: s.conditions,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct StatsParams {
    term: Option<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub graph: GraphStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentioning: Option<TermCount>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/status", get(status_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

fn lock_status(status: &Mutex<Status>) -> MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (code, Json(json!({ "error": message.into() })))
}

// --- Handlers ---

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    payload: Option<Json<IngestPayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let options = IngestOptions {
        reset: payload.map(|Json(p)| p.reset).unwrap_or(false),
    };

    {
        let mut status = lock_status(&state.status);
        if status.is_busy {
            return Err(api_error(
                StatusCode::CONFLICT,
                "Ya hay una indexación en curso.",
            ));
        }
        status.is_busy = true;
        status.message = "Iniciando indexación...".to_string();
        status.progress = 0.0;
    }

    spawn(async move {
        let status_arc = state.status.clone();
        let result = state
            .rag
            .ingest_corpus(&state.config.corpus_dir, options, move |p| {
                let mut status = lock_status(&status_arc);
                status.message = format!("[{}/{}] Procesando: {}...", p.index + 1, p.total, p.filename);
                status.progress = p.fraction();
            })
            .await;

        let mut status = lock_status(&state.status);
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                status.message = format!("¡Indexación completada! {}", summary);
                status.last_ingestion = Some(summary);
            }
            Err(err) => {
                status.message = format!("Error en la indexación: {}", err);
                error!("Error de ingesta: {}", err);
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "La pregunta está vacía."));
    }

    match state.rag.ask(question).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.text,
            sources: answer.sources.into_iter().map(SourceRefBody::from).collect(),
        })),
        Err(e) => {
            error!("Error en la consulta RAG: {}", e);
            Err(api_error(
                StatusCode::BAD_GATEWAY,
                format!("Error en la consulta RAG: {}", e),
            ))
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(lock_status(&state.status).clone())
}

async fn stats_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, ApiError> {
    let unavailable = |e: crate::Error| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("No se pudo consultar el grafo: {}", e),
        )
    };

    let graph = state.rag.stats().await.map_err(unavailable)?;
    let mentioning = match params.term.as_deref() {
        Some(term) => Some(state.rag.count_mentioning(term).await.map_err(unavailable)?),
        None => None,
    };
    Ok(Json(StatsResponse { graph, mentioning }))
}

async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    (StatusCode::OK, Json(json!({ "message": "Servidor apagándose." })))
}
