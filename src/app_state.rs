use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, ingest::IngestionSummary, rag::GraphRag};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub rag: Arc<GraphRag>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, rag: GraphRag, shutdown: Option<oneshot::Sender<()>>) -> Self {
        Self {
            config,
            rag: Arc::new(rag),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
                last_ingestion: None,
            })),
            shutdown_sender: Arc::new(Mutex::new(shutdown)),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
    pub last_ingestion: Option<IngestionSummary>,
}
