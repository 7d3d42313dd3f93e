use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use consult_graphrag::{
    api,
    app_state::AppState,
    config::AppConfig,
    ingest::IngestOptions,
    GraphRag,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "consult_graphrag", version, about = "GraphRAG híbrido sobre consultas médicas")]
struct Cli {
    /// Directorio del corpus (por defecto CORPUS_DIR)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Indexa el corpus si el grafo está vacío y sirve la API HTTP
    Serve,
    /// Ingiere el corpus en Neo4j
    Ingest {
        /// Borra todo el grafo antes de ingerir
        #[arg(long, conflicts_with = "if_empty")]
        reset: bool,
        /// Sólo ingiere si el grafo no contiene consultas
        #[arg(long)]
        if_empty: bool,
    },
    /// Responde una lista de preguntas (modo lote)
    Ask {
        #[arg(required = true)]
        questions: Vec<String>,
    },
    /// Bucle interactivo de preguntas ('q' para salir)
    Chat,
    /// Muestra el recuento de nodos y relaciones
    Stats {
        /// Cuenta además las consultas que mencionan este término (p. ej. "heart")
        #[arg(long)]
        term: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración
    let mut cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    if let Some(corpus) = cli.corpus {
        cfg.corpus_dir = corpus;
    }

    // 3. Conectar a Neo4j y a los proveedores LLM (fatal si falla)
    let rag = GraphRag::from_config(&cfg)
        .await
        .context("Error inicializando el motor GraphRAG")?;

    match cli.command {
        Command::Serve => serve(cfg, rag).await,
        Command::Ingest { reset, if_empty } => {
            if if_empty {
                match rag.ensure_indexed(&cfg.corpus_dir).await? {
                    Some(summary) => println!("{summary}"),
                    None => println!("Grafo ya poblado; no se ingiere nada."),
                }
            } else {
                let summary = rag
                    .ingest_corpus(&cfg.corpus_dir, IngestOptions { reset }, |_| {})
                    .await?;
                println!("{summary}");
            }
            println!("{}", rag.stats().await?);
            Ok(())
        }
        Command::Ask { questions } => {
            ask_batch(&rag, &questions).await;
            Ok(())
        }
        Command::Chat => {
            rag.ensure_indexed(&cfg.corpus_dir).await?;
            chat(&rag).await
        }
        Command::Stats { term } => {
            println!("{}", rag.stats().await?);
            for term in &term {
                let count = rag.count_mentioning(term).await?;
                println!("{} consultas mencionan '{}'", count.consultations, count.term);
            }
            Ok(())
        }
    }
}

async fn serve(cfg: AppConfig, rag: GraphRag) -> Result<()> {
    rag.ensure_indexed(&cfg.corpus_dir)
        .await
        .context("Error en la ingesta inicial")?;

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let app_state = AppState::new(cfg, rag, Some(shutdown_tx));

    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

/// Un error en una pregunta se informa y el lote continúa.
async fn ask_batch(rag: &GraphRag, questions: &[String]) {
    let total = questions.len();
    for (i, question) in questions.iter().enumerate() {
        println!("\n🔹 PREGUNTA {}/{}: {}", i + 1, total, question);
        match rag.answer(question).await {
            Ok(answer) => println!("\n🤖 {answer}"),
            Err(err) => {
                error!("Error en la pregunta '{question}': {err}");
                println!("❌ Error: {err}");
            }
        }
    }
}

async fn chat(rag: &GraphRag) -> Result<()> {
    println!("✅ Sistema listo. Búsqueda vectorial + recorrido del grafo. ('q' para salir)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all("\n👤 TÚ: ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "q" | "quit") {
            break;
        }

        match rag.answer(question).await {
            Ok(answer) => println!("\n🤖 IA: {answer}"),
            Err(err) => println!("❌ Error: {err}"),
        }
    }
    Ok(())
}
