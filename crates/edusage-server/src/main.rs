//! EduSage — textbook ingestion and curriculum chat in a single binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use edusage_chat::providers::{LlmGenerator, TextGenerator};
use edusage_chat::{ChatService, GenerationConfig};
use edusage_core::{EduSageConfig, Error};
use edusage_infer::EmbedderBackend;
use edusage_ingest::TextExtractor;
use edusage_resolve::MmrOptions;
use edusage_runtime::{IngestionOrchestrator, Job, OrchestratorSettings, RunReport};
use edusage_server::{build_router, AppState};
use edusage_store::SqliteStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("EDUSAGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_help() {
    println!("EduSage — textbook ingestion and curriculum chat");
    println!();
    println!("Usage: edusage [command]");
    println!();
    println!("Commands:");
    println!("  serve                         Start the server (default)");
    println!("  ingest <dir> [--reset-failed] [--priority-corpus]");
    println!("                                Ingest every new PDF under <dir>");
    println!("  ocr-failed                    OCR every failed upload");
    println!("  retry-ocr                     Retry failed OCR with enhanced settings");
    println!("  curate                        Purge noise chunks and backfill metadata");
    println!("  status                        Print ledger counts");
    println!("  reset-failed                  Return failed uploads to pending");
    println!("  reset                         Clear the ledger and its chunks");
    println!("  help                          Show this help message");
}

/// Config errors are the one fatal condition: report and exit 1.
fn load_config(data_dir: &Path) -> EduSageConfig {
    match EduSageConfig::from_env(data_dir) {
        Ok(config) => config,
        Err(Error::Config(msg)) => {
            eprintln!("Configuration error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to initialize data directory: {}", e);
            std::process::exit(1);
        }
    }
}

fn open_store(config: &EduSageConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.data_paths.db, config.embedding.dimension)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    Ok(Arc::new(store))
}

fn load_embedder(config: &EduSageConfig) -> anyhow::Result<Arc<dyn EmbedderBackend>> {
    match edusage_infer::create_embedder(&config.embedding) {
        Ok(embedder) => Ok(embedder),
        Err(Error::Config(msg)) => {
            eprintln!("Configuration error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn build_orchestrator(
    config: &EduSageConfig,
    store: Arc<SqliteStore>,
    priority_corpus: bool,
) -> anyhow::Result<IngestionOrchestrator> {
    let embedder = load_embedder(config)?;
    let mut settings = OrchestratorSettings::from_ingest(&config.ingest);
    if priority_corpus {
        settings = settings.priority_corpus();
    }
    Ok(IngestionOrchestrator::new(
        store,
        TextExtractor::from_settings(&config.ingest),
        embedder,
        settings,
    ))
}

fn print_report(job: Job, report: &RunReport) {
    info!(
        "{:?} finished: processed={}, skipped={}, failed={}, duration={}ms",
        job, report.processed, report.skipped, report.failed, report.duration_ms
    );
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to render report: {}", e),
    }
}

async fn run_job(job: Job, args: &[String]) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir();
    let config = load_config(&data_dir);
    let store = open_store(&config)?;
    let priority_corpus = args.iter().any(|a| a == "--priority-corpus");
    let orchestrator = build_orchestrator(&config, store, priority_corpus)?;

    match job {
        Job::Ingest => {
            let Some(dir) = args.iter().skip(2).find(|a| !a.starts_with("--")) else {
                eprintln!("Usage: edusage ingest <dir> [--reset-failed] [--priority-corpus]");
                std::process::exit(1);
            };
            if args.iter().any(|a| a == "--reset-failed") {
                let reset = orchestrator.reset_failed()?;
                info!("Reset {} failed uploads", reset.len());
            }
            let report = orchestrator.run(Path::new(dir)).await?;
            print_report(job, &report);
        }
        Job::OcrFailed => {
            let report = orchestrator.process_failed_with_ocr().await?;
            print_report(job, &report);
        }
        Job::RetryOcr => {
            let report = orchestrator.retry_failed_ocr().await?;
            print_report(job, &report);
        }
        Job::Curate => {
            let report = orchestrator.curate();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = load_config(&data_dir);
    let port = config.port;
    let store = open_store(&config)?;

    let embedder = load_embedder(&config)?;

    let generation = GenerationConfig::from_env();
    let generator = LlmGenerator::from_config(&generation);
    match &generator {
        Some(g) => info!("Chat provider: {} ({})", g.provider(), g.model()),
        None => warn!("No LLM provider configured; /api/chat will return 503"),
    }
    let generator = generator.map(|g| Arc::new(g) as Arc<dyn TextGenerator>);

    let chat = ChatService::new(store.clone(), embedder, generator, MmrOptions::default());
    let state = Arc::new(AppState::new(store, chat));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("EduSage server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("ingest") => run_job(Job::Ingest, &args).await,
        Some("ocr-failed") => run_job(Job::OcrFailed, &args).await,
        Some("retry-ocr") => run_job(Job::RetryOcr, &args).await,
        Some("curate") => run_job(Job::Curate, &args).await,
        Some("status") | Some("reset-failed") | Some("reset") => {
            let config = load_config(&resolve_data_dir());
            let store = open_store(&config)?;
            let ledger = edusage_store::UploadLedger::new(&store, config.ingest.max_retries);
            match args[1].as_str() {
                "reset-failed" => {
                    let files = ledger.reset_failed()?;
                    println!("Reset {} failed uploads", files.len());
                }
                "reset" => {
                    let removed = ledger.reset()?;
                    println!("Cleared {} upload records", removed);
                }
                _ => println!("{}", serde_json::to_string_pretty(&ledger.summary()?)?),
            }
            Ok(())
        }
        Some("--help") | Some("-h") | Some("help") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'edusage help' for usage.", other);
            std::process::exit(1);
        }
    }
}
