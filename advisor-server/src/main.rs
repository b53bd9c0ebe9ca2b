use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use advisor_core::llm::{CompletionBackend, OllamaClient};
use advisor_core::{AdvisorConfig, PrivacyFilter};
use advisor_data::{
    FeedbackBackend, FeedbackStore, JsonlFeedbackLog, MemoryRoster, PgFeedbackLog, PgRoster, Roster,
};
use advisor_server::http::{start_http_server, AppState};
use advisor_server::subsystems::chat::ChatEngine;
use advisor_server::subsystems::relevance::RelevanceEngine;
use advisor_server::subsystems::sessions::SessionStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "advisor.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match AdvisorConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to Postgres when configured; file-backed deployments skip it
    let pool = match &config.database {
        Some(db) => match advisor_core::db::create_pool(db).await {
            Ok(p) => Some(p),
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    if args.health {
        match &pool {
            Some(pool) => match advisor_core::db::health_check(pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("ℹ️  No database configured, skipping Postgres check"),
        }

        println!("✅ Campus Advisor health check passed");
        return Ok(());
    }

    // Roster backend
    let roster: Arc<dyn Roster> = match config.roster.source.as_str() {
        "postgres" => {
            let Some(pool) = pool.clone() else {
                eprintln!("roster.source = \"postgres\" requires a [database] section");
                std::process::exit(1);
            };
            Arc::new(PgRoster::new(pool, config.roster.table.clone()))
        }
        "file" => match MemoryRoster::load_json_file(&config.roster.path) {
            Ok(roster) => Arc::new(roster),
            Err(e) => {
                eprintln!("Failed to load roster from {}: {}", config.roster.path, e);
                std::process::exit(1);
            }
        },
        other => {
            eprintln!("Unknown roster.source {:?} (expected \"postgres\" or \"file\")", other);
            std::process::exit(1);
        }
    };

    // Feedback: Postgres primary when available, JSONL mirror always
    let primary: Option<Arc<dyn FeedbackBackend>> = match pool.clone() {
        Some(pool) => {
            let log = PgFeedbackLog::new(pool);
            if let Err(e) = log.ensure_schema().await {
                tracing::warn!(error = %e, "feedback table setup failed, running on fallback only");
                None
            } else {
                Some(Arc::new(log))
            }
        }
        None => None,
    };
    let fallback: Arc<dyn FeedbackBackend> =
        Arc::new(JsonlFeedbackLog::new(config.feedback.fallback_path.clone()));
    let feedback = Arc::new(FeedbackStore::new(primary, fallback));

    // Completion backend
    let llm: Arc<dyn CompletionBackend> = match OllamaClient::new(config.llm.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Failed to create Ollama client: {}", e);
            std::process::exit(1);
        }
    };

    let relevance = RelevanceEngine::new(
        feedback.clone(),
        config.feedback.scan_limit,
        config.feedback.similarity_threshold,
        config.feedback.max_exemplars,
    );
    let chat = ChatEngine::new(llm.clone(), roster.clone(), relevance, config.llm.history_turns);

    let state = Arc::new(AppState {
        model: config.llm.model.clone(),
        roster,
        sessions: SessionStore::new(),
        feedback,
        privacy: PrivacyFilter::new(),
        chat,
    });

    // Graceful shutdown on Ctrl+C
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    start_http_server(
        state,
        &config.service.host,
        config.service.port,
        tx.subscribe(),
    )
    .await?;

    Ok(())
}
