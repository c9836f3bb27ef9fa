//! Main Entrypoint for the Parlo API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Selecting and initializing the persistence backend.
//! 3. Initializing shared services (ledger, retrieval engine, LLM clients).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use parlo_api::{config::Config, router::create_router, seed, state::AppState, store::PgStore};
use parlo_core::{
    ledger::Ledger,
    llm::{ChatClient, LlmRanker, OpenAICompatibleClient},
    materials::{MaterialStore, StaticMaterials},
    retrieval::{RetrievalConfig, RetrievalEngine, SemanticRanker},
    store::MemoryStore,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Select and Initialize the Store ---
    let (ledger, materials): (Arc<Ledger>, Arc<dyn MaterialStore>) = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let store = Arc::new(PgStore::new(pool));
            store
                .run_migrations()
                .await
                .context("Failed to run migrations")?;
            seed::seed_materials(&store)
                .await
                .context("Failed to seed learning materials")?;
            info!("Database connection established and migrations are up-to-date.");
            (Arc::new(Ledger::new(store.clone())), store)
        }
        None => {
            warn!("DATABASE_URL not set; sessions and summaries live in memory only");
            (
                Arc::new(Ledger::new(Arc::new(MemoryStore::new()))),
                Arc::new(StaticMaterials::new()),
            )
        }
    };

    // --- 4. Initialize LLM Clients ---
    let chat: Option<Arc<dyn ChatClient>> = config.groq_api_key.as_ref().map(|key| {
        let openai_config = OpenAIConfig::new()
            .with_api_key(key.clone())
            .with_api_base(config.groq_api_base.clone());
        Arc::new(OpenAICompatibleClient::new(
            openai_config,
            config.chat_model.clone(),
            0.7,
        )) as Arc<dyn ChatClient>
    });
    let ranker: Option<Arc<dyn SemanticRanker>> = chat
        .clone()
        .map(|chat| Arc::new(LlmRanker::new(chat)) as Arc<dyn SemanticRanker>);
    match &ranker {
        Some(_) => info!(model = %config.chat_model, "semantic ranker enabled"),
        None => info!("no LLM key configured; retrieval uses keyword ranking only"),
    }

    let retrieval = Arc::new(RetrievalEngine::new(
        materials.clone(),
        ranker,
        RetrievalConfig {
            cache_capacity: config.context_cache_size,
            ranker_timeout: config.ranker_timeout,
        },
    ));

    let app_state = Arc::new(AppState {
        ledger,
        retrieval,
        materials,
        chat,
        http: reqwest::Client::new(),
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        bind_address = %config.bind_address,
        agent_url = %config.agent_url,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
