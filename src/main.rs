use std::sync::Arc;

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

use survey_assist::config::SurveyConfig;
use survey_assist::llm::{Reasoning, create_provider};
use survey_assist::store::{InMemorySessionStore, LibSqlSessionStore, SessionStore};
use survey_assist::survey::{
    SessionRegistry, SurveyController, SurveyRouteState, spawn_prune_task, survey_routes,
};
use survey_assist::tools::ToolRegistry;
use survey_assist::tools::builtin::register_survey_tools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SurveyConfig::from_env().inspect_err(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-...   (or SURVEY_LLM_BACKEND=anthropic + ANTHROPIC_API_KEY)");
    })?;
    let schema = Arc::new(config.load_form()?);

    eprintln!("📋 Survey Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Form: {} fields", schema.len());
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.port);

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let reasoning = Reasoning::new(llm)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    // ── Session store ───────────────────────────────────────────────────
    let store: Arc<dyn SessionStore> = match config.db_path {
        Some(ref path) => {
            eprintln!("   Database: {}", path.display());
            Arc::new(LibSqlSessionStore::new_local(path).await?)
        }
        None => {
            eprintln!("   Database: in-memory (sessions are lost on restart)");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let sessions = SessionRegistry::new(schema, store, config.session_idle_timeout);
    let _prune_handle = spawn_prune_task(Arc::clone(&sessions));

    // ── Tools ───────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    register_survey_tools(&tools);
    tracing::info!(count = tools.count(), "Survey tools registered");

    let controller = Arc::new(SurveyController::new(
        reasoning,
        tools,
        sessions,
        config.controller.clone(),
    ));

    // ── HTTP server ─────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);
    let app = survey_routes(SurveyRouteState { controller }).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Survey server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
