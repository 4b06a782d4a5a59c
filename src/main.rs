use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use theramind_api::auth::JwtSecret;
use theramind_api::cfp::CfpClient;
use theramind_api::config::Config;
use theramind_api::copilot::ConversationLocks;
use theramind_api::llm::GeminiClient;
use theramind_api::routes::{self, AppState};
use theramind_api::supabase::SupabaseClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = SupabaseClient::new(&config.supabase_url, &config.supabase_service_role_key)
        .context("Failed to build Supabase client")?;
    let llm = GeminiClient::new(&config.google_api_key).context("Failed to build Gemini client")?;

    let state = AppState {
        db,
        llm: Arc::new(llm),
        cfp: Arc::new(CfpClient::registry().context("Failed to build CFP client")?),
        locks: Arc::new(ConversationLocks::default()),
        jwt_secret: JwtSecret(config.supabase_jwt_secret.clone()),
    };

    let cors = if config.cors_allow_any() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::router(state).layer(cors);

    info!("TheraMind API listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
