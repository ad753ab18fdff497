use callhandler_ai::OpenAiBackend;
use callhandler_server::{build_state, config::ServerConfig, error::ServerError, routes};
use rootcause::Report;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Report<ServerError>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| ServerError::Config {
        reason: e.to_string(),
    })?;
    tracing::info!(
        model = %config.llm.model,
        open_slots = config.event.capacity,
        "Loaded configuration"
    );

    if !config.call.turn_fits_reply_window() {
        tracing::warn!(
            turn_timeout_secs = config.call.turn_timeout_secs,
            reply_timeout_secs = config.call.reply_timeout_secs,
            "turns may outlast the webhook wait; late replies will be held for the next input"
        );
    }

    let backend = OpenAiBackend::new(config.llm.backend_config()).map_err(|e| {
        ServerError::Startup {
            component: "model backend".to_string(),
            reason: e.to_string(),
        }
    })?;
    let state = build_state(&config, Arc::new(backend))?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: config.bind_addr.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Serve {
            reason: e.to_string(),
        })?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
