//! Service entrypoint

use tracing_subscriber::EnvFilter;

use voicegate_config::Settings;
use voicegate_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    tracing::info!(
        bind = %settings.server.bind_addr,
        stt_model = %settings.speech.stt_model,
        llm_model = %settings.llm.model,
        silence_threshold_sec = settings.turn.silence_threshold_sec,
        interrupt_enabled = settings.interrupt.enabled,
        "starting voicegate"
    );

    let state = AppState::new(settings)?;
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.settings.server.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
