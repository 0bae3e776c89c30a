use std::sync::Arc;

use foxbridge_lib::api;
use foxbridge_lib::config;
use foxbridge_lib::driver::BrowserSession;
use foxbridge_lib::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Never overwrite an existing config file on a load failure
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(
                "Failed to load config: {}. Using in-memory defaults (not saving).",
                e
            );
            config::AppConfig::default()
        }
    };

    let state = Arc::new(AppState::new(config.clone()));

    // Bring the browser up with the service; API consumers can still
    // recover with an explicit launch if this fails.
    if config.firefox.autostart {
        match BrowserSession::launch(&config.firefox).await {
            Ok(session) => {
                tracing::info!("Browser launched at startup (session {})", session.id());
                *state.session.lock().await = Some(session);
            }
            Err(e) => tracing::error!("Browser autostart failed: {}", e),
        }
    }

    let server = {
        let state = Arc::clone(&state);
        let bind = config.api.bind.clone();
        let port = config.api.port;
        let api_key = config.api.api_key.clone();
        tokio::spawn(async move {
            if let Err(e) = api::run_server(state, &bind, port, api_key).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    server.abort();

    // The browser process must not outlive the service
    if let Some(session) = state.session.lock().await.take() {
        session.quit().await;
    }

    Ok(())
}
