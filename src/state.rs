use crate::config::AppConfig;
use crate::driver::BrowserSession;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application global state.
///
/// The session slot holds the one browser session the service manages.
/// The tokio mutex around it serializes every driver call: the WebDriver
/// connection is not safe for concurrent command issuance, so concurrent
/// HTTP requests queue here for their turn.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub session: Arc<Mutex<Option<BrowserSession>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            session: Arc::new(Mutex::new(None)),
        }
    }
}
