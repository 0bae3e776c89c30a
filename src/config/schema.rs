use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Firefox / geckodriver settings
    #[serde(default)]
    pub firefox: FirefoxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port the HTTP API listens on
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Optional API key; when set, requests must carry X-API-Key
    /// (GET /api/health stays open so orchestrators can probe the server)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            bind: default_bind(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirefoxConfig {
    /// Firefox executable path; when absent, geckodriver resolves it itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,

    /// geckodriver executable path (looked up on PATH by default)
    #[serde(default = "default_geckodriver")]
    pub geckodriver: PathBuf,

    /// Run Firefox headless
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Browser window size
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// WebDriver page-load and script timeouts, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub page_load_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub script_timeout_ms: u64,

    /// Page the first tab navigates to after launch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    /// Launch the browser when the service starts
    #[serde(default = "default_true")]
    pub autostart: bool,

    /// Extra Firefox command-line arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for FirefoxConfig {
    fn default() -> Self {
        Self {
            binary: None,
            geckodriver: default_geckodriver(),
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            page_load_timeout_ms: default_timeout_ms(),
            script_timeout_ms: default_timeout_ms(),
            start_url: Some("https://www.bing.com/".to_string()),
            autostart: true,
            extra_args: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    5000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_geckodriver() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("geckodriver.exe")
    } else {
        PathBuf::from("geckodriver")
    }
}

fn default_window_width() -> u32 {
    2560
}

fn default_window_height() -> u32 {
    1440
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}
