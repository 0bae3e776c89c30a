use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FoxbridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Process error: {0}")]
    Process(String),
}

pub type Result<T> = std::result::Result<T, FoxbridgeError>;

/// API-facing error. Every handler failure is converted into a structured
/// JSON body `{"error": <kind>, "message": <detail>}` with a matching status
/// code; nothing propagates as a panic.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("browser is not running")]
    NotReady,

    #[error("no current tab; open or switch to a tab first")]
    NoCurrentTab,

    #[error("tab not found: {0}")]
    TabNotFound(String),

    #[error("cannot close the last remaining tab")]
    LastTab,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("webdriver error: {0}")]
    Driver(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            // Both gate failures are the same contract-level condition: the
            // operation needs a live session/current tab that does not exist.
            ApiError::NotReady | ApiError::NoCurrentTab => "not_ready",
            ApiError::TabNotFound(_) => "tab_not_found",
            ApiError::LastTab => "last_tab",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Script(_) => "script_error",
            ApiError::Driver(_) => "driver_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotReady | ApiError::NoCurrentTab => StatusCode::CONFLICT,
            ApiError::TabNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::LastTab | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Script(_) | ApiError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<fantoccini::error::CmdError> for ApiError {
    fn from(e: fantoccini::error::CmdError) -> Self {
        ApiError::Driver(e.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for ApiError {
    fn from(e: fantoccini::error::NewSessionError) -> Self {
        ApiError::Driver(format!("failed to establish session: {e}"))
    }
}

impl From<FoxbridgeError> for ApiError {
    fn from(e: FoxbridgeError) -> Self {
        ApiError::Driver(e.to_string())
    }
}
