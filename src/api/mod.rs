//! Local HTTP API for browser control.
//! Session lifecycle, navigation, tab management, screenshots and script
//! execution against the single managed Firefox instance.

use crate::driver::session::TabInfo;
use crate::driver::BrowserSession;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub type ApiState = Arc<AppState>;

type ApiResult<T> = Result<T, ApiError>;

/// API key authentication middleware.
/// Skips authentication for GET /api/health so orchestrators can probe the server.
async fn api_key_auth(
    axum::extract::State(expected_key): axum::extract::State<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(k) if k == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Ensure a URL carries a scheme; bare hostnames get https.
fn format_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("about:") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/launch", post(launch))
        .route("/api/quit", post(quit))
        .route("/api/status", get(status))
        // Browser control
        .route("/api/navigate", post(navigate))
        .route("/api/screenshot", get(screenshot))
        .route("/api/execute_script", post(execute_script))
        // Tab management
        .route("/api/open_tab", post(open_tab))
        .route("/api/tabs", get(list_tabs))
        .route("/api/switch_tab", post(switch_tab))
        .route("/api/close_tab", post(close_tab))
        // Utility
        .route("/api/health", get(health))
        .route("/", get(index))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request/response types
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct NavigateReq {
    url: String,
}

#[derive(serde::Deserialize, Default)]
struct OpenTabReq {
    url: Option<String>,
}

#[derive(serde::Deserialize)]
struct SwitchTabReq {
    handle: String,
}

#[derive(serde::Deserialize, Default)]
struct CloseTabReq {
    handle: Option<String>,
}

#[derive(serde::Deserialize)]
struct ScriptReq {
    script: String,
}

#[derive(serde::Serialize)]
struct LaunchResponse {
    session_id: Uuid,
    driver_port: u16,
    already_running: bool,
}

#[derive(serde::Serialize, Default)]
struct StatusResponse {
    browser_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    window_handles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_window_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tabs_count: Option<usize>,
}

#[derive(serde::Serialize)]
struct TabListResponse {
    tabs: Vec<TabInfo>,
    count: usize,
}

#[derive(serde::Serialize)]
struct CloseTabResponse {
    closed: String,
    remaining_tabs: usize,
}

#[derive(serde::Serialize)]
struct ScriptResponse {
    result: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

async fn launch(State(state): State<ApiState>) -> ApiResult<Json<LaunchResponse>> {
    let mut guard = state.session.lock().await;

    // Idempotent: a second launch reports the existing session.
    if let Some(session) = guard.as_ref() {
        return Ok(Json(LaunchResponse {
            session_id: session.id(),
            driver_port: session.driver_port(),
            already_running: true,
        }));
    }

    let firefox = { state.config.read().firefox.clone() };
    let session = BrowserSession::launch(&firefox).await?;
    let response = LaunchResponse {
        session_id: session.id(),
        driver_port: session.driver_port(),
        already_running: false,
    };
    *guard = Some(session);
    Ok(Json(response))
}

async fn quit(State(state): State<ApiState>) -> StatusCode {
    let session = state.session.lock().await.take();
    if let Some(session) = session {
        session.quit().await;
    }
    // No-op success when nothing was running
    StatusCode::NO_CONTENT
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusResponse>> {
    let guard = state.session.lock().await;
    let Some(session) = guard.as_ref() else {
        return Ok(Json(StatusResponse::default()));
    };

    let (handles, page) = session.status().await?;
    Ok(Json(StatusResponse {
        browser_running: true,
        session_id: Some(session.id()),
        title: page.as_ref().map(|p| p.title.clone()),
        url: page.map(|p| p.url),
        current_window_handle: session.current_tab().map(str::to_string),
        tabs_count: Some(handles.len()),
        window_handles: Some(handles),
    }))
}

// ---------------------------------------------------------------------------
// Browser control
// ---------------------------------------------------------------------------

async fn navigate(
    State(state): State<ApiState>,
    Json(req): Json<NavigateReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or(ApiError::NotReady)?;
    let info = session.navigate(&format_url(&req.url)).await?;
    Ok(Json(serde_json::json!({ "title": info.title, "url": info.url })))
}

async fn screenshot(State(state): State<ApiState>) -> ApiResult<Response> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or(ApiError::NotReady)?;
    let png = session.screenshot().await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "image/png")],
        png,
    )
        .into_response())
}

async fn execute_script(
    State(state): State<ApiState>,
    Json(req): Json<ScriptReq>,
) -> ApiResult<Json<ScriptResponse>> {
    if req.script.trim().is_empty() {
        return Err(ApiError::InvalidRequest("script must not be empty".into()));
    }
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or(ApiError::NotReady)?;
    let result = session.execute_script(&req.script).await?;
    Ok(Json(ScriptResponse { result }))
}

// ---------------------------------------------------------------------------
// Tab management
// ---------------------------------------------------------------------------

async fn open_tab(
    State(state): State<ApiState>,
    body: Option<Json<OpenTabReq>>,
) -> ApiResult<Json<TabInfo>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let url = req
        .url
        .as_deref()
        .filter(|u| *u != "about:blank")
        .map(format_url);

    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or(ApiError::NotReady)?;
    let tab = session.open_tab(url.as_deref()).await?;
    Ok(Json(tab))
}

async fn list_tabs(State(state): State<ApiState>) -> ApiResult<Json<TabListResponse>> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or(ApiError::NotReady)?;
    let tabs = session.tabs().await?;
    let count = tabs.len();
    Ok(Json(TabListResponse { tabs, count }))
}

async fn switch_tab(
    State(state): State<ApiState>,
    Json(req): Json<SwitchTabReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or(ApiError::NotReady)?;
    let info = session.switch_tab(&req.handle).await?;
    Ok(Json(serde_json::json!({ "title": info.title, "url": info.url })))
}

async fn close_tab(
    State(state): State<ApiState>,
    body: Option<Json<CloseTabReq>>,
) -> ApiResult<Json<CloseTabResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or(ApiError::NotReady)?;

    let closed = match req.handle.clone() {
        Some(h) => h,
        None => session
            .current_tab()
            .map(str::to_string)
            .ok_or(ApiError::NoCurrentTab)?,
    };
    let remaining_tabs = session.close_tab(req.handle.as_deref()).await?;
    Ok(Json(CloseTabResponse {
        closed,
        remaining_tabs,
    }))
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../assets/console.html"))
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Build the full API app (router + optional API key auth + CORS).
/// Used by run_server and by integration tests to exercise API key middleware.
pub fn app(state: ApiState, api_key: Option<String>) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    let base_router = router(state);
    let base_router = if let Some(key) = api_key {
        base_router.route_layer(middleware::from_fn_with_state(key, api_key_auth))
    } else {
        base_router
    };
    base_router
        .layer(ConcurrencyLimitLayer::new(32))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderName::from_static("x-api-key"),
                ]),
        )
}

pub async fn run_server(
    state: ApiState,
    bind: &str,
    port: u16,
    api_key: Option<String>,
) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port))
        .await
        .map_err(|e| format!("Failed to bind API port {}: {}", port, e))?;
    let app = app(state, api_key);
    tracing::info!("Foxbridge API listening on http://{}:{}", bind, port);
    axum::serve(listener, app)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
