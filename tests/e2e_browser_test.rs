//! Real end-to-end browser tests.
//!
//! These tests spawn an actual geckodriver + Firefox in headless mode and
//! exercise the session against real pages: launch idempotency, tab switching
//! and closing, current-tab bookkeeping and script execution.
//!
//! ## Prerequisites
//! geckodriver and Firefox must be available. Discovery order:
//!   1. `GECKODRIVER_PATH` / `FIREFOX_PATH` environment variables
//!   2. Common Linux / macOS / Windows paths
//!   3. PATH lookup (`which geckodriver`, `which firefox`, …)
//!
//! Tests are **skipped** (not failed) when either binary is not found.
//!
//! ## Running
//! ```
//! cargo test --test e2e_browser_test -- --nocapture --test-threads=1
//! ```
//! Use `--test-threads=1`: launching a session kills stale geckodriver
//! processes, which would take down a session belonging to a parallel test.

use axum::http::StatusCode;
use foxbridge_lib::api::app;
use foxbridge_lib::config::{AppConfig, FirefoxConfig};
use foxbridge_lib::driver::BrowserSession;
use foxbridge_lib::error::ApiError;
use foxbridge_lib::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::ServiceExt;

// ── helpers ──────────────────────────────────────────────────────────────────

/// Find a binary via env var, candidate paths, then PATH. None skips the test.
fn find_binary(env_var: &str, candidates: &[&str], path_names: &[&str]) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_var) {
        let pb = PathBuf::from(&p);
        if pb.exists() {
            return Some(pb);
        }
    }

    for path in candidates {
        let pb = PathBuf::from(path);
        if pb.exists() {
            return Some(pb);
        }
    }

    let lookup = if cfg!(target_os = "windows") { "where" } else { "which" };
    for name in path_names {
        if let Ok(out) = Command::new(lookup).arg(name).output() {
            if out.status.success() {
                let p = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                let pb = PathBuf::from(&p);
                if pb.exists() {
                    return Some(pb);
                }
            }
        }
    }

    None
}

fn find_geckodriver() -> Option<PathBuf> {
    find_binary(
        "GECKODRIVER_PATH",
        &[
            "/usr/bin/geckodriver",
            "/usr/local/bin/geckodriver",
            "/opt/homebrew/bin/geckodriver",
            r"C:\tools\geckodriver\geckodriver.exe",
        ],
        &["geckodriver"],
    )
}

fn find_firefox() -> Option<PathBuf> {
    find_binary(
        "FIREFOX_PATH",
        &[
            "/usr/bin/firefox",
            "/usr/bin/firefox-esr",
            "/snap/bin/firefox",
            "/Applications/Firefox.app/Contents/MacOS/firefox",
            r"C:\Program Files\Mozilla Firefox\firefox.exe",
            r"C:\Program Files (x86)\Mozilla Firefox\firefox.exe",
        ],
        &["firefox", "firefox-esr"],
    )
}

/// Firefox config for tests: headless, no start page, discovered binaries.
fn test_firefox_config(geckodriver: PathBuf, firefox: PathBuf) -> FirefoxConfig {
    FirefoxConfig {
        binary: Some(firefox),
        geckodriver,
        headless: true,
        window_width: 1280,
        window_height: 800,
        start_url: None,
        autostart: false,
        ..FirefoxConfig::default()
    }
}

/// Spin up a tiny in-process HTTP server that serves test HTML.
/// Returns `(base_url_string, shutdown_sender)`.
async fn spawn_test_server() -> (String, oneshot::Sender<()>) {
    use axum::{response::Html, routing::get, Router};

    let app = Router::new()
        .route("/", get(|| async { Html(HTML_BASIC) }))
        .route("/other", get(|| async { Html(HTML_OTHER) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let base = format!("http://127.0.0.1:{}", addr.port());

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .ok();
    });

    (base, tx)
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ── test HTML fixtures ────────────────────────────────────────────────────────

const HTML_BASIC: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Foxbridge Test Page</title></head>
<body>
  <h1 id="heading">Hello from Foxbridge</h1>
  <p id="para">This is a test paragraph.</p>
</body>
</html>"#;

const HTML_OTHER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Foxbridge Other Page</title></head>
<body><h1>Other Page</h1></body>
</html>"#;

// ── tests ─────────────────────────────────────────────────────────────────────

/// 1. Launch through the API is idempotent: two launches leave one session
///    reporting the same id, and quit tears it down.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_01_launch_twice_is_idempotent() {
    let Some(gecko) = find_geckodriver() else { eprintln!("SKIP: no geckodriver"); return; };
    let Some(firefox) = find_firefox() else { eprintln!("SKIP: no Firefox"); return; };

    let mut config = AppConfig::default();
    config.firefox = test_firefox_config(gecko, firefox);
    let state = Arc::new(AppState::new(config));

    let launch_req = || {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/launch")
            .body(axum::body::Body::empty())
            .unwrap()
    };

    let res = app(state.clone(), None).oneshot(launch_req()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let first = body_json(res).await;
    assert_eq!(first["already_running"], false);

    let res = app(state.clone(), None).oneshot(launch_req()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let second = body_json(res).await;
    assert_eq!(second["already_running"], true, "second launch must reuse");
    assert_eq!(
        second["session_id"], first["session_id"],
        "second launch reported a different session"
    );

    let res = app(state.clone(), None)
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/quit")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app(state.clone(), None)
        .oneshot(
            axum::http::Request::builder()
                .uri("/api/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = body_json(res).await;
    assert_eq!(status["browser_running"], false, "quit left a session behind");
}

/// 2. Switching to an unknown handle fails NotFound and leaves the current
///    tab unchanged and fully usable.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_02_switch_to_unknown_handle_keeps_current() {
    let Some(gecko) = find_geckodriver() else { eprintln!("SKIP: no geckodriver"); return; };
    let Some(firefox) = find_firefox() else { eprintln!("SKIP: no Firefox"); return; };
    let (base, _srv) = spawn_test_server().await;

    let config = test_firefox_config(gecko, firefox);
    let mut session = BrowserSession::launch(&config).await.unwrap();

    let before = session.current_tab().map(str::to_string);
    assert!(before.is_some(), "launch must leave a current tab");

    let err = session.switch_tab("no-such-window").await.unwrap_err();
    assert!(
        matches!(err, ApiError::TabNotFound(_)),
        "expected TabNotFound, got: {err}"
    );
    assert_eq!(
        session.current_tab().map(str::to_string),
        before,
        "failed switch must not move the current tab"
    );

    // The current tab is still driveable
    let info = session.navigate(&format!("{}/", base)).await.unwrap();
    assert_eq!(info.title, "Foxbridge Test Page");

    session.quit().await;
}

/// 3. Closing the current tab leaves the session without a current tab;
///    navigation then fails until another tab is selected.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_03_close_current_tab_clears_current() {
    let Some(gecko) = find_geckodriver() else { eprintln!("SKIP: no geckodriver"); return; };
    let Some(firefox) = find_firefox() else { eprintln!("SKIP: no Firefox"); return; };
    let (base, _srv) = spawn_test_server().await;

    let config = test_firefox_config(gecko, firefox);
    let mut session = BrowserSession::launch(&config).await.unwrap();

    let first_handle = session.current_tab().unwrap().to_string();
    let other_url = format!("{}/other", base);
    let new_tab = session.open_tab(Some(other_url.as_str())).await.unwrap();
    assert!(new_tab.is_current);
    assert_ne!(new_tab.handle, first_handle);

    let remaining = session.close_tab(None).await.unwrap();
    assert_eq!(remaining, 1);
    assert!(
        session.current_tab().is_none(),
        "closing the current tab must leave no current tab"
    );

    let err = session.navigate(&format!("{}/", base)).await.unwrap_err();
    assert!(
        matches!(err, ApiError::NoCurrentTab),
        "navigate without a current tab must be refused, got: {err}"
    );

    // Selecting the surviving tab restores normal operation
    session.switch_tab(&first_handle).await.unwrap();
    let info = session.navigate(&format!("{}/", base)).await.unwrap();
    assert_eq!(info.title, "Foxbridge Test Page");

    session.quit().await;
}

/// 4. The last remaining tab cannot be closed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_04_last_tab_cannot_be_closed() {
    let Some(gecko) = find_geckodriver() else { eprintln!("SKIP: no geckodriver"); return; };
    let Some(firefox) = find_firefox() else { eprintln!("SKIP: no Firefox"); return; };

    let config = test_firefox_config(gecko, firefox);
    let mut session = BrowserSession::launch(&config).await.unwrap();

    let err = session.close_tab(None).await.unwrap_err();
    assert!(matches!(err, ApiError::LastTab), "expected LastTab, got: {err}");
    assert!(session.current_tab().is_some(), "refused close must keep the tab");

    session.quit().await;
}

/// 5. Script values come back unmodified as JSON.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_05_execute_script_returns_value() {
    let Some(gecko) = find_geckodriver() else { eprintln!("SKIP: no geckodriver"); return; };
    let Some(firefox) = find_firefox() else { eprintln!("SKIP: no Firefox"); return; };
    let (base, _srv) = spawn_test_server().await;

    let config = test_firefox_config(gecko, firefox);
    let session = BrowserSession::launch(&config).await.unwrap();

    let n = session.execute_script("return 2 + 2;").await.unwrap();
    assert_eq!(n, serde_json::json!(4));

    let obj = session
        .execute_script("return {a: 1, b: [1, 2, 3], s: 'hi'};")
        .await
        .unwrap();
    assert_eq!(obj, serde_json::json!({"a": 1, "b": [1, 2, 3], "s": "hi"}));

    // Scripts see the real DOM of the current tab
    session.navigate(&format!("{}/", base)).await.unwrap();
    let heading = session
        .execute_script("return document.getElementById('heading').textContent;")
        .await
        .unwrap();
    assert_eq!(heading, serde_json::json!("Hello from Foxbridge"));

    session.quit().await;
}

/// 6. A broken script surfaces as a script error, not a crash, and the
///    session stays usable.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_06_script_failure_is_reported() {
    let Some(gecko) = find_geckodriver() else { eprintln!("SKIP: no geckodriver"); return; };
    let Some(firefox) = find_firefox() else { eprintln!("SKIP: no Firefox"); return; };

    let config = test_firefox_config(gecko, firefox);
    let session = BrowserSession::launch(&config).await.unwrap();

    let err = session
        .execute_script("throw new Error('deliberate failure');")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Script(_)), "expected Script, got: {err}");

    let ok = session.execute_script("return 'still alive';").await.unwrap();
    assert_eq!(ok, serde_json::json!("still alive"));

    session.quit().await;
}
