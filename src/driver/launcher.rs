//! Spawns geckodriver and waits for it to accept WebDriver connections.

use crate::config::schema::FirefoxConfig;
use crate::error::{FoxbridgeError, Result};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::process::{Child, Command};

static DRIVER_PORT_COUNTER: AtomicU16 = AtomicU16::new(4444);

/// Allocate the next geckodriver port.
/// Starts at 4444 and increments; wraps around at 65500.
pub fn allocate_driver_port() -> u16 {
    let port = DRIVER_PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    if port > 65500 {
        DRIVER_PORT_COUNTER.store(4444, Ordering::SeqCst);
        return 4444;
    }
    port
}

/// Build the geckodriver launch command
pub fn build_command(config: &FirefoxConfig, port: u16) -> Command {
    let mut cmd = Command::new(&config.geckodriver);
    cmd.arg("--port").arg(port.to_string());
    cmd.arg("--host").arg("127.0.0.1");
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);
    cmd
}

/// Kill geckodriver processes left behind by a previous run.
/// Only called before a fresh launch, when no session is tracked.
pub fn kill_stale_drivers() {
    let name = if cfg!(target_os = "windows") {
        "geckodriver.exe"
    } else {
        "geckodriver"
    };

    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());

    for process in system.processes_by_exact_name(name.as_ref()) {
        if process.kill() {
            tracing::warn!("Killed stale geckodriver process (PID {})", process.pid());
        }
    }
}

/// Spawn geckodriver on the given port
pub fn spawn(config: &FirefoxConfig, port: u16) -> Result<Child> {
    let mut cmd = build_command(config, port);
    tracing::info!("Launching geckodriver on port {} with command: {:?}", port, cmd);
    cmd.spawn().map_err(|e| {
        FoxbridgeError::Process(format!(
            "Failed to launch geckodriver from {:?}: {}",
            config.geckodriver, e
        ))
    })
}

/// Poll geckodriver's /status endpoint until it reports ready.
pub async fn wait_until_ready(port: u16, timeout: Duration) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/status", port);
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Ok(resp) = reqwest::get(&url).await {
            if resp.status().is_success() {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                if body["value"]["ready"].as_bool().unwrap_or(true) {
                    return Ok(());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(FoxbridgeError::Process(format!(
                "geckodriver on port {} did not become ready within {:?}",
                port, timeout
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
