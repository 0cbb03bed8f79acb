//! Gateway daemon for assessd
//!
//! Hosts the session registry and rate limiter behind the HTTP router, runs
//! their sweepers, and shuts everything down cleanly on SIGINT/SIGTERM.

use crate::config::Config;
use crate::http::{AppState, router};
use crate::rate_limit::RateLimiter;
use crate::session::SessionRegistry;
use crate::utils::{AssessError, Clock, SystemClock};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MEMORY_WARNING_THRESHOLD_MB: u64 = 200;
const MEMORY_CHECK_INTERVAL_SECS: u64 = 60;
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Builds the shared components for one process
pub fn build_state(config: &Config, clock: Arc<dyn Clock>) -> AppState {
    let sessions = SessionRegistry::new(config.session, Arc::clone(&clock));
    let limiter = RateLimiter::new(config.rate_limit.clone(), clock);
    AppState::new(sessions, limiter)
}

/// Runs the gateway daemon until a shutdown signal arrives.
///
/// This function:
/// 1. Builds the session registry and rate limiter
/// 2. Starts both sweepers and the memory monitor
/// 3. Serves HTTP on the configured address
/// 4. Handles SIGTERM/SIGINT for graceful shutdown
pub async fn run_gateway(config: &Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.bind_addr,
        "Starting assessd gateway daemon"
    );

    let state = build_state(config, Arc::new(SystemClock));

    let (session_sweep_handle, session_sweep_shutdown) = state.sessions.start_sweep_task();
    info!(
        interval_secs = config.session.sweep_interval_secs,
        window_secs = config.session.window_secs,
        "Session sweeper started"
    );

    let (limiter_sweep_handle, limiter_sweep_shutdown) = state.limiter.start_sweep_task();
    info!(
        interval_secs = config.rate_limit.sweep_interval_secs,
        routes = config.rate_limit.routes.len(),
        trust_forwarded_for = config.rate_limit.trust_forwarded_for,
        "Rate-limit sweeper started"
    );

    let (memory_handle, memory_shutdown) = start_memory_monitor();

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| AssessError::server(config.bind_addr.clone(), e.to_string()))
        .context("Failed to bind HTTP listener")?;
    info!(
        "Gateway daemon listening on {}. Press Ctrl+C to stop.",
        config.bind_addr
    );

    let app = router(state.clone());
    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = &serve_result {
        error!("HTTP server error: {}", e);
    }

    // Graceful shutdown sequence
    info!("Starting graceful shutdown sequence...");
    stop_task("session sweeper", session_sweep_handle, session_sweep_shutdown).await;
    stop_task("rate-limit sweeper", limiter_sweep_handle, limiter_sweep_shutdown).await;
    stop_task("memory monitor", memory_handle, memory_shutdown).await;

    info!(
        sessions_dropped = state.sessions.len().await,
        counters_dropped = state.limiter.len().await,
        "Gateway daemon stopped gracefully; in-memory state discarded"
    );

    serve_result.context("HTTP server failed")
}

/// Resolves once SIGINT or SIGTERM is received
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to set up signal handlers: {}", e);
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Signals a background task to stop and waits for it, bounded by a timeout
async fn stop_task(name: &str, handle: JoinHandle<()>, shutdown: mpsc::Sender<()>) {
    info!("Signaling {} to stop...", name);
    let _ = shutdown.send(()).await;

    match tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), handle).await {
        Ok(Ok(())) => {
            info!("{} completed gracefully", name);
        }
        Ok(Err(e)) => {
            error!("{} panicked: {}", name, e);
        }
        Err(_) => {
            error!(
                "{} did not complete within {}s timeout",
                name, SHUTDOWN_TIMEOUT_SECS
            );
        }
    }
}

/// Periodically logs process memory; abandoned sessions are the main growth source
fn start_memory_monitor() -> (JoinHandle<()>, mpsc::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        use sysinfo::{ProcessesToUpdate, System, get_current_pid};

        let mut system = System::new();
        let current_pid = match get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                error!(
                    "Failed to get current PID for memory monitoring: {}. Memory monitoring disabled.",
                    e
                );
                // Still honor the shutdown signal
                let _ = shutdown_rx.recv().await;
                return;
            }
        };
        let mut interval = tokio::time::interval(Duration::from_secs(MEMORY_CHECK_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    system.refresh_processes(ProcessesToUpdate::Some(&[current_pid]), true);
                    if let Some(process) = system.process(current_pid) {
                        let memory_mb = process.memory() / (1024 * 1024);
                        if memory_mb > MEMORY_WARNING_THRESHOLD_MB {
                            warn!(memory_mb = memory_mb, threshold_mb = MEMORY_WARNING_THRESHOLD_MB, "Memory usage exceeds threshold");
                        } else {
                            debug!(memory_mb = memory_mb, "Current memory usage");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Memory monitoring task received shutdown signal");
                    break;
                }
            }
        }
    });

    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    #[tokio::test]
    async fn test_build_state_shares_clock_and_config() {
        let mut config = Config::default();
        config.session.window_secs = 60;
        let clock = ManualClock::starting_now();

        let state = build_state(&config, Arc::new(clock.clone()));
        let id = state.sessions.create("assessment", None).await.unwrap();

        clock.advance(chrono::Duration::seconds(61));
        assert!(!state.sessions.validate(&id).await);
        assert_eq!(state.limiter.config().routes.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_task_waits_for_shutdown() {
        let (handle, shutdown) = start_memory_monitor();
        stop_task("memory monitor", handle, shutdown).await;
    }

    #[tokio::test]
    async fn test_gateway_command_available() {
        use crate::cli::Cli;
        use clap::CommandFactory;

        let cmd = Cli::command();
        let subcommands: Vec<_> = cmd
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        assert!(
            subcommands.contains(&"serve".to_string()),
            "Serve command should be available"
        );
    }
}
