//! cc rosbag recorder – starts and stops `rosbag record` on request.
//!
//! This binary:
//! 1. Reads configuration from `cc-recorder.conf`
//! 2. Creates this run's bag directory
//! 3. Serves the `cc_rosbag_recorder` endpoint over HTTP
//! 4. Idles until Ctrl-C / SIGTERM, then closes any open bag.

mod controller;
mod rosbag;
mod server;
mod spin;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::info;

use cc_recorder_common::config::{self, Config};

use crate::controller::RecordingController;
use crate::rosbag::RosCli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default_path().to_string());
    let config = config::load(&PathBuf::from(&config_path)).context("Config load failed")?;

    info!(
        "cc rosbag recorder starting (listen={})",
        config.listen_addr
    );

    // ── controller ───────────────────────────────────────────────────
    let mut controller =
        RecordingController::new(&config, Box::new(RosCli::from_config(&config)));
    controller.activate(&config)?;
    info!("Bags go to {}", controller.output_dir().display());
    let controller: server::SharedController = Arc::new(Mutex::new(controller));

    // ── ctrl-c ───────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        signal_flag.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── endpoint ─────────────────────────────────────────────────────
    let server_controller = controller.clone();
    let server_shutdown = shutdown.clone();
    let listen_addr = config.listen_addr.clone();
    let server_handle = tokio::spawn(async move {
        let result = server::run(server_controller, &listen_addr, server_shutdown.clone()).await;
        if let Err(e) = &result {
            tracing::error!("HTTP server error: {e:#}");
            server_shutdown.store(true, Ordering::Relaxed);
        }
        result
    });

    // ── idle until shutdown ──────────────────────────────────────────
    spin::spin(config.tick_interval(), spin::SHUTDOWN_GRACE, shutdown).await;

    // Close any open bag before exiting
    let closing = controller.clone();
    tokio::task::spawn_blocking(move || server::lock(&closing).shutdown())
        .await
        .context("Shutdown task failed")?;

    server_handle.await.context("HTTP server task failed")??;

    info!("cc rosbag recorder stopped");
    Ok(())
}
