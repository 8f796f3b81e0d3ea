//! HTTP server exposing the recording endpoint.
//!
//! Routes:
//!   POST /api/cc_rosbag_recorder  → start or stop a recording
//!   GET  /api/status              → current recording state
//!   GET  /api/health              → health check

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use cc_recorder_common::protocol::{
    HealthResponse, RecordingRequest, RecordingResponse, StatusResponse, ENDPOINT_NAME,
};

use crate::controller::RecordingController;

/// The controller behind its request lock. Every request holds the lock for
/// its whole duration, so a start and a stop never interleave.
pub type SharedController = Arc<Mutex<RecordingController>>;

/// Shared state for route handlers.
#[derive(Clone)]
struct AppState {
    controller: SharedController,
    start_time: Instant,
}

/// Lock the controller. A panic in an earlier request leaves the state
/// usable, so poisoning is ignored.
pub fn lock(controller: &SharedController) -> MutexGuard<'_, RecordingController> {
    controller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn router(controller: SharedController) -> Router {
    let state = AppState {
        controller,
        start_time: Instant::now(),
    };

    Router::new()
        .route(&format!("/api/{ENDPOINT_NAME}"), post(record))
        .route("/api/status", get(status))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server. Blocks until shutdown.
pub async fn run(
    controller: SharedController,
    listen_addr: &str,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let app = router(controller);

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Registered {ENDPOINT_NAME} endpoint on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

// ── route handlers ───────────────────────────────────────────────────────

async fn record(
    State(state): State<AppState>,
    Json(request): Json<RecordingRequest>,
) -> Result<Json<RecordingResponse>, StatusCode> {
    // Stopping waits on the child, keep that off the async workers.
    let controller = state.controller.clone();
    let response = tokio::task::spawn_blocking(move || lock(&controller).handle(&request))
        .await
        .map_err(|e| {
            error!("Recording request task failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    info!("{}", response.recording_status);
    Ok(Json(response))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    // A stop in progress holds the lock while it waits on the child.
    let controller = state.controller.clone();
    let response = tokio::task::spawn_blocking(move || lock(&controller).status())
        .await
        .map_err(|e| {
            error!("Status task failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(response))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{controller, Call, FakeTools};

    fn state(name: &str, tools: &FakeTools) -> AppState {
        AppState {
            controller: Arc::new(Mutex::new(controller(name, tools))),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_record_start_then_stop() {
        let tools = FakeTools::default();
        let state = state("server_start_stop", &tools);

        let Json(started) = record(
            State(state.clone()),
            Json(RecordingRequest::start_topics(["/scan", "/odom"])),
        )
        .await
        .unwrap();
        assert!(started.recording_active);
        assert!(started
            .recording_status
            .starts_with("Started recording to rosbag file: cc_bag_"));

        let Json(current) = status(State(state.clone())).await.unwrap();
        assert!(current.recording_active);

        let Json(stopped) = record(State(state.clone()), Json(RecordingRequest::stop()))
            .await
            .unwrap();
        assert!(!stopped.recording_active);
        assert_eq!(
            stopped.recording_status,
            format!(
                "Finished recording to rosbag file: {}",
                current.active_bag_file_name
            )
        );
        assert!(tools.calls().contains(&Call::List));
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialised() {
        let tools = FakeTools::default();
        let state = state("server_concurrent", &tools);

        let mut handles = Vec::new();
        for i in 0..8 {
            let req = if i % 2 == 0 {
                RecordingRequest::start_default()
            } else {
                RecordingRequest::stop()
            };
            handles.push(tokio::spawn(record(State(state.clone()), Json(req))));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let calls = tools.calls();
        let spawns = calls
            .iter()
            .filter(|c| matches!(c, Call::Spawn { .. }))
            .count();
        assert_eq!(spawns, 4);
        assert_eq!(calls.iter().filter(|c| **c == Call::List).count(), 4);

        // the owned recording is always terminated before the next call
        for pair in calls.windows(2) {
            if let [Call::Spawn { .. }, next] = pair {
                assert!(matches!(next, Call::Terminate(_)), "{calls:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_status_waits_off_the_runtime() {
        let tools = FakeTools::default();
        let state = state("server_status_wait", &tools);

        // hold the controller lock the way a slow stop would
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let held = state.controller.clone();
        let holder = std::thread::spawn(move || {
            let _guard = lock(&held);
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let ticked = Arc::new(AtomicBool::new(false));
        let flag = ticked.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let Json(current) = status(State(state.clone())).await.unwrap();
        assert!(!current.recording_active);
        assert!(ticked.load(Ordering::Relaxed));
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let tools = FakeTools::default();
        let Json(h) = health(State(state("server_health", &tools))).await;
        assert_eq!(h.status, "ok");
    }
}
