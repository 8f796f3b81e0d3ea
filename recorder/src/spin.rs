//! Idle loop that keeps the service alive between requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Pause taken by the shutdown hook before handing back to `main`.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Tick every `interval` until `shutdown` is set, then run the shutdown hook.
pub async fn spin(interval: Duration, grace: Duration, shutdown: Arc<AtomicBool>) {
    info!("spin() every {}ms", interval.as_millis());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !shutdown.load(Ordering::Relaxed) {
        debug!("Sleeping: {} ns", interval.as_nanos());
        ticker.tick().await;
    }

    on_shutdown(grace).await;
}

async fn on_shutdown(grace: Duration) {
    info!("shutdown()");
    tokio::time::sleep(grace).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_spin_returns_after_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        tokio::time::timeout(
            Duration::from_secs(5),
            spin(Duration::from_millis(10), Duration::from_millis(20), shutdown),
        )
        .await
        .expect("spin did not stop");
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_spin_already_shut_down() {
        let shutdown = Arc::new(AtomicBool::new(true));
        tokio::time::timeout(
            Duration::from_secs(1),
            spin(Duration::from_secs(60), Duration::ZERO, shutdown),
        )
        .await
        .expect("spin ticked despite shutdown");
    }
}
