use crate::reconciler::VoteReconciler;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Closes the session once the poll's end time has passed.
///
/// Returns when the session is closed, whether by expiry or by someone else.
pub async fn watch_poll_expiry(reconciler: Arc<VoteReconciler>, check_every: Duration) {
    info!("Watching poll {} for expiry", reconciler.poll_id());
    let mut interval = interval(check_every);

    loop {
        interval.tick().await;

        if reconciler.is_expired() {
            info!("Poll {} reached its end time", reconciler.poll_id());
            reconciler.close();
            return;
        }
        if !reconciler.is_open() {
            debug!("Poll {} closed before its end time", reconciler.poll_id());
            return;
        }
        if let Some(left) = reconciler.time_remaining() {
            debug!("Poll {} closes in {}", reconciler.poll_id(), left);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::session_with_clock;

    #[tokio::test(start_paused = true)]
    async fn closes_session_after_end_time() {
        let (reconciler, clock, _fixture) = session_with_clock(None, Some(chrono::Duration::seconds(3))).await;
        let reconciler = Arc::new(reconciler);

        let watcher = tokio::spawn(watch_poll_expiry(Arc::clone(&reconciler), Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(reconciler.is_open());

        clock.advance_millis(3000);
        watcher.await.unwrap();
        assert!(!reconciler.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_closed_elsewhere() {
        let (reconciler, _clock, _fixture) = session_with_clock(None, None).await;
        let reconciler = Arc::new(reconciler);

        reconciler.close();
        watch_poll_expiry(Arc::clone(&reconciler), Duration::from_secs(1)).await;
        assert!(!reconciler.is_open());
    }
}
