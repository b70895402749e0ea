use crate::models::TallyUpdate;
use crate::reconciler::VoteReconciler;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Feeds pushed tally payloads into the session until the channel closes.
///
/// Payloads are narrowed here; anything that does not look like a tally is
/// logged and skipped.
pub async fn run_tally_listener(
    reconciler: Arc<VoteReconciler>,
    mut updates: UnboundedReceiver<serde_json::Value>,
) {
    info!("Listening for tally updates on poll {}", reconciler.poll_id());

    while let Some(payload) = updates.recv().await {
        match TallyUpdate::from_payload(&payload) {
            Ok(update) => {
                let delta = reconciler.observe_tally(&update);
                if delta > 0 {
                    debug!("{} new vote(s) from others on {}", delta, update.option_id);
                }
            }
            Err(e) => warn!("Ignoring tally payload {}: {}", payload, e),
        }
    }

    info!("Tally feed for poll {} closed", reconciler.poll_id());
}
