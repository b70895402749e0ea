use super::{BackendError, ContributionStore, VoteBackend};
use crate::models::{Poll, TallyUpdate};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
struct Tallies {
    counts: HashMap<String, u64>,
    per_voter: HashMap<String, u32>,
    active: bool,
}

/// Authoritative vote counter kept in process.
///
/// Enforces the per-voter cap on its side and pushes a tally payload to every
/// subscriber whenever a count changes.
pub struct InMemoryBackend {
    poll_id: String,
    max_votes_per_voter: Option<u32>,
    tallies: Mutex<Tallies>,
    subscribers: Mutex<Vec<UnboundedSender<serde_json::Value>>>,
    fail_with: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn for_poll(poll: &Poll) -> Self {
        let counts = poll
            .options
            .iter()
            .map(|option| (option.id.clone(), option.votes))
            .collect();

        Self {
            poll_id: poll.id.clone(),
            max_votes_per_voter: poll.max_votes_per_voter,
            tallies: Mutex::new(Tallies {
                counts,
                per_voter: HashMap::new(),
                active: poll.is_active,
            }),
            subscribers: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<serde_json::Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Makes every following `cast_vote` reject with `message` until cleared.
    pub fn fail_with(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }

    pub fn deactivate(&self) {
        self.tallies.lock().unwrap_or_else(|e| e.into_inner()).active = false;
    }

    pub fn tally(&self, option_id: &str) -> u64 {
        self.tallies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .counts
            .get(option_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `cast_vote` calls received, accepted or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn publish(&self, update: &TallyUpdate) {
        let payload = update.to_payload();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Drop subscribers whose receiving side went away.
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
    }
}

#[async_trait]
impl VoteBackend for InMemoryBackend {
    async fn cast_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        voter_id: &str,
        _ip_address: &str,
    ) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.fail_with.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            warn!("Rejecting vote on {} by configuration: {}", option_id, message);
            return Err(BackendError::new(message));
        }
        if poll_id != self.poll_id {
            return Err(BackendError::new("Poll not found"));
        }

        let update = {
            let mut tallies = self.tallies.lock().unwrap_or_else(|e| e.into_inner());
            if !tallies.active {
                return Err(BackendError::new("This poll has ended"));
            }
            if !tallies.counts.contains_key(option_id) {
                return Err(BackendError::new("Poll option not found"));
            }
            let cast = tallies.per_voter.get(voter_id).copied().unwrap_or(0);
            if self.max_votes_per_voter.is_some_and(|cap| cast >= cap) {
                return Err(BackendError::new("Vote limit reached"));
            }

            tallies.per_voter.insert(voter_id.to_string(), cast + 1);
            let count = tallies.counts.entry(option_id.to_string()).or_insert(0);
            *count += 1;
            TallyUpdate::new(option_id, *count)
        };

        debug!("Recorded vote on {} (now {})", update.option_id, update.new_count);
        self.publish(&update);
        Ok(())
    }
}

/// Contribution store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    polls: Mutex<HashMap<String, HashMap<String, u32>>>,
}

#[async_trait]
impl ContributionStore for MemoryStore {
    async fn load_contributions(
        &self,
        poll_id: &str,
    ) -> Result<HashMap<String, u32>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .polls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(poll_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_contributions(
        &self,
        poll_id: &str,
        contributions: &HashMap<String, u32>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.polls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(poll_id.to_string(), contributions.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> Poll {
        let mut poll = Poll::new("Q".into(), vec!["a".into(), "b".into()], None, Some(2));
        poll.options[0].votes = 10;
        poll
    }

    #[tokio::test]
    async fn accepted_vote_is_published() {
        let poll = poll();
        let backend = InMemoryBackend::for_poll(&poll);
        let mut rx = backend.subscribe();
        let a = &poll.options[0].id;

        backend.cast_vote(&poll.id, a, "v1", "127.0.0.1").await.unwrap();

        assert_eq!(backend.tally(a), 11);
        let payload = rx.recv().await.unwrap();
        assert_eq!(TallyUpdate::from_payload(&payload).unwrap(), TallyUpdate::new(a.clone(), 11));
    }

    #[tokio::test]
    async fn cap_and_closure_are_enforced_with_text_reasons() {
        let poll = poll();
        let backend = InMemoryBackend::for_poll(&poll);
        let b = &poll.options[1].id;

        backend.cast_vote(&poll.id, b, "v1", "ip").await.unwrap();
        backend.cast_vote(&poll.id, b, "v1", "ip").await.unwrap();
        let err = backend.cast_vote(&poll.id, b, "v1", "ip").await.unwrap_err();
        assert_eq!(err.message, "Vote limit reached");

        backend.deactivate();
        let err = backend.cast_vote(&poll.id, b, "v2", "ip").await.unwrap_err();
        assert_eq!(err.message, "This poll has ended");
        assert_eq!(backend.calls(), 4);
        assert_eq!(backend.tally(b), 2);
    }

    #[tokio::test]
    async fn memory_store_round_trips_per_poll() {
        let store = MemoryStore::default();
        let mut ledger = HashMap::new();
        ledger.insert("a".to_string(), 2);

        store.save_contributions("p1", &ledger).await.unwrap();
        assert_eq!(store.load_contributions("p1").await.unwrap(), ledger);
        assert!(store.load_contributions("p2").await.unwrap().is_empty());
    }
}
