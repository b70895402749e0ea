//! Optimistic vote registration for one poll-viewing session.
//!
//! A vote is applied to the local momentum estimate and to the baseline tally
//! before the remote mutation is issued. When the backend later pushes the
//! authoritative count, only the part of the increase that exceeds the
//! baseline is attributed to other voters, so the local vote is counted once.

use crate::backend::{ContributionStore, IpResolver, VoteBackend};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::VoteError;
use crate::models::{Poll, TallyUpdate, TimeRemaining};
use crate::rate::RateCalculator;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Address sent along with votes when the lookup fails.
pub const UNKNOWN_IP: &str = "unknown";

/// The services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn VoteBackend>,
    pub store: Arc<dyn ContributionStore>,
    pub ip_resolver: Arc<dyn IpResolver>,
    pub clock: Arc<dyn Clock>,
}

struct SessionState {
    rates: RateCalculator<String>,
    baselines: HashMap<String, u64>,
    ledger: HashMap<String, u32>,
}

pub struct VoteReconciler {
    poll_id: String,
    option_ids: Vec<String>,
    ends_at: Option<DateTime<Utc>>,
    max_votes_per_voter: Option<u32>,
    active: AtomicBool,
    voter_id: String,
    cooldown: Duration,
    in_flight: Arc<AtomicBool>,
    ip_address: OnceCell<String>,
    collaborators: Collaborators,
    state: Mutex<SessionState>,
}

/// Holds the vote lock; releases it once the cooldown has elapsed.
struct LockGuard {
    flag: Arc<AtomicBool>,
    cooldown: Duration,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let flag = Arc::clone(&self.flag);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.cooldown.is_zero() => {
                let cooldown = self.cooldown;
                handle.spawn(async move {
                    tokio::time::sleep(cooldown).await;
                    flag.store(false, Ordering::Release);
                });
            }
            _ => flag.store(false, Ordering::Release),
        }
    }
}

impl VoteReconciler {
    /// Starts a session: seeds baselines from the poll's tallies and loads this
    /// device's contribution ledger.
    pub async fn open(
        poll: &Poll,
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> Result<Self, VoteError> {
        let ledger = collaborators
            .store
            .load_contributions(&poll.id)
            .await
            .map_err(|e| {
                error!("Failed to load contributions for poll {}: {}", poll.id, e);
                VoteError::Storage(e.to_string())
            })?;

        let baselines = poll
            .options
            .iter()
            .map(|option| (option.id.clone(), option.votes))
            .collect();

        info!(
            "Opened voting session on poll {} for voter {} ({} prior votes)",
            poll.id,
            config.voter_id,
            ledger.values().sum::<u32>()
        );

        Ok(Self {
            poll_id: poll.id.clone(),
            option_ids: poll.options.iter().map(|option| option.id.clone()).collect(),
            ends_at: poll.ends_at,
            max_votes_per_voter: poll.max_votes_per_voter,
            active: AtomicBool::new(poll.is_active),
            voter_id: config.voter_id,
            cooldown: config.cooldown,
            in_flight: Arc::new(AtomicBool::new(false)),
            ip_address: OnceCell::new(),
            state: Mutex::new(SessionState {
                rates: RateCalculator::with_clock(
                    config.rate_window_ms,
                    Arc::clone(&collaborators.clock),
                ),
                baselines,
                ledger,
            }),
            collaborators,
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers one vote from the local voter.
    ///
    /// Closed polls and exhausted caps are rejected before anything is sent.
    /// A gesture arriving while another one is in flight or cooling down gets
    /// [`VoteError::LockRejected`], which callers should swallow.
    pub async fn register_vote(&self, option_id: &str) -> Result<(), VoteError> {
        if !self.is_open() {
            info!("Vote on closed poll {} rejected", self.poll_id);
            return Err(VoteError::PollClosed);
        }
        // Local check: the service is never contacted for an option this poll lacks.
        if !self.option_ids.iter().any(|id| id == option_id) {
            warn!(
                "Vote for unknown option {} on poll {} rejected locally",
                option_id, self.poll_id
            );
            return Err(VoteError::Transport("Poll option not found".to_string()));
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Vote on {} dropped: another vote is in flight", option_id);
            return Err(VoteError::LockRejected);
        }
        let _lock = LockGuard {
            flag: Arc::clone(&self.in_flight),
            cooldown: self.cooldown,
        };

        {
            let mut state = self.state();
            if let Some(cap) = self.max_votes_per_voter {
                let cast: u32 = state.ledger.values().sum();
                if cast >= cap {
                    info!("Voter {} reached the cap of {} on poll {}", self.voter_id, cap, self.poll_id);
                    return Err(VoteError::LimitReached);
                }
            }

            // The baseline moves before the request goes out, so the push that
            // confirms this vote carries no delta.
            state.rates.add_vote(&option_id.to_string());
            let baseline = state.baselines.entry(option_id.to_string()).or_insert(0);
            *baseline += 1;
        }

        let ip_address = self.client_ip().await;
        let outcome = self
            .collaborators
            .backend
            .cast_vote(&self.poll_id, option_id, &self.voter_id, &ip_address)
            .await;

        if let Err(e) = outcome {
            let classified = VoteError::from_rejection(&e.message);
            warn!("Vote on {} for poll {} failed: {}", option_id, self.poll_id, e);
            if classified == VoteError::PollClosed {
                self.close();
            }
            return Err(classified);
        }

        let ledger = {
            let mut state = self.state();
            *state.ledger.entry(option_id.to_string()).or_insert(0) += 1;
            state.ledger.clone()
        };
        if let Err(e) = self
            .collaborators
            .store
            .save_contributions(&self.poll_id, &ledger)
            .await
        {
            // The ledger only feeds the "you voted N times" display.
            error!("Failed to persist contributions for poll {}: {}", self.poll_id, e);
        }

        info!("Recorded vote: poll_id={}, option_id={}", self.poll_id, option_id);
        Ok(())
    }

    /// Folds an authoritative tally into the session and returns the number of
    /// votes attributed to other voters.
    ///
    /// The first tally seen for an option only establishes its baseline.
    pub fn observe_tally(&self, update: &TallyUpdate) -> u64 {
        let mut state = self.state();
        let delta = match state.baselines.get(&update.option_id).copied() {
            Some(baseline) if update.new_count > baseline => update.new_count - baseline,
            _ => 0,
        };
        if delta > 0 {
            state
                .rates
                .add_votes(&update.option_id, i64::try_from(delta).unwrap_or(i64::MAX));
        }
        state
            .baselines
            .insert(update.option_id.clone(), update.new_count);
        delta
    }

    /// Votes per second on `option_id` over the trailing window.
    pub fn get_rate(&self, option_id: &str) -> f64 {
        self.state().rates.get_rate(&option_id.to_string())
    }

    /// Rates for every option of the poll, in poll order.
    pub fn momentum(&self) -> Vec<(String, f64)> {
        let mut state = self.state();
        self.option_ids
            .iter()
            .map(|id| (id.clone(), state.rates.get_rate(id)))
            .collect()
    }

    /// Last known tally per option, including optimistic increments.
    pub fn tallies(&self) -> HashMap<String, u64> {
        self.state().baselines.clone()
    }

    pub fn baseline(&self, option_id: &str) -> Option<u64> {
        self.state().baselines.get(option_id).copied()
    }

    pub fn user_votes(&self, option_id: &str) -> u32 {
        self.state().ledger.get(option_id).copied().unwrap_or(0)
    }

    pub fn user_total(&self) -> u32 {
        self.state().ledger.values().sum()
    }

    /// `None` when the poll has no per-voter cap.
    pub fn remaining_votes(&self) -> Option<u32> {
        let cap = self.max_votes_per_voter?;
        Some(cap.saturating_sub(self.user_total()))
    }

    pub fn is_open(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        let now = self.collaborators.clock.now();
        self.ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    /// Marks the session closed; later votes fail with [`VoteError::PollClosed`].
    pub fn close(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            info!("Poll {} closed", self.poll_id);
        }
    }

    pub fn time_remaining(&self) -> Option<TimeRemaining> {
        TimeRemaining::until(self.ends_at?, self.collaborators.clock.now())
    }

    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }

    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    // A failed lookup is not cached, so the next vote tries again.
    async fn client_ip(&self) -> String {
        let resolver = &self.collaborators.ip_resolver;
        match self
            .ip_address
            .get_or_try_init(|| async { resolver.resolve().await })
            .await
        {
            Ok(ip) => ip.clone(),
            Err(e) => {
                warn!("Client IP lookup failed: {}", e);
                UNKNOWN_IP.to_string()
            }
        }
    }
}
