use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Per-voter cap; `None` means unlimited votes.
    pub max_votes_per_voter: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: u64,
}

/// One or more votes attributed to a key at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteEvent {
    pub time: DateTime<Utc>,
    pub count: u32,
}

/// Authoritative tally for one option, as pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyUpdate {
    #[serde(alias = "optionId")]
    pub option_id: String,
    #[serde(alias = "newCount")]
    pub new_count: u64,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed tally payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("tally payload has an empty option id")]
    EmptyOptionId,
}

impl TallyUpdate {
    pub fn new(option_id: impl Into<String>, new_count: u64) -> Self {
        Self {
            option_id: option_id.into(),
            new_count,
        }
    }

    /// Narrows a raw subscription payload into a tally update.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, PayloadError> {
        let update: TallyUpdate = serde_json::from_value(payload.clone())?;
        if update.option_id.trim().is_empty() {
            return Err(PayloadError::EmptyOptionId);
        }
        Ok(update)
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "option_id": self.option_id,
            "new_count": self.new_count,
        })
    }
}

/// Time left before a poll closes, broken into display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl TimeRemaining {
    /// `None` once `ends_at` is reached.
    pub fn until(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Self> {
        if ends_at <= now {
            return None;
        }
        Some(Self::from_seconds((ends_at - now).num_seconds()))
    }

    fn from_seconds(total: i64) -> Self {
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Leading zero units are dropped; seconds are always shown.
        let mut parts = Vec::new();
        if self.days > 0 {
            parts.push(format!("{}d", self.days));
        }
        if self.days > 0 || self.hours > 0 {
            parts.push(format!("{}h", self.hours));
        }
        if self.days > 0 || self.hours > 0 || self.minutes > 0 {
            parts.push(format!("{}m", self.minutes));
        }
        parts.push(format!("{}s", self.seconds));
        write!(f, "{}", parts.join(" "))
    }
}

impl Poll {
    pub fn new(
        question: String,
        options: Vec<String>,
        duration_minutes: Option<i64>,
        max_votes_per_voter: Option<u32>,
    ) -> Self {
        let now = Utc::now();
        let ends_at = duration_minutes.map(|mins| now + chrono::Duration::minutes(mins));

        let options = options
            .into_iter()
            .map(|text| PollOption {
                id: Uuid::new_v4().to_string(),
                text,
                votes: 0,
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            question,
            options,
            created_at: now,
            ends_at,
            is_active: true,
            max_votes_per_voter,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    /// Whether the poll still accepts votes at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// `None` for polls without an end time and for polls that already ended.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<TimeRemaining> {
        TimeRemaining::until(self.ends_at?, now)
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|option| option.votes).sum()
    }
}
