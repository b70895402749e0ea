use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub const LIMIT_REACHED_MESSAGE: &str = "You've reached the maximum number of votes for this poll";

/// Why a vote gesture did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("vote limit reached")]
    LimitReached,

    #[error("poll is closed")]
    PollClosed,

    #[error("vote failed: {0}")]
    Transport(String),

    /// Another vote from this session is still in flight or cooling down.
    #[error("vote ignored while another vote is in flight")]
    LockRejected,

    #[error("contribution ledger unavailable: {0}")]
    Storage(String),
}

impl VoteError {
    /// Classifies the message of a rejected remote mutation.
    ///
    /// The backend reports limit and expiry violations as plain text, so they
    /// are mapped back onto the local kinds; everything else is a transport failure.
    pub fn from_rejection(message: &str) -> Self {
        lazy_static! {
            // Only the per-voter cap; rate limiting by the transport is retryable.
            static ref LIMIT: Regex =
                Regex::new(r"(?i)\b(vote limit|maximum number of votes)\b").unwrap();
            // Only the poll itself; a closed connection is a transport failure.
            static ref CLOSED: Regex = Regex::new(
                r"(?i)\bpoll (has ended|has expired|is closed|is no longer active|is not active|is inactive)\b"
            )
            .unwrap();
        }

        if LIMIT.is_match(message) {
            VoteError::LimitReached
        } else if CLOSED.is_match(message) {
            VoteError::PollClosed
        } else if message.trim().is_empty() {
            VoteError::Transport("Failed to register vote".to_string())
        } else {
            VoteError::Transport(message.trim().to_string())
        }
    }

    /// Debounced gestures are never shown to the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, VoteError::LockRejected)
    }

    /// Transient status text for the voting view.
    ///
    /// Closed polls get their own view instead of an inline message.
    pub fn user_message(&self) -> Option<String> {
        match self {
            VoteError::LimitReached => Some(LIMIT_REACHED_MESSAGE.to_string()),
            VoteError::Transport(message) => Some(message.clone()),
            VoteError::Storage(message) => Some(message.clone()),
            VoteError::PollClosed | VoteError::LockRejected => None,
        }
    }
}
