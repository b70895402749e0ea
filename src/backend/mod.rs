pub mod memory;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// A rejected remote call, carrying whatever text the service sent back.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The remote mutation that records a vote.
#[async_trait]
pub trait VoteBackend: Send + Sync {
    async fn cast_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        voter_id: &str,
        ip_address: &str,
    ) -> Result<(), BackendError>;
}

/// Looks up the client's public address, attached to every vote.
#[async_trait]
pub trait IpResolver: Send + Sync {
    async fn resolve(&self) -> Result<String, BackendError>;
}

/// Resolver that always answers with a fixed address.
pub struct StaticIp(pub String);

#[async_trait]
impl IpResolver for StaticIp {
    async fn resolve(&self) -> Result<String, BackendError> {
        Ok(self.0.clone())
    }
}

/// Durable per-device record of how many votes this voter cast on each option.
#[async_trait]
pub trait ContributionStore: Send + Sync {
    async fn load_contributions(
        &self,
        poll_id: &str,
    ) -> Result<HashMap<String, u32>, Box<dyn std::error::Error + Send + Sync>>;

    async fn save_contributions(
        &self,
        poll_id: &str,
        contributions: &HashMap<String, u32>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
