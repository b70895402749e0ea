//! Live vote momentum for Versus polls.
//!
//! [`rate::RateCalculator`] estimates votes per second over a trailing
//! window; [`reconciler::VoteReconciler`] registers the local voter's votes
//! optimistically and folds authoritative tallies back in without counting
//! those votes twice.

pub mod backend;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rate;
pub mod reconciler;
pub mod standings;
pub mod tasks;

pub use error::VoteError;
pub use reconciler::{Collaborators, VoteReconciler};
