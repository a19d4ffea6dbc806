//! Database layer for the Rescue queue store

mod connection;
mod migrations;
mod queue_repository;

pub use connection::Database;
pub use queue_repository::{DrainLease, LeaseOutcome, LibSqlQueueRepository, QueueRepository};
