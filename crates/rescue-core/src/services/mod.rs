//! Shared services used by the queue, the sync engine, and the CLI.

mod queue_store;

pub use queue_store::QueueStore;
