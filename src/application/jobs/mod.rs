//! Background work: supervision, stats recomputation, publication polling.

pub mod publications;
pub mod stats;
mod supervisor;

pub use publications::{PollSummary, PollerConfig, PublicationPoller, compose_publication_notice};
pub use stats::{RefreshDisposition, StatsConfig, StatsRecomputer};
pub use supervisor::{ShutdownOutcome, TaskSupervisor};
