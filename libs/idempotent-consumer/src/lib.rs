//! Transactional Inbox: deduplicated ingestion of external messages under a
//! composite natural key, causal-dependency-gated delivery, and partitioned
//! concurrent consumption with at-most-once processing per message.
//!
//! Message and record types, the subscriber contract and partition
//! strategies live in `messaging-contracts` and are shared with
//! `transactional-outbox`.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod repository;

pub use config::InboxConfig;
pub use engine::Inbox;
pub use error::{InboxError, InboxResult};
pub use metrics::InboxMetrics;
pub use repository::{InboxRepository, SqlxInboxRepository};
