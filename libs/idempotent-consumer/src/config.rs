//! Inbox engine configuration.

use std::sync::Arc;

use messaging_contracts::{PartitionKeyStrategy, UriPartitionStrategy};

#[derive(Clone)]
pub struct InboxConfig {
    pub table: String,
    pub sequence: String,
    pub partition: Arc<dyn PartitionKeyStrategy>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            table: "inbox".to_string(),
            sequence: "inbox_processed_position_seq".to_string(),
            partition: Arc::new(UriPartitionStrategy),
        }
    }
}

impl InboxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            table: std::env::var("INBOX_TABLE").unwrap_or(defaults.table),
            sequence: std::env::var("INBOX_SEQUENCE").unwrap_or(defaults.sequence),
            partition: defaults.partition,
        }
    }

    pub fn with_partition(mut self, partition: Arc<dyn PartitionKeyStrategy>) -> Self {
        self.partition = partition;
        self
    }
}
