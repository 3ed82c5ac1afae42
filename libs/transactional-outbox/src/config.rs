//! Outbox engine configuration.

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub outbox_table: String,
    pub offsets_table: String,
    pub batch_size: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            outbox_table: "outbox".to_string(),
            offsets_table: "outbox_offsets".to_string(),
            batch_size: 100,
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            outbox_table: std::env::var("OUTBOX_TABLE").unwrap_or(defaults.outbox_table),
            offsets_table: std::env::var("OUTBOX_OFFSETS_TABLE").unwrap_or(defaults.offsets_table),
            batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
        }
    }
}
