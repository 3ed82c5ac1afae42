//! DEK store configuration.

#[derive(Debug, Clone)]
pub struct DekStoreConfig {
    pub table: String,
    pub algorithm: String,
}

impl Default for DekStoreConfig {
    fn default() -> Self {
        Self {
            table: "stream_deks".to_string(),
            algorithm: "AES-256-GCM".to_string(),
        }
    }
}

impl DekStoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            table: std::env::var("DEK_STORE_TABLE").unwrap_or(defaults.table),
            algorithm: std::env::var("DEK_STORE_ALGORITHM").unwrap_or(defaults.algorithm),
        }
    }
}
