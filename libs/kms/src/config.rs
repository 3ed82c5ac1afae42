//! KMS configuration.

#[derive(Debug, Clone)]
pub struct KmsConfig {
    /// Table holding wrapped KEK rows.
    pub table: String,
    /// Named cipher suite used to wrap KEKs under the master key.
    pub master_algorithm: String,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            table: "kms_keys".to_string(),
            master_algorithm: "AES-256-GCM".to_string(),
        }
    }
}

impl KmsConfig {
    /// Reads overrides from `KMS_TABLE` / `KMS_MASTER_ALGORITHM`, falling
    /// back to defaults when unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            table: std::env::var("KMS_TABLE").unwrap_or(defaults.table),
            master_algorithm: std::env::var("KMS_MASTER_ALGORITHM")
                .unwrap_or(defaults.master_algorithm),
        }
    }
}
