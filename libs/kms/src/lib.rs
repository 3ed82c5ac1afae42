//! Per-tenant Key-Encryption-Key lifecycle. Two interchangeable
//! implementations of [`KeyManagementService`]: a PostgreSQL-backed default
//! ([`PostgresKms`]) and a Vault Transit-backed variant ([`VaultKms`]) for
//! deployments that keep key material outside the application database.

pub mod config;
pub mod error;
pub mod repository;
pub mod service;
pub mod vault;

pub use config::KmsConfig;
pub use error::{KmsError, KmsResult};
pub use repository::{KekRow, KmsRepository, SqlxKmsRepository};
pub use service::{KeyManagementService, PostgresKms};
pub use vault::{VaultKms, VaultKmsConfig};
