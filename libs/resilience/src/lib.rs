/// Resilience patterns used by the Vault-backed KMS variant's HTTP calls.
///
/// - **Circuit Breaker**: fails fast once the Vault Transit endpoint's
///   error rate crosses a threshold, instead of piling up timeouts.
/// - **Timeout**: bounds how long a wrap/unwrap call can take.
/// - **Retry**: exponential backoff with jitter for transient failures.
/// - **Preset Configurations**: pre-tuned settings for the Vault call path.
///
/// # Example
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::vault_kms_config();
///     let circuit_breaker = CircuitBreaker::new(config.circuit_breaker);
///
///     let result = circuit_breaker.call(|| async {
///         // Vault Transit HTTP call here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{vault_kms_config, ServiceConfig};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
