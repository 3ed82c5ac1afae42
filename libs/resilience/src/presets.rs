/// Preset configuration for the Vault-backed KMS variant's HTTP calls.
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a service type.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: Option<RetryConfig>,
}

/// Vault Transit-engine HTTP calls (key wrap/unwrap, key rotation).
///
/// - Timeout: 5s (Vault should respond fast; callers are in the hot path
///   of decrypting/encrypting a DEK)
/// - Circuit breaker: 5 failures, 30s cooldown
/// - Retry: 3 attempts with exponential backoff (wrap/unwrap is idempotent)
pub fn vault_kms_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(5),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            error_rate_threshold: 0.5,
            window_size: 100,
        },
        retry: Some(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_kms_config() {
        let config = vault_kms_config();
        assert_eq!(config.timeout.duration, Duration::from_secs(5));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.retry.is_some());
    }
}
