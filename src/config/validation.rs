//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, factors >= 1, URLs parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ExecutorConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::ExecutorConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every section, collecting all problems.
pub fn validate_config(config: &ExecutorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.queue.interval_ms == 0 {
        errors.push(ValidationError::new("queue.interval_ms", "must be positive"));
    }
    if config.queue.max_invocations_per_interval == 0 {
        errors.push(ValidationError::new(
            "queue.max_invocations_per_interval",
            "must allow at least one invocation",
        ));
    }
    if config.queue.max_concurrency == Some(0) {
        errors.push(ValidationError::new("queue.max_concurrency", "must be positive"));
    }

    if config.submission.timeout_ms == 0 {
        errors.push(ValidationError::new("submission.timeout_ms", "must be positive"));
    }
    if config.submission.default_gas_limit == 0 {
        errors.push(ValidationError::new("submission.default_gas_limit", "must be positive"));
    }
    if !(config.submission.max_gas_price_gwei > 0.0) {
        errors.push(ValidationError::new("submission.max_gas_price_gwei", "must be positive"));
    }

    let ledger = &config.ledger;
    if url::Url::parse(&ledger.rpc_url).is_err() {
        errors.push(ValidationError::new(
            "ledger.rpc_url",
            format!("'{}' is not a valid URL", ledger.rpc_url),
        ));
    }
    for (i, failover) in ledger.failover_urls.iter().enumerate() {
        if url::Url::parse(failover).is_err() {
            errors.push(ValidationError::new(
                &format!("ledger.failover_urls[{}]", i),
                format!("'{}' is not a valid URL", failover),
            ));
        }
    }
    if ledger.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("ledger.rpc_timeout_secs", "must be positive"));
    }
    if ledger.receipt_backoff_factor < 1.0 {
        errors.push(ValidationError::new(
            "ledger.receipt_backoff_factor",
            "must be at least 1.0",
        ));
    }
    if ledger.receipt_min_backoff_ms > ledger.receipt_max_backoff_ms {
        errors.push(ValidationError::new(
            "ledger.receipt_min_backoff_ms",
            "must not exceed receipt_max_backoff_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ExecutorConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ExecutorConfig::default();
        config.queue.max_concurrency = Some(0);
        config.submission.timeout_ms = 0;
        config.ledger.rpc_url = "nope".to_string();
        config.ledger.failover_urls = vec!["also nope".to_string()];
        config.ledger.receipt_backoff_factor = 0.5;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "queue.max_concurrency",
                "submission.timeout_ms",
                "ledger.rpc_url",
                "ledger.failover_urls[0]",
                "ledger.receipt_backoff_factor",
            ]
        );
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ExecutorConfig::default();
        config.observability.metrics_address = "localhost".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
