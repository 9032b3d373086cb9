//! Error types for wallet recovery.
//!
//! Only configuration problems and migration failures are raised as errors.
//! Failures that happen while discovering funds are recorded on the
//! [`ScanResult`](crate::types::ScanResult) instead.

use thiserror::Error;

/// Main error type for the recovery engine.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Unknown path scheme: {0}")]
    UnknownScheme(String),

    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Chain client error: {0}")]
    Chain(#[from] ChainError),

    #[error("Transaction builder error: {0}")]
    TxBuilder(#[from] TxBuilderError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

/// Errors reported by a [`ChainClient`](crate::interface::ChainClient) or
/// [`BulkOperations`](crate::interface::BulkOperations) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Timeout occurred")]
    Timeout,
}

/// Errors reported by a [`KeyDeriver`](crate::interface::KeyDeriver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Key derivation failed: {0}")]
    Failed(String),

    #[error("Passphrase seeds are not supported by this deriver")]
    PassphraseUnsupported,
}

/// Errors reported by a [`TransactionBuilder`](crate::interface::TransactionBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxBuilderError {
    #[error("Build failed: {0}")]
    Build(String),

    #[error("Signing input {index} failed: {reason}")]
    Sign {
        index: usize,
        reason: String,
    },

    #[error("Broadcast failed: {0}")]
    Broadcast(String),
}

/// Errors that abort a migration. None of them leave a partial broadcast behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Scan result holds no funds to migrate")]
    NoFunds,

    #[error("Destination address is empty")]
    EmptyDestination,

    #[error("Invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("Migration plan has no sources")]
    EmptyPlan,

    #[error("Seed is empty")]
    EmptySeed,

    #[error("Amount is dust: fee {fee} >= total input {total_input}")]
    Dust {
        fee: u64,
        total_input: u64,
    },

    #[error("No spendable inputs found for plan sources")]
    NoInputs,

    #[error("Stale plan: {0}")]
    StalePlan(String),

    #[error("Chain client error: {0}")]
    Chain(#[from] ChainError),

    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxBuilderError),
}

/// Logging-related errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Subscriber initialization failed: {0}")]
    SubscriberInit(String),
}

/// Type alias for recovery engine results.
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Type alias for logging results.
pub type LoggingResult<T> = std::result::Result<T, LoggingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_error_display() {
        let err = RecoveryError::Config("gap limit must be greater than zero".to_string());
        assert_eq!(err.to_string(), "Configuration error: gap limit must be greater than zero");

        let err = MigrationError::Dust {
            fee: 10,
            total_input: 5,
        };
        assert_eq!(err.to_string(), "Amount is dust: fee 10 >= total input 5");
    }

    #[test]
    fn test_nested_conversions() {
        let err: MigrationError = TxBuilderError::Broadcast("rejected".to_string()).into();
        assert_matches!(err, MigrationError::Transaction(TxBuilderError::Broadcast(_)));

        let err: RecoveryError = err.into();
        assert!(err.to_string().contains("rejected"));

        let err: RecoveryError = DerivationError::PassphraseUnsupported.into();
        assert_matches!(err, RecoveryError::Derivation(DerivationError::PassphraseUnsupported));
    }
}
