//! Multi-scheme fund discovery and migration for HD wallets.
//!
//! Given a wallet seed, this library finds every address holding funds across
//! the derivation conventions wallet applications have used over the years,
//! and consolidates those funds into a single destination:
//!
//! - Gap-limit discovery over a catalog of derivation schemes
//! - Concurrent scanning of schemes on a bounded worker pool
//! - Optional batched chain queries
//! - Extended recovery for wallets with long runs of unused addresses
//! - Fee-aware migration planning and execution against live chain state
//!
//! Key derivation, chain access and transaction mechanics are supplied by the
//! caller through the traits in [`interface`].
//!
//! # Quick Start
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use key_wallet_recovery::interface::{ChainClient, KeyDeriver, TransactionBuilder};
//! use key_wallet_recovery::{
//!     Migrator, ParallelScanner, ScanOptions, Seed, create_migration_plan,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(
//! #     client: Arc<dyn ChainClient>,
//! #     deriver: Arc<dyn KeyDeriver>,
//! #     builder: Arc<dyn TransactionBuilder>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let seed = Seed::from_hex("000102030405060708090a0b0c0d0e0f")?;
//! let options = ScanOptions::default().with_gap_limit(20);
//!
//! let scanner = ParallelScanner::new(client.clone(), deriver.clone(), options);
//! let result = scanner.scan_parallel(&seed, &CancellationToken::new()).await?;
//!
//! if result.has_funds() {
//!     let plan = create_migration_plan(&result, "XdestinationAddress", 0)?;
//!     let migrator = Migrator::new(client, deriver, builder);
//!     migrator.validate_plan(&plan).await?;
//!     let migrated = migrator.execute(&seed, &plan).await?;
//!     println!("broadcast {}", migrated.txid);
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub mod error;
pub mod gap_limit;
pub mod interface;
pub mod logging;
pub mod migration;
pub mod options;
pub mod recovery;
pub mod scanner;
pub mod scheme;
pub mod seed;
pub mod types;

// Re-export main types for convenience
pub use error::{
    ChainError, DerivationError, LoggingError, LoggingResult, MigrationError, RecoveryError,
    Result, TxBuilderError,
};
pub use gap_limit::{DEFAULT_EXTENDED_GAP_LIMIT, DEFAULT_GAP_LIMIT, GapLimit};
pub use interface::{
    AddressActivity, AddressUtxos, AddressValidation, BulkOperations, ChainClient,
    DerivedAddress, KeyDeriver, RawTransaction, SigHashType, TransactionBuilder,
};
pub use logging::{LoggingConfig, init_console_logging, init_logging};
pub use migration::{
    FeeRate, MigrationPlan, MigrationResult, MigrationSource, Migrator, create_migration_plan,
};
pub use options::{ProgressCallback, ScanOptions, ScanPhase, ScanProgress};
pub use recovery::{BeyondGapRecovery, OldWalletRecovery, RecoveryMode, RecoveryScenarios};
pub use scanner::{ParallelScanner, Scanner, SchemeOutcome};
pub use scheme::{PathScheme, default_schemes, scheme_by_name, schemes_for_wallet};
pub use seed::Seed;
pub use tracing::level_filters::LevelFilter;
pub use types::{DiscoveredAddress, ScanFailure, ScanResult, Utxo};

/// Current version of the key-wallet-recovery library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
