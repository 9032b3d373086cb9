mod builder;
mod chain;
mod deriver;
mod progress;

pub use builder::{BuiltTransaction, MockTransactionBuilder};
pub use chain::{MockBulkOperations, MockChainClient};
pub use deriver::{MockKeyDeriver, address_for, passphrase_seed, path_for};
pub use progress::ProgressRecorder;

use crate::seed::Seed;

/// Seed used across tests unless a test needs a specific one
pub fn test_seed() -> Seed {
    Seed::from_slice(&[0x11; 32])
}
