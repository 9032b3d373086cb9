//! Consolidation fee calculation
//!
//! Only the fee of a consolidation transaction is modelled here: many P2PKH
//! inputs spent into a single output, no change.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fixed transaction overhead: version, locktime and varint counts
pub const TX_OVERHEAD_SIZE: usize = 10;

/// Size of one P2PKH input
pub const P2PKH_INPUT_SIZE: usize = 148;

/// Size of one P2PKH output
pub const P2PKH_OUTPUT_SIZE: usize = 34;

/// Fee rate used when the caller passes zero
pub const DEFAULT_MIGRATION_FEE_RATE: u64 = 50;

/// Fee rate in satoshis per kilobyte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeeRate {
    /// Satoshis per kilobyte
    sat_per_kb: u64,
}

impl Default for FeeRate {
    fn default() -> Self {
        Self {
            sat_per_kb: DEFAULT_MIGRATION_FEE_RATE,
        }
    }
}

impl FeeRate {
    /// Create a new fee rate
    pub fn new(sat_per_kb: u64) -> Self {
        Self {
            sat_per_kb,
        }
    }

    /// Use the default rate when `sat_per_kb` is zero
    pub fn or_default(sat_per_kb: u64) -> Self {
        if sat_per_kb == 0 {
            Self::default()
        } else {
            Self::new(sat_per_kb)
        }
    }

    /// Get satoshis per kilobyte
    pub fn as_sat_per_kb(&self) -> u64 {
        self.sat_per_kb
    }

    /// Calculate fee for a given transaction size in bytes.
    ///
    /// Saturates at `u64::MAX` when the rate is too large to price the size.
    pub fn calculate_fee(&self, size_bytes: usize) -> u64 {
        // Round up to ensure we pay at least the minimum fee
        self.sat_per_kb
            .checked_mul(size_bytes as u64)
            .map_or(u64::MAX, |scaled| scaled.div_ceil(1000))
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kB", self.sat_per_kb)
    }
}

/// Size of a transaction spending `num_inputs` into one output
pub fn estimate_consolidation_size(num_inputs: usize) -> usize {
    TX_OVERHEAD_SIZE + num_inputs * P2PKH_INPUT_SIZE + P2PKH_OUTPUT_SIZE
}

/// Fee of a consolidation transaction spending `num_inputs`
pub fn estimate_consolidation_fee(num_inputs: usize, rate: FeeRate) -> u64 {
    rate.calculate_fee(estimate_consolidation_size(num_inputs))
}
