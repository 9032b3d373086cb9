//! Migration planning
//!
//! Turns a [`ScanResult`] into a priced consolidation of every discovered
//! address into a single destination output.

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::fee::{FeeRate, estimate_consolidation_size};
use crate::error::MigrationError;
use crate::types::ScanResult;

/// A fee above this share of the input (in percent) attaches a warning
pub const HIGH_FEE_WARNING_PERCENT: u64 = 10;

/// A funded address to be swept
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MigrationSource {
    pub address: String,
    /// Derivation path the signing key is derived from at execution time
    pub path: String,
    /// Balance recorded at discovery time
    pub balance: u64,
    pub utxo_count: usize,
}

/// A priced consolidation
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MigrationPlan {
    pub sources: Vec<MigrationSource>,
    pub destination: String,
    pub total_input: u64,
    pub estimated_fee: u64,
    pub net_amount: u64,
    pub fee_rate: FeeRate,
    /// Estimated transaction size in bytes
    pub estimated_size: usize,
    pub total_utxos: usize,
    /// Set when the plan is valid but uneconomical
    pub warning: Option<String>,
}

impl MigrationPlan {
    /// Fee as a fraction of the total input
    pub fn fee_ratio(&self) -> f64 {
        if self.total_input == 0 {
            return 0.0;
        }
        self.estimated_fee as f64 / self.total_input as f64
    }
}

/// Outcome of an executed migration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MigrationResult {
    pub txid: String,
    /// Amount delivered to the destination
    pub total_migrated: u64,
    pub fee: u64,
    pub input_count: usize,
    pub source_addresses: Vec<String>,
    pub destination: String,
}

/// Plan sweeping every address of `result` into `destination`.
///
/// A `fee_rate` of zero selects the default of 50 sat/kB. Fails when there
/// is nothing to move or when the fee would consume the whole input.
/// Each address becomes one source, however many schemes reported it.
pub fn create_migration_plan(
    result: &ScanResult,
    destination: &str,
    fee_rate: u64,
) -> Result<MigrationPlan, MigrationError> {
    if !result.has_funds() {
        return Err(MigrationError::NoFunds);
    }
    if destination.trim().is_empty() {
        return Err(MigrationError::EmptyDestination);
    }

    let fee_rate = FeeRate::or_default(fee_rate);

    let mut seen = HashSet::new();
    let sources: Vec<MigrationSource> = result
        .addresses()
        .filter(|a| seen.insert(a.address.as_str()))
        .map(|a| MigrationSource {
            address: a.address.clone(),
            path: a.path.clone(),
            balance: a.balance,
            utxo_count: a.utxo_count,
        })
        .collect();
    let total_input: u64 = sources.iter().map(|s| s.balance).sum();
    let total_utxos: usize = sources.iter().map(|s| s.utxo_count).sum();

    let estimated_size = estimate_consolidation_size(total_utxos);
    let estimated_fee = fee_rate.calculate_fee(estimated_size);
    if estimated_fee >= total_input {
        return Err(MigrationError::Dust {
            fee: estimated_fee,
            total_input,
        });
    }

    let warning = if u128::from(estimated_fee) * 100
        > u128::from(total_input) * u128::from(HIGH_FEE_WARNING_PERCENT)
    {
        let message = format!(
            "fee {} sat is {:.1}% of the {} sat being migrated",
            estimated_fee,
            estimated_fee as f64 * 100.0 / total_input as f64,
            total_input
        );
        warn!("High migration fee: {}", message);
        Some(message)
    } else {
        None
    };

    info!(
        "Migration plan: {} sources, {} UTXOs, {} sat in, fee {} sat at {}",
        sources.len(),
        total_utxos,
        total_input,
        estimated_fee,
        fee_rate
    );

    Ok(MigrationPlan {
        sources,
        destination: destination.to_string(),
        total_input,
        estimated_fee,
        net_amount: total_input - estimated_fee,
        fee_rate,
        estimated_size,
        total_utxos,
        warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscoveredAddress;
    use assert_matches::assert_matches;

    fn result_with(balances: &[(u64, usize)]) -> ScanResult {
        let addresses: Vec<DiscoveredAddress> = balances
            .iter()
            .enumerate()
            .map(|(i, &(balance, utxo_count))| DiscoveredAddress {
                address: format!("addr-{}", i),
                path: format!("m/44'/5'/0'/0/{}", i),
                scheme_name: "bip44".to_string(),
                balance,
                utxo_count,
                is_change: false,
                index: i as u32,
                account: 0,
                coin_type: 5,
            })
            .collect();

        let mut result = ScanResult {
            total_balance: addresses.iter().map(|a| a.balance).sum(),
            total_utxos: addresses.iter().map(|a| a.utxo_count).sum(),
            schemes_scanned: vec!["bip44".to_string()],
            ..Default::default()
        };
        result.found_addresses.insert("bip44".to_string(), addresses);
        result
    }

    #[test]
    fn test_plan_fee_math() {
        let result = result_with(&[(60_000, 2), (40_000, 1)]);
        let plan = create_migration_plan(&result, "dest", 50).unwrap();

        assert_eq!(plan.total_input, 100_000);
        assert_eq!(plan.total_utxos, 3);
        assert_eq!(plan.estimated_size, 488);
        assert_eq!(plan.estimated_fee, 25);
        assert_eq!(plan.net_amount, 99_975);
        assert_eq!(plan.sources.len(), 2);
        assert!(plan.warning.is_none());
    }

    #[test]
    fn test_plan_dust() {
        let result = result_with(&[(5, 1)]);
        let err = create_migration_plan(&result, "dest", 50).unwrap_err();
        assert_eq!(
            err,
            MigrationError::Dust {
                fee: 10,
                total_input: 5
            }
        );
    }

    #[test]
    fn test_plan_high_fee_warning() {
        let result = result_with(&[(50, 1)]);
        let plan = create_migration_plan(&result, "dest", 50).unwrap();
        assert_eq!(plan.estimated_size, 192);
        assert_eq!(plan.estimated_fee, 10);
        assert_eq!(plan.net_amount, 40);
        assert!(plan.warning.is_some());
        assert!((plan.fee_ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_plan_exactly_ten_percent_has_no_warning() {
        let result = result_with(&[(100, 1)]);
        let plan = create_migration_plan(&result, "dest", 50).unwrap();
        assert_eq!(plan.estimated_fee, 10);
        assert!(plan.warning.is_none());
    }

    #[test]
    fn test_plan_zero_fee_rate_uses_default() {
        let result = result_with(&[(100_000, 3)]);
        let plan = create_migration_plan(&result, "dest", 0).unwrap();
        assert_eq!(plan.fee_rate, FeeRate::new(50));
        assert_eq!(plan.estimated_fee, 25);
    }

    #[test]
    fn test_plan_counts_each_address_once() {
        let mut result = result_with(&[(100_000, 1)]);
        // The same address reported under a second scheme name
        let mut copy = result.found_addresses["bip44"].clone();
        copy[0].scheme_name = "bip44-copy".to_string();
        result.found_addresses.insert("bip44-copy".to_string(), copy);
        result.schemes_scanned =
            vec!["bip44".to_string(), "bip44-copy".to_string(), "bip44".to_string()];

        let plan = create_migration_plan(&result, "dest", 50).unwrap();
        assert_eq!(plan.sources.len(), 1);
        assert_eq!(plan.total_input, 100_000);
        assert_eq!(plan.total_utxos, 1);
    }

    #[test]
    fn test_plan_huge_fee_rate_is_dust() {
        let result = result_with(&[(100_000, 1)]);
        let err = create_migration_plan(&result, "dest", u64::MAX / 100).unwrap_err();
        assert_matches!(err, MigrationError::Dust { fee, total_input: 100_000 } if fee > 100_000);
    }

    #[test]
    fn test_plan_rejects_bad_inputs() {
        assert_matches!(
            create_migration_plan(&ScanResult::default(), "dest", 50),
            Err(MigrationError::NoFunds)
        );
        assert_matches!(
            create_migration_plan(&result_with(&[(1000, 1)]), "  ", 50),
            Err(MigrationError::EmptyDestination)
        );
    }
}
