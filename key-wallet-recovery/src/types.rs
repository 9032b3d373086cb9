//! Value types produced by a scan
//!
//! Everything here is built once by the scanners and handed to the caller as
//! an immutable snapshot.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unspent transaction output as reported by a chain client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Utxo {
    /// Transaction id (hex)
    pub txid: String,
    /// Output index within the transaction
    pub vout: u32,
    /// Value in satoshis
    pub amount: u64,
    /// Address holding the output
    pub address: String,
    /// Number of confirmations
    pub confirmations: u32,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, vout: u32, amount: u64, address: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            vout,
            amount,
            address: address.into(),
            confirmations: 0,
        }
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }
}

/// Sum the value of a set of UTXOs
pub fn total_amount(utxos: &[Utxo]) -> u64 {
    utxos.iter().map(|u| u.amount).sum()
}

/// An address found holding funds
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveredAddress {
    pub address: String,
    /// Full derivation path as reported by the key deriver
    pub path: String,
    pub scheme_name: String,
    /// Sum of the UTXO amounts at discovery time
    pub balance: u64,
    pub utxo_count: usize,
    pub is_change: bool,
    pub index: u32,
    pub account: u32,
    pub coin_type: u32,
}

/// A discovery-time failure, recorded instead of aborting the scan
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanFailure {
    /// Scheme the failure belongs to, if any
    pub scheme: Option<String>,
    pub message: String,
}

impl ScanFailure {
    pub fn for_scheme(scheme: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scheme: Some(scheme.into()),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            scheme: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            Some(scheme) => write!(f, "{}: {}", scheme, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Result of a discovery scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanResult {
    /// Funded addresses per scheme, in derivation order
    pub found_addresses: BTreeMap<String, Vec<DiscoveredAddress>>,
    /// Sum of all discovered balances
    pub total_balance: u64,
    /// Sum of all discovered UTXO counts
    pub total_utxos: usize,
    /// Schemes that were scanned, in priority order
    pub schemes_scanned: Vec<String>,
    /// Number of addresses queried
    pub addresses_scanned: usize,
    /// Wall-clock scan time
    pub duration: Duration,
    /// Passphrase of the attempt this result belongs to
    pub passphrase_used: String,
    /// Non-fatal failures encountered while scanning
    pub errors: Vec<ScanFailure>,
    /// Whether the scan was stopped early by cancellation
    pub cancelled: bool,
}

impl ScanResult {
    pub fn has_funds(&self) -> bool {
        self.total_balance > 0
    }

    /// Number of funded addresses across all schemes
    pub fn address_count(&self) -> usize {
        self.found_addresses.values().map(Vec::len).sum()
    }

    /// All funded addresses, schemes in priority order. A scheme listed more
    /// than once is yielded once.
    pub fn addresses(&self) -> impl Iterator<Item = &DiscoveredAddress> {
        let mut seen = HashSet::new();
        self.schemes_scanned
            .iter()
            .filter(move |name| seen.insert(name.as_str()))
            .filter_map(|name| self.found_addresses.get(name))
            .flat_map(|list| list.iter())
    }

    /// Funded addresses for one scheme
    pub fn addresses_for_scheme(&self, scheme: &str) -> &[DiscoveredAddress] {
        self.found_addresses.get(scheme).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered(scheme: &str, index: u32, balance: u64) -> DiscoveredAddress {
        DiscoveredAddress {
            address: format!("{}-{}", scheme, index),
            path: format!("m/44'/5'/0'/0/{}", index),
            scheme_name: scheme.to_string(),
            balance,
            utxo_count: 1,
            is_change: false,
            index,
            account: 0,
            coin_type: 5,
        }
    }

    #[test]
    fn test_addresses_follow_priority_order() {
        let mut result = ScanResult {
            schemes_scanned: vec!["zeta".to_string(), "alpha".to_string()],
            ..Default::default()
        };
        result.found_addresses.insert("alpha".to_string(), vec![discovered("alpha", 0, 10)]);
        result
            .found_addresses
            .insert("zeta".to_string(), vec![discovered("zeta", 3, 5), discovered("zeta", 7, 1)]);

        let order: Vec<_> = result.addresses().map(|a| a.address.as_str()).collect();
        assert_eq!(order, vec!["zeta-3", "zeta-7", "alpha-0"]);
        assert_eq!(result.address_count(), 3);
        assert!(result.addresses_for_scheme("missing").is_empty());
    }

    #[test]
    fn test_addresses_yield_repeated_scheme_once() {
        let mut result = ScanResult {
            schemes_scanned: vec!["bip44".to_string(), "bip44".to_string()],
            ..Default::default()
        };
        result.found_addresses.insert("bip44".to_string(), vec![discovered("bip44", 0, 10)]);

        assert_eq!(result.addresses().count(), 1);
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(ScanFailure::for_scheme("bip44", "boom").to_string(), "bip44: boom");
        assert_eq!(ScanFailure::general("scan cancelled").to_string(), "scan cancelled");
    }

    #[test]
    fn test_total_amount() {
        let utxos = vec![Utxo::new("aa", 0, 1500, "addr"), Utxo::new("bb", 1, 500, "addr")];
        assert_eq!(total_amount(&utxos), 2000);
        assert_eq!(total_amount(&[]), 0);
    }
}
