//! Derivation scheme registry
//!
//! Wallet applications have not always agreed on where funds live. Besides
//! the standard BIP44 layout `m/44'/coin'/account'/change/index`, historical
//! wallets reused another chain's coin type, used the testnet coin type on
//! mainnet, or derived keys along non-BIP44 paths. Each convention is a
//! [`PathScheme`]; the registry below is the catalog the scanners walk.

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, Result};

/// SLIP-44 coin types referenced by the default catalog.
pub mod coin_type {
    pub const BITCOIN: u32 = 0;
    pub const TESTNET: u32 = 1;
    pub const DASH: u32 = 5;
}

/// BIP44 purpose level.
pub const PURPOSE_BIP44: u32 = 44;

/// Purpose recorded for legacy (non-BIP44) schemes.
pub const PURPOSE_LEGACY: u32 = 0;

pub const SCHEME_BIP44: &str = "bip44";
pub const SCHEME_BITCOIN_COIN_TYPE: &str = "bip44-bitcoin-coin-type";
pub const SCHEME_TESTNET_COIN_TYPE: &str = "bip44-testnet-coin-type";
pub const SCHEME_LEGACY: &str = "legacy";
pub const SCHEME_MULTI_ACCOUNT: &str = "bip44-multi-account";

/// A wallet derivation convention
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathScheme {
    /// Unique name of the scheme
    pub name: String,
    /// SLIP-44 coin type
    pub coin_type: u32,
    /// Purpose level (44 for BIP44, 0 for legacy paths)
    pub purpose: u32,
    /// Account indices to scan
    pub accounts: Vec<u32>,
    /// Whether the internal (change) chain is scanned
    pub scan_change: bool,
    /// Whether addresses come from a non-BIP44 path
    pub is_legacy: bool,
    /// Scan order; lower values scan first
    pub priority: u32,
    /// Where the convention comes from
    pub description: String,
}

impl PathScheme {
    /// Create a standard BIP44 scheme
    pub fn bip44(name: impl Into<String>, coin_type: u32, accounts: Vec<u32>, priority: u32) -> Self {
        Self {
            name: name.into(),
            coin_type,
            purpose: PURPOSE_BIP44,
            accounts,
            scan_change: true,
            is_legacy: false,
            priority,
            description: String::new(),
        }
    }

    /// Create a legacy scheme with a single address chain
    pub fn legacy(name: impl Into<String>, coin_type: u32, priority: u32) -> Self {
        Self {
            name: name.into(),
            coin_type,
            purpose: PURPOSE_LEGACY,
            accounts: vec![0],
            scan_change: false,
            is_legacy: true,
            priority,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scan_change(mut self, scan_change: bool) -> Self {
        self.scan_change = scan_change;
        self
    }

    /// Address chains this scheme covers as `(account, is_change)` pairs.
    ///
    /// Legacy derivation has no account or change level, so legacy schemes
    /// yield exactly one chain.
    pub fn chains(&self, scan_change_addresses: bool) -> Vec<(u32, bool)> {
        if self.is_legacy {
            return vec![(self.accounts.first().copied().unwrap_or(0), false)];
        }

        let with_change = self.scan_change && scan_change_addresses;
        let mut chains = Vec::with_capacity(self.accounts.len() * 2);
        for &account in &self.accounts {
            chains.push((account, false));
            if with_change {
                chains.push((account, true));
            }
        }
        chains
    }
}

/// Wallet applications and the schemes they are known to have used.
const WALLET_SCHEMES: &[(&str, &[&str])] = &[
    ("dash-core", &[SCHEME_BIP44, SCHEME_MULTI_ACCOUNT]),
    ("electrum", &[SCHEME_LEGACY, SCHEME_BIP44]),
    ("multi-coin", &[SCHEME_BITCOIN_COIN_TYPE, SCHEME_BIP44]),
    ("hardware", &[SCHEME_BIP44, SCHEME_TESTNET_COIN_TYPE, SCHEME_MULTI_ACCOUNT]),
];

/// The built-in scheme catalog in priority order.
pub fn default_schemes() -> Vec<PathScheme> {
    vec![
        PathScheme::bip44(SCHEME_BIP44, coin_type::DASH, vec![0], 0)
            .with_description("Standard BIP44 account 0"),
        PathScheme::bip44(SCHEME_BITCOIN_COIN_TYPE, coin_type::BITCOIN, vec![0], 1)
            .with_description("Wallets that reused the Bitcoin coin type"),
        PathScheme::bip44(SCHEME_TESTNET_COIN_TYPE, coin_type::TESTNET, vec![0], 2)
            .with_description("Wallets that derived mainnet funds on the testnet coin type"),
        PathScheme::legacy(SCHEME_LEGACY, coin_type::DASH, 3)
            .with_description("Pre-BIP44 single chain derivation"),
        PathScheme::bip44(SCHEME_MULTI_ACCOUNT, coin_type::DASH, vec![1, 2, 3, 4], 4)
            .with_description("Additional BIP44 accounts 1-4"),
    ]
}

/// Look up a scheme by name. Returns an owned copy.
pub fn scheme_by_name(name: &str) -> Option<PathScheme> {
    default_schemes().into_iter().find(|s| s.name == name)
}

/// Schemes a wallet application is known to have used, in priority order.
///
/// Unknown wallets yield an empty list.
pub fn schemes_for_wallet(wallet: &str) -> Vec<PathScheme> {
    let Some((_, names)) =
        WALLET_SCHEMES.iter().find(|(known, _)| known.eq_ignore_ascii_case(wallet))
    else {
        return Vec::new();
    };

    default_schemes().into_iter().filter(|s| names.contains(&s.name.as_str())).collect()
}

/// Names of the wallets in the membership table.
pub fn known_wallets() -> Vec<&'static str> {
    WALLET_SCHEMES.iter().map(|(name, _)| *name).collect()
}

/// Return a new vector sorted by ascending priority. The input is left untouched.
///
/// The sort is stable, so schemes sharing a priority keep their relative order.
pub fn sort_by_priority(schemes: &[PathScheme]) -> Vec<PathScheme> {
    let mut sorted = schemes.to_vec();
    sorted.sort_by_key(|s| s.priority);
    sorted
}

/// Resolve scheme names against the registry, failing on the first unknown
/// or repeated name.
pub fn resolve_schemes<S: AsRef<str>>(names: &[S]) -> Result<Vec<PathScheme>> {
    let schemes = names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            scheme_by_name(name).ok_or_else(|| RecoveryError::UnknownScheme(name.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure_unique_names(&schemes)?;
    Ok(schemes)
}

/// Fail on the first scheme name that appears more than once.
///
/// Scan results are keyed by scheme name, so two schemes sharing a name
/// would overwrite each other's discoveries.
pub fn ensure_unique_names(schemes: &[PathScheme]) -> Result<()> {
    let mut seen = HashSet::with_capacity(schemes.len());
    for scheme in schemes {
        if !seen.insert(scheme.name.as_str()) {
            return Err(RecoveryError::Config(format!("duplicate scheme name: {}", scheme.name)));
        }
    }
    Ok(())
}
