//! Gap-limit discovery scanning
//!
//! The [`Scanner`] walks every configured [`PathScheme`] in priority order and
//! checks the derived addresses of each chain until the gap limit proves the
//! chain exhausted. Chain lookups go through [`ChainClient`], or through
//! [`BulkOperations`] in batches when one is attached.
//!
//! Discovery failures never fail the scan: they are recorded on the returned
//! [`ScanResult`]. Only invalid options and an empty seed are errors.

pub mod bulk;
pub mod parallel;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DerivationError, RecoveryError, Result};
use crate::gap_limit::GapLimit;
use crate::interface::{BulkOperations, ChainClient, DerivedAddress, KeyDeriver};
use crate::options::{ScanOptions, ScanPhase, ScanProgress};
use crate::scheme::{PathScheme, ensure_unique_names, resolve_schemes, sort_by_priority};
use crate::seed::Seed;
use crate::types::{DiscoveredAddress, ScanFailure, ScanResult, Utxo, total_amount};

pub use bulk::BULK_BATCH_SIZE;
pub use parallel::ParallelScanner;

const CANCELLED_NOTE: &str = "scan cancelled";

/// What one scheme scan produced. Emitted by workers in the parallel scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeOutcome {
    pub scheme_name: String,
    /// Position of the scheme in priority order
    pub priority_index: usize,
    pub addresses: Vec<DiscoveredAddress>,
    pub balance: u64,
    pub utxo_count: usize,
    pub scanned: usize,
    pub error: Option<String>,
    pub cancelled: bool,
}

/// Sequential discovery engine
#[derive(Clone)]
pub struct Scanner {
    client: Arc<dyn ChainClient>,
    deriver: Arc<dyn KeyDeriver>,
    bulk: Option<Arc<dyn BulkOperations>>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        deriver: Arc<dyn KeyDeriver>,
        options: ScanOptions,
    ) -> Self {
        Self {
            client,
            deriver,
            bulk: None,
            options,
        }
    }

    /// Attach a bulk query backend
    pub fn with_bulk_operations(mut self, bulk: Arc<dyn BulkOperations>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan every configured scheme.
    pub async fn scan(&self, seed: &Seed, cancel: &CancellationToken) -> Result<ScanResult> {
        self.scan_schemes(seed, &self.options.path_schemes, cancel).await
    }

    /// Scan the named registry schemes only. Unknown names fail before any work.
    pub async fn scan_scheme_names<S: AsRef<str>>(
        &self,
        seed: &Seed,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let schemes = resolve_schemes(names)?;
        self.scan_schemes(seed, &schemes, cancel).await
    }

    /// Scan an explicit set of schemes. The configured scheme list is ignored.
    ///
    /// Scheme names must be unique.
    pub async fn scan_schemes(
        &self,
        seed: &Seed,
        schemes: &[PathScheme],
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        self.check_ready(seed, schemes)?;

        let started = Instant::now();
        let schemes = sort_by_priority(schemes);
        let mut attempts = PassphraseAttempts::default();

        for (attempt, passphrase) in self.options.passphrase_attempts().into_iter().enumerate() {
            let attempt_seed = match self.attempt_seed(seed, &passphrase) {
                Ok(s) => s,
                Err(e) => {
                    attempts.seed_failed(attempt, e);
                    continue;
                }
            };

            let mut acc = ResultAccumulator::new(passphrase);
            for (priority_index, scheme) in schemes.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let gap_limit = self.effective_gap_limit(priority_index);
                let outcome =
                    self.scan_scheme(&attempt_seed, scheme, gap_limit, priority_index, cancel).await;
                acc.absorb(outcome);
            }
            if cancel.is_cancelled() {
                acc.mark_cancelled();
            }

            if attempts.complete(attempt, acc) {
                break;
            }
        }

        Ok(attempts.finish(started.elapsed()))
    }

    pub(crate) fn check_ready(&self, seed: &Seed, schemes: &[PathScheme]) -> Result<()> {
        self.options.validate()?;
        ensure_unique_names(schemes)?;
        if seed.is_empty() {
            return Err(RecoveryError::InvalidSeed("seed is empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn attempt_seed(
        &self,
        seed: &Seed,
        passphrase: &str,
    ) -> std::result::Result<Seed, DerivationError> {
        if passphrase.is_empty() {
            Ok(seed.clone())
        } else {
            self.deriver.seed_for_passphrase(seed, passphrase)
        }
    }

    /// The top-priority scheme gets the extended gap limit.
    pub(crate) fn effective_gap_limit(&self, priority_index: usize) -> u32 {
        if priority_index == 0 {
            self.options.extended_gap_limit
        } else {
            self.options.gap_limit
        }
    }

    fn use_bulk(&self) -> Option<&Arc<dyn BulkOperations>> {
        if self.options.use_bulk_operations {
            self.bulk.as_ref()
        } else {
            None
        }
    }

    /// Scan all chains of one scheme with the given gap limit.
    pub async fn scan_scheme(
        &self,
        seed: &Seed,
        scheme: &PathScheme,
        gap_limit: u32,
        priority_index: usize,
        cancel: &CancellationToken,
    ) -> SchemeOutcome {
        debug!(
            "Scanning scheme {} (coin type {}, gap limit {})",
            scheme.name, scheme.coin_type, gap_limit
        );

        let mut scan = SchemeScan::new(scheme);
        for (account, is_change) in scheme.chains(self.options.scan_change_addresses) {
            if cancel.is_cancelled() {
                scan.cancelled = true;
                break;
            }

            let target = ChainTarget {
                scheme,
                account,
                is_change,
                gap_limit,
            };
            match self.use_bulk() {
                Some(bulk) => {
                    self.scan_chain_bulk(bulk.as_ref(), seed, &target, &mut scan, cancel).await
                }
                None => self.scan_chain_individual(seed, &target, &mut scan, cancel).await,
            }

            if scan.failure.is_some() || scan.cancelled {
                break;
            }
        }

        if let Some(failure) = &scan.failure {
            error!("Scheme {} failed: {}", scheme.name, failure);
        } else {
            debug!(
                "Scheme {} done: {} addresses scanned, {} funded",
                scheme.name,
                scan.scanned,
                scan.found.len()
            );
        }

        scan.into_outcome(priority_index)
    }

    async fn scan_chain_individual(
        &self,
        seed: &Seed,
        target: &ChainTarget<'_>,
        scan: &mut SchemeScan,
        cancel: &CancellationToken,
    ) {
        let mut gap = GapLimit::new(target.gap_limit);
        let mut index = 0u32;

        while gap.should_scan_more() {
            if cancel.is_cancelled() {
                scan.cancelled = true;
                return;
            }

            let derived = match self.derive(seed, target, index) {
                Ok(d) => d,
                Err(e) => {
                    scan.failure = Some(format!("derivation failed at index {}: {}", index, e));
                    return;
                }
            };

            scan.scanned += 1;
            self.report_scanning(scan, &derived.address);

            let utxos = self.lookup_utxos(scan, &derived.address).await;
            if utxos.is_empty() {
                gap.mark_unused();
            } else {
                self.record_found(scan, target, index, derived, &utxos);
                gap.mark_used();
            }

            index = match index.checked_add(1) {
                Some(next) => next,
                None => return,
            };
        }
    }

    /// List UTXOs for one address. Lookup failures count as an empty address.
    pub(crate) async fn lookup_utxos(&self, scan: &SchemeScan, address: &str) -> Vec<Utxo> {
        match self.client.list_utxos(address).await {
            Ok(utxos) => utxos,
            Err(e) => {
                warn!("UTXO lookup failed for {} in scheme {}: {}", address, scan.scheme_name, e);
                self.options.report(ScanProgress {
                    phase: ScanPhase::Error,
                    scheme_name: scan.scheme_name.clone(),
                    addresses_scanned: scan.scanned,
                    utxos_found: scan.utxo_count,
                    balance_found: scan.balance,
                    current_address: address.to_string(),
                    message: format!("UTXO lookup failed: {}", e),
                });
                Vec::new()
            }
        }
    }

    pub(crate) fn derive(
        &self,
        seed: &Seed,
        target: &ChainTarget<'_>,
        index: u32,
    ) -> std::result::Result<DerivedAddress, DerivationError> {
        if target.scheme.is_legacy {
            self.deriver.derive_legacy_address(seed, index)
        } else {
            self.deriver.derive_address(
                seed,
                target.scheme.coin_type,
                target.account,
                u32::from(target.is_change),
                index,
            )
        }
    }

    pub(crate) fn report_scanning(&self, scan: &SchemeScan, address: &str) {
        self.options.report(ScanProgress {
            phase: ScanPhase::Scanning,
            scheme_name: scan.scheme_name.clone(),
            addresses_scanned: scan.scanned,
            utxos_found: scan.utxo_count,
            balance_found: scan.balance,
            current_address: address.to_string(),
            message: String::new(),
        });
    }

    pub(crate) fn record_found(
        &self,
        scan: &mut SchemeScan,
        target: &ChainTarget<'_>,
        index: u32,
        derived: DerivedAddress,
        utxos: &[Utxo],
    ) {
        let balance = total_amount(utxos);
        info!(
            "Found {} UTXOs ({} sat) at {} ({})",
            utxos.len(),
            balance,
            derived.address,
            derived.path
        );

        scan.balance += balance;
        scan.utxo_count += utxos.len();
        self.options.report(ScanProgress {
            phase: ScanPhase::Found,
            scheme_name: scan.scheme_name.clone(),
            addresses_scanned: scan.scanned,
            utxos_found: scan.utxo_count,
            balance_found: scan.balance,
            current_address: derived.address.clone(),
            message: format!("{} UTXOs, {} sat", utxos.len(), balance),
        });

        scan.found.push(DiscoveredAddress {
            address: derived.address,
            path: derived.path,
            scheme_name: scan.scheme_name.clone(),
            balance,
            utxo_count: utxos.len(),
            is_change: target.is_change,
            index,
            account: target.account,
            coin_type: target.scheme.coin_type,
        });
    }
}

/// One address chain of a scheme
pub(crate) struct ChainTarget<'a> {
    pub scheme: &'a PathScheme,
    pub account: u32,
    pub is_change: bool,
    pub gap_limit: u32,
}

/// Running state of one scheme scan
#[derive(Debug)]
pub(crate) struct SchemeScan {
    pub scheme_name: String,
    pub found: Vec<DiscoveredAddress>,
    pub scanned: usize,
    pub utxo_count: usize,
    pub balance: u64,
    pub failure: Option<String>,
    pub cancelled: bool,
}

impl SchemeScan {
    pub fn new(scheme: &PathScheme) -> Self {
        Self {
            scheme_name: scheme.name.clone(),
            found: Vec::new(),
            scanned: 0,
            utxo_count: 0,
            balance: 0,
            failure: None,
            cancelled: false,
        }
    }

    pub fn into_outcome(self, priority_index: usize) -> SchemeOutcome {
        SchemeOutcome {
            scheme_name: self.scheme_name,
            priority_index,
            addresses: self.found,
            balance: self.balance,
            utxo_count: self.utxo_count,
            scanned: self.scanned,
            error: self.failure,
            cancelled: self.cancelled,
        }
    }
}

/// Folds scheme outcomes into a [`ScanResult`]. Shared by both scanners so
/// their merge semantics cannot drift apart.
#[derive(Debug, Default)]
pub(crate) struct ResultAccumulator {
    passphrase: String,
    found_addresses: BTreeMap<String, Vec<DiscoveredAddress>>,
    schemes_scanned: Vec<String>,
    addresses_scanned: usize,
    errors: Vec<ScanFailure>,
    cancelled: bool,
}

impl ResultAccumulator {
    pub fn new(passphrase: String) -> Self {
        Self {
            passphrase,
            ..Default::default()
        }
    }

    /// Every scheme counts as scanned. Failed schemes contribute their
    /// scanned count and an error entry, but no addresses.
    pub fn absorb(&mut self, outcome: SchemeOutcome) {
        self.schemes_scanned.push(outcome.scheme_name.clone());
        self.addresses_scanned += outcome.scanned;
        if outcome.cancelled {
            self.cancelled = true;
        }

        if let Some(message) = outcome.error {
            self.errors.push(ScanFailure::for_scheme(outcome.scheme_name, message));
            return;
        }

        if !outcome.addresses.is_empty() {
            self.found_addresses.insert(outcome.scheme_name, outcome.addresses);
        }
    }

    pub fn record_failure(&mut self, failure: ScanFailure) {
        self.errors.push(failure);
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn has_funds(&self) -> bool {
        self.found_addresses.values().flatten().any(|a| a.balance > 0)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn into_result(mut self, duration: Duration) -> ScanResult {
        if self.cancelled {
            self.errors.push(ScanFailure::general(CANCELLED_NOTE));
        }

        let total_balance = self.found_addresses.values().flatten().map(|a| a.balance).sum();
        let total_utxos = self.found_addresses.values().flatten().map(|a| a.utxo_count).sum();

        ScanResult {
            found_addresses: self.found_addresses,
            total_balance,
            total_utxos,
            schemes_scanned: self.schemes_scanned,
            addresses_scanned: self.addresses_scanned,
            duration,
            passphrase_used: self.passphrase,
            errors: self.errors,
            cancelled: self.cancelled,
        }
    }
}

/// Tracks passphrase attempts. The first attempt that finds funds wins;
/// otherwise the last completed attempt is returned.
#[derive(Debug, Default)]
pub(crate) struct PassphraseAttempts {
    carried: Vec<ScanFailure>,
    last: Option<(usize, ResultAccumulator)>,
}

impl PassphraseAttempts {
    pub fn seed_failed(&mut self, attempt: usize, error: DerivationError) {
        warn!("Passphrase attempt {} skipped: {}", attempt + 1, error);
        self.carried.push(ScanFailure::general(format!(
            "passphrase attempt {}: {}",
            attempt + 1,
            error
        )));
    }

    /// Store a finished attempt. Returns true when no further attempts should run.
    pub fn complete(&mut self, attempt: usize, acc: ResultAccumulator) -> bool {
        if let Some((previous_attempt, previous)) = self.last.take() {
            self.carried.extend(previous.errors.into_iter().map(|f| ScanFailure {
                scheme: f.scheme,
                message: format!("passphrase attempt {}: {}", previous_attempt + 1, f.message),
            }));
        }

        let stop = acc.has_funds() || acc.is_cancelled();
        self.last = Some((attempt, acc));
        stop
    }

    pub fn finish(self, duration: Duration) -> ScanResult {
        let mut acc = self.last.map(|(_, acc)| acc).unwrap_or_default();
        let mut errors = self.carried;
        errors.append(&mut acc.errors);
        acc.errors = errors;
        acc.into_result(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockChainClient, MockKeyDeriver, address_for};

    fn outcome(name: &str, priority_index: usize, balances: &[u64]) -> SchemeOutcome {
        let addresses: Vec<_> = balances
            .iter()
            .enumerate()
            .map(|(i, &balance)| DiscoveredAddress {
                address: format!("{}-{}", name, i),
                path: format!("m/{}", i),
                scheme_name: name.to_string(),
                balance,
                utxo_count: 1,
                is_change: false,
                index: i as u32,
                account: 0,
                coin_type: 5,
            })
            .collect();
        SchemeOutcome {
            scheme_name: name.to_string(),
            priority_index,
            balance: balances.iter().sum(),
            utxo_count: addresses.len(),
            addresses,
            scanned: 10,
            error: None,
            cancelled: false,
        }
    }

    #[test]
    fn test_accumulator_totals_and_failures() {
        let mut acc = ResultAccumulator::new(String::new());
        acc.absorb(outcome("a", 0, &[100, 50]));

        let mut failed = outcome("b", 1, &[999]);
        failed.error = Some("derivation failed".to_string());
        acc.absorb(failed);

        let result = acc.into_result(Duration::ZERO);
        assert_eq!(result.total_balance, 150);
        assert_eq!(result.total_utxos, 2);
        assert_eq!(result.schemes_scanned, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(result.addresses_scanned, 20);
        assert!(!result.found_addresses.contains_key("b"));
        assert_eq!(result.errors, vec![ScanFailure::for_scheme("b", "derivation failed")]);
    }

    #[test]
    fn test_accumulator_cancel_note() {
        let mut acc = ResultAccumulator::new(String::new());
        acc.mark_cancelled();
        let result = acc.into_result(Duration::ZERO);
        assert!(result.cancelled);
        assert_eq!(result.errors, vec![ScanFailure::general(CANCELLED_NOTE)]);
    }

    #[test]
    fn test_passphrase_attempts_first_funded_wins() {
        let mut attempts = PassphraseAttempts::default();

        let mut empty = ResultAccumulator::new("first".to_string());
        empty.absorb(outcome("a", 0, &[]));
        assert!(!attempts.complete(0, empty));

        let mut funded = ResultAccumulator::new("second".to_string());
        funded.absorb(outcome("a", 0, &[42]));
        assert!(attempts.complete(1, funded));

        let result = attempts.finish(Duration::ZERO);
        assert_eq!(result.passphrase_used, "second");
        assert_eq!(result.total_balance, 42);
    }

    #[tokio::test]
    async fn test_scan_scheme_legacy_uses_legacy_derivation() {
        let deriver = Arc::new(MockKeyDeriver::new());
        let client = Arc::new(MockChainClient::new());
        let legacy = PathScheme::legacy("legacy", 5, 0);
        let seed = Seed::from_slice(&[1; 32]);
        client.add_utxo(&address_for(&seed, &legacy, 0, false, 2), 700);

        let scanner = Scanner::new(client, deriver.clone(), ScanOptions::default());
        let outcome = scanner.scan_scheme(&seed, &legacy, 5, 0, &CancellationToken::new()).await;

        assert_eq!(outcome.addresses.len(), 1);
        assert_eq!(outcome.addresses[0].index, 2);
        assert_eq!(outcome.scanned, 8);
        assert!(outcome.addresses[0].path.starts_with("legacy/"));
        assert_eq!(deriver.bip44_calls(), 0);
    }
}
