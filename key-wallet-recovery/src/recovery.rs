//! Recovery scenarios for wallets that outgrew the standard gap limit
//!
//! Old wallets frequently left long runs of unused addresses behind, for
//! example after handing out many payment requests that were never paid.
//! [`RecoveryScenarios`] offers two ways past that: rerunning discovery with a
//! wider gap limit, and checking an explicit index range regardless of gaps.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ChainError, RecoveryError, Result};
use crate::interface::{BulkOperations, ChainClient, DerivedAddress, KeyDeriver};
use crate::options::ScanOptions;
use crate::scanner::bulk::bulk_lookup;
use crate::scanner::{ChainTarget, ResultAccumulator, SchemeScan, Scanner};
use crate::scheme::{PathScheme, default_schemes, scheme_by_name};
use crate::seed::Seed;
use crate::types::{ScanFailure, ScanResult};

/// How far past the last used address to keep looking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryMode {
    /// Gap limit 20
    #[default]
    Standard,
    /// Gap limit 100
    Extended,
    /// Gap limit 200
    Aggressive,
}

impl RecoveryMode {
    pub fn gap_limit(&self) -> u32 {
        match self {
            RecoveryMode::Standard => 20,
            RecoveryMode::Extended => 100,
            RecoveryMode::Aggressive => 200,
        }
    }
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryMode::Standard => write!(f, "standard"),
            RecoveryMode::Extended => write!(f, "extended"),
            RecoveryMode::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for RecoveryMode {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(RecoveryMode::Standard),
            "extended" => Ok(RecoveryMode::Extended),
            "aggressive" => Ok(RecoveryMode::Aggressive),
            other => Err(RecoveryError::Config(format!("unknown recovery mode: {}", other))),
        }
    }
}

/// Parameters for [`RecoveryScenarios::recover_old_wallet`]
#[derive(Debug, Clone, Default)]
pub struct OldWalletRecovery {
    pub mode: RecoveryMode,
    /// Overrides the mode's gap limit when set
    pub gap_limit: Option<u32>,
    /// Scheme names to restrict the scan to; empty means all
    pub schemes: Vec<String>,
}

impl OldWalletRecovery {
    pub fn effective_gap_limit(&self) -> u32 {
        self.gap_limit.unwrap_or_else(|| self.mode.gap_limit())
    }
}

/// Parameters for [`RecoveryScenarios::recover_beyond_gap`]
#[derive(Debug, Clone)]
pub struct BeyondGapRecovery {
    /// Registry scheme whose chains are checked
    pub scheme: String,
    /// First index checked (inclusive)
    pub start_index: u32,
    /// End of the range (exclusive)
    pub end_index: u32,
}

/// Extended recovery operations built on the [`Scanner`]
pub struct RecoveryScenarios {
    client: Arc<dyn ChainClient>,
    deriver: Arc<dyn KeyDeriver>,
    bulk: Option<Arc<dyn BulkOperations>>,
    options: ScanOptions,
}

impl RecoveryScenarios {
    /// `options` is the base configuration each scenario adjusts.
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

    pub fn with_bulk_operations(mut self, bulk: Arc<dyn BulkOperations>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    fn scanner(&self, options: ScanOptions) -> Scanner {
        let scanner = Scanner::new(self.client.clone(), self.deriver.clone(), options);
        match &self.bulk {
            Some(bulk) => scanner.with_bulk_operations(bulk.clone()),
            None => scanner,
        }
    }

    /// Rerun discovery with a wider gap limit.
    ///
    /// Names that do not resolve are skipped, as are repeats of a name already
    /// taken; when none resolve the full registry is scanned.
    pub async fn recover_old_wallet(
        &self,
        seed: &Seed,
        request: &OldWalletRecovery,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let gap_limit = request.effective_gap_limit();

        let mut schemes: Vec<PathScheme> = Vec::with_capacity(request.schemes.len());
        for name in &request.schemes {
            if schemes.iter().any(|s| &s.name == name) {
                warn!("Ignoring repeated scheme {}", name);
                continue;
            }
            match scheme_by_name(name) {
                Some(scheme) => schemes.push(scheme),
                None => warn!("Ignoring unknown scheme {}", name),
            }
        }
        if schemes.is_empty() {
            schemes = default_schemes();
        }

        info!(
            "Recovering old wallet: mode {}, gap limit {}, {} schemes",
            request.mode,
            gap_limit,
            schemes.len()
        );

        let options = self
            .options
            .clone()
            .with_gap_limit(gap_limit)
            .with_extended_gap_limit(gap_limit)
            .with_path_schemes(schemes);
        self.scanner(options).scan(seed, cancel).await
    }

    /// Check every index in `[start_index, end_index)` of a scheme's chains,
    /// ignoring the gap limit.
    ///
    /// Uses one bulk activity check and one bulk UTXO fetch per chain when
    /// bulk operations are available. Without them, or if the bulk calls
    /// fail, falls back to an individual scan of the scheme with a gap limit
    /// covering the whole range.
    pub async fn recover_beyond_gap(
        &self,
        seed: &Seed,
        request: &BeyondGapRecovery,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        if request.start_index >= request.end_index {
            return Err(RecoveryError::Config(format!(
                "empty index range {}..{}",
                request.start_index, request.end_index
            )));
        }
        let scheme = scheme_by_name(&request.scheme)
            .ok_or_else(|| RecoveryError::UnknownScheme(request.scheme.clone()))?;

        let range_scanner = self.scanner(self.options.clone());
        range_scanner.check_ready(seed, std::slice::from_ref(&scheme))?;

        if let Some(bulk) = self.bulk.as_ref().filter(|_| self.options.use_bulk_operations) {
            let attempt = self
                .scan_range_bulk(&range_scanner, bulk.as_ref(), seed, &scheme, request, cancel)
                .await;
            match attempt {
                Ok(result) => return Ok(result),
                Err(e) => warn!(
                    "Bulk range scan of {} failed, falling back to individual scan: {}",
                    scheme.name, e
                ),
            }
        }

        // Individual fallback: a regular scheme scan wide enough to cover the range
        let options = self
            .options
            .clone()
            .with_gap_limit(request.end_index)
            .with_extended_gap_limit(request.end_index)
            .with_bulk_operations(false);
        let scanner = Scanner::new(self.client.clone(), self.deriver.clone(), options);
        scanner.scan_schemes(seed, &[scheme], cancel).await
    }

    async fn scan_range_bulk(
        &self,
        scanner: &Scanner,
        bulk: &dyn BulkOperations,
        seed: &Seed,
        scheme: &PathScheme,
        request: &BeyondGapRecovery,
        cancel: &CancellationToken,
    ) -> std::result::Result<ScanResult, ChainError> {
        let started = Instant::now();
        let mut acc = ResultAccumulator::new(String::new());
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
                gap_limit: request.end_index,
            };

            let mut derived: Vec<(u32, DerivedAddress)> = Vec::new();
            for index in request.start_index..request.end_index {
                match scanner.derive(seed, &target, index) {
                    Ok(d) => derived.push((index, d)),
                    Err(e) => {
                        warn!("Derivation failed for {} index {}: {}", scheme.name, index, e);
                        acc.record_failure(ScanFailure::for_scheme(
                            scheme.name.clone(),
                            format!("derivation failed at index {}: {}", index, e),
                        ));
                    }
                }
            }

            let addresses: Vec<String> = derived.iter().map(|(_, d)| d.address.clone()).collect();
            let mut view = bulk_lookup(bulk, &addresses).await?;

            for (index, address) in derived {
                scan.scanned += 1;
                let (_, utxos) = view.take(&address.address);
                if !utxos.is_empty() {
                    scanner.record_found(&mut scan, &target, index, address, &utxos);
                }
            }
        }

        info!(
            "Range scan of {} [{}..{}): {} addresses, {} funded",
            scheme.name,
            request.start_index,
            request.end_index,
            scan.scanned,
            scan.found.len()
        );

        let cancelled = scan.cancelled;
        acc.absorb(scan.into_outcome(0));
        if cancelled {
            acc.mark_cancelled();
        }
        Ok(acc.into_result(started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_gap_limits() {
        assert_eq!(RecoveryMode::Standard.gap_limit(), 20);
        assert_eq!(RecoveryMode::Extended.gap_limit(), 100);
        assert_eq!(RecoveryMode::Aggressive.gap_limit(), 200);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Aggressive".parse::<RecoveryMode>().unwrap(), RecoveryMode::Aggressive);
        assert_eq!(RecoveryMode::Extended.to_string(), "extended");
        assert!("reckless".parse::<RecoveryMode>().is_err());
    }

    #[test]
    fn test_override_wins_over_mode() {
        let request = OldWalletRecovery {
            mode: RecoveryMode::Aggressive,
            gap_limit: Some(7),
            schemes: Vec::new(),
        };
        assert_eq!(request.effective_gap_limit(), 7);
        assert_eq!(OldWalletRecovery::default().effective_gap_limit(), 20);
    }
}
