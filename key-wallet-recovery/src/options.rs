//! Scan configuration and progress reporting.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, Result};
use crate::gap_limit::{DEFAULT_EXTENDED_GAP_LIMIT, DEFAULT_GAP_LIMIT};
use crate::scheme::{PathScheme, default_schemes, ensure_unique_names};

/// Default number of schemes scanned at once by the parallel scanner.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Phase reported by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScanPhase {
    /// An address is being checked
    Scanning,
    /// Funds were found at an address
    Found,
    /// A non-fatal error occurred
    Error,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Scanning => "scanning",
            ScanPhase::Found => "found",
            ScanPhase::Error => "error",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event passed to the progress callback.
///
/// Counters are per scheme. Schemes scanned concurrently report
/// independently, so `addresses_scanned` is not monotonic across events.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub scheme_name: String,
    pub addresses_scanned: usize,
    pub utxos_found: usize,
    pub balance_found: u64,
    pub current_address: String,
    pub message: String,
}

/// Observer for scan progress. May be called from several workers at once.
pub type ProgressCallback = Arc<dyn Fn(&ScanProgress) + Send + Sync>;

/// Options controlling a discovery scan.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanOptions {
    /// Consecutive empty addresses that end a chain
    pub gap_limit: u32,
    /// Gap limit used for the top-priority scheme
    pub extended_gap_limit: u32,
    /// Worker count for parallel scanning
    pub max_concurrent: usize,
    /// Schemes to scan
    pub path_schemes: Vec<PathScheme>,
    /// Global switch for scanning change chains
    pub scan_change_addresses: bool,
    /// Passphrases to try in order. Empty means a single attempt without one.
    pub passphrases: Vec<String>,
    /// Use bulk queries when a bulk backend is attached
    pub use_bulk_operations: bool,
    /// Progress observer
    #[cfg_attr(feature = "serde", serde(skip))]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            gap_limit: DEFAULT_GAP_LIMIT,
            extended_gap_limit: DEFAULT_EXTENDED_GAP_LIMIT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            path_schemes: default_schemes(),
            scan_change_addresses: true,
            passphrases: Vec::new(),
            use_bulk_operations: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("gap_limit", &self.gap_limit)
            .field("extended_gap_limit", &self.extended_gap_limit)
            .field("max_concurrent", &self.max_concurrent)
            .field("path_schemes", &self.path_schemes)
            .field("scan_change_addresses", &self.scan_change_addresses)
            .field("passphrases", &self.passphrases.len())
            .field("use_bulk_operations", &self.use_bulk_operations)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit;
        self
    }

    pub fn with_extended_gap_limit(mut self, extended_gap_limit: u32) -> Self {
        self.extended_gap_limit = extended_gap_limit;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_path_schemes(mut self, schemes: Vec<PathScheme>) -> Self {
        self.path_schemes = schemes;
        self
    }

    pub fn with_scan_change_addresses(mut self, enabled: bool) -> Self {
        self.scan_change_addresses = enabled;
        self
    }

    pub fn with_passphrases(mut self, passphrases: Vec<String>) -> Self {
        self.passphrases = passphrases;
        self
    }

    pub fn with_bulk_operations(mut self, enabled: bool) -> Self {
        self.use_bulk_operations = enabled;
        self
    }

    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(&ScanProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Check the options before any work is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.gap_limit == 0 {
            return Err(RecoveryError::Config("gap limit must be greater than zero".to_string()));
        }
        if self.extended_gap_limit == 0 {
            return Err(RecoveryError::Config(
                "extended gap limit must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(RecoveryError::Config(
                "max concurrent must be greater than zero".to_string(),
            ));
        }
        ensure_unique_names(&self.path_schemes)
    }

    /// Passphrase attempts in order; a single empty attempt when none are configured.
    pub fn passphrase_attempts(&self) -> Vec<String> {
        if self.passphrases.is_empty() {
            vec![String::new()]
        } else {
            self.passphrases.clone()
        }
    }

    pub(crate) fn report(&self, progress: ScanProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(&progress);
        }
    }
}
