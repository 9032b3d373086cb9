//! Batched discovery strategy
//!
//! Addresses are derived in fixed batches and checked with two bulk calls:
//! an activity check for the whole batch, then a UTXO fetch for the active
//! addresses only. Gap accounting stays per address, so a bulk scan stops at
//! the same index an individual scan would. The unused tail of the final
//! batch is queried but not counted.
//!
//! A batch ends early at an index that fails to derive. The failure only
//! fails the scheme if gap accounting reaches that index.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChainTarget, SchemeScan, Scanner};
use crate::error::ChainError;
use crate::gap_limit::GapLimit;
use crate::interface::BulkOperations;
use crate::seed::Seed;
use crate::types::Utxo;

/// Number of addresses derived and queried per bulk round trip
pub const BULK_BATCH_SIZE: u32 = 20;

/// Bulk answers keyed by address
#[derive(Debug, Default)]
pub(crate) struct BulkView {
    entries: HashMap<String, Vec<Utxo>>,
}

impl BulkView {
    /// Activity flag and UTXOs for `address`. Addresses without activity yield `(false, [])`.
    pub fn take(&mut self, address: &str) -> (bool, Vec<Utxo>) {
        match self.entries.remove(address) {
            Some(utxos) => (true, utxos),
            None => (false, Vec::new()),
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

/// Activity check for all `addresses`, then a UTXO fetch for the active ones.
pub(crate) async fn bulk_lookup(
    bulk: &dyn BulkOperations,
    addresses: &[String],
) -> Result<BulkView, ChainError> {
    let activity = bulk.bulk_address_activity_check(addresses).await?;
    let active: Vec<String> = activity
        .into_iter()
        .filter(|a| a.has_activity && addresses.contains(&a.address))
        .map(|a| a.address)
        .collect();

    let mut view = BulkView::default();
    if active.is_empty() {
        return Ok(view);
    }

    for address in &active {
        view.entries.insert(address.clone(), Vec::new());
    }
    for fetched in bulk.bulk_address_utxo_fetch(&active).await? {
        if let Some(slot) = view.entries.get_mut(&fetched.address) {
            *slot = fetched.utxos;
        }
    }
    Ok(view)
}

impl Scanner {
    pub(crate) async fn scan_chain_bulk(
        &self,
        bulk: &dyn BulkOperations,
        seed: &Seed,
        target: &ChainTarget<'_>,
        scan: &mut SchemeScan,
        cancel: &CancellationToken,
    ) {
        let mut gap = GapLimit::new(target.gap_limit);
        let mut next_index = 0u32;

        while gap.should_scan_more() {
            if cancel.is_cancelled() {
                scan.cancelled = true;
                return;
            }

            let mut batch = Vec::with_capacity(BULK_BATCH_SIZE as usize);
            let mut derivation_failure = None;
            for offset in 0..BULK_BATCH_SIZE {
                let Some(index) = next_index.checked_add(offset) else {
                    break;
                };
                match self.derive(seed, target, index) {
                    Ok(derived) => batch.push((index, derived)),
                    Err(e) => {
                        derivation_failure =
                            Some(format!("derivation failed at index {}: {}", index, e));
                        break;
                    }
                }
            }
            // Short batches end the chain: either derivation failed or the index space ran out
            let last_batch = batch.len() < BULK_BATCH_SIZE as usize;
            if batch.is_empty() {
                scan.failure = derivation_failure;
                return;
            }
            next_index = next_index.saturating_add(BULK_BATCH_SIZE);

            let addresses: Vec<String> = batch.iter().map(|(_, d)| d.address.clone()).collect();
            let mut view = match bulk_lookup(bulk, &addresses).await {
                Ok(view) => {
                    debug!(
                        "Bulk batch of {} for {}: {} active",
                        addresses.len(),
                        scan.scheme_name,
                        view.active_count()
                    );
                    Some(view)
                }
                Err(e) => {
                    warn!(
                        "Bulk lookup failed for scheme {}, falling back to individual queries: {}",
                        scan.scheme_name, e
                    );
                    None
                }
            };

            for (index, derived) in batch {
                if gap.limit_reached() {
                    break;
                }
                if cancel.is_cancelled() {
                    scan.cancelled = true;
                    return;
                }

                scan.scanned += 1;
                self.report_scanning(scan, &derived.address);

                let (active, utxos) = match view.as_mut() {
                    Some(view) => view.take(&derived.address),
                    None => {
                        let utxos = self.lookup_utxos(scan, &derived.address).await;
                        (!utxos.is_empty(), utxos)
                    }
                };

                if !utxos.is_empty() {
                    self.record_found(scan, target, index, derived, &utxos);
                }
                if active {
                    gap.mark_used();
                } else {
                    gap.mark_unused();
                }
            }

            if last_batch {
                if gap.should_scan_more() {
                    scan.failure = derivation_failure;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBulkOperations;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_bulk_lookup_fetches_only_active() {
        let bulk = Arc::new(MockBulkOperations::new());
        bulk.set_utxos("addr-1", vec![Utxo::new("aa", 0, 500, "addr-1")]);
        bulk.set_activity_only("addr-2");

        let addresses: Vec<String> =
            vec!["addr-0".to_string(), "addr-1".to_string(), "addr-2".to_string()];
        let mut view = bulk_lookup(bulk.as_ref(), &addresses).await.unwrap();

        assert_eq!(view.active_count(), 2);
        assert_eq!(bulk.utxo_fetch_requests(), vec![vec!["addr-1".to_string(), "addr-2".to_string()]]);

        let (active, utxos) = view.take("addr-1");
        assert!(active);
        assert_eq!(utxos.len(), 1);

        let (active, utxos) = view.take("addr-2");
        assert!(active);
        assert!(utxos.is_empty());

        assert_eq!(view.take("addr-0"), (false, Vec::new()));
    }

    #[tokio::test]
    async fn test_bulk_lookup_skips_fetch_without_activity() {
        let bulk = MockBulkOperations::new();
        let addresses = vec!["addr-0".to_string()];
        let view = bulk_lookup(&bulk, &addresses).await.unwrap();
        assert_eq!(view.active_count(), 0);
        assert!(bulk.utxo_fetch_requests().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_lookup_propagates_errors() {
        let bulk = MockBulkOperations::new();
        bulk.fail_activity_checks(true);
        let addresses = vec!["addr-0".to_string()];
        assert!(bulk_lookup(&bulk, &addresses).await.is_err());
    }
}
