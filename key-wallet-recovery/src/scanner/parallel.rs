//! Concurrent scheme scanning
//!
//! Each scheme becomes one job on a bounded queue drained by a fixed pool of
//! tokio workers. Workers push their [`SchemeOutcome`] to a results channel;
//! once the pool is done the coordinator restores priority order and folds
//! the outcomes exactly like the sequential [`Scanner`] does.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{PassphraseAttempts, ResultAccumulator, SchemeOutcome, Scanner};
use crate::error::Result;
use crate::interface::{BulkOperations, ChainClient, KeyDeriver};
use crate::options::ScanOptions;
use crate::scheme::{PathScheme, resolve_schemes, sort_by_priority};
use crate::seed::Seed;
use crate::types::{ScanFailure, ScanResult};

/// A queued scheme scan
#[derive(Debug, Clone)]
struct SchemeJob {
    scheme: PathScheme,
    gap_limit: u32,
    priority_index: usize,
}

/// Scans schemes concurrently on a bounded worker pool.
#[derive(Clone)]
pub struct ParallelScanner {
    scanner: Scanner,
}

impl ParallelScanner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        deriver: Arc<dyn KeyDeriver>,
        options: ScanOptions,
    ) -> Self {
        Self {
            scanner: Scanner::new(client, deriver, options),
        }
    }

    /// Reuse the collaborators and options of an existing scanner
    pub fn from_scanner(scanner: Scanner) -> Self {
        Self {
            scanner,
        }
    }

    pub fn with_bulk_operations(mut self, bulk: Arc<dyn BulkOperations>) -> Self {
        self.scanner = self.scanner.with_bulk_operations(bulk);
        self
    }

    /// Number of workers used for `job_count` jobs
    pub fn worker_count(&self, job_count: usize) -> usize {
        self.scanner.options().max_concurrent.min(job_count)
    }

    /// Scan every configured scheme concurrently.
    pub async fn scan_parallel(&self, seed: &Seed, cancel: &CancellationToken) -> Result<ScanResult> {
        let schemes = self.scanner.options().path_schemes.clone();
        self.run(seed, &schemes, cancel).await
    }

    /// Scan the named registry schemes concurrently.
    ///
    /// Every name is resolved before any work is dispatched; an unknown name
    /// fails the call.
    pub async fn scan_schemes_parallel<S: AsRef<str>>(
        &self,
        seed: &Seed,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let schemes = resolve_schemes(names)?;
        self.run(seed, &schemes, cancel).await
    }

    async fn run(
        &self,
        seed: &Seed,
        schemes: &[PathScheme],
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        self.scanner.check_ready(seed, schemes)?;

        let started = Instant::now();
        let schemes = sort_by_priority(schemes);
        let mut attempts = PassphraseAttempts::default();

        for (attempt, passphrase) in
            self.scanner.options().passphrase_attempts().into_iter().enumerate()
        {
            let attempt_seed = match self.scanner.attempt_seed(seed, &passphrase) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    attempts.seed_failed(attempt, e);
                    continue;
                }
            };

            let mut acc = ResultAccumulator::new(passphrase);
            let (outcomes, failures) = self.run_pool(attempt_seed, &schemes, cancel).await;
            for outcome in outcomes {
                acc.absorb(outcome);
            }
            for failure in failures {
                acc.record_failure(failure);
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

    /// Run one job per scheme and return the outcomes in priority order.
    async fn run_pool(
        &self,
        seed: Arc<Seed>,
        schemes: &[PathScheme],
        cancel: &CancellationToken,
    ) -> (Vec<SchemeOutcome>, Vec<ScanFailure>) {
        if schemes.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let (job_tx, job_rx) = mpsc::channel(schemes.len());
        for (priority_index, scheme) in schemes.iter().enumerate() {
            let job = SchemeJob {
                scheme: scheme.clone(),
                gap_limit: self.scanner.effective_gap_limit(priority_index),
                priority_index,
            };
            // The queue holds every job, so this never waits
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let workers = self.worker_count(schemes.len());
        debug!("Scanning {} schemes on {} workers", schemes.len(), workers);

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let scanner = self.scanner.clone();
            let seed = seed.clone();
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();

            pool.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!("Worker {} stopping: cancelled", worker_id);
                        break;
                    }
                    let job = job_rx.lock().await.recv().await;
                    let Some(job) = job else {
                        break;
                    };

                    let outcome = scanner
                        .scan_scheme(&seed, &job.scheme, job.gap_limit, job.priority_index, &cancel)
                        .await;
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut failures = Vec::new();
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Scan worker failed: {}", e);
                failures.push(ScanFailure::general(format!("scan worker failed: {}", e)));
            }
        }

        let mut outcomes = Vec::with_capacity(schemes.len());
        while let Some(outcome) = result_rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.priority_index);

        (outcomes, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockChainClient, MockKeyDeriver};

    #[test]
    fn test_worker_count_is_bounded_by_jobs() {
        let scanner = ParallelScanner::new(
            Arc::new(MockChainClient::new()),
            Arc::new(MockKeyDeriver::new()),
            ScanOptions::default().with_max_concurrent(3),
        );
        assert_eq!(scanner.worker_count(5), 3);
        assert_eq!(scanner.worker_count(2), 2);
    }

    #[tokio::test]
    async fn test_run_pool_restores_priority_order() {
        let client = Arc::new(MockChainClient::new());
        // Slow the first scheme down so it finishes last
        client.set_delay_matching("-1/", std::time::Duration::from_millis(20));

        let schemes = vec![
            PathScheme::bip44("a", 1, vec![0], 0).with_scan_change(false),
            PathScheme::bip44("b", 2, vec![0], 1).with_scan_change(false),
            PathScheme::bip44("c", 3, vec![0], 2).with_scan_change(false),
        ];
        let scanner = ParallelScanner::new(
            client,
            Arc::new(MockKeyDeriver::new()),
            ScanOptions::default().with_gap_limit(2).with_extended_gap_limit(2),
        );

        let (outcomes, failures) = scanner
            .run_pool(Arc::new(Seed::from_slice(&[7; 16])), &schemes, &CancellationToken::new())
            .await;

        assert!(failures.is_empty());
        let order: Vec<_> = outcomes.iter().map(|o| o.scheme_name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
