use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ChainError;
use crate::interface::{
    AddressActivity, AddressUtxos, AddressValidation, BulkOperations, ChainClient,
};
use crate::types::Utxo;

#[derive(Default)]
struct ChainState {
    utxos: HashMap<String, Vec<Utxo>>,
    // Addresses with history but nothing left to spend
    activity_only: HashSet<String>,
    failing: HashSet<String>,
    invalid: HashMap<String, String>,
    requests: Vec<String>,
    delays: Vec<(String, Duration)>,
    cancel_after: Option<(usize, CancellationToken)>,
    next_txid: u64,
}

/// In-memory chain. Clones share state.
#[derive(Clone, Default)]
pub struct MockChainClient {
    state: Arc<Mutex<ChainState>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one UTXO of `amount` to `address`
    pub fn add_utxo(&self, address: &str, amount: u64) {
        let mut state = self.state.lock().unwrap();
        state.next_txid += 1;
        let utxo = Utxo::new(format!("{:064x}", state.next_txid), 0, amount, address)
            .with_confirmations(6);
        state.utxos.entry(address.to_string()).or_default().push(utxo);
    }

    pub fn set_utxos(&self, address: &str, utxos: Vec<Utxo>) {
        self.state.lock().unwrap().utxos.insert(address.to_string(), utxos);
    }

    /// Spend everything held by `address`, leaving its history behind
    pub fn spend_all(&self, address: &str) {
        let mut state = self.state.lock().unwrap();
        state.utxos.remove(address);
        state.activity_only.insert(address.to_string());
    }

    pub fn set_activity_only(&self, address: &str) {
        self.state.lock().unwrap().activity_only.insert(address.to_string());
    }

    /// Make UTXO lookups for `address` fail
    pub fn fail_address(&self, address: &str) {
        self.state.lock().unwrap().failing.insert(address.to_string());
    }

    pub fn set_invalid_address(&self, address: &str, reason: &str) {
        self.state.lock().unwrap().invalid.insert(address.to_string(), reason.to_string());
    }

    /// Delay UTXO lookups of addresses containing `pattern`
    pub fn set_delay_matching(&self, pattern: &str, delay: Duration) {
        self.state.lock().unwrap().delays.push((pattern.to_string(), delay));
    }

    /// Cancel `token` once `requests` UTXO lookups have been served
    pub fn cancel_after(&self, requests: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((requests, token));
    }

    /// Addresses passed to `list_utxos`, in call order
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn was_requested(&self, address: &str) -> bool {
        self.state.lock().unwrap().requests.iter().any(|r| r == address)
    }

    fn has_activity(&self, address: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.utxos.get(address).is_some_and(|u| !u.is_empty())
            || state.activity_only.contains(address)
    }

    fn utxos_of(&self, address: &str) -> Vec<Utxo> {
        self.state.lock().unwrap().utxos.get(address).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn list_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainError> {
        let (delay, result) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(address.to_string());

            if let Some((after, token)) = &state.cancel_after {
                if state.requests.len() >= *after {
                    token.cancel();
                }
            }

            let delay = state
                .delays
                .iter()
                .find(|(pattern, _)| address.contains(pattern.as_str()))
                .map(|(_, d)| *d);
            let result = if state.failing.contains(address) {
                Err(ChainError::Request(format!("lookup failed for {}", address)))
            } else {
                Ok(state.utxos.get(address).cloned().unwrap_or_default())
            };
            (delay, result)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn validate_address(&self, address: &str) -> Result<AddressValidation, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(match state.invalid.get(address) {
            Some(reason) => AddressValidation::invalid(reason.clone()),
            None => AddressValidation::valid(),
        })
    }
}

/// Bulk backend answering from a [`MockChainClient`]'s state
pub struct MockBulkOperations {
    chain: MockChainClient,
    activity_requests: Mutex<Vec<Vec<String>>>,
    utxo_fetch_requests: Mutex<Vec<Vec<String>>>,
    fail_activity: Mutex<bool>,
    fail_fetch: Mutex<bool>,
}

impl Default for MockBulkOperations {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBulkOperations {
    pub fn new() -> Self {
        Self::sharing(&MockChainClient::new())
    }

    /// Answer from the same state `chain` serves individual lookups from
    pub fn sharing(chain: &MockChainClient) -> Self {
        Self {
            chain: chain.clone(),
            activity_requests: Mutex::new(Vec::new()),
            utxo_fetch_requests: Mutex::new(Vec::new()),
            fail_activity: Mutex::new(false),
            fail_fetch: Mutex::new(false),
        }
    }

    pub fn set_utxos(&self, address: &str, utxos: Vec<Utxo>) {
        self.chain.set_utxos(address, utxos);
    }

    pub fn set_activity_only(&self, address: &str) {
        self.chain.set_activity_only(address);
    }

    pub fn fail_activity_checks(&self, fail: bool) {
        *self.fail_activity.lock().unwrap() = fail;
    }

    pub fn fail_utxo_fetch(&self, fail: bool) {
        *self.fail_fetch.lock().unwrap() = fail;
    }

    pub fn activity_requests(&self) -> Vec<Vec<String>> {
        self.activity_requests.lock().unwrap().clone()
    }

    pub fn utxo_fetch_requests(&self) -> Vec<Vec<String>> {
        self.utxo_fetch_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BulkOperations for MockBulkOperations {
    async fn bulk_address_activity_check(
        &self,
        addresses: &[String],
    ) -> Result<Vec<AddressActivity>, ChainError> {
        self.activity_requests.lock().unwrap().push(addresses.to_vec());
        if *self.fail_activity.lock().unwrap() {
            return Err(ChainError::Unsupported("activity check".to_string()));
        }

        Ok(addresses
            .iter()
            .map(|address| {
                let has_activity = self.chain.has_activity(address);
                AddressActivity {
                    address: address.clone(),
                    has_activity,
                    tx_count: u32::from(has_activity),
                }
            })
            .collect())
    }

    async fn bulk_address_utxo_fetch(
        &self,
        addresses: &[String],
    ) -> Result<Vec<AddressUtxos>, ChainError> {
        self.utxo_fetch_requests.lock().unwrap().push(addresses.to_vec());
        if *self.fail_fetch.lock().unwrap() {
            return Err(ChainError::Timeout);
        }

        Ok(addresses
            .iter()
            .map(|address| AddressUtxos {
                address: address.clone(),
                utxos: self.chain.utxos_of(address),
            })
            .collect())
    }
}
