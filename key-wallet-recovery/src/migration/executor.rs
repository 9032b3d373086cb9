//! Migration execution
//!
//! Plans are snapshots: by the time one is executed some of its outputs may
//! have been spent. The [`Migrator`] therefore re-lists live UTXOs for every
//! source and only ever builds and signs from those.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::fee::estimate_consolidation_fee;
use super::plan::{MigrationPlan, MigrationResult};
use crate::error::MigrationError;
use crate::interface::{ChainClient, KeyDeriver, SigHashType, TransactionBuilder};
use crate::seed::Seed;
use crate::types::{Utxo, total_amount};

/// Executes and validates migration plans
pub struct Migrator {
    client: Arc<dyn ChainClient>,
    deriver: Arc<dyn KeyDeriver>,
    builder: Arc<dyn TransactionBuilder>,
    sighash_type: SigHashType,
}

impl Migrator {
    pub fn new(
        client: Arc<dyn ChainClient>,
        deriver: Arc<dyn KeyDeriver>,
        builder: Arc<dyn TransactionBuilder>,
    ) -> Self {
        Self {
            client,
            deriver,
            builder,
            sighash_type: SigHashType::All,
        }
    }

    pub fn with_sighash_type(mut self, sighash_type: SigHashType) -> Self {
        self.sighash_type = sighash_type;
        self
    }

    /// Build, sign and broadcast the consolidation described by `plan`.
    ///
    /// Every failure aborts before broadcast. Signing keys are derived from
    /// `seed` one input at a time and wiped as soon as that input is signed.
    pub async fn execute(
        &self,
        seed: &Seed,
        plan: &MigrationPlan,
    ) -> Result<MigrationResult, MigrationError> {
        if plan.sources.is_empty() {
            return Err(MigrationError::EmptyPlan);
        }
        if seed.is_empty() {
            return Err(MigrationError::EmptySeed);
        }
        if plan.destination.trim().is_empty() {
            return Err(MigrationError::EmptyDestination);
        }

        let validation = self.client.validate_address(&plan.destination).await?;
        if !validation.is_valid {
            return Err(MigrationError::InvalidDestination(
                validation.reason.unwrap_or_else(|| plan.destination.clone()),
            ));
        }

        // Live inputs, each tagged with the plan source it belongs to
        let mut inputs: Vec<Utxo> = Vec::new();
        let mut input_sources: Vec<usize> = Vec::new();
        let mut listed = HashSet::with_capacity(plan.sources.len());
        for (source_index, source) in plan.sources.iter().enumerate() {
            if !listed.insert(source.address.as_str()) {
                continue;
            }
            let utxos = self.client.list_utxos(&source.address).await?;
            debug!("Source {} has {} live UTXOs", source.address, utxos.len());
            input_sources.extend(std::iter::repeat_n(source_index, utxos.len()));
            inputs.extend(utxos);
        }
        if inputs.is_empty() {
            return Err(MigrationError::NoInputs);
        }

        let total_input = total_amount(&inputs);
        let fee = estimate_consolidation_fee(inputs.len(), plan.fee_rate);
        if fee >= total_input {
            return Err(MigrationError::Dust {
                fee,
                total_input,
            });
        }
        let amount = total_input - fee;

        let mut tx = self.builder.build_consolidation_tx(&inputs, &plan.destination, amount).await?;

        for (input_index, &source_index) in input_sources.iter().enumerate() {
            let source = &plan.sources[source_index];
            let key = self.deriver.derive_private_key(seed, &source.path)?;
            tx = self.builder.sign_input(tx, input_index, &key, self.sighash_type).await?;
        }

        let txid = self.builder.broadcast_tx(&tx).await?;

        let mut source_addresses: Vec<String> = Vec::new();
        for &source_index in &input_sources {
            let address = &plan.sources[source_index].address;
            if source_addresses.last() != Some(address) {
                source_addresses.push(address.clone());
            }
        }

        info!(
            "Migrated {} sat from {} inputs to {} (fee {} sat): {}",
            amount,
            inputs.len(),
            plan.destination,
            fee,
            txid
        );

        Ok(MigrationResult {
            txid,
            total_migrated: amount,
            fee,
            input_count: inputs.len(),
            source_addresses,
            destination: plan.destination.clone(),
        })
    }

    /// Check that every source still holds exactly the balance the plan
    /// recorded, and that the sources add up to the plan's total.
    pub async fn validate_plan(&self, plan: &MigrationPlan) -> Result<(), MigrationError> {
        if plan.sources.is_empty() {
            return Err(MigrationError::EmptyPlan);
        }

        let mut live_total = 0u64;
        let mut listed = HashSet::with_capacity(plan.sources.len());
        for source in &plan.sources {
            if !listed.insert(source.address.as_str()) {
                continue;
            }
            let live = total_amount(&self.client.list_utxos(&source.address).await?);
            if live != source.balance {
                return Err(MigrationError::StalePlan(format!(
                    "{} holds {} sat, plan recorded {} sat",
                    source.address, live, source.balance
                )));
            }
            live_total = live_total.saturating_add(live);
        }

        if live_total != plan.total_input {
            return Err(MigrationError::StalePlan(format!(
                "sources hold {} sat in total, plan recorded {} sat",
                live_total, plan.total_input
            )));
        }
        Ok(())
    }
}
