use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TxBuilderError;
use crate::interface::{RawTransaction, SigHashType, TransactionBuilder};
use crate::types::Utxo;

/// A consolidation handed to `build_consolidation_tx`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    pub inputs: Vec<Utxo>,
    pub destination: String,
    pub amount: u64,
}

/// Records every build, sign and broadcast call
#[derive(Default)]
pub struct MockTransactionBuilder {
    built: Mutex<Vec<BuiltTransaction>>,
    signed: Mutex<Vec<(usize, Vec<u8>, SigHashType)>>,
    broadcasts: Mutex<Vec<RawTransaction>>,
    fail_build: Mutex<bool>,
    fail_sign_at: Mutex<Option<usize>>,
    fail_broadcast: Mutex<bool>,
}

impl MockTransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build(&self, fail: bool) {
        *self.fail_build.lock().unwrap() = fail;
    }

    pub fn fail_sign_at(&self, index: usize) {
        *self.fail_sign_at.lock().unwrap() = Some(index);
    }

    pub fn fail_broadcast(&self, fail: bool) {
        *self.fail_broadcast.lock().unwrap() = fail;
    }

    pub fn built(&self) -> Vec<BuiltTransaction> {
        self.built.lock().unwrap().clone()
    }

    /// `(input index, key bytes, sighash)` per signing call
    pub fn signed(&self) -> Vec<(usize, Vec<u8>, SigHashType)> {
        self.signed.lock().unwrap().clone()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionBuilder for MockTransactionBuilder {
    async fn build_consolidation_tx(
        &self,
        inputs: &[Utxo],
        destination: &str,
        amount: u64,
    ) -> Result<RawTransaction, TxBuilderError> {
        if *self.fail_build.lock().unwrap() {
            return Err(TxBuilderError::Build("mock build failure".to_string()));
        }
        self.built.lock().unwrap().push(BuiltTransaction {
            inputs: inputs.to_vec(),
            destination: destination.to_string(),
            amount,
        });
        Ok(RawTransaction(format!("{}:{}:{}", inputs.len(), destination, amount).into_bytes()))
    }

    async fn sign_input(
        &self,
        mut tx: RawTransaction,
        index: usize,
        key: &[u8],
        sighash_type: SigHashType,
    ) -> Result<RawTransaction, TxBuilderError> {
        if *self.fail_sign_at.lock().unwrap() == Some(index) {
            return Err(TxBuilderError::Sign {
                index,
                reason: "mock signing failure".to_string(),
            });
        }
        self.signed.lock().unwrap().push((index, key.to_vec(), sighash_type));
        tx.0.push(sighash_type.to_u32() as u8);
        Ok(tx)
    }

    async fn broadcast_tx(&self, tx: &RawTransaction) -> Result<String, TxBuilderError> {
        if *self.fail_broadcast.lock().unwrap() {
            return Err(TxBuilderError::Broadcast("mock broadcast rejected".to_string()));
        }
        let mut broadcasts = self.broadcasts.lock().unwrap();
        broadcasts.push(tx.clone());
        Ok(format!("{:064x}", broadcasts.len()))
    }
}
