//! Collaborator interfaces
//!
//! The recovery engine owns no cryptography and no networking. Key
//! derivation, chain queries and transaction mechanics are supplied by the
//! caller through the traits in this module.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::{ChainError, DerivationError, TxBuilderError};
use crate::seed::Seed;
use crate::types::Utxo;

/// An address together with the path it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: String,
    pub path: String,
}

/// Outcome of an address validity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressValidation {
    pub is_valid: bool,
    /// Reason reported by the client when the address is invalid
    pub reason: Option<String>,
}

impl AddressValidation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Whether an address has ever appeared on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressActivity {
    pub address: String,
    pub has_activity: bool,
    pub tx_count: u32,
}

/// UTXOs held by one address in a bulk fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressUtxos {
    pub address: String,
    pub utxos: Vec<Utxo>,
}

/// Opaque serialized transaction passed between build, sign and broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction(pub Vec<u8>);

/// Signature hash type used when signing consolidation inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigHashType {
    All,
    None,
    Single,
    AllAnyoneCanPay,
}

impl SigHashType {
    /// Consensus encoding of the sighash flag
    pub fn to_u32(self) -> u32 {
        match self {
            SigHashType::All => 0x01,
            SigHashType::None => 0x02,
            SigHashType::Single => 0x03,
            SigHashType::AllAnyoneCanPay => 0x81,
        }
    }
}

/// Per-chain RPC access
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// List the unspent outputs currently held by `address`
    async fn list_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainError>;

    /// Check that `address` is well formed for this chain
    async fn validate_address(&self, address: &str) -> Result<AddressValidation, ChainError>;
}

/// Optional batched queries that accelerate discovery
#[async_trait]
pub trait BulkOperations: Send + Sync {
    /// Report which of `addresses` have any on-chain history
    async fn bulk_address_activity_check(
        &self,
        addresses: &[String],
    ) -> Result<Vec<AddressActivity>, ChainError>;

    /// Fetch the UTXOs of every address in `addresses`
    async fn bulk_address_utxo_fetch(
        &self,
        addresses: &[String],
    ) -> Result<Vec<AddressUtxos>, ChainError>;
}

/// HD key derivation from a seed
pub trait KeyDeriver: Send + Sync {
    /// Derive the BIP44 address `m/44'/coin_type'/account'/change/index`
    fn derive_address(
        &self,
        seed: &Seed,
        coin_type: u32,
        account: u32,
        change: u32,
        index: u32,
    ) -> Result<DerivedAddress, DerivationError>;

    /// Derive the address at `index` of the legacy (non-BIP44) chain
    fn derive_legacy_address(
        &self,
        seed: &Seed,
        index: u32,
    ) -> Result<DerivedAddress, DerivationError>;

    /// Derive the private key for `path`. The returned bytes are wiped on drop.
    fn derive_private_key(
        &self,
        seed: &Seed,
        path: &str,
    ) -> Result<Zeroizing<Vec<u8>>, DerivationError>;

    /// Produce the seed that `passphrase` selects for the wallet behind `seed`.
    fn seed_for_passphrase(&self, _seed: &Seed, _passphrase: &str) -> Result<Seed, DerivationError> {
        Err(DerivationError::PassphraseUnsupported)
    }
}

/// Transaction construction, signing and broadcast
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    /// Build an unsigned transaction spending `inputs` into a single output
    async fn build_consolidation_tx(
        &self,
        inputs: &[Utxo],
        destination: &str,
        amount: u64,
    ) -> Result<RawTransaction, TxBuilderError>;

    /// Sign input `index` of `tx` with `key`
    async fn sign_input(
        &self,
        tx: RawTransaction,
        index: usize,
        key: &[u8],
        sighash_type: SigHashType,
    ) -> Result<RawTransaction, TxBuilderError>;

    /// Broadcast `tx`, returning its transaction id
    async fn broadcast_tx(&self, tx: &RawTransaction) -> Result<String, TxBuilderError>;
}
