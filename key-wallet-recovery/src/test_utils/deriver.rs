use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use zeroize::Zeroizing;

use crate::error::DerivationError;
use crate::interface::{DerivedAddress, KeyDeriver};
use crate::scheme::PathScheme;
use crate::seed::Seed;

// Addresses embed the first seed bytes so different passphrase seeds
// produce disjoint address sets.
fn seed_tag(seed: &Seed) -> String {
    let bytes = seed.as_bytes();
    hex::encode(&bytes[..bytes.len().min(4)])
}

fn bip44_address(seed: &Seed, coin_type: u32, account: u32, change: u32, index: u32) -> String {
    format!("{}-{}/{}/{}/{}", seed_tag(seed), coin_type, account, change, index)
}

fn legacy_address(seed: &Seed, index: u32) -> String {
    format!("{}-legacy/{}", seed_tag(seed), index)
}

/// Address the mock deriver produces for `scheme` at the given position
pub fn address_for(
    seed: &Seed,
    scheme: &PathScheme,
    account: u32,
    is_change: bool,
    index: u32,
) -> String {
    if scheme.is_legacy {
        legacy_address(seed, index)
    } else {
        bip44_address(seed, scheme.coin_type, account, u32::from(is_change), index)
    }
}

/// Path the mock deriver reports for `scheme` at the given position
pub fn path_for(scheme: &PathScheme, account: u32, is_change: bool, index: u32) -> String {
    if scheme.is_legacy {
        format!("legacy/{}", index)
    } else {
        format!(
            "m/44'/{}'/{}'/{}/{}",
            scheme.coin_type,
            account,
            u32::from(is_change),
            index
        )
    }
}

/// Seed the mock deriver selects for `passphrase`
pub fn passphrase_seed(seed: &Seed, passphrase: &str) -> Seed {
    let mut bytes = passphrase.as_bytes().to_vec();
    bytes.extend_from_slice(seed.as_bytes());
    Seed::new(bytes)
}

/// Deterministic deriver producing readable addresses
pub struct MockKeyDeriver {
    passphrase_support: bool,
    fail_at: Mutex<Option<u32>>,
    fail_private_keys: Mutex<bool>,
    bip44_calls: AtomicUsize,
    legacy_calls: AtomicUsize,
    key_requests: Mutex<Vec<String>>,
}

impl Default for MockKeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKeyDeriver {
    pub fn new() -> Self {
        Self {
            passphrase_support: true,
            fail_at: Mutex::new(None),
            fail_private_keys: Mutex::new(false),
            bip44_calls: AtomicUsize::new(0),
            legacy_calls: AtomicUsize::new(0),
            key_requests: Mutex::new(Vec::new()),
        }
    }

    /// A deriver relying on the default `seed_for_passphrase`
    pub fn without_passphrase_support() -> Self {
        Self {
            passphrase_support: false,
            ..Self::new()
        }
    }

    /// Fail every address derivation at `index`
    pub fn fail_derivation_at(&self, index: u32) {
        *self.fail_at.lock().unwrap() = Some(index);
    }

    pub fn fail_private_keys(&self, fail: bool) {
        *self.fail_private_keys.lock().unwrap() = fail;
    }

    pub fn bip44_calls(&self) -> usize {
        self.bip44_calls.load(Ordering::SeqCst)
    }

    pub fn legacy_calls(&self) -> usize {
        self.legacy_calls.load(Ordering::SeqCst)
    }

    /// Paths passed to `derive_private_key`, in call order
    pub fn private_key_requests(&self) -> Vec<String> {
        self.key_requests.lock().unwrap().clone()
    }

    fn check_index(&self, index: u32) -> Result<(), DerivationError> {
        if *self.fail_at.lock().unwrap() == Some(index) {
            return Err(DerivationError::Failed(format!("mock failure at index {}", index)));
        }
        Ok(())
    }
}

impl KeyDeriver for MockKeyDeriver {
    fn derive_address(
        &self,
        seed: &Seed,
        coin_type: u32,
        account: u32,
        change: u32,
        index: u32,
    ) -> Result<DerivedAddress, DerivationError> {
        self.bip44_calls.fetch_add(1, Ordering::SeqCst);
        self.check_index(index)?;
        Ok(DerivedAddress {
            address: bip44_address(seed, coin_type, account, change, index),
            path: format!("m/44'/{}'/{}'/{}/{}", coin_type, account, change, index),
        })
    }

    fn derive_legacy_address(
        &self,
        seed: &Seed,
        index: u32,
    ) -> Result<DerivedAddress, DerivationError> {
        self.legacy_calls.fetch_add(1, Ordering::SeqCst);
        self.check_index(index)?;
        Ok(DerivedAddress {
            address: legacy_address(seed, index),
            path: format!("legacy/{}", index),
        })
    }

    fn derive_private_key(
        &self,
        _seed: &Seed,
        path: &str,
    ) -> Result<Zeroizing<Vec<u8>>, DerivationError> {
        self.key_requests.lock().unwrap().push(path.to_string());
        if *self.fail_private_keys.lock().unwrap() {
            return Err(DerivationError::InvalidPath(path.to_string()));
        }
        Ok(Zeroizing::new(path.as_bytes().to_vec()))
    }

    fn seed_for_passphrase(&self, seed: &Seed, passphrase: &str) -> Result<Seed, DerivationError> {
        if !self.passphrase_support {
            return Err(DerivationError::PassphraseUnsupported);
        }
        Ok(passphrase_seed(seed, passphrase))
    }
}
