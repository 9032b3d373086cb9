//! Wallet seed wrapper
//!
//! The recovery engine never inspects seed bytes; it only hands them to the
//! [`KeyDeriver`](crate::interface::KeyDeriver). The wrapper keeps them out of
//! logs and wipes them on drop.

use core::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{RecoveryError, Result};

/// Raw seed bytes, zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Create a new seed from bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create a seed from a slice
    pub fn from_slice(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }

    /// Create a seed from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| RecoveryError::InvalidSeed(format!("Invalid hex: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Get the seed as a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed([REDACTED; {}])", self.0.len())
    }
}

impl From<Vec<u8>> for Seed {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
