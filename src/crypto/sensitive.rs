/// Wrappers for sensitive key material that is automatically zeroized on drop.
///
/// Every private scalar, unwrapped key and plaintext in the crate lives inside
/// one of these two types. Dropping the owner wipes the bytes; the zeroize
/// crate guarantees the writes are not elided.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// A 32-byte sensitive value that is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes32([u8; 32]);

impl SensitiveBytes32 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Decode user-supplied key material (standard padded base64 of exactly
    /// 32 bytes). The intermediate decode buffer is wiped before returning.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut buf = STANDARD
            .decode(encoded)
            .map_err(|_| VaultError::InvalidInput("malformed base64 key"))?;
        let out = Self::from_slice(&buf);
        buf.zeroize();
        out.ok_or(VaultError::InvalidInput("key must be 32 bytes"))
    }

    /// Encode for display to the end user. The caller gets a plain String;
    /// transporting and discarding it is the caller's responsibility.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl AsRef<[u8]> for SensitiveBytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A variable-length sensitive buffer that is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveVec(Vec<u8>);

impl SensitiveVec {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

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

impl AsRef<[u8]> for SensitiveVec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for SensitiveVec {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<String> for SensitiveVec {
    fn from(data: String) -> Self {
        Self(data.into_bytes())
    }
}
