/// User and per-secret credentials.
///
/// A Key is an X25519 keypair. The public half is stored as-is; the private
/// scalar is stored wrapped under the master key and exists in memory only
/// between `unwrap` and the next `wrap`/`zero`. Cloning a Key never clones
/// the raw scalar.
use zeroize::Zeroize;

use crate::crypto::aead::{self, NONCE_LEN};
use crate::crypto::boxes;
use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{Result, VaultError};
use crate::master;

pub struct Key {
    /// Database identifier; 0 until persisted.
    pub id: i64,
    /// Globally unique, user-visible name.
    pub name: String,
    /// X25519 public key.
    pub public: [u8; 32],
    /// Private scalar sealed under the master key. Empty for the master
    /// wrapping key, which cannot be wrapped under the key it protects.
    pub wrapped_private: Vec<u8>,
    /// Nonce used for `wrapped_private`.
    pub nonce: [u8; NONCE_LEN],
    /// Read-only holders may view secrets but not mutate the vault.
    pub read_only: bool,
    /// Unwrapped private scalar. Never persisted, never serialized.
    raw: Option<SensitiveBytes32>,
}

impl Clone for Key {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            public: self.public,
            wrapped_private: self.wrapped_private.clone(),
            nonce: self.nonce,
            read_only: self.read_only,
            // The transient scalar stays with its owner.
            raw: None,
        }
    }
}

impl Key {
    /// Generate a fresh keypair under the given name. The raw scalar is
    /// present afterwards; callers either `display` it to the user or
    /// `wrap` it, and in both cases it must not outlive the operation.
    pub fn generate(name: &str) -> Result<Self> {
        if !super::valid_name(name) {
            return Err(VaultError::InvalidInput("invalid key name"));
        }

        let nonce = aead::generate_nonce()?;
        let (public, raw) = boxes::keypair();

        Ok(Self {
            id: 0,
            name: name.to_owned(),
            public,
            wrapped_private: Vec::new(),
            nonce,
            read_only: false,
            raw: Some(raw),
        })
    }

    /// Rebuild a Key from its persisted parts.
    pub fn from_parts(
        id: i64,
        name: String,
        public: [u8; 32],
        wrapped_private: Vec<u8>,
        nonce: [u8; NONCE_LEN],
        read_only: bool,
    ) -> Self {
        Self {
            id,
            name,
            public,
            wrapped_private,
            nonce,
            read_only,
            raw: None,
        }
    }

    /// Seal the raw scalar under the master key and drop it from memory.
    /// Requires the vault to be unsealed.
    pub fn wrap(&mut self) -> Result<()> {
        let raw = self.raw.as_ref().ok_or(VaultError::InvalidInput(
            "key material is not unwrapped",
        ))?;
        self.wrapped_private =
            master::with_key(|mk| aead::seal_sym(mk, &self.nonce, raw.as_bytes()))?;
        self.zero();
        Ok(())
    }

    /// Recover the raw scalar from its wrapped copy. Requires the vault to
    /// be unsealed.
    pub fn unwrap(&mut self) -> Result<()> {
        let raw = master::with_key(|mk| {
            let mut buf = aead::open_sym(mk, &self.nonce, &self.wrapped_private)?;
            let raw = SensitiveBytes32::from_slice(&buf);
            buf.zeroize();
            raw.ok_or(VaultError::DecryptFailed)
        })?;
        self.raw = Some(raw);
        Ok(())
    }

    /// Drop the raw scalar; the owner type wipes it.
    pub fn zero(&mut self) {
        self.raw = None;
    }

    /// Base64 of the raw scalar, for showing to the end user. `None` when
    /// the scalar is not currently unwrapped.
    pub fn display(&self) -> Option<String> {
        self.raw.as_ref().map(|raw| raw.to_base64())
    }

    pub(crate) fn raw(&self) -> Option<&SensitiveBytes32> {
        self.raw.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master;

    #[test]
    fn test_generate_rejects_bad_names() {
        assert!(Key::generate("").is_err());
        assert!(Key::generate("has space").is_err());
        assert!(Key::generate("slash/name").is_err());
        assert!(Key::generate("ok-name_1.2").is_ok());
    }

    #[test]
    fn test_public_matches_raw_scalar() {
        let key = Key::generate("alice").unwrap();
        assert_eq!(boxes::scalar_base_mult(key.raw().unwrap()), key.public);
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();

        let mut key = Key::generate("alice").unwrap();
        let original = *key.raw().unwrap().as_bytes();

        key.wrap().unwrap();
        assert!(key.raw().is_none());
        assert!(!key.wrapped_private.is_empty());

        key.unwrap().unwrap();
        assert_eq!(key.raw().unwrap().as_bytes(), &original);

        key.zero();
        assert!(key.raw().is_none());

        master::seal();
    }

    #[test]
    fn test_wrap_requires_unsealed() {
        let _guard = master::testing::exclusive();

        let mut key = Key::generate("alice").unwrap();
        assert!(matches!(key.wrap(), Err(VaultError::Sealed)));
    }

    #[test]
    fn test_unwrap_fails_after_reseal_with_other_master() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();

        let mut key = Key::generate("alice").unwrap();
        key.wrap().unwrap();

        // A different master key cannot open the wrapped scalar.
        master::seal();
        master::initialise().unwrap();
        assert!(matches!(key.unwrap(), Err(VaultError::DecryptFailed)));

        master::seal();
    }

    #[test]
    fn test_clone_does_not_carry_raw() {
        let key = Key::generate("alice").unwrap();
        assert!(key.raw().is_some());
        assert!(key.clone().raw().is_none());
    }
}
