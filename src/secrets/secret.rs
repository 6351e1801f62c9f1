/// Secret envelopes.
///
/// A *root* secret is the canonical ciphertext of a user message, sealed
/// under a per-secret key that is itself stored wrapped under the master
/// key. A *shared* secret re-encrypts that per-secret key to one grantee:
/// the box is sealed with the master scalar against the grantee's public
/// key, and `pubkey` records the master's public point so the grantee can
/// open it later without the master key being live.
use uuid::Uuid;
use zeroize::Zeroize;

use crate::crypto::aead::{self, NONCE_LEN};
use crate::crypto::boxes;
use crate::crypto::sensitive::{SensitiveBytes32, SensitiveVec};
use crate::error::{Result, VaultError};
use crate::master;
use crate::secrets::Key;

/// Seal a plaintext under a key's unwrapped scalar with a fresh nonce.
fn seal_under(key: &Key, plaintext: &SensitiveVec) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let nonce = aead::generate_nonce()?;
    let raw = key
        .raw()
        .ok_or(VaultError::InvalidInput("key material is not unwrapped"))?;
    let message = aead::seal_sym(raw, &nonce, plaintext.as_bytes())?;
    Ok((nonce, message))
}

/// Cloning a Secret clones its embedded Key, which never carries the
/// transient raw scalar.
#[derive(Clone)]
pub struct Secret {
    /// Database identifier; 0 until persisted.
    pub id: i64,
    /// User-visible identifier. Shared rows carry the root's name.
    pub name: String,
    /// Root: secretbox of the message under the per-secret key.
    /// Shared: box of the per-secret key for the grantee.
    pub message: Vec<u8>,
    /// Fresh random nonce for `message`.
    pub nonce: [u8; NONCE_LEN],
    /// Shared rows only: the master's public point at share time.
    pub pubkey: Option<[u8; 32]>,
    /// Root: the per-secret key row. Shared: the grantee key row.
    pub key_id: i64,
    /// The key row `key_id` points at, resolved by the persistence layer.
    pub key: Key,
    /// Distinguishes root envelopes from shared ones.
    pub root: bool,
}

impl Secret {
    /// Create a root secret sealing `plaintext` under a freshly generated
    /// per-secret key. Requires the vault to be unsealed; refuses the
    /// reserved master name. The plaintext is wiped when this returns,
    /// on success and on failure alike.
    pub fn new(name: &str, plaintext: SensitiveVec) -> Result<Self> {
        if master::is_sealed() {
            return Err(VaultError::Sealed);
        }
        if name == "master" {
            return Err(VaultError::ReservedName);
        }
        if !super::valid_name(name) {
            return Err(VaultError::InvalidInput("invalid secret name"));
        }

        let mut key = Key::generate(&Uuid::new_v4().to_string())?;
        let sealed = seal_under(&key, &plaintext);
        let wrapped = key.wrap();
        let (nonce, message) = sealed?;
        wrapped?;

        Ok(Self {
            id: 0,
            name: name.to_owned(),
            message,
            nonce,
            pubkey: None,
            key_id: key.id,
            key,
            root: true,
        })
    }

    /// Re-encrypt this root secret with a new message under its existing
    /// per-secret key and a fresh nonce. Existing shares keep working: the
    /// per-secret key does not change. Requires the vault to be unsealed.
    pub fn update(&mut self, plaintext: SensitiveVec) -> Result<()> {
        if master::is_sealed() {
            return Err(VaultError::Sealed);
        }

        self.key.unwrap()?;
        // Wrap runs even when sealing fails, so the unwrapped scalar never
        // survives an error return.
        let sealed = seal_under(&self.key, &plaintext);
        let wrapped = self.key.wrap();
        let (nonce, message) = sealed?;
        wrapped?;

        self.nonce = nonce;
        self.message = message;
        Ok(())
    }

    /// Grant `grantee` access to this root secret. The per-secret key is
    /// boxed to the grantee's public key with the master scalar as sender;
    /// the master's public point is captured so the box stays openable
    /// after the vault seals. Requires the vault to be unsealed.
    pub fn share(&mut self, grantee: &Key) -> Result<Secret> {
        if master::is_sealed() {
            return Err(VaultError::Sealed);
        }

        self.key.unwrap()?;
        let nonce = aead::generate_nonce()?;

        let sealed = master::with_key(|mk| {
            let raw = self
                .key
                .raw()
                .ok_or(VaultError::InvalidInput("key material is not unwrapped"))?;
            let message = boxes::seal_asym(mk, &grantee.public, &nonce, raw.as_bytes())?;
            Ok((boxes::scalar_base_mult(mk), message))
        });
        self.key.zero();
        let (pubkey, message) = sealed?;

        Ok(Secret {
            id: 0,
            name: self.name.clone(),
            message,
            nonce,
            pubkey: Some(pubkey),
            key_id: grantee.id,
            key: grantee.clone(),
            root: false,
        })
    }

    /// Recover the message of this root secret through a shared envelope,
    /// using the grantee's private scalar. Works regardless of the sealed
    /// state: the master key is never read, only the public point stored
    /// in the share. The supplied scalar is consumed and wiped.
    pub fn decrypt(&self, shared: &Secret, key: SensitiveBytes32) -> Result<SensitiveVec> {
        let pubkey = shared
            .pubkey
            .as_ref()
            .ok_or(VaultError::InvalidInput("share carries no public key"))?;

        let mut buf = boxes::open_asym(&key, pubkey, &shared.nonce, &shared.message)?;
        let inner = SensitiveBytes32::from_slice(&buf);
        buf.zeroize();
        let inner = inner.ok_or(VaultError::DecryptFailed)?;

        let message = aead::open_sym(&inner, &self.nonce, &self.message)?;
        Ok(SensitiveVec::new(message))
    }

    /// The Secret produced by `master::initialise`: the master key sealed
    /// under its wrapping key, under the reserved name.
    pub(crate) fn master_record(message: Vec<u8>, nonce: [u8; NONCE_LEN], key: Key) -> Self {
        Self {
            id: 0,
            name: "master".to_owned(),
            message,
            nonce,
            pubkey: None,
            key_id: key.id,
            key,
            root: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master;

    fn unsealed_vault() -> Secret {
        let master_secret = master::initialise().unwrap();
        assert!(!master::is_sealed());
        master_secret
    }

    #[test]
    fn test_new_requires_unsealed() {
        let _guard = master::testing::exclusive();

        assert!(matches!(
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())),
            Err(VaultError::Sealed)
        ));
    }

    #[test]
    fn test_new_refuses_reserved_name() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        assert!(matches!(
            Secret::new("master", SensitiveVec::new(b"x".to_vec())),
            Err(VaultError::ReservedName)
        ));

        master::seal();
    }

    #[test]
    fn test_new_wraps_per_secret_key() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let secret = Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        assert!(secret.root);
        assert!(secret.key.raw().is_none());
        assert!(!secret.key.wrapped_private.is_empty());

        master::seal();
    }

    #[test]
    fn test_share_and_decrypt_roundtrip() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let mut secret =
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        let grantee = Key::generate("alice").unwrap();
        let grantee_scalar = grantee.raw().unwrap().clone();

        let shared = secret.share(&grantee).unwrap();
        assert!(!shared.root);
        assert_eq!(shared.name, secret.name);
        assert!(shared.pubkey.is_some());
        assert!(secret.key.raw().is_none());

        let message = secret.decrypt(&shared, grantee_scalar).unwrap();
        assert_eq!(message.as_bytes(), b"hunter2");

        master::seal();
    }

    #[test]
    fn test_decrypt_works_while_sealed() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let mut secret =
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        let grantee = Key::generate("alice").unwrap();
        let grantee_scalar = grantee.raw().unwrap().clone();
        let shared = secret.share(&grantee).unwrap();

        master::seal();
        assert!(master::is_sealed());

        let message = secret.decrypt(&shared, grantee_scalar).unwrap();
        assert_eq!(message.as_bytes(), b"hunter2");
    }

    #[test]
    fn test_update_keeps_existing_shares_valid() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let mut secret =
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        let grantee = Key::generate("alice").unwrap();
        let grantee_scalar = grantee.raw().unwrap().clone();
        let shared = secret.share(&grantee).unwrap();

        let old_nonce = secret.nonce;
        secret
            .update(SensitiveVec::new(b"hunter3".to_vec()))
            .unwrap();
        assert_ne!(secret.nonce, old_nonce);

        // Same per-secret key, so the share issued before the update
        // still opens the new message.
        let message = secret.decrypt(&shared, grantee_scalar).unwrap();
        assert_eq!(message.as_bytes(), b"hunter3");

        master::seal();
    }

    #[test]
    fn test_sealed_refusals_and_decrypt_exception() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let mut secret =
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        let grantee = Key::generate("alice").unwrap();
        let grantee_scalar = grantee.raw().unwrap().clone();
        let shared = secret.share(&grantee).unwrap();

        master::seal();

        assert!(matches!(
            Secret::new("other", SensitiveVec::new(b"x".to_vec())),
            Err(VaultError::Sealed)
        ));
        assert!(matches!(
            secret.update(SensitiveVec::new(b"x".to_vec())),
            Err(VaultError::Sealed)
        ));
        assert!(matches!(secret.share(&grantee), Err(VaultError::Sealed)));

        // decrypt is the exception: it runs in sealed state.
        let message = secret.decrypt(&shared, grantee_scalar).unwrap();
        assert_eq!(message.as_bytes(), b"hunter2");
    }

    #[test]
    fn test_tampering_is_detected() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let mut secret =
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        let grantee = Key::generate("alice").unwrap();
        let grantee_scalar = grantee.raw().unwrap().clone();
        let shared = secret.share(&grantee).unwrap();

        let mut tampered_root = secret.clone();
        tampered_root.message[0] ^= 0x01;
        assert!(matches!(
            tampered_root.decrypt(&shared, grantee_scalar.clone()),
            Err(VaultError::DecryptFailed)
        ));

        let mut tampered_share = shared.clone();
        tampered_share.message[0] ^= 0x01;
        assert!(matches!(
            secret.decrypt(&tampered_share, grantee_scalar.clone()),
            Err(VaultError::DecryptFailed)
        ));

        let mut bad_pubkey = shared.clone();
        if let Some(pubkey) = bad_pubkey.pubkey.as_mut() {
            pubkey[0] ^= 0x01;
        }
        assert!(matches!(
            secret.decrypt(&bad_pubkey, grantee_scalar),
            Err(VaultError::DecryptFailed)
        ));

        master::seal();
    }

    #[test]
    fn test_decrypt_with_wrong_scalar_fails() {
        let _guard = master::testing::exclusive();
        unsealed_vault();

        let mut secret =
            Secret::new("db-password", SensitiveVec::new(b"hunter2".to_vec())).unwrap();
        let grantee = Key::generate("alice").unwrap();
        let intruder = Key::generate("mallory").unwrap();
        let intruder_scalar = intruder.raw().unwrap().clone();
        let shared = secret.share(&grantee).unwrap();

        assert!(matches!(
            secret.decrypt(&shared, intruder_scalar),
            Err(VaultError::DecryptFailed)
        ));

        master::seal();
    }

}
