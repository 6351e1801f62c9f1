/// Database row models.
///
/// These structs map one-to-one onto the `keys` and `secrets` tables and
/// convert into the crate's entities. Byte columns come back as `BYTEA`
/// blobs; fixed-size fields are length-checked during conversion so a
/// corrupted row surfaces as an error instead of a panic.
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::crypto::aead::NONCE_LEN;
use crate::error::{Result, VaultError};
use crate::secrets::{Key, Secret};

#[derive(Debug, Clone, FromRow)]
pub struct KeyRow {
    pub id: i64,
    pub name: String,
    pub public: Vec<u8>,
    pub wrapped_private: Vec<u8>,
    pub nonce: Vec<u8>,
    pub read_only: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SecretRow {
    pub id: i64,
    pub name: String,
    pub message: Vec<u8>,
    pub nonce: Vec<u8>,
    pub pubkey: Option<Vec<u8>>,
    pub key_id: i64,
    pub root: bool,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn nonce_from(bytes: &[u8]) -> Result<[u8; NONCE_LEN]> {
    bytes
        .try_into()
        .map_err(|_| VaultError::Storage("stored nonce has wrong length".into()))
}

pub(crate) fn point_from(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| VaultError::Storage("stored public key has wrong length".into()))
}

impl KeyRow {
    pub fn into_key(self) -> Result<Key> {
        Ok(Key::from_parts(
            self.id,
            self.name,
            point_from(&self.public)?,
            self.wrapped_private,
            nonce_from(&self.nonce)?,
            self.read_only,
        ))
    }
}

impl SecretRow {
    /// Assemble a Secret from its row and the resolved Key row.
    pub fn into_secret(self, key: Key) -> Result<Secret> {
        Ok(Secret {
            id: self.id,
            name: self.name,
            message: self.message,
            nonce: nonce_from(&self.nonce)?,
            pubkey: self.pubkey.as_deref().map(point_from).transpose()?,
            key_id: self.key_id,
            key,
            root: self.root,
        })
    }
}
