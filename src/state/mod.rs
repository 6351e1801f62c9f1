/// Persistence layer.
///
/// The rest of the crate consumes the `Store` trait and never touches SQL.
/// Two implementations exist: `postgres::Postgres` for production and
/// `memory::Memory`, a faithful in-process mirror of the same semantics
/// that the tests run against.
pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::secrets::{Key, Secret};

/// A page boundary for the listing calls. Listings walk rows in ascending
/// id order, `limit` at a time.
pub const LIST_PAGE_SIZE: i64 = 50;

/// Row counts reported by `metrics`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Metrics {
    pub secrets: i64,
    pub keys: i64,
}

/// Summary row returned by `list_secrets`; ciphertext stays in the store.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SecretInfo {
    pub id: i64,
    pub name: String,
    pub root: bool,
    pub key_id: i64,
}

/// Summary row returned by `list_keys`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyInfo {
    pub id: i64,
    pub name: String,
    pub read_only: bool,
}

/// The contract the vault core expects from its store.
///
/// `add_secret` and `update_secret` assign ids back onto the entities they
/// persist. Root secrets are unique per name; when several root rows share
/// a name (the update history), the row with the smallest id is "the"
/// secret — reads pick the oldest.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a Secret and, when its embedded Key is named and not yet
    /// stored, that Key first (reused by name otherwise). Atomic across
    /// the two tables. Fails with `Duplicate` for a second root row with
    /// the same name.
    async fn add_secret(&self, secret: &mut Secret) -> Result<()>;

    /// Insert a Key.
    async fn add_key(&self, key: &mut Key) -> Result<()>;

    /// Fetch a Key by name.
    async fn get_key(&self, name: &str) -> Result<Key>;

    /// Fetch the root Secret for `name`, smallest id first, with its
    /// embedded Key resolved.
    async fn get_root_secret(&self, name: &str) -> Result<Secret>;

    /// Fetch the shared Secret linking `name` to the Key called
    /// `key_name`. The Key is resolved first; the share is matched on its
    /// id.
    async fn get_shared_secret(&self, name: &str, key_name: &str) -> Result<Secret>;

    /// Persist an updated Secret as a NEW row. History is retained; reads
    /// keep returning the oldest row (see `get_root_secret`).
    async fn update_secret(&self, secret: &mut Secret) -> Result<()>;

    /// Delete a Secret by id. Refuses the master record. Shares of a
    /// deleted root are not cascaded.
    async fn delete_secret(&self, secret: &Secret) -> Result<()>;

    /// Delete a Key by id. Refuses the master key.
    async fn delete_key(&self, key: &Key) -> Result<()>;

    /// Page through secrets in ascending id order, optionally only those
    /// shared with (or keyed by) the named Key.
    async fn list_secrets(
        &self,
        key_name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SecretInfo>>;

    /// Page through keys in ascending id order, optionally only those
    /// with access to the named secret.
    async fn list_keys(
        &self,
        secret_name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KeyInfo>>;

    /// Liveness check against the backing store.
    async fn ping(&self) -> Result<()>;

    /// Row counts for the metrics endpoint.
    async fn metrics(&self) -> Result<Metrics>;
}
