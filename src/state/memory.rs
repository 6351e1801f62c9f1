/// In-process store.
///
/// Mirrors the PostgreSQL semantics row for row: ascending ids, duplicate
/// root refusal, key reuse by name, oldest-id-wins reads, insert-on-update.
/// The tests run the whole vault against this implementation; it also backs
/// local development without a database.
use std::sync::Mutex;

use async_trait::async_trait;

use super::{KeyInfo, Metrics, SecretInfo, Store};
use crate::error::{Result, VaultError};
use crate::secrets::{Key, Secret};

#[derive(Default)]
struct Inner {
    secrets: Vec<Secret>,
    keys: Vec<Key>,
    next_secret_id: i64,
    next_key_id: i64,
}

impl Inner {
    fn ensure_key(&mut self, key: &mut Key) {
        if let Some(existing) = self.keys.iter().find(|k| k.name == key.name) {
            key.id = existing.id;
            return;
        }
        self.next_key_id += 1;
        key.id = self.next_key_id;
        self.keys.push(key.clone());
    }

    fn insert_secret(&mut self, secret: &mut Secret) {
        self.next_secret_id += 1;
        secret.id = self.next_secret_id;
        self.secrets.push(secret.clone());
    }

    fn key_by_id(&self, id: i64) -> Result<Key> {
        self.keys
            .iter()
            .find(|k| k.id == id)
            .cloned()
            .ok_or(VaultError::NotFound)
    }
}

#[derive(Default)]
pub struct Memory {
    inner: Mutex<Inner>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for Memory {
    async fn add_secret(&self, secret: &mut Secret) -> Result<()> {
        let mut inner = self.lock();

        if secret.root
            && inner
                .secrets
                .iter()
                .any(|s| s.root && s.name == secret.name)
        {
            return Err(VaultError::Duplicate);
        }

        if !secret.key.name.is_empty() {
            inner.ensure_key(&mut secret.key);
            secret.key_id = secret.key.id;
        }

        inner.insert_secret(secret);
        Ok(())
    }

    async fn add_key(&self, key: &mut Key) -> Result<()> {
        self.lock().ensure_key(key);
        Ok(())
    }

    async fn get_key(&self, name: &str) -> Result<Key> {
        self.lock()
            .keys
            .iter()
            .find(|k| k.name == name)
            .cloned()
            .ok_or(VaultError::NotFound)
    }

    async fn get_root_secret(&self, name: &str) -> Result<Secret> {
        let inner = self.lock();

        // Oldest row wins when updates have stacked history under a name.
        let row = inner
            .secrets
            .iter()
            .filter(|s| s.root && s.name == name)
            .min_by_key(|s| s.id)
            .cloned()
            .ok_or(VaultError::NotFound)?;

        let key = inner.key_by_id(row.key_id)?;
        Ok(Secret { key, ..row })
    }

    async fn get_shared_secret(&self, name: &str, key_name: &str) -> Result<Secret> {
        let inner = self.lock();

        let key = inner
            .keys
            .iter()
            .find(|k| k.name == key_name)
            .cloned()
            .ok_or(VaultError::NotFound)?;

        let row = inner
            .secrets
            .iter()
            .filter(|s| !s.root && s.name == name && s.key_id == key.id)
            .min_by_key(|s| s.id)
            .cloned()
            .ok_or(VaultError::NotFound)?;

        Ok(Secret { key, ..row })
    }

    async fn update_secret(&self, secret: &mut Secret) -> Result<()> {
        self.lock().insert_secret(secret);
        Ok(())
    }

    async fn delete_secret(&self, secret: &Secret) -> Result<()> {
        if secret.id == 0 {
            return Err(VaultError::InvalidInput("no secret specified"));
        }
        if secret.name == "master" {
            return Err(VaultError::ReservedName);
        }

        let mut inner = self.lock();
        let before = inner.secrets.len();
        inner.secrets.retain(|s| s.id != secret.id);
        if inner.secrets.len() == before {
            return Err(VaultError::NotFound);
        }
        Ok(())
    }

    async fn delete_key(&self, key: &Key) -> Result<()> {
        if key.id == 0 {
            return Err(VaultError::InvalidInput("no key specified"));
        }
        if key.name == "master" {
            return Err(VaultError::ReservedName);
        }

        let mut inner = self.lock();
        let before = inner.keys.len();
        inner.keys.retain(|k| k.id != key.id);
        if inner.keys.len() == before {
            return Err(VaultError::NotFound);
        }
        Ok(())
    }

    async fn list_secrets(
        &self,
        key_name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SecretInfo>> {
        let inner = self.lock();

        let key_id = match key_name {
            Some(name) => Some(
                inner
                    .keys
                    .iter()
                    .find(|k| k.name == name)
                    .map(|k| k.id)
                    .ok_or(VaultError::NotFound)?,
            ),
            None => None,
        };

        Ok(inner
            .secrets
            .iter()
            .filter(|s| key_id.is_none_or(|id| s.key_id == id))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|s| SecretInfo {
                id: s.id,
                name: s.name.clone(),
                root: s.root,
                key_id: s.key_id,
            })
            .collect())
    }

    async fn list_keys(
        &self,
        secret_name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KeyInfo>> {
        let inner = self.lock();

        Ok(inner
            .keys
            .iter()
            .filter(|k| {
                secret_name.is_none_or(|name| {
                    inner
                        .secrets
                        .iter()
                        .any(|s| s.name == name && s.key_id == k.id)
                })
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|k| KeyInfo {
                id: k.id,
                name: k.name.clone(),
                read_only: k.read_only,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn metrics(&self) -> Result<Metrics> {
        let inner = self.lock();
        Ok(Metrics {
            secrets: inner.secrets.len() as i64,
            keys: inner.keys.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sensitive::SensitiveVec;
    use crate::master;

    #[tokio::test]
    async fn test_duplicate_root_refused() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        let mut first = Secret::new("x", SensitiveVec::new(b"one".to_vec())).unwrap();
        store.add_secret(&mut first).await.unwrap();
        assert!(first.id > 0);
        assert!(first.key_id > 0);

        let mut second = Secret::new("x", SensitiveVec::new(b"two".to_vec())).unwrap();
        assert!(matches!(
            store.add_secret(&mut second).await,
            Err(VaultError::Duplicate)
        ));

        master::seal();
    }

    #[tokio::test]
    async fn test_root_secret_oldest_id_wins() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        let mut secret = Secret::new("db-password", SensitiveVec::new(b"v1".to_vec())).unwrap();
        store.add_secret(&mut secret).await.unwrap();
        let original_id = secret.id;

        secret
            .update(SensitiveVec::new(b"v2".to_vec()))
            .unwrap();
        store.update_secret(&mut secret).await.unwrap();
        assert!(secret.id > original_id);

        // Two root rows now share the name; reads return the oldest.
        let fetched = store.get_root_secret("db-password").await.unwrap();
        assert_eq!(fetched.id, original_id);

        master::seal();
    }

    #[tokio::test]
    async fn test_key_reused_by_name_in_add_secret() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        let mut key = Key::generate("alice").unwrap();
        key.wrap().unwrap();
        store.add_key(&mut key).await.unwrap();
        let key_id = key.id;

        let mut root = Secret::new("db-password", SensitiveVec::new(b"s".to_vec())).unwrap();
        store.add_secret(&mut root).await.unwrap();

        let mut shared = root.share(&key).unwrap();
        store.add_secret(&mut shared).await.unwrap();
        assert_eq!(shared.key_id, key_id);

        let metrics = store.metrics().await.unwrap();
        // alice + the per-secret key; sharing added no duplicate alice row.
        assert_eq!(metrics.keys, 2);

        master::seal();
    }

    #[tokio::test]
    async fn test_get_shared_secret_resolves_by_key_name() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        let mut key = Key::generate("alice").unwrap();
        key.wrap().unwrap();
        store.add_key(&mut key).await.unwrap();

        let mut root = Secret::new("db-password", SensitiveVec::new(b"s".to_vec())).unwrap();
        store.add_secret(&mut root).await.unwrap();
        let mut shared = root.share(&key).unwrap();
        store.add_secret(&mut shared).await.unwrap();

        let fetched = store
            .get_shared_secret("db-password", "alice")
            .await
            .unwrap();
        assert!(!fetched.root);
        assert_eq!(fetched.key_id, key.id);
        assert_eq!(fetched.key.name, "alice");

        assert!(matches!(
            store.get_shared_secret("db-password", "bob").await,
            Err(VaultError::NotFound)
        ));

        master::seal();
    }

    #[tokio::test]
    async fn test_delete_refuses_master() {
        let _guard = master::testing::exclusive();
        let mut master_secret = master::initialise().unwrap();
        let store = Memory::new();
        store.add_secret(&mut master_secret).await.unwrap();

        assert!(matches!(
            store.delete_secret(&master_secret).await,
            Err(VaultError::ReservedName)
        ));

        let master_key = store.get_key("master").await.unwrap();
        assert!(matches!(
            store.delete_key(&master_key).await,
            Err(VaultError::ReservedName)
        ));

        master::seal();
    }

    #[tokio::test]
    async fn test_delete_root_does_not_cascade_to_shares() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        let mut key = Key::generate("alice").unwrap();
        key.wrap().unwrap();
        store.add_key(&mut key).await.unwrap();

        let mut root = Secret::new("db-password", SensitiveVec::new(b"s".to_vec())).unwrap();
        store.add_secret(&mut root).await.unwrap();
        let mut shared = root.share(&key).unwrap();
        store.add_secret(&mut shared).await.unwrap();

        store.delete_secret(&root).await.unwrap();
        assert!(matches!(
            store.get_root_secret("db-password").await,
            Err(VaultError::NotFound)
        ));

        // The share row stays behind; deletion does not cascade.
        assert!(store
            .get_shared_secret("db-password", "alice")
            .await
            .is_ok());

        master::seal();
    }

    #[tokio::test]
    async fn test_list_pages_in_id_order() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        for i in 0..5 {
            let mut s =
                Secret::new(&format!("secret-{i}"), SensitiveVec::new(b"v".to_vec())).unwrap();
            store.add_secret(&mut s).await.unwrap();
        }

        let first = store.list_secrets(None, 2, 0).await.unwrap();
        let second = store.list_secrets(None, 2, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(first[1].id < second[0].id);

        let all = store.list_secrets(None, 100, 0).await.unwrap();
        assert_eq!(all.len(), 5);

        master::seal();
    }

    #[tokio::test]
    async fn test_list_keys_filtered_by_secret() {
        let _guard = master::testing::exclusive();
        master::initialise().unwrap();
        let store = Memory::new();

        let mut alice = Key::generate("alice").unwrap();
        alice.wrap().unwrap();
        store.add_key(&mut alice).await.unwrap();
        let mut bob = Key::generate("bob").unwrap();
        bob.wrap().unwrap();
        store.add_key(&mut bob).await.unwrap();

        let mut root = Secret::new("db-password", SensitiveVec::new(b"s".to_vec())).unwrap();
        store.add_secret(&mut root).await.unwrap();
        let mut shared = root.share(&alice).unwrap();
        store.add_secret(&mut shared).await.unwrap();

        let with_access = store
            .list_keys(Some("db-password"), 100, 0)
            .await
            .unwrap();
        let names: Vec<_> = with_access.iter().map(|k| k.name.as_str()).collect();
        assert!(names.contains(&"alice"));
        assert!(!names.contains(&"bob"));

        master::seal();
    }
}
