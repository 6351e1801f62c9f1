/// PostgreSQL store.
///
/// All queries are runtime-checked (`sqlx::query_as`, not the compile-time
/// macros) so development builds do not need a live database. Schema lives
/// in `migrations/`.
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres as Pg, Transaction};

use super::models::{KeyRow, SecretRow};
use super::{KeyInfo, Metrics, SecretInfo, Store};
use crate::error::{Result, VaultError};
use crate::secrets::{Key, Secret};

fn db_err(e: sqlx::Error) -> VaultError {
    match e {
        sqlx::Error::RowNotFound => VaultError::NotFound,
        other => VaultError::Storage(other.to_string()),
    }
}

#[derive(Clone)]
pub struct Postgres {
    pool: PgPool,
}

impl Postgres {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("migration failed: {e}")))
    }

    /// Insert the Key if no row with its name exists yet; either way the
    /// entity ends up carrying the stored row's id.
    async fn ensure_key(&self, tx: &mut Transaction<'_, Pg>, key: &mut Key) -> Result<()> {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM keys WHERE name = $1")
            .bind(&key.name)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;

        key.id = match existing {
            Some(id) => id,
            None => sqlx::query_scalar(
                r#"
                INSERT INTO keys (name, public, wrapped_private, nonce, read_only)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(&key.name)
            .bind(key.public.as_slice())
            .bind(&key.wrapped_private)
            .bind(key.nonce.as_slice())
            .bind(key.read_only)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)?,
        };

        Ok(())
    }

    async fn insert_secret(
        &self,
        tx: &mut Transaction<'_, Pg>,
        secret: &mut Secret,
    ) -> Result<()> {
        secret.id = sqlx::query_scalar(
            r#"
            INSERT INTO secrets (name, message, nonce, pubkey, key_id, root)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&secret.name)
        .bind(&secret.message)
        .bind(secret.nonce.as_slice())
        .bind(secret.pubkey.as_ref().map(|p| p.as_slice()))
        .bind(secret.key_id)
        .bind(secret.root)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn key_by_id(&self, id: i64) -> Result<Key> {
        let row: KeyRow = sqlx::query_as("SELECT * FROM keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(VaultError::NotFound)?;
        row.into_key()
    }
}

#[async_trait]
impl Store for Postgres {
    async fn add_secret(&self, secret: &mut Secret) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if secret.root {
            let duplicates: i64 = sqlx::query_scalar(
                "SELECT count(*) FROM secrets WHERE name = $1 AND root = TRUE",
            )
            .bind(&secret.name)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            if duplicates > 0 {
                return Err(VaultError::Duplicate);
            }
        }

        if !secret.key.name.is_empty() {
            self.ensure_key(&mut tx, &mut secret.key).await?;
            secret.key_id = secret.key.id;
        }

        self.insert_secret(&mut tx, secret).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn add_key(&self, key: &mut Key) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        self.ensure_key(&mut tx, key).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn get_key(&self, name: &str) -> Result<Key> {
        let row: KeyRow = sqlx::query_as("SELECT * FROM keys WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(VaultError::NotFound)?;
        row.into_key()
    }

    async fn get_root_secret(&self, name: &str) -> Result<Secret> {
        // Oldest row wins when updates have stacked history under a name.
        let row: SecretRow = sqlx::query_as(
            r#"
            SELECT * FROM secrets
            WHERE name = $1 AND root = TRUE
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(VaultError::NotFound)?;

        let key = self.key_by_id(row.key_id).await?;
        row.into_secret(key)
    }

    async fn get_shared_secret(&self, name: &str, key_name: &str) -> Result<Secret> {
        let key = self.get_key(key_name).await?;

        let row: SecretRow = sqlx::query_as(
            r#"
            SELECT * FROM secrets
            WHERE name = $1 AND root = FALSE AND key_id = $2
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(key.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(VaultError::NotFound)?;

        row.into_secret(key)
    }

    async fn update_secret(&self, secret: &mut Secret) -> Result<()> {
        // History is retained: updates insert a fresh row.
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        self.insert_secret(&mut tx, secret).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn delete_secret(&self, secret: &Secret) -> Result<()> {
        if secret.id == 0 {
            return Err(VaultError::InvalidInput("no secret specified"));
        }
        if secret.name == "master" {
            return Err(VaultError::ReservedName);
        }

        let result = sqlx::query("DELETE FROM secrets WHERE id = $1")
            .bind(secret.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
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

        let result = sqlx::query("DELETE FROM keys WHERE id = $1")
            .bind(key.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
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
        let rows: Vec<(i64, String, bool, i64)> = match key_name {
            Some(key_name) => {
                sqlx::query_as(
                    r#"
                    SELECT secrets.id, secrets.name, secrets.root, secrets.key_id
                    FROM secrets
                    JOIN keys ON secrets.key_id = keys.id
                    WHERE keys.name = $1
                    ORDER BY secrets.id ASC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(key_name)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, name, root, key_id FROM secrets
                    ORDER BY id ASC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, name, root, key_id)| SecretInfo {
                id,
                name,
                root,
                key_id,
            })
            .collect())
    }

    async fn list_keys(
        &self,
        secret_name: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KeyInfo>> {
        let rows: Vec<(i64, String, bool)> = match secret_name {
            Some(secret_name) => {
                sqlx::query_as(
                    r#"
                    SELECT DISTINCT keys.id, keys.name, keys.read_only
                    FROM keys
                    JOIN secrets ON keys.id = secrets.key_id
                    WHERE secrets.name = $1
                    ORDER BY keys.id ASC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(secret_name)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, name, read_only FROM keys
                    ORDER BY id ASC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, name, read_only)| KeyInfo {
                id,
                name,
                read_only,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_err)
    }

    async fn metrics(&self) -> Result<Metrics> {
        let secrets: i64 = sqlx::query_scalar("SELECT count(*) FROM secrets")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let keys: i64 = sqlx::query_scalar("SELECT count(*) FROM keys")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Metrics { secrets, keys })
    }
}
