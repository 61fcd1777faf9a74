use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use super::error::StoreError;
use super::model::{Engine, NewStore, StatusUpdate, Store, StoreStatus};
use super::StoreRepository;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,48}[a-z0-9]$").expect("valid regex"));

const ID_SUFFIX_LEN: usize = 8;
const ID_SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_ID_COLLISION_RETRIES: usize = 3;

/// SQLite-backed `StoreRepository`. Every public method is a single
/// transaction.
#[derive(Clone)]
pub struct SqliteStoreRepository {
    pool: SqlitePool,
}

impl SqliteStoreRepository {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        // A bare in-memory URL gives every new connection its own empty
        // database, so pool it down to one connection to keep a single
        // schema visible across the whole process (and across tests).
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| StoreError::Backend(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(SqliteStoreRepository { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self::connect("sqlite::memory:").await.expect("in-memory sqlite connects")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ID_SUFFIX_ALPHABET.len());
            ID_SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

fn row_to_store(row: SqliteRow) -> Result<Store, StoreError> {
    let status_raw: String = row.try_get("status")?;
    let engine_raw: String = row.try_get("engine")?;
    let created_at_raw: String = row.try_get("created_at")?;
    let updated_at_raw: String = row.try_get("updated_at")?;

    Ok(Store {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        engine: Engine::from_str(&engine_raw).map_err(StoreError::Invalid)?,
        namespace: row.try_get("namespace")?,
        helm_release: row.try_get("helm_release")?,
        status: StoreStatus::from_str(&status_raw).map_err(StoreError::Invalid)?,
        store_url: row.try_get("store_url")?,
        failure_reason: row.try_get("failure_reason")?,
        admin_username: row.try_get("admin_username")?,
        admin_email: row.try_get("admin_email")?,
        admin_password: row.try_get("admin_password")?,
        created_at: parse_timestamp(&created_at_raw)?,
        updated_at: parse_timestamp(&updated_at_raw)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("corrupt timestamp {raw:?}: {e}")))
}

fn is_unique_violation(err: &sqlx::Error, index_name: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains(index_name),
        _ => false,
    }
}

#[async_trait]
impl StoreRepository for SqliteStoreRepository {
    async fn create(&self, input: NewStore) -> Result<Store, StoreError> {
        if !NAME_RE.is_match(&input.name) {
            return Err(StoreError::Invalid(format!("name {:?} does not match the required pattern", input.name)));
        }
        if input.admin_password.len() < 8 {
            return Err(StoreError::Invalid("admin_password must be at least 8 characters".to_string()));
        }

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        for attempt in 0..=MAX_ID_COLLISION_RETRIES {
            let id = format!("{}-{}", input.name, random_suffix());
            let namespace = Store::namespace_for(&id);

            let result = sqlx::query(
                r#"
                INSERT INTO stores
                    (id, name, engine, namespace, helm_release, status, store_url, failure_reason,
                     admin_username, admin_email, admin_password, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 'PROVISIONING', NULL, NULL, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&input.name)
            .bind(input.engine.to_string())
            .bind(&namespace)
            .bind(&id)
            .bind(&input.admin_username)
            .bind(&input.admin_email)
            .bind(&input.admin_password)
            .bind(&now_str)
            .bind(&now_str)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return self.get(&id).await,
                Err(e) if is_unique_violation(&e, "idx_stores_active_name") => {
                    return Err(StoreError::NameConflict(input.name));
                }
                Err(e) if is_unique_violation(&e, "stores.id") && attempt < MAX_ID_COLLISION_RETRIES => {
                    continue;
                }
                Err(e) => return Err(StoreError::Backend(e)),
            }
        }

        Err(StoreError::Backend(sqlx::Error::Protocol(
            "exhausted id collision retries".to_string(),
        )))
    }

    async fn get(&self, id: &str) -> Result<Store, StoreError> {
        let row = sqlx::query("SELECT * FROM stores WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_store(row),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(&self) -> Result<Vec<Store>, StoreError> {
        let rows = sqlx::query("SELECT * FROM stores ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_store).collect()
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Store, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current_raw: Option<String> = sqlx::query_scalar("SELECT status FROM stores WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let current_raw = current_raw.ok_or(StoreError::NotFound)?;
        let current = StoreStatus::from_str(&current_raw).map_err(StoreError::Invalid)?;
        let target = update.target();

        if !current.can_transition_to(target) {
            return Err(StoreError::IllegalTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        let (store_url, failure_reason): (Option<String>, Option<String>) = match &update {
            StatusUpdate::Ready { store_url } => (Some(store_url.clone()), None),
            StatusUpdate::Failed { reason } => (None, Some(reason.clone())),
            StatusUpdate::Deleting | StatusUpdate::Deleted => (None, None),
        };

        sqlx::query(
            r#"
            UPDATE stores
            SET status = ?, store_url = ?, failure_reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(target.to_string())
        .bind(&store_url)
        .bind(&failure_reason)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get(id).await
    }

    async fn list_non_terminal(&self) -> Result<Vec<Store>, StoreError> {
        let rows = sqlx::query("SELECT * FROM stores WHERE status IN ('PROVISIONING', 'DELETING') ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_store).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
