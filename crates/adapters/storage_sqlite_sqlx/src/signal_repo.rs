//! `SQLite` implementation of [`SignalStore`].

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use mindhub_app::ports::SignalStore;
use mindhub_domain::error::HubError;
use mindhub_domain::id::SignalId;
use mindhub_domain::signal::{NewSignal, Signal};

use crate::error::StorageError;

/// Wrapper for converting database rows into domain types without polluting
/// domain structs with database concerns.
struct Wrapper(Signal);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let created_at_str: String = row.try_get("created_at")?;
        let automation_hash: String = row.try_get("automation_hash")?;
        let data_json: String = row.try_get("data")?;
        let is_dead: bool = row.try_get("is_dead")?;

        let id = SignalId::from_str(&id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();
        // The `data` column carries the `type` tag; the separate `type`
        // column exists for querying only.
        let payload = serde_json::from_str(&data_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(Signal {
            id,
            created_at,
            automation_hash,
            payload,
            is_dead,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO signals (id, created_at, automation_hash, type, data, is_dead)
    VALUES (?, ?, ?, ?, ?, 0)
";

const SELECT_ALIVE: &str = "SELECT * FROM signals WHERE is_dead = 0 ORDER BY created_at, id";
const DELETE_BY_ID: &str = "DELETE FROM signals WHERE id = ?";
const DELETE_BY_HASH: &str = "DELETE FROM signals WHERE automation_hash = ?";
const MARK_DEAD: &str = "UPDATE signals SET is_dead = 1 WHERE id = ?";

/// `SQLite`-backed signal store.
pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn list_alive(&self) -> Result<Vec<Signal>, HubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALIVE)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn create(&self, new: NewSignal) -> Result<Signal, HubError> {
        let signal = Signal {
            id: SignalId::new(),
            created_at: mindhub_domain::time::now(),
            automation_hash: new.automation_hash,
            payload: new.payload,
            is_dead: false,
        };
        let data_json = serde_json::to_string(&signal.payload).map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(signal.id.to_string())
            .bind(signal.created_at.to_rfc3339())
            .bind(&signal.automation_hash)
            .bind(signal.payload.kind())
            .bind(&data_json)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(signal)
    }

    async fn delete(&self, id: SignalId) -> Result<(), HubError> {
        sqlx::query(DELETE_BY_ID)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn delete_by_hash(&self, hash: &str) -> Result<(), HubError> {
        sqlx::query(DELETE_BY_HASH)
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn mark_dead(&self, id: SignalId) -> Result<(), HubError> {
        sqlx::query(MARK_DEAD)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}
