//! `SQLite` implementation of [`LogStore`].
//!
//! Log entries are append-only. Service calls live in their own table,
//! keyed by the owning log entry, and are re-attached on read.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use mindhub_app::ports::LogStore;
use mindhub_domain::error::HubError;
use mindhub_domain::id::LogEntryId;
use mindhub_domain::log::{AutomationLogEntry, ServiceCallRecord};

use crate::error::StorageError;

struct Wrapper(AutomationLogEntry);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let kind_str: String = row.try_get("type")?;
        let created_at_str: String = row.try_get("created_at")?;
        let messages_json: String = row.try_get("messages")?;
        let automation_json: Option<String> = row.try_get("automation")?;
        let signaled_by_json: Option<String> = row.try_get("signaled_by")?;

        let id = LogEntryId::from_str(&id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let kind = serde_json::from_str(&format!("\"{kind_str}\""))
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();
        let messages = serde_json::from_str(&messages_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let automation = automation_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let signaled_by = signaled_by_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(AutomationLogEntry {
            id,
            kind,
            created_at,
            messages,
            services_called: Vec::new(),
            automation,
            signaled_by,
        }))
    }
}

struct CallWrapper(ServiceCallRecord);

impl<'r> FromRow<'r, SqliteRow> for CallWrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let created_at_str: String = row.try_get("created_at")?;
        let service: String = row.try_get("service")?;
        let target: String = row.try_get("target")?;
        let data_json: String = row.try_get("data")?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?
            .to_utc();
        let data = serde_json::from_str(&data_json)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(ServiceCallRecord {
            created_at,
            service,
            target,
            data,
        }))
    }
}

const INSERT_ENTRY: &str = r"
    INSERT INTO automation_logs (id, type, created_at, messages, automation, signaled_by)
    VALUES (?, ?, ?, ?, ?, ?)
";

const INSERT_CALL: &str = r"
    INSERT INTO service_calls (log_entry_id, created_at, service, target, data)
    VALUES (?, ?, ?, ?, ?)
";

const SELECT_RECENT: &str = "SELECT * FROM automation_logs ORDER BY created_at DESC, id LIMIT ?";
const SELECT_CALLS: &str = "SELECT * FROM service_calls WHERE log_entry_id = ? ORDER BY id";

/// `SQLite`-backed automation log store.
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append_automation_log(&self, entry: &AutomationLogEntry) -> Result<(), HubError> {
        let messages_json = serde_json::to_string(&entry.messages).map_err(StorageError::from)?;
        let automation_json = entry
            .automation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StorageError::from)?;
        let signaled_by_json = entry
            .signaled_by
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StorageError::from)?;

        sqlx::query(INSERT_ENTRY)
            .bind(entry.id.to_string())
            .bind(entry.kind.as_str())
            .bind(entry.created_at.to_rfc3339())
            .bind(&messages_json)
            .bind(&automation_json)
            .bind(&signaled_by_json)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn append_service_call(
        &self,
        log_entry_id: LogEntryId,
        record: &ServiceCallRecord,
    ) -> Result<(), HubError> {
        let data_json = serde_json::to_string(&record.data).map_err(StorageError::from)?;

        sqlx::query(INSERT_CALL)
            .bind(log_entry_id.to_string())
            .bind(record.created_at.to_rfc3339())
            .bind(&record.service)
            .bind(&record.target)
            .bind(&data_json)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let mut entries = Vec::with_capacity(rows.len());
        for Wrapper(mut entry) in rows {
            let calls: Vec<CallWrapper> = sqlx::query_as(SELECT_CALLS)
                .bind(entry.id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
            entry.services_called = calls.into_iter().map(|w| w.0).collect();
            entries.push(entry);
        }
        Ok(entries)
    }
}
