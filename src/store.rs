//! `SQLite`-backed record sink and campaign lookup.
//!
//! One `Mutex<Connection>` serializes all access; the blocking calls run on
//! tokio's blocking pool so ingestion tasks keep making progress.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::campaign::{Campaign, CampaignLookup};
use crate::error::SinkError;
use crate::record::CanonicalRecord;
use crate::sink::RecordSink;

/// Idempotent DDL for the tables the picker reads and writes.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS cmp_campaigns (
    id TEXT PRIMARY KEY,
    active_start_hour INTEGER NOT NULL,
    active_start_minute INTEGER NOT NULL,
    active_end_hour INTEGER NOT NULL,
    active_end_minute INTEGER NOT NULL,
    active_on_weekends INTEGER NOT NULL,
    timezone TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cmp_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient TEXT,
    cmp_campaign_id TEXT NOT NULL,
    cmp_template_id TEXT NOT NULL,
    cmp_media_id TEXT,
    cmp_media TEXT,
    cmp_parameters TEXT NOT NULL,
    active_start_hour INTEGER NOT NULL,
    active_start_minute INTEGER NOT NULL,
    active_end_hour INTEGER NOT NULL,
    active_end_minute INTEGER NOT NULL,
    active_on_weekends INTEGER NOT NULL,
    timezone TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_records_campaign ON cmp_records (cmp_campaign_id);
";

const INSERT_RECORD: &str = r"
INSERT INTO cmp_records (
    recipient, cmp_campaign_id, cmp_template_id, cmp_media_id, cmp_media, cmp_parameters,
    active_start_hour, active_start_minute, active_end_hour, active_end_minute,
    active_on_weekends, timezone
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
";

/// Campaign and record storage in one `SQLite` database.
///
/// Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, SinkError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SinkError> {
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
        conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, SinkError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SinkError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut Self::lock(&conn)))
            .await
            .map_err(|e| SinkError::Other(format!("database task failed: {e}")))?
    }

    pub async fn upsert_campaign(&self, campaign: Campaign) -> Result<(), SinkError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cmp_campaigns (id, active_start_hour, active_start_minute,
                     active_end_hour, active_end_minute, active_on_weekends, timezone)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     active_start_hour = excluded.active_start_hour,
                     active_start_minute = excluded.active_start_minute,
                     active_end_hour = excluded.active_end_hour,
                     active_end_minute = excluded.active_end_minute,
                     active_on_weekends = excluded.active_on_weekends,
                     timezone = excluded.timezone",
                params![
                    campaign.id,
                    campaign.active_start_hour,
                    campaign.active_start_minute,
                    campaign.active_end_hour,
                    campaign.active_end_minute,
                    campaign.active_on_weekends,
                    campaign.timezone,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn count_records(&self, campaign_id: &str) -> Result<u64, SinkError> {
        let campaign_id = campaign_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cmp_records WHERE cmp_campaign_id = ?1",
                [campaign_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}

#[async_trait]
impl RecordSink for SqliteStore {
    async fn insert(&self, records: &[CanonicalRecord]) -> Result<(), SinkError> {
        let rows = records
            .iter()
            .map(|r| -> Result<_, SinkError> {
                let media = r.media.as_ref().map(serde_json::to_string).transpose()?;
                Ok((r.clone(), media, serde_json::to_string(&r.parameters)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let inserted = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(INSERT_RECORD)?;
                    for (record, media, parameters) in &rows {
                        stmt.execute(params![
                            record.recipient,
                            record.campaign_id,
                            record.template_id,
                            record.media_id,
                            media,
                            parameters,
                            record.active_start_hour,
                            record.active_start_minute,
                            record.active_end_hour,
                            record.active_end_minute,
                            record.active_on_weekends,
                            record.timezone,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        tracing::debug!(records = inserted, "batch inserted");
        Ok(())
    }
}

#[async_trait]
impl CampaignLookup for SqliteStore {
    async fn campaign(&self, id: &str) -> Result<Option<Campaign>, SinkError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let campaign = conn
                .query_row(
                    "SELECT id, active_start_hour, active_start_minute, active_end_hour,
                            active_end_minute, active_on_weekends, timezone
                     FROM cmp_campaigns WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(Campaign {
                            id: row.get(0)?,
                            active_start_hour: row.get(1)?,
                            active_start_minute: row.get(2)?,
                            active_end_hour: row.get(3)?,
                            active_end_minute: row.get(4)?,
                            active_on_weekends: row.get(5)?,
                            timezone: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(campaign)
        })
        .await
    }
}
