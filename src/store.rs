//! Append-only prediction log backed by SQLite.
//!
//! Append is the only mutation; records are never updated or deleted here
//! (retention is an external concern). The orchestrator calls `append` off
//! the response path, so a write failure is reported but never fails the
//! request.

use crate::error::PipelineError;
use crate::types::verdict::PredictionRecord;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Raw counts handed to the statistics aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreAggregate {
    pub total: u64,
    pub alerts: u64,
    /// Records appended in the last 60 seconds
    pub last_minute: u64,
}

pub struct PredictionStore {
    conn: Mutex<Connection>,
}

impl PredictionStore {
    /// Open (or create) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::Persistence(e.to_string()))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| PipelineError::Persistence(e.to_string()))?;
        Self::init_schema(&conn)?;

        info!(path = %path.display(), "Prediction store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn =
            Connection::open_in_memory().map_err(|e| PipelineError::Persistence(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), PipelineError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS predictions (
                id            TEXT PRIMARY KEY,
                session_id    TEXT NOT NULL,
                user_id       TEXT NOT NULL,
                fingerprint   TEXT NOT NULL,
                fused_score   REAL NOT NULL,
                xgb_score     REAL NOT NULL,
                lstm_score    REAL NOT NULL,
                is_alert      INTEGER NOT NULL,
                filtered      INTEGER NOT NULL,
                reason        TEXT,
                model_version TEXT NOT NULL,
                latency_us    INTEGER NOT NULL,
                computed_at   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_computed_at
                ON predictions(computed_at);",
        )
        .map_err(|e| PipelineError::Persistence(e.to_string()))
    }

    /// Append one record; returns its id.
    pub fn append(&self, record: &PredictionRecord) -> Result<String, PipelineError> {
        let conn = self.conn.lock().expect("prediction store lock poisoned");
        conn.execute(
            "INSERT INTO predictions (
                id, session_id, user_id, fingerprint, fused_score, xgb_score,
                lstm_score, is_alert, filtered, reason, model_version,
                latency_us, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.session_id,
                record.user_id,
                record.fingerprint,
                record.fused_score,
                record.xgb_score,
                record.lstm_score,
                record.is_alert as i64,
                record.filtered as i64,
                record.reason,
                record.model_version,
                record.latency_us as i64,
                record.computed_at.timestamp_millis(),
            ],
        )
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(record.id.clone())
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, PipelineError> {
        let conn = self.conn.lock().expect("prediction store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, user_id, fingerprint, fused_score, xgb_score,
                        lstm_score, is_alert, filtered, reason, model_version,
                        latency_us, computed_at
                 FROM predictions
                 ORDER BY computed_at DESC, rowid DESC
                 LIMIT ?1",
            )
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let computed_at_ms: i64 = row.get(12)?;
                Ok(PredictionRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    user_id: row.get(2)?,
                    fingerprint: row.get(3)?,
                    fused_score: row.get(4)?,
                    xgb_score: row.get(5)?,
                    lstm_score: row.get(6)?,
                    is_alert: row.get::<_, i64>(7)? != 0,
                    filtered: row.get::<_, i64>(8)? != 0,
                    reason: row.get(9)?,
                    model_version: row.get(10)?,
                    latency_us: row.get::<_, i64>(11)? as u64,
                    computed_at: Utc
                        .timestamp_millis_opt(computed_at_ms)
                        .single()
                        .unwrap_or_else(Utc::now),
                })
            })
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Persistence(e.to_string()))
    }

    /// Raw counts for statistics derivation.
    pub fn aggregate(&self) -> Result<StoreAggregate, PipelineError> {
        let conn = self.conn.lock().expect("prediction store lock poisoned");
        let minute_ago = (Utc::now() - chrono::Duration::seconds(60)).timestamp_millis();

        let (total, alerts, last_minute) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_alert), 0),
                        COALESCE(SUM(computed_at >= ?1), 0)
                 FROM predictions",
                params![minute_ago],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(StoreAggregate {
            total: total as u64,
            alerts: alerts as u64,
            last_minute: last_minute as u64,
        })
    }
}
