//! SQLite session store.
//!
//! One database file with two tables:
//! - `sessions`: patient sessions with status
//! - `conversations`: append-only conversation rows
//!
//! Schema is created on open. Pass `"sqlite::memory:"` for an in-process
//! ephemeral database (useful for tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use carepod_core::error::PersistenceError;
use carepod_core::patient::{PatientId, PatientSession};
use carepod_core::persistence::{ConversationRow, SessionStore};

/// A SQLite-backed session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) the database at the given path.
    pub async fn new(path: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| PersistenceError::Unreachable(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::Unreachable(format!("failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id  TEXT PRIMARY KEY,
                patient_id  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'active'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                turn_id       TEXT PRIMARY KEY,
                session_id    TEXT NOT NULL,
                patient_id    TEXT NOT NULL,
                utterance     TEXT NOT NULL,
                response      TEXT NOT NULL,
                urgency_score INTEGER,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_patient
             ON conversations(patient_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(format!("conversations index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_patient
             ON sessions(patient_id, status)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(format!("sessions index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationRow, PersistenceError> {
        let turn_id: String = row.get("turn_id");
        let session_id: String = row.get("session_id");
        let patient_id: String = row.get("patient_id");
        let created_at: String = row.get("created_at");

        Ok(ConversationRow {
            turn_id: Uuid::parse_str(&turn_id)
                .map_err(|e| PersistenceError::QueryFailed(format!("bad turn_id: {e}")))?,
            session_id: Uuid::parse_str(&session_id)
                .map_err(|e| PersistenceError::QueryFailed(format!("bad session_id: {e}")))?,
            patient_id: PatientId::new(patient_id),
            utterance: row.get("utterance"),
            response: row.get("response"),
            urgency_score: row
                .get::<Option<i64>, _>("urgency_score")
                .map(|v| v.clamp(0, 10) as u8),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| PersistenceError::QueryFailed(format!("bad created_at: {e}")))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(
        &self,
        patient_id: &PatientId,
    ) -> Result<PatientSession, PersistenceError> {
        // One active session per identity: close any prior one first.
        sqlx::query("UPDATE sessions SET status = 'closed' WHERE patient_id = ? AND status = 'active'")
            .bind(patient_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        let session = PatientSession::new(patient_id.clone());
        sqlx::query(
            "INSERT INTO sessions (session_id, patient_id, created_at, status)
             VALUES (?, ?, ?, 'active')",
        )
        .bind(session.session_id.to_string())
        .bind(patient_id.as_str())
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(session)
    }

    async fn append_turn(&self, row: ConversationRow) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO conversations
             (turn_id, session_id, patient_id, utterance, response, urgency_score, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.turn_id.to_string())
        .bind(row.session_id.to_string())
        .bind(row.patient_id.as_str())
        .bind(&row.utterance)
        .bind(&row.response)
        .bind(row.urgency_score.map(|v| v as i64))
        .bind(row.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    async fn load_history(
        &self,
        patient_id: &PatientId,
        limit: usize,
    ) -> Result<Vec<ConversationRow>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT turn_id, session_id, patient_id, utterance, response, urgency_score, created_at
             FROM conversations
             WHERE patient_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(patient_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn close_session(&self, session_id: Uuid) -> Result<(), PersistenceError> {
        let result = sqlx::query("UPDATE sessions SET status = 'closed' WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }
}
