//! libSQL-backed `SessionStore`.
//!
//! Each session is one row holding the JSON snapshot, with the phase and
//! timestamps broken out for inspection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use super::migrations;
use super::traits::SessionStore;
use crate::error::DatabaseError;
use crate::survey::session::SessionSnapshot;

/// libSQL session store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlSessionStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlSessionStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Session database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn load(&self, thread_id: &str) -> Result<Option<SessionSnapshot>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT snapshot FROM survey_sessions WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("load_session: {e}")))?;
                let snapshot = serde_json::from_str(&raw)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(Some(snapshot))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_session: {e}"))),
        }
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(snapshot)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO survey_sessions (thread_id, phase, snapshot, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (thread_id) DO UPDATE SET phase = ?2, snapshot = ?3, updated_at = ?5",
                params![
                    snapshot.thread_id.as_str(),
                    snapshot.phase.to_string(),
                    raw,
                    snapshot.created_at.to_rfc3339(),
                    snapshot.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;

        debug!(thread_id = %snapshot.thread_id, phase = %snapshot.phase, "Session saved");
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM survey_sessions WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(count > 0)
    }

    async fn list_thread_ids(&self) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT thread_id FROM survey_sessions ORDER BY thread_id", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sessions: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sessions: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_sessions: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }
}
