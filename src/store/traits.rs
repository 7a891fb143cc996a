//! `SessionStore` trait: get/put-by-thread-id persistence for survey sessions.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::survey::session::SessionSnapshot;

/// Backend-agnostic checkpoint store for survey sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the snapshot for a thread, if one was saved.
    async fn load(&self, thread_id: &str) -> Result<Option<SessionSnapshot>, DatabaseError>;

    /// Insert or replace the snapshot for `snapshot.thread_id`.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), DatabaseError>;

    /// Remove a thread's snapshot. Returns whether one existed.
    async fn delete(&self, thread_id: &str) -> Result<bool, DatabaseError>;

    /// Thread ids with a saved snapshot.
    async fn list_thread_ids(&self) -> Result<Vec<String>, DatabaseError>;
}
