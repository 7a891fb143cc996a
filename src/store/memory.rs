//! In-memory session store, used when no database path is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::SessionStore;
use crate::error::DatabaseError;
use crate::survey::session::SessionSnapshot;

/// Process-local store. Snapshots are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, thread_id: &str) -> Result<Option<SessionSnapshot>, DatabaseError> {
        Ok(self.snapshots.read().await.get(thread_id).cloned())
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), DatabaseError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.thread_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.snapshots.write().await.remove(thread_id).is_some())
    }

    async fn list_thread_ids(&self) -> Result<Vec<String>, DatabaseError> {
        let mut ids: Vec<String> = self.snapshots.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
