//! Session registry — per-thread survey state with exclusive access per turn.
//!
//! Every thread id maps to its own `Arc<Mutex<SurveySession>>`. A turn holds
//! that mutex from start to finish, so concurrent requests on one thread are
//! serialized while different threads proceed independently.
//!
//! Removing a session from the map retires it: holders of the old handle can
//! no longer checkpoint it, and waiters re-resolve the thread on wake-up.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use super::schema::FormSchema;
use super::session::{SessionSnapshot, SurveySession};
use crate::error::DatabaseError;
use crate::store::SessionStore;

/// How often the background task looks for idle sessions.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Map entry for a live session. `retired` is shared with the session so it
/// can be flipped without taking the session lock.
#[derive(Clone)]
struct SessionHandle {
    session: Arc<Mutex<SurveySession>>,
    retired: Arc<AtomicBool>,
}

impl SessionHandle {
    fn new(session: SurveySession) -> Self {
        Self {
            retired: session.retired_flag(),
            session: Arc::new(Mutex::new(session)),
        }
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

/// Live sessions plus the checkpoint store behind them.
pub struct SessionRegistry {
    schema: Arc<FormSchema>,
    store: Arc<dyn SessionStore>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        schema: Arc<FormSchema>,
        store: Arc<dyn SessionStore>,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            schema,
            store,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        })
    }

    pub fn schema(&self) -> &Arc<FormSchema> {
        &self.schema
    }

    /// Number of sessions held in memory.
    pub async fn live_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Lock the session for `thread_id`, loading or creating it first.
    ///
    /// If the session was retired while this call waited for the lock, the
    /// thread is resolved again.
    pub async fn acquire(
        &self,
        thread_id: &str,
    ) -> Result<OwnedMutexGuard<SurveySession>, DatabaseError> {
        loop {
            let handle = self.handle(thread_id).await?;
            let guard = Arc::clone(&handle.session).lock_owned().await;
            if !guard.is_retired() {
                return Ok(guard);
            }
            debug!(thread_id, "Session retired while waiting, resolving again");
        }
    }

    async fn handle(&self, thread_id: &str) -> Result<SessionHandle, DatabaseError> {
        if let Some(handle) = self.sessions.read().await.get(thread_id) {
            return Ok(handle.clone());
        }

        let mut sessions = self.sessions.write().await;
        // Another request may have created it while we waited for the write lock.
        if let Some(handle) = sessions.get(thread_id) {
            return Ok(handle.clone());
        }

        let session = match self.store.load(thread_id).await? {
            Some(snapshot) => {
                debug!(thread_id, phase = %snapshot.phase, "Session restored from store");
                SurveySession::from_snapshot(Arc::clone(&self.schema), snapshot)
            }
            None => {
                info!(thread_id, "Survey session started");
                SurveySession::new(thread_id, Arc::clone(&self.schema))
            }
        };

        let handle = SessionHandle::new(session);
        sessions.insert(thread_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Checkpoint a session to the store. Retired sessions are skipped.
    pub async fn persist(&self, session: &SurveySession) -> Result<(), DatabaseError> {
        if session.is_retired() {
            debug!(thread_id = %session.thread_id(), "Skipping checkpoint of retired session");
            return Ok(());
        }
        self.store.save(&session.snapshot()).await
    }

    /// Current state of a thread, from memory or the store.
    ///
    /// Waits for an in-flight turn on the same thread to finish.
    pub async fn snapshot(&self, thread_id: &str) -> Result<Option<SessionSnapshot>, DatabaseError> {
        let live = self.sessions.read().await.get(thread_id).cloned();
        match live {
            Some(handle) => Ok(Some(handle.session.lock().await.snapshot())),
            None => self.store.load(thread_id).await,
        }
    }

    /// Every known thread id, live or checkpointed, sorted.
    pub async fn thread_ids(&self) -> Result<Vec<String>, DatabaseError> {
        let mut ids = self.store.list_thread_ids().await?;
        ids.extend(self.sessions.read().await.keys().cloned());
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Drop a session from memory; the stored checkpoint stays.
    pub async fn evict(&self, thread_id: &str) {
        if let Some(handle) = self.sessions.write().await.remove(thread_id) {
            handle.retire();
            debug!(thread_id, "Session evicted from memory");
        }
    }

    /// Discard a session entirely. Returns whether anything existed.
    pub async fn reset(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        let live = match self.sessions.write().await.remove(thread_id) {
            Some(handle) => {
                handle.retire();
                true
            }
            None => false,
        };
        let stored = self.store.delete(thread_id).await?;
        if live || stored {
            info!(thread_id, "Survey session reset");
        }
        Ok(live || stored)
    }

    /// Evict sessions idle for longer than the configured timeout.
    ///
    /// Sessions in the middle of a turn are skipped. Returns how many were
    /// evicted.
    pub async fn prune_idle(&self) -> usize {
        let max_idle = chrono::Duration::from_std(self.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            let keep = match handle.session.try_lock() {
                Ok(session) => now - session.updated_at() < max_idle,
                Err(_) => true,
            };
            if !keep {
                handle.retire();
            }
            keep
        });
        let pruned = before - sessions.len();

        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle survey sessions");
        }
        pruned
    }
}

/// Spawn a background task that periodically evicts idle sessions.
pub fn spawn_prune_task(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            registry.prune_idle().await;
        }
    })
}
