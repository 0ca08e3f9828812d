// src/services/session_manager.rs
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::{
    sync::{Mutex, OnceCell},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use super::upstream::{ChatBackend, SessionHandle, UpstreamError};

/// Registry entry. The cell is shared by every request that finds the slot,
/// so the upstream session is created at most once per user. `waiters`
/// counts requests still inside `get_or_try_init` on that cell; a slot with
/// waiters is never evicted or discarded.
struct Slot {
    session: Arc<OnceCell<SessionHandle>>,
    waiters: Arc<AtomicUsize>,
    last_active: Instant,
}

impl Slot {
    fn new(now: Instant) -> Self {
        Self {
            session: Arc::new(OnceCell::new()),
            waiters: Arc::new(AtomicUsize::new(0)),
            last_active: now,
        }
    }

    fn is_busy(&self) -> bool {
        self.waiters.load(Ordering::SeqCst) > 0
    }
}

// Decrements the slot's waiter count when the request stops waiting on the
// cell, including when the request future is dropped mid-creation.
struct Waiter(Arc<AtomicUsize>);

impl Waiter {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<HashMap<String, Slot>>>,
    backend: Arc<dyn ChatBackend>,
    model: String,
    ttl: Duration,
    max_sessions: usize,
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("model", &self.model)
            .field("ttl", &self.ttl)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        ttl: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            backend,
            model: model.into(),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        now.duration_since(slot.last_active) >= self.ttl
    }

    fn is_evictable(&self, slot: &Slot, now: Instant) -> bool {
        !slot.is_busy() && self.is_expired(slot, now)
    }

    /// Return the user's session, starting a new upstream chat on first
    /// contact. The map lock only covers the slot lookup; the upstream call
    /// runs after it is released.
    pub async fn get_or_create(&self, user_id: &str) -> Result<SessionHandle, UpstreamError> {
        let (cell, waiter) = {
            let mut guard = self.inner.lock().await;
            let now = Instant::now();

            let stale = guard.get(user_id).is_some_and(|s| self.is_evictable(s, now));
            if stale {
                debug!(user_id, "session idle past ttl, replacing");
                guard.remove(user_id);
            }
            if !guard.contains_key(user_id) {
                self.make_room(&mut guard, now);
            }

            let slot = guard.entry(user_id.to_string()).or_insert_with(|| Slot::new(now));
            slot.last_active = now;
            (Arc::clone(&slot.session), Waiter::enter(&slot.waiters))
        };

        let created = cell
            .get_or_try_init(|| async {
                info!(user_id, model = %self.model, "starting upstream chat session");
                self.backend.start_chat(&self.model).await
            })
            .await;
        drop(waiter);

        match created {
            Ok(session) => Ok(Arc::clone(session)),
            Err(e) => {
                error!(user_id, error = %e, "failed to start upstream chat session");
                self.discard_empty(user_id, &cell).await;
                Err(e)
            }
        }
    }

    // Drop the slot only if it is still the one whose creation failed and no
    // other request is retrying it. Waiters only enter under the map lock, so
    // a zero count seen here cannot grow before the removal.
    async fn discard_empty(&self, user_id: &str, cell: &Arc<OnceCell<SessionHandle>>) {
        let mut guard = self.inner.lock().await;
        let abandoned = guard.get(user_id).is_some_and(|s| {
            Arc::ptr_eq(&s.session, cell) && !s.is_busy() && !s.session.initialized()
        });
        if abandoned {
            guard.remove(user_id);
        }
    }

    // Called with the lock held, before inserting a new user. Linear in the
    // number of slots; slots still being created are skipped, so the map may
    // briefly exceed the cap.
    fn make_room(&self, sessions: &mut HashMap<String, Slot>, now: Instant) {
        if sessions.len() < self.max_sessions {
            return;
        }
        sessions.retain(|_, s| !self.is_evictable(s, now));

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .filter(|(_, s)| !s.is_busy())
                .min_by_key(|(_, s)| s.last_active)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            info!(user_id = %oldest, "evicting least recently used session");
            sessions.remove(&oldest);
        }
    }

    /// Existing, live session for the user, if any.
    pub async fn get(&self, user_id: &str) -> Option<SessionHandle> {
        let guard = self.inner.lock().await;
        guard
            .get(user_id)
            .filter(|s| !self.is_expired(s, Instant::now()))
            .and_then(|s| s.session.get().cloned())
    }

    /// Remove a session by user id
    pub async fn remove(&self, user_id: &str) -> bool {
        let mut guard = self.inner.lock().await;
        guard.remove(user_id).is_some()
    }

    /// Remove sessions idle longer than ttl. Returns number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, s| !self.is_evictable(s, now));
        before - guard.len()
    }

    /// Run `purge_expired` every `every` until the runtime shuts down.
    pub fn spawn_purge_task(&self, every: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = manager.purge_expired().await;
                if removed > 0 {
                    info!(removed, "purged idle sessions");
                }
            }
        })
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        let guard = self.inner.lock().await;
        guard.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// List user ids with a session
    pub async fn list_user_ids(&self) -> Vec<String> {
        let guard = self.inner.lock().await;
        guard.keys().cloned().collect()
    }
}
