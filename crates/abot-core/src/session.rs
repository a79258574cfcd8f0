//! Per-user session tracking and the single-flight barrier.
//!
//! [`SessionManager`] hands out one [`Session`] per [`SessionKey`], each
//! behind its own async mutex. Holding the guard *is* the in-flight slot:
//! a second request for the same key waits in [`SessionManager::acquire`]
//! (or is turned away by [`SessionManager::try_acquire`]) until the first
//! drops its guard. Different keys never contend beyond the brief map
//! lookup.
//!
//! Sessions are ephemeral. One that nobody holds or waits on is *idle*;
//! idle sessions untouched for longer than the idle limit are removed by
//! [`SessionManager::sweep`], and when the table reaches its size limit the
//! oldest idle sessions make room for the new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use abot_types::{Session, SessionKey};

/// Exclusive access to one session for the duration of a request.
pub type SessionGuard = OwnedMutexGuard<Session>;

type Slot = Arc<AsyncMutex<Session>>;

/// Default idle limit.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
/// Default size limit.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// In-memory session table.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionKey, Slot>>,
    idle: Duration,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SESSION_IDLE, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_limits(idle: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle,
            max_sessions: max_sessions.max(1),
        }
    }

    fn slot(&self, key: &SessionKey) -> Slot {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = sessions.get(key) {
            return Arc::clone(slot);
        }
        if sessions.len() >= self.max_sessions {
            self.make_room(&mut sessions);
        }
        debug!(session = %key, "session created");
        let slot = Arc::new(AsyncMutex::new(Session::new(key.clone())));
        sessions.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    /// Drop expired sessions, then the oldest idle ones until a new
    /// session fits under the size limit.
    fn make_room(&self, sessions: &mut HashMap<SessionKey, Slot>) {
        let expired = remove_expired(sessions, self.idle);
        let excess = (sessions.len() + 1).saturating_sub(self.max_sessions);
        let mut evicted = 0;
        if excess > 0 {
            let mut idle: Vec<(DateTime<Utc>, SessionKey)> = sessions
                .iter()
                .filter_map(|(key, slot)| idle_since(slot).map(|at| (at, key.clone())))
                .collect();
            idle.sort_by_key(|(at, _)| *at);
            for (_, key) in idle.into_iter().take(excess) {
                sessions.remove(&key);
                evicted += 1;
            }
        }
        debug!(expired, evicted, remaining = sessions.len(), "session table full");
    }

    /// Remove idle sessions untouched for longer than the idle limit.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let removed = remove_expired(&mut sessions, self.idle);
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "expired sessions swept");
        }
        removed
    }

    pub fn idle_limit(&self) -> Duration {
        self.idle
    }

    /// Wait for the session's in-flight slot. Requests for one key are
    /// granted in arrival order.
    pub async fn acquire(&self, key: &SessionKey) -> SessionGuard {
        self.slot(key).lock_owned().await
    }

    /// Take the slot only if no request for this key is in flight.
    pub fn try_acquire(&self, key: &SessionKey) -> Option<SessionGuard> {
        self.slot(key).try_lock_owned().ok()
    }

    /// Snapshot of a session, if it exists and is idle.
    pub fn peek(&self, key: &SessionKey) -> Option<Session> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let slot = sessions.get(key)?;
        slot.try_lock().ok().map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// When an idle session was last touched. `None` while a guard holds it or
/// a caller is waiting on it; both keep a clone of the slot.
fn idle_since(slot: &Slot) -> Option<DateTime<Utc>> {
    if Arc::strong_count(slot) > 1 {
        return None;
    }
    slot.try_lock().ok().map(|session| session.updated_at)
}

fn remove_expired(sessions: &mut HashMap<SessionKey, Slot>, idle: Duration) -> usize {
    let now = Utc::now();
    let before = sessions.len();
    sessions.retain(|_, slot| match idle_since(slot) {
        Some(at) => !(now - at).to_std().is_ok_and(|age| age >= idle),
        None => true,
    });
    before - sessions.len()
}
