//! In-memory session store.
//!
//! One store is created per process and shared through `Arc`. Each user's
//! session sits behind its own async mutex, so the read-modify-write of one
//! request is atomic for that user while other users proceed concurrently.
//! Sessions are never persisted.

use super::policy::HistoryPolicy;
use crate::message::Turn;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Conversation history of one user.
#[derive(Debug)]
pub struct Session {
    turns: Vec<Turn>,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            last_active: Instant::now(),
        }
    }

    /// Turns in production order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn and mark the session active.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.last_active = Instant::now();
    }

    /// Apply the retention policy.
    pub fn enforce(&mut self, policy: &HistoryPolicy) {
        policy.enforce_in_place(&mut self.turns);
    }

    /// Time since the last append.
    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

/// Exclusive access to one user's session.
pub type SessionGuard = OwnedMutexGuard<Session>;

/// Process-wide map of user id to session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the user's session handle, creating it on first use.
    fn handle(&self, user_id: &str) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.get(user_id) {
            return existing.clone();
        }
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new())))
            .clone()
    }

    /// Lock the user's session for a whole read-modify-write.
    pub async fn lock(&self, user_id: &str) -> SessionGuard {
        // The map reference is released before awaiting the lock.
        let handle = self.handle(user_id);
        handle.lock_owned().await
    }

    /// Snapshot of the user's history, creating an empty session if needed.
    pub async fn get_or_create(&self, user_id: &str) -> Vec<Turn> {
        self.lock(user_id).await.turns().to_vec()
    }

    /// Append one turn to the user's history.
    pub async fn append(&self, user_id: &str, turn: Turn) {
        self.lock(user_id).await.push(turn);
    }

    /// Apply the retention policy to the user's history.
    pub async fn enforce(&self, user_id: &str, policy: &HistoryPolicy) {
        self.lock(user_id).await.enforce(policy);
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions idle for at least `ttl`. Sessions that are locked or
    /// whose handle is held by an in-flight request are kept.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();

        self.sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(session) => session.idle_for() < ttl,
                Err(_) => true,
            }
        });

        before.saturating_sub(self.sessions.len())
    }

    /// Periodically evict idle sessions.
    pub fn spawn_sweeper(store: Arc<Self>, ttl: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let period = ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                let evicted = store.evict_idle(ttl);
                if evicted > 0 {
                    tracing::info!(evicted, remaining = store.len(), "Evicted idle sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_starts_empty() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        assert!(store.get_or_create("u1").await.is_empty());
        assert!(store.contains("u1"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SessionStore::new();
        store.append("u1", Turn::user("one")).await;
        store.append("u1", Turn::assistant("two")).await;
        store.append("u2", Turn::user("other")).await;

        let history = store.get_or_create("u1").await;
        assert_eq!(history, vec![Turn::user("one"), Turn::assistant("two")]);
        assert_eq!(store.get_or_create("u2").await.len(), 1);
    }

    #[tokio::test]
    async fn test_enforce_trims_stored_history() {
        let store = SessionStore::new();
        let policy = HistoryPolicy::new(1, 500);
        for i in 0..5 {
            store.append("u1", Turn::user(format!("m{i}"))).await;
        }

        store.enforce("u1", &policy).await;
        let history = store.get_or_create("u1").await;
        assert_eq!(history, vec![Turn::user("m3"), Turn::user("m4")]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(SessionStore::new());

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut session = store.lock("same-user").await;
                    let seen = session.len();
                    tokio::task::yield_now().await;
                    session.push(Turn::user(format!("{i}")));
                    assert_eq!(session.len(), seen + 1);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get_or_create("same-user").await.len(), 50);
    }

    #[tokio::test]
    async fn test_evict_idle_removes_stale_sessions() {
        let store = SessionStore::new();
        store.append("u1", Turn::user("hi")).await;
        store.append("u2", Turn::user("hi")).await;

        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.evict_idle(Duration::ZERO), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_locked_session() {
        let store = SessionStore::new();
        let guard = store.lock("busy").await;
        store.append("idle", Turn::user("hi")).await;

        assert_eq!(store.evict_idle(Duration::ZERO), 1);
        assert!(store.contains("busy"));
        drop(guard);
    }
}
