use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Server-assigned correlation context for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Client capabilities recorded by `initialize`.
    pub capabilities: Option<Value>,
    pub client_info: Option<Value>,
}

impl Session {
    fn mint(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_seen_at: now,
            capabilities: None,
            client_info: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.capabilities.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionPolicy {
    /// Sessions idle for longer than this are treated as unknown. `None` keeps them forever.
    pub idle_ttl: Option<Duration>,
}

impl SessionPolicy {
    pub fn unbounded() -> Self {
        Self { idle_ttl: None }
    }

    pub fn with_idle_ttl(ttl: Duration) -> Self {
        Self {
            idle_ttl: Some(ttl),
        }
    }

    /// `0` disables eviction.
    pub fn from_ttl_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::unbounded()
        } else {
            Self::with_idle_ttl(Duration::from_secs(secs))
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.idle_ttl else {
            return false;
        };
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(session.last_seen_at) > ttl
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSession {
    pub session: Session,
    /// True when the caller's id was absent, unknown or expired and a new session was created.
    pub minted: bool,
}

/// Process-wide session map. Every operation is a single critical section.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    policy: SessionPolicy,
}

impl SessionStore {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create(&self) -> Session {
        let mut map = self.lock();
        mint_locked(&mut map, Utc::now())
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut map = self.lock();
        let session = map.get(id)?;
        if self.policy.is_expired(session, now) {
            map.remove(id);
            return None;
        }
        Some(session.clone())
    }

    /// Returns the live session for `id`, or mints a new one.
    ///
    /// Session identity is server-assigned: an unknown id is never adopted, a
    /// fresh id is issued instead.
    pub fn resolve(&self, id: Option<&str>) -> ResolvedSession {
        let now = Utc::now();
        let mut map = self.lock();

        if let Some(id) = id {
            let expired = match map.get_mut(id) {
                Some(session) if !self.policy.is_expired(session, now) => {
                    session.last_seen_at = now;
                    return ResolvedSession {
                        session: session.clone(),
                        minted: false,
                    };
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                map.remove(id);
                tracing::debug!(
                    event = "mcp_session_expired",
                    session_id = %id,
                    "Expired MCP session presented; minting a new one"
                );
            } else {
                tracing::debug!(
                    event = "mcp_session_unknown",
                    session_id = %id,
                    "Unknown MCP session id presented; minting a new one"
                );
            }
        }

        ResolvedSession {
            session: mint_locked(&mut map, now),
            minted: true,
        }
    }

    pub fn get_or_create(&self, id: Option<&str>) -> Session {
        self.resolve(id).session
    }

    /// Inserts a fully formed session, returning the one it replaced.
    pub fn insert(&self, session: Session) -> Option<Session> {
        self.lock().insert(session.id.clone(), session)
    }

    /// Marks the session as active now. Returns false for unknown sessions.
    pub fn touch(&self, id: &str) -> bool {
        let mut map = self.lock();
        match map.get_mut(id) {
            Some(session) => {
                session.last_seen_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn record_initialize(
        &self,
        id: &str,
        capabilities: Value,
        client_info: Option<Value>,
    ) -> bool {
        let mut map = self.lock();
        match map.get_mut(id) {
            Some(session) => {
                session.capabilities = Some(capabilities);
                session.client_info = client_info;
                session.last_seen_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        if self.policy.idle_ttl.is_none() {
            return 0;
        }
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, session| !self.policy.is_expired(session, now));
        before - map.len()
    }

    /// Starts the periodic eviction task. Returns `None` when the policy never expires sessions.
    pub fn spawn_sweeper(&self, period: Duration) -> Option<JoinHandle<()>> {
        if self.policy.idle_ttl.is_none() {
            return None;
        }
        let store = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired();
                if evicted > 0 {
                    tracing::info!(
                        event = "mcp_session_sweep",
                        evicted,
                        remaining = store.len(),
                        "Evicted idle MCP sessions"
                    );
                }
            }
        }))
    }
}

fn mint_locked(map: &mut HashMap<String, Session>, now: DateTime<Utc>) -> Session {
    let mut id = Uuid::new_v4().to_string();
    while map.contains_key(&id) {
        id = Uuid::new_v4().to_string();
    }
    let session = Session::mint(id.clone(), now);
    map.insert(id, session.clone());
    tracing::debug!(
        event = "mcp_session_created",
        session_id = %session.id,
        "MCP session created"
    );
    session
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    #[test]
    fn resolve_without_id_mints() {
        let store = SessionStore::new(SessionPolicy::unbounded());
        let resolved = store.resolve(None);
        assert!(resolved.minted);
        assert_eq!(store.len(), 1);
        assert!(!resolved.session.is_initialized());
    }

    #[test]
    fn resolve_known_id_reuses_session() {
        let store = SessionStore::new(SessionPolicy::unbounded());
        let created = store.create();
        let resolved = store.resolve(Some(&created.id));
        assert!(!resolved.minted);
        assert_eq!(resolved.session.id, created.id);
        assert_eq!(resolved.session.created_at, created.created_at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn resolve_unknown_id_mints_a_different_id() {
        let store = SessionStore::new(SessionPolicy::unbounded());
        let resolved = store.resolve(Some("client-chosen"));
        assert!(resolved.minted);
        assert_ne!(resolved.session.id, "client-chosen");
        assert!(store.get("client-chosen").is_none());
    }

    #[test]
    fn record_initialize_stores_capabilities() {
        let store = SessionStore::new(SessionPolicy::unbounded());
        let session = store.create();
        assert!(store.record_initialize(
            &session.id,
            json!({ "sampling": {} }),
            Some(json!({ "name": "host", "version": "1.0" })),
        ));
        let stored = store.get(&session.id).unwrap();
        assert!(stored.is_initialized());
        assert_eq!(stored.client_info.unwrap()["name"], "host");
        assert!(!store.record_initialize("missing", json!({}), None));
    }

    #[test]
    fn expired_session_is_replaced_on_resolve() {
        let store = SessionStore::new(SessionPolicy::with_idle_ttl(Duration::from_secs(60)));
        let stale_at = Utc::now() - TimeDelta::seconds(120);
        store.insert(Session {
            id: "stale".to_string(),
            created_at: stale_at,
            last_seen_at: stale_at,
            capabilities: None,
            client_info: None,
        });

        assert!(store.get("stale").is_none());
        let resolved = store.resolve(Some("stale"));
        assert!(resolved.minted);
        assert_ne!(resolved.session.id, "stale");
    }

    #[test]
    fn eviction_only_removes_idle_sessions() {
        let store = SessionStore::new(SessionPolicy::from_ttl_secs(60));
        let fresh = store.create();
        let stale_at = Utc::now() - TimeDelta::seconds(61);
        store.insert(Session {
            id: "stale".to_string(),
            created_at: stale_at,
            last_seen_at: stale_at,
            capabilities: None,
            client_info: None,
        });

        assert_eq!(store.evict_expired(), 1);
        assert!(store.get(&fresh.id).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unbounded_policy_never_evicts() {
        let store = SessionStore::new(SessionPolicy::from_ttl_secs(0));
        let long_ago = Utc::now() - TimeDelta::days(365);
        store.insert(Session {
            id: "old".to_string(),
            created_at: long_ago,
            last_seen_at: long_ago,
            capabilities: None,
            client_info: None,
        });
        assert_eq!(store.evict_expired(), 0);
        assert!(store.get("old").is_some());
        assert!(store.spawn_sweeper(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn touch_refreshes_last_seen() {
        let store = SessionStore::new(SessionPolicy::with_idle_ttl(Duration::from_secs(60)));
        let past = Utc::now() - TimeDelta::seconds(59);
        store.insert(Session {
            id: "live".to_string(),
            created_at: past,
            last_seen_at: past,
            capabilities: None,
            client_info: None,
        });
        assert!(store.touch("live"));
        assert_eq!(store.evict_expired_at(Utc::now() + TimeDelta::seconds(30)), 0);
        assert!(!store.touch("missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_idle_sessions_periodically() {
        let store = SessionStore::new(SessionPolicy::with_idle_ttl(Duration::from_secs(60)));
        let fresh = store.create();
        let stale_at = Utc::now() - TimeDelta::seconds(120);
        store.insert(Session {
            id: "stale".to_string(),
            created_at: stale_at,
            last_seen_at: stale_at,
            capabilities: None,
            client_info: None,
        });
        assert_eq!(store.len(), 2);

        let sweeper = store
            .spawn_sweeper(Duration::from_secs(5))
            .expect("ttl policy starts a sweeper");
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh.id).is_some());
        sweeper.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_creation_yields_unique_ids() {
        let store = SessionStore::new(SessionPolicy::unbounded());
        let handles: Vec<_> = (0..256)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.resolve(None).session.id })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 256);
        assert_eq!(store.len(), 256);
    }
}
