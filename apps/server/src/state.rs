//! # Application State
//!
//! Shared handles every request gets through axum's `State`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AppState (Clone, all fields behind Arc or already cheap to clone)      │
//! │                                                                         │
//! │  db            caixa_db::Database (SqlitePool)                          │
//! │  config        ServerConfig                                             │
//! │  jwt           JwtManager                                               │
//! │  previews      TtlCache<(tenant, session), ParsedCsv>   15 min, 256     │
//! │  web_sessions  TtlCache<cookie token, WebSession>        8 h, 10 000    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both caches live in process memory: a restart drops pending imports and
//! logs every web user out. Bearer tokens survive restarts.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use caixa_core::import::ParsedCsv;
use caixa_core::{TenantId, UserRole};
use caixa_db::Database;

use crate::auth::jwt::JwtManager;
use crate::config::ServerConfig;

// =============================================================================
// TTL Cache
// =============================================================================

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded map whose entries expire `ttl` after insertion.
///
/// Expired entries are dropped lazily on access and on insert. When full,
/// inserting evicts the oldest entry.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn is_live(&self, entry: &Entry<V>) -> bool {
        entry.inserted_at.elapsed() < self.ttl
    }

    /// Stores `value`, replacing any previous entry for `key`.
    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(capacity = self.capacity, "Cache full, evicted oldest entry");
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if self.is_live(entry) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Removes and returns the entry. An expired entry is removed and `None`
    /// is returned.
    pub async fn take(&self, key: &K) -> Option<V> {
        let entry = self.entries.lock().await.remove(key)?;
        self.is_live(&entry).then_some(entry.value)
    }

    pub async fn remove(&self, key: &K) {
        self.entries.lock().await.remove(key);
    }

    /// Drops every entry matching `predicate`.
    pub async fn remove_where(&self, predicate: impl Fn(&V) -> bool) {
        self.entries
            .lock()
            .await
            .retain(|_, entry| !predicate(&entry.value));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

// =============================================================================
// Cached Values
// =============================================================================

/// Staged CSV imports keyed by `(tenant, cash session)`.
pub type PreviewCache = TtlCache<(TenantId, i64), ParsedCsv>;

/// Server-side half of a cookie login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSession {
    pub user_id: i64,
    pub tenant_id: TenantId,
    pub role: UserRole,
    /// Copy of `users.active_session_id` at login
    pub active_session_id: String,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

/// Cookie token → web session.
pub type SessionStore = TtlCache<String, WebSession>;

// =============================================================================
// AppState
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<ServerConfig>,
    pub jwt: JwtManager,
    pub previews: Arc<PreviewCache>,
    pub web_sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        let jwt = JwtManager::new(
            config.jwt_secret.clone(),
            config.jwt_access_lifetime_secs,
            config.jwt_refresh_lifetime_secs,
            config.challenge_lifetime_secs,
        );
        let previews = Arc::new(PreviewCache::new(config.preview_ttl(), config.preview_capacity));
        let web_sessions = Arc::new(SessionStore::new(
            config.web_session_ttl(),
            config.web_session_capacity,
        ));

        AppState {
            db,
            config: Arc::new(config),
            jwt,
            previews,
            web_sessions,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use caixa_db::DbConfig;

    /// Fresh state over an in-memory database.
    pub(crate) async fn test_state() -> AppState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        AppState::new(db, ServerConfig::default())
    }

    #[tokio::test]
    async fn test_insert_replaces_same_key() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("a", 1).await;
        cache.insert("a", 2).await;

        assert_eq!(cache.get(&"a").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_take_removes() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("a", 1).await;

        assert_eq!(cache.take(&"a").await, Some(1));
        assert_eq!(cache.take(&"a").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_gone() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::ZERO, 4);
        cache.insert("a", 1).await;

        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.take(&"a").await, None);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache: TtlCache<i32, i32> = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert(1, 1).await;
        cache.insert(2, 2).await;
        cache.insert(3, 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.get(&3).await, Some(3));
    }

    #[tokio::test]
    async fn test_remove_where() {
        let cache: TtlCache<i32, i32> = TtlCache::new(Duration::from_secs(60), 8);
        for i in 0..4 {
            cache.insert(i, i % 2).await;
        }
        cache.remove_where(|v| *v == 1).await;
        assert_eq!(cache.len().await, 2);
    }
}
