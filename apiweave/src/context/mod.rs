//! Context cache: past results, per-user session lists, and chat history.
//!
//! Three TTL tiers (responses 1h, sessions 30m, history 24h); expiry is lazy on read,
//! with [`ContextCache::sweep`] for the periodic pass a startup task may drive. All tiers
//! are mutation-safe `DashMap`s; one instance per process.

mod relevance;

pub use relevance::{meaningful_tokens, normalize_query, overlap_score};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

/// How many context entries [`ContextCache::find_relevant_context`] returns.
pub const RELEVANT_CONTEXT_LIMIT: usize = 5;
/// Most-recent cache keys kept per user session.
pub const SESSION_CAP: usize = 20;
/// Chat history items kept per user (or the anonymous bucket).
pub const HISTORY_CAP: usize = 100;

const ANONYMOUS: &str = "anonymous";

/// One cached `{query → result}` entry.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub project_id: i64,
    pub query: String,
    pub user_id: Option<String>,
    /// `METHOD /path` label of the endpoint that produced the data.
    pub endpoint: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// One chat history item.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub query: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

/// Tier TTLs; defaults match the engine contract (1h / 30m / 24h).
#[derive(Clone, Copy, Debug)]
pub struct CacheTtls {
    pub response: Duration,
    pub session: Duration,
    pub history: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            response: Duration::from_secs(3600),
            session: Duration::from_secs(1800),
            history: Duration::from_secs(86_400),
        }
    }
}

struct StoredResponse {
    entry: CachedResponse,
    tokens: Vec<String>,
    expires_at: Instant,
}

struct SessionList {
    keys: Vec<String>,
    expires_at: Instant,
}

struct HistoryList {
    items: Vec<HistoryEntry>,
    expires_at: Instant,
}

/// Keyed store of past results plus per-user history. See module docs for tiers.
pub struct ContextCache {
    ttls: CacheTtls,
    responses: DashMap<String, StoredResponse>,
    sessions: DashMap<String, SessionList>,
    history: DashMap<String, HistoryList>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::with_ttls(CacheTtls::default())
    }

    pub fn with_ttls(ttls: CacheTtls) -> Self {
        Self {
            ttls,
            responses: DashMap::new(),
            sessions: DashMap::new(),
            history: DashMap::new(),
        }
    }

    fn response_key(project_id: i64, normalized: &str, user_id: Option<&str>) -> String {
        format!(
            "{}:{}:{}:{}",
            project_id,
            normalized,
            user_id.unwrap_or(ANONYMOUS),
            Utc::now().timestamp_millis()
        )
    }

    /// Stores a successful result and, for identified users, prepends it to the session list.
    pub fn store_response(&self, entry: CachedResponse) {
        let normalized = normalize_query(&entry.query);
        let key = Self::response_key(entry.project_id, &normalized, entry.user_id.as_deref());
        let tokens = meaningful_tokens(&entry.query);
        let user_id = entry.user_id.clone();
        self.responses.insert(
            key.clone(),
            StoredResponse {
                entry,
                tokens,
                expires_at: Instant::now() + self.ttls.response,
            },
        );

        if let Some(user) = user_id {
            let mut session = self.sessions.entry(user).or_insert_with(|| SessionList {
                keys: Vec::new(),
                expires_at: Instant::now() + self.ttls.session,
            });
            session.keys.insert(0, key);
            session.keys.truncate(SESSION_CAP);
            session.expires_at = Instant::now() + self.ttls.session;
        }
    }

    /// Top-5 cached entries for the project, ordered by relevance desc then recency desc.
    ///
    /// Entries of other projects are never returned; entries of other identified users
    /// are visible only to their owner (anonymous entries are visible to everyone).
    pub fn find_relevant_context(
        &self,
        project_id: i64,
        query: &str,
        user_id: Option<&str>,
    ) -> Vec<CachedResponse> {
        let tokens = meaningful_tokens(query);
        let now = Instant::now();

        let mut scored: Vec<(u32, DateTime<Utc>, CachedResponse)> = self
            .responses
            .iter()
            .filter(|r| r.expires_at > now)
            .filter(|r| r.entry.project_id == project_id)
            .filter(|r| match (&r.entry.user_id, user_id) {
                (None, _) => true,
                (Some(owner), Some(caller)) => owner == caller,
                (Some(_), None) => false,
            })
            .map(|r| {
                (
                    overlap_score(&tokens, &r.tokens),
                    r.entry.created_at,
                    r.entry.clone(),
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        scored
            .into_iter()
            .take(RELEVANT_CONTEXT_LIMIT)
            .map(|(_, _, entry)| entry)
            .collect()
    }

    /// Appends to the user's (or anonymous) chat history, dropping the oldest past the cap.
    pub fn append_history(&self, user_id: Option<&str>, query: &str, summary: &str) {
        let bucket = user_id.unwrap_or(ANONYMOUS).to_string();
        let mut list = self.history.entry(bucket).or_insert_with(|| HistoryList {
            items: Vec::new(),
            expires_at: Instant::now() + self.ttls.history,
        });
        list.items.push(HistoryEntry {
            query: query.to_string(),
            summary: summary.to_string(),
            timestamp: Utc::now(),
        });
        let overflow = list.items.len().saturating_sub(HISTORY_CAP);
        if overflow > 0 {
            list.items.drain(..overflow);
        }
        list.expires_at = Instant::now() + self.ttls.history;
    }

    /// Chat history for a user or the anonymous bucket; empty when expired.
    pub fn history(&self, user_id: Option<&str>) -> Vec<HistoryEntry> {
        let bucket = user_id.unwrap_or(ANONYMOUS);
        match self.history.get(bucket) {
            Some(list) if list.expires_at > Instant::now() => list.items.clone(),
            _ => Vec::new(),
        }
    }

    /// Removes expired entries from every tier.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.responses.retain(|_, r| r.expires_at > now);
        self.sessions.retain(|_, s| s.expires_at > now);
        self.history.retain(|_, h| h.expires_at > now);
    }

    /// Spawns the periodic sweeper; the caller owns the handle and aborts it at shutdown.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}
