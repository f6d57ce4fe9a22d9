//! Conversation sessions.
//!
//! A session threads context across requests that share a caller-supplied
//! id. Stores are bounded: entries expire after a TTL and the least recently
//! updated session is evicted when the store is full.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::config::SessionConfig;
use crate::core::{TaskKind, TaskOutcome};
use crate::util::{blocking, keep_tail};
use crate::{alog_debug, Result};

const SESSIONS_VERSION: u32 = 1;

/// Stored state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Running context handed to every task of the next request.
    pub context: String,
    /// Outcomes of the most recent workflow.
    pub agent_outputs: BTreeMap<TaskKind, TaskOutcome>,
    pub request_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            context: String::new(),
            agent_outputs: BTreeMap::new(),
            request_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append successful outputs to the context and remember the outcomes.
    ///
    /// The context keeps at most `max_context_chars` trailing characters.
    pub fn record(&mut self, results: &BTreeMap<TaskKind, TaskOutcome>, max_context_chars: usize) {
        for (kind, outcome) in results {
            if let TaskOutcome::Success { text } = outcome {
                if !self.context.is_empty() {
                    self.context.push('\n');
                }
                self.context.push_str(&format!("{}: {}", kind, text));
            }
        }
        let kept = keep_tail(&self.context, max_context_chars).len();
        if kept < self.context.len() {
            self.context.drain(..self.context.len() - kept);
        }
        self.agent_outputs = results.clone();
        self.request_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.updated_at > ttl,
            Err(_) => false,
        }
    }
}

/// Storage for session state, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Live state for `id`, or `None` if absent or expired.
    async fn get(&self, id: &str) -> Result<Option<SessionState>>;
    async fn put(&self, id: &str, state: SessionState) -> Result<()>;
    /// Remove expired sessions, returning how many were removed.
    async fn evict_expired(&self) -> Result<usize>;
    async fn len(&self) -> usize;
}

/// Process-local session store with TTL and capacity bounds.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    ttl: Duration,
    capacity: usize,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.ttl(), config.max_sessions)
    }

    async fn snapshot(&self) -> BTreeMap<String, SessionState> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    async fn restore(&self, entries: BTreeMap<String, SessionState>) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        for (id, state) in entries {
            if !state.is_expired(now, self.ttl) {
                sessions.insert(id, state);
            }
        }
        while sessions.len() > self.capacity {
            evict_oldest(&mut sessions);
        }
    }
}

fn evict_oldest(sessions: &mut HashMap<String, SessionState>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, state)| state.updated_at)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        alog_debug!("Evicting session {} (capacity)", id);
        sessions.remove(&id);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<SessionState>> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return Ok(None),
                Some(state) if !state.is_expired(now, self.ttl) => {
                    return Ok(Some(state.clone()))
                }
                Some(_) => {}
            }
        }
        alog_debug!("Session {} expired", id);
        self.sessions.write().await.remove(id);
        Ok(None)
    }

    async fn put(&self, id: &str, state: SessionState) -> Result<()> {
        let now = Utc::now();
        let ttl = self.ttl;
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(id) && sessions.len() >= self.capacity {
            sessions.retain(|_, s| !s.is_expired(now, ttl));
            while sessions.len() >= self.capacity {
                evict_oldest(&mut sessions);
            }
        }
        sessions.insert(id.to_string(), state);
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let ttl = self.ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, ttl));
        Ok(before - sessions.len())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionsFile {
    version: u32,
    sessions: BTreeMap<String, SessionState>,
}

/// In-memory store mirrored to a JSON file after every write.
///
/// Saves are serialized so a snapshot is never overwritten by an older one.
#[derive(Debug)]
pub struct FileSessionStore {
    inner: InMemorySessionStore,
    path: PathBuf,
    save_lock: Mutex<()>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading any sessions saved there.
    pub async fn open(path: &Path, ttl: Duration, capacity: usize) -> Result<Self> {
        let inner = InMemorySessionStore::new(ttl, capacity);
        let load_path = path.to_path_buf();
        let loaded = blocking(move || load_sessions(&load_path)).await?;
        alog_debug!(
            "Loaded {} sessions from {}",
            loaded.len(),
            path.display()
        );
        inner.restore(loaded).await;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
            save_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let file = SessionsFile {
            version: SESSIONS_VERSION,
            sessions: self.inner.snapshot().await,
        };
        let contents = serde_json::to_string_pretty(&file)?;
        let path = self.path.clone();
        blocking(move || write_sessions(&path, &contents)).await
    }
}

fn load_sessions(path: &Path) -> Result<BTreeMap<String, SessionState>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = fs::read_to_string(path)?;
    let file: SessionsFile = serde_json::from_str(&contents)?;
    Ok(file.sessions)
}

fn write_sessions(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    if path.exists() {
        fs::copy(path, path.with_extension("json.bak"))?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, id: &str) -> Result<Option<SessionState>> {
        self.inner.get(id).await
    }

    async fn put(&self, id: &str, state: SessionState) -> Result<()> {
        self.inner.put(id, state).await?;
        self.save().await
    }

    async fn evict_expired(&self) -> Result<usize> {
        let removed = self.inner.evict_expired().await?;
        if removed > 0 {
            self.save().await?;
        }
        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}

/// One async mutex per session id.
///
/// Entries nobody holds or waits on are pruned on the next acquire.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
