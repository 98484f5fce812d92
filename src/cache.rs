//! In-memory response cache
//!
//! Keyed, tagged, TTL-bound memoization of provider responses plus request
//! coalescing: while a fetch for a key is in flight, every other caller for
//! that key awaits the same result instead of issuing its own.
//!
//! The cache is an explicitly constructed handle (`CacheHandle::create`), cheap
//! to clone and shared by everything in one pipeline instance. Memory is
//! bounded two ways: writes periodically sweep expired entries, and each kind
//! holds at most `CacheKind::max_entries` entries, evicting the least recently
//! used one when full.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ResolveError;

// =============================================================================
// Kinds, Lifetimes, Tags
// =============================================================================

/// Class of cached data; each has its own volatility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Home,
    Search,
    TitleDetail,
    Episodes,
    StreamingIndex,
    Stream,
    Subtitles,
    Resolved,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Home => "home",
            CacheKind::Search => "search",
            CacheKind::TitleDetail => "title_detail",
            CacheKind::Episodes => "episodes",
            CacheKind::StreamingIndex => "streaming_index",
            CacheKind::Stream => "stream",
            CacheKind::Subtitles => "subtitles",
            CacheKind::Resolved => "resolved",
        }
    }

    /// Built-in ttl / keep-alive for this kind
    pub fn default_lifetime(&self) -> Lifetime {
        match self {
            CacheKind::Home => Lifetime::minutes(5, 10),
            CacheKind::Search => Lifetime::minutes(3, 5),
            CacheKind::TitleDetail => Lifetime::minutes(15, 10),
            CacheKind::Episodes => Lifetime::minutes(30, 10),
            CacheKind::StreamingIndex => Lifetime::minutes(15, 10),
            // Upstream links expire quickly
            CacheKind::Stream | CacheKind::Subtitles | CacheKind::Resolved => {
                Lifetime::minutes(2, 2)
            }
        }
    }

    /// Most entries of this kind held at once
    pub fn max_entries(&self) -> usize {
        match self {
            CacheKind::Home => 4,
            CacheKind::Search => 50,
            CacheKind::TitleDetail | CacheKind::Episodes | CacheKind::StreamingIndex => 100,
            CacheKind::Stream | CacheKind::Subtitles | CacheKind::Resolved => 20,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long an entry lives: hard TTL, and keep-alive after last access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    pub ttl_secs: u64,
    pub keep_alive_secs: u64,
}

impl Lifetime {
    pub fn new(ttl: Duration, keep_alive: Duration) -> Self {
        Self {
            ttl_secs: ttl.as_secs(),
            keep_alive_secs: keep_alive.as_secs(),
        }
    }

    fn minutes(ttl: u64, keep_alive: u64) -> Self {
        Self {
            ttl_secs: ttl * 60,
            keep_alive_secs: keep_alive * 60,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Per-kind lifetime overrides (the `[cache]` config table)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub home: Option<Lifetime>,
    pub search: Option<Lifetime>,
    pub title_detail: Option<Lifetime>,
    pub episodes: Option<Lifetime>,
    pub streaming_index: Option<Lifetime>,
    pub stream: Option<Lifetime>,
    pub subtitles: Option<Lifetime>,
    pub resolved: Option<Lifetime>,
}

impl CacheConfig {
    pub fn lifetime(&self, kind: CacheKind) -> Lifetime {
        let custom = match kind {
            CacheKind::Home => self.home,
            CacheKind::Search => self.search,
            CacheKind::TitleDetail => self.title_detail,
            CacheKind::Episodes => self.episodes,
            CacheKind::StreamingIndex => self.streaming_index,
            CacheKind::Stream => self.stream,
            CacheKind::Subtitles => self.subtitles,
            CacheKind::Resolved => self.resolved,
        };
        custom.unwrap_or_else(|| kind.default_lifetime())
    }
}

/// Label for bulk invalidation; attached when an entry is created
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn kind(kind: CacheKind) -> Self {
        Self(format!("kind:{}", kind))
    }

    pub fn title(title_id: &str) -> Self {
        Self(format!("title:{}", title_id))
    }

    pub fn episode(title_id: &str, number: impl fmt::Display) -> Self {
        Self(format!("episode:{}:{}", title_id, number))
    }

    pub fn streaming_episode(episode_id: &str) -> Self {
        Self(format!("streaming_episode:{}", episode_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic cache keys, one builder per query shape
pub mod keys {
    use std::fmt::Display;

    pub fn home() -> String {
        "home".to_string()
    }

    pub fn search(keyword: &str, page: u32) -> String {
        format!("search_{}_page_{}", keyword.trim().to_lowercase(), page)
    }

    pub fn title_detail(title_id: &str) -> String {
        format!("anime_{}", title_id)
    }

    pub fn episodes(title_id: &str) -> String {
        format!("episodes_{}", title_id)
    }

    pub fn streaming_index(title_id: &str) -> String {
        format!("info_{}", title_id)
    }

    pub fn stream(streaming_episode_id: &str) -> String {
        format!("stream_{}", streaming_episode_id)
    }

    pub fn subtitles(catalog_episode_id: &str) -> String {
        format!("subtitles_{}", catalog_episode_id)
    }

    pub fn resolved(title_id: &str, number: impl Display) -> String {
        format!("resolved_{}_{}", title_id, number)
    }

    /// Resolution key for a request that pins provider episode IDs
    ///
    /// Requests without pinned IDs share `resolved(title_id, number)`.
    pub fn resolved_with_ids(
        title_id: &str,
        number: impl Display,
        streaming_episode_id: Option<&str>,
        catalog_episode_id: Option<&str>,
    ) -> String {
        let base = resolved(title_id, number);
        if streaming_episode_id.is_none() && catalog_episode_id.is_none() {
            return base;
        }
        format!(
            "{}_strm:{}_cat:{}",
            base,
            streaming_episode_id.unwrap_or("-"),
            catalog_episode_id.unwrap_or("-")
        )
    }
}

/// Tags and lifetime for a new entry
#[derive(Debug, Clone)]
pub struct EntryOptions {
    kind: CacheKind,
    tags: HashSet<Tag>,
    lifetime: Lifetime,
}

impl EntryOptions {
    /// Options carrying `kind`'s tag and the given lifetime
    pub fn new(kind: CacheKind, lifetime: Lifetime) -> Self {
        let mut tags = HashSet::new();
        tags.insert(Tag::kind(kind));
        Self {
            kind,
            tags,
            lifetime,
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn tags(&self) -> &HashSet<Tag> {
        &self.tags
    }
}

// =============================================================================
// Cache Handle
// =============================================================================

/// Minimum gap between expiry sweeps triggered by writes
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

type AnyValue = Arc<dyn Any + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<AnyValue, ResolveError>>>;

struct Entry {
    value: AnyValue,
    kind: CacheKind,
    tags: HashSet<Tag>,
    created_at: Instant,
    ttl: Duration,
    keep_alive: Duration,
    last_accessed_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant, subscribers: usize) -> bool {
        now > self.created_at + self.ttl
            || (now > self.last_accessed_at + self.keep_alive && subscribers == 0)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    in_flight: HashMap<String, InFlight>,
    subscribers: HashMap<String, usize>,
    last_sweep: Option<Instant>,
    disposed: bool,
}

impl State {
    fn subscribers(&self, key: &str) -> usize {
        self.subscribers.get(key).copied().unwrap_or(0)
    }

    /// Live entry for `key`, evicting it first if it has expired
    fn live_entry(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        let subscribers = self.subscribers(key);
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| e.is_expired(now, subscribers));
        if expired {
            debug!(key, "cache entry expired");
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn lookup<T: Clone + 'static>(&mut self, key: &str, now: Instant) -> Option<T> {
        let entry = self.live_entry(key, now)?;
        let value = entry.value.downcast_ref::<T>()?.clone();
        entry.last_accessed_at = now;
        Some(value)
    }

    /// Drop every expired entry; returns how many were dropped
    fn sweep(&mut self, now: Instant) -> usize {
        let State {
            entries,
            subscribers,
            ..
        } = &mut *self;
        let before = entries.len();
        entries.retain(|key, entry| {
            let subs = subscribers.get(key).copied().unwrap_or(0);
            !entry.is_expired(now, subs)
        });
        self.last_sweep = Some(now);
        before - self.entries.len()
    }

    fn sweep_if_due(&mut self, now: Instant) {
        let due = self
            .last_sweep
            .map_or(true, |last| now >= last + SWEEP_INTERVAL);
        if due {
            let removed = self.sweep(now);
            if removed > 0 {
                debug!(removed, "swept expired cache entries");
            }
        }
    }

    /// Evict least recently used entries of `kind` until one more fits
    ///
    /// Subscribed entries go last.
    fn make_room(&mut self, kind: CacheKind) {
        let limit = kind.max_entries();
        loop {
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| e.kind == kind)
                .map(|(k, e)| (self.subscribers(k) > 0, e.last_accessed_at, k))
                .min()
                .map(|(_, _, k)| k.clone());
            let count = self.entries.values().filter(|e| e.kind == kind).count();
            match victim {
                Some(key) if count >= limit => {
                    debug!(key = %key, kind = %kind, "cache full, evicting");
                    self.entries.remove(&key);
                }
                _ => break,
            }
        }
    }
}

struct Inner {
    config: CacheConfig,
    state: Mutex<State>,
}

/// Shared cache service; clones refer to the same storage
#[derive(Clone)]
pub struct CacheHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("CacheHandle")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl CacheHandle {
    pub fn create(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Drop all entries; later writes are ignored
    ///
    /// In-flight fetches still settle for their waiters but are not stored.
    pub fn dispose(self) {
        let mut state = self.state();
        state.disposed = true;
        state.entries.clear();
        state.subscribers.clear();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave an entry half-written
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Entry options for `kind` using this cache's configured lifetime
    pub fn options(&self, kind: CacheKind) -> EntryOptions {
        EntryOptions::new(kind, self.inner.config.lifetime(kind))
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let value = self.state().lookup::<T>(key, Instant::now());
        if value.is_some() {
            debug!(key, "cache hit");
        }
        value
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: T, options: EntryOptions) {
        let mut state = self.state();
        Self::store(&mut state, key, Arc::new(value), options);
    }

    fn store(state: &mut State, key: &str, value: AnyValue, options: EntryOptions) {
        if state.disposed {
            debug!(key, "cache disposed, dropping write");
            return;
        }
        let now = Instant::now();
        state.sweep_if_due(now);
        if !state.entries.contains_key(key) {
            state.make_room(options.kind);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                kind: options.kind,
                tags: options.tags,
                created_at: now,
                ttl: options.lifetime.ttl(),
                keep_alive: options.lifetime.keep_alive(),
                last_accessed_at: now,
            },
        );
    }

    /// Whether a live entry exists (does not count as an access)
    pub fn contains(&self, key: &str) -> bool {
        let mut state = self.state();
        let now = Instant::now();
        state.live_entry(key, now).is_some()
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.state().entries.remove(key).is_some()
    }

    /// Remove every entry carrying `tag`; returns how many were dropped
    pub fn invalidate_by_tag(&self, tag: &Tag) -> usize {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.tags.contains(tag));
        let removed = before - state.entries.len();
        debug!(tag = %tag, removed, "invalidated by tag");
        removed
    }

    /// Sweep expired entries; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.state().sweep(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    /// Keep `key` alive past its keep-alive window while the guard lives
    ///
    /// For consumers still using a value, such as a player holding a resolved
    /// stream (see `Pipeline::attach`). The hard TTL still applies.
    pub fn subscribe(&self, key: &str) -> Subscription {
        *self.state().subscribers.entry(key.to_string()).or_insert(0) += 1;
        Subscription {
            cache: self.clone(),
            key: key.to_string(),
        }
    }

    fn unsubscribe(&self, key: &str) {
        let mut state = self.state();
        if let Some(count) = state.subscribers.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.subscribers.remove(key);
            }
        }
    }

    /// Return the cached value for `key`, or run `factory` exactly once across
    /// all concurrent callers and cache its success
    ///
    /// The factory runs on a spawned task, so it completes (and populates the
    /// cache) even when every waiter has gone away. Failures are not cached.
    pub async fn coalesce<T, F, Fut>(
        &self,
        key: &str,
        options: EntryOptions,
        factory: F,
    ) -> Result<T, ResolveError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        match self.lookup_or_join::<T>(key) {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Joined(shared) => return Self::downcast(key, shared.await?),
            Lookup::Miss => {}
        }

        let future = factory();

        let shared = {
            let mut state = self.state();
            let now = Instant::now();
            if let Some(value) = state.lookup::<T>(key, now) {
                return Ok(value);
            }
            match state.in_flight.get(key) {
                // Lost a race with another caller; our future is never polled
                Some(existing) => existing.clone(),
                None => {
                    let shared = self.spawn_fetch(key, options, future);
                    state.in_flight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        Self::downcast(key, shared.await?)
    }

    fn lookup_or_join<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Lookup<T> {
        let mut state = self.state();
        if let Some(value) = state.lookup::<T>(key, Instant::now()) {
            debug!(key, "cache hit");
            return Lookup::Hit(value);
        }
        match state.in_flight.get(key) {
            Some(existing) => {
                debug!(key, "joining in-flight fetch");
                Lookup::Joined(existing.clone())
            }
            None => Lookup::Miss,
        }
    }

    fn spawn_fetch<T, Fut>(&self, key: &str, options: EntryOptions, future: Fut) -> InFlight
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let cache = self.clone();
        let owned_key = key.to_string();
        let task = tokio::spawn(async move {
            let result = future.await.map(|value| Arc::new(value) as AnyValue);
            cache.settle(&owned_key, &result, options);
            result
        });

        let cache = self.clone();
        let owned_key = key.to_string();
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    cache.state().in_flight.remove(&owned_key);
                    Err(ResolveError::Internal(format!(
                        "fetch task for {} failed: {}",
                        owned_key, join_error
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Clear the in-flight marker and store a success, under one lock
    fn settle(&self, key: &str, result: &Result<AnyValue, ResolveError>, options: EntryOptions) {
        let mut state = self.state();
        state.in_flight.remove(key);
        if let Ok(value) = result {
            Self::store(&mut state, key, value.clone(), options);
        }
    }

    fn downcast<T: Clone + 'static>(key: &str, value: AnyValue) -> Result<T, ResolveError> {
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ResolveError::Internal(format!("cache type mismatch for {}", key)))
    }
}

enum Lookup<T> {
    Hit(T),
    Joined(InFlight),
    Miss,
}

/// Guard returned by `CacheHandle::subscribe`
pub struct Subscription {
    cache: CacheHandle,
    key: String,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}
