//! Episode resolution pipeline
//!
//! Turns `(title, episode number)` into a playable `ResolvedStream`:
//!
//! ```text
//! Idle -> ResolvingIdentity -> FetchingStream -> Merging -> Resolved
//!              |                    |              |
//!              +-------------------> Failed <------+
//! ```
//!
//! Identity resolution is skipped when the caller already knows the streaming
//! episode ID. Stream fetching runs the streaming watch call and the catalog
//! subtitle feed in parallel; only the former is fatal. Every remote call goes
//! through the shared cache and a named retry policy, and the whole chain for
//! one episode is coalesced so concurrent requests share one execution.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::proxy::ProxyRewriter;
use super::resolver::{EpisodeResolver, Resolution};
use super::selection::build_resolved_stream;
use crate::api::{CatalogClient, StreamingClient};
use crate::cache::{keys, CacheHandle, CacheKind, EntryOptions, Subscription, Tag};
use crate::error::{ProviderError, ResolveError};
use crate::models::{
    CatalogEpisode, EpisodeNumber, HomePage, ResolveRequest, ResolvedStream, SearchPage,
    StreamingEpisodeIndex, SubtitleTrack, TitleDetail, WatchData,
};
use crate::retry::RetryPolicy;

// =============================================================================
// Request State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ResolvingIdentity,
    FetchingStream,
    Merging,
    Resolved,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, ResolvingIdentity)
                | (Idle, FetchingStream)
                | (ResolvingIdentity, FetchingStream)
                | (ResolvingIdentity, Failed)
                | (FetchingStream, Merging)
                | (FetchingStream, Failed)
                | (Merging, Resolved)
                | (Merging, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Resolved | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::ResolvingIdentity => "resolving_identity",
            PipelineState::FetchingStream => "fetching_stream",
            PipelineState::Merging => "merging",
            PipelineState::Resolved => "resolved",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One request's walk through the states
#[derive(Debug)]
struct RequestRun {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl RequestRun {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<(), ResolveError> {
        if !self.state.can_transition_to(next) {
            return Err(ResolveError::Internal(format!(
                "invalid pipeline transition {} -> {}",
                self.state, next
            )));
        }
        debug!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed` and hand the error back
    fn fail(&mut self, error: ResolveError) -> ResolveError {
        if self.state.can_transition_to(PipelineState::Failed) {
            debug!(from = %self.state, error = %error, "pipeline failed");
            self.state = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
        error
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Retry policies and limits for one pipeline instance
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Catalog reads
    pub critical: RetryPolicy,
    /// Streaming index and watch calls
    pub streaming: RetryPolicy,
    /// Catalog subtitle feed
    pub optional: RetryPolicy,
    /// Upper bound on one `resolve_episode` call; `None` waits for retries to finish
    pub request_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            critical: RetryPolicy::critical(),
            streaming: RetryPolicy::streaming(),
            optional: RetryPolicy::optional(),
            request_timeout: None,
        }
    }
}

/// Episode resolution service; clones share clients and cache
#[derive(Clone)]
pub struct Pipeline {
    catalog: Arc<CatalogClient>,
    streaming: Arc<StreamingClient>,
    cache: CacheHandle,
    resolver: EpisodeResolver,
    proxy: ProxyRewriter,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(catalog: CatalogClient, streaming: StreamingClient, cache: CacheHandle) -> Self {
        let config = PipelineConfig::default();
        let streaming = Arc::new(streaming);
        Self {
            catalog: Arc::new(catalog),
            resolver: EpisodeResolver::new(Arc::clone(&streaming), cache.clone(), config.streaming),
            streaming,
            cache,
            proxy: ProxyRewriter::disabled(),
            config,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.resolver =
            EpisodeResolver::new(Arc::clone(&self.streaming), self.cache.clone(), config.streaming);
        self.config = config;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyRewriter) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve one episode to a playable stream
    pub async fn resolve_episode(
        &self,
        request: ResolveRequest,
    ) -> Result<ResolvedStream, ResolveError> {
        let span = info_span!(
            "resolve_episode",
            request_id = %Uuid::new_v4(),
            title_id = %request.title_id,
            episode = %request.episode_number
        );

        let key = Self::resolved_key(&request);
        let options = self
            .cache
            .options(CacheKind::Resolved)
            .tag(Tag::title(&request.title_id))
            .tag(Tag::episode(&request.title_id, request.episode_number));

        let this = self.clone();
        let chain = self
            .cache
            .coalesce(&key, options, move || async move { this.run(request).await });

        let result = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, chain)
                .instrument(span.clone())
                .await
                .unwrap_or(Err(ResolveError::RequestTimeout(limit))),
            None => chain.instrument(span.clone()).await,
        };

        if let Err(e) = &result {
            span.in_scope(|| warn!(error = %e, kind = ?e.kind(), "episode resolution failed"));
        }
        result
    }

    /// Cache key for a request; pinned provider IDs get their own entry
    fn resolved_key(request: &ResolveRequest) -> String {
        keys::resolved_with_ids(
            &request.title_id,
            request.episode_number,
            request.valid_streaming_episode_id(),
            request.valid_catalog_episode_id(),
        )
    }

    /// Keep a request's resolved stream cached while the returned guard lives
    ///
    /// Held by a consumer that is still playing the stream, so an idle gap
    /// longer than the keep-alive window does not force a fresh resolution.
    pub fn attach(&self, request: &ResolveRequest) -> Subscription {
        self.cache.subscribe(&Self::resolved_key(request))
    }

    /// Like `resolve_episode`, but returns `Cancelled` as soon as `token` fires
    ///
    /// Remote calls already started keep running and still fill the cache.
    pub async fn resolve_episode_cancellable(
        &self,
        request: ResolveRequest,
        token: &CancellationToken,
    ) -> Result<ResolvedStream, ResolveError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(title_id = %request.title_id, "resolution abandoned by caller");
                Err(ResolveError::Cancelled)
            }
            result = self.resolve_episode(request.clone()) => result,
        }
    }

    async fn run(&self, request: ResolveRequest) -> Result<ResolvedStream, ResolveError> {
        let mut run = RequestRun::new();
        let title_id = request.title_id.as_str();
        let episode = request.episode_number;

        let resolution = match request.valid_streaming_episode_id() {
            Some(id) => Resolution::supplied(id),
            None => {
                run.advance(PipelineState::ResolvingIdentity)?;
                self.resolver
                    .resolve(title_id, episode)
                    .await
                    .map_err(|e| run.fail(e))?
            }
        };
        run.advance(PipelineState::FetchingStream)?;

        let (watch, catalog_tracks) = tokio::join!(
            self.watch(&resolution.streaming_episode_id),
            self.catalog_subtitles(&request)
        );

        let watch = watch.map_err(|e| run.fail(Self::attribute_watch_error(e, &request, &resolution)))?;
        let catalog_tracks = catalog_tracks.unwrap_or_else(|e| {
            warn!(error = %e, "catalog subtitles unavailable, continuing without them");
            Vec::new()
        });
        run.advance(PipelineState::Merging)?;

        let stream = build_resolved_stream(title_id, episode, watch, catalog_tracks)
            .map_err(|e| run.fail(e))?;
        let stream = self.proxy.apply(stream);
        run.advance(PipelineState::Resolved)?;

        info!(
            streaming_episode_id = %resolution.streaming_episode_id,
            method = %resolution.method,
            sources = stream.sources.len(),
            tracks = stream.tracks.len(),
            states = ?run.history,
            "episode resolved"
        );
        Ok(stream)
    }

    /// A constructed ID the provider rejects means the episode has no stream
    fn attribute_watch_error(
        error: ResolveError,
        request: &ResolveRequest,
        resolution: &Resolution,
    ) -> ResolveError {
        match error {
            ResolveError::UpstreamClient { status } if resolution.is_fallback() => {
                debug!(status, id = %resolution.streaming_episode_id, "fallback ID rejected");
                ResolveError::NoPlayableSource {
                    title_id: request.title_id.clone(),
                    episode: request.episode_number,
                }
            }
            other => other,
        }
    }

    /// Catalog subtitle branch; errors are reported but never fatal to the caller
    async fn catalog_subtitles(
        &self,
        request: &ResolveRequest,
    ) -> Result<Vec<SubtitleTrack>, ResolveError> {
        let supplied = request.valid_catalog_episode_id().map(str::to_string);

        let episode_id = match supplied {
            Some(id) => id,
            None => match self
                .catalog_episode_id(&request.title_id, request.episode_number)
                .await
                .map_err(|e| ResolveError::SubtitleFetchFailure(e.to_string()))?
            {
                Some(id) => id,
                None => {
                    debug!("no catalog episode for this number, skipping catalog subtitles");
                    return Ok(Vec::new());
                }
            },
        };

        let client = Arc::clone(&self.catalog);
        let id = episode_id.clone();
        let options = self
            .cache
            .options(CacheKind::Subtitles)
            .tag(Tag::title(&request.title_id));
        self.cached(keys::subtitles(&episode_id), options, self.config.optional, move || {
            let client = Arc::clone(&client);
            let id = id.clone();
            async move { client.subtitles(&id).await }
        })
        .await
        .map_err(|e| ResolveError::SubtitleFetchFailure(e.to_string()))
    }

    async fn catalog_episode_id(
        &self,
        title_id: &str,
        episode: EpisodeNumber,
    ) -> Result<Option<String>, ResolveError> {
        let episodes = self.episodes(title_id).await?;
        Ok(episodes
            .into_iter()
            .find(|e| e.number == episode.get())
            .map(|e| e.catalog_episode_id))
    }

    // =========================================================================
    // Cached provider reads
    // =========================================================================

    /// Coalesce `fetch` under `key`, retrying it with `policy`
    async fn cached<T, F, Fut>(
        &self,
        key: String,
        options: EntryOptions,
        policy: RetryPolicy,
        fetch: F,
    ) -> Result<T, ResolveError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        self.cache
            .coalesce(&key, options, move || async move {
                policy.execute(fetch).await.map_err(ResolveError::from)
            })
            .await
    }

    /// Catalog episode list, sorted by number
    pub async fn episodes(&self, title_id: &str) -> Result<Vec<CatalogEpisode>, ResolveError> {
        let client = Arc::clone(&self.catalog);
        let id = title_id.to_string();
        let options = self
            .cache
            .options(CacheKind::Episodes)
            .tag(Tag::title(title_id));
        self.cached(keys::episodes(title_id), options, self.config.critical, move || {
            let client = Arc::clone(&client);
            let id = id.clone();
            async move { client.episodes(&id).await }
        })
        .await
    }

    pub async fn title_detail(&self, title_id: &str) -> Result<TitleDetail, ResolveError> {
        let client = Arc::clone(&self.catalog);
        let id = title_id.to_string();
        let options = self
            .cache
            .options(CacheKind::TitleDetail)
            .tag(Tag::title(title_id));
        self.cached(keys::title_detail(title_id), options, self.config.critical, move || {
            let client = Arc::clone(&client);
            let id = id.clone();
            async move { client.detail(&id).await }
        })
        .await
    }

    /// Catalog landing page sections
    pub async fn home(&self) -> Result<HomePage, ResolveError> {
        let client = Arc::clone(&self.catalog);
        let options = self.cache.options(CacheKind::Home);
        self.cached(keys::home(), options, self.config.critical, move || {
            let client = Arc::clone(&client);
            async move { client.home().await }
        })
        .await
    }

    pub async fn search(&self, keyword: &str, page: u32) -> Result<SearchPage, ResolveError> {
        let page = page.max(1);
        let client = Arc::clone(&self.catalog);
        let query = keyword.trim().to_string();
        let options = self.cache.options(CacheKind::Search);
        self.cached(keys::search(keyword, page), options, self.config.critical, move || {
            let client = Arc::clone(&client);
            let query = query.clone();
            async move { client.search(&query, page).await }
        })
        .await
    }

    /// Streaming provider's episode index for a title
    pub async fn streaming_index(
        &self,
        title_id: &str,
    ) -> Result<StreamingEpisodeIndex, ResolveError> {
        self.resolver.index(title_id).await
    }

    /// Raw watch payload for a streaming episode ID
    pub async fn watch(&self, streaming_episode_id: &str) -> Result<WatchData, ResolveError> {
        let client = Arc::clone(&self.streaming);
        let id = streaming_episode_id.to_string();
        let options = self
            .cache
            .options(CacheKind::Stream)
            .tag(Tag::streaming_episode(streaming_episode_id));
        self.cached(keys::stream(streaming_episode_id), options, self.config.streaming, move || {
            let client = Arc::clone(&client);
            let id = id.clone();
            async move { client.watch(&id).await }
        })
        .await
    }

    /// Drop every cached response for a title
    pub fn invalidate_title(&self, title_id: &str) -> usize {
        self.cache.invalidate_by_tag(&Tag::title(title_id))
    }
}
