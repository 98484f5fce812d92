//! AniStream - anime episode resolution and streaming source pipeline
//!
//! Turns a catalog title and a human episode number into a playable stream:
//! ranked video sources, merged subtitle tracks and intro/outro markers.
//!
//! # Modules
//!
//! - `models` - Domain data shared by every layer
//! - `error` - Provider and pipeline error taxonomy
//! - `retry` - Named retry policies and the backoff executor
//! - `cache` - TTL cache with tags and request coalescing
//! - `api` - Catalog, streaming and image clients
//! - `stream` - Identity resolver, source selection, proxy rewriting, pipeline
//! - `config` - Config file and environment overrides
//! - `cli` / `commands` - Scriptable command line

pub mod api;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod stream;

// Re-export commonly used types
pub use models::{
    CatalogEpisode, EpisodeNumber, HomePage, Quality, ResolveRequest, ResolvedStream, SearchPage,
    StreamingEpisode, StreamingEpisodeIndex, StreamingSource, SubtitleTrack, TitleDetail,
    TrackOrigin, WatchData,
};

pub use api::{CatalogClient, ImageClient, StreamingClient};
pub use cache::{CacheConfig, CacheHandle, CacheKind};
pub use config::Config;
pub use error::{ErrorKind, ProviderError, ResolveError};
pub use retry::RetryPolicy;
pub use stream::{Pipeline, PipelineConfig, PipelineState};
