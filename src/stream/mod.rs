//! Episode-to-stream pipeline
//!
//! - Resolver: (title, episode number) to the streaming provider's episode ID
//! - Selection: best-source ordering and subtitle track merging
//! - Proxy: CORS proxy rewriting for media URLs
//! - Pipeline: the orchestrator tying clients, cache and retries together

pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod selection;

pub use pipeline::{Pipeline, PipelineConfig, PipelineState};
pub use proxy::{Provider, ProxyRewriter};
pub use resolver::{EpisodeResolver, Resolution, ResolutionMethod};
pub use selection::{build_resolved_stream, merge_tracks, select_best_source, sort_sources};
