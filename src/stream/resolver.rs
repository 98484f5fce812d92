//! Episode identity resolution
//!
//! Maps (title, human episode number) to the streaming provider's opaque
//! episode ID. The index lookup is exact; when the number is missing from the
//! index an ID is constructed from the shape of the first entry's ID. Only a
//! failed index fetch is an error, a wrong guess surfaces later as "no sources".

use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::api::StreamingClient;
use crate::cache::{keys, CacheHandle, CacheKind, Tag};
use crate::error::ResolveError;
use crate::models::{EpisodeNumber, StreamingEpisode, StreamingEpisodeIndex};
use crate::retry::RetryPolicy;

/// How a streaming episode ID was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    /// Passed in by the caller
    Supplied,
    /// Found in the provider's index
    Exact,
    /// Rebuilt from the first index entry's prefix
    PatternFallback,
    /// `{title}-episode-{n}`
    LastResort,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMethod::Supplied => write!(f, "supplied"),
            ResolutionMethod::Exact => write!(f, "exact"),
            ResolutionMethod::PatternFallback => write!(f, "pattern-fallback"),
            ResolutionMethod::LastResort => write!(f, "last-resort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub streaming_episode_id: String,
    pub method: ResolutionMethod,
}

impl Resolution {
    pub fn supplied(id: impl Into<String>) -> Self {
        Self {
            streaming_episode_id: id.into(),
            method: ResolutionMethod::Supplied,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self.method,
            ResolutionMethod::PatternFallback | ResolutionMethod::LastResort
        )
    }
}

// =============================================================================
// Pure Resolution
// =============================================================================

/// Index entry whose number equals `number`
pub fn match_episode(
    index: &StreamingEpisodeIndex,
    number: EpisodeNumber,
) -> Option<&StreamingEpisode> {
    index.episodes.iter().find(|e| e.number == number.get())
}

/// Trailing `<delimiter><digits>` on an episode ID; the prefix is greedy so
/// the last delimiter wins
fn suffix_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(?P<prefix>.+)(?P<delim>\?ep=|\$episode\$|[-_/])(?P<num>\d+)$").ok()
        })
        .as_ref()
}

/// Build a candidate ID for `number` from the first index entry
///
/// Never fails: when the first ID has no recognizable numeric suffix (or the
/// index is empty) the result is `{title_id}-episode-{number}`.
pub fn construct_fallback_id(
    title_id: &str,
    index: &StreamingEpisodeIndex,
    number: EpisodeNumber,
) -> Resolution {
    pattern_fallback(index, number).unwrap_or_else(|| Resolution {
        streaming_episode_id: format!("{}-episode-{}", title_id, number),
        method: ResolutionMethod::LastResort,
    })
}

fn pattern_fallback(index: &StreamingEpisodeIndex, number: EpisodeNumber) -> Option<Resolution> {
    let first = index.first()?;
    let caps = suffix_pattern()?.captures(&first.streaming_episode_id)?;
    let suffix: i64 = caps["num"].parse().ok()?;

    // Suffix either is the episode number itself or a provider-wide counter
    let candidate = if suffix == i64::from(first.number) {
        i64::from(number.get())
    } else {
        suffix + i64::from(number.get()) - i64::from(first.number)
    };
    if candidate <= 0 {
        return None;
    }

    Some(Resolution {
        streaming_episode_id: format!("{}{}{}", &caps["prefix"], &caps["delim"], candidate),
        method: ResolutionMethod::PatternFallback,
    })
}

/// Exact match, else fallback construction
pub fn resolve_in_index(
    title_id: &str,
    index: &StreamingEpisodeIndex,
    number: EpisodeNumber,
) -> Resolution {
    match match_episode(index, number) {
        Some(episode) => Resolution {
            streaming_episode_id: episode.streaming_episode_id.clone(),
            method: ResolutionMethod::Exact,
        },
        None => construct_fallback_id(title_id, index, number),
    }
}

// =============================================================================
// Resolver Service
// =============================================================================

/// Resolves episode identities against the cached streaming index
#[derive(Clone)]
pub struct EpisodeResolver {
    streaming: Arc<StreamingClient>,
    cache: CacheHandle,
    policy: RetryPolicy,
}

impl EpisodeResolver {
    pub fn new(streaming: Arc<StreamingClient>, cache: CacheHandle, policy: RetryPolicy) -> Self {
        Self {
            streaming,
            cache,
            policy,
        }
    }

    /// Streaming index for a title, cache-coalesced and retried
    pub async fn index(&self, title_id: &str) -> Result<StreamingEpisodeIndex, ResolveError> {
        let client = Arc::clone(&self.streaming);
        let policy = self.policy;
        let title = title_id.to_string();
        let options = self
            .cache
            .options(CacheKind::StreamingIndex)
            .tag(Tag::title(title_id));

        self.cache
            .coalesce(&keys::streaming_index(title_id), options, move || async move {
                let index = policy.execute(|| client.index(&title)).await?;
                debug!(title_id = %title, episodes = index.episodes.len(), "streaming index loaded");
                Ok::<_, ResolveError>(index)
            })
            .await
    }

    pub async fn resolve(
        &self,
        title_id: &str,
        number: EpisodeNumber,
    ) -> Result<Resolution, ResolveError> {
        let index = self
            .index(title_id)
            .await
            .map_err(|source| ResolveError::IdentityResolutionExhausted {
                title_id: title_id.to_string(),
                source: Box::new(source),
            })?;

        let resolution = resolve_in_index(title_id, &index, number);
        info!(
            title_id,
            episode = %number,
            streaming_episode_id = %resolution.streaming_episode_id,
            method = %resolution.method,
            "episode identity resolved"
        );
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(n: u32) -> EpisodeNumber {
        EpisodeNumber::new(n).unwrap()
    }

    fn index(entries: &[(&str, u32)]) -> StreamingEpisodeIndex {
        StreamingEpisodeIndex {
            title_id: "abc".into(),
            episodes: entries
                .iter()
                .map(|(id, n)| StreamingEpisode {
                    streaming_episode_id: id.to_string(),
                    number: *n,
                })
                .collect(),
        }
    }

    #[test]
    fn test_exact_match() {
        let idx = index(&[("strm-abc-1", 1), ("strm-abc-2", 2)]);
        let r = resolve_in_index("abc", &idx, ep(2));
        assert_eq!(r.streaming_episode_id, "strm-abc-2");
        assert_eq!(r.method, ResolutionMethod::Exact);
    }

    #[test]
    fn test_fallback_replaces_episode_suffix() {
        let idx = index(&[("strm-abc-1", 1), ("strm-abc-2", 2)]);
        let r = construct_fallback_id("abc", &idx, ep(7));
        assert_eq!(r.streaming_episode_id, "strm-abc-7");
        assert_eq!(r.method, ResolutionMethod::PatternFallback);
    }

    #[test]
    fn test_fallback_shifts_counter_suffix() {
        let idx = index(&[("one-piece-100?ep=2142", 1)]);
        let r = construct_fallback_id("one-piece-100", &idx, ep(3));
        assert_eq!(r.streaming_episode_id, "one-piece-100?ep=2144");
    }

    #[test]
    fn test_fallback_episode_marker() {
        let idx = index(&[("frieren$episode$5", 1)]);
        let r = construct_fallback_id("frieren", &idx, ep(2));
        assert_eq!(r.streaming_episode_id, "frieren$episode$6");
    }

    #[test]
    fn test_last_resort() {
        let r = construct_fallback_id("abc", &index(&[]), ep(4));
        assert_eq!(r.streaming_episode_id, "abc-episode-4");
        assert_eq!(r.method, ResolutionMethod::LastResort);

        let opaque = index(&[("xK9fQ", 1)]);
        let r = construct_fallback_id("abc", &opaque, ep(4));
        assert_eq!(r.streaming_episode_id, "abc-episode-4");
    }

    #[test]
    fn test_fallback_never_goes_non_positive() {
        // Counter would shift below 1
        let idx = index(&[("abc-3", 10)]);
        let r = construct_fallback_id("abc", &idx, ep(1));
        assert_eq!(r.method, ResolutionMethod::LastResort);
    }

    #[test]
    fn test_fallback_is_total() {
        let shapes = [
            index(&[]),
            index(&[("", 1)]),
            index(&[("-", 1)]),
            index(&[("99999999999999999999999", 1)]),
            index(&[("a_1", 1)]),
            index(&[("a/b/1", 1)]),
        ];
        for idx in &shapes {
            for n in [1, 2, 50, 1000] {
                let r = construct_fallback_id("t", idx, ep(n));
                assert!(!r.streaming_episode_id.is_empty());
            }
        }
    }
}
