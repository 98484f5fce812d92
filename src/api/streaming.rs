//! Streaming provider client
//!
//! Fetches the per-title episode index (the only place the provider's opaque
//! episode IDs can be discovered) and per-episode watch payloads with video
//! sources, subtitle tracks and intro/outro markers.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{
    entries, fetch_raw, flag, http_client, non_blank, number, parse_one, probe, text, NumberLike,
    ProbePaths, RawResponse, DEFAULT_TIMEOUT,
};
use crate::error::ProviderError;
use crate::models::{
    Quality, SkipRange, StreamingEpisode, StreamingEpisodeIndex, StreamingSource, SubtitleTrack,
    TrackOrigin, WatchData,
};

pub const DEFAULT_STREAMING_URL: &str = "https://yumaapi.vercel.app";

const INDEX_PATHS: ProbePaths = &[
    &["episodes"],
    &["data", "episodes"],
    &["results", "episodes"],
    &["info", "episodes"],
];

const SOURCE_PATHS: ProbePaths = &[
    &["sources"],
    &["data", "sources"],
    &["results", "sources"],
    &["streamingLink", "sources"],
];

const TRACK_PATHS: ProbePaths = &[
    &["subtitles"],
    &["tracks"],
    &["data", "subtitles"],
    &["data", "tracks"],
    &["results", "subtitles"],
];

const INTRO_PATHS: ProbePaths = &[&["intro"], &["data", "intro"], &["results", "intro"]];
const OUTRO_PATHS: ProbePaths = &[&["outro"], &["data", "outro"], &["results", "outro"]];

/// Streaming API client
pub struct StreamingClient {
    base_url: String,
    client: reqwest::Client,
}

impl StreamingClient {
    /// Create a new streaming client with default settings
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_STREAMING_URL)
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /info/{titleId}`
    pub async fn fetch_index(&self, title_id: &str) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/info/{}", self.base_url, urlencoding::encode(title_id));
        fetch_raw(&self.client, &url).await
    }

    /// `GET /watch?episodeId=..&type=sub`
    pub async fn fetch_watch(
        &self,
        streaming_episode_id: &str,
    ) -> Result<RawResponse, ProviderError> {
        let url = format!(
            "{}/watch?episodeId={}&type=sub",
            self.base_url,
            urlencoding::encode(streaming_episode_id)
        );
        fetch_raw(&self.client, &url).await
    }

    pub async fn index(&self, title_id: &str) -> Result<StreamingEpisodeIndex, ProviderError> {
        Ok(normalize_index(title_id, &self.fetch_index(title_id).await?))
    }

    pub async fn watch(&self, streaming_episode_id: &str) -> Result<WatchData, ProviderError> {
        Ok(normalize_watch(&self.fetch_watch(streaming_episode_id).await?))
    }
}

impl Default for StreamingClient {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Record Fields
// =============================================================================

const ENTRY_ID: ProbePaths = &[&["id"], &["episodeId"]];
const ENTRY_NUMBER: ProbePaths = &[&["number"], &["episode"], &["ep"]];

const SOURCE_URL: ProbePaths = &[&["url"], &["file"]];
const SOURCE_QUALITY: ProbePaths = &[&["quality"], &["label"]];
const SOURCE_ADAPTIVE: ProbePaths = &[&["isM3U8"], &["isM3u8"], &["isAdaptive"]];
const SOURCE_TYPE: ProbePaths = &[&["type"]];

const TRACK_LABEL: ProbePaths = &[&["label"], &["lang"]];
const TRACK_SRC: ProbePaths = &[&["src"], &["file"], &["url"]];
const TRACK_DEFAULT: ProbePaths = &[&["default"], &["isDefault"]];
const TRACK_KIND: ProbePaths = &[&["kind"]];

fn index_entry(entry: &Value) -> Option<StreamingEpisode> {
    let number = number(entry, ENTRY_NUMBER)?.episode_number()?;
    Some(StreamingEpisode {
        streaming_episode_id: non_blank(entry, ENTRY_ID)?,
        number: number.get(),
    })
}

fn source(entry: &Value) -> Option<StreamingSource> {
    let url = non_blank(entry, SOURCE_URL)?;
    let is_adaptive_playlist = flag(entry, SOURCE_ADAPTIVE).unwrap_or_else(|| {
        text(entry, SOURCE_TYPE).is_some_and(|k| k.eq_ignore_ascii_case("hls"))
            || looks_like_playlist(&url)
    });
    Some(StreamingSource {
        quality: text(entry, SOURCE_QUALITY)
            .as_deref()
            .map(Quality::from_str_loose)
            .unwrap_or_default(),
        url,
        is_adaptive_playlist,
    })
}

/// Subtitle track; thumbnail sprites and source-less entries are dropped
pub(crate) fn track(entry: &Value, origin: TrackOrigin) -> Option<SubtitleTrack> {
    let is_thumbnails =
        text(entry, TRACK_KIND).is_some_and(|k| k.eq_ignore_ascii_case("thumbnails"));
    if is_thumbnails {
        return None;
    }
    Some(SubtitleTrack {
        src: non_blank(entry, TRACK_SRC)?,
        label: non_blank(entry, TRACK_LABEL).unwrap_or_else(|| "Unknown".to_string()),
        is_default: flag(entry, TRACK_DEFAULT).unwrap_or(false),
        origin,
    })
}

#[derive(Debug, Deserialize)]
struct SkipRaw {
    start: NumberLike,
    end: NumberLike,
}

impl SkipRaw {
    fn into_range(self) -> Option<SkipRange> {
        let start = self.start.as_u32()?;
        let end = self.end.as_u32()?;
        (end > start).then_some(SkipRange { start, end })
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Episode index in provider order; entries without a usable number are dropped
pub fn normalize_index(title_id: &str, raw: &RawResponse) -> StreamingEpisodeIndex {
    let episodes = match raw {
        RawResponse::Json(root) => entries(probe(root, INDEX_PATHS))
            .iter()
            .filter_map(index_entry)
            .collect(),
        RawResponse::Empty => Vec::new(),
    };
    StreamingEpisodeIndex {
        title_id: title_id.to_string(),
        episodes,
    }
}

pub fn normalize_watch(raw: &RawResponse) -> WatchData {
    let RawResponse::Json(root) = raw else {
        return WatchData::default();
    };

    WatchData {
        sources: entries(probe(root, SOURCE_PATHS))
            .iter()
            .filter_map(source)
            .collect(),
        tracks: entries(probe(root, TRACK_PATHS))
            .iter()
            .filter_map(|t| track(t, TrackOrigin::Streaming))
            .collect(),
        intro: parse_one::<SkipRaw>(probe(root, INTRO_PATHS)).and_then(SkipRaw::into_range),
        outro: parse_one::<SkipRaw>(probe(root, OUTRO_PATHS)).and_then(SkipRaw::into_range),
    }
}

/// Whether the URL path points at an HLS manifest
fn looks_like_playlist(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| u.path().to_lowercase().ends_with(".m3u8"))
        .unwrap_or_else(|_| url.to_lowercase().contains(".m3u8"))
}
