//! Data structures and types for AniStream
//!
//! Contains all shared models used across the pipeline organized by domain:
//! - **Catalog**: titles, episode lists and search pages from the catalog provider
//! - **Streaming**: per-title episode index and watch payloads from the streaming provider
//! - **Playback**: the normalized `ResolvedStream` handed to the player

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Request Models
// =============================================================================

/// Positive episode number, as shown to humans
///
/// Providers and callers send this as a JSON number, a numeric string, or
/// occasionally a float (`"2.0"`). Everything is coerced to an integer before
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeNumber(u32);

impl EpisodeNumber {
    /// Create from a raw integer; zero is not a valid episode number
    pub fn new(n: u32) -> Option<Self> {
        (n > 0).then_some(Self(n))
    }

    /// Parse loosely from a string (" 2 ", "02", "2.0")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Self::new(n);
        }
        let f: f64 = s.parse().ok()?;
        Self::from_f64(f)
    }

    /// Coerce a float; only finite whole numbers are accepted
    pub fn from_f64(f: f64) -> Option<Self> {
        if f.is_finite() && f.fract() == 0.0 && f >= 1.0 && f <= u32::MAX as f64 {
            Self::new(f as u32)
        } else {
            None
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller's request to play one episode of one title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub title_id: String,
    pub episode_number: EpisodeNumber,
    /// Streaming-provider episode ID, when the caller already knows it
    pub known_streaming_episode_id: Option<String>,
    /// Catalog-provider episode ID, used for the catalog subtitle feed
    pub catalog_episode_id: Option<String>,
}

impl ResolveRequest {
    pub fn new(title_id: impl Into<String>, episode_number: EpisodeNumber) -> Self {
        Self {
            title_id: title_id.into(),
            episode_number,
            known_streaming_episode_id: None,
            catalog_episode_id: None,
        }
    }

    pub fn with_streaming_episode_id(mut self, id: impl Into<String>) -> Self {
        self.known_streaming_episode_id = Some(id.into());
        self
    }

    pub fn with_catalog_episode_id(mut self, id: impl Into<String>) -> Self {
        self.catalog_episode_id = Some(id.into());
        self
    }

    /// The caller-supplied streaming ID, if it is usable as-is
    pub fn valid_streaming_episode_id(&self) -> Option<&str> {
        self.known_streaming_episode_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// The caller-supplied catalog episode ID, if non-blank
    pub fn valid_catalog_episode_id(&self) -> Option<&str> {
        self.catalog_episode_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

// =============================================================================
// Catalog Models
// =============================================================================

/// Episode as listed by the catalog provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEpisode {
    pub catalog_episode_id: String,
    pub number: u32,
    pub title: String,
    pub is_filler: bool,
}

impl fmt::Display for CatalogEpisode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filler = if self.is_filler { " [filler]" } else { "" };
        write!(f, "E{:02} - {}{}", self.number, self.title, filler)
    }
}

/// Detailed title information from the catalog provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleDetail {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub description: String,
    pub genres: Vec<String>,
    pub rating: f32,
    pub year: u16,
    pub status: String,
    pub episodes: u32,
    pub kind: String,
}

impl fmt::Display for TitleDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {} - {} episodes - ⭐ {:.1}",
            self.title, self.year, self.kind, self.episodes, self.rating
        )
    }
}

/// One title in a search page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleSummary {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub kind: String,
    pub episodes: u32,
}

/// One page of catalog search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub titles: Vec<TitleSummary>,
    pub total_pages: u32,
    pub current_page: u32,
    pub has_next_page: bool,
}

/// Daily, weekly and monthly top-10 rankings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopTen {
    pub today: Vec<TitleSummary>,
    pub week: Vec<TitleSummary>,
    pub month: Vec<TitleSummary>,
}

/// Catalog landing page sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomePage {
    pub spotlight: Vec<TitleSummary>,
    pub trending: Vec<TitleSummary>,
    pub top_airing: Vec<TitleSummary>,
    pub most_popular: Vec<TitleSummary>,
    pub most_favorite: Vec<TitleSummary>,
    pub latest_episodes: Vec<TitleSummary>,
    pub top10: TopTen,
    pub genres: Vec<String>,
}

impl HomePage {
    /// Named sections in display order
    pub fn sections(&self) -> [(&'static str, &[TitleSummary]); 9] {
        [
            ("Spotlight", self.spotlight.as_slice()),
            ("Trending", self.trending.as_slice()),
            ("Top Airing", self.top_airing.as_slice()),
            ("Most Popular", self.most_popular.as_slice()),
            ("Most Favorite", self.most_favorite.as_slice()),
            ("Latest Episodes", self.latest_episodes.as_slice()),
            ("Top 10 Today", self.top10.today.as_slice()),
            ("Top 10 This Week", self.top10.week.as_slice()),
            ("Top 10 This Month", self.top10.month.as_slice()),
        ]
    }
}

// =============================================================================
// Streaming Models
// =============================================================================

/// Entry of the streaming provider's per-title episode index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingEpisode {
    pub streaming_episode_id: String,
    pub number: u32,
}

/// Per-title mapping from episode numbers to streaming-provider IDs
///
/// Replaced wholesale on every successful fetch, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingEpisodeIndex {
    pub title_id: String,
    pub episodes: Vec<StreamingEpisode>,
}

impl StreamingEpisodeIndex {
    pub fn first(&self) -> Option<&StreamingEpisode> {
        self.episodes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

/// Video quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Quality {
    FHD1080p,
    HD720p,
    SD480p,
    LD360p,
    #[default]
    Unknown,
}

/// Fixed preference order; anything not listed sorts after all of these
pub const QUALITY_ORDER: [Quality; 4] = [
    Quality::FHD1080p,
    Quality::HD720p,
    Quality::SD480p,
    Quality::LD360p,
];

impl Quality {
    /// Parse quality from a provider label (e.g., "1080p", "720", "FHD")
    pub fn from_str_loose(s: &str) -> Self {
        let s_lower = s.trim().to_lowercase();
        if s_lower.contains("1080") || s_lower.contains("fhd") {
            Quality::FHD1080p
        } else if s_lower.contains("720") || s_lower == "hd" {
            Quality::HD720p
        } else if s_lower.contains("480") || s_lower == "sd" {
            Quality::SD480p
        } else if s_lower.contains("360") {
            Quality::LD360p
        } else {
            Quality::Unknown
        }
    }

    /// Position in `QUALITY_ORDER` (lower = better); `None` for unranked
    pub fn rank(&self) -> Option<usize> {
        QUALITY_ORDER.iter().position(|q| q == self)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::FHD1080p => write!(f, "1080p"),
            Quality::HD720p => write!(f, "720p"),
            Quality::SD480p => write!(f, "480p"),
            Quality::LD360p => write!(f, "360p"),
            Quality::Unknown => write!(f, "unknown"),
        }
    }
}

/// Playable video source from the streaming provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingSource {
    pub url: String,
    pub quality: Quality,
    pub is_adaptive_playlist: bool,
}

impl StreamingSource {
    /// MIME type the playback engine expects for this source
    pub fn mime_type(&self) -> &'static str {
        if self.is_adaptive_playlist {
            "application/x-mpegURL"
        } else {
            "video/mp4"
        }
    }
}

impl fmt::Display for StreamingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_adaptive_playlist { "HLS" } else { "MP4" };
        write!(f, "[{}] {} {}", self.quality, kind, self.url)
    }
}

/// Which provider a subtitle track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOrigin {
    Catalog,
    Streaming,
}

/// Subtitle track offered to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub label: String,
    pub src: String,
    pub is_default: bool,
    pub origin: TrackOrigin,
}

impl SubtitleTrack {
    /// Comparison key: trimmed, lowercased, inner whitespace collapsed
    pub fn normalized_label(&self) -> String {
        normalize_label(&self.label)
    }
}

/// Normalize a track label for duplicate detection
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Intro/outro range in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRange {
    pub start: u32,
    pub end: u32,
}

/// Everything the streaming provider returns for one episode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchData {
    pub sources: Vec<StreamingSource>,
    pub tracks: Vec<SubtitleTrack>,
    pub intro: Option<SkipRange>,
    pub outro: Option<SkipRange>,
}

// =============================================================================
// Playback Models
// =============================================================================

/// The pipeline's output: one playable episode
///
/// `sources` is never empty and is ordered best-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub sources: Vec<StreamingSource>,
    pub tracks: Vec<SubtitleTrack>,
    pub default_track_label: Option<String>,
    pub intro: Option<SkipRange>,
    pub outro: Option<SkipRange>,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedStream {
    /// The selected source (first in best-first order)
    pub fn best_source(&self) -> Option<&StreamingSource> {
        self.sources.first()
    }
}

impl fmt::Display for ResolvedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.best_source() {
            Some(best) => write!(
                f,
                "{} ({} sources, {} subtitle tracks)",
                best,
                self.sources.len(),
                self.tracks.len()
            ),
            None => write!(f, "no sources"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_number_parse() {
        assert_eq!(EpisodeNumber::parse("2").map(|n| n.get()), Some(2));
        assert_eq!(EpisodeNumber::parse(" 02 ").map(|n| n.get()), Some(2));
        assert_eq!(EpisodeNumber::parse("2.0").map(|n| n.get()), Some(2));
        assert_eq!(EpisodeNumber::parse("2.5"), None);
        assert_eq!(EpisodeNumber::parse("0"), None);
        assert_eq!(EpisodeNumber::parse("-1"), None);
        assert_eq!(EpisodeNumber::parse("abc"), None);
    }

    #[test]
    fn test_quality_from_str_loose() {
        assert_eq!(Quality::from_str_loose("1080p"), Quality::FHD1080p);
        assert_eq!(Quality::from_str_loose("FHD"), Quality::FHD1080p);
        assert_eq!(Quality::from_str_loose("720"), Quality::HD720p);
        assert_eq!(Quality::from_str_loose("480p"), Quality::SD480p);
        assert_eq!(Quality::from_str_loose("360p"), Quality::LD360p);
        assert_eq!(Quality::from_str_loose("auto"), Quality::Unknown);
        assert_eq!(Quality::from_str_loose("default"), Quality::Unknown);
    }

    #[test]
    fn test_quality_rank() {
        assert_eq!(Quality::FHD1080p.rank(), Some(0));
        assert_eq!(Quality::LD360p.rank(), Some(3));
        assert_eq!(Quality::Unknown.rank(), None);
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  English  "), "english");
        assert_eq!(normalize_label("Portuguese   (Brazil)"), "portuguese (brazil)");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_request_streaming_id_validation() {
        let n = EpisodeNumber::new(1).unwrap();
        let req = ResolveRequest::new("frieren", n).with_streaming_episode_id("   ");
        assert_eq!(req.valid_streaming_episode_id(), None);

        let req = ResolveRequest::new("frieren", n).with_streaming_episode_id(" strm-1 ");
        assert_eq!(req.valid_streaming_episode_id(), Some("strm-1"));
    }

    #[test]
    fn test_source_mime_type() {
        let hls = StreamingSource {
            url: "https://cdn.example/master.m3u8".into(),
            quality: Quality::Unknown,
            is_adaptive_playlist: true,
        };
        assert_eq!(hls.mime_type(), "application/x-mpegURL");
        let mp4 = StreamingSource {
            is_adaptive_playlist: false,
            ..hls
        };
        assert_eq!(mp4.mime_type(), "video/mp4");
    }

    #[test]
    fn test_catalog_episode_display() {
        let ep = CatalogEpisode {
            catalog_episode_id: "frieren-18542?ep=107257".into(),
            number: 3,
            title: "Killing Magic".into(),
            is_filler: false,
        };
        assert_eq!(ep.to_string(), "E03 - Killing Magic");
    }
}
