//! Catalog provider client
//!
//! Titles, episode numbering, detail metadata and the catalog-side subtitle
//! feed. Normalization never fails: missing envelopes and fields become empty
//! collections and zero values.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use super::streaming::track;
use super::{
    entries, fetch_raw, flag, http_client, non_blank, number, probe, text, text_list,
    ProbePaths, RawResponse, DEFAULT_TIMEOUT,
};
use crate::error::ProviderError;
use crate::models::{
    CatalogEpisode, HomePage, SearchPage, SubtitleTrack, TitleDetail, TitleSummary, TopTen,
    TrackOrigin,
};

pub const DEFAULT_CATALOG_URL: &str = "https://hianime-api-jzl7.onrender.com/api/v1";

const EPISODE_PATHS: ProbePaths = &[
    &["episodes"],
    &["data", "episodes"],
    &["results", "episodes"],
    &["data"],
];

const DETAIL_PATHS: ProbePaths = &[&["anime"], &["data", "anime"], &["data"], &[]];

const HOME_ROOT_PATHS: ProbePaths = &[&["data"], &["results"], &[]];

const SEARCH_ROOT_PATHS: ProbePaths = &[&["data"], &["results"], &[]];
const SEARCH_LIST_PATHS: ProbePaths = &[&["animes"], &["results"], &["titles"]];

const SUBTITLE_PATHS: ProbePaths = &[
    &["subtitles"],
    &["tracks"],
    &["captions"],
    &["data", "subtitles"],
    &["data", "tracks"],
    &["results", "subtitles"],
];

/// Catalog API client
pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
}

impl CatalogClient {
    /// Create a new catalog client with default settings
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_CATALOG_URL)
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

    // -------------------------------------------------------------------------
    // Raw fetches
    // -------------------------------------------------------------------------

    /// `GET /episodes/{titleId}`
    pub async fn fetch_episodes(&self, title_id: &str) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/episodes/{}", self.base_url, urlencoding::encode(title_id));
        fetch_raw(&self.client, &url).await
    }

    /// `GET /anime/{titleId}`
    pub async fn fetch_detail(&self, title_id: &str) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/anime/{}", self.base_url, urlencoding::encode(title_id));
        fetch_raw(&self.client, &url).await
    }

    /// `GET /home`
    pub async fn fetch_home(&self) -> Result<RawResponse, ProviderError> {
        let url = format!("{}/home", self.base_url);
        fetch_raw(&self.client, &url).await
    }

    /// `GET /search?keyword=..&page=..`
    pub async fn fetch_search(
        &self,
        keyword: &str,
        page: u32,
    ) -> Result<RawResponse, ProviderError> {
        let url = format!(
            "{}/search?keyword={}&page={}",
            self.base_url,
            urlencoding::encode(keyword),
            page
        );
        fetch_raw(&self.client, &url).await
    }

    /// `GET /subtitles?episodeId=..`
    pub async fn fetch_subtitles(
        &self,
        catalog_episode_id: &str,
    ) -> Result<RawResponse, ProviderError> {
        let url = format!(
            "{}/subtitles?episodeId={}",
            self.base_url,
            urlencoding::encode(catalog_episode_id)
        );
        fetch_raw(&self.client, &url).await
    }

    // -------------------------------------------------------------------------
    // Fetch + normalize
    // -------------------------------------------------------------------------

    /// Episode list, ordered by number ascending
    pub async fn episodes(&self, title_id: &str) -> Result<Vec<CatalogEpisode>, ProviderError> {
        Ok(normalize_episodes(&self.fetch_episodes(title_id).await?))
    }

    pub async fn detail(&self, title_id: &str) -> Result<TitleDetail, ProviderError> {
        Ok(normalize_detail(&self.fetch_detail(title_id).await?))
    }

    /// Landing page sections (spotlight, trending, top 10, ...)
    pub async fn home(&self) -> Result<HomePage, ProviderError> {
        Ok(normalize_home(&self.fetch_home().await?))
    }

    pub async fn search(&self, keyword: &str, page: u32) -> Result<SearchPage, ProviderError> {
        Ok(normalize_search(&self.fetch_search(keyword, page).await?, page))
    }

    pub async fn subtitles(
        &self,
        catalog_episode_id: &str,
    ) -> Result<Vec<SubtitleTrack>, ProviderError> {
        Ok(normalize_subtitles(
            &self.fetch_subtitles(catalog_episode_id).await?,
        ))
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Record Fields
// =============================================================================

const ID: ProbePaths = &[&["id"]];
const NAME: ProbePaths = &[&["name"], &["title"]];
const POSTER: ProbePaths = &[&["poster"], &["image"]];
const DESCRIPTION: ProbePaths = &[&["description"]];
const GENRES: ProbePaths = &[&["genres"]];
const RATING: ProbePaths = &[&["rating"]];
const RELEASE_DATE: ProbePaths = &[&["releaseDate"], &["aired"]];
const STATUS: ProbePaths = &[&["status"]];
const TOTAL_EPISODES: ProbePaths = &[&["totalEpisodes"], &["episodes"]];
const KIND: ProbePaths = &[&["type"]];

const EPISODE_ID: ProbePaths = &[&["id"], &["episodeId"]];
const EPISODE_NUMBER: ProbePaths = &[&["number"], &["episodeNo"], &["episode"]];
const EPISODE_TITLE: ProbePaths = &[&["title"], &["name"]];
const EPISODE_FILLER: ProbePaths = &[&["isFiller"]];

fn episode(entry: &Value) -> Option<CatalogEpisode> {
    let number = number(entry, EPISODE_NUMBER)?.episode_number()?;
    Some(CatalogEpisode {
        catalog_episode_id: non_blank(entry, EPISODE_ID)?,
        number: number.get(),
        title: text(entry, EPISODE_TITLE).unwrap_or_default(),
        is_filler: flag(entry, EPISODE_FILLER).unwrap_or(false),
    })
}

fn total_episodes(node: &Value) -> u32 {
    number(node, TOTAL_EPISODES)
        .and_then(|n| n.as_u32())
        .unwrap_or(0)
}

fn kind(node: &Value) -> String {
    non_blank(node, KIND).unwrap_or_else(|| "TV".to_string())
}

/// Title listed in search results and home sections; needs an ID
fn summary(entry: &Value) -> Option<TitleSummary> {
    let id = non_blank(entry, ID)?;
    Some(TitleSummary {
        title: non_blank(entry, NAME).unwrap_or_else(|| id.clone()),
        poster: text(entry, POSTER).unwrap_or_default(),
        kind: kind(entry),
        episodes: total_episodes(entry),
        id,
    })
}

fn summaries(node: &Value, paths: ProbePaths) -> Vec<TitleSummary> {
    entries(probe(node, paths))
        .iter()
        .filter_map(summary)
        .collect()
}

// =============================================================================
// Normalization
// =============================================================================

/// Episode list, ordered by number; entries without a usable number are dropped
pub fn normalize_episodes(raw: &RawResponse) -> Vec<CatalogEpisode> {
    let RawResponse::Json(root) = raw else {
        return Vec::new();
    };
    let mut episodes: Vec<CatalogEpisode> = entries(probe(root, EPISODE_PATHS))
        .iter()
        .filter_map(episode)
        .collect();
    episodes.sort_by_key(|e| e.number);
    episodes
}

/// Title detail; each field defaults on its own when missing or malformed
pub fn normalize_detail(raw: &RawResponse) -> TitleDetail {
    let RawResponse::Json(root) = raw else {
        return TitleDetail::default();
    };
    let Some(detail) = probe(root, DETAIL_PATHS).filter(|d| d.is_object()) else {
        return TitleDetail::default();
    };

    TitleDetail {
        id: text(detail, ID).unwrap_or_default(),
        title: text(detail, NAME).unwrap_or_default(),
        poster: text(detail, POSTER).unwrap_or_default(),
        description: text(detail, DESCRIPTION).unwrap_or_default(),
        genres: text_list(detail, GENRES),
        rating: number(detail, RATING)
            .and_then(|r| r.as_f64())
            .filter(|r| r.is_finite())
            .unwrap_or(0.0) as f32,
        year: text(detail, RELEASE_DATE)
            .as_deref()
            .and_then(extract_year)
            .unwrap_or(0),
        status: non_blank(detail, STATUS).unwrap_or_else(|| "Unknown".to_string()),
        episodes: total_episodes(detail),
        kind: kind(detail),
    }
}

pub fn normalize_search(raw: &RawResponse, requested_page: u32) -> SearchPage {
    let RawResponse::Json(root) = raw else {
        return SearchPage {
            current_page: requested_page,
            ..SearchPage::default()
        };
    };
    let body = probe(root, SEARCH_ROOT_PATHS).unwrap_or(root);
    let titles = summaries(body, SEARCH_LIST_PATHS);

    let number_at = |paths: ProbePaths| number(body, paths).and_then(|n| n.as_u32());
    let current_page = number_at(&[&["currentPage"], &["page"]]).unwrap_or(requested_page);
    let total_pages = number_at(&[&["totalPages"], &["lastPage"]]).unwrap_or(current_page);
    let has_next_page =
        flag(body, &[&["hasNextPage"]]).unwrap_or(current_page < total_pages);

    SearchPage {
        titles,
        total_pages,
        current_page,
        has_next_page,
    }
}

/// Home sections; a missing section is empty
pub fn normalize_home(raw: &RawResponse) -> HomePage {
    let RawResponse::Json(root) = raw else {
        return HomePage::default();
    };
    let body = probe(root, HOME_ROOT_PATHS).unwrap_or(root);

    HomePage {
        spotlight: summaries(body, &[&["spotlight"], &["spotlightAnimes"]]),
        trending: summaries(body, &[&["trending"], &["trendingAnimes"]]),
        top_airing: summaries(body, &[&["topAiring"], &["topAiringAnimes"]]),
        most_popular: summaries(body, &[&["mostPopular"], &["mostPopularAnimes"]]),
        most_favorite: summaries(body, &[&["mostFavorite"], &["mostFavoriteAnimes"]]),
        latest_episodes: summaries(body, &[&["latestEpisodes"], &["latestEpisodeAnimes"]]),
        top10: TopTen {
            today: summaries(body, &[&["top10", "today"], &["top10Animes", "today"]]),
            week: summaries(body, &[&["top10", "week"], &["top10Animes", "week"]]),
            month: summaries(body, &[&["top10", "month"], &["top10Animes", "month"]]),
        },
        genres: text_list(body, &[&["genres"]]),
    }
}

/// Catalog subtitle tracks; thumbnail sprites and source-less entries are dropped
pub fn normalize_subtitles(raw: &RawResponse) -> Vec<SubtitleTrack> {
    let RawResponse::Json(root) = raw else {
        return Vec::new();
    };
    entries(probe(root, SUBTITLE_PATHS))
        .iter()
        .filter_map(|t| track(t, TrackOrigin::Catalog))
        .collect()
}

/// Extract a four-digit year from dates like "2023-09-29" or "Sep 29, 2023"
fn extract_year(date: &str) -> Option<u16> {
    static YEAR: OnceLock<Option<Regex>> = OnceLock::new();
    let re = YEAR.get_or_init(|| Regex::new(r"(\d{4})").ok()).as_ref()?;
    re.captures(date)?.get(1)?.as_str().parse().ok()
}
