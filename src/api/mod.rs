//! API clients for external providers
//!
//! - Catalog: titles, episode numbering, detail metadata, catalog subtitle feed
//! - Streaming: per-title episode index and watch payloads (sources + subtitles)
//! - Images: optimized poster URLs with fallback to the original
//!
//! Providers wrap payloads under envelope keys that change between deployments.
//! Each client lists the field paths it accepts in a probe table; the first
//! path that resolves wins. Record fields are probed the same way, one field
//! at a time, and normalized into domain types by total functions.

pub mod catalog;
pub mod images;
pub mod streaming;

pub use catalog::CatalogClient;
pub use images::ImageClient;
pub use streaming::StreamingClient;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::models::EpisodeNumber;

/// Default per-request HTTP timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider response after transport checks, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Json(Value),
    /// 2xx with no body (or a JSON `null`); means "no data", not failure
    Empty,
}

impl RawResponse {
    pub fn is_empty(&self) -> bool {
        matches!(self, RawResponse::Empty)
    }
}

/// Field paths tried in order; the first one present and non-null wins
pub type ProbePaths = &'static [&'static [&'static str]];

/// Build a `reqwest::Client` with the given timeout
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// GET `url` and classify the outcome
pub(crate) async fn fetch_raw(
    client: &reqwest::Client,
    url: &str,
) -> Result<RawResponse, ProviderError> {
    debug!(url, "provider request");
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }

    let body = response.text().await?;
    parse_body(&body)
}

/// Classify a 2xx body as empty, JSON, or malformed
pub(crate) fn parse_body(body: &str) -> Result<RawResponse, ProviderError> {
    if body.trim().is_empty() {
        return Ok(RawResponse::Empty);
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("JSON parse error: {}", e)))?;
    if value.is_null() {
        return Ok(RawResponse::Empty);
    }
    Ok(RawResponse::Json(value))
}

/// Resolve the first matching path in `paths`
///
/// An empty path refers to the root itself.
pub(crate) fn probe<'a>(root: &'a Value, paths: ProbePaths) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        let found = path
            .iter()
            .try_fold(root, |node, key| node.as_object()?.get(*key))?;
        (!found.is_null()).then_some(found)
    })
}

/// Array elements at `value`; anything else is an empty list
pub(crate) fn entries(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Deserialize an object, or `None` if absent or invalid
pub(crate) fn parse_one<T: DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    value.and_then(|v| T::deserialize(v).ok())
}

// -----------------------------------------------------------------------------
// Field probes
//
// Fields are read one at a time so a single malformed or doubly-spelled field
// only defaults that field, never the whole record.
// -----------------------------------------------------------------------------

/// String field; numeric IDs are accepted as their decimal text
pub(crate) fn text(node: &Value, paths: ProbePaths) -> Option<String> {
    match probe(node, paths)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-blank string field, trimmed
pub(crate) fn non_blank(node: &Value, paths: ProbePaths) -> Option<String> {
    text(node, paths)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn number(node: &Value, paths: ProbePaths) -> Option<NumberLike> {
    parse_one(probe(node, paths))
}

pub(crate) fn flag(node: &Value, paths: ProbePaths) -> Option<bool> {
    probe(node, paths)?.as_bool()
}

/// String list; non-string elements are skipped
pub(crate) fn text_list(node: &Value, paths: ProbePaths) -> Vec<String> {
    entries(probe(node, paths))
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Numeric field that providers send as a number or a string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberLike {
    Unsigned(u64),
    Float(f64),
    Text(String),
}

impl NumberLike {
    pub(crate) fn episode_number(&self) -> Option<EpisodeNumber> {
        match self {
            NumberLike::Unsigned(n) => u32::try_from(*n).ok().and_then(EpisodeNumber::new),
            NumberLike::Float(f) => EpisodeNumber::from_f64(*f),
            NumberLike::Text(s) => EpisodeNumber::parse(s),
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            NumberLike::Unsigned(n) => Some(*n as f64),
            NumberLike::Float(f) => Some(*f),
            NumberLike::Text(s) => s.trim().parse().ok(),
        }
    }

    pub(crate) fn as_u32(&self) -> Option<u32> {
        self.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u32::MAX as f64)
            .map(|f| f as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PATHS: ProbePaths = &[&["episodes"], &["data", "episodes"], &["data"]];

    #[test]
    fn test_probe_first_present_wins() {
        let root = json!({"data": {"episodes": [1]}, "episodes": [2]});
        assert_eq!(probe(&root, PATHS), Some(&json!([2])));

        let nested = json!({"data": {"episodes": [1]}});
        assert_eq!(probe(&nested, PATHS), Some(&json!([1])));
    }

    #[test]
    fn test_probe_skips_null() {
        let root = json!({"episodes": null, "data": {"episodes": [3]}});
        assert_eq!(probe(&root, PATHS), Some(&json!([3])));
    }

    #[test]
    fn test_probe_root_path() {
        let root = json!({"id": "x"});
        assert_eq!(probe(&root, &[&["anime"], &[]]), Some(&root));
    }

    #[test]
    fn test_probe_missing() {
        let root = json!(["not", "an", "object"]);
        assert_eq!(probe(&root, PATHS), None);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("").unwrap(), RawResponse::Empty);
        assert_eq!(parse_body("  \n").unwrap(), RawResponse::Empty);
        assert_eq!(parse_body("null").unwrap(), RawResponse::Empty);
        assert!(matches!(parse_body("{\"a\":1}").unwrap(), RawResponse::Json(_)));
        assert!(matches!(
            parse_body("<html>").unwrap_err(),
            ProviderError::Malformed(_)
        ));
    }

    #[test]
    fn test_number_like() {
        let n: NumberLike = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(n.episode_number().map(|e| e.get()), Some(3));
        let s: NumberLike = serde_json::from_value(json!("3")).unwrap();
        assert_eq!(s.episode_number().map(|e| e.get()), Some(3));
        let f: NumberLike = serde_json::from_value(json!(3.0)).unwrap();
        assert_eq!(f.episode_number().map(|e| e.get()), Some(3));
        let bad: NumberLike = serde_json::from_value(json!("three")).unwrap();
        assert_eq!(bad.episode_number(), None);
    }

    /// Test: a record carrying both spellings of a field reads the first listed
    #[test]
    fn test_field_probes_tolerate_duplicate_spellings() {
        let entry = json!({"id": "strm-1", "episodeId": "other", "number": "4"});
        assert_eq!(text(&entry, &[&["id"], &["episodeId"]]).as_deref(), Some("strm-1"));
        assert_eq!(text(&entry, &[&["episodeId"], &["id"]]).as_deref(), Some("other"));
        let n = number(&entry, &[&["number"], &["episode"]]).unwrap();
        assert_eq!(n.as_u32(), Some(4));
    }

    #[test]
    fn test_field_probes_default_bad_values() {
        let entry = json!({"id": 42, "name": "  ", "genres": ["Fantasy", null, 3, "Drama"], "filler": "yes"});
        assert_eq!(text(&entry, &[&["id"]]).as_deref(), Some("42"));
        assert_eq!(non_blank(&entry, &[&["name"]]), None);
        assert_eq!(text_list(&entry, &[&["genres"]]), vec!["Fantasy", "Drama"]);
        assert_eq!(flag(&entry, &[&["filler"]]), None);
        assert!(entries(Some(&json!({"not": "a list"}))).is_empty());
    }
}
