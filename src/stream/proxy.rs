//! CORS proxy URL rewriting
//!
//! Browser players cannot send the headers some CDNs require, so media URLs
//! can be routed through a proxy that adds them:
//! `{proxy}?url={encoded url}&headers={encoded json}`.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::{ResolvedStream, TrackOrigin};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Upstream service a media URL belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Hianime,
    Yuma,
}

impl Provider {
    /// Headers the upstream expects on media requests
    pub fn headers(&self) -> BTreeMap<&'static str, &'static str> {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent", BROWSER_USER_AGENT);
        if *self == Provider::Hianime {
            headers.insert("Referer", "https://hianime.to/");
        }
        headers
    }

    pub fn for_track(origin: TrackOrigin) -> Self {
        match origin {
            TrackOrigin::Catalog => Provider::Hianime,
            TrackOrigin::Streaming => Provider::Yuma,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Hianime => write!(f, "hianime"),
            Provider::Yuma => write!(f, "yuma"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRewriter {
    proxy_url: Option<String>,
}

impl ProxyRewriter {
    pub fn new(proxy_url: Option<String>) -> Self {
        Self {
            proxy_url: proxy_url
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        }
    }

    /// Rewriter that leaves every URL untouched
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.proxy_url.is_some()
    }

    /// Route `url` through the proxy, or return it unchanged when it cannot
    /// or need not be proxied
    pub fn rewrite(&self, url: &str, provider: Provider) -> String {
        let Some(proxy) = self.proxy_url.as_deref() else {
            return url.to_string();
        };
        if url.trim().is_empty() {
            return url.to_string();
        }
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return url.to_string(),
        }

        let headers = serde_json::to_string(&provider.headers()).unwrap_or_default();
        format!(
            "{}?url={}&headers={}",
            proxy,
            urlencoding::encode(url),
            urlencoding::encode(&headers)
        )
    }

    /// Rewrite every source and track URL of a resolved stream
    pub fn apply(&self, mut stream: ResolvedStream) -> ResolvedStream {
        if !self.is_enabled() {
            return stream;
        }
        for source in &mut stream.sources {
            source.url = self.rewrite(&source.url, Provider::Yuma);
        }
        for track in &mut stream.tracks {
            track.src = self.rewrite(&track.src, Provider::for_track(track.origin));
        }
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_without_proxy_passes_through() {
        let rewriter = ProxyRewriter::disabled();
        assert_eq!(
            rewriter.rewrite("https://cdn.example/a.m3u8", Provider::Yuma),
            "https://cdn.example/a.m3u8"
        );
        assert!(!ProxyRewriter::new(Some("  ".into())).is_enabled());
    }

    #[test]
    fn test_rewrite_hianime_headers() {
        let rewriter = ProxyRewriter::new(Some("https://proxy.example/p".into()));
        let out = rewriter.rewrite("https://cdn.example/a.m3u8", Provider::Hianime);
        let expected_headers = urlencoding::encode(
            r#"{"Referer":"https://hianime.to/","User-Agent":"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"}"#,
        )
        .into_owned();
        assert_eq!(
            out,
            format!(
                "https://proxy.example/p?url=https%3A%2F%2Fcdn.example%2Fa.m3u8&headers={}",
                expected_headers
            )
        );
    }

    #[test]
    fn test_rewrite_skips_data_blob_and_garbage() {
        let rewriter = ProxyRewriter::new(Some("https://proxy.example/p".into()));
        for url in ["", "data:text/vtt;base64,AAAA", "blob:https://x/123", "not a url"] {
            assert_eq!(rewriter.rewrite(url, Provider::Yuma), url);
        }
    }

    #[test]
    fn test_yuma_has_no_referer() {
        assert!(!Provider::Yuma.headers().contains_key("Referer"));
        assert!(Provider::Hianime.headers().contains_key("Referer"));
    }
}
