//! Configuration management for AniStream
//!
//! Handles config file loading/saving and environment overrides.
//! Config is stored at ~/.config/anistream/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::catalog::DEFAULT_CATALOG_URL;
use crate::api::images::IMAGE_SERVICE_URL;
use crate::api::streaming::DEFAULT_STREAMING_URL;
use crate::api::{CatalogClient, ImageClient, StreamingClient};
use crate::cache::{CacheConfig, CacheHandle};
use crate::stream::{Pipeline, PipelineConfig, ProxyRewriter};

pub const ENV_CATALOG_URL: &str = "ANISTREAM_CATALOG_URL";
pub const ENV_STREAMING_URL: &str = "ANISTREAM_STREAMING_URL";
pub const ENV_PROXY_URL: &str = "ANISTREAM_PROXY_URL";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog API base URL
    pub catalog_url: String,
    /// Streaming API base URL
    pub streaming_url: String,
    /// CORS proxy for media URLs (unset = no rewriting)
    pub proxy_url: Option<String>,
    /// Image resizing service for posters
    pub image_service_url: String,
    /// Swap posters for optimized variants (one HEAD check per poster)
    pub optimize_posters: bool,
    /// Per-HTTP-request timeout
    pub http_timeout_secs: u64,
    /// Limit on one whole episode resolution
    pub request_timeout_secs: Option<u64>,
    /// Per-kind cache lifetime overrides
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            streaming_url: DEFAULT_STREAMING_URL.to_string(),
            proxy_url: None,
            image_service_url: IMAGE_SERVICE_URL.to_string(),
            optimize_posters: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            request_timeout_secs: None,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Get config file path (~/.config/anistream/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("anistream").join("config.toml"))
    }

    /// Load config from the default path plus environment overrides
    pub fn load() -> Self {
        let file = Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default();
        file.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load from an explicit file; missing or malformed files give defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| Self::parse(&s).ok())
            .unwrap_or_default()
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid config file")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Apply `ANISTREAM_*` overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_CATALOG_URL) {
            self.catalog_url = url;
        }
        if let Some(url) = non_empty(ENV_STREAMING_URL) {
            self.streaming_url = url;
        }
        if let Some(url) = non_empty(ENV_PROXY_URL) {
            self.proxy_url = Some(url);
        }
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            request_timeout: self.request_timeout(),
            ..PipelineConfig::default()
        }
    }

    /// Poster optimizer, when enabled here or by `force`
    pub fn image_client(&self, force: bool) -> Option<ImageClient> {
        (force || self.optimize_posters).then(|| ImageClient::with_base_url(&self.image_service_url))
    }

    /// Build a pipeline with a fresh cache from this config
    pub fn pipeline(&self) -> Pipeline {
        let catalog = CatalogClient::with_timeout(&self.catalog_url, self.http_timeout());
        let streaming = StreamingClient::with_timeout(&self.streaming_url, self.http_timeout());
        Pipeline::new(catalog, streaming, CacheHandle::create(self.cache.clone()))
            .with_config(self.pipeline_config())
            .with_proxy(ProxyRewriter::new(self.proxy_url.clone()))
    }
}
