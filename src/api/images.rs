//! Poster/thumbnail optimization
//!
//! Rewrites image URLs through the weserv.nl resizing service and verifies the
//! optimized variant under the `images` retry policy, falling back to the
//! original URL when the service is unreachable.

use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::http_client;
use crate::error::ProviderError;
use crate::retry::RetryPolicy;

pub const IMAGE_SERVICE_URL: &str = "https://images.weserv.nl";

const DEFAULT_QUALITY: u8 = 85;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Output encoding requested from the resizing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Webp => write!(f, "webp"),
            ImageFormat::Jpeg => write!(f, "jpeg"),
            ImageFormat::Png => write!(f, "png"),
        }
    }
}

/// Poster preset sizes (2:3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosterSize {
    Small,
    Medium,
    Large,
    XLarge,
}

impl PosterSize {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            PosterSize::Small => (200, 300),
            PosterSize::Medium => (400, 600),
            PosterSize::Large => (600, 900),
            PosterSize::XLarge => (800, 1200),
        }
    }
}

/// Optimized URL on the public service; empty input stays empty
pub fn optimized_image_url(url: &str, width: u32, height: u32, format: ImageFormat) -> String {
    optimized_image_url_on(IMAGE_SERVICE_URL, url, width, height, format)
}

fn optimized_image_url_on(
    service: &str,
    url: &str,
    width: u32,
    height: u32,
    format: ImageFormat,
) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    format!(
        "{}/?url={}&w={}&h={}&fit=cover&output={}&q={}",
        service.trim_end_matches('/'),
        urlencoding::encode(url),
        width,
        height,
        format,
        DEFAULT_QUALITY
    )
}

/// Image service client
pub struct ImageClient {
    service_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ImageClient {
    pub fn new() -> Self {
        Self::with_base_url(IMAGE_SERVICE_URL)
    }

    /// Create a client against a custom service (for testing)
    pub fn with_base_url(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into().trim_end_matches('/').to_string(),
            client: http_client(PROBE_TIMEOUT),
            policy: RetryPolicy::images(),
        }
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn optimized_url(&self, url: &str, width: u32, height: u32, format: ImageFormat) -> String {
        optimized_image_url_on(&self.service_url, url, width, height, format)
    }

    /// Optimized URL if the service answers for it, else the original URL
    pub async fn resolve(&self, url: &str, width: u32, height: u32) -> String {
        let optimized = self.optimized_url(url, width, height, ImageFormat::Webp);
        if optimized.is_empty() {
            return String::new();
        }

        match self.policy.execute(|| self.probe(&optimized)).await {
            Ok(()) => optimized,
            Err(e) => {
                debug!(url, error = %e, "image optimization unavailable, using original");
                url.trim().to_string()
            }
        }
    }

    pub async fn poster(&self, url: &str, size: PosterSize) -> String {
        let (width, height) = size.dimensions();
        self.resolve(url, width, height).await
    }

    async fn probe(&self, url: &str) -> Result<(), ProviderError> {
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProviderError::Status(status.as_u16()))
        }
    }
}

impl Default for ImageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimized_image_url() {
        let url = optimized_image_url(
            "https://cdn.example/poster 1.jpg",
            400,
            600,
            ImageFormat::Webp,
        );
        assert_eq!(
            url,
            "https://images.weserv.nl/?url=https%3A%2F%2Fcdn.example%2Fposter%201.jpg&w=400&h=600&fit=cover&output=webp&q=85"
        );
    }

    #[test]
    fn test_optimized_image_url_empty() {
        assert_eq!(optimized_image_url("  ", 10, 10, ImageFormat::Png), "");
    }

    #[test]
    fn test_poster_sizes() {
        assert_eq!(PosterSize::Medium.dimensions(), (400, 600));
        assert_eq!(PosterSize::XLarge.dimensions(), (800, 1200));
    }
}
