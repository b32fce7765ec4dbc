//! # Builder for CacheConfig
//!
//! This module provides a builder pattern implementation for creating and customizing
//! CacheConfig instances with a fluent API.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mediacache_engine::{CacheConfig, MediaKind};
//!
//! // Create a config with the builder
//! let config = CacheConfig::builder("/var/lib/myapp/media-cache")
//!     .with_max_total_bytes(200 * 1024 * 1024)
//!     .with_max_age(MediaKind::Image, Duration::from_secs(7 * 24 * 60 * 60))
//!     .with_host_rewrite("cdn-old.example.com", "cdn.example.com")
//!     .with_timeout(Duration::from_secs(120))
//!     .with_user_agent("MyApp/1.0")
//!     .build();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::config::{CacheConfig, HttpConfig};
use crate::types::MediaKind;

/// Builder for creating CacheConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    /// Internal config being built
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default policy under the given root
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: CacheConfig::new(root_dir),
        }
    }

    /// Set the ceiling on total cached bytes
    pub fn with_max_total_bytes(mut self, bytes: u64) -> Self {
        self.config.max_total_bytes = bytes;
        self
    }

    /// Set the fraction of the ceiling that size eviction shrinks down to
    pub fn with_evict_to_ratio(mut self, ratio: f64) -> Self {
        self.config.evict_to_ratio = ratio;
        self
    }

    /// Set the age past which an in-flight download is treated as abandoned
    pub fn with_in_flight_staleness(mut self, staleness: Duration) -> Self {
        self.config.in_flight_staleness = staleness;
        self
    }

    /// Set the max age for one kind (video and video-circle share a policy)
    pub fn with_max_age(mut self, kind: MediaKind, max_age: Duration) -> Self {
        match kind {
            MediaKind::Image => self.config.image_max_age = max_age,
            MediaKind::Voice => self.config.voice_max_age = max_age,
            MediaKind::Video | MediaKind::VideoCircle => self.config.video_max_age = max_age,
        }
        self
    }

    /// Add one known-incorrect host to correct host rewrite
    pub fn with_host_rewrite(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.host_rewrites.push((from.into(), to.into()));
        self
    }

    /// Set all host rewrites, replacing any existing table
    pub fn with_host_rewrites(
        mut self,
        rewrites: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.config.host_rewrites = rewrites.into_iter().collect();
        self
    }

    /// Set all HTTP transport options at once
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.config.http = http;
        self
    }

    /// Set the overall timeout for one download request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.connect_timeout = timeout;
        self
    }

    /// Set the read timeout (maximum time between receiving data chunks)
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.read_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.http.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.http.headers.insert(name, value);
        }
        self
    }

    /// Set all HTTP headers, replacing any existing headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.http.headers = headers;
        self
    }

    /// Build the CacheConfig instance
    pub fn build(self) -> CacheConfig {
        self.config
    }
}
