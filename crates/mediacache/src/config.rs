use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::types::MediaKind;

const DEFAULT_USER_AGENT: &str = concat!("mediacache/", env!("CARGO_PKG_VERSION"));

const DEFAULT_MAX_TOTAL_BYTES: u64 = 500 * 1024 * 1024; // 500MB
const DEFAULT_EVICT_TO_RATIO: f64 = 0.7;
const DEFAULT_IN_FLIGHT_STALENESS: Duration = Duration::from_secs(30);

const DAY: u64 = 24 * 60 * 60;
const DEFAULT_IMAGE_MAX_AGE: Duration = Duration::from_secs(30 * DAY);
const DEFAULT_VOICE_MAX_AGE: Duration = Duration::from_secs(14 * DAY);
const DEFAULT_VIDEO_MAX_AGE: Duration = Duration::from_secs(7 * DAY);

/// Configurable options for the media cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding the kind partitions and the persisted
    /// index. Callers should point this at persistent application
    /// data, not an OS-managed temp location that can be purged
    /// behind the cache's back.
    pub root_dir: PathBuf,

    /// Ceiling on total cached bytes across all partitions
    pub max_total_bytes: u64,

    /// Fraction of the ceiling that size eviction shrinks down to,
    /// so the cache does not thrash right at the boundary
    pub evict_to_ratio: f64,

    /// Age past which an in-flight download record is treated as
    /// abandoned and superseded by a fresh attempt
    pub in_flight_staleness: Duration,

    /// Max age for image entries, measured from last access
    pub image_max_age: Duration,

    /// Max age for voice entries
    pub voice_max_age: Duration,

    /// Max age for video and video-circle entries
    pub video_max_age: Duration,

    /// Known-incorrect host to correct host rewrites, applied to
    /// every URL before any index lookup or network call
    pub host_rewrites: Vec<(String, String)>,

    /// HTTP transport options for downloads
    pub http: HttpConfig,
}

impl CacheConfig {
    /// Create a configuration with default policy under the given root
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            evict_to_ratio: DEFAULT_EVICT_TO_RATIO,
            in_flight_staleness: DEFAULT_IN_FLIGHT_STALENESS,
            image_max_age: DEFAULT_IMAGE_MAX_AGE,
            voice_max_age: DEFAULT_VOICE_MAX_AGE,
            video_max_age: DEFAULT_VIDEO_MAX_AGE,
            host_rewrites: Vec::new(),
            http: HttpConfig::default(),
        }
    }

    pub fn builder(root_dir: impl Into<PathBuf>) -> crate::builder::CacheConfigBuilder {
        crate::builder::CacheConfigBuilder::new(root_dir)
    }

    /// Max age policy for one kind
    pub fn max_age_for(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Image => self.image_max_age,
            MediaKind::Voice => self.voice_max_age,
            MediaKind::Video | MediaKind::VideoCircle => self.video_max_age,
        }
    }

    /// Byte count size eviction shrinks the cache down to
    pub fn evict_target_bytes(&self) -> u64 {
        (self.max_total_bytes as f64 * self.evict_to_ratio) as u64
    }
}

/// HTTP transport options for media downloads
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall timeout for one download request
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::get_default_headers(),
        }
    }
}

impl HttpConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers
    }
}
