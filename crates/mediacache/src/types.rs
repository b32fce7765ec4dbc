//! # Cache Types
//!
//! Common types shared across the media cache: media kinds, index
//! entries, resolution results and housekeeping reports.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kinds of media the cache partitions storage and policy by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum MediaKind {
    /// Still images (photos, previews, stickers)
    Image,
    /// Full-size video messages
    Video,
    /// Round "video circle" messages
    #[cfg_attr(feature = "clap", value(name = "video_circle"))]
    VideoCircle,
    /// Voice notes
    Voice,
}

impl MediaKind {
    /// All kinds, in partition order
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Image,
        MediaKind::Video,
        MediaKind::VideoCircle,
        MediaKind::Voice,
    ];

    /// Name of this kind's storage partition, also used as the filename prefix
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::VideoCircle => "video_circle",
            MediaKind::Voice => "voice",
        }
    }

    /// Extensions accepted from a URL's trailing path segment
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &["jpg", "jpeg", "png", "gif", "webp"],
            MediaKind::Video | MediaKind::VideoCircle => &["mp4"],
            MediaKind::Voice => &["m4a", "mp3", "aac", "wav"],
        }
    }

    /// Extension used when the URL offers no usable segment
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video | MediaKind::VideoCircle => "mp4",
            MediaKind::Voice => "m4a",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "video_circle" | "video-circle" => Ok(MediaKind::VideoCircle),
            "voice" => Ok(MediaKind::Voice),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// One cached remote resource, keyed in the index by its canonical URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonical remote URL (after bad-host correction)
    pub url: String,
    /// Path of the on-disk copy inside the kind partition
    pub local_path: PathBuf,
    /// Media kind; fixed at creation, decides partition and age policy
    pub kind: MediaKind,
    /// Byte length of the stored file at write time
    pub size_bytes: u64,
    /// Epoch milliseconds when first cached
    pub created_at: u64,
    /// Epoch milliseconds of the latest cache hit or write
    #[serde(default)]
    pub last_access_at: u64,
}

impl CacheEntry {
    /// Create a fresh entry stamped with the current time
    pub fn new(
        url: impl Into<String>,
        local_path: PathBuf,
        kind: MediaKind,
        size_bytes: u64,
    ) -> Self {
        let now = now_millis();
        Self {
            url: url.into(),
            local_path,
            kind,
            size_bytes,
            created_at: now,
            last_access_at: now,
        }
    }

    /// Timestamp used for age and LRU decisions; entries persisted
    /// without an access time fall back to their creation time.
    pub fn effective_access_at(&self) -> u64 {
        if self.last_access_at != 0 {
            self.last_access_at
        } else {
            self.created_at
        }
    }

    /// Record a cache hit or overwrite
    pub fn touch(&mut self) {
        self.last_access_at = now_millis();
    }
}

/// Outcome of resolving a remote URL against the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A verified copy in the local cache
    Local(PathBuf),
    /// No usable local copy; load straight from this source string
    Direct(String),
}

impl MediaSource {
    /// Local path, if resolution produced one
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaSource::Local(path) => Some(path),
            MediaSource::Direct(_) => None,
        }
    }

    /// Whether this resolution hit the local cache
    pub fn is_local(&self) -> bool {
        matches!(self, MediaSource::Local(_))
    }
}

/// Per-kind slice of the aggregate statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Number of cached items of this kind
    pub items: usize,
    /// Bytes those items account for
    pub bytes: u64,
}

/// Read-only aggregate view over the index
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Total cached items
    pub total_items: usize,
    /// Total bytes across all partitions
    pub total_bytes: u64,
    /// Breakdown by kind; every kind is present even when empty
    pub kinds: HashMap<MediaKind, KindStats>,
}

/// Result of a housekeeping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries removed
    pub cleaned: usize,
    /// Bytes those entries accounted for
    pub freed_bytes: u64,
}

/// Current time as epoch milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
