//! # Mediacache
//!
//! A disk-backed cache for chat media: images, videos, video circles
//! and voice notes. Remote URLs resolve to verified local files,
//! downloading each at most once, and a lost or corrupt index is only
//! ever a cold cache, never a crash.
//!
//! ## Features
//!
//! - Get-or-fetch resolution with in-flight download coalescing
//! - Deterministic URL-to-filename derivation, partitioned by kind
//! - Known-bad host correction ahead of every lookup and fetch
//! - Age-based expiry and size-capped LRU eviction with hysteresis
//! - Adoption of locally produced files under their server URL
//! - Best-effort JSON index persistence with atomic writes

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod index;
pub mod layout;
pub mod manager;
pub mod normalize;
pub mod types;

pub use builder::CacheConfigBuilder;
pub use config::{CacheConfig, HttpConfig};
pub use error::CacheError;
pub use manager::MediaCache;

// Re-export the vocabulary types callers see on every operation
pub use types::{CacheEntry, CacheStats, KindStats, MediaKind, MediaSource, SweepReport};

// Re-export index plumbing for callers that inspect the persisted state
pub use index::{CacheIndex, IndexStore};

// Re-export layout helpers so callers can predict cache locations
pub use layout::{cache_path, derive_file_name, kind_dir};

// Re-export downloader utilities
pub use downloader::create_client;
