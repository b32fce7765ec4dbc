//! # Filename and Path Derivation
//!
//! Deterministic mapping from (canonical URL, kind) to a location
//! inside the kind's storage partition. Determinism is what makes
//! re-downloads idempotent: the same resource always lands on the
//! same path, so repeated fetches can never grow the disk unboundedly.

use std::path::{Path, PathBuf};

use url::Url;

use crate::types::MediaKind;

/// Longest sanitized stem kept from a URL segment
const MAX_STEM_LEN: usize = 120;

/// FNV-1a 64-bit over the URL string.
///
/// Deterministic and fast; collision resistance is not a requirement
/// here, only stability within one kind's partition.
pub(crate) fn fnv1a64(input: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Derive the file name for a canonical URL within a kind's partition.
///
/// Prefers the URL's last path segment (query and fragment stripped)
/// when its extension is on the kind's allow-list, prefixed with the
/// kind so the same resource cached under two kinds cannot collide.
/// Falls back to a stable hash of the whole URL with the kind's
/// default extension when no usable segment exists.
pub fn derive_file_name(url: &str, kind: MediaKind) -> String {
    match usable_segment(url, kind) {
        Some(segment) => format!("{}_{}", kind.dir_name(), segment),
        None => format!(
            "{}_{:016x}.{}",
            kind.dir_name(),
            fnv1a64(url),
            kind.default_extension()
        ),
    }
}

/// Full path of a canonical URL's cached copy: `<root>/<kind>/<file>`
pub fn cache_path(root: &Path, url: &str, kind: MediaKind) -> PathBuf {
    kind_dir(root, kind).join(derive_file_name(url, kind))
}

/// Partition directory for one kind
pub fn kind_dir(root: &Path, kind: MediaKind) -> PathBuf {
    root.join(kind.dir_name())
}

/// Last path segment of the URL, if it carries an extension the kind
/// accepts. Returns the sanitized `stem.ext` form.
fn usable_segment(url: &str, kind: MediaKind) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?;

    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    if !kind.allowed_extensions().contains(&ext.as_str()) {
        return None;
    }

    let stem = sanitize_stem(stem);
    if stem.is_empty() {
        return None;
    }
    Some(format!("{stem}.{ext}"))
}

/// Replace anything outside a filesystem-safe charset and cap length
fn sanitize_stem(stem: &str) -> String {
    let mut out: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    out.truncate(MAX_STEM_LEN);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_name() {
        let url = "https://cdn.example.com/media/abc123.jpg";
        assert_eq!(
            derive_file_name(url, MediaKind::Image),
            derive_file_name(url, MediaKind::Image)
        );

        let no_ext = "https://cdn.example.com/media/abc123";
        assert_eq!(
            derive_file_name(no_ext, MediaKind::Voice),
            derive_file_name(no_ext, MediaKind::Voice)
        );
    }

    #[test]
    fn test_prefers_last_segment() {
        assert_eq!(
            derive_file_name("https://cdn.example.com/media/photo.jpg", MediaKind::Image),
            "image_photo.jpg"
        );
        assert_eq!(
            derive_file_name("https://cdn.example.com/v/clip.mp4", MediaKind::Video),
            "video_clip.mp4"
        );
    }

    #[test]
    fn test_strips_query_and_fragment() {
        assert_eq!(
            derive_file_name(
                "https://cdn.example.com/v/clip.mp4?token=abc&exp=1#t=30",
                MediaKind::Video
            ),
            "video_clip.mp4"
        );
    }

    #[test]
    fn test_kind_prefix_separates_partitions() {
        let url = "https://cdn.example.com/v/clip.mp4";
        assert_eq!(
            derive_file_name(url, MediaKind::VideoCircle),
            "video_circle_clip.mp4"
        );
        assert_ne!(
            derive_file_name(url, MediaKind::Video),
            derive_file_name(url, MediaKind::VideoCircle)
        );
    }

    #[test]
    fn test_hash_fallback_without_extension() {
        let name = derive_file_name("https://cdn.example.com/media/8492", MediaKind::Image);
        assert!(name.starts_with("image_"));
        assert!(name.ends_with(".jpg"));
        // stable hash, fixed width
        let hex = name
            .trim_start_matches("image_")
            .trim_end_matches(".jpg");
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_disallowed_extension_falls_back_to_hash() {
        // mp3 is a voice extension, not an image one
        let name = derive_file_name("https://cdn.example.com/a/track.mp3", MediaKind::Image);
        assert!(name.ends_with(".jpg"));
        assert!(!name.contains("track"));

        // and jpg is not a voice extension
        let name = derive_file_name("https://cdn.example.com/a/photo.jpg", MediaKind::Voice);
        assert!(name.ends_with(".m4a"));
    }

    #[test]
    fn test_uppercase_extension_is_accepted() {
        assert_eq!(
            derive_file_name("https://cdn.example.com/a/PHOTO.JPG", MediaKind::Image),
            "image_PHOTO.jpg"
        );
    }

    #[test]
    fn test_segment_is_sanitized() {
        let name = derive_file_name(
            "https://cdn.example.com/media/we%20ird=name.jpg",
            MediaKind::Image,
        );
        assert!(name.starts_with("image_"));
        assert!(name.ends_with(".jpg"));
        assert!(
            name.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
    }

    #[test]
    fn test_fnv1a64_reference_vectors() {
        assert_eq!(fnv1a64(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64("a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a64("foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_cache_path_layout() {
        let path = cache_path(
            Path::new("/data/cache"),
            "https://cdn.example.com/media/photo.jpg",
            MediaKind::Image,
        );
        assert_eq!(
            path,
            Path::new("/data/cache").join("image").join("image_photo.jpg")
        );
    }
}
