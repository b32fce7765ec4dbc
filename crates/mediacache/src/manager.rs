//! # Media Cache Manager
//!
//! The cache manager: get-or-fetch resolution with in-flight download
//! coalescing, preloads, local-file adoption, housekeeping and
//! statistics over a persistent URL-keyed index.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::CacheConfig;
use crate::downloader::{create_client, download_to_file};
use crate::error::CacheError;
use crate::index::{CacheIndex, IndexStore};
use crate::layout::{cache_path, kind_dir};
use crate::normalize::{is_http_url, normalize_url};
use crate::types::{
    CacheEntry, CacheStats, KindStats, MediaKind, MediaSource, SweepReport, now_millis,
};

/// Pending download shared by every concurrent caller of one URL.
/// `None` means the fetch failed and callers fall back to the URL.
type SharedDownload = Shared<BoxFuture<'static, Option<PathBuf>>>;

/// Process-lifetime record of one outstanding download
struct InFlight {
    started: Instant,
    download: SharedDownload,
}

/// Disk-backed media cache with download coalescing and bounded size.
///
/// Cloning is cheap and every clone shares the same index, in-flight
/// table and HTTP client, so one instance created at startup can be
/// handed to every consumer and into spawned tasks.
#[derive(Clone)]
pub struct MediaCache {
    config: Arc<CacheConfig>,
    client: reqwest::Client,
    store: IndexStore,
    index: Arc<RwLock<CacheIndex>>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl MediaCache {
    /// Create a cache manager rooted at `config.root_dir`: builds the
    /// HTTP client, creates the kind partitions and loads the
    /// persisted index (tolerantly, a corrupt index starts cold).
    pub async fn new(config: CacheConfig) -> Result<Self, CacheError> {
        if !(0.0..=1.0).contains(&config.evict_to_ratio) {
            return Err(CacheError::Config(format!(
                "evict_to_ratio must be between 0 and 1, got {}",
                config.evict_to_ratio
            )));
        }
        let client = create_client(&config.http)?;

        fs::create_dir_all(&config.root_dir).await?;
        for kind in MediaKind::ALL {
            fs::create_dir_all(kind_dir(&config.root_dir, kind)).await?;
        }

        let store = IndexStore::new(&config.root_dir);
        let index = store.load().await;
        debug!(root = ?config.root_dir, entries = index.len(), "media cache ready");

        Ok(Self {
            config: Arc::new(config),
            client,
            store,
            index: Arc::new(RwLock::new(index)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Configuration reference
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolve a remote URL to the best available source, fetching at
    /// most once across concurrent callers.
    ///
    /// Returns `None` only for a blank URL. Non-HTTP(S) input passes
    /// through unchanged as [`MediaSource::Direct`], and so does the
    /// canonical URL itself when its download fails. No error ever
    /// crosses this boundary.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_media(&self, url: &str, kind: MediaKind) -> Option<MediaSource> {
        if url.trim().is_empty() {
            return None;
        }

        let canonical = normalize_url(url, &self.config.host_rewrites);
        if !is_http_url(&canonical) {
            debug!(url = %url, "not a remote URL, passing through");
            return Some(MediaSource::Direct(canonical));
        }

        // A live download for this URL wins over the index: its result
        // is fresher than whatever the index currently points at.
        if let Some(download) = self.join_in_flight(&canonical) {
            return Some(Self::resolve(download.await, canonical));
        }

        if let Some(path) = self.verified_hit(&canonical).await {
            return Some(MediaSource::Local(path));
        }

        let download = self.register_download(&canonical, kind);
        Some(Self::resolve(download.await, canonical))
    }

    /// Probe the cache without ever fetching: the verified local path
    /// or `None`. Pure observation: no access-time bump, no purging.
    #[instrument(skip(self), level = "debug")]
    pub async fn peek(&self, url: &str, kind: MediaKind) -> Option<PathBuf> {
        if url.trim().is_empty() {
            return None;
        }
        let canonical = normalize_url(url, &self.config.host_rewrites);

        let path = {
            let index = self.index.read().await;
            index.get(&canonical)?.local_path.clone()
        };
        if file_exists(&path).await { Some(path) } else { None }
    }

    /// Warm the cache for one URL in the background. Failures are
    /// logged by the fetch path and otherwise invisible.
    pub fn preload(&self, url: &str, kind: MediaKind) {
        if url.trim().is_empty() {
            return;
        }
        let this = self.clone();
        let url = url.to_owned();
        tokio::spawn(async move {
            let _ = this.get_media(&url, kind).await;
        });
    }

    /// Warm the cache for many URLs of one kind
    pub fn preload_list<I, S>(&self, urls: I, kind: MediaKind)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.preload(url.as_ref(), kind);
        }
    }

    /// Warm the cache for mixed (url, kind) pairs
    pub fn preload_items<I, S>(&self, items: I)
    where
        I: IntoIterator<Item = (S, MediaKind)>,
        S: AsRef<str>,
    {
        for (url, kind) in items {
            self.preload(url.as_ref(), kind);
        }
    }

    /// Adopt a file the app already produced locally (a fresh capture,
    /// an upload still in progress) as the cached copy of its eventual
    /// server URL, so the first playback after send never re-downloads
    /// what was just recorded. The file is copied; the source's
    /// lifecycle stays the caller's. Returns the cache path, or `None`
    /// on any failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn adopt_local_file(
        &self,
        source: &Path,
        server_url: &str,
        kind: MediaKind,
    ) -> Option<PathBuf> {
        if server_url.trim().is_empty() {
            return None;
        }
        if !file_exists(source).await {
            warn!(path = ?source, "adoption source does not exist");
            return None;
        }

        let canonical = normalize_url(server_url, &self.config.host_rewrites);
        let dest = cache_path(&self.config.root_dir, &canonical, kind);
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!(path = ?parent, error = %e, "failed to create cache partition");
                return None;
            }
        }

        let size = match fs::copy(source, &dest).await {
            Ok(size) => size,
            Err(e) => {
                warn!(from = ?source, to = ?dest, error = %e, "failed to copy adopted file");
                return None;
            }
        };

        {
            let mut index = self.index.write().await;
            index.insert(
                canonical.clone(),
                CacheEntry::new(&canonical, dest.clone(), kind, size),
            );
        }
        self.persist_in_background();
        debug!(url = %canonical, path = ?dest, bytes = size, "adopted local file");
        Some(dest)
    }

    /// Remove entries whose age since last access exceeds their kind's
    /// limit: delete the files (a file already gone is not an error),
    /// drop the entries and persist the survivors as a full rewrite.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = now_millis();
        let mut report = SweepReport::default();
        let mut index = self.index.write().await;

        let mut expired: Vec<CacheEntry> = Vec::new();
        index.retain(|_, entry| {
            let age = now.saturating_sub(entry.effective_access_at());
            if age > self.config.max_age_for(entry.kind).as_millis() as u64 {
                expired.push(entry.clone());
                false
            } else {
                true
            }
        });

        for entry in &expired {
            remove_file_quiet(&entry.local_path).await;
            report.cleaned += 1;
            report.freed_bytes += entry.size_bytes;
        }

        if report.cleaned > 0 {
            self.save_snapshot(&index).await;
            info!(
                cleaned = report.cleaned,
                freed_bytes = report.freed_bytes,
                "age sweep complete"
            );
        }
        report
    }

    /// Enforce the total-size ceiling: when the index exceeds it,
    /// evict least-recently-used entries until the total falls to the
    /// hysteresis target, and never one entry more.
    #[instrument(skip(self))]
    pub async fn enforce_size_limit(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut index = self.index.write().await;

        let mut total: u64 = index.values().map(|entry| entry.size_bytes).sum();
        if total <= self.config.max_total_bytes {
            return report;
        }

        let target = self.config.evict_target_bytes();
        let mut candidates: Vec<CacheEntry> = index.values().cloned().collect();
        candidates.sort_by_key(|entry| entry.effective_access_at());

        for entry in candidates {
            if total <= target {
                break;
            }
            index.remove(&entry.url);
            remove_file_quiet(&entry.local_path).await;
            total = total.saturating_sub(entry.size_bytes);
            report.cleaned += 1;
            report.freed_bytes += entry.size_bytes;
        }

        self.save_snapshot(&index).await;
        info!(
            cleaned = report.cleaned,
            freed_bytes = report.freed_bytes,
            total_bytes = total,
            "size eviction complete"
        );
        report
    }

    /// Drop index entries whose files vanished behind the cache's back
    /// (user-cleared storage, external cleanup). Returns how many were
    /// dropped.
    #[instrument(skip(self))]
    pub async fn prune_missing(&self) -> usize {
        let mut index = self.index.write().await;

        let mut missing: Vec<String> = Vec::new();
        for (url, entry) in index.iter() {
            if !file_exists(&entry.local_path).await {
                missing.push(url.clone());
            }
        }
        for url in &missing {
            index.remove(url);
        }

        if !missing.is_empty() {
            warn!(pruned = missing.len(), "pruned entries with missing files");
            self.save_snapshot(&index).await;
        }
        missing.len()
    }

    /// Read-only aggregate view: totals plus a per-kind breakdown,
    /// with every kind present even when empty
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;

        let mut stats = CacheStats {
            kinds: MediaKind::ALL
                .iter()
                .map(|kind| (*kind, KindStats::default()))
                .collect(),
            ..CacheStats::default()
        };
        for entry in index.values() {
            stats.total_items += 1;
            stats.total_bytes += entry.size_bytes;
            let slot = stats.kinds.entry(entry.kind).or_default();
            slot.items += 1;
            slot.bytes += entry.size_bytes;
        }
        stats
    }

    /// Delete every partition and the persisted index, then recreate
    /// the empty directories: the state of a first launch. Downloads
    /// still in flight may land after the reset; the result is an
    /// ordinary re-cached entry, not corruption. Returns whether the
    /// reset fully succeeded.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> bool {
        let mut index = self.index.write().await;
        index.clear();

        let mut ok = true;
        for kind in MediaKind::ALL {
            let dir = kind_dir(&self.config.root_dir, kind);
            match fs::remove_dir_all(&dir).await {
                Err(e) if e.kind() != ErrorKind::NotFound => {
                    warn!(path = ?dir, error = %e, "failed to remove partition");
                    ok = false;
                }
                _ => {}
            }
            if let Err(e) = fs::create_dir_all(&dir).await {
                warn!(path = ?dir, error = %e, "failed to recreate partition");
                ok = false;
            }
        }

        match fs::remove_file(self.store.path()).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!(path = ?self.store.path(), error = %e, "failed to remove persisted index");
                ok = false;
            }
            _ => {}
        }

        info!(ok, "cache cleared");
        ok
    }

    /// Start an optional background loop running the housekeeping
    /// passes at a fixed interval. Nothing is spawned implicitly; the
    /// caller owns the handle and aborts it to stop.
    pub fn spawn_maintenance(&self, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            // the first tick fires immediately; skip it
            interval.tick().await;
            loop {
                interval.tick().await;
                this.prune_missing().await;
                this.sweep_expired().await;
                this.enforce_size_limit().await;
            }
        })
    }

    // ---- internals ----

    fn resolve(downloaded: Option<PathBuf>, canonical: String) -> MediaSource {
        match downloaded {
            Some(path) => MediaSource::Local(path),
            None => MediaSource::Direct(canonical),
        }
    }

    /// Join a live in-flight download for this URL, if one exists.
    /// A record older than the staleness threshold belongs to a fetch
    /// assumed hung: it is discarded so the caller proceeds as a fresh
    /// miss.
    fn join_in_flight(&self, canonical: &str) -> Option<SharedDownload> {
        let mut in_flight = self.in_flight.lock();

        let stale = match in_flight.get(canonical) {
            Some(slot) if slot.started.elapsed() < self.config.in_flight_staleness => {
                debug!(url = %canonical, "joining in-flight download");
                return Some(slot.download.clone());
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            warn!(url = %canonical, "in-flight download stale, discarding");
            in_flight.remove(canonical);
        }
        None
    }

    /// Index hit with the file verified on disk. The access time is
    /// bumped and persisted without blocking the return. A dangling
    /// entry is purged so the caller falls through to a fresh
    /// download.
    async fn verified_hit(&self, canonical: &str) -> Option<PathBuf> {
        let path = {
            let index = self.index.read().await;
            index.get(canonical)?.local_path.clone()
        };

        if file_exists(&path).await {
            {
                let mut index = self.index.write().await;
                if let Some(entry) = index.get_mut(canonical) {
                    entry.touch();
                }
            }
            self.persist_in_background();
            debug!(url = %canonical, path = ?path, "cache hit");
            Some(path)
        } else {
            warn!(url = %canonical, path = ?path, "cached file missing, purging entry");
            self.index.write().await.remove(canonical);
            self.persist_in_background();
            None
        }
    }

    /// Become the caller that downloads this URL, or join the one that
    /// registered between our index check and here. Check and
    /// registration happen under a single lock with no await between
    /// them, so two callers can never both start.
    fn register_download(&self, canonical: &str, kind: MediaKind) -> SharedDownload {
        let mut in_flight = self.in_flight.lock();

        if let Some(slot) = in_flight.get(canonical) {
            debug!(url = %canonical, "lost registration race, joining");
            return slot.download.clone();
        }

        let started = Instant::now();
        let download = self.build_download(canonical.to_owned(), kind, started);
        in_flight.insert(
            canonical.to_owned(),
            InFlight {
                started,
                download: download.clone(),
            },
        );
        download
    }

    /// The shared future behind one in-flight record: fetch, record
    /// the entry, then unregister. The first poller drives it; every
    /// waiter sees the same settled value, and a waiter that goes away
    /// does not cancel the download for the rest.
    fn build_download(&self, canonical: String, kind: MediaKind, started: Instant) -> SharedDownload {
        let this = self.clone();
        async move {
            let downloaded = this.fetch_and_record(&canonical, kind).await;

            // Unregister, unless a fresh attempt already superseded
            // this record after it went stale.
            let mut in_flight = this.in_flight.lock();
            if let Some(slot) = in_flight.get(&canonical) {
                if slot.started == started {
                    in_flight.remove(&canonical);
                }
            }

            downloaded
        }
        .boxed()
        .shared()
    }

    async fn fetch_and_record(&self, canonical: &str, kind: MediaKind) -> Option<PathBuf> {
        let dest = cache_path(&self.config.root_dir, canonical, kind);
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!(path = ?parent, error = %e, "failed to create cache partition");
                return None;
            }
        }

        match download_to_file(&self.client, canonical, &dest).await {
            Ok(size) => {
                {
                    let mut index = self.index.write().await;
                    index.insert(
                        canonical.to_owned(),
                        CacheEntry::new(canonical, dest.clone(), kind, size),
                    );
                }
                self.persist_in_background();
                debug!(url = %canonical, path = ?dest, bytes = size, "cached media");
                Some(dest)
            }
            Err(e) => {
                warn!(url = %canonical, error = %e, "download failed, falling back to remote URL");
                None
            }
        }
    }

    /// Best-effort save of the snapshot the caller already holds
    async fn save_snapshot(&self, index: &CacheIndex) {
        if let Err(e) = self.store.save(index).await {
            warn!(error = %e, "failed to persist cache index");
        }
    }

    /// Best-effort save that never blocks the calling operation
    fn persist_in_background(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let snapshot = this.index.read().await.clone();
            if let Err(e) = this.store.save(&snapshot).await {
                warn!(error = %e, "failed to persist cache index");
            }
        });
    }
}

async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Delete a file, tolerating it already being gone
async fn remove_file_quiet(path: &Path) {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            warn!(path = ?path, error = %e, "failed to remove cached file");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    async fn cache_at(root: &Path) -> MediaCache {
        MediaCache::new(CacheConfig::new(root)).await.unwrap()
    }

    fn days_ago_millis(days: u64) -> u64 {
        now_millis() - days * 24 * 60 * 60 * 1000
    }

    /// Plant an entry (and its file) directly, with a chosen access time
    async fn plant_entry(
        cache: &MediaCache,
        url: &str,
        kind: MediaKind,
        body: &[u8],
        last_access_at: u64,
    ) -> PathBuf {
        let dest = cache_path(&cache.config.root_dir, url, kind);
        std::fs::write(&dest, body).unwrap();

        let mut entry = CacheEntry::new(url, dest.clone(), kind, body.len() as u64);
        entry.last_access_at = last_access_at;
        cache.index.write().await.insert(url.to_string(), entry);
        dest
    }

    async fn mount_media(server: &MockServer, route: &str, body: &'static [u8], hits: u64) {
        Mock::given(method("GET"))
            .and(url_path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(hits)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_nonsense_ratio_is_a_config_error() {
        let dir = tempdir().unwrap();
        let config = CacheConfig::builder(dir.path())
            .with_evict_to_ratio(1.4)
            .build();
        assert!(matches!(
            MediaCache::new(config).await,
            Err(CacheError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_url_is_none() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        assert_eq!(cache.get_media("", MediaKind::Image).await, None);
        assert_eq!(cache.get_media("   ", MediaKind::Image).await, None);
    }

    #[tokio::test]
    async fn test_non_http_passes_through() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        let local = "file:///var/mobile/captures/circle.mp4";
        assert_eq!(
            cache.get_media(local, MediaKind::VideoCircle).await,
            Some(MediaSource::Direct(local.to_string()))
        );
    }

    #[tokio::test]
    async fn test_miss_downloads_then_hits_without_refetch() {
        init_tracing();
        let server = MockServer::start().await;
        mount_media(&server, "/media/photo.jpg", b"jpegbytes", 1).await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/photo.jpg", server.uri());

        let first = cache.get_media(&url, MediaKind::Image).await.unwrap();
        let path = first.local_path().expect("miss should cache locally").to_owned();
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegbytes");

        // hit path: same resolution, and the mock's expect(1) proves
        // no second request went out
        let second = cache.get_media(&url, MediaKind::Image).await.unwrap();
        assert_eq!(second, MediaSource::Local(path));

        let stats = cache.stats().await;
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.total_bytes, 9);
    }

    #[tokio::test]
    async fn test_concurrent_callers_coalesce_into_one_fetch() {
        init_tracing();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/media/big.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(&b"mp4bytes"[..])
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/big.mp4", server.uri());

        let callers = (0..8).map(|_| {
            let cache = cache.clone();
            let url = url.clone();
            tokio::spawn(async move { cache.get_media(&url, MediaKind::Video).await })
        });
        let results: Vec<_> = join_all(callers)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let expected = results[0].clone();
        assert!(expected.is_local());
        assert!(results.iter().all(|source| *source == expected));
    }

    #[tokio::test]
    async fn test_missing_file_heals_with_fresh_download() {
        init_tracing();
        let server = MockServer::start().await;
        mount_media(&server, "/media/photo.jpg", b"jpegbytes", 2).await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/photo.jpg", server.uri());

        let path = cache
            .get_media(&url, MediaKind::Image)
            .await
            .unwrap()
            .local_path()
            .unwrap()
            .to_owned();

        // someone deletes the file behind the cache's back
        std::fs::remove_file(&path).unwrap();

        let healed = cache.get_media(&url, MediaKind::Image).await.unwrap();
        assert_eq!(healed, MediaSource::Local(path.clone()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_download_degrades_to_remote_url() {
        init_tracing();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/media/broken.jpg"))
            .respond_with(ResponseTemplate::new(500))
            // the in-flight record is dropped on failure, so the second
            // call makes its own attempt
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/broken.jpg", server.uri());

        let result = cache.get_media(&url, MediaKind::Image).await;
        assert_eq!(result, Some(MediaSource::Direct(url.clone())));
        assert_eq!(cache.stats().await.total_items, 0);

        let retry = cache.get_media(&url, MediaKind::Image).await;
        assert_eq!(retry, Some(MediaSource::Direct(url)));
    }

    #[tokio::test]
    async fn test_stale_in_flight_is_superseded() {
        init_tracing();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/media/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(&b"slowbytes"[..])
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let config = CacheConfig::builder(dir.path())
            .with_in_flight_staleness(Duration::from_millis(50))
            .build();
        let cache = MediaCache::new(config).await.unwrap();
        let url = format!("{}/media/slow.jpg", server.uri());

        let hung = {
            let cache = cache.clone();
            let url = url.clone();
            tokio::spawn(async move { cache.get_media(&url, MediaKind::Image).await })
        };

        // well past the staleness threshold the record counts as
        // abandoned and a second caller starts its own fetch
        tokio::time::sleep(Duration::from_millis(150)).await;
        let fresh = cache.get_media(&url, MediaKind::Image).await.unwrap();
        assert!(fresh.is_local());
        assert!(hung.await.unwrap().unwrap().is_local());
    }

    #[tokio::test]
    async fn test_normalized_and_correct_urls_share_one_entry() {
        init_tracing();
        let server = MockServer::start().await;
        mount_media(&server, "/media/photo.jpg", b"jpegbytes", 1).await;

        let origin = url::Url::parse(&server.uri()).unwrap();
        let good_host = origin.host_str().unwrap().to_owned();
        let port = origin.port().unwrap();

        let dir = tempdir().unwrap();
        let config = CacheConfig::builder(dir.path())
            .with_host_rewrite("media-legacy.example.com", good_host)
            .build();
        let cache = MediaCache::new(config).await.unwrap();

        let bad = format!("http://media-legacy.example.com:{port}/media/photo.jpg");
        let good = format!("{}/media/photo.jpg", server.uri());

        let via_bad = cache.get_media(&bad, MediaKind::Image).await.unwrap();
        let via_good = cache.get_media(&good, MediaKind::Image).await.unwrap();
        assert!(via_bad.is_local());
        // one entry, one file, one fetch; expect(1) enforces the rest
        assert_eq!(via_bad, via_good);
        assert_eq!(cache.stats().await.total_items, 1);
    }

    #[tokio::test]
    async fn test_peek_never_fetches() {
        init_tracing();
        let server = MockServer::start().await;
        mount_media(&server, "/media/photo.jpg", b"jpegbytes", 1).await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/photo.jpg", server.uri());

        assert_eq!(cache.peek(&url, MediaKind::Image).await, None);

        let path = cache
            .get_media(&url, MediaKind::Image)
            .await
            .unwrap()
            .local_path()
            .unwrap()
            .to_owned();
        assert_eq!(cache.peek(&url, MediaKind::Image).await, Some(path.clone()));

        // a dangling entry is a peek miss, and peek leaves healing to
        // the fetch path
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.peek(&url, MediaKind::Image).await, None);
        assert_eq!(cache.index.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_preload_warms_the_cache() {
        init_tracing();
        let server = MockServer::start().await;
        mount_media(&server, "/media/photo.jpg", b"jpegbytes", 1).await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/photo.jpg", server.uri());

        cache.preload(&url, MediaKind::Image);

        let mut warmed = None;
        for _ in 0..100 {
            if let Some(path) = cache.peek(&url, MediaKind::Image).await {
                warmed = Some(path);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let path = warmed.expect("preload should populate the cache");

        // and the later render is a pure hit
        assert_eq!(
            cache.get_media(&url, MediaKind::Image).await,
            Some(MediaSource::Local(path))
        );
    }

    #[tokio::test]
    async fn test_adoption_avoids_redownload() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        let capture = dir.path().join("fresh-capture.mp4");
        std::fs::write(&capture, b"circlebytes").unwrap();

        // a URL nothing serves: any fetch attempt would degrade to Direct
        let server_url = "https://cdn.example.com/uploads/circle.mp4";
        let adopted = cache
            .adopt_local_file(&capture, server_url, MediaKind::VideoCircle)
            .await
            .expect("adoption should succeed");

        // copy semantics: the capture file is untouched
        assert!(capture.exists());
        assert_eq!(std::fs::read(&adopted).unwrap(), b"circlebytes");

        assert_eq!(
            cache.get_media(server_url, MediaKind::VideoCircle).await,
            Some(MediaSource::Local(adopted))
        );
        let stats = cache.stats().await;
        assert_eq!(stats.kinds[&MediaKind::VideoCircle].items, 1);
        assert_eq!(stats.kinds[&MediaKind::VideoCircle].bytes, 11);
    }

    #[tokio::test]
    async fn test_adoption_of_missing_source_is_none() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        let gone = dir.path().join("never-existed.mp4");
        let adopted = cache
            .adopt_local_file(&gone, "https://cdn.example.com/u/c.mp4", MediaKind::VideoCircle)
            .await;
        assert_eq!(adopted, None);
        assert_eq!(cache.stats().await.total_items, 0);
    }

    #[tokio::test]
    async fn test_age_sweep_removes_exactly_the_expired() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        let old_image = plant_entry(
            &cache,
            "https://cdn.example.com/a/old.jpg",
            MediaKind::Image,
            b"aa",
            days_ago_millis(31),
        )
        .await;
        let fresh_image = plant_entry(
            &cache,
            "https://cdn.example.com/a/fresh.jpg",
            MediaKind::Image,
            b"bbb",
            days_ago_millis(1),
        )
        .await;
        let old_voice = plant_entry(
            &cache,
            "https://cdn.example.com/v/old.m4a",
            MediaKind::Voice,
            b"cccc",
            days_ago_millis(15),
        )
        .await;
        // 8 days is expired for video but fine for images
        let old_video = plant_entry(
            &cache,
            "https://cdn.example.com/m/old.mp4",
            MediaKind::Video,
            b"ddddd",
            days_ago_millis(8),
        )
        .await;

        let report = cache.sweep_expired().await;
        assert_eq!(report.cleaned, 3);
        assert_eq!(report.freed_bytes, 2 + 4 + 5);

        assert!(!old_image.exists());
        assert!(!old_voice.exists());
        assert!(!old_video.exists());
        assert!(fresh_image.exists());
        assert_eq!(cache.stats().await.total_items, 1);

        // idempotent: nothing left to sweep
        assert_eq!(cache.sweep_expired().await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_size_eviction_stops_at_hysteresis_target() {
        init_tracing();
        let dir = tempdir().unwrap();
        let config = CacheConfig::builder(dir.path())
            .with_max_total_bytes(1000)
            .with_evict_to_ratio(0.7)
            .build();
        let cache = MediaCache::new(config).await.unwrap();

        // five 300-byte entries, oldest first: total 1500 over the
        // 1000 ceiling; evicting a, b, c reaches 600 <= 700
        let body = [0u8; 300];
        let mut paths = Vec::new();
        for (name, age_days) in [("a", 50), ("b", 40), ("c", 30), ("d", 20), ("e", 10)] {
            let url = format!("https://cdn.example.com/m/{name}.jpg");
            paths.push(
                plant_entry(&cache, &url, MediaKind::Image, &body, days_ago_millis(age_days))
                    .await,
            );
        }

        let report = cache.enforce_size_limit().await;
        assert_eq!(report.cleaned, 3);
        assert_eq!(report.freed_bytes, 900);

        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
        assert!(!paths[2].exists());
        assert!(paths[3].exists());
        assert!(paths[4].exists());
        assert_eq!(cache.stats().await.total_bytes, 600);

        // under the ceiling now: a second pass is a no-op
        assert_eq!(cache.enforce_size_limit().await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_prune_missing_drops_dangling_entries() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        let kept = plant_entry(
            &cache,
            "https://cdn.example.com/a/kept.jpg",
            MediaKind::Image,
            b"kept",
            now_millis(),
        )
        .await;
        let gone = plant_entry(
            &cache,
            "https://cdn.example.com/a/gone.jpg",
            MediaKind::Image,
            b"gone",
            now_millis(),
        )
        .await;
        std::fs::remove_file(&gone).unwrap();

        assert_eq!(cache.prune_missing().await, 1);
        assert!(kept.exists());
        assert_eq!(cache.stats().await.total_items, 1);
        assert_eq!(cache.prune_missing().await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_resets_to_first_launch() {
        init_tracing();
        let server = MockServer::start().await;
        // one fetch before the reset, one after
        mount_media(&server, "/media/photo.jpg", b"jpegbytes", 2).await;

        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;
        let url = format!("{}/media/photo.jpg", server.uri());

        let path = cache
            .get_media(&url, MediaKind::Image)
            .await
            .unwrap()
            .local_path()
            .unwrap()
            .to_owned();
        assert!(path.exists());

        assert!(cache.clear_all().await);

        let stats = cache.stats().await;
        assert_eq!(stats.total_items, 0);
        assert_eq!(stats.total_bytes, 0);
        assert!(!path.exists());
        for kind in MediaKind::ALL {
            assert!(kind_dir(dir.path(), kind).is_dir());
        }

        // previously cached URL downloads fresh again
        let after = cache.get_media(&url, MediaKind::Image).await.unwrap();
        assert!(after.is_local());
    }

    #[tokio::test]
    async fn test_stats_breakdown_by_kind() {
        init_tracing();
        let dir = tempdir().unwrap();
        let cache = cache_at(dir.path()).await;

        plant_entry(
            &cache,
            "https://cdn.example.com/a/a.jpg",
            MediaKind::Image,
            b"12345",
            now_millis(),
        )
        .await;
        plant_entry(
            &cache,
            "https://cdn.example.com/a/b.jpg",
            MediaKind::Image,
            b"123",
            now_millis(),
        )
        .await;
        plant_entry(
            &cache,
            "https://cdn.example.com/v/v.m4a",
            MediaKind::Voice,
            b"1234567",
            now_millis(),
        )
        .await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.total_bytes, 15);
        assert_eq!(stats.kinds[&MediaKind::Image].items, 2);
        assert_eq!(stats.kinds[&MediaKind::Image].bytes, 8);
        assert_eq!(stats.kinds[&MediaKind::Voice].items, 1);
        assert_eq!(stats.kinds[&MediaKind::Voice].bytes, 7);
        // empty kinds are present, not absent
        assert_eq!(stats.kinds[&MediaKind::Video], KindStats::default());
        assert_eq!(stats.kinds[&MediaKind::VideoCircle], KindStats::default());
    }
}
