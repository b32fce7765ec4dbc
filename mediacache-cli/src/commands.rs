use std::path::Path;

use mediacache_engine::{MediaCache, MediaKind, MediaSource};
use tracing::info;

use crate::error::AppError;
use crate::utils::format_bytes;

pub struct CommandExecutor {
    cache: MediaCache,
}

impl CommandExecutor {
    pub fn new(cache: MediaCache) -> Self {
        Self { cache }
    }

    /// Resolve one URL, printing the cached path or the fallback source
    pub async fn fetch(&self, url: &str, kind: MediaKind) -> Result<(), AppError> {
        match self.cache.get_media(url, kind).await {
            Some(MediaSource::Local(path)) => println!("{}", path.display()),
            Some(MediaSource::Direct(source)) => println!("{source}"),
            None => return Err(AppError::InvalidInput("empty URL".to_string())),
        }
        Ok(())
    }

    /// Warm the cache for many URLs, waiting for every download
    pub async fn prefetch(
        &self,
        urls: &[String],
        input: Option<&Path>,
        kind: MediaKind,
    ) -> Result<(), AppError> {
        let mut all = urls.to_vec();
        if let Some(input) = input {
            all.extend(read_url_file(input).await?);
        }
        if all.is_empty() {
            return Err(AppError::InvalidInput(
                "no URLs given; pass them as arguments or with --input".to_string(),
            ));
        }

        let fetches = all.iter().map(|url| self.cache.get_media(url, kind));
        let results = futures::future::join_all(fetches).await;

        let cached = results
            .iter()
            .filter(|resolved| matches!(resolved, Some(MediaSource::Local(_))))
            .count();
        info!(total = all.len(), cached, "prefetch complete");
        println!("{cached}/{} cached", all.len());
        Ok(())
    }

    /// Print totals and the per-kind breakdown
    pub async fn stats(&self, json: bool) -> Result<(), AppError> {
        let stats = self.cache.stats().await;
        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!(
            "{} items, {}",
            stats.total_items,
            format_bytes(stats.total_bytes)
        );
        for kind in MediaKind::ALL {
            let slot = stats.kinds.get(&kind).copied().unwrap_or_default();
            println!(
                "  {kind:<13} {:>5} items, {}",
                slot.items,
                format_bytes(slot.bytes)
            );
        }
        Ok(())
    }

    /// Run the housekeeping passes and print their reports
    pub async fn sweep(
        &self,
        prune: bool,
        max_age_only: bool,
        size_only: bool,
    ) -> Result<(), AppError> {
        if prune {
            let pruned = self.cache.prune_missing().await;
            println!("pruned {pruned} dangling entries");
        }
        if !size_only {
            let report = self.cache.sweep_expired().await;
            println!(
                "age sweep: removed {}, freed {}",
                report.cleaned,
                format_bytes(report.freed_bytes)
            );
        }
        if !max_age_only {
            let report = self.cache.enforce_size_limit().await;
            println!(
                "size eviction: removed {}, freed {}",
                report.cleaned,
                format_bytes(report.freed_bytes)
            );
        }
        Ok(())
    }

    /// Reset the cache to its first-launch state
    pub async fn clear(&self, yes: bool) -> Result<(), AppError> {
        if !yes {
            return Err(AppError::InvalidInput(
                "refusing to clear the cache without --yes".to_string(),
            ));
        }
        if self.cache.clear_all().await {
            println!("cache cleared");
            Ok(())
        } else {
            Err(AppError::Operation(
                "cache reset left residue, see mediacache.log".to_string(),
            ))
        }
    }
}

/// URLs from a file, one per line, skipping blanks and '#' comments
async fn read_url_file(path: &Path) -> Result<Vec<String>, AppError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}
