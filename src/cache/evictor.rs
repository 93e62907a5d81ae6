use super::sync::CommandSync;
use crate::error::CacheError;
use crate::sound::ClipReservations;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A file in the sound cache, as found by a directory scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// Result of one eviction pass
#[derive(Debug, Clone, Default)]
pub struct EvictionReport {
    pub size_before: u64,
    pub final_size: u64,
    pub files_deleted: usize,
    pub bytes_freed: u64,
    /// Deleted files, oldest first
    pub deleted: Vec<PathBuf>,
    /// Candidates left alone because they were playing
    pub skipped_reserved: usize,
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl EvictionReport {
    pub fn within_cap(&self, cap_bytes: u64) -> bool {
        self.final_size <= cap_bytes
    }
}

/// Keeps the sound cache under a byte cap, deleting oldest files first
pub struct CacheEvictor {
    directory: PathBuf,
    cap_bytes: u64,
    reservations: ClipReservations,
    sync: Option<CommandSync>,
}

impl CacheEvictor {
    pub fn new<P: Into<PathBuf>>(
        directory: P,
        cap_bytes: u64,
        reservations: ClipReservations,
    ) -> Self {
        Self {
            directory: directory.into(),
            cap_bytes,
            reservations,
            sync: None,
        }
    }

    pub fn with_sync(mut self, sync: CommandSync) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn cap_bytes(&self) -> u64 {
        self.cap_bytes
    }

    /// Spawn the periodic sync + evict task. The first pass runs immediately.
    pub fn start(self: Arc<Self>, period: Duration, token: CancellationToken) -> JoinHandle<()> {
        info!(
            "Starting cache evictor for {} (cap {} bytes, every {:?})",
            self.directory.display(),
            self.cap_bytes,
            period
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Cache evictor stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        // A pass (and its sync child) is dropped on cancel
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!("Cache evictor stopping mid-pass");
                                break;
                            }
                            _ = self.run_pass() => {}
                        }
                    }
                }
            }
        })
    }

    /// Sync new clips, then evict down to the cap. Errors are logged and
    /// the next scheduled pass tries again.
    pub async fn run_pass(&self) -> Option<EvictionReport> {
        if let Some(sync) = &self.sync {
            if let Err(e) = sync.run().await {
                error!("Sound sync failed: {}", e);
            }
        }

        match self.evict().await {
            Ok(report) => {
                if report.files_deleted > 0 || !report.errors.is_empty() {
                    info!(
                        "Eviction pass: {} files deleted, {} bytes freed, {} -> {} bytes, took {:?}",
                        report.files_deleted,
                        report.bytes_freed,
                        report.size_before,
                        report.final_size,
                        report.duration
                    );
                } else {
                    debug!("Eviction pass: cache at {} bytes, nothing to do", report.final_size);
                }
                if !report.errors.is_empty() {
                    warn!("Eviction completed with {} errors: {:?}", report.errors.len(), report.errors);
                }
                if !report.within_cap(self.cap_bytes) {
                    warn!(
                        "Cache still over cap after eviction ({} > {} bytes)",
                        report.final_size, self.cap_bytes
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!("Eviction failed: {}", e);
                None
            }
        }
    }

    /// Delete oldest files until the directory is within the cap
    pub async fn evict(&self) -> Result<EvictionReport, CacheError> {
        let start = Instant::now();
        let mut entries = scan_cache(&self.directory).await?;

        let size_before: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let mut report = EvictionReport {
            size_before,
            final_size: size_before,
            ..EvictionReport::default()
        };

        if size_before <= self.cap_bytes {
            report.duration = start.elapsed();
            return Ok(report);
        }

        // Oldest first; ties broken by name so passes are deterministic
        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        for entry in entries {
            if report.final_size <= self.cap_bytes {
                break;
            }

            if self.reservations.is_reserved(&entry.path) {
                debug!("Skipping {} (in use)", entry.path.display());
                report.skipped_reserved += 1;
                continue;
            }

            match fs::remove_file(&entry.path).await {
                Ok(()) => {
                    debug!(
                        "Evicted {} ({} bytes)",
                        entry.path.display(),
                        entry.size_bytes
                    );
                    report.final_size -= entry.size_bytes;
                    report.bytes_freed += entry.size_bytes;
                    report.files_deleted += 1;
                    report.deleted.push(entry.path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Removed by someone else since the scan
                    report.final_size -= entry.size_bytes;
                }
                Err(e) => {
                    let message = format!("Failed to delete {}: {}", entry.path.display(), e);
                    warn!("{}", message);
                    report.errors.push(message);
                }
            }
        }

        report.duration = start.elapsed();
        Ok(report)
    }
}

/// Regular files directly inside `directory`. A missing directory is empty.
pub async fn scan_cache(directory: &Path) -> Result<Vec<CacheEntry>, CacheError> {
    let io_error = |source| CacheError::Io {
        path: directory.display().to_string(),
        source,
    };

    let mut read_dir = match fs::read_dir(directory).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(io_error)? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                // Vanished between listing and stat
                debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        entries.push(CacheEntry {
            path: entry.path(),
            size_bytes: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    Ok(entries)
}
