//! Spool files for oversized payloads
//!
//! Large or unknown-length response bodies are streamed into uniquely named
//! files under `{job-path}/temp` instead of being held in memory. The
//! producer that created a file deletes it once the writer is done with it;
//! a periodic sweep reclaims anything left behind by crashed or aborted
//! captures.

use crate::config::Config;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{File, OpenOptions};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Extension given to every spool file
const SPOOL_EXTENSION: &str = "temp";

/// Where spool files live and how orphans are swept
#[derive(Debug, Clone)]
pub struct SpoolSettings {
    pub dir: PathBuf,
    pub sweep_interval: Duration,
    pub grace_period: Duration,
}

impl SpoolSettings {
    /// Derives spool settings from the crawl configuration
    ///
    /// Spool files go to `{job-path}/temp`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.crawl.job_path.join("temp"),
            sweep_interval: Duration::from_secs(config.spool.sweep_interval_secs),
            grace_period: Duration::from_secs(config.spool.grace_period_secs),
        }
    }
}

/// The scratch directory spool files are allocated in
#[derive(Debug, Clone)]
pub struct SpoolDir {
    dir: PathBuf,
}

impl SpoolDir {
    /// Creates the directory if needed
    pub async fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Allocates a new, uniquely named spool file opened for writing
    ///
    /// The returned guard deletes the file when dropped, unless it was
    /// already removed through [`SpoolGuard::remove`].
    pub async fn allocate(&self) -> io::Result<(SpoolGuard, File)> {
        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4(), SPOOL_EXTENSION));

        // create_new refuses to reuse a name even if two UUIDs ever collide
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        tracing::trace!(path = %path.display(), "Allocated spool file");
        Ok((SpoolGuard { path, armed: true }, file))
    }
}

/// Ownership of one spool file
///
/// Dropping the guard removes the file synchronously, which covers error
/// paths and captures cancelled mid-flight.
#[derive(Debug)]
pub struct SpoolGuard {
    path: PathBuf,
    armed: bool,
}

impl SpoolGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file; a file that is already gone counts as removed
    pub async fn remove(mut self) -> io::Result<()> {
        self.armed = false;
        remove_spool_file(&self.path).await
    }
}

impl Drop for SpoolGuard {
    fn drop(&mut self) {
        if self.armed {
            let path = &self.path;
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed spool file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove spool file")
                }
            }
        }
    }
}

/// Removes a spool file, treating "already removed" as success
pub async fn remove_spool_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes regular files in `dir` last modified more than `grace` ago
///
/// Returns the number of files removed.
pub async fn sweep_once(dir: &Path, grace: Duration) -> io::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            // Deleted by its producer between read_dir and stat
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());

        if matches!(age, Some(age) if age > grace) {
            remove_spool_file(&entry.path()).await?;
            tracing::warn!(path = %entry.path().display(), "Swept orphaned spool file");
            removed += 1;
        }
    }

    Ok(removed)
}

/// Periodic orphan sweep, stopped explicitly at crawl teardown
pub struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns the sweep loop; the first sweep runs after one interval
    pub fn spawn(spool: SpoolDir, interval: Duration, grace: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval() fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match sweep_once(spool.path(), grace).await {
                            Ok(0) => {}
                            Ok(n) => tracing::info!(removed = n, "Spool sweep finished"),
                            Err(e) => tracing::error!(error = %e, "Spool sweep failed"),
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        Self { cancel, handle }
    }

    /// Stops the loop and waits for it to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Spool sweeper task failed");
        }
    }
}
