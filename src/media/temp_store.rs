//! Staging directory for synthesized audio.
//!
//! Files are named `audio_<session>_<epoch millis>.mp3` and live only until
//! they have been delivered. A background [`Sweeper`] reclaims anything a
//! crashed or failed conversion left behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::fs::{File, OpenOptions};

use crate::error::StorageError;
use crate::pipeline::SessionId;

/// Staging area on local disk. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an artifact of `session` created at `millis`.
    pub fn file_name_for(session: SessionId, millis: i64) -> String {
        format!("audio_{}_{}.mp3", session, millis)
    }

    /// Create the staging directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::PrepareDir {
                path: self.dir.display().to_string(),
                source,
            })
    }

    /// Create a fresh, empty file for `session` and open it for writing.
    ///
    /// The name is derived from the session and the current time. The file
    /// is created exclusively; if the name is taken the timestamp is bumped
    /// until creation succeeds.
    pub async fn allocate(&self, session: SessionId) -> Result<(PathBuf, File), StorageError> {
        self.ensure_dir().await?;

        let mut millis = Utc::now().timestamp_millis();
        loop {
            let path = self.dir.join(Self::file_name_for(session, millis));
            let created = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => millis += 1,
                Err(source) => {
                    return Err(StorageError::Create {
                        path: path.display().to_string(),
                        source,
                    });
                }
            }
        }
    }

    /// Delete a staged file. Returns `false` if it was already gone.
    pub async fn delete(&self, path: &Path) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Cleaned up temp file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Delete {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Delete every file in the staging directory.
    pub async fn sweep_all(&self) -> Result<usize, StorageError> {
        self.sweep(None).await
    }

    /// Delete files whose last modification is at least `min_age` ago.
    ///
    /// Used by the periodic sweeper so that files still being written by an
    /// in-flight conversion are left alone.
    pub async fn sweep_older_than(&self, min_age: Duration) -> Result<usize, StorageError> {
        self.sweep(Some(min_age)).await
    }

    async fn sweep(&self, min_age: Option<Duration>) -> Result<usize, StorageError> {
        let list_err = |source| StorageError::List {
            path: self.dir.display().to_string(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(list_err(e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Removed by someone else since the listing.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(list_err(e)),
            };
            if !metadata.is_file() {
                continue;
            }

            if let Some(min_age) = min_age {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age < min_age {
                    continue;
                }
            }

            let path = entry.path();
            match self.delete(&path).await {
                Ok(true) => {
                    tracing::debug!(file = %entry.file_name().to_string_lossy(), "Swept temp file");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to sweep temp file"),
            }
        }

        Ok(removed)
    }
}

/// Configuration for the periodic sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often to sweep.
    pub interval: Duration,
    /// Only files at least this old are deleted.
    pub min_age: Duration,
    /// Whether sweeping is enabled.
    pub enabled: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            min_age: Duration::from_secs(600),
            enabled: true,
        }
    }
}

/// Background task that periodically sweeps a [`TempStore`].
pub struct Sweeper {
    store: TempStore,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(store: TempStore, config: SweepConfig) -> Self {
        Self { store, config }
    }

    /// Run one sweep pass, returning the number of files removed.
    pub async fn sweep_once(&self) -> Result<usize, StorageError> {
        self.store.sweep_older_than(self.config.min_age).await
    }

    /// Start the sweeping background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                tracing::info!("Temp file sweeping is disabled");
                return;
            }

            tracing::info!(
                interval_secs = self.config.interval.as_secs(),
                min_age_secs = self.config.min_age.as_secs(),
                dir = %self.store.dir().display(),
                "Temp file sweeper started"
            );

            let mut timer = tokio::time::interval(self.config.interval);
            // The first tick completes immediately; skip it so the first
            // sweep happens one interval after startup.
            timer.tick().await;
            loop {
                timer.tick().await;
                match self.sweep_once().await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "Swept orphaned temp files");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Temp file sweep failed"),
                }
            }
        })
    }
}
