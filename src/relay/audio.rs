//! Synthesized reply audio on disk.
//!
//! [`AudioStore`] hands out timestamp-named files in a private directory and
//! resolves client-supplied names back to paths. [`DeletionScheduler`] removes
//! them after a delay; on shutdown every pending deletion runs immediately
//! instead of being dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "reply-";

/// Path prefix under which issued files are fetched.
pub const AUDIO_ROUTE_PREFIX: &str = "/api/audio/";

/// Directory of synthesized audio files.
pub struct AudioStore {
    dir: PathBuf,
    counter: AtomicU64,
}

impl AudioStore {
    /// Create the directory if needed.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a new file name with the given extension. The file itself is
    /// created by the caller.
    pub fn allocate(&self, extension: &str) -> (String, PathBuf) {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        // Counter disambiguates files created within the same millisecond.
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let ext = extension.trim_start_matches('.');
        let name = format!("{FILE_PREFIX}{millis}-{seq}.{ext}");
        let path = self.dir.join(&name);
        (name, path)
    }

    /// Map a client-supplied name to a path inside the store, or `None` if the
    /// name could not have been issued by [`AudioStore::allocate`].
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let well_formed = name.starts_with(FILE_PREFIX)
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.contains("..");
        well_formed.then(|| self.dir.join(name))
    }

    /// URL the client uses to fetch `name`.
    pub fn url_for(name: &str) -> String {
        format!("{AUDIO_ROUTE_PREFIX}{name}")
    }

    /// Remove audio left behind by a previous process. Returns the count.
    pub fn sweep_stale(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(FILE_PREFIX)
                && std::fs::remove_file(entry.path()).is_ok()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {removed} stale audio file(s) from {}", self.dir.display());
        }
        removed
    }
}

/// Delayed, best-effort file deletion tied to server shutdown.
#[derive(Clone)]
pub struct DeletionScheduler {
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl DeletionScheduler {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Delete `path` after `delay`, or as soon as shutdown begins.
    pub fn schedule(&self, path: PathBuf, delay: Duration) {
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => {}
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Deleted {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete {}: {e}", path.display()),
            }
        });
    }

    /// Number of deletions still waiting.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Run every pending deletion now and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for DeletionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_names_are_unique_and_resolvable() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let (a, path_a) = store.allocate("mp3");
        let (b, _) = store.allocate(".mp3");
        assert_ne!(a, b);
        assert!(b.ends_with(".mp3") && !b.ends_with("..mp3"));
        assert_eq!(store.resolve(&a), Some(path_a));
    }

    #[test]
    fn foreign_names_do_not_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        for name in [
            "../etc/passwd",
            "reply-1/../../x",
            "reply-..mp3",
            "notes.txt",
            "reply-1 2.mp3",
            "",
        ] {
            assert!(store.resolve(name).is_none(), "{name:?} resolved");
        }
    }

    #[test]
    fn sweep_removes_only_issued_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).unwrap();
        let (_, path) = store.allocate("mp3");
        std::fs::write(&path, b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"y").unwrap();
        assert_eq!(store.sweep_stale(), 1);
        assert!(!path.exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn scheduled_file_is_deleted_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reply-1-0.mp3");
        std::fs::write(&path, b"x").unwrap();

        let scheduler = DeletionScheduler::new();
        scheduler.schedule(path.clone(), Duration::from_millis(100));
        assert!(path.exists());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!path.exists());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reply-2-0.mp3");
        std::fs::write(&path, b"x").unwrap();

        let scheduler = DeletionScheduler::new();
        scheduler.schedule(path.clone(), Duration::from_secs(3600));
        scheduler.shutdown().await;
        assert!(!path.exists());
    }
}
