//! Spooled audio uploads.
//!
//! An upload is written to a uniquely named file and removed when the
//! [`TempUpload`] is dropped, whatever path the request takes out.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Monotonic counter to uniquify upload names across concurrent requests.
static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An upload on disk, owned by exactly one request.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    file_name: String,
    content_type: String,
    len: u64,
}

/// Why spooling an upload stopped.
#[derive(Debug)]
pub enum SpoolError {
    /// The upload exceeded the configured cap.
    TooLarge(usize),
    /// The client stream broke mid-upload.
    Body(String),
    Io(std::io::Error),
}

impl std::fmt::Display for SpoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpoolError::TooLarge(max) => write!(f, "Upload exceeds {max} bytes"),
            SpoolError::Body(e) => write!(f, "Upload interrupted: {e}"),
            SpoolError::Io(e) => write!(f, "Failed to store upload: {e}"),
        }
    }
}

impl std::error::Error for SpoolError {}

impl From<std::io::Error> for SpoolError {
    fn from(e: std::io::Error) -> Self {
        SpoolError::Io(e)
    }
}

/// Incremental writer for a [`TempUpload`]. The guard is created before the
/// first byte lands, so a failed spool still cleans up.
pub struct UploadWriter {
    upload: TempUpload,
    file: tokio::fs::File,
    max_bytes: usize,
}

impl UploadWriter {
    /// Create an empty spool file in `dir`.
    pub async fn create(
        dir: &Path,
        file_name: &str,
        content_type: &str,
        max_bytes: usize,
    ) -> Result<Self, SpoolError> {
        tokio::fs::create_dir_all(dir).await?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("upload-{millis}-{}-{seq}", std::process::id()));

        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            upload: TempUpload {
                path,
                file_name: sanitize_file_name(file_name),
                content_type: content_type.to_string(),
                len: 0,
            },
            file,
            max_bytes,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), SpoolError> {
        let new_len = self.upload.len + chunk.len() as u64;
        if new_len > self.max_bytes as u64 {
            return Err(SpoolError::TooLarge(self.max_bytes));
        }
        self.file.write_all(chunk).await?;
        self.upload.len = new_len;
        Ok(())
    }

    /// Flush and hand over the finished upload.
    pub async fn finish(mut self) -> Result<TempUpload, SpoolError> {
        self.file.flush().await?;
        Ok(self.upload)
    }
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove upload {}: {e}", self.path.display());
            }
        }
    }
}

/// Keep only the final path component and a conservative character set; the
/// name is only forwarded upstream as a hint.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        "recording.webm".to_string()
    } else {
        cleaned
    }
}
