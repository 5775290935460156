// src/exec/persist.rs

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::exec::round::RoundError;

/// Round log writer.
///
/// Output is appended to `<log>.swp` as it arrives and moved over `<log>`
/// with a single rename once the round's streams are fully drained, so the
/// canonical log only ever holds a complete round.
#[derive(Debug)]
pub struct LogPersister {
    canonical: PathBuf,
    swap: PathBuf,
    file: Mutex<File>,
    intact: AtomicBool,
}

impl LogPersister {
    /// Create (or truncate) the swap file next to `canonical`.
    pub async fn create(canonical: &Path) -> Result<Self, RoundError> {
        let swap = swap_path(canonical);
        let file = File::create(&swap)
            .await
            .map_err(|error| RoundError::CreateLog {
                path: swap.clone(),
                error,
            })?;
        debug!(swap = %swap.display(), "opened round log");

        Ok(Self {
            canonical: canonical.to_path_buf(),
            swap,
            file: Mutex::new(file),
            intact: AtomicBool::new(true),
        })
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    pub fn swap_path(&self) -> &Path {
        &self.swap
    }

    /// Append raw bytes and flush them to the OS before returning.
    ///
    /// A failed write marks the log as incomplete; it will not be published.
    pub async fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().await;
        let res: io::Result<()> = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if res.is_err() {
            self.intact.store(false, Ordering::SeqCst);
        }
        res
    }

    /// Whether every append so far succeeded.
    pub fn is_intact(&self) -> bool {
        self.intact.load(Ordering::SeqCst)
    }

    /// Atomically replace the canonical log with the swap file.
    pub async fn publish(&self) -> io::Result<()> {
        // Hold the lock so no late append can land after the rename.
        let mut file = self.file.lock().await;
        file.flush().await?;
        fs::rename(&self.swap, &self.canonical).await.map_err(|e| {
            warn!(
                swap = %self.swap.display(),
                canonical = %self.canonical.display(),
                error = %e,
                "failed to publish round log"
            );
            e
        })?;
        debug!(canonical = %self.canonical.display(), "published round log");
        Ok(())
    }
}

/// `/tmp/test.log` → `/tmp/test.log.swp`
pub fn swap_path(canonical: &Path) -> PathBuf {
    let mut name = OsString::from(canonical.as_os_str());
    name.push(".swp");
    PathBuf::from(name)
}
