use crate::token_uploader::UploadRecord;
use crate::util::write_atomically;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Snapshot of a run, read by the slideshow process.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct UploadProgress {
    pub(crate) total: usize,
    pub(crate) success: usize,
    pub(crate) failed: usize,
    pub(crate) completed: bool,
    #[serde(default)]
    pub(crate) files: Vec<String>,
    #[serde(default)]
    pub(crate) album_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl UploadProgress {
    pub(crate) fn done(&self) -> usize {
        self.success + self.failed
    }
}

impl Display for UploadProgress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let current = self.done();
        let progress_bar_char_width = 19; // plus one for arrow head

        let pos = if self.total == 0 {
            0
        } else {
            (progress_bar_char_width * current / self.total).min(progress_bar_char_width)
        };

        let bar_done = "=".repeat(pos);
        let bar_not_done = " ".repeat(progress_bar_char_width - pos);
        let x_of_y = format!("{} of {}", current, self.total);
        write!(f, "[{bar_done}>{bar_not_done}] {x_of_y}")?;
        if self.failed > 0 {
            write!(f, " ({} failed)", self.failed)?;
        }
        if self.completed {
            write!(f, " done")?;
        }
        Ok(())
    }
}

/// Writes [`UploadProgress`] snapshots as whole-file JSON replacements.
///
/// Every write is best effort: failures are logged at debug level and never
/// reach the caller. The internal lock serializes read-modify-write cycles
/// from concurrent workers.
pub(crate) struct ProgressPublisher {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProgressPublisher {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn init(&self, total: usize, album_name: &str, files: &[String]) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(&UploadProgress {
            total,
            success: 0,
            failed: 0,
            completed: false,
            files: files.to_vec(),
            album_name: album_name.to_string(),
            message: None,
        });
    }

    /// Refresh the counters from the results collected so far.
    ///
    /// A snapshot that would already account for every file is not written
    /// unless `completed` is set, the final tally belongs to [`Self::finalize`].
    pub(crate) fn update_partial(&self, results: &[UploadRecord], completed: bool) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut data) = self.read() else {
            debug!("No progress file to update at {:?}", self.path);
            return;
        };
        let success = results.iter().filter(|r| r.success).count();
        let failed = results.len() - success;
        if !completed && data.total > 0 && success + failed >= data.total {
            debug!("All {} uploads reported, leaving the tally to finalize", data.total);
            return;
        }
        data.success = success;
        data.failed = failed;
        data.completed = completed;
        self.write(&data);
    }

    pub(crate) fn finalize(&self, success: usize, failed: usize, files: &[String]) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let album_name = self.read().map(|p| p.album_name).unwrap_or_default();
        self.write(&UploadProgress {
            total: success + failed,
            success,
            failed,
            completed: true,
            files: files.to_vec(),
            album_name,
            message: None,
        });
    }

    /// Snapshot for a run that uploads nothing, so the viewer still has
    /// files to show and a reason.
    pub(crate) fn publish_idle(&self, album_name: &str, files: &[String], message: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(&UploadProgress {
            total: files.len(),
            success: 0,
            failed: 0,
            completed: false,
            files: files.to_vec(),
            album_name: album_name.to_string(),
            message: Some(message.to_string()),
        });
    }

    fn read(&self) -> Option<UploadProgress> {
        read_progress(&self.path).unwrap_or_else(|e| {
            debug!("Unable to read progress file: {e:#}");
            None
        })
    }

    fn write(&self, data: &UploadProgress) {
        let result = serde_json::to_vec(data)
            .context("Unable to encode progress")
            .and_then(|bytes| write_atomically(&self.path, &bytes));
        if let Err(e) = result {
            debug!("Unable to write progress file {:?}: {e:#}", self.path);
        }
    }
}

/// Current snapshot, `None` when there is no progress file.
pub(crate) fn read_progress(path: &Path) -> anyhow::Result<Option<UploadProgress>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).with_context(|| format!("Unable to read {path:?}"))?;
    let progress =
        serde_json::from_str(&text).with_context(|| format!("Unable to parse {path:?}"))?;
    Ok(Some(progress))
}

/// Remove the progress file, true if there was one.
pub(crate) fn clear_progress(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path).with_context(|| format!("Unable to remove {path:?}"))?;
    Ok(true)
}
