use crate::config::AppPaths;
use crate::ledger::{MAX_RETRIES, UploadLedger};
use crate::progress::{clear_progress, read_progress};
use tracing::info;

pub(crate) fn main(paths: &AppPaths) -> anyhow::Result<()> {
    for line in report(paths) {
        println!("{line}");
    }
    Ok(())
}

/// Human readable summary of the progress file and the ledger.
pub(crate) fn report(paths: &AppPaths) -> Vec<String> {
    let mut lines = vec![];
    match read_progress(&paths.progress_file) {
        Ok(Some(p)) => {
            lines.push(format!("Album: {}", p.album_name));
            lines.push(p.to_string());
            if let Some(message) = &p.message {
                lines.push(message.clone());
            }
        }
        Ok(None) => lines.push("No upload progress recorded".to_string()),
        // the uploader may be rewriting it
        Err(e) => lines.push(format!("Progress unreadable right now: {e:#}")),
    }
    let state = UploadLedger::new(paths.uploaded_log.clone(), paths.failed_log.clone()).load();
    let dead = state.dead_lettered(MAX_RETRIES);
    lines.push(format!("Uploaded files: {}", state.uploaded.len()));
    lines.push(format!("Failed files: {} ({dead} given up)", state.failed.len()));
    lines
}

pub(crate) fn clear(paths: &AppPaths) -> anyhow::Result<()> {
    if clear_progress(&paths.progress_file)? {
        info!("Removed {:?}", paths.progress_file);
    } else {
        info!("No progress file at {:?}", paths.progress_file);
    }
    Ok(())
}
