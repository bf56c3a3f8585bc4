use crate::api::{CredentialProvider, PhotoApi, UploadTokenRecord};
use crate::batch_committer::{BatchCommitter, CommitOutcome};
use crate::ledger::{FailedEntry, FailedMap, MAX_RETRIES, UploadLedger, partition};
use crate::progress::ProgressPublisher;
use crate::scanner::{file_name, most_recent, scan};
use crate::token_uploader::{TokenUploader, UploadRecord};
use crate::util::attempt_timestamp;
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, warn};

pub(crate) const DEFAULT_ALBUM: &str = "Photo Uploader";

/// Files listed in the progress snapshot when there is nothing to upload.
pub(crate) const IDLE_PREVIEW_LIMIT: usize = 100;

const TOKEN_FAILED: &str = "TOKEN_FAILED";
const BATCH_FAILED: &str = "BATCH_FAILED";

/// What one run settled on once both upload phases are over.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RunSummary {
    pub(crate) succeeded: Vec<String>,
    /// The whole failed map to persist, prior entries included.
    pub(crate) failed: FailedMap,
    pub(crate) failed_this_run: usize,
}

/// Combine the byte upload results with the batch outcome. A file that got a
/// token but no media item has failed once, not twice.
pub(crate) fn reconcile(records: &[UploadRecord], committed: &CommitOutcome, prior: &FailedMap) -> RunSummary {
    let committed_tokens: HashSet<&str> = committed.success.iter().map(|t| t.as_str()).collect();
    let mut summary = RunSummary {
        failed: prior.clone(),
        ..Default::default()
    };
    for r in records {
        let last_attempt = r.last_attempt.clone().unwrap_or_else(attempt_timestamp);
        match (&r.token, r.success) {
            (Some(token), true) if committed_tokens.contains(token.as_str()) => {
                summary.succeeded.push(r.file.clone());
            }
            (_, true) => {
                summary.failed.insert(
                    r.file.clone(),
                    FailedEntry {
                        retry_count: r.retry_count + 1,
                        last_error: BATCH_FAILED.to_string(),
                        last_attempt,
                    },
                );
                summary.failed_this_run += 1;
            }
            (_, false) => {
                let last_error = match &r.last_error {
                    Some(e) => format!("{TOKEN_FAILED}: {e}"),
                    None => TOKEN_FAILED.to_string(),
                };
                summary.failed.insert(
                    r.file.clone(),
                    FailedEntry {
                        retry_count: r.retry_count,
                        last_error,
                        last_attempt,
                    },
                );
                summary.failed_this_run += 1;
            }
        }
    }
    for f in &summary.succeeded {
        summary.failed.remove(f);
    }
    summary
}

/// One upload pass over a media directory: scan, filter through the ledger,
/// upload bytes in parallel, create media items in batches, then persist the
/// ledger and the final progress.
pub(crate) struct UploadOrchestrator<'a> {
    api: &'a dyn PhotoApi,
    credentials: &'a dyn CredentialProvider,
    ledger: &'a UploadLedger,
    progress: &'a ProgressPublisher,
    album_name: Option<String>,
    max_retries: u32,
    terminal: ProgressBar,
}

impl<'a> UploadOrchestrator<'a> {
    pub(crate) fn new(
        api: &'a dyn PhotoApi,
        credentials: &'a dyn CredentialProvider,
        ledger: &'a UploadLedger,
        progress: &'a ProgressPublisher,
    ) -> Self {
        Self {
            api,
            credentials,
            ledger,
            progress,
            album_name: None,
            max_retries: MAX_RETRIES,
            terminal: ProgressBar::hidden(),
        }
    }

    pub(crate) fn with_album(mut self, album_name: Option<String>) -> Self {
        self.album_name = album_name;
        self
    }

    pub(crate) fn with_terminal(mut self, bar: ProgressBar) -> Self {
        self.terminal = bar;
        self
    }

    /// True when at least one file ended up in the photo library.
    pub(crate) fn run(&self, media_root: &Path) -> bool {
        let album = self.album_name.as_deref().unwrap_or(DEFAULT_ALBUM);

        let discovered = scan(media_root);
        info!("Found {} media files in {media_root:?}", discovered.len());

        let state = self.ledger.load();
        let split = partition(&discovered, &state, self.max_retries);
        let eligible = split.eligible();
        if eligible.is_empty() {
            let message = if discovered.is_empty() {
                "No photos or videos found"
            } else {
                "No new photos or videos to upload"
            };
            info!("{message} in {media_root:?}");
            let preview = most_recent(&discovered, IDLE_PREVIEW_LIMIT);
            self.progress.publish_idle(album, &preview, message);
            return false;
        }
        info!(
            "{} new, {} to retry, {} already uploaded, {} given up on",
            split.new_files.len(),
            split.retry_files.len(),
            split.skipped.len(),
            split.dead_lettered.len()
        );

        if self.credentials.get_valid_credential().is_none() {
            error!("Authentication failed, nothing was uploaded");
            self.progress
                .publish_idle(album, &eligible, "Authentication failed, nothing was uploaded");
            return false;
        }

        self.progress.init(eligible.len(), album, &eligible);
        self.terminal.set_length(eligible.len() as u64);

        let uploader = TokenUploader::new(self.api, self.credentials);
        let records = match uploader.upload_all(&eligible, &state, |results| {
            self.progress.update_partial(results, false);
            self.terminal.inc(1);
        }) {
            Ok(records) => records,
            Err(e) => {
                error!("Upload aborted: {e:#}");
                self.terminal.abandon();
                self.progress.finalize(0, eligible.len(), &eligible);
                return false;
            }
        };
        self.terminal.finish_and_clear();

        let committed = self.commit(&records, album);
        let summary = reconcile(&records, &committed, &state.failed);

        // only after every worker has joined
        self.ledger.commit(&summary.succeeded, &summary.failed);
        self.progress
            .finalize(summary.succeeded.len(), summary.failed_this_run, &eligible);

        info!(
            "Upload finished: success={}, failed={}",
            summary.succeeded.len(),
            summary.failed_this_run
        );
        !summary.succeeded.is_empty()
    }

    fn commit(&self, records: &[UploadRecord], album: &str) -> CommitOutcome {
        let items: Vec<UploadTokenRecord> = records
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| {
                r.token.as_ref().map(|token| UploadTokenRecord {
                    token: token.clone(),
                    file_name: file_name(&r.file),
                })
            })
            .collect();
        if items.is_empty() {
            warn!("No file uploaded successfully, skipping media item creation");
            return CommitOutcome::default();
        }
        info!("{} files uploaded, creating media items", items.len());
        BatchCommitter::new(self.api, self.credentials).commit(&items, Some(album))
    }
}
