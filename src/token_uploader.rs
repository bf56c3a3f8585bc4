use crate::api::{ApiError, CredentialProvider, PhotoApi};
use crate::file_type::mime_type;
use crate::ledger::LedgerState;
use crate::util::attempt_timestamp;
use anyhow::{Context, anyhow};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Upper bound on concurrent byte uploads.
pub(crate) const MAX_WORKERS: usize = 5;

pub(crate) fn worker_count() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    MAX_WORKERS.min(cpus).max(1)
}

/// Outcome of the byte upload for one file during one run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UploadRecord {
    pub(crate) file: String,
    pub(crate) token: Option<String>,
    pub(crate) success: bool,
    /// Attempts so far including this one when it failed, the prior count
    /// when it succeeded.
    pub(crate) retry_count: u32,
    pub(crate) last_error: Option<String>,
    pub(crate) last_attempt: Option<String>,
}

impl UploadRecord {
    fn succeeded(file: &str, token: String, prior_retries: u32) -> Self {
        Self {
            file: file.to_string(),
            token: Some(token),
            success: true,
            retry_count: prior_retries,
            last_error: None,
            last_attempt: Some(attempt_timestamp()),
        }
    }

    fn failed(file: &str, prior_retries: u32, error: String) -> Self {
        Self {
            file: file.to_string(),
            token: None,
            success: false,
            retry_count: prior_retries + 1,
            last_error: Some(error),
            last_attempt: Some(attempt_timestamp()),
        }
    }
}

pub(crate) struct TokenUploader<'a> {
    api: &'a dyn PhotoApi,
    credentials: &'a dyn CredentialProvider,
}

impl<'a> TokenUploader<'a> {
    pub(crate) fn new(api: &'a dyn PhotoApi, credentials: &'a dyn CredentialProvider) -> Self {
        Self { api, credentials }
    }

    /// Upload the bytes of one file and return its upload token. An error
    /// only concerns this file, callers carry on with the others.
    pub(crate) fn upload_token(&self, file_path: &str) -> anyhow::Result<String> {
        let credential = self
            .credentials
            .get_valid_credential()
            .ok_or_else(|| anyhow!("no valid credential"))?;
        let path = Path::new(file_path);
        let bytes = fs::read(path).with_context(|| format!("Unable to read {path:?}"))?;
        let mime = mime_type(path);
        debug!("Uploading {} bytes ({mime}): {file_path}", bytes.len());
        match self.api.upload_bytes(bytes, mime, &credential) {
            Ok(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    return Err(anyhow!("empty upload token"));
                }
                Ok(token)
            }
            Err(ApiError::Unauthorized) => {
                // force a refresh for the next file
                self.credentials.invalidate();
                Err(ApiError::Unauthorized.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn upload_one(&self, file_path: &str, prior_retries: u32) -> UploadRecord {
        match self.upload_token(file_path) {
            Ok(token) => UploadRecord::succeeded(file_path, token, prior_retries),
            Err(e) => UploadRecord::failed(file_path, prior_retries, format!("{e:#}")),
        }
    }

    /// Upload every file on a pool of [`worker_count`] threads.
    ///
    /// `on_result` runs after each completion with everything collected so
    /// far. It runs while the collector is locked, so successive calls see
    /// strictly growing slices. Order of the returned records is completion
    /// order.
    pub(crate) fn upload_all<F>(
        &self,
        files: &[String],
        ledger: &LedgerState,
        on_result: F,
    ) -> anyhow::Result<Vec<UploadRecord>>
    where
        F: Fn(&[UploadRecord]) + Sync,
    {
        let workers = worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("upload-{i}"))
            .build()
            .context("Unable to start upload workers")?;
        info!("Uploading {} files with {workers} workers", files.len());

        let total = files.len();
        let collected: Mutex<Vec<UploadRecord>> = Mutex::new(Vec::with_capacity(total));
        let collected_ref = &collected;
        let on_result = &on_result;
        pool.scope(|s| {
            for file in files {
                s.spawn(move |_| {
                    let record = self.upload_one(file, ledger.retry_count(file));
                    let Ok(mut results) = collected_ref.lock() else {
                        error!("Upload result collector poisoned, dropping result for {file}");
                        return;
                    };
                    if record.success {
                        info!("Uploaded ({}/{total}): {file}", results.len() + 1);
                    } else {
                        warn!(
                            "Upload failed ({}/{total}): {file}: {}",
                            results.len() + 1,
                            record.last_error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    results.push(record);
                    on_result(&results);
                });
            }
        });
        collected
            .into_inner()
            .map_err(|e| anyhow!("Upload result collector poisoned: {e}"))
    }
}
