use crate::util::{append_lines, write_atomically};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Attempts allowed before a file is dead-lettered.
pub(crate) const MAX_RETRIES: u32 = 3;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct FailedEntry {
    #[serde(default)]
    pub(crate) retry_count: u32,
    #[serde(default)]
    pub(crate) last_error: String,
    #[serde(default)]
    pub(crate) last_attempt: String,
}

pub(crate) type FailedMap = BTreeMap<String, FailedEntry>;

#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerState {
    pub(crate) uploaded: HashSet<String>,
    pub(crate) failed: FailedMap,
}

impl LedgerState {
    pub(crate) fn retry_count(&self, file: &str) -> u32 {
        self.failed.get(file).map(|e| e.retry_count).unwrap_or(0)
    }

    pub(crate) fn dead_lettered(&self, max_retries: u32) -> usize {
        self.failed
            .iter()
            .filter(|(f, e)| e.retry_count >= max_retries && !self.uploaded.contains(*f))
            .count()
    }
}

/// How scanned files split against the ledger. Each list keeps scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Partition {
    pub(crate) new_files: Vec<String>,
    pub(crate) retry_files: Vec<String>,
    pub(crate) skipped: Vec<String>,
    pub(crate) dead_lettered: Vec<String>,
}

impl Partition {
    /// New files first, then retries.
    pub(crate) fn eligible(&self) -> Vec<String> {
        self.new_files
            .iter()
            .chain(self.retry_files.iter())
            .cloned()
            .collect()
    }
}

pub(crate) fn partition(candidates: &[String], state: &LedgerState, max_retries: u32) -> Partition {
    let mut p = Partition::default();
    for f in candidates {
        if state.uploaded.contains(f) {
            p.skipped.push(f.clone());
            continue;
        }
        match state.failed.get(f) {
            Some(entry) if entry.retry_count < max_retries => {
                debug!(
                    "Retry scheduled (attempt {}/{max_retries}): {f}",
                    entry.retry_count + 1
                );
                p.retry_files.push(f.clone());
            }
            Some(entry) => {
                warn!(
                    "Skipping {f}, failed {} times (last error: {})",
                    entry.retry_count, entry.last_error
                );
                p.dead_lettered.push(f.clone());
            }
            None => p.new_files.push(f.clone()),
        }
    }
    p
}

/// The pair of durable files recording what was uploaded and what failed.
#[derive(Debug, Clone)]
pub(crate) struct UploadLedger {
    uploaded_log: PathBuf,
    failed_log: PathBuf,
}

impl UploadLedger {
    pub(crate) fn new(uploaded_log: PathBuf, failed_log: PathBuf) -> Self {
        Self {
            uploaded_log,
            failed_log,
        }
    }

    pub(crate) fn load(&self) -> LedgerState {
        LedgerState {
            uploaded: load_uploaded(&self.uploaded_log),
            failed: load_failed(&self.failed_log),
        }
    }

    /// Append `newly_succeeded` to the uploaded log and rewrite the failed
    /// log without them. Write failures are logged, never returned.
    pub(crate) fn commit(&self, newly_succeeded: &[String], failed: &FailedMap) {
        if let Err(e) = append_lines(&self.uploaded_log, newly_succeeded) {
            error!("Unable to update uploaded log {:?}: {e:#}", self.uploaded_log);
        }
        let mut remaining = failed.clone();
        for f in newly_succeeded {
            remaining.remove(f);
        }
        if let Err(e) = write_failed(&self.failed_log, &remaining) {
            error!("Unable to update failed log {:?}: {e:#}", self.failed_log);
        }
        info!(
            "Ledger updated: {} newly uploaded, {} in failed log",
            newly_succeeded.len(),
            remaining.len()
        );
    }
}

fn load_uploaded(path: &Path) -> HashSet<String> {
    if !path.exists() {
        return HashSet::new();
    }
    match fs::read_to_string(path) {
        Ok(s) => s
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect(),
        Err(e) => {
            warn!("Unable to read uploaded log {path:?}: {e}");
            HashSet::new()
        }
    }
}

fn load_failed(path: &Path) -> FailedMap {
    if !path.exists() {
        return FailedMap::new();
    }
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!("Unable to read failed log {path:?}: {e}");
            return FailedMap::new();
        }
    };
    match serde_json::from_str(&text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed log {path:?} is not valid, starting with an empty one: {e}");
            FailedMap::new()
        }
    }
}

fn write_failed(path: &Path, failed: &FailedMap) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(failed).context("Unable to encode failed log")?;
    write_atomically(path, json.as_bytes())
}
