use crate::api::{
    ApiError, Credential, CredentialProvider, NewMediaItemResult, PhotoApi, UploadTokenRecord,
};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Most media items the library accepts in a single batch create call.
pub(crate) const MAX_BATCH_SIZE: usize = 50;

/// gRPC `ALREADY_EXISTS`.
const ALREADY_EXISTS_CODE: i32 = 6;

/// Tokens split by whether their media item now exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CommitOutcome {
    pub(crate) success: Vec<String>,
    pub(crate) failed: Vec<String>,
}

/// A batch item counts as committed when the service created the media
/// item, or refused only because the item is already there.
pub(crate) fn is_item_success(result: &NewMediaItemResult) -> bool {
    if result.media_item_id.is_some() {
        return true;
    }
    match result.status.code {
        Some(0) => true,
        Some(code) => is_already_present(code, &result.status.message),
        None => false,
    }
}

fn is_already_present(code: i32, message: &str) -> bool {
    let message = message.to_lowercase();
    code == ALREADY_EXISTS_CODE
        || message.contains("already exists")
        || message.contains("already associated")
}

pub(crate) struct BatchCommitter<'a> {
    api: &'a dyn PhotoApi,
    credentials: &'a dyn CredentialProvider,
}

impl<'a> BatchCommitter<'a> {
    pub(crate) fn new(api: &'a dyn PhotoApi, credentials: &'a dyn CredentialProvider) -> Self {
        Self { api, credentials }
    }

    /// Create media items for `items`, at most [`MAX_BATCH_SIZE`] per call,
    /// adding them to `album_name` when given. Chunks run one after another.
    pub(crate) fn commit(&self, items: &[UploadTokenRecord], album_name: Option<&str>) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();
        let chunk_count = items.len().div_ceil(MAX_BATCH_SIZE);
        for (i, chunk) in items.chunks(MAX_BATCH_SIZE).enumerate() {
            info!(
                "Creating media items, batch {}/{chunk_count} ({} items)",
                i + 1,
                chunk.len()
            );
            let chunk_outcome = self.commit_chunk(chunk, album_name);
            outcome.success.extend(chunk_outcome.success);
            outcome.failed.extend(chunk_outcome.failed);
        }
        info!(
            "Media item creation done: success={}, failed={}",
            outcome.success.len(),
            outcome.failed.len()
        );
        outcome
    }

    fn commit_chunk(&self, chunk: &[UploadTokenRecord], album_name: Option<&str>) -> CommitOutcome {
        let all_failed = || CommitOutcome {
            success: vec![],
            failed: chunk.iter().map(|i| i.token.clone()).collect(),
        };
        let Some(credential) = self.credentials.get_valid_credential() else {
            error!("No valid credential, {} items not created", chunk.len());
            return all_failed();
        };
        // looked up for every chunk, the album list is short
        let album_id = album_name.and_then(|name| self.resolve_album(name, &credential));
        match self
            .api
            .batch_create_media_items(chunk, album_id.as_deref(), &credential)
        {
            Ok(results) => classify(chunk, &results),
            Err(e) => {
                if matches!(e, ApiError::Unauthorized) {
                    self.credentials.invalidate();
                }
                error!("Batch create failed for {} items: {e}", chunk.len());
                all_failed()
            }
        }
    }

    /// Id of the album titled `name`, creating it when none of the albums
    /// visible to the account matches exactly.
    fn resolve_album(&self, name: &str, credential: &Credential) -> Option<String> {
        match self.api.list_albums(credential) {
            Ok(albums) => {
                if let Some(album) = albums.into_iter().find(|a| a.title == name) {
                    debug!("Using existing album {name:?} ({})", album.id);
                    return Some(album.id);
                }
            }
            Err(e) => {
                warn!("Unable to list albums, items will not be added to {name:?}: {e}");
                return None;
            }
        }
        match self.api.create_album(name, credential) {
            Ok(id) => {
                info!("Created album {name:?}");
                Some(id)
            }
            Err(e) => {
                warn!("Unable to create album {name:?}, items will not be added to it: {e}");
                None
            }
        }
    }
}

/// Match results to tokens by the echoed token, or by position when the
/// service doesn't echo them. Tokens without a result have failed.
fn classify(chunk: &[UploadTokenRecord], results: &[NewMediaItemResult]) -> CommitOutcome {
    let by_token: HashMap<&str, &NewMediaItemResult> = results
        .iter()
        .filter_map(|r| r.upload_token.as_deref().map(|t| (t, r)))
        .collect();
    let mut outcome = CommitOutcome::default();
    for (pos, item) in chunk.iter().enumerate() {
        let result = if by_token.is_empty() {
            results.get(pos)
        } else {
            by_token.get(item.token.as_str()).copied()
        };
        match result {
            Some(r) if is_item_success(r) => outcome.success.push(item.token.clone()),
            Some(r) => {
                warn!(
                    "Media item not created for {}: {}",
                    item.file_name, r.status.message
                );
                outcome.failed.push(item.token.clone());
            }
            None => {
                warn!("No result returned for {}", item.file_name);
                outcome.failed.push(item.token.clone());
            }
        }
    }
    outcome
}
