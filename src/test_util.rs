#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static INIT: Once = Once::new();

#[cfg(test)]
pub(crate) fn setup_log() {
    INIT.call_once(|| {
        use tracing::Level;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let filter = tracing_subscriber::filter::Targets::new()
            .with_default(Level::DEBUG)
            .with_target("reqwest", Level::ERROR)
            .with_target("rustls", Level::ERROR);
        let registry_layer = tracing_subscriber::fmt::layer().with_target(false);
        tracing_subscriber::registry()
            .with(registry_layer)
            .with(filter)
            .init();
    });
}

#[cfg(test)]
pub(crate) use fakes::*;

#[cfg(test)]
mod fakes {
    use crate::api::{
        AlbumInfo, ApiError, Credential, CredentialProvider, ItemStatus, NewMediaItemResult,
        PhotoApi, UploadTokenRecord,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// File content that makes the fake refuse the byte upload.
    pub(crate) const FAIL_UPLOAD: &str = "fail-upload";
    /// File content answered with an authorization error.
    pub(crate) const REJECT_AUTH: &str = "reject-auth";
    /// File content whose token is rejected at batch create time.
    pub(crate) const FAIL_COMMIT: &str = "fail-commit";
    /// File content whose token is reported as already in the album.
    pub(crate) const ALREADY_THERE: &str = "already-there";

    /// In-memory photo library. Behaviour is scripted by the uploaded bytes,
    /// see the constants above.
    #[derive(Default)]
    pub(crate) struct FakePhotoApi {
        pub(crate) uploads: AtomicUsize,
        pub(crate) batch_sizes: Mutex<Vec<usize>>,
        pub(crate) batch_album_ids: Mutex<Vec<Option<String>>>,
        pub(crate) albums: Mutex<Vec<AlbumInfo>>,
        pub(crate) list_calls: AtomicUsize,
        pub(crate) create_calls: AtomicUsize,
        pub(crate) fail_batches: AtomicBool,
        pub(crate) fail_album_lookup: AtomicBool,
        pub(crate) echo_tokens: AtomicBool,
    }

    impl FakePhotoApi {
        pub(crate) fn new() -> Self {
            let api = Self::default();
            api.echo_tokens.store(true, Ordering::SeqCst);
            api
        }

        pub(crate) fn with_album(self, id: &str, title: &str) -> Self {
            if let Ok(mut albums) = self.albums.lock() {
                albums.push(AlbumInfo {
                    id: id.to_string(),
                    title: title.to_string(),
                });
            }
            self
        }

        pub(crate) fn batch_sizes(&self) -> Vec<usize> {
            self.batch_sizes.lock().map(|v| v.clone()).unwrap_or_default()
        }
    }

    impl PhotoApi for FakePhotoApi {
        fn upload_bytes(
            &self,
            bytes: Vec<u8>,
            _mime_type: &str,
            _credential: &Credential,
        ) -> Result<String, ApiError> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            if bytes == FAIL_UPLOAD.as_bytes() {
                return Err(ApiError::Status {
                    status: 500,
                    body: "upload rejected".to_string(),
                });
            }
            if bytes == REJECT_AUTH.as_bytes() {
                return Err(ApiError::Unauthorized);
            }
            Ok(format!("token-{n}-{}", String::from_utf8_lossy(&bytes)))
        }

        fn batch_create_media_items(
            &self,
            items: &[UploadTokenRecord],
            album_id: Option<&str>,
            _credential: &Credential,
        ) -> Result<Vec<NewMediaItemResult>, ApiError> {
            if let Ok(mut sizes) = self.batch_sizes.lock() {
                sizes.push(items.len());
            }
            if let Ok(mut ids) = self.batch_album_ids.lock() {
                ids.push(album_id.map(|s| s.to_string()));
            }
            if self.fail_batches.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let echo = self.echo_tokens.load(Ordering::SeqCst);
            let results = items
                .iter()
                .map(|item| {
                    let upload_token = echo.then(|| item.token.clone());
                    if item.token.ends_with(FAIL_COMMIT) {
                        NewMediaItemResult {
                            upload_token,
                            status: ItemStatus {
                                code: Some(3),
                                message: "Failed: There was an error while trying to create this media item.".to_string(),
                            },
                            media_item_id: None,
                        }
                    } else if item.token.ends_with(ALREADY_THERE) {
                        NewMediaItemResult {
                            upload_token,
                            status: ItemStatus {
                                code: Some(6),
                                message: "Media item is already associated with this album".to_string(),
                            },
                            media_item_id: None,
                        }
                    } else {
                        NewMediaItemResult {
                            upload_token,
                            status: ItemStatus {
                                code: None,
                                message: "Success".to_string(),
                            },
                            media_item_id: Some(format!("media-{}", item.token)),
                        }
                    }
                })
                .collect();
            Ok(results)
        }

        fn list_albums(&self, _credential: &Credential) -> Result<Vec<AlbumInfo>, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_album_lookup.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 500,
                    body: "albums unavailable".to_string(),
                });
            }
            Ok(self.albums.lock().map(|a| a.clone()).unwrap_or_default())
        }

        fn create_album(&self, title: &str, _credential: &Credential) -> Result<String, ApiError> {
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
            let id = format!("album-{n}");
            if let Ok(mut albums) = self.albums.lock() {
                albums.push(AlbumInfo {
                    id: id.clone(),
                    title: title.to_string(),
                });
            }
            Ok(id)
        }
    }

    pub(crate) struct StaticCredentials {
        credential: Option<Credential>,
        pub(crate) calls: AtomicUsize,
        pub(crate) invalidations: AtomicUsize,
    }

    impl StaticCredentials {
        pub(crate) fn valid() -> Self {
            Self {
                credential: Some(Credential {
                    access_token: "test-access-token".to_string(),
                    expiry: None,
                }),
                calls: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
            }
        }

        pub(crate) fn missing() -> Self {
            Self {
                credential: None,
                calls: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
            }
        }
    }

    impl CredentialProvider for StaticCredentials {
        fn get_valid_credential(&self) -> Option<Credential> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.credential.clone()
        }

        fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }
}
