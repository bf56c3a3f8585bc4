use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("credential rejected by the photo library")]
    Unauthorized,
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unable to decode response: {0}")]
    Decode(String),
}

/// An OAuth access token plus its expiry, `None` expiry means it never
/// expires as far as we know.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Credential {
    pub(crate) access_token: String,
    pub(crate) expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// Still usable for at least `margin_secs` more seconds.
    pub(crate) fn is_valid(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            None => true,
            Some(expiry) => expiry - chrono::Duration::seconds(margin_secs) > now,
        }
    }
}

pub(crate) trait CredentialProvider: Send + Sync {
    /// A credential that is valid right now, refreshing when needed. Failures
    /// are logged by the provider and reported as `None`.
    fn get_valid_credential(&self) -> Option<Credential>;

    /// Forget any cached credential so the next call refreshes.
    fn invalidate(&self);
}

/// An upload token paired with the file name the media item should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadTokenRecord {
    pub(crate) token: String,
    pub(crate) file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AlbumInfo {
    pub(crate) id: String,
    pub(crate) title: String,
}

/// Per-item status inside a batch create response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ItemStatus {
    pub(crate) code: Option<i32>,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NewMediaItemResult {
    /// The token this result is for, when the service echoes it.
    pub(crate) upload_token: Option<String>,
    pub(crate) status: ItemStatus,
    pub(crate) media_item_id: Option<String>,
}

/// The remote photo library, only the calls the uploader needs.
pub(crate) trait PhotoApi: Send + Sync {
    fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        credential: &Credential,
    ) -> Result<String, ApiError>;

    fn batch_create_media_items(
        &self,
        items: &[UploadTokenRecord],
        album_id: Option<&str>,
        credential: &Credential,
    ) -> Result<Vec<NewMediaItemResult>, ApiError>;

    fn list_albums(&self, credential: &Credential) -> Result<Vec<AlbumInfo>, ApiError>;

    fn create_album(&self, title: &str, credential: &Credential) -> Result<String, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_validity() {
        let now = Utc::now();
        let c = Credential {
            access_token: "abc".to_string(),
            expiry: Some(now + chrono::Duration::seconds(120)),
        };
        assert!(c.is_valid(now, 60));
        assert!(!c.is_valid(now, 180));

        let expired = Credential {
            access_token: "abc".to_string(),
            expiry: Some(now - chrono::Duration::seconds(1)),
        };
        assert!(!expired.is_valid(now, 0));

        let no_expiry = Credential {
            access_token: "abc".to_string(),
            expiry: None,
        };
        assert!(no_expiry.is_valid(now, 60));

        let empty = Credential {
            access_token: String::new(),
            expiry: None,
        };
        assert!(!empty.is_valid(now, 0));
    }

    #[test]
    fn test_error_display() {
        let e = ApiError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(e.to_string(), "unexpected status 500: boom");
        assert_eq!(ApiError::Unauthorized.to_string(), "credential rejected by the photo library");
    }
}
