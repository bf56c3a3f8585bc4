use crate::api::{
    AlbumInfo, ApiError, Credential, ItemStatus, NewMediaItemResult, PhotoApi, UploadTokenRecord,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub(crate) const API_BASE_URL: &str = "https://photoslibrary.googleapis.com/v1";

const ALBUM_PAGE_SIZE: u32 = 50;

/// Photo library REST client. Blocking, called from the upload workers.
pub(crate) struct GooglePhotosApi {
    http: Client,
    base_url: String,
}

impl GooglePhotosApi {
    pub(crate) fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            // large videos over slow links
            .timeout(Duration::from_secs(30 * 60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn send(&self, request: RequestBuilder, credential: &Credential) -> Result<Response, ApiError> {
        let response = request.bearer_auth(&credential.access_token).send()?;
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            status => Err(ApiError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            }),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct BatchCreateResponse {
    #[serde(default)]
    new_media_item_results: Vec<WireItemResult>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct WireItemResult {
    #[serde(default)]
    upload_token: Option<String>,
    #[serde(default)]
    status: Option<WireStatus>,
    #[serde(default)]
    media_item: Option<WireMediaItem>,
}

#[derive(Deserialize, Debug, Default)]
struct WireStatus {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct WireMediaItem {
    id: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct AlbumListResponse {
    #[serde(default)]
    albums: Vec<WireAlbum>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WireAlbum {
    id: String,
    #[serde(default)]
    title: String,
}

impl From<WireItemResult> for NewMediaItemResult {
    fn from(w: WireItemResult) -> Self {
        let status = w.status.unwrap_or_default();
        NewMediaItemResult {
            upload_token: w.upload_token,
            status: ItemStatus {
                code: status.code,
                message: status.message,
            },
            media_item_id: w.media_item.map(|m| m.id),
        }
    }
}

fn batch_create_body(items: &[UploadTokenRecord], album_id: Option<&str>) -> serde_json::Value {
    let new_media_items: Vec<serde_json::Value> = items
        .iter()
        .map(|i| {
            json!({
                "simpleMediaItem": {
                    "uploadToken": i.token,
                    "fileName": i.file_name,
                }
            })
        })
        .collect();
    let mut body = json!({ "newMediaItems": new_media_items });
    if let Some(id) = album_id {
        body["albumId"] = json!(id);
    }
    body
}

impl PhotoApi for GooglePhotosApi {
    fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        credential: &Credential,
    ) -> Result<String, ApiError> {
        let request = self
            .http
            .post(self.url("uploads"))
            .header("Content-Type", "application/octet-stream")
            .header("X-Goog-Upload-Content-Type", mime_type)
            .header("X-Goog-Upload-Protocol", "raw")
            .body(bytes);
        let token = self.send(request, credential)?.text()?;
        debug!("Got upload token {}...", token.chars().take(10).collect::<String>());
        Ok(token)
    }

    fn batch_create_media_items(
        &self,
        items: &[UploadTokenRecord],
        album_id: Option<&str>,
        credential: &Credential,
    ) -> Result<Vec<NewMediaItemResult>, ApiError> {
        let request = self
            .http
            .post(self.url("mediaItems:batchCreate"))
            .json(&batch_create_body(items, album_id));
        let response: BatchCreateResponse = self
            .send(request, credential)?
            .json()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(response
            .new_media_item_results
            .into_iter()
            .map(NewMediaItemResult::from)
            .collect())
    }

    fn list_albums(&self, credential: &Credential) -> Result<Vec<AlbumInfo>, ApiError> {
        let mut albums = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(self.url("albums"))
                .query(&[("pageSize", ALBUM_PAGE_SIZE.to_string())]);
            if let Some(t) = &page_token {
                request = request.query(&[("pageToken", t)]);
            }
            let page: AlbumListResponse = self
                .send(request, credential)?
                .json()
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            albums.extend(page.albums.into_iter().map(|a| AlbumInfo {
                id: a.id,
                title: a.title,
            }));
            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        debug!("Found {} albums", albums.len());
        Ok(albums)
    }

    fn create_album(&self, title: &str, credential: &Credential) -> Result<String, ApiError> {
        let request = self
            .http
            .post(self.url("albums"))
            .json(&json!({ "album": { "title": title } }));
        let album: WireAlbum = self
            .send(request, credential)?
            .json()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(album.id)
    }
}
