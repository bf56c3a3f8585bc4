use crate::api::{Credential, CredentialProvider};
use crate::util::write_atomically;
use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Treat tokens this close to expiry as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Authorized-user token file as written by the Google auth libraries.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
struct AuthorizedUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizedUser {
    fn credential(&self) -> Option<Credential> {
        let access_token = self.token.clone().filter(|t| !t.is_empty())?;
        Some(Credential {
            access_token,
            expiry: self.expiry.as_deref().and_then(parse_expiry),
        })
    }
}

#[derive(Deserialize, Debug)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// `2024-05-01T10:00:00.123456Z`, with or without the zone suffix.
fn parse_expiry(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

fn format_expiry(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Credentials backed by a token file, refreshed with the OAuth refresh
/// token grant when they run out. One instance per process, shared by all
/// upload workers.
pub(crate) struct TokenFileCredentialProvider {
    token_file: PathBuf,
    http: reqwest::blocking::Client,
    cached: Mutex<Option<Credential>>,
}

impl TokenFileCredentialProvider {
    pub(crate) fn new(token_file: PathBuf) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Unable to build http client")?;
        Ok(Self {
            token_file,
            http,
            cached: Mutex::new(None),
        })
    }

    fn load_user(&self) -> anyhow::Result<AuthorizedUser> {
        let text = fs::read_to_string(&self.token_file)
            .with_context(|| format!("Unable to read token file {:?}", self.token_file))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Unable to parse token file {:?}", self.token_file))
    }

    fn load_or_refresh(&self) -> anyhow::Result<Credential> {
        let mut user = self.load_user()?;
        if let Some(credential) = user.credential()
            && credential.is_valid(Utc::now(), EXPIRY_MARGIN_SECS)
        {
            debug!("Using stored access token");
            return Ok(credential);
        }
        let Some(refresh_token) = user.refresh_token.clone() else {
            bail!("access token expired and no refresh token available");
        };
        info!("Refreshing access token");
        let refreshed = self.refresh(&user, &refresh_token)?;
        let expiry = refreshed
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        user.token = Some(refreshed.access_token.clone());
        user.expiry = expiry.map(format_expiry);
        if let Err(e) = self.save_user(&user) {
            // the refreshed credential is still usable this run
            warn!("Unable to save refreshed token: {e:#}");
        }
        Ok(Credential {
            access_token: refreshed.access_token,
            expiry,
        })
    }

    fn refresh(&self, user: &AuthorizedUser, refresh_token: &str) -> anyhow::Result<RefreshResponse> {
        let response = self
            .http
            .post(&user.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
            ])
            .send()
            .context("Token refresh request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("token refresh rejected: {status} {body}"));
        }
        response
            .json::<RefreshResponse>()
            .context("Unable to decode token refresh response")
    }

    fn save_user(&self, user: &AuthorizedUser) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(user)?;
        write_atomically(&self.token_file, &json)
    }
}

impl CredentialProvider for TokenFileCredentialProvider {
    fn get_valid_credential(&self) -> Option<Credential> {
        // held across the refresh so concurrent workers wait for one refresh
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(credential) = cached.as_ref()
            && credential.is_valid(Utc::now(), EXPIRY_MARGIN_SECS)
        {
            return Some(credential.clone());
        }
        match self.load_or_refresh() {
            Ok(credential) => {
                *cached = Some(credential.clone());
                Some(credential)
            }
            Err(e) => {
                error!("Unable to get credentials: {e:#}");
                *cached = None;
                None
            }
        }
    }

    fn invalidate(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if cached.take().is_some() {
            debug!("Cleared cached credential");
        }
    }
}
