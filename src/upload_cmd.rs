use crate::auth::TokenFileCredentialProvider;
use crate::config::AppPaths;
use crate::google_photos::{API_BASE_URL, GooglePhotosApi};
use crate::ledger::UploadLedger;
use crate::orchestrator::UploadOrchestrator;
use crate::progress::ProgressPublisher;
use crate::viewer::{SlideshowOptions, launch_if_configured};
use anyhow::{Context, bail};
use indicatif::ProgressBar;
use std::path::Path;
use tracing::info;

/// Long-lived collaborators of an upload run, built once per process so the
/// watch loop reuses the credential cache between runs.
pub(crate) struct Uploader {
    api: GooglePhotosApi,
    credentials: TokenFileCredentialProvider,
    ledger: UploadLedger,
    progress: ProgressPublisher,
}

impl Uploader {
    pub(crate) fn new(paths: &AppPaths) -> anyhow::Result<Self> {
        Ok(Self {
            api: GooglePhotosApi::new(API_BASE_URL).context("Unable to build photo library client")?,
            credentials: TokenFileCredentialProvider::new(paths.token_file.clone())?,
            ledger: UploadLedger::new(paths.uploaded_log.clone(), paths.failed_log.clone()),
            progress: ProgressPublisher::new(paths.progress_file.clone()),
        })
    }

    pub(crate) fn run(&self, media_root: &Path, album: Option<String>, show_bar: bool) -> bool {
        let bar = if show_bar {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        UploadOrchestrator::new(&self.api, &self.credentials, &self.ledger, &self.progress)
            .with_album(album)
            .with_terminal(bar)
            .run(media_root)
    }
}

pub(crate) fn main(
    paths: &AppPaths,
    directory: &Path,
    album: Option<String>,
    slideshow: Option<&SlideshowOptions>,
    show_bar: bool,
) -> anyhow::Result<()> {
    if !directory.is_dir() {
        bail!("Directory invalid: {directory:?}");
    }
    let uploader = Uploader::new(paths)?;
    let uploaded = uploader.run(directory, album, show_bar);
    if !uploaded {
        info!("Nothing was uploaded from {directory:?}");
    }
    if let Some(options) = slideshow {
        launch_if_configured(options);
    }
    Ok(())
}
