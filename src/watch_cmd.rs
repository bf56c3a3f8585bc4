use crate::config::AppPaths;
use crate::sd_card::{CardWatcher, dcim_path, find_sd_card};
use crate::upload_cmd::Uploader;
use crate::viewer::{SlideshowOptions, launch_if_configured};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub(crate) const DEFAULT_POLL_SECS: u64 = 2;
pub(crate) const DEFAULT_MIN_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub(crate) struct WatchOptions {
    pub(crate) volume_name: String,
    pub(crate) poll_interval: Duration,
    pub(crate) min_interval: Duration,
    pub(crate) album: Option<String>,
    pub(crate) slideshow: Option<SlideshowOptions>,
    pub(crate) show_bar: bool,
}

/// Poll the mount points forever, one upload run per card insertion.
pub(crate) fn main(paths: &AppPaths, options: &WatchOptions) -> anyhow::Result<()> {
    let uploader = Uploader::new(paths)?;
    let mut watcher = CardWatcher::new(options.min_interval);
    info!(
        "Watching for SD card {:?} every {:?}",
        options.volume_name, options.poll_interval
    );
    loop {
        let card = find_sd_card(&options.volume_name);
        if let Some(sd) = watcher.observe(card, Instant::now()) {
            handle_card(&sd, options, |dcim| {
                uploader.run(dcim, options.album.clone(), options.show_bar)
            });
        }
        thread::sleep(options.poll_interval);
    }
}

/// Upload from the card's DCIM folder, then start the slideshow when one
/// was asked for, uploaded or not. Returns whether anything was uploaded.
fn handle_card<F>(sd: &Path, options: &WatchOptions, upload: F) -> bool
where
    F: FnOnce(&Path) -> bool,
{
    let Some(dcim) = dcim_path(sd) else {
        warn!("No DCIM folder on {sd:?}");
        return false;
    };
    let uploaded = upload(&dcim);
    if let Some(slideshow) = &options.slideshow {
        if !uploaded {
            info!("Nothing uploaded, showing what is already there");
        }
        launch_if_configured(slideshow);
    }
    uploaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;

    fn options() -> WatchOptions {
        WatchOptions {
            volume_name: "CARD".to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            min_interval: Duration::from_secs(DEFAULT_MIN_INTERVAL_SECS),
            album: None,
            slideshow: None,
            show_bar: false,
        }
    }

    #[test]
    fn test_card_without_dcim_is_skipped() -> anyhow::Result<()> {
        crate::test_util::setup_log();
        let dir = tempfile::tempdir()?;
        let called = Cell::new(false);
        let uploaded = handle_card(dir.path(), &options(), |_| {
            called.set(true);
            true
        });
        assert!(!uploaded);
        assert!(!called.get());
        Ok(())
    }

    #[test]
    fn test_uploads_from_dcim() -> anyhow::Result<()> {
        crate::test_util::setup_log();
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("DCIM"))?;
        let mut o = options();
        // requested without a viewer: logged and skipped
        o.slideshow = Some(SlideshowOptions::default());
        let seen = Cell::new(None);
        let uploaded = handle_card(dir.path(), &o, |dcim| {
            seen.set(Some(dcim.to_path_buf()));
            false
        });
        assert!(!uploaded);
        assert_eq!(seen.take(), Some(dir.path().join("DCIM")));
        Ok(())
    }
}
