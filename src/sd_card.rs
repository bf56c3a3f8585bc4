use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub(crate) const DEFAULT_VOLUME_NAME: &str = "PHOTO_UPLOAD_SD";
pub(crate) const DCIM_DIR: &str = "DCIM";

/// Mount points a removable volume named `volume_name` may appear under.
pub(crate) fn mount_candidates(volume_name: &str, user: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = vec![Path::new("/Volumes").join(volume_name)];
    if let Some(user) = user.filter(|u| !u.is_empty()) {
        candidates.push(Path::new("/media").join(user).join(volume_name));
    }
    candidates.push(Path::new("/media").join(volume_name));
    candidates
}

/// First mount point of the card that exists right now.
pub(crate) fn find_sd_card(volume_name: &str) -> Option<PathBuf> {
    let user = std::env::var("USER").ok();
    find_in(&mount_candidates(volume_name, user.as_deref()))
}

fn find_in(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_dir()).cloned()
}

/// `<card>/DCIM`, when the card has one.
pub(crate) fn dcim_path(sd_path: &Path) -> Option<PathBuf> {
    let dcim = sd_path.join(DCIM_DIR);
    dcim.is_dir().then_some(dcim)
}

/// Decides when a poll of the mount points should start an upload run.
///
/// Fires once per insertion, and never sooner than `min_interval` after the
/// previous run, so at most one run is in flight at a time.
#[derive(Debug)]
pub(crate) struct CardWatcher {
    min_interval: Duration,
    present: Option<PathBuf>,
    last_run: Option<Instant>,
    pending: bool,
}

impl CardWatcher {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            present: None,
            last_run: None,
            pending: false,
        }
    }

    /// Feed one poll result, returns the card to upload from when a run is
    /// due.
    pub(crate) fn observe(&mut self, card: Option<PathBuf>, now: Instant) -> Option<PathBuf> {
        let Some(card) = card else {
            if let Some(old) = self.present.take() {
                info!("SD card removed: {old:?}");
            }
            self.pending = false;
            return None;
        };
        if self.present.as_ref() != Some(&card) {
            info!("SD card detected: {card:?}");
            self.present = Some(card);
            self.pending = true;
        }
        self.fire_if_due(now)
    }

    fn fire_if_due(&mut self, now: Instant) -> Option<PathBuf> {
        if !self.pending {
            return None;
        }
        if let Some(last) = self.last_run
            && now.duration_since(last) < self.min_interval
        {
            debug!("Last run {:?} ago, waiting", now.duration_since(last));
            return None;
        }
        self.pending = false;
        self.last_run = Some(now);
        self.present.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_mount_candidates() {
        let c = mount_candidates("CARD", Some("pi"));
        assert_eq!(
            c,
            vec![
                PathBuf::from("/Volumes/CARD"),
                PathBuf::from("/media/pi/CARD"),
                PathBuf::from("/media/CARD"),
            ]
        );
        assert_eq!(mount_candidates("CARD", None).len(), 2);
        assert_eq!(mount_candidates("CARD", Some("")).len(), 2);
    }

    #[test]
    fn test_find_in_and_dcim() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("a").join("CARD");
        let second = dir.path().join("b").join("CARD");
        fs::create_dir_all(&second)?;
        assert_eq!(find_in(&[first.clone(), second.clone()]), Some(second.clone()));
        assert_eq!(find_in(&[first]), None);

        assert_eq!(dcim_path(&second), None);
        fs::create_dir_all(second.join(DCIM_DIR))?;
        assert_eq!(dcim_path(&second), Some(second.join(DCIM_DIR)));
        Ok(())
    }

    #[test]
    fn test_fires_once_per_insertion() {
        crate::test_util::setup_log();
        let card = PathBuf::from("/media/CARD");
        let mut w = CardWatcher::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert_eq!(w.observe(None, t0), None);
        assert_eq!(w.observe(Some(card.clone()), t0), Some(card.clone()));
        // still inserted
        assert_eq!(w.observe(Some(card.clone()), t0 + Duration::from_secs(30)), None);
        assert_eq!(w.observe(None, t0 + Duration::from_secs(31)), None);
        assert_eq!(
            w.observe(Some(card.clone()), t0 + Duration::from_secs(40)),
            Some(card)
        );
    }

    #[test]
    fn test_debounces_quick_reinsertion() {
        let card = PathBuf::from("/Volumes/CARD");
        let mut w = CardWatcher::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(w.observe(Some(card.clone()), t0).is_some());
        assert!(w.observe(None, t0 + Duration::from_secs(1)).is_none());
        // back within the interval, held until it has passed
        assert!(w.observe(Some(card.clone()), t0 + Duration::from_secs(2)).is_none());
        assert!(w.observe(Some(card.clone()), t0 + Duration::from_secs(5)).is_none());
        assert_eq!(
            w.observe(Some(card.clone()), t0 + Duration::from_secs(10)),
            Some(card.clone())
        );
        assert!(w.observe(Some(card), t0 + Duration::from_secs(20)).is_none());
    }

    #[test]
    fn test_removed_before_due_never_fires() {
        let card = PathBuf::from("/Volumes/CARD");
        let mut w = CardWatcher::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(w.observe(Some(card.clone()), t0).is_some());
        assert!(w.observe(None, t0 + Duration::from_secs(1)).is_none());
        assert!(w.observe(Some(card), t0 + Duration::from_secs(2)).is_none());
        assert!(w.observe(None, t0 + Duration::from_secs(3)).is_none());
        assert!(w.observe(None, t0 + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_different_mount_point_is_new_insertion() {
        let mut w = CardWatcher::new(Duration::ZERO);
        let t0 = Instant::now();
        let a = PathBuf::from("/media/pi/CARD");
        let b = PathBuf::from("/media/CARD");
        assert_eq!(w.observe(Some(a), t0), Some(PathBuf::from("/media/pi/CARD")));
        assert_eq!(w.observe(Some(b.clone()), t0), Some(b));
    }
}
