use crate::file_type::find_media_kind;
use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Recursively collect supported photo and video files below `root` as
/// absolute paths, in directory traversal order.
///
/// A missing or unreadable root yields an empty list, no media on a card is
/// a normal outcome.
pub(crate) fn scan(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    if !root.exists() || !root.is_dir() {
        info!("Media directory not found: {root:?}");
        return files;
    }
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    scan_dir_recursively(&mut files, &root);
    debug!("Found {} media files under {root:?}", files.len());
    files
}

fn scan_dir_recursively(files: &mut Vec<String>, dir_path: &Path) {
    let Ok(dir_reader) = fs::read_dir(dir_path) else {
        debug!("Unable to read directory: {dir_path:?}");
        return;
    };
    for dir_entry in dir_reader {
        let Ok(dir_entry) = dir_entry else {
            continue;
        };
        let path = dir_entry.path();
        // file_type() does not follow links, a linked dir could loop
        let Ok(file_type) = dir_entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            debug!("Skipping symlink: {path:?}");
        } else if file_type.is_file() {
            if let Some(kind) = find_media_kind(&path) {
                debug!("{kind}: {path:?}");
                files.push(path.to_string_lossy().to_string());
            }
        } else if file_type.is_dir() {
            scan_dir_recursively(files, &path);
        }
    }
}

/// Up to `limit` of `files`, newest modification time first. Files whose
/// metadata can't be read sort last.
pub(crate) fn most_recent(files: &[String], limit: usize) -> Vec<String> {
    let mut dated: Vec<(Option<SystemTime>, &String)> = files
        .iter()
        .map(|f| (fs::metadata(f).and_then(|m| m.modified()).ok(), f))
        .collect();
    dated.sort_by_key(|(modified, _)| Reverse(*modified));
    dated
        .into_iter()
        .take(limit)
        .map(|(_, f)| f.clone())
        .collect()
}

pub(crate) fn file_name(file_path: &str) -> String {
    PathBuf::from(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn test_scan_recursive_and_filtered() -> anyhow::Result<()> {
        crate::test_util::setup_log();
        let dir = tempfile::tempdir()?;
        let sub = dir.path().join("DCIM").join("100CANON");
        fs::create_dir_all(&sub)?;
        fs::write(sub.join("IMG_0001.JPG"), b"a")?;
        fs::write(sub.join("IMG_0002.jpg"), b"b")?;
        fs::write(sub.join("MVI_0003.MOV"), b"c")?;
        fs::write(sub.join("readme.txt"), b"d")?;
        fs::write(dir.path().join("top.png"), b"e")?;

        let mut files = scan(dir.path());
        files.sort();
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|f| Path::new(f).is_absolute()));
        assert!(files.iter().any(|f| f.ends_with("IMG_0001.JPG")));
        assert!(files.iter().any(|f| f.ends_with("MVI_0003.MOV")));
        assert!(!files.iter().any(|f| f.ends_with("readme.txt")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinked_dirs() -> anyhow::Result<()> {
        crate::test_util::setup_log();
        let dir = tempfile::tempdir()?;
        let dcim = dir.path().join("DCIM");
        fs::create_dir_all(&dcim)?;
        fs::write(dcim.join("IMG_1.JPG"), b"a")?;
        std::os::unix::fs::symlink(&dcim, dcim.join("loop"))?;

        let files = scan(&dcim);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("DCIM/IMG_1.JPG"));
        Ok(())
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        crate::test_util::setup_log();
        assert!(scan(Path::new("/definitely/not/here/DCIM")).is_empty());
    }

    #[test]
    fn test_scan_empty_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("notes.txt"), b"x")?;
        assert!(scan(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn test_most_recent() -> anyhow::Result<()> {
        crate::test_util::setup_log();
        let dir = tempfile::tempdir()?;
        let base = SystemTime::now() - Duration::from_secs(3600);
        let mut files = vec![];
        for i in 0..5u64 {
            let p = dir.path().join(format!("IMG_{i}.jpg"));
            let f = File::create(&p)?;
            f.set_modified(base + Duration::from_secs(i * 60))?;
            files.push(p.to_string_lossy().to_string());
        }
        let recent = most_recent(&files, 2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].ends_with("IMG_4.jpg"));
        assert!(recent[1].ends_with("IMG_3.jpg"));
        assert_eq!(most_recent(&files, 100).len(), 5);
        Ok(())
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/media/SD/DCIM/IMG_1.JPG"), "IMG_1.JPG");
        assert_eq!(file_name("IMG_1.JPG"), "IMG_1.JPG");
    }
}
