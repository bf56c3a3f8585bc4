use anyhow::{Context, anyhow};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Format used for `last_attempt` in the failed-files log.
pub(crate) const ATTEMPT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn attempt_timestamp() -> String {
    chrono::Local::now().format(ATTEMPT_TIME_FORMAT).to_string()
}

/// Replace `path` with `bytes` by writing a sibling temp file and renaming
/// it over the target, readers see either the old or the new content.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Unable to create directory {parent:?}"))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Unable to create temp file in {parent:?}"))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| anyhow!("Unable to replace {path:?}: {}", e.error))?;
    Ok(())
}

/// Append one line per entry, never truncating what is already there.
pub(crate) fn append_lines(path: &Path, lines: &[String]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Unable to create directory {parent:?}"))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Unable to open {path:?} for append"))?;
    let mut buf = String::new();
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomically_replaces() -> anyhow::Result<()> {
        crate::test_util::setup_log();
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("nested").join("state.json");
        write_atomically(&p, b"{\"a\":1}")?;
        assert_eq!(fs::read_to_string(&p)?, "{\"a\":1}");
        write_atomically(&p, b"{}")?;
        assert_eq!(fs::read_to_string(&p)?, "{}");
        // no temp files left behind
        assert_eq!(fs::read_dir(p.parent().unwrap_or(dir.path()))?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_append_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("log.txt");
        append_lines(&p, &["/a.jpg".to_string()])?;
        append_lines(&p, &["/b.jpg".to_string(), "/c.jpg".to_string()])?;
        append_lines(&p, &[])?;
        assert_eq!(fs::read_to_string(&p)?, "/a.jpg\n/b.jpg\n/c.jpg\n");
        Ok(())
    }

    #[test]
    fn test_attempt_timestamp_format() {
        let ts = attempt_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, ATTEMPT_TIME_FORMAT).is_ok());
    }
}
