use anyhow::anyhow;
use std::path::{Path, PathBuf};

/// Directory under the home directory holding every persisted file.
pub(crate) const CONFIG_DIR_NAME: &str = ".google_photos_uploader";

/// Every file the uploader reads or writes, all inside one config dir.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppPaths {
    pub(crate) config_dir: PathBuf,
    pub(crate) uploaded_log: PathBuf,
    pub(crate) failed_log: PathBuf,
    pub(crate) progress_file: PathBuf,
    pub(crate) token_file: PathBuf,
    pub(crate) log_file: PathBuf,
}

impl AppPaths {
    pub(crate) fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            uploaded_log: config_dir.join("uploaded_files.txt"),
            failed_log: config_dir.join("failed_files.json"),
            progress_file: config_dir.join("upload_progress.json"),
            token_file: config_dir.join("token.json"),
            log_file: config_dir.join("uploader.log"),
        }
    }

    /// `config_dir` when given, otherwise `~/.google_photos_uploader`.
    pub(crate) fn resolve(config_dir: Option<&Path>) -> anyhow::Result<Self> {
        match config_dir {
            Some(dir) => Ok(Self::new(dir)),
            None => {
                let home = dirs::home_dir().ok_or_else(|| anyhow!("Unable to find home directory"))?;
                Ok(Self::new(&home.join(CONFIG_DIR_NAME)))
            }
        }
    }
}
