use directories::ProjectDirs;
use eyre::ContextCompat as _;
use serde::Serialize;
use std::path::PathBuf;

const LOG_FILE_NAME: &str = "blockbank.log.jsonl";

#[derive(Debug, Clone, Serialize)]
pub struct BlockbankPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl BlockbankPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("BLOCKBANK_DATA_DIR"),
            std::env::var("BLOCKBANK_CONFIG_DIR"),
        ) {
            return Ok(Self::at(PathBuf::from(config_dir), PathBuf::from(data_dir)));
        }

        // macOS: ~/Library/Application Support/blockbank
        // Linux: ~/.config/blockbank and ~/.local/share/blockbank
        // Windows: %APPDATA%\\blockbank
        let proj =
            ProjectDirs::from("", "", "blockbank").context("failed to resolve project dirs")?;
        Ok(Self::at(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    pub fn at(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join(LOG_FILE_NAME);
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Persisted local transaction history.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("transactions.json")
    }

    pub fn history_lock_path(&self) -> PathBuf {
        self.data_dir.join("transactions.json.lock")
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        crate::fsutil::ensure_private_dir(&self.config_dir)?;
        crate::fsutil::ensure_private_dir(&self.data_dir)?;
        Ok(())
    }
}
