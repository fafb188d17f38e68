use crate::{config::BlockbankConfig, paths::BlockbankPaths};
use eyre::Context as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// If an env var is set and non-empty, apply `setter` with the trimmed value.
fn apply_env(var: &str, setter: impl FnOnce(&str)) {
    if let Ok(u) = std::env::var(var) {
        let t = u.trim();
        if !t.is_empty() {
            setter(t);
        }
    }
}

/// Environment overrides win over the file and are never written back.
fn apply_env_overrides(cfg: &mut BlockbankConfig) {
    apply_env("BLOCKBANK_RPC_URL", |v| {
        v.clone_into(&mut cfg.network.rpc_url);
    });
    apply_env("BLOCKBANK_WALLET_RPC_URL", |v| {
        v.clone_into(&mut cfg.wallet.rpc_url);
    });
    apply_env("BLOCKBANK_ACCOUNT", |v| {
        cfg.wallet.account = Some(v.to_owned());
    });
}

impl ConfigStore {
    pub fn new(paths: &BlockbankPaths) -> Self {
        Self {
            path: paths.config_path(),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<BlockbankConfig> {
        let mut cfg = match crate::fsutil::read_optional_string(&self.path)? {
            Some(s) => toml::from_str(&s).context("parse config.toml")?,
            None => {
                let cfg = BlockbankConfig::default();
                self.save(&cfg)?;
                tracing::info!(path = %self.path.display(), "wrote default config");
                cfg
            }
        };
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &BlockbankConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_string_atomic_private(&self.path, &s).context("write config.toml")
    }
}
