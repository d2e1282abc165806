//! Sync configuration.
//!
//! Defaults mirror the curated crashpad dependency set. A `depsync.toml` next to
//! the manifest can override any field:
//!
//! ```toml
//! allow_list = ["gtest", "mini_chromium"]
//! mirror_base = "https://mirror.example.com/cache-googlesource"
//! ```

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "depsync.toml";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Dependency names to sync; everything else in the manifest is ignored.
    pub allow_list: Vec<String>,
    /// Mirror prefix; the repository path and `/+archive/<sha>.tar.gz` follow it.
    pub mirror_base: String,
    /// Substring that marks the start of a third-party block.
    pub marker_token: String,
    /// Prefix stripped from the quoted manifest path.
    pub path_prefix: String,
    /// Name inside `Var('...')` holding the repository host.
    pub repository_var: String,
    pub manifest_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allow_list: vec![
                "gtest".to_string(),
                "lss".to_string(),
                "mini_chromium".to_string(),
            ],
            mirror_base: "https://artifacts.plex.tv/cache-googlesource".to_string(),
            marker_token: "crashpad/third_party".to_string(),
            path_prefix: "crashpad/".to_string(),
            repository_var: "chromium_git".to_string(),
            manifest_name: "DEPS".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load `depsync.toml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SyncError::Config(format!("{}: {}", CONFIG_FILE, e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.marker_token.is_empty() {
            return Err(SyncError::Config("marker_token must not be empty".into()));
        }
        if self.allow_list.iter().any(|name| name.is_empty()) {
            return Err(SyncError::Config(
                "allow_list entries must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// URL of the snapshot archive for `repository` pinned at `commit`.
    pub fn archive_url(&self, repository: &str, commit: &str) -> String {
        format!(
            "{}{}/+archive/{}.tar.gz",
            self.mirror_base.trim_end_matches('/'),
            repository,
            commit
        )
    }
}
