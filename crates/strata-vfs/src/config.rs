//! VFS configuration.
//!
//! Loaded from a RON file, by default `~/.config/strata/vfs.ron`:
//!
//! ```ron
//! (
//!     sources: ["/usr/share/app/base.pkg", "~/.config/app/overrides"],
//!     scratch_dir: Some("/var/tmp"),
//!     max_archive_members: 10000,
//! )
//! ```
//!
//! Sources are registered in order, so earlier entries win when two sources
//! define the same version of a file.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vfs::DEFAULT_MAX_ARCHIVE_MEMBERS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Directories and packages to register, in order.
    pub sources: Vec<PathBuf>,
    /// Parent directory for package scratch directories.
    pub scratch_dir: Option<PathBuf>,
    /// Upper bound on the entries walked in one archive.
    pub max_archive_members: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            scratch_dir: None,
            max_archive_members: DEFAULT_MAX_ARCHIVE_MEMBERS,
        }
    }
}

impl VfsConfig {
    /// Default config file location.
    /// Returns: ~/.config/strata/vfs.ron
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("strata").join("vfs.ron"))
    }

    /// Load and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(expand_path(path.as_ref()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        if config.max_archive_members == 0 {
            return Err(ConfigError::Invalid(
                "max_archive_members must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Add a source after the configured ones.
    pub fn push_source(&mut self, path: impl Into<PathBuf>) {
        self.sources.push(path.into());
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Expand a leading `~` in `path`.
pub fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => match shellexpand::tilde(s) {
            Cow::Borrowed(_) => path.to_path_buf(),
            Cow::Owned(expanded) => PathBuf::from(expanded),
        },
        None => path.to_path_buf(),
    }
}
