//! Purge configuration.
//!
//! Options come from an optional YAML file and from command-line flags. The
//! two are merged field by field (flags win) and then validated into
//! [`PurgeOptions`] before any external command runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PurgeError, Result};

/// Default container runtime executable.
pub const DEFAULT_RUNTIME_BIN: &str = "docker";

/// Default version-control executable.
pub const DEFAULT_GIT_BIN: &str = "git";

/// Unvalidated options, as read from a config file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PurgeConfig {
    /// Working copy to check branches out in
    pub repo_location: Option<PathBuf>,

    /// Shell command printing the images to keep, one per line
    pub list_images_cmd: Option<String>,

    /// Branches whose listed images are kept
    #[serde(deserialize_with = "deserialize_branches")]
    pub keep_from_branches: Vec<String>,

    pub keep_image_pattern: Option<String>,
    pub only_image_pattern: Option<String>,
    pub always_remove_pattern: Option<String>,

    pub remove_dangling: Option<bool>,
    pub allow_dirty: Option<bool>,
    pub dry_run: Option<bool>,

    pub runtime_bin: Option<String>,
    pub git_bin: Option<String>,
}

impl PurgeConfig {
    /// Load a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PurgeError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Overlay `overrides` on top of `self`. Every field set in `overrides`
    /// wins, including switches turned off.
    pub fn merge(self, overrides: PurgeConfig) -> PurgeConfig {
        PurgeConfig {
            repo_location: overrides.repo_location.or(self.repo_location),
            list_images_cmd: overrides.list_images_cmd.or(self.list_images_cmd),
            keep_from_branches: if overrides.keep_from_branches.is_empty() {
                self.keep_from_branches
            } else {
                overrides.keep_from_branches
            },
            keep_image_pattern: overrides.keep_image_pattern.or(self.keep_image_pattern),
            only_image_pattern: overrides.only_image_pattern.or(self.only_image_pattern),
            always_remove_pattern: overrides
                .always_remove_pattern
                .or(self.always_remove_pattern),
            remove_dangling: overrides.remove_dangling.or(self.remove_dangling),
            allow_dirty: overrides.allow_dirty.or(self.allow_dirty),
            dry_run: overrides.dry_run.or(self.dry_run),
            runtime_bin: overrides.runtime_bin.or(self.runtime_bin),
            git_bin: overrides.git_bin.or(self.git_bin),
        }
    }

    /// Check required options and fill in defaults.
    pub fn validate(self) -> Result<PurgeOptions> {
        let repo_location = self
            .repo_location
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| PurgeError::Config("--repo-location is required".to_string()))?;

        let list_images_cmd = self
            .list_images_cmd
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PurgeError::Config("--list-images-cmd is required".to_string()))?;

        let keep_from_branches: Vec<String> = self
            .keep_from_branches
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();
        if keep_from_branches.is_empty() {
            return Err(PurgeError::Config(
                "--keep-from-branches must name at least one branch".to_string(),
            ));
        }

        Ok(PurgeOptions {
            repo_location,
            list_images_cmd,
            keep_from_branches,
            keep_image_pattern: non_empty(self.keep_image_pattern),
            only_image_pattern: non_empty(self.only_image_pattern),
            always_remove_pattern: non_empty(self.always_remove_pattern),
            remove_dangling: self.remove_dangling.unwrap_or(false),
            allow_dirty: self.allow_dirty.unwrap_or(false),
            dry_run: self.dry_run.unwrap_or(false),
            runtime_bin: self
                .runtime_bin
                .unwrap_or_else(|| DEFAULT_RUNTIME_BIN.to_string()),
            git_bin: self.git_bin.unwrap_or_else(|| DEFAULT_GIT_BIN.to_string()),
        })
    }
}

/// Validated options for one purge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeOptions {
    pub repo_location: PathBuf,
    pub list_images_cmd: String,
    pub keep_from_branches: Vec<String>,
    pub keep_image_pattern: Option<String>,
    pub only_image_pattern: Option<String>,
    pub always_remove_pattern: Option<String>,
    pub remove_dangling: bool,
    pub allow_dirty: bool,
    pub dry_run: bool,
    pub runtime_bin: String,
    pub git_bin: String,
}

/// Split a comma-delimited branch list, dropping blank entries.
pub fn split_branches(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn deserialize_branches<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Branches {
        Delimited(String),
        List(Vec<String>),
    }

    Ok(match Branches::deserialize(deserializer)? {
        Branches::Delimited(value) => split_branches(&value),
        Branches::List(list) => list,
    })
}
