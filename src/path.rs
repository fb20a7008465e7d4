// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way during provisioning.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the provisioning transcript.
///
/// Uses XDG Base Directory path `$XDG_STATE_HOME/dotstrap/bootstrap.log`.
/// Platforms without a state directory fall back to the cache directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_log_file() -> Result<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|path| path.join("dotstrap").join("bootstrap.log"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the configuration file.
///
/// Uses `$XDG_CONFIG_HOME/dotstrap/config.toml`. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("dotstrap").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Collection of paths touched while provisioning a workstation.
///
/// Everything is rooted at the user's home directory, except for the system
/// shell listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// User's home directory.
    pub home: PathBuf,

    /// Install location for upstream tools and the update wrapper.
    pub bin_dir: PathBuf,

    /// Per-user font directory.
    pub font_dir: PathBuf,

    /// Per-user configuration directory where terminal configs live.
    pub config_dir: PathBuf,

    /// Source directory the dotfiles manager clones its profile into.
    pub dotfiles_source: PathBuf,

    /// Listing of valid login shells.
    pub shells_file: PathBuf,
}

impl Layout {
    /// Resolve layout for the current user.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory path cannot be determined.
    pub fn discover() -> Result<Self> {
        let home = home_dir()?;
        Ok(Self::rooted(&home).with_xdg(|key| std::env::var_os(key)))
    }

    /// Apply XDG base directory overrides from environment lookup.
    ///
    /// Empty values are ignored.
    pub fn with_xdg(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        // INVARIANT: Terminal emulators and the dotfiles manager use XDG paths
        // even on macOS, never `~/Library`.
        if let Some(config) = lookup("XDG_CONFIG_HOME") {
            self.config_dir = PathBuf::from(config);
        }

        if let Some(data) = lookup("XDG_DATA_HOME") {
            self.dotfiles_source = PathBuf::from(data).join("chezmoi");
        }

        self
    }

    /// Construct layout relative to an arbitrary home directory.
    pub fn rooted(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref().to_path_buf();
        let font_dir = if cfg!(target_os = "macos") {
            home.join("Library").join("Fonts")
        } else {
            home.join(".local").join("share").join("fonts")
        };

        Self {
            bin_dir: home.join(".local").join("bin"),
            config_dir: home.join(".config"),
            dotfiles_source: home.join(".local").join("share").join("chezmoi"),
            shells_file: PathBuf::from("/etc/shells"),
            font_dir,
            home,
        }
    }

    /// Path to generated wrapper script that refreshes the dotfiles profile.
    pub fn update_script(&self) -> PathBuf {
        self.bin_dir.join("dotfiles-update")
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
