// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for settings that Dotstrap uses to provision a
//! workstation. Settings are layered in three passes:
//!
//! 1. Built-in defaults.
//! 2. Optional TOML file at `$XDG_CONFIG_HOME/dotstrap/config.toml`.
//! 3. Environment variables.
//!
//! Later passes win. Path-like values and the repository URL go through shell
//! expansion once every layer has been applied.
//!
//! # Environment Variables
//!
//! | Variable         | Field              | Default                                   |
//! |------------------|--------------------|-------------------------------------------|
//! | `DOTFILES_REPO`  | `repo`             | `https://github.com/$USER/dotfiles.git`   |
//! | `ENABLE_LOGGING` | `logging.enabled`  | `true`                                    |
//! | `LOG_FILE`       | `logging.file`     | `$XDG_STATE_HOME/dotstrap/bootstrap.log`  |
//! | `INSTALL_FONT`   | `font.install`     | `true`                                    |
//! | `ENABLE_CRON`    | `cron.enabled`     | `true`                                    |
//! | `CRON_SCHEDULE`  | `cron.schedule`    | `0 12 * * *`                              |

use crate::path::{default_log_file, NoWayHome};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Default remote for the dotfiles profile.
pub const DEFAULT_REPO: &str = "https://github.com/$USER/dotfiles.git";

/// Default schedule of the recurring update job.
pub const DEFAULT_SCHEDULE: &str = "0 12 * * *";

/// Provisioning settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Remote URL of the dotfiles profile.
    pub repo: String,

    /// Login shell to switch to.
    pub shell: String,

    /// Transcript logging.
    pub logging: LoggingSettings,

    /// Nerd Font installation.
    pub font: FontSettings,

    /// Recurring update job.
    pub cron: CronSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repo: DEFAULT_REPO.into(),
            shell: "zsh".into(),
            logging: LoggingSettings::default(),
            font: FontSettings::default(),
            cron: CronSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from every layer.
    ///
    /// A missing configuration file is not an error, only an unreadable or
    /// malformed one is.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if configuration file exists but
    ///   cannot be read.
    /// - Return [`ConfigError::Deserialize`] if configuration file is invalid.
    /// - Return [`ConfigError::InvalidFlag`] if a boolean environment variable
    ///   holds garbage.
    /// - Return [`ConfigError::ShellExpansion`] if expansion fails.
    /// - Return [`ConfigError::NoWayHome`] if default log file cannot be
    ///   determined.
    #[instrument(level = "debug")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                debug!("load configuration file {:?}", path.display());
                read_to_string(path)
                    .map_err(|err| ConfigError::ReadFile {
                        source: err,
                        path: path.to_path_buf(),
                    })?
                    .parse::<Settings>()?
            }
            _ => Settings::default(),
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.expand()?;

        if settings.logging.file.is_none() {
            settings.logging.file = Some(default_log_file()?);
        }

        Ok(settings)
    }

    /// Override fields from environment lookup.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidFlag`] if boolean variable cannot be
    ///   parsed.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(repo) = lookup("DOTFILES_REPO").filter(|value| !value.is_empty()) {
            self.repo = repo;
        }

        if let Some(value) = lookup("ENABLE_LOGGING").filter(|value| !value.is_empty()) {
            self.logging.enabled = parse_flag("ENABLE_LOGGING", &value)?;
        }

        if let Some(file) = lookup("LOG_FILE").filter(|value| !value.is_empty()) {
            self.logging.file = Some(PathBuf::from(file));
        }

        if let Some(value) = lookup("INSTALL_FONT").filter(|value| !value.is_empty()) {
            self.font.install = parse_flag("INSTALL_FONT", &value)?;
        }

        if let Some(value) = lookup("ENABLE_CRON").filter(|value| !value.is_empty()) {
            self.cron.enabled = parse_flag("ENABLE_CRON", &value)?;
        }

        if let Some(schedule) = lookup("CRON_SCHEDULE").filter(|value| !value.is_empty()) {
            self.cron.schedule = schedule;
        }

        Ok(())
    }

    fn expand(&mut self) -> Result<()> {
        self.repo = shellexpand::full(&self.repo)?.into_owned();
        if let Some(file) = &self.logging.file {
            let expanded = shellexpand::full(&file.to_string_lossy())?.into_owned();
            self.logging.file = Some(PathBuf::from(expanded));
        }

        Ok(())
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Transcript logging settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Write transcript of the run to a log file.
    pub enabled: bool,

    /// Path of the transcript log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

/// Nerd Font settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FontSettings {
    /// Install the font at all.
    pub install: bool,

    /// Release archive name without extension.
    pub archive: String,

    /// Font family name used for terminal configuration.
    pub family: String,

    /// Point size used for desktop monospace font setting.
    pub size: u8,

    /// Homebrew cask providing the font on macOS.
    pub cask: String,

    /// Patch known terminal emulator configs with a font directive.
    pub patch_terminals: bool,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            install: true,
            archive: "JetBrainsMono".into(),
            family: "JetBrainsMono Nerd Font".into(),
            size: 11,
            cask: "font-jetbrains-mono-nerd-font".into(),
            patch_terminals: true,
        }
    }
}

impl FontSettings {
    /// Download URL of the release archive.
    pub fn url(&self) -> String {
        format!(
            "https://github.com/ryanoasis/nerd-fonts/releases/latest/download/{}.zip",
            self.archive
        )
    }
}

/// Recurring update job settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CronSettings {
    /// Register the job during a full install.
    pub enabled: bool,

    /// Five-field cron schedule.
    pub schedule: String,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: DEFAULT_SCHEDULE.into(),
        }
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.into(),
        }),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Boolean toggle holds something other than a boolean.
    #[error("{name} must be a boolean, got {value:?}")]
    InvalidFlag { name: &'static str, value: String },

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Default paths cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::collections::HashMap;

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        move |key: &str| vars.get(key).map(|value| value.to_string())
    }

    #[test]
    fn deserialize_partial_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            repo = "https://blah.org/dotfiles.git"

            [font]
            install = false

            [cron]
            schedule = "*/30 * * * *"
        "#
        .parse()?;

        let mut expect = Settings::default();
        expect.repo = "https://blah.org/dotfiles.git".into();
        expect.font.install = false;
        expect.cron.schedule = "*/30 * * * *".into();

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_default_settings() {
        let result = Settings::default().to_string();
        let expect = indoc! {r#"
            repo = "https://github.com/$USER/dotfiles.git"
            shell = "zsh"

            [logging]
            enabled = true

            [font]
            install = true
            archive = "JetBrainsMono"
            family = "JetBrainsMono Nerd Font"
            size = 11
            cask = "font-jetbrains-mono-nerd-font"
            patch_terminals = true

            [cron]
            enabled = true
            schedule = "0 12 * * *"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn environment_overrides_file() -> anyhow::Result<()> {
        let mut settings: Settings = "repo = \"https://blah.org/a.git\"".parse()?;
        settings.apply_env(lookup_from(&[
            ("DOTFILES_REPO", "https://blah.org/b.git"),
            ("ENABLE_LOGGING", "no"),
            ("INSTALL_FONT", "0"),
            ("ENABLE_CRON", "OFF"),
            ("CRON_SCHEDULE", "0 * * * *"),
            ("LOG_FILE", "/tmp/boot.log"),
        ]))?;

        assert_eq!(settings.repo, "https://blah.org/b.git");
        assert!(!settings.logging.enabled);
        assert_eq!(settings.logging.file, Some(PathBuf::from("/tmp/boot.log")));
        assert!(!settings.font.install);
        assert!(!settings.cron.enabled);
        assert_eq!(settings.cron.schedule, "0 * * * *");

        Ok(())
    }

    #[test]
    fn empty_environment_values_keep_defaults() -> anyhow::Result<()> {
        let mut settings = Settings::default();
        settings.apply_env(lookup_from(&[
            ("DOTFILES_REPO", ""),
            ("ENABLE_LOGGING", ""),
            ("LOG_FILE", ""),
            ("INSTALL_FONT", ""),
            ("ENABLE_CRON", ""),
            ("CRON_SCHEDULE", ""),
        ]))?;
        assert_eq!(settings, Settings::default());

        Ok(())
    }

    #[test_case("maybe"; "word")]
    #[test_case("2"; "number")]
    #[test]
    fn garbage_flag_is_rejected(value: &str) {
        let mut settings = Settings::default();
        let result = settings.apply_env(lookup_from(&[("INSTALL_FONT", value)]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidFlag { name: "INSTALL_FONT", .. })
        ));
    }

    #[sealed_test(env = [("USER", "blah"), ("DOTFILES_REPO", ""), ("LOG_FILE", "$HOME/boot.log"), ("HOME", "/home/blah")])]
    fn load_expands_repo_and_log_file() -> anyhow::Result<()> {
        let settings = Settings::load(Some(Path::new("does-not-exist.toml")))?;

        assert_eq!(settings.repo, "https://github.com/blah/dotfiles.git");
        assert_eq!(
            settings.logging.file,
            Some(PathBuf::from("/home/blah/boot.log"))
        );

        Ok(())
    }

    #[sealed_test(env = [("USER", "blah"), ("INSTALL_FONT", "false")])]
    fn load_reads_config_file() -> anyhow::Result<()> {
        std::fs::write(
            "config.toml",
            indoc! {r#"
                shell = "fish"

                [cron]
                enabled = false
            "#},
        )?;

        let settings = Settings::load(Some(Path::new("config.toml")))?;

        assert_eq!(settings.shell, "fish");
        assert!(!settings.cron.enabled);
        assert!(!settings.font.install);
        assert!(settings.logging.file.is_some());

        Ok(())
    }
}
