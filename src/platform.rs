// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Platform detection.
//!
//! Dotstrap only knows how to provision a fixed set of platforms. The
//! operating system is read from the compile target, and on Linux the
//! distribution is read from `/etc/os-release`. Anything outside of the
//! supported set is rejected outright, because there is no sensible package
//! manager to fall back on.
//!
//! # See Also
//!
//! - [Man page os-release](https://www.freedesktop.org/software/systemd/man/latest/os-release.html)

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Standard location of the distribution identification file.
pub const OS_RELEASE: &str = "/etc/os-release";

/// Supported platform tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// macOS with Homebrew.
    MacOs,

    /// Debian and its derivatives through apt.
    Debian,

    /// Fedora and the Red Hat family through dnf.
    Fedora,

    /// Arch Linux and its derivatives through pacman.
    Arch,
}

impl Platform {
    /// Detect platform of current machine.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::UnsupportedOs`] if operating system is not
    ///   macOS or Linux.
    /// - Return [`PlatformError::MissingDistroFile`] if `/etc/os-release`
    ///   cannot be read on Linux.
    /// - Return [`PlatformError::UnsupportedDistro`] if distribution is not
    ///   recognized.
    #[instrument(level = "debug")]
    pub fn detect() -> Result<Self> {
        Self::detect_with(std::env::consts::OS, OS_RELEASE)
    }

    /// Detect platform from an explicit OS name and os-release path.
    pub fn detect_with(os: &str, os_release: impl AsRef<Path>) -> Result<Self> {
        match os {
            "macos" => Ok(Self::MacOs),
            "linux" => {
                let path = os_release.as_ref();
                let content = read_to_string(path).map_err(|err| {
                    PlatformError::MissingDistroFile {
                        source: err,
                        path: path.to_path_buf(),
                    }
                })?;
                Self::from_os_release(&content)
            }
            other => Err(PlatformError::UnsupportedOs(other.into())),
        }
    }

    /// Determine platform from contents of an os-release file.
    ///
    /// The `ID` field is matched first. Unknown identifiers fall through to
    /// each entry of `ID_LIKE` in order.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::UnsupportedDistro`] if neither `ID` nor
    ///   `ID_LIKE` name a supported distribution.
    pub fn from_os_release(content: &str) -> Result<Self> {
        let fields = parse_os_release(content);
        let id = fields.get("ID").cloned().unwrap_or_default();
        debug!("distribution id {id:?}");

        if let Ok(platform) = id.parse() {
            return Ok(platform);
        }

        fields
            .get("ID_LIKE")
            .into_iter()
            .flat_map(|like| like.split_whitespace())
            .find_map(|like| like.parse().ok())
            .ok_or(PlatformError::UnsupportedDistro(id))
    }

    /// Check if platform runs Linux.
    pub fn is_linux(&self) -> bool {
        !matches!(self, Self::MacOs)
    }

    /// Packages installed through the native package manager.
    pub fn packages(&self) -> &'static [&'static str] {
        match self {
            Self::MacOs => &["git", "curl", "zsh"],
            Self::Debian => &["git", "curl", "zsh", "unzip", "fontconfig", "cron"],
            Self::Fedora | Self::Arch => &["git", "curl", "zsh", "unzip", "fontconfig", "cronie"],
        }
    }

    /// Name of the system service running the cron daemon, if managed.
    pub fn cron_service(&self) -> Option<&'static str> {
        match self {
            Self::MacOs => None,
            Self::Debian => Some("cron"),
            Self::Fedora | Self::Arch => Some("cronie"),
        }
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        match id {
            "macos" | "darwin" => Ok(Self::MacOs),
            "debian" | "ubuntu" | "linuxmint" | "pop" | "elementary" | "zorin" | "kali"
            | "raspbian" => Ok(Self::Debian),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" | "nobara" => Ok(Self::Fedora),
            "arch" | "manjaro" | "endeavouros" | "garuda" | "artix" => Ok(Self::Arch),
            other => Err(PlatformError::UnsupportedDistro(other.into())),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let tag = match self {
            Self::MacOs => "macos",
            Self::Debian => "debian",
            Self::Fedora => "fedora",
            Self::Arch => "arch",
        };
        fmt.write_str(tag)
    }
}

fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (key.trim().to_owned(), value.to_ascii_lowercase())
        })
        .collect()
}

/// Platform detection error types.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Operating system is not supported at all.
    #[error("unsupported operating system {0:?}")]
    UnsupportedOs(String),

    /// Linux distribution is not supported.
    #[error("unsupported linux distribution {0:?}")]
    UnsupportedDistro(String),

    /// Distribution identification file cannot be read.
    #[error("cannot read distribution file at {:?}", path.display())]
    MissingDistroFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PlatformError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use simple_test_case::test_case;

    #[test_case("ubuntu", Platform::Debian; "ubuntu")]
    #[test_case("debian", Platform::Debian; "debian")]
    #[test_case("pop", Platform::Debian; "pop os")]
    #[test_case("fedora", Platform::Fedora; "fedora")]
    #[test_case("rocky", Platform::Fedora; "rocky")]
    #[test_case("arch", Platform::Arch; "arch")]
    #[test_case("manjaro", Platform::Arch; "manjaro")]
    #[test]
    fn distro_id_maps_to_platform(id: &str, expect: Platform) {
        let content = format!("NAME=\"Whatever\"\nID={id}\n");
        let result = Platform::from_os_release(&content).unwrap();
        assert_eq!(result, expect);
    }

    #[test_case("gentoo"; "gentoo")]
    #[test_case("nixos"; "nixos")]
    #[test_case(""; "empty id")]
    #[test]
    fn unknown_distro_id_fails(id: &str) {
        let content = format!("ID={id}\n");
        let result = Platform::from_os_release(&content);
        assert!(matches!(result, Err(PlatformError::UnsupportedDistro(got)) if got == id));
    }

    #[test]
    fn quoted_id_like_fallback() {
        let content = indoc! {r#"
            # derivative with its own id
            NAME="Tuxedo OS"
            ID="tuxedo"
            ID_LIKE="ubuntu debian"
        "#};
        let result = Platform::from_os_release(content).unwrap();
        assert_eq!(result, Platform::Debian);
    }

    #[test]
    fn id_takes_priority_over_id_like() {
        let content = "ID=fedora\nID_LIKE=\"rhel centos\"\n";
        let result = Platform::from_os_release(content).unwrap();
        assert_eq!(result, Platform::Fedora);
    }

    #[test]
    fn macos_skips_distro_file() {
        let result = Platform::detect_with("macos", "/definitely/not/here").unwrap();
        assert_eq!(result, Platform::MacOs);
    }

    #[test]
    fn linux_without_distro_file_fails() {
        let result = Platform::detect_with("linux", "/definitely/not/here");
        assert!(matches!(result, Err(PlatformError::MissingDistroFile { .. })));
    }

    #[test]
    fn other_os_fails() {
        let result = Platform::detect_with("freebsd", OS_RELEASE);
        assert!(matches!(result, Err(PlatformError::UnsupportedOs(os)) if os == "freebsd"));
    }

    #[test]
    fn platform_tag_display() {
        assert_eq!(Platform::MacOs.to_string(), "macos");
        assert_eq!(Platform::Arch.to_string(), "arch");
    }
}
