// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Native package manager and upstream installer invocations.

use crate::{platform::Platform, syscall::Invocation};

use std::path::Path;

/// Upstream installer for Homebrew.
pub const HOMEBREW_INSTALL: &str = "/bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"";

/// Build package manager invocations that install the platform's package list.
///
/// Debian refreshes its package index first. Linux invocations are elevated
/// through `sudo` when requested. Homebrew refuses to run as root, so macOS
/// invocations never are.
pub fn manager_invocations(platform: Platform, elevate: bool) -> Vec<Invocation> {
    let packages = platform.packages().iter().copied();
    match platform {
        Platform::MacOs => vec![Invocation::new("brew").arg("install").args(packages)],
        Platform::Debian => vec![
            Invocation::new("apt-get").arg("update").elevated(elevate),
            Invocation::new("apt-get")
                .args(["install", "-y"])
                .args(packages)
                .elevated(elevate),
        ],
        Platform::Fedora => vec![Invocation::new("dnf")
            .args(["install", "-y"])
            .args(packages)
            .elevated(elevate)],
        Platform::Arch => vec![Invocation::new("pacman")
            .args(["-S", "--needed", "--noconfirm"])
            .args(packages)
            .elevated(elevate)],
    }
}

/// Tools installed through their own upstream install scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTool {
    /// Prompt renderer.
    Starship,

    /// Dotfiles manager.
    Chezmoi,
}

impl UpstreamTool {
    /// Name of installed executable.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Starship => "starship",
            Self::Chezmoi => "chezmoi",
        }
    }

    /// Installer invocation placing executable into target bin directory.
    pub fn installer(&self, bin_dir: &Path) -> Invocation {
        let bin_dir = quote(&bin_dir.to_string_lossy());
        let script = match self {
            Self::Starship => format!(
                "mkdir -p {bin_dir} && curl -sS https://starship.rs/install.sh | sh -s -- --yes --bin-dir {bin_dir}"
            ),
            Self::Chezmoi => format!("sh -c \"$(curl -fsLS get.chezmoi.io)\" -- -b {bin_dir}"),
        };

        Invocation::shell(script)
    }
}

/// Quote string for safe use as a single POSIX shell word.
pub fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn render(invocations: Vec<Invocation>) -> Vec<String> {
        invocations.iter().map(ToString::to_string).collect()
    }

    #[test_case(Platform::Debian, &["sudo apt-get update", "sudo apt-get install -y git curl zsh unzip fontconfig cron"]; "debian")]
    #[test_case(Platform::Fedora, &["sudo dnf install -y git curl zsh unzip fontconfig cronie"]; "fedora")]
    #[test_case(Platform::Arch, &["sudo pacman -S --needed --noconfirm git curl zsh unzip fontconfig cronie"]; "arch")]
    #[test_case(Platform::MacOs, &["brew install git curl zsh"]; "macos")]
    #[test]
    fn elevated_manager_invocations(platform: Platform, expect: &[&str]) {
        assert_eq!(render(manager_invocations(platform, true)), expect);
    }

    #[test]
    fn root_manager_invocations() {
        assert_eq!(
            render(manager_invocations(Platform::Fedora, false)),
            vec!["dnf install -y git curl zsh unzip fontconfig cronie"]
        );
    }

    #[test]
    fn installers_target_bin_dir() {
        let bin_dir = Path::new("/home/blah/.local/bin");

        let starship = UpstreamTool::Starship.installer(bin_dir).to_string();
        assert!(starship.starts_with("sh -c "));
        assert!(starship.contains("--bin-dir '/home/blah/.local/bin'"));

        let chezmoi = UpstreamTool::Chezmoi.installer(bin_dir).to_string();
        assert!(chezmoi.ends_with("-b '/home/blah/.local/bin'"));
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("/plain/path"), "'/plain/path'");
    }
}
