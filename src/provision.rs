// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workstation provisioning sequence.
//!
//! A full run is a fixed, linear sequence of [`Step`]s:
//!
//! 1. Install native packages.
//! 2. Install upstream tools, i.e., the prompt renderer and dotfiles manager.
//! 3. Install a Nerd Font.
//! 4. Switch login shell.
//! 5. Apply the dotfiles profile.
//! 6. Register the recurring update job.
//!
//! The sequence stops at the first failing step. Nothing is retried, and
//! nothing is rolled back.

pub mod cron;
pub mod font;
pub mod packages;

use crate::{
    config::Settings,
    path::Layout,
    platform::Platform,
    provision::{
        cron::{merge_entry, wrapper_script, CronEntry, CronError, Schedule},
        font::FontError,
        packages::{manager_invocations, UpstreamTool, HOMEBREW_INSTALL},
    },
    syscall::{is_executable, Invocation, Syscall, SyscallError, SystemSyscall},
};

use indicatif::ProgressBar;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Single provisioning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Packages,
    Tools,
    Font,
    Shell,
    Dotfiles,
    Cron,
}

impl Step {
    /// Every step of a full run in execution order.
    pub const ALL: [Step; 6] = [
        Step::Packages,
        Step::Tools,
        Step::Font,
        Step::Shell,
        Step::Dotfiles,
        Step::Cron,
    ];
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Packages => "install packages",
            Self::Tools => "install tools",
            Self::Font => "install font",
            Self::Shell => "switch login shell",
            Self::Dotfiles => "apply dotfiles",
            Self::Cron => "register update job",
        };
        fmt.write_str(name)
    }
}

/// Provision a workstation for a detected platform.
#[derive(Debug)]
pub struct Provisioner<S = SystemSyscall>
where
    S: Syscall,
{
    settings: Settings,
    platform: Platform,
    layout: Layout,
    syscall: S,
    login_shell: Option<PathBuf>,
}

impl<S> Provisioner<S>
where
    S: Syscall,
{
    /// Construct new provisioner.
    ///
    /// Current login shell is taken from `$SHELL`.
    pub fn new(settings: Settings, platform: Platform, layout: Layout, syscall: S) -> Self {
        Self {
            settings,
            platform,
            layout,
            syscall,
            login_shell: std::env::var_os("SHELL").map(PathBuf::from),
        }
    }

    /// Override current login shell.
    pub fn with_login_shell(mut self, shell: Option<PathBuf>) -> Self {
        self.login_shell = shell;
        self
    }

    /// Platform being provisioned.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// External program caller in use.
    pub fn syscall(&self) -> &S {
        &self.syscall
    }

    /// Run full provisioning sequence.
    ///
    /// Font installation and update job registration are skipped when their
    /// settings toggle them off.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Step`] wrapping the first failure.
    pub async fn run(&self) -> Result<()> {
        for step in Step::ALL {
            match step {
                Step::Font if !self.settings.font.install => {
                    info!("skip {step}: disabled");
                }
                Step::Cron if !self.settings.cron.enabled => {
                    info!("skip {step}: disabled");
                }
                step => self.run_step(step).await?,
            }
        }

        info!("workstation provisioned for {}", self.platform);
        Ok(())
    }

    /// Run one step, tagging any failure with the step.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Step`] if step fails.
    pub async fn run_step(&self, step: Step) -> Result<()> {
        info!("==> {step}");
        let result = match step {
            Step::Packages => self.install_packages(),
            Step::Tools => self.install_tools(),
            Step::Font => self.install_font().await,
            Step::Shell => self.switch_shell(),
            Step::Dotfiles => self.apply_dotfiles(),
            Step::Cron => self.register_cron(),
        };

        result.map_err(|err| ProvisionError::Step {
            step,
            source: Box::new(err),
        })
    }

    /// Install fixed package list through native package manager.
    ///
    /// Homebrew itself is installed first on macOS if it is missing.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Syscall`] if package manager fails.
    #[instrument(skip(self), level = "debug")]
    pub fn install_packages(&self) -> Result<()> {
        if self.platform == Platform::MacOs && self.syscall.lookup("brew").is_none() {
            info!("homebrew missing, running upstream installer");
            self.syscall
                .interactive(&Invocation::shell(HOMEBREW_INSTALL))?;
        }

        for invocation in manager_invocations(self.platform, self.needs_sudo()?) {
            self.syscall.interactive(&invocation)?;
        }

        Ok(())
    }

    /// Install prompt renderer and dotfiles manager if not already present.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Syscall`] if an upstream installer fails.
    #[instrument(skip(self), level = "debug")]
    pub fn install_tools(&self) -> Result<()> {
        for tool in [UpstreamTool::Starship, UpstreamTool::Chezmoi] {
            if let Some(path) = self.tool_path(tool.program()) {
                info!("{} already installed at {:?}", tool.program(), path.display());
                continue;
            }

            info!("install {}", tool.program());
            self.syscall
                .interactive(&tool.installer(&self.layout.bin_dir))?;
        }

        Ok(())
    }

    /// Install Nerd Font using the strategy of the current platform.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Font`] if download, extraction, or patching
    ///   fails.
    /// - Return [`ProvisionError::Syscall`] if font tooling fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn install_font(&self) -> Result<()> {
        let font = &self.settings.font;
        if self.platform == Platform::MacOs {
            self.syscall.interactive(
                &Invocation::new("brew").args(["install", "--cask", font.cask.as_str()]),
            )?;
        } else {
            let dir = self.layout.font_dir.join(format!("{}NerdFont", font.archive));
            if font::has_font_files(&dir)? {
                info!("font {} already installed in {:?}", font.family, dir.display());
            } else {
                let archive = font::download(&font.url(), ProgressBar::new(0)).await?;
                let count = font::extract(&archive, &dir)?;
                info!("extracted {count} font files into {:?}", dir.display());
                self.syscall.interactive(
                    &Invocation::new("fc-cache").arg("-f").arg(dir.as_os_str()),
                )?;
            }

            self.set_desktop_font()?;
        }

        if font.patch_terminals {
            let config = &self.layout.config_dir;
            if font::patch_kitty(&config.join("kitty").join("kitty.conf"), &font.family)? {
                info!("patched kitty configuration with {}", font.family);
            }
            if font::patch_alacritty(
                &config.join("alacritty").join("alacritty.toml"),
                &font.family,
            )? {
                info!("patched alacritty configuration with {}", font.family);
            }
        }

        Ok(())
    }

    /// Change login shell to target shell when needed.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::MissingProgram`] if target shell is not
    ///   installed.
    /// - Return [`ProvisionError::ShellsFile`] if shell listing cannot be read.
    /// - Return [`ProvisionError::Syscall`] if `chsh` fails.
    #[instrument(skip(self), level = "debug")]
    pub fn switch_shell(&self) -> Result<()> {
        let target = self.settings.shell.as_str();
        let current = self
            .login_shell
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());

        if current.as_deref() == Some(target) {
            info!("login shell already {target}");
            return Ok(());
        }

        let path = self
            .syscall
            .lookup(target)
            .ok_or_else(|| ProvisionError::MissingProgram(target.into()))?;

        if self.platform.is_linux() {
            self.ensure_listed_shell(&path)?;
        }

        info!("switch login shell to {:?}", path.display());
        self.syscall
            .interactive(&Invocation::new("chsh").arg("-s").arg(path.as_os_str()))?;

        Ok(())
    }

    /// Clone and apply dotfiles profile on first run, refresh it afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::MissingProgram`] if dotfiles manager is not
    ///   installed.
    /// - Return [`ProvisionError::Syscall`] if dotfiles manager fails.
    #[instrument(skip(self), level = "debug")]
    pub fn apply_dotfiles(&self) -> Result<()> {
        let chezmoi = self.chezmoi()?;
        let invocation = if self.is_dotfiles_initialized() {
            info!("refresh dotfiles profile");
            Invocation::new(chezmoi).args(["update", "--apply"])
        } else {
            info!("apply dotfiles profile from {}", self.settings.repo);
            Invocation::new(chezmoi).args(["init", "--apply", self.settings.repo.as_str()])
        };

        self.syscall.interactive(&invocation)?;

        Ok(())
    }

    /// Register recurring job that refreshes the dotfiles profile.
    ///
    /// Writes the wrapper script, then appends a crontab entry for it unless
    /// one already exists.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Cron`] if schedule is invalid, wrapper script
    ///   cannot be written, or crontab cannot be read.
    /// - Return [`ProvisionError::Syscall`] if crontab cannot be updated.
    #[instrument(skip(self), level = "debug")]
    pub fn register_cron(&self) -> Result<()> {
        let schedule: Schedule = self.settings.cron.schedule.parse()?;
        let chezmoi = self.chezmoi()?;
        let log = self
            .settings
            .logging
            .enabled
            .then_some(self.settings.logging.file.as_deref())
            .flatten();

        let script = self.layout.update_script();
        cron::write_wrapper(&script, &wrapper_script(&chezmoi, log))?;
        info!("wrote update wrapper {:?}", script.display());

        let entry = CronEntry::new(schedule, &script);
        let existing = self.read_crontab()?;
        match merge_entry(&existing, &entry) {
            None => info!("crontab already has entry for {:?}", script.display()),
            Some(table) => {
                self.syscall
                    .piped(&Invocation::new("crontab").arg("-"), &table)?;
                info!("registered crontab entry: {entry}");
            }
        }

        if let Some(service) = self.platform.cron_service() {
            if self.syscall.lookup("systemctl").is_some() {
                self.syscall.interactive(
                    &Invocation::new("systemctl")
                        .args(["enable", "--now", service])
                        .elevated(self.needs_sudo()?),
                )?;
            }
        }

        Ok(())
    }

    fn read_crontab(&self) -> Result<String> {
        let invocation = Invocation::new("crontab").arg("-l");
        let captured = self.syscall.captured(&invocation)?;
        if captured.success {
            return Ok(captured.stdout);
        }

        if captured.stderr.contains("no crontab") {
            return Ok(String::new());
        }

        Err(CronError::ReadCrontab(captured.stderr.trim().to_owned()).into())
    }

    fn ensure_listed_shell(&self, path: &Path) -> Result<()> {
        let shells_file = &self.layout.shells_file;
        let listing = match read_to_string(shells_file) {
            Ok(listing) => listing,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(ProvisionError::ShellsFile {
                    source: err,
                    path: shells_file.clone(),
                })
            }
        };

        let listed = listing
            .lines()
            .map(str::trim)
            .any(|line| Path::new(line) == path);
        if listed {
            return Ok(());
        }

        warn!("{:?} missing from {:?}, adding it", path.display(), shells_file.display());
        self.syscall.piped(
            &Invocation::new("tee")
                .arg("-a")
                .arg(shells_file.as_os_str())
                .elevated(self.needs_sudo()?),
            &format!("{}\n", path.display()),
        )?;

        Ok(())
    }

    fn set_desktop_font(&self) -> Result<()> {
        if self.syscall.lookup("gsettings").is_none() {
            return Ok(());
        }

        let font = &self.settings.font;
        let invocation = Invocation::new("gsettings").args([
            "set".to_string(),
            "org.gnome.desktop.interface".into(),
            "monospace-font-name".into(),
            format!("{} {}", font.family, font.size),
        ]);

        // No desktop session means nothing to configure.
        let captured = self.syscall.captured(&invocation)?;
        if !captured.success {
            warn!("cannot set desktop monospace font: {}", captured.stderr.trim());
        }

        Ok(())
    }

    fn needs_sudo(&self) -> Result<bool> {
        let invocation = Invocation::new("id").arg("-u");
        let captured = self.syscall.captured(&invocation)?.into_result(&invocation)?;
        Ok(captured.stdout.trim() != "0")
    }

    fn tool_path(&self, program: &str) -> Option<PathBuf> {
        self.syscall.lookup(program).or_else(|| {
            let local = self.layout.bin_dir.join(program);
            is_executable(&local).then_some(local)
        })
    }

    fn chezmoi(&self) -> Result<PathBuf> {
        let program = UpstreamTool::Chezmoi.program();
        self.tool_path(program)
            .ok_or_else(|| ProvisionError::MissingProgram(program.into()))
    }

    fn is_dotfiles_initialized(&self) -> bool {
        git2::Repository::open(&self.layout.dotfiles_source).is_ok()
    }
}

/// Provisioning error types.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// A step failed.
    #[error("failed to {step}")]
    Step {
        step: Step,
        #[source]
        source: Box<ProvisionError>,
    },

    /// Required program is not installed.
    #[error("required program {0:?} not found")]
    MissingProgram(String),

    /// Listing of valid login shells cannot be read.
    #[error("failed to read shell listing at {:?}", path.display())]
    ShellsFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// External program call fails.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Font installation fails.
    #[error(transparent)]
    Font(#[from] FontError),

    /// Update job registration fails.
    #[error(transparent)]
    Cron(#[from] CronError),
}

/// Friendly result alias :3
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
