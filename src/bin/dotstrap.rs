// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstrap::{
    config::Settings,
    path::{default_config_file, Layout},
    platform::Platform,
    provision::{Provisioner, Step},
    syscall::{SystemSyscall, Transcript},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use inquire::Confirm;
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotstrap [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self, settings: Settings, transcript: Option<Transcript>) -> Result<()> {
        if let Command::Detect = self.command {
            println!("{}", Platform::detect()?);
            return Ok(());
        }

        let platform = Platform::detect()?;
        info!("detected platform {platform}");

        let mut syscall = SystemSyscall::new();
        if let Some(transcript) = transcript {
            info!("writing transcript to {:?}", transcript.path().display());
            syscall = syscall.with_transcript(transcript);
        }

        match self.command {
            Command::Install(opts) => run_install(opts, settings, platform, syscall).await,
            Command::Packages => run_step(Step::Packages, settings, platform, syscall).await,
            Command::Tools => run_step(Step::Tools, settings, platform, syscall).await,
            Command::Font => run_step(Step::Font, settings, platform, syscall).await,
            Command::Shell => run_step(Step::Shell, settings, platform, syscall).await,
            Command::Dotfiles => run_step(Step::Dotfiles, settings, platform, syscall).await,
            Command::Cron => run_step(Step::Cron, settings, platform, syscall).await,
            Command::Detect => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the full provisioning sequence.
    #[command(override_usage = "dotstrap install [options]")]
    Install(InstallOptions),

    /// Print detected platform tag.
    Detect,

    /// Install packages through native package manager.
    Packages,

    /// Install prompt renderer and dotfiles manager.
    Tools,

    /// Install Nerd Font and patch terminal configuration.
    Font,

    /// Switch login shell.
    Shell,

    /// Apply or refresh dotfiles profile.
    Dotfiles,

    /// Register recurring dotfiles update job.
    Cron,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Skip font installation.
    #[arg(long)]
    pub no_font: bool,

    /// Skip update job registration.
    #[arg(long)]
    pub no_cron: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let setup = setup(&cli);

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let file_layer = setup.as_ref().ok().and_then(|(_, transcript)| {
        transcript.as_ref().map(|transcript| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(transcript.writer())
        })
    });
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(file_layer)
        .with(filter)
        .init();

    let result = match setup {
        Ok((settings, transcript)) => cli.run(settings, transcript).await,
        Err(error) => Err(error),
    };

    if let Err(error) = result {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn setup(cli: &Cli) -> Result<(Settings, Option<Transcript>)> {
    let config = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_file()?,
    };
    let settings = Settings::load(Some(&config))?;

    let transcript = match (&settings.logging.file, settings.logging.enabled) {
        (Some(file), true) => Some(Transcript::open(file)?),
        _ => None,
    };

    Ok((settings, transcript))
}

async fn run_install(
    opts: InstallOptions,
    mut settings: Settings,
    platform: Platform,
    syscall: SystemSyscall,
) -> Result<()> {
    if opts.no_font {
        settings.font.install = false;
    }
    if opts.no_cron {
        settings.cron.enabled = false;
    }

    if !opts.yes {
        let proceed = Confirm::new(&format!("Provision this {platform} workstation?"))
            .with_default(true)
            .with_help_message(&format!("dotfiles from {}", settings.repo))
            .prompt()?;
        if !proceed {
            info!("aborted");
            return Ok(());
        }
    }

    Provisioner::new(settings, platform, Layout::discover()?, syscall)
        .run()
        .await?;

    Ok(())
}

async fn run_step(
    step: Step,
    settings: Settings,
    platform: Platform,
    syscall: SystemSyscall,
) -> Result<()> {
    Provisioner::new(settings, platform, Layout::discover()?, syscall)
        .run_step(step)
        .await?;

    Ok(())
}
