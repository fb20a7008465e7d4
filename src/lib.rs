// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap a developer workstation.
//!
//! Dotstrap detects the current platform, installs a handful of packages
//! through the native package manager, installs a Nerd Font, switches the
//! login shell, and applies a dotfiles profile through [chezmoi]. It can also
//! register a recurring crontab job that keeps the profile fresh.
//!
//! Dotstrap is a convenience wrapper. All real work is done by the external
//! programs it calls, and the first failing call stops the whole run.
//!
//! [chezmoi]: https://www.chezmoi.io

pub mod config;
pub mod path;
pub mod platform;
pub mod provision;
pub mod syscall;
