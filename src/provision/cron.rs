// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Recurring dotfiles update job.
//!
//! The job is a plain crontab line that runs a small generated wrapper
//! script. The wrapper calls the dotfiles manager's update command with an
//! absolute path, because cron runs with a bare `PATH`.
//!
//! Registration is idempotent. A crontab line that already references the
//! wrapper script counts as the job being registered, whatever its schedule.

use crate::provision::packages::quote;

use regex::Regex;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{write, Permissions},
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

static SCHEDULE: LazyLock<Regex> = LazyLock::new(|| {
    // INVARIANT: Exactly five whitespace separated fields of numbers, steps,
    // ranges, lists, and wildcards.
    Regex::new(r"^([0-9*/,\-]+\s+){4}[0-9*/,\-]+$").expect("schedule pattern is valid")
});

/// Validated five-field cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule(String);

impl Schedule {
    /// Schedule as written into the crontab.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Schedule {
    type Err = CronError;

    fn from_str(schedule: &str) -> Result<Self, Self::Err> {
        let schedule = schedule.trim();
        if !SCHEDULE.is_match(schedule) {
            return Err(CronError::InvalidSchedule(schedule.into()));
        }

        Ok(Self(schedule.split_whitespace().collect::<Vec<_>>().join(" ")))
    }
}

impl Display for Schedule {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.0)
    }
}

/// Single crontab line running a command on a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEntry {
    schedule: Schedule,
    command: PathBuf,
}

impl CronEntry {
    /// Construct new crontab entry.
    pub fn new(schedule: Schedule, command: impl Into<PathBuf>) -> Self {
        Self {
            schedule,
            command: command.into(),
        }
    }

    /// Command run by entry.
    pub fn command(&self) -> &Path {
        &self.command
    }
}

impl Display for CronEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} {}",
            self.schedule,
            quote(&self.command.to_string_lossy())
        )
    }
}

/// Merge entry into existing crontab.
///
/// Returns `None` if an active line already references the entry's command,
/// quoted or not. Otherwise returns the full crontab with the entry appended.
pub fn merge_entry(existing: &str, entry: &CronEntry) -> Option<String> {
    let command = entry.command().to_string_lossy();
    let quoted = quote(&command);
    let registered = existing
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .any(|line| line.contains(quoted.as_str()) || references(line, &command));
    if registered {
        return None;
    }

    let mut table = existing.to_owned();
    if !table.is_empty() && !table.ends_with('\n') {
        table.push('\n');
    }
    table.push_str(&format!("{entry}\n"));

    Some(table)
}

// INVARIANT: Raw path must end at a word boundary, so a longer sibling path
// does not count as a match.
fn references(line: &str, command: &str) -> bool {
    line.match_indices(command).any(|(start, _)| {
        let before = line[..start].chars().next_back();
        let after = line[start + command.len()..].chars().next();
        before.is_none_or(char::is_whitespace) && after.is_none_or(char::is_whitespace)
    })
}

/// Render wrapper script that refreshes the dotfiles profile.
///
/// Output is appended to the transcript log when one is given.
pub fn wrapper_script(chezmoi: &Path, log: Option<&Path>) -> String {
    let mut command = format!(
        "exec {} update --apply --force",
        quote(&chezmoi.to_string_lossy())
    );
    if let Some(log) = log {
        command.push_str(&format!(" >> {} 2>&1", quote(&log.to_string_lossy())));
    }

    format!("#!/bin/sh\n{command}\n")
}

/// Write wrapper script as an executable file.
///
/// # Errors
///
/// - Return [`CronError::WriteScript`] if script cannot be written.
pub fn write_wrapper(path: &Path, content: &str) -> Result<()> {
    let to_error = |err| CronError::WriteScript {
        source: err,
        path: path.to_path_buf(),
    };

    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(to_error)?;
    }
    write(path, content).map_err(to_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, Permissions::from_mode(0o755)).map_err(to_error)?;
    }

    Ok(())
}

/// Update job registration error types.
#[derive(Debug, thiserror::Error)]
pub enum CronError {
    /// Schedule is not a five-field cron expression.
    #[error("invalid cron schedule {0:?}, expected five fields like \"0 12 * * *\"")]
    InvalidSchedule(String),

    /// Current crontab cannot be read.
    #[error("failed to read crontab: {0}")]
    ReadCrontab(String),

    /// Wrapper script cannot be written.
    #[error("failed to write update wrapper at {:?}", path.display())]
    WriteScript {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = CronError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    fn entry() -> CronEntry {
        CronEntry::new("0 12 * * *".parse().unwrap(), "/home/blah/.local/bin/dotfiles-update")
    }

    #[test_case("0 12 * * *"; "daily at noon")]
    #[test_case("*/15 * * * *"; "every quarter hour")]
    #[test_case("0 9-17 * * 1-5"; "office hours")]
    #[test_case("0,30 8 1,15 * *"; "lists")]
    #[test_case("  5   4 * * 0  "; "extra whitespace")]
    #[test]
    fn valid_schedule(schedule: &str) {
        assert!(schedule.parse::<Schedule>().is_ok());
    }

    #[test_case("0 12 * *"; "four fields")]
    #[test_case("0 12 * * * *"; "six fields")]
    #[test_case(""; "empty")]
    #[test_case("@daily"; "at shortcut")]
    #[test_case("0 12 * * mon"; "named weekday")]
    #[test_case("0 12 * * *; rm -rf ~"; "trailing command")]
    #[test]
    fn invalid_schedule(schedule: &str) {
        let result = schedule.parse::<Schedule>();
        assert!(matches!(result, Err(CronError::InvalidSchedule(_))));
    }

    #[test]
    fn schedule_whitespace_normalized() {
        let schedule: Schedule = "  5   4 * *\t0 ".parse().unwrap();
        assert_eq!(schedule.as_str(), "5 4 * * 0");
    }

    #[test]
    fn merge_into_empty_crontab() {
        let result = merge_entry("", &entry());
        assert_eq!(
            result.as_deref(),
            Some("0 12 * * * '/home/blah/.local/bin/dotfiles-update'\n")
        );
    }

    #[test]
    fn merge_keeps_existing_entries() {
        let existing = "MAILTO=\"\"\n0 1 * * * /usr/bin/backup";
        let result = merge_entry(existing, &entry());
        let expect = indoc! {r#"
            MAILTO=""
            0 1 * * * /usr/bin/backup
            0 12 * * * '/home/blah/.local/bin/dotfiles-update'
        "#};
        assert_eq!(result.as_deref(), Some(expect));
    }

    #[test]
    fn merge_is_idempotent() {
        let once = merge_entry("0 1 * * * /usr/bin/backup\n", &entry()).unwrap();
        assert_eq!(merge_entry(&once, &entry()), None);
    }

    #[test]
    fn merge_detects_entry_with_other_schedule() {
        let existing = "*/5 * * * * /home/blah/.local/bin/dotfiles-update\n";
        assert_eq!(merge_entry(existing, &entry()), None);
    }

    #[test]
    fn merge_ignores_commented_entry() {
        let existing = "# 0 12 * * * /home/blah/.local/bin/dotfiles-update\n";
        let result = merge_entry(existing, &entry()).unwrap();
        assert_eq!(result.lines().count(), 2);
    }

    #[test]
    fn merge_ignores_similar_command() {
        let existing = "0 12 * * * /home/blah/.local/bin/dotfiles-update-old\n";
        assert!(merge_entry(existing, &entry()).is_some());

        let existing = "0 12 * * * '/home/blah/.local/bin/dotfiles-update-old'\n";
        assert!(merge_entry(existing, &entry()).is_some());
    }

    #[test]
    fn merge_is_idempotent_with_space_in_home() {
        let entry = CronEntry::new(
            "0 12 * * *".parse().unwrap(),
            "/home/john doe/.local/bin/dotfiles-update",
        );

        let once = merge_entry("", &entry).unwrap();
        assert_eq!(once, "0 12 * * * '/home/john doe/.local/bin/dotfiles-update'\n");
        assert_eq!(merge_entry(&once, &entry), None);
    }

    #[test]
    fn wrapper_script_with_log() {
        let result = wrapper_script(
            Path::new("/home/blah/.local/bin/chezmoi"),
            Some(Path::new("/home/blah/.local/state/dotstrap/bootstrap.log")),
        );
        let expect = indoc! {r#"
            #!/bin/sh
            exec '/home/blah/.local/bin/chezmoi' update --apply --force >> '/home/blah/.local/state/dotstrap/bootstrap.log' 2>&1
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn wrapper_script_without_log() {
        let result = wrapper_script(Path::new("/usr/bin/chezmoi"), None);
        assert_eq!(result, "#!/bin/sh\nexec '/usr/bin/chezmoi' update --apply --force\n");
    }

    #[cfg(unix)]
    #[sealed_test]
    fn wrapper_written_executable() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path = Path::new("bin/dotfiles-update");
        write_wrapper(path, "#!/bin/sh\n")?;

        let mode = std::fs::metadata(path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(std::fs::read_to_string(path)?, "#!/bin/sh\n");

        Ok(())
    }
}
