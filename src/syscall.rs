// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External program invocation.
//!
//! Provisioning is mostly a matter of calling other tools in the right order:
//! package managers, upstream install scripts, `chsh`, `crontab`, and so on.
//! Every one of those calls goes through the [`Syscall`] trait so the
//! provisioning sequence never touches [`std::process::Command`] directly.
//!
//! # Transcripts
//!
//! When a [`Transcript`] is attached to [`SystemSyscall`], the standard output
//! and standard error of interactive programs are piped through the current
//! process, echoed back to the terminal, and appended to the transcript file.
//! Standard input stays attached to the terminal, so password prompts still
//! work.

use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
    thread,
};
use tracing::{debug, info};

/// A single external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Construct invocation of a shell snippet through `sh -c`.
    pub fn shell(script: impl Into<OsString>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Append single argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prefix invocation with `sudo` when requested.
    pub fn elevated(self, elevate: bool) -> Self {
        if !elevate {
            return self;
        }

        let mut args = vec![self.program];
        args.extend(self.args);
        Self {
            program: "sudo".into(),
            args,
        }
    }

    /// Name of program being invoked.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments passed to program.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Output of a non-interactive program call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    /// Program exited successfully.
    pub success: bool,

    /// Everything written to standard output.
    pub stdout: String,

    /// Everything written to standard error.
    pub stderr: String,
}

impl Captured {
    /// Treat non-zero exit as error.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Failed`] if program did not succeed.
    pub fn into_result(self, invocation: &Invocation) -> Result<Self> {
        if !self.success {
            return Err(SyscallError::Failed {
                invocation: invocation.to_string(),
                message: chomp(&self.stderr).to_owned(),
            });
        }

        Ok(self)
    }
}

/// Layer of indirection for external program calls.
pub trait Syscall {
    /// Run program attached to the terminal, fail on non-zero exit.
    fn interactive(&self, invocation: &Invocation) -> Result<()>;

    /// Run program and capture its output without judging exit status.
    fn captured(&self, invocation: &Invocation) -> Result<Captured>;

    /// Run program with given standard input, fail on non-zero exit.
    fn piped(&self, invocation: &Invocation, input: &str) -> Result<()>;

    /// Locate program on `PATH`.
    fn lookup(&self, program: &str) -> Option<PathBuf>;
}

/// External program calls through the operating system.
#[derive(Debug, Default, Clone)]
pub struct SystemSyscall {
    transcript: Option<Transcript>,
}

impl SystemSyscall {
    /// Construct new system caller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tee output of interactive programs into transcript.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }
}

impl Syscall for SystemSyscall {
    fn interactive(&self, invocation: &Invocation) -> Result<()> {
        info!("run {invocation}");
        let status = match &self.transcript {
            None => invocation
                .to_command()
                .spawn()
                .map_err(|err| SyscallError::spawn(invocation, err))?
                .wait()?,
            Some(transcript) => {
                let mut child = invocation
                    .to_command()
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|err| SyscallError::spawn(invocation, err))?;

                // INVARIANT: Drain both pipes concurrently so neither blocks the child.
                let stdout = child.stdout.take();
                let stderr = child.stderr.take();
                thread::scope(|scope| {
                    if let Some(stdout) = stdout {
                        scope.spawn(|| tee(stdout, io::stdout(), transcript));
                    }
                    if let Some(stderr) = stderr {
                        scope.spawn(|| tee(stderr, io::stderr(), transcript));
                    }
                });

                child.wait()?
            }
        };

        if !status.success() {
            return Err(SyscallError::Failed {
                invocation: invocation.to_string(),
                message: status.to_string(),
            });
        }

        Ok(())
    }

    fn captured(&self, invocation: &Invocation) -> Result<Captured> {
        debug!("capture {invocation}");
        let output = invocation
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|err| SyscallError::spawn(invocation, err))?;

        let captured = Captured {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        };

        if let Some(transcript) = &self.transcript {
            transcript.append(&captured.stdout);
            transcript.append(&captured.stderr);
        }

        Ok(captured)
    }

    fn piped(&self, invocation: &Invocation, input: &str) -> Result<()> {
        debug!("pipe into {invocation}");
        let mut child = invocation
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| SyscallError::spawn(invocation, err))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        Captured {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        }
        .into_result(invocation)?;

        Ok(())
    }

    fn lookup(&self, program: &str) -> Option<PathBuf> {
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

/// Shared append-only transcript file.
///
/// Cloning a transcript hands out another handle to the same file, so the
/// logging layer and [`SystemSyscall`] can write into it together.
#[derive(Debug, Clone)]
pub struct Transcript {
    file: Arc<File>,
    path: PathBuf,
}

impl Transcript {
    /// Open transcript file for appending, creating parent directories.
    ///
    /// # Errors
    ///
    /// - Return [`SyscallError::Transcript`] if file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let to_error = |err| SyscallError::Transcript {
            source: err,
            path: path.clone(),
        };

        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(to_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(to_error)?;

        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    /// Path of transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle usable as a [`tracing_subscriber`] writer.
    pub fn writer(&self) -> Arc<File> {
        self.file.clone()
    }

    fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }

        // Transcript loss must never abort provisioning.
        let _ = (&*self.file).write_all(text.as_bytes());
    }
}

fn tee(source: impl Read, mut sink: impl Write, transcript: &Transcript) {
    let mut reader = BufReader::new(source);
    let mut line = Vec::new();
    while let Ok(count) = reader.read_until(b'\n', &mut line) {
        if count == 0 {
            break;
        }

        let _ = sink.write_all(&line);
        let _ = sink.flush();
        transcript.append(&String::from_utf8_lossy(&line));
        line.clear();
    }
}

/// Check that path is a regular file with an execute bit set.
#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: &str) -> &str {
    message.trim_end_matches(['\r', '\n'])
}

/// External program invocation error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Program could not be started at all.
    #[error("failed to run {invocation:?}")]
    Spawn {
        #[source]
        source: io::Error,
        invocation: String,
    },

    /// Program exited with failure.
    #[error("command {invocation:?} failed: {message}")]
    Failed { invocation: String, message: String },

    /// Transcript file cannot be opened.
    #[error("failed to open transcript at {:?}", path.display())]
    Transcript {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Waiting on, or writing to, a running program failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyscallError {
    fn spawn(invocation: &Invocation, source: io::Error) -> Self {
        Self::Spawn {
            source,
            invocation: invocation.to_string(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
