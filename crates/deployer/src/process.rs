//! Subprocess plumbing shared by every deployer, strategy and phase.
//!
//! All external actions go through [`CommandRunner`] so that the PATH
//! augmentation done during environment preparation applies everywhere and
//! so that callers can substitute a scripted runner in tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{DeployError, Result};

/// Lines of stderr kept for the error of a failed command.
const STDERR_TAIL_LINES: usize = 40;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined by spaces, for logs and error messages.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Executes external commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and return its stdout. A non-zero exit is an error.
    async fn output(&self, spec: &CommandSpec) -> Result<String>;

    /// Run the command, discarding its output.
    async fn run(&self, spec: &CommandSpec) -> Result<()> {
        self.output(spec).await.map(|_| ())
    }

    /// Put `dir` in front of the PATH seen by every later command.
    fn prepend_path(&self, dir: &Path);
}

/// How many lines of a stream outlive the log.
#[derive(Debug, Clone, Copy)]
enum Retain {
    Nothing,
    All,
    Tail(usize),
}

/// Runs commands as real child processes.
///
/// Output is logged line by line while the child runs: at debug level, or
/// at info level in verbose mode.
#[derive(Debug, Default)]
pub struct SystemRunner {
    verbose: bool,
    extra_path: RwLock<Vec<PathBuf>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn search_path(&self) -> Option<OsString> {
        let extra = self
            .extra_path
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if extra.is_empty() {
            return None;
        }

        let mut dirs: Vec<PathBuf> = extra.iter().rev().cloned().collect();
        if let Some(current) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&current));
        }
        std::env::join_paths(dirs).ok()
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }
        if let Some(path) = self.search_path() {
            command.env("PATH", path);
        }
        for (key, value) in &spec.envs {
            command.env(key, value);
        }
        command
    }

    /// Spawn the command and log its output as it arrives. Returns stdout
    /// when `capture` is set, and an empty string otherwise.
    async fn execute(&self, spec: &CommandSpec, capture: bool) -> Result<String> {
        debug!("Running {} in {:?}", spec.command_line(), spec.cwd);

        let mut child = self.command(spec).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployError::CommandNotFound(spec.program.clone())
            } else {
                DeployError::Io(e)
            }
        })?;

        let stdout_retain = if capture { Retain::All } else { Retain::Nothing };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, stderr) = tokio::try_join!(
            self.pump(spec, "stdout", stdout, stdout_retain),
            self.pump(spec, "stderr", stderr, Retain::Tail(STDERR_TAIL_LINES)),
        )?;
        let status = child.wait().await?;

        if !status.success() {
            return Err(DeployError::CommandFailed {
                command: spec.command_line(),
                status: status.to_string(),
                stderr: stderr.join("\n").trim().to_string(),
            });
        }

        let mut out = stdout.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }

    /// Log every line of `reader` until it closes, keeping what `retain` asks for.
    async fn pump<R>(
        &self,
        spec: &CommandSpec,
        stream: &'static str,
        reader: Option<R>,
        retain: Retain,
    ) -> Result<Vec<String>>
    where
        R: AsyncRead + Unpin,
    {
        let Some(reader) = reader else {
            return Ok(Vec::new());
        };
        let mut reader = BufReader::new(reader);
        let mut kept = VecDeque::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(|c: char| c == '\n' || c == '\r')
                .to_string();
            if self.verbose {
                info!(command = %spec.program, stream, "{}", line);
            } else {
                debug!(command = %spec.program, stream, "{}", line);
            }

            match retain {
                Retain::Nothing => {}
                Retain::All => kept.push_back(line),
                Retain::Tail(max) => {
                    if kept.len() == max {
                        kept.pop_front();
                    }
                    kept.push_back(line);
                }
            }
        }
        Ok(kept.into())
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<String> {
        self.execute(spec, true).await
    }

    async fn run(&self, spec: &CommandSpec) -> Result<()> {
        self.execute(spec, false).await.map(|_| ())
    }

    fn prepend_path(&self, dir: &Path) {
        debug!(dir = %dir.display(), "Prepending to PATH");
        self.extra_path
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(dir.to_path_buf());
    }
}
