//! Subprocess invocation.
//!
//! Every call into tmux or a version control binary goes through
//! [`Invocation`], which logs the command line, maps failures onto
//! [`SystemError`], and kills the child if its future is dropped.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdout, Command},
};

use crate::{Error, Result, SystemError};

/// A program that can be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    name: String,
    path: PathBuf,
}

impl Executable {
    /// Resolve `name` against `$PATH` (or use it directly if it is a path).
    ///
    /// # Errors
    ///
    /// Returns `SystemError::CommandNotFound` if the program cannot be found.
    pub fn lookup(name: &str) -> Result<Self> {
        which::which(name)
            .map(|path| Self {
                name: name.to_string(),
                path,
            })
            .map_err(|e| {
                Error::System(SystemError::CommandNotFound {
                    program: name.to_string(),
                    reason: e.to_string(),
                })
            })
    }

    /// Short name used in log lines and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start building an invocation of this program.
    pub fn invoke<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            name: self.name.clone(),
            path: self.path.clone(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            inherit_stdin: false,
            interactive: false,
        }
    }
}

/// A single command line, ready to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    name: String,
    path: PathBuf,
    args: Vec<String>,
    dir: Option<PathBuf>,
    inherit_stdin: bool,
    interactive: bool,
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl Output {
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl Invocation {
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Let the child read from this process's stdin.
    ///
    /// tmux needs a terminal on stdin to work out the client size when
    /// creating a detached session.
    pub const fn inherit_stdin(mut self) -> Self {
        self.inherit_stdin = true;
        self
    }

    /// Hand the terminal over to the child entirely (e.g. `attach-session`).
    pub const fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        if self.interactive {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            let stdin = if self.inherit_stdin {
                Stdio::inherit()
            } else {
                Stdio::null()
            };
            cmd.stdin(stdin).stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        cmd
    }

    fn spawn_error(&self, err: &std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::System(SystemError::CommandNotFound {
                program: self.name.clone(),
                reason: err.to_string(),
            })
        } else {
            Error::io_error(format!("failed to run {self}: {err}"))
        }
    }

    /// The error for this command exiting unsuccessfully.
    pub(crate) fn failure(&self, exit_code: Option<i32>, stderr: &str) -> Error {
        Error::System(SystemError::CommandFailed {
            program: self.name.clone(),
            args: self.args.clone(),
            exit_code,
            stderr: stderr.trim().to_string(),
        })
    }

    /// Run to completion without failing on a non-zero exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be started.
    pub async fn output(self) -> Result<Output> {
        tracing::debug!(command = %self, dir = ?self.dir, "exec");
        let out = self
            .command()
            .output()
            .await
            .map_err(|e| self.spawn_error(&e))?;
        Ok(Output {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            exit_code: out.status.code(),
        })
    }

    /// Run to completion and return stdout with trailing newlines removed.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::CommandFailed` on a non-zero exit status.
    pub async fn stdout(self) -> Result<String> {
        let this = self.clone();
        let out = self.output().await?;
        if out.success() {
            Ok(out.stdout.trim_end_matches('\n').to_string())
        } else {
            Err(this.failure(out.exit_code, &out.stderr))
        }
    }

    /// Run to completion, discarding stdout.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::CommandFailed` on a non-zero exit status.
    pub async fn run(self) -> Result<()> {
        if !self.interactive {
            return self.stdout().await.map(|_| ());
        }
        tracing::debug!(command = %self, dir = ?self.dir, "exec (interactive)");
        let status = self
            .command()
            .status()
            .await
            .map_err(|e| self.spawn_error(&e))?;
        if status.success() {
            Ok(())
        } else {
            Err(self.failure(status.code(), ""))
        }
    }

    /// Start the command and stream its stdout line by line.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started.
    pub fn spawn_stdout(self) -> Result<StreamingOutput> {
        tracing::debug!(command = %self, dir = ?self.dir, "exec (streaming)");
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::io_error(format!("{self}: stdout was not captured")))?;
        Ok(StreamingOutput {
            lines: BufReader::new(stdout).lines(),
            child,
            invocation: self,
        })
    }
}

/// A running command whose stdout is consumed incrementally.
pub struct StreamingOutput {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    invocation: Invocation,
}

impl StreamingOutput {
    /// Next line of stdout, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the pipe fails.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines
            .next_line()
            .await
            .map_err(|e| Error::io_error(format!("reading from {}: {e}", self.invocation)))
    }

    /// Stop reading early. The child is killed.
    ///
    /// # Errors
    ///
    /// Returns an error if the child could not be signalled.
    pub async fn cancel(mut self) -> Result<()> {
        match self.child.kill().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(Error::io_error(format!("killing {}: {e}", self.invocation))),
        }
    }

    /// Wait for the command to exit after stdout was drained.
    ///
    /// # Errors
    ///
    /// Returns `SystemError::CommandFailed` on a non-zero exit status.
    pub async fn finish(mut self) -> Result<()> {
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            use tokio::io::AsyncReadExt;
            // Best effort; the exit status is what matters.
            let _ = pipe.read_to_string(&mut stderr).await;
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::io_error(format!("waiting for {}: {e}", self.invocation)))?;
        if status.success() {
            Ok(())
        } else {
            Err(self.invocation.failure(status.code(), &stderr))
        }
    }
}
