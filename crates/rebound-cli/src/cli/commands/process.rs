//! Child processes as policy operations: stdout on success, a typed failure
//! on a non-zero exit, and early termination when the cancel signal fires.

use std::fmt;
use std::io::Read;
use std::process::{Output, Stdio};

use anyhow::{bail, Result};
use rebound_core::retry::WAIT_SLICE;
use rebound_core::{CancelKind, CancellationToken, Canceled, Failure};

/// The child exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailed {
    pub command: String,
    /// Exit code; `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with status {}", self.command, code)?,
            None => write!(f, "`{}` was terminated by a signal", self.command)?,
        }
        if let Some(line) = self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            write!(f, ": {}", line.trim())?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailed {}

/// Program plus arguments, run without a shell unless built with [`ShellCommand::shell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
}

impl ShellCommand {
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("no command given");
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// `sh -c <line>`.
    pub fn shell(line: &str) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), line.to_string()],
        }
    }

    /// Spawn and wait on the current thread, polling the cancel signal.
    pub fn run_blocking(&self, cancel: &CancellationToken) -> Result<String, Failure> {
        let mut child = std::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Failure::new)?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.interrupted());
            }
            match child.try_wait().map_err(Failure::new)? {
                Some(status) => break status,
                None => std::thread::sleep(WAIT_SLICE),
            }
        };

        let output = Output {
            status,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        };
        self.check(output)
    }

    /// Spawn and await; the child is killed if the cancel signal wins.
    pub async fn run_async(&self, cancel: CancellationToken) -> Result<String, Failure> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Failure::new)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.interrupted()),
            output = child.wait_with_output() => self.check(output.map_err(Failure::new)?),
        }
    }

    fn check(&self, output: Output) -> Result<String, Failure> {
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        Err(Failure::new(CommandFailed {
            command: self.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }))
    }

    fn interrupted(&self) -> Failure {
        tracing::debug!(command = %self, "killing child after cancel");
        Failure::new(
            Canceled::new(CancelKind::Operation).with_message(format!("`{}` was interrupted", self)),
        )
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

type Reader = std::thread::JoinHandle<std::io::Result<Vec<u8>>>;

/// Read a pipe to the end on its own thread so the child never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Reader {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(reader: Option<Reader>) -> Result<Vec<u8>, Failure> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| Failure::msg("pipe reader panicked"))?
            .map_err(Failure::new),
        None => Ok(Vec::new()),
    }
}
