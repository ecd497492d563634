//! Blocking invocation of external tools with captured output.

use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{program} not found on PATH")]
    Missing { program: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {}: {stderr}", .status.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Captured result of a successful run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// One external command line.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: String,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Bytes fed to the tool's standard input
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. A non-zero exit is an error carrying stderr.
    pub fn run(&self) -> ToolResult<ToolOutput> {
        debug!(command = %self.command_line(), "Running external tool");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;

        if let (Some(data), Some(mut pipe)) = (&self.stdin, child.stdin.take()) {
            match pipe.write_all(data) {
                // Tool exited without reading; its status decides the outcome.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                other => other.map_err(|e| self.spawn_error(e))?,
            }
        }

        let output = child.wait_with_output().map_err(|e| self.spawn_error(e))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: self.program.clone(),
                status: output.status.code(),
                stderr,
            });
        }

        Ok(ToolOutput {
            stdout: output.stdout,
            stderr,
        })
    }

    fn spawn_error(&self, source: io::Error) -> ToolError {
        match source.kind() {
            io::ErrorKind::NotFound => ToolError::Missing {
                program: self.program.clone(),
            },
            _ => ToolError::Spawn {
                program: self.program.clone(),
                source,
            },
        }
    }
}
