// Lazarus Integration Layer - Command Runner
//
// Runs one-shot tmux invocations:
// - Arguments passed via Command::args, never through a shell
// - Bounded by a per-call timeout
// - Child killed if the caller's future is dropped
// - Non-zero exits mapped to TmuxError (missing server recognised)

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use super::adapter::AdapterConfig;
use super::error::{TmuxError, TmuxResult};

/// Executes a CLI once per call and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// CLI command to execute (e.g., "tmux")
    command: String,

    /// Timeout for each call
    call_timeout: Duration,
}

impl CommandRunner {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            command: config.binary.clone(),
            call_timeout: Duration::from_secs(config.call_timeout_secs.max(1)),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command with `args`, wait for completion and return stdout.
    pub async fn call(&self, args: &[&str]) -> TmuxResult<String> {
        let output = timeout(
            self.call_timeout,
            Command::new(&self.command)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| TmuxError::Timeout {
            operation: format!("{} {}", self.command, args.join(" ")),
            duration_secs: self.call_timeout.as_secs(),
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TmuxError::CliNotFound(self.command.clone())
            } else {
                TmuxError::SpawnFailed(e.to_string())
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::debug!(
                "Lazarus: {} {} failed: {}",
                self.command,
                args.join(" "),
                stderr.trim()
            );
            Err(TmuxError::from_exit(
                output.status.code().unwrap_or(-1),
                &stderr,
            ))
        }
    }
}
