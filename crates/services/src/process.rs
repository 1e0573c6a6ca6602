use async_trait::async_trait;
use plugstrap_core::{Error, ProcessOutput, ProcessRunner, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs child processes on the tokio runtime.
///
/// Children are killed when their timeout elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Create a new process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        limit: Duration,
    ) -> Result<ProcessOutput> {
        debug!(program = %program.display(), ?args, "Running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::process_launch(program.display().to_string(), e.to_string()))?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let output = ProcessOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                debug!(program = %program.display(), exit_code = ?output.exit_code, "Command finished");
                Ok(output)
            }
            Ok(Err(e)) => Err(Error::process_launch(
                program.display().to_string(),
                e.to_string(),
            )),
            // Dropping the wait future drops the child, which kills it
            Err(_) => {
                warn!(program = %program.display(), seconds = limit.as_secs(), "Command timed out");
                Err(Error::Timeout {
                    seconds: limit.as_secs(),
                })
            }
        }
    }

    fn command_exists(&self, program: &Path) -> bool {
        program.is_file()
    }
}
