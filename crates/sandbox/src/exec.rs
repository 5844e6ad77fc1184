use std::{path::PathBuf, process::Stdio, time::Duration};

#[cfg(feature = "metrics")]
use mcpbox_metrics::{counter, labels, sandbox as sandbox_metrics};
use {
    mcpbox_common::truncate_utf8,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Result of a shell command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout, falling back to stderr when stdout is empty.
    pub fn output(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Options controlling exec behavior.
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub working_dir: Option<PathBuf>,
    /// Values are secrets; they only leave the `Secret` at spawn time.
    pub env: Vec<(String, Secret<String>)>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 200 * 1024, // 200KB
            working_dir: None,
            env: Vec::new(),
        }
    }
}

impl ExecOpts {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_env<'a>(
        mut self,
        env: impl IntoIterator<Item = (&'a String, &'a Secret<String>)>,
    ) -> Self {
        self.env = env
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.env.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }
}

/// Execute a shell command on the host with timeout and output limits.
pub async fn exec_command(command: &str, opts: &ExecOpts) -> Result<ExecResult> {
    debug!(
        command,
        timeout_secs = opts.timeout.as_secs(),
        "exec_command"
    );

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);

    if let Some(ref dir) = opts.working_dir {
        cmd.current_dir(dir);
    }
    for (k, v) in &opts.env {
        cmd.env(k, v.expose_secret());
    }

    run_to_completion(cmd, opts, "sh").await
}

/// Spawn `cmd` with piped output and wait for it, bounded by `opts.timeout`.
///
/// The child is killed when the timeout elapses.
pub(crate) async fn run_to_completion(
    mut cmd: Command,
    opts: &ExecOpts,
    cli: &'static str,
) -> Result<ExecResult> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let child = cmd.spawn()?;

    let result = match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            truncate_utf8(&mut stdout, opts.max_output_bytes);
            truncate_utf8(&mut stderr, opts.max_output_bytes);

            let exit_code = output.status.code().unwrap_or(-1);
            debug!(
                cli,
                exit_code,
                stdout_len = stdout.len(),
                stderr_len = stderr.len(),
                "exec done"
            );
            Ok(ExecResult {
                stdout,
                stderr,
                exit_code,
            })
        },
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => {
            warn!(cli, timeout_secs = opts.timeout.as_secs(), "exec timeout");
            Err(Error::Timeout(opts.timeout))
        },
    };

    #[cfg(feature = "metrics")]
    {
        let success = result.as_ref().is_ok_and(ExecResult::success);
        counter!(
            sandbox_metrics::COMMAND_EXECUTIONS_TOTAL,
            labels::SUCCESS => success.to_string()
        )
        .increment(1);
        if !success {
            counter!(sandbox_metrics::COMMAND_ERRORS_TOTAL).increment(1);
        }
    }

    result
}
