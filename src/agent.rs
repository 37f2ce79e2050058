//! External AI agent boundary
//!
//! The agent that actually analyzes a workspace and carries out a recipe's
//! instructions is an external collaborator. This module only knows how to
//! hand it a composed prompt, consume its output stream incrementally under
//! a byte ceiling and a timeout, and cancel it on caller request without
//! corrupting any already-written state. Applied-state recording happens
//! strictly after a successful outcome, in the caller.

use crate::recipe::Recipe;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;

/// Wall-clock ceiling for one agent invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Output ceiling per stream; a runaway agent is killed, not buffered.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("analysis aborted")]
    Aborted,

    #[error("agent timed out after {0:?}")]
    TimedOut(Duration),

    #[error("agent output exceeded {0} bytes")]
    OutputLimit(usize),

    #[error("agent exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("failed to run agent: {0}")]
    Spawn(String),
}

/// Everything the agent needs for one recipe application.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub recipe_id: String,
    pub prompt: String,
    pub workspace_root: PathBuf,
}

impl AgentInvocation {
    /// Compose the full prompt handed to the agent: the recipe's three
    /// prompt sections plus the selected fix content.
    pub fn for_recipe(
        recipe: &Recipe,
        fix_content: &str,
        workspace_root: PathBuf,
        project: Option<&str>,
    ) -> Self {
        let mut prompt = String::new();
        prompt.push_str(&format!("# Recipe: {}\n\n{}\n\n", recipe.id, recipe.summary));
        if let Some(project) = project {
            prompt.push_str(&format!("Target project: {project}\n\n"));
        }
        prompt.push_str(&format!("## Goal\n{}\n\n", recipe.prompt.goal));
        prompt.push_str(&format!("## Investigation\n{}\n\n", recipe.prompt.investigation));
        prompt.push_str(&format!("## Expected Output\n{}\n\n", recipe.prompt.expected_output));
        prompt.push_str(&format!("## Fix Instructions\n{fix_content}\n"));
        Self { recipe_id: recipe.id.clone(), prompt, workspace_root }
    }
}

/// Result payload of a successful agent run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The agent's stdout payload (its report of what it changed).
    pub report: String,
}

/// Handle the caller keeps to abort a running analysis.
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Create a cancellation pair for one invocation.
pub fn cancellation() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), rx)
}

/// Seam between command orchestration and the concrete agent process, so
/// command-level tests can script outcomes.
pub trait AgentRunner {
    fn run(
        &self,
        invocation: &AgentInvocation,
        cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutcome, AgentError>;
}

/// Runs the agent as a subprocess: prompt on stdin, report on stdout,
/// stderr passed through for diagnostics.
pub struct SubprocessAgent {
    pub bin: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl SubprocessAgent {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into(), args: Vec::new(), timeout: DEFAULT_TIMEOUT }
    }
}

fn runtime() -> &'static tokio::runtime::Runtime {
    static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .enable_io()
            .build()
            .expect("failed to build tokio runtime for agent invocations")
    })
}

/// Read a stream to EOF, failing once `limit` bytes are exceeded.
async fn read_limited<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> Result<Vec<u8>, AgentError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| AgentError::Spawn(format!("failed to read agent output: {e}")))?;
        if n == 0 {
            break;
        }
        if buf.len().saturating_add(n) > limit {
            return Err(AgentError::OutputLimit(limit));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

impl AgentRunner for SubprocessAgent {
    fn run(
        &self,
        invocation: &AgentInvocation,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutcome, AgentError> {
        let timeout = self.timeout;
        let bin = self.bin.clone();
        let args = self.args.clone();
        let cwd = invocation.workspace_root.clone();
        let prompt = invocation.prompt.clone();

        runtime().block_on(async move {
            let mut cmd = tokio::process::Command::new(&bin);
            cmd.args(&args)
                .current_dir(&cwd)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::inherit());

            let mut child = cmd
                .spawn()
                .map_err(|e| AgentError::Spawn(format!("failed to spawn '{bin}': {e}")))?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| AgentError::Spawn("failed to open agent stdin".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AgentError::Spawn("failed to open agent stdout".into()))?;

            let write_fut = async move {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .map_err(|e| AgentError::Spawn(format!("failed to write prompt: {e}")))?;
                // Explicit close to signal EOF.
                stdin
                    .shutdown()
                    .await
                    .map_err(|e| AgentError::Spawn(format!("failed to close stdin: {e}")))?;
                Ok::<(), AgentError>(())
            };

            let stdout_task = tokio::spawn(read_limited(stdout, MAX_OUTPUT_BYTES));

            if let Err(e) = write_fut.await {
                let _ = child.kill().await;
                return Err(e);
            }

            let status = tokio::select! {
                status = child.wait() => {
                    status.map_err(|e| AgentError::Spawn(format!("failed to wait for agent: {e}")))?
                }
                _ = tokio::time::sleep(timeout) => {
                    let _ = child.kill().await;
                    return Err(AgentError::TimedOut(timeout));
                }
                _ = cancel.changed() => {
                    let _ = child.kill().await;
                    return Err(AgentError::Aborted);
                }
            };

            let stdout_bytes = stdout_task
                .await
                .map_err(|e| AgentError::Spawn(format!("output task failed: {e}")))??;

            if !status.success() {
                return Err(AgentError::Failed {
                    code: status.code().unwrap_or(-1),
                    stderr: String::new(),
                });
            }

            Ok(AgentOutcome { report: String::from_utf8_lossy(&stdout_bytes).to_string() })
        })
    }
}
