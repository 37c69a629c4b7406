//! `execute_shell`: run a shell command on the local machine
//!
//! Commands run in the background. The executor answers immediately with a
//! command id; stdout and stderr lines are collected into the command's
//! status as they arrive, and the final status is published when the
//! process exits, is terminated, or times out.

use async_trait::async_trait;
use conclave_application::{
    ActionError, ActionExecutor, ActionRequest, CommandHandle, CommandStatus, Execution,
};
use conclave_domain::action::catalog::EXECUTE_SHELL;
use conclave_domain::util::tail_str;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Output kept per command (the newest bytes win)
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// How long to keep reading output after the process exited
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct LocalShellExecutor {
    working_dir: Option<PathBuf>,
    max_output: usize,
    next_id: AtomicU64,
}

impl Default for LocalShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalShellExecutor {
    pub fn new() -> Self {
        Self {
            working_dir: None,
            max_output: MAX_OUTPUT_SIZE,
            next_id: AtomicU64::new(1),
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    fn resolve_dir(&self, params: &Value) -> Result<Option<PathBuf>, ActionError> {
        let dir = match params.get("working_dir").and_then(Value::as_str) {
            Some(dir) => Some(PathBuf::from(dir)),
            None => self.working_dir.clone(),
        };
        if let Some(dir) = &dir
            && !dir.is_dir()
        {
            return Err(ActionError::InvalidParams(format!(
                "working directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(dir)
    }

    fn spawn(command: &str, dir: Option<&Path>) -> Result<Child, ActionError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ActionError::CommandNotFound("sh".to_string()),
            _ => ActionError::Failed(format!("failed to spawn command: {}", e)),
        })
    }
}

#[async_trait]
impl ActionExecutor for LocalShellExecutor {
    fn supports(&self, action: &str) -> bool {
        action == EXECUTE_SHELL
    }

    async fn execute(&self, request: &ActionRequest) -> Result<Execution, ActionError> {
        if request.action != EXECUTE_SHELL {
            return Err(ActionError::Unsupported(request.action.clone()));
        }
        let command = request
            .params
            .get("command")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ActionError::InvalidParams("missing string parameter 'command'".to_string()))?;
        let timeout = request
            .params
            .get("timeout_secs")
            .and_then(Value::as_f64)
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64);
        let dir = self.resolve_dir(&request.params)?;

        let child = Self::spawn(command, dir.as_deref())?;
        let correlation_id = format!("cmd-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            agent_id = %request.agent_id,
            command_id = %correlation_id,
            command = %command,
            "Started shell command"
        );

        let (status_tx, status_rx) = watch::channel(CommandStatus::Running { output: String::new() });
        let cancel = CancellationToken::new();
        tokio::spawn(supervise(
            child,
            status_tx,
            cancel.clone(),
            timeout,
            self.max_output,
            correlation_id.clone(),
        ));

        Ok(Execution::Started {
            result: json!({
                "command_id": correlation_id,
                "status": "running",
                "command": command,
            }),
            correlation_id,
            command: CommandHandle {
                status: status_rx,
                cancel,
            },
        })
    }
}

/// Output collected so far, capped to the newest `max` bytes.
struct OutputBuffer {
    text: String,
    max: usize,
}

impl OutputBuffer {
    fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        if self.text.len() > self.max {
            self.text = tail_str(&self.text, self.max).to_string();
        }
    }
}

async fn forward_lines<R>(reader: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

async fn supervise(
    mut child: Child,
    status: watch::Sender<CommandStatus>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    max_output: usize,
    command_id: String,
) {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let readers = tokio::spawn(async move {
        futures::future::join(forward_lines(stdout, line_tx.clone()), forward_lines(stderr, line_tx)).await;
    });

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut output = OutputBuffer {
        text: String::new(),
        max: max_output,
    };

    enum End {
        Exited(std::io::Result<std::process::ExitStatus>),
        Terminated,
    }

    let end = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break End::Terminated,
            _ = &mut deadline => {
                debug!(command_id = %command_id, "Command timed out");
                break End::Terminated;
            }
            Some(line) = line_rx.recv() => {
                output.push_line(&line);
                status.send_replace(CommandStatus::Running { output: output.text.clone() });
            }
            exit = child.wait() => break End::Exited(exit),
        }
    };

    if matches!(end, End::Terminated) {
        if let Err(e) = child.kill().await {
            warn!(command_id = %command_id, "Could not kill command: {}", e);
        }
        // grandchildren may still hold the pipes
        readers.abort();
    } else if tokio::time::timeout(DRAIN_TIMEOUT, readers).await.is_err() {
        debug!(command_id = %command_id, "Output pipes still open after exit");
    }
    while let Ok(line) = line_rx.try_recv() {
        output.push_line(&line);
    }

    let output = output.text;
    let final_status = match end {
        End::Exited(Ok(exit)) => CommandStatus::Exited {
            code: exit.code(),
            output,
        },
        End::Exited(Err(e)) => CommandStatus::Failed {
            reason: e.to_string(),
        },
        End::Terminated => CommandStatus::Terminated { output },
    };
    debug!(command_id = %command_id, status = ?final_status, "Command finished");
    status.send_replace(final_status);
}
