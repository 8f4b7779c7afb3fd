//! One running child server: its process, streams and reader task.
//!
//! Each child gets exactly one permanent stdout reader that parses the
//! stream of framed objects and routes every reply by its `id` through the
//! shared outstanding-requests table. Stderr is drained independently and
//! only ever logged. The termination event fires exactly once, after which
//! every outstanding request has already been failed.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Weak};

use mcp_bridge_error::BridgeError;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::codec::{self, Frame};
use crate::config::{DockerConfig, RiskLevel};
use crate::protocol::{self, methods, Request, Response};
use crate::resolver::ResolvedCommand;
use crate::supervisor::Supervisor;

/// Carried by the termination event.
#[derive(Debug, Clone, Copy)]
pub struct ExitNotice {
    pub code: Option<i32>,
}

/// Waiters for in-flight requests, keyed by request id.
pub type PendingRequests = Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>;

/// A live child owned by the registry.
#[derive(Debug)]
pub struct ServerHandle {
    pub id: String,
    pub pid: u32,
    /// Effective risk class (a downgraded server carries Medium here).
    pub risk_level: Option<RiskLevel>,
    /// Container spec actually in effect; None when not containerized.
    pub docker: Option<DockerConfig>,
    pub(crate) stdin: Arc<Mutex<ChildStdin>>,
    pub(crate) pending: PendingRequests,
    exit_rx: watch::Receiver<Option<ExitNotice>>,
    child: Arc<Mutex<Child>>,
}

/// A freshly spawned child whose IO tasks have not started yet.
///
/// The two-step construction lets the supervisor register the record before
/// the reader task (the only path to exit-handler removal) exists, so the
/// removal is ordered after the insertion instead of racing it.
pub struct SpawnedServer {
    pub handle: Arc<ServerHandle>,
    stdout: ChildStdout,
    stderr: ChildStderr,
    exit_tx: watch::Sender<Option<ExitNotice>>,
}

impl ServerHandle {
    /// Spawn the resolved command with piped standard streams and send the
    /// `initialize` request.
    ///
    /// Extras from the launch spec are layered over the inherited
    /// environment, extras winning on conflict. The `initialize` reply is
    /// never awaited; whenever it arrives the reader discards it as a reply
    /// without a waiter.
    pub async fn spawn(
        id: &str,
        risk_level: Option<RiskLevel>,
        docker: Option<DockerConfig>,
        resolved: ResolvedCommand,
    ) -> Result<SpawnedServer, BridgeError> {
        let mut command = Command::new(&resolved.program);
        command
            .args(&resolved.args)
            .envs(&resolved.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| BridgeError::SpawnFailed {
            message: format!("{}: {err}", resolved.program),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::SpawnFailed {
            message: "child stdin was not piped".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::SpawnFailed {
            message: "child stdout was not piped".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| BridgeError::SpawnFailed {
            message: "child stderr was not piped".to_string(),
        })?;
        let pid = child.id().ok_or_else(|| BridgeError::SpawnFailed {
            message: "child exited before startup completed".to_string(),
        })?;

        let stdin = Arc::new(Mutex::new(stdin));
        if let Err(err) = send_initialize(&stdin).await {
            // The child may already have exited; the exit path reaps it.
            debug!(server = %id, error = %err, "failed to send initialize");
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let handle = Arc::new(ServerHandle {
            id: id.to_string(),
            pid,
            risk_level,
            docker,
            stdin,
            pending: Arc::new(Mutex::new(HashMap::new())),
            exit_rx,
            child: Arc::new(Mutex::new(child)),
        });

        Ok(SpawnedServer {
            handle,
            stdout,
            stderr,
            exit_tx,
        })
    }

    /// Deliver the OS default termination signal.
    pub async fn terminate(&self) -> Result<(), BridgeError> {
        #[cfg(unix)]
        {
            let ret = unsafe { libc::kill(self.pid as i32, libc::SIGTERM) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                return Err(BridgeError::KillFailed {
                    message: err.to_string(),
                });
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            self.child
                .lock()
                .await
                .start_kill()
                .map_err(|err| BridgeError::KillFailed {
                    message: err.to_string(),
                })
        }
    }

    /// The exit code once the termination event has fired, if it has.
    pub fn exit_notice(&self) -> Option<ExitNotice> {
        *self.exit_rx.borrow()
    }

    /// Wait for the termination event.
    pub async fn wait_exited(&self) -> Option<i32> {
        let mut exit_rx = self.exit_rx.clone();
        loop {
            if let Some(notice) = *exit_rx.borrow() {
                return notice.code;
            }
            if exit_rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl SpawnedServer {
    /// Start the permanent reader and stderr tasks.
    ///
    /// `owner` is a weak back-reference to the registry; when the child
    /// exits, the reader fails every outstanding request and then asks the
    /// registry to drop the record.
    pub fn start_io(self, owner: Weak<Supervisor>) {
        let SpawnedServer {
            handle,
            stdout,
            stderr,
            exit_tx,
        } = self;

        tokio::spawn(run_stderr_logger(handle.id.clone(), stderr));
        tokio::spawn(run_reader(handle, stdout, exit_tx, owner));
    }
}

async fn send_initialize(stdin: &Mutex<ChildStdin>) -> std::io::Result<()> {
    let request = Request::new(
        Uuid::new_v4().to_string(),
        methods::INITIALIZE,
        json!({
            "protocolVersion": protocol::PROTOCOL_VERSION,
            "clientInfo": {
                "name": protocol::CLIENT_NAME,
                "version": protocol::CLIENT_VERSION,
            },
            "capabilities": {},
        }),
    );
    codec::write_message(stdin, &request).await
}

/// The permanent per-child reader.
async fn run_reader(
    handle: Arc<ServerHandle>,
    stdout: ChildStdout,
    exit_tx: watch::Sender<Option<ExitNotice>>,
    owner: Weak<Supervisor>,
) {
    let server_id = handle.id.clone();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_line(&server_id, &handle.pending, &line).await,
            Ok(None) => break,
            Err(err) => {
                debug!(server = %server_id, error = %err, "stdout read error");
                break;
            }
        }
    }

    // Stdout is closed; reap the child for its exit code.
    let code = {
        let mut child = handle.child.lock().await;
        match child.wait().await {
            Ok(status) => status.code(),
            Err(err) => {
                debug!(server = %server_id, error = %err, "failed to reap child");
                None
            }
        }
    };

    let _ = exit_tx.send(Some(ExitNotice { code }));

    // Fail every outstanding request before the record can disappear.
    handle.pending.lock().await.clear();

    if let Some(supervisor) = owner.upgrade() {
        supervisor.handle_exit(&handle, code).await;
    }
}

async fn route_line(server_id: &str, pending: &PendingRequests, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match codec::classify_line(line) {
        Frame::Response(response) => {
            let Some(request_id) = response.id.as_str().map(str::to_string) else {
                debug!(server = %server_id, "discarding reply with unroutable id");
                return;
            };
            let waiter = pending.lock().await.remove(&request_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => {
                    debug!(server = %server_id, request = %request_id, "discarding late reply");
                }
            }
        }
        Frame::Notification => {
            debug!(server = %server_id, "discarding frame without id");
        }
        Frame::Diagnostic => {
            debug!(server = %server_id, line = %line, "child stdout");
        }
    }
}

async fn run_stderr_logger(server_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %server_id, line = %line, "child stderr");
    }
}
