//! The correlation engine: framed request out, matched reply back.
//!
//! One call, one freshly minted request id, one oneshot delivery slot in the
//! child's outstanding-requests table. Replies route purely by id, so any
//! number of calls may be in flight against the same child and a child may
//! answer them in any order.

use std::sync::Arc;
use std::time::Duration;

use mcp_bridge_error::BridgeError;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::codec;
use crate::config::RiskLevel;
use crate::confirmations::ConfirmationLedger;
use crate::protocol::{methods, Request};
use crate::supervisor::Supervisor;

/// Hard deadline for a reply, measured from after the request is written.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The bridge core the HTTP dispatcher talks to.
#[derive(Debug)]
pub struct Bridge {
    pub supervisor: Arc<Supervisor>,
    pub confirmations: ConfirmationLedger,
}

impl Bridge {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            confirmations: ConfirmationLedger::default(),
        }
    }

    /// Invoke `method` on a server and wait for the correlated reply.
    ///
    /// Medium-risk `tools/call` invocations without a bypass token are
    /// deferred instead: the ledger's response is returned verbatim and
    /// nothing is written to the child.
    pub async fn call(
        &self,
        server_id: &str,
        method: &str,
        params: Value,
        bypass_confirmation: Option<&str>,
    ) -> Result<Value, BridgeError> {
        let server = self.supervisor.get(server_id).await?;

        if server.risk_level == Some(RiskLevel::Medium)
            && method == methods::TOOLS_CALL
            && bypass_confirmation.is_none()
        {
            return Ok(self
                .confirmations
                .defer(server_id, method, &params, RiskLevel::Medium)
                .await);
        }

        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        server
            .pending
            .lock()
            .await
            .insert(request_id.clone(), tx);

        let request = Request::new(request_id.clone(), method, params);
        if let Err(err) = codec::write_message(&server.stdin, &request).await {
            server.pending.lock().await.remove(&request_id);
            return Err(BridgeError::StreamError {
                message: format!("failed to write request to server '{server_id}': {err}"),
            });
        }

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            // The reader drained the pending table: the child is gone.
            Ok(Err(_)) => {
                let code = server.exit_notice().and_then(|notice| notice.code);
                return Err(BridgeError::ServerExited { code });
            }
            Err(_) => {
                server.pending.lock().await.remove(&request_id);
                return Err(BridgeError::RequestTimeout {
                    seconds: REQUEST_TIMEOUT.as_secs(),
                });
            }
        };

        if let Some(error) = response.error {
            return Err(BridgeError::Upstream {
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        if server.risk_level == Some(RiskLevel::High) {
            return Ok(wrap_execution_environment(
                result,
                server.risk_level,
                server.docker.as_ref(),
            ));
        }
        Ok(result)
    }

    /// Commit or abandon a deferred invocation.
    ///
    /// On commit the stored invocation is replayed with the handle as the
    /// bypass token; the replay's outcome is surfaced verbatim.
    pub async fn resolve_confirmation(
        &self,
        handle: &str,
        confirm: bool,
    ) -> Result<Value, BridgeError> {
        let invocation = self.confirmations.take(handle).await?;
        if !confirm {
            return Ok(json!({
                "status": "rejected",
                "message": format!("Execution of tool '{}' was rejected", invocation.tool_name),
            }));
        }
        self.call(
            &invocation.server_id,
            &invocation.method,
            invocation.params,
            Some(handle),
        )
        .await
    }
}

/// Stamp a high-risk result with where it actually ran.
fn wrap_execution_environment(
    result: Value,
    risk_level: Option<RiskLevel>,
    docker: Option<&crate::config::DockerConfig>,
) -> Value {
    let descriptor = json!({
        "risk_level": risk_level.map(RiskLevel::as_int),
        "docker": docker.is_some(),
        "image": docker.map(|docker| docker.image.clone()),
    });
    match result {
        Value::Object(mut object) => {
            object.insert("execution_environment".to_string(), descriptor);
            Value::Object(object)
        }
        other => json!({
            "result": other,
            "execution_environment": descriptor,
        }),
    }
}
