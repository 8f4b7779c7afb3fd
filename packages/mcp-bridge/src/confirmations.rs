//! The deferred-confirmation ledger.
//!
//! A medium-risk tool call is not executed on first sight: the ledger mints
//! a confirmation handle, parks the invocation, and a second client call
//! commits or abandons it. Entries are single-shot and live at most ten
//! minutes; expiry is enforced lazily on lookup, there is no background
//! sweeper.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mcp_bridge_error::BridgeError;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::RiskLevel;

/// How long a deferred invocation stays committable.
pub const CONFIRMATION_TTL: Duration = Duration::from_secs(600);

/// One unresolved deferred call.
#[derive(Debug, Clone)]
pub struct PendingInvocation {
    pub server_id: String,
    pub method: String,
    pub params: Value,
    pub tool_name: String,
    created_at: Instant,
}

#[derive(Debug, Default)]
pub struct ConfirmationLedger {
    pending: Mutex<HashMap<String, PendingInvocation>>,
}

impl ConfirmationLedger {
    /// Park an invocation and build the deferral response for the caller.
    pub async fn defer(
        &self,
        server_id: &str,
        method: &str,
        params: &Value,
        risk_level: RiskLevel,
    ) -> Value {
        let handle = Uuid::new_v4().to_string();
        let tool_name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let expires_at = OffsetDateTime::now_utc() + CONFIRMATION_TTL;

        self.pending.lock().await.insert(
            handle.clone(),
            PendingInvocation {
                server_id: server_id.to_string(),
                method: method.to_string(),
                params: params.clone(),
                tool_name: tool_name.clone(),
                created_at: Instant::now(),
            },
        );

        json!({
            "requires_confirmation": true,
            "confirmation_id": handle,
            "risk_level": risk_level.as_int(),
            "risk_description": risk_level.description(),
            "server_id": server_id,
            "method": method,
            "tool_name": tool_name,
            "expires_at": expires_at.format(&Rfc3339).unwrap_or_default(),
        })
    }

    /// Consume an entry for commit or abandon.
    ///
    /// The entry leaves the ledger on every outcome, so a handle resolves at
    /// most once; later references report it unknown.
    pub async fn take(&self, handle: &str) -> Result<PendingInvocation, BridgeError> {
        let entry = self.pending.lock().await.remove(handle).ok_or_else(|| {
            BridgeError::ConfirmationNotFound {
                confirmation_id: handle.to_string(),
            }
        })?;
        if entry.created_at.elapsed() > CONFIRMATION_TTL {
            return Err(BridgeError::ConfirmationExpired {
                confirmation_id: handle.to_string(),
            });
        }
        Ok(entry)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    #[cfg(test)]
    async fn insert_backdated(&self, handle: &str, invocation: PendingInvocation, age: Duration) {
        let mut entry = invocation;
        entry.created_at = Instant::now()
            .checked_sub(age)
            .expect("backdated instant in range");
        self.pending.lock().await.insert(handle.to_string(), entry);
    }
}
