//! The server registry: start, stop, enumerate and crash handling.
//!
//! Live children are indexed by logical identifier behind a read-heavy
//! `RwLock`. Reader tasks hold only a weak back-reference, so a registry
//! dropped during shutdown never keeps children alive through its own IO
//! tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcp_bridge_error::BridgeError;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{DockerConfig, RiskLevel, ServerConfig};
use crate::resolver::{self, ResolveError, ResolvedCommand};
use crate::server_process::ServerHandle;

/// How long shutdown waits for a signalled child before moving on.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Point-in-time view of one registered server.
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub id: String,
    pub pid: u32,
    pub risk_level: Option<RiskLevel>,
    pub running_in_docker: bool,
}

#[derive(Debug, Default)]
pub struct Supervisor {
    servers: RwLock<HashMap<String, Arc<ServerHandle>>>,
}

impl Supervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up a live server.
    pub async fn get(&self, id: &str) -> Result<Arc<ServerHandle>, BridgeError> {
        self.servers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::ServerNotFound {
                server_id: id.to_string(),
            })
    }

    /// Resolve, spawn and register a new server.
    ///
    /// Any failure in resolution or spawning leaves the registry unchanged.
    pub async fn start(
        self: &Arc<Self>,
        id: &str,
        spec: &ServerConfig,
    ) -> Result<ServerSnapshot, BridgeError> {
        if self.servers.read().await.contains_key(id) {
            return Err(BridgeError::ServerAlreadyExists {
                server_id: id.to_string(),
            });
        }

        let (risk_level, docker, resolved) = resolve_effective(id, spec)?;
        let spawned = ServerHandle::spawn(id, risk_level, docker, resolved).await?;
        let handle = spawned.handle.clone();

        {
            let mut servers = self.servers.write().await;
            if servers.contains_key(id) {
                // Lost a concurrent start for the same identifier.
                let _ = handle.terminate().await;
                return Err(BridgeError::ServerAlreadyExists {
                    server_id: id.to_string(),
                });
            }
            servers.insert(id.to_string(), handle.clone());
        }
        // The record is registered; only now may the exit path run.
        spawned.start_io(Arc::downgrade(self));

        info!(server = %id, pid = handle.pid, risk_level = ?handle.risk_level, "server started");
        Ok(snapshot_of(&handle))
    }

    /// Signal a server to stop and drop its record immediately.
    ///
    /// The exit handler will try to remove the record again once the child
    /// actually dies; both removals are idempotent.
    pub async fn stop(&self, id: &str) -> Result<(), BridgeError> {
        let handle = self
            .servers
            .write()
            .await
            .remove(id)
            .ok_or_else(|| BridgeError::ServerNotFound {
                server_id: id.to_string(),
            })?;
        handle.terminate().await?;
        info!(server = %id, pid = handle.pid, "server stopped");
        Ok(())
    }

    /// Snapshot every registered server.
    pub async fn list(&self) -> Vec<ServerSnapshot> {
        let servers = self.servers.read().await;
        let mut snapshots: Vec<ServerSnapshot> =
            servers.values().map(|handle| snapshot_of(handle)).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    pub async fn count(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Called by a child's reader task after its termination event fired and
    /// its outstanding requests were failed.
    ///
    /// Removes the record only if it still refers to this exact child, so a
    /// crashed server's late exit never evicts a replacement registered
    /// under the same identifier.
    pub async fn handle_exit(&self, handle: &Arc<ServerHandle>, code: Option<i32>) {
        let mut servers = self.servers.write().await;
        let still_current = servers
            .get(&handle.id)
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if still_current {
            servers.remove(&handle.id);
            warn!(server = %handle.id, code = ?code, "server exited");
        }
    }

    /// Stop every server and wait (briefly) for each to die.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ServerHandle>> = {
            let mut servers = self.servers.write().await;
            servers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            if let Err(err) = handle.terminate().await {
                warn!(server = %handle.id, error = %err, "failed to signal server during shutdown");
                continue;
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, handle.wait_exited())
                .await
                .is_err()
            {
                warn!(server = %handle.id, "server did not exit within the shutdown grace period");
            }
        }
    }
}

fn snapshot_of(handle: &ServerHandle) -> ServerSnapshot {
    ServerSnapshot {
        id: handle.id.clone(),
        pid: handle.pid,
        risk_level: handle.risk_level,
        running_in_docker: handle.docker.is_some(),
    }
}

/// Work out the effective risk class and container spec for a launch.
///
/// A high-risk server without a usable container block is downgraded to
/// Medium rather than refused, with a diagnostic.
fn resolve_effective(
    id: &str,
    spec: &ServerConfig,
) -> Result<(Option<RiskLevel>, Option<DockerConfig>, ResolvedCommand), BridgeError> {
    match resolver::resolve(spec, spec.risk_level) {
        Ok(resolved) => {
            let docker = if spec.risk_level == Some(RiskLevel::High) {
                spec.docker.clone()
            } else {
                None
            };
            Ok((spec.risk_level, docker, resolved))
        }
        Err(ResolveError::MissingDockerImage) => {
            warn!(
                server = %id,
                "high risk level requires a docker image; downgrading to medium"
            );
            let resolved = resolver::resolve(spec, Some(RiskLevel::Medium)).map_err(|err| {
                BridgeError::SpawnFailed {
                    message: err.to_string(),
                }
            })?;
            Ok((Some(RiskLevel::Medium), None, resolved))
        }
    }
}
