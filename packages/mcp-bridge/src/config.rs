//! Server configuration: the `mcp_config.json` document and the
//! `MCP_SERVER_*` environment synthesis.
//!
//! Configuration problems are never fatal to the process. A file that does
//! not parse, or an environment companion that does not, costs only the
//! offending entry and a `warn!`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

/// Default config file probed in the working directory when
/// `MCP_CONFIG_PATH` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "mcp_config.json";

const ENV_PREFIX: &str = "MCP_SERVER_";
const ENV_COMMAND_SUFFIX: &str = "_COMMAND";

/// Risk class of a configured server. On the wire this is the integer
/// 1 (low), 2 (medium) or 3 (high); absent is distinct from low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RiskLevel {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl TryFrom<u8> for RiskLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RiskLevel::Low),
            2 => Ok(RiskLevel::Medium),
            3 => Ok(RiskLevel::High),
            other => Err(format!("invalid risk level: {other} (expected 1, 2 or 3)")),
        }
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> Self {
        level as u8
    }
}

impl RiskLevel {
    pub fn as_int(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low risk - standard execution",
            RiskLevel::Medium => "Medium risk - requires confirmation",
            RiskLevel::High => "High risk - docker execution required",
        }
    }
}

/// Container isolation block, required for high-risk servers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct DockerConfig {
    /// Image to run. An empty image is treated as absent.
    #[serde(default)]
    pub image: String,
    /// `-v` bindings in docker syntax.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Launch specification for one server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment entries; they win over the inherited environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "riskLevel",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<u8>)]
    #[schemars(with = "Option<u8>")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerConfig>,
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

/// Load configuration from `path`, then layer `MCP_SERVER_*` overrides from
/// the process environment on top.
pub fn load(path: &Path) -> BridgeConfig {
    let mut config = match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<BridgeConfig>(&text) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to parse config file; ignoring it");
                BridgeConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no config file found");
            BridgeConfig::default()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read config file; ignoring it");
            BridgeConfig::default()
        }
    };
    apply_env_overrides(&mut config, std::env::vars());
    config
}

/// Synthesize servers from `MCP_SERVER_<NAME>_COMMAND` variables and their
/// `_ARGS` / `_ENV` / `_RISK_LEVEL` / `_DOCKER_CONFIG` companions.
pub fn apply_env_overrides(
    config: &mut BridgeConfig,
    vars: impl Iterator<Item = (String, String)>,
) {
    let vars: HashMap<String, String> = vars.collect();

    for (key, command) in &vars {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some(name) = rest.strip_suffix(ENV_COMMAND_SUFFIX) else {
            continue;
        };
        if name.is_empty() || command.is_empty() {
            continue;
        }
        let server_id = name.to_lowercase();

        let args = vars
            .get(&format!("{ENV_PREFIX}{name}_ARGS"))
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let env = match vars.get(&format!("{ENV_PREFIX}{name}_ENV")) {
            Some(raw) => match serde_json::from_str::<BTreeMap<String, String>>(raw) {
                Ok(env) => env,
                Err(err) => {
                    warn!(server = %server_id, error = %err, "invalid env block in environment override; ignoring it");
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };

        let risk_level = match vars.get(&format!("{ENV_PREFIX}{name}_RISK_LEVEL")) {
            Some(raw) => match raw.parse::<u8>().map_err(|err| err.to_string()).and_then(RiskLevel::try_from) {
                Ok(level) => Some(level),
                Err(err) => {
                    warn!(server = %server_id, error = %err, "invalid risk level in environment override; ignoring it");
                    None
                }
            },
            None => None,
        };

        let docker = match vars.get(&format!("{ENV_PREFIX}{name}_DOCKER_CONFIG")) {
            Some(raw) => match serde_json::from_str::<DockerConfig>(raw) {
                Ok(docker) => Some(docker),
                Err(err) => {
                    warn!(server = %server_id, error = %err, "invalid docker config in environment override; ignoring it");
                    None
                }
            },
            None => None,
        };

        info!(server = %server_id, command = %command, "server synthesized from environment");
        config.mcp_servers.insert(
            server_id,
            ServerConfig {
                command: command.clone(),
                args,
                env,
                risk_level,
                docker,
            },
        );
    }
}
