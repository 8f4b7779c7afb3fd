//! Command resolution: from a launch specification to a concrete argv.
//!
//! High-risk servers are rewritten onto the docker launcher; package-runner
//! shims (`npm`, `npx`) are located on the host; Windows `.cmd` shims are
//! routed through the command interpreter. Pure apart from file-existence
//! probes and the `which` lookup.

use std::collections::HashMap;

use crate::config::{RiskLevel, ServerConfig};

/// Commands that are package-runner shims rather than real executables.
const PACKAGE_RUNNERS: [&str; 2] = ["npm", "npx"];

/// The container launcher used for high-risk servers.
const DOCKER_LAUNCHER: &str = "docker";

/// A spec resolved down to something the OS spawn primitive accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment entries to layer over the inherited environment.
    pub env: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("risk level high requires a docker image")]
    MissingDockerImage,
}

/// Resolve `spec` under the given effective risk class.
///
/// The risk class is passed separately from the spec so the supervisor can
/// retry after downgrading a high-risk server whose container block is
/// unusable.
pub fn resolve(
    spec: &ServerConfig,
    risk_level: Option<RiskLevel>,
) -> Result<ResolvedCommand, ResolveError> {
    if risk_level == Some(RiskLevel::High) {
        return resolve_docker(spec);
    }

    let (program, args) = resolve_host_command(&spec.command, &spec.args);
    Ok(ResolvedCommand {
        program,
        args,
        env: spec.env.clone().into_iter().collect(),
    })
}

fn is_package_runner(command: &str) -> bool {
    PACKAGE_RUNNERS.contains(&command)
}

/// Build the `docker run` argv for a high-risk server.
fn resolve_docker(spec: &ServerConfig) -> Result<ResolvedCommand, ResolveError> {
    let docker = spec
        .docker
        .as_ref()
        .filter(|docker| !docker.image.is_empty())
        .ok_or(ResolveError::MissingDockerImage)?;

    let mut args = vec!["run".to_string(), "--rm".to_string()];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for volume in &docker.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    if let Some(network) = &docker.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    args.push(docker.image.clone());
    // Package runners are assumed to be the image's entrypoint; anything
    // else is invoked explicitly inside the container.
    if !is_package_runner(&spec.command) {
        args.push(spec.command.clone());
        args.extend(spec.args.iter().cloned());
    }

    Ok(ResolvedCommand {
        program: DOCKER_LAUNCHER.to_string(),
        args,
        env: spec.env.clone().into_iter().collect(),
    })
}

#[cfg(not(windows))]
fn resolve_host_command(command: &str, args: &[String]) -> (String, Vec<String>) {
    let program = if is_package_runner(command) {
        match which::which(command) {
            Ok(path) => path.to_string_lossy().to_string(),
            // PATH lookup at spawn time may still succeed.
            Err(_) => command.to_string(),
        }
    } else {
        command.to_string()
    };
    (program, args.to_vec())
}

#[cfg(windows)]
fn resolve_host_command(command: &str, args: &[String]) -> (String, Vec<String>) {
    let program = if is_package_runner(command) {
        locate_windows_shim(command)
    } else {
        command.to_string()
    };

    if program.to_ascii_lowercase().ends_with(".cmd") {
        let mut interpreter_args = vec!["/c".to_string(), program];
        interpreter_args.extend(args.iter().cloned());
        return ("cmd".to_string(), interpreter_args);
    }
    (program, args.to_vec())
}

#[cfg(windows)]
fn locate_windows_shim(command: &str) -> String {
    use std::path::PathBuf;

    let shim = format!("{command}.cmd");
    let candidates = [
        std::env::var("APPDATA")
            .ok()
            .map(|appdata| PathBuf::from(appdata).join("npm").join(&shim)),
        std::env::var("ProgramFiles")
            .ok()
            .map(|programs| PathBuf::from(programs).join("nodejs").join(&shim)),
        Some(PathBuf::from(r"C:\Program Files\nodejs").join(&shim)),
    ];
    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }
    }
    command.to_string()
}
