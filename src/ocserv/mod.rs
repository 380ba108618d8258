//! Control plane adapter for the ocserv VPN server.
//!
//! The scheduler never talks to ocserv directly; it goes through
//! [`OcservController`], which binds exactly one of two variants at
//! construction:
//!
//! - `Direct`: occtl/ocpasswd run on this host
//! - `Docker`: the logically identical commands run inside a container
//!
//! All three capabilities (disconnect, lock, unlock) are best-effort from the
//! caller's point of view: a failed command is logged and the account is
//! corrected on a later scheduled pass.

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::OcservConfig;

mod direct;
mod docker;

pub use direct::DirectOcctl;
pub use docker::DockerOcctl;

/// Errors from a control plane command.
///
/// `Transport` means the command never ran to completion (binary missing,
/// spawn failure, shutdown in progress). `Command` means ocserv rejected it,
/// e.g. an unknown account.
#[derive(Debug, thiserror::Error)]
pub enum OcctlError {
    #[error("control plane unreachable: {0}")]
    Transport(String),

    #[error("command exited with status {code}: {stderr}")]
    Command { code: i32, stderr: String },
}

/// Control plane handle bound to one backend variant.
#[derive(Debug, Clone)]
pub enum OcservController {
    Direct(DirectOcctl),
    Docker(DockerOcctl),
}

impl OcservController {
    /// Bind the variant selected by configuration.
    ///
    /// The choice is made once here; dispatch sites stay backend-agnostic.
    pub fn from_config(config: &OcservConfig, shutdown: CancellationToken) -> Self {
        if config.mode == "docker" {
            OcservController::Docker(DockerOcctl::new(&config.container, shutdown))
        } else {
            OcservController::Direct(DirectOcctl::new(
                &config.occtl_bin,
                &config.ocpasswd_bin,
                &config.passwd_file,
                shutdown,
            ))
        }
    }

    /// Disconnect an account's active session.
    pub async fn disconnect_user(&self, username: &str) -> Result<String, OcctlError> {
        match self {
            OcservController::Direct(ctl) => ctl.disconnect_user(username).await,
            OcservController::Docker(ctl) => ctl.disconnect_user(username).await,
        }
    }

    /// Lock an account, refusing new connections.
    pub async fn lock_user(&self, username: &str) -> Result<String, OcctlError> {
        match self {
            OcservController::Direct(ctl) => ctl.lock_user(username).await,
            OcservController::Docker(ctl) => ctl.lock_user(username).await,
        }
    }

    /// Unlock an account.
    pub async fn unlock_user(&self, username: &str) -> Result<String, OcctlError> {
        match self {
            OcservController::Direct(ctl) => ctl.unlock_user(username).await,
            OcservController::Docker(ctl) => ctl.unlock_user(username).await,
        }
    }
}

/// Run a command to completion, honoring the shared shutdown signal.
///
/// On shutdown the in-flight child is killed and the call fails fast as a
/// transport error, which batch passes treat like any per-user failure.
async fn run_command(
    shutdown: &CancellationToken,
    program: &str,
    args: &[&str],
) -> Result<String, OcctlError> {
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);

    let output = tokio::select! {
        _ = shutdown.cancelled() => {
            return Err(OcctlError::Transport("shutdown in progress".to_string()));
        }
        result = cmd.output() => {
            result.map_err(|e| OcctlError::Transport(format!("{program}: {e}")))?
        }
    };

    if !output.status.success() {
        return Err(OcctlError::Command {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let shutdown = CancellationToken::new();
        let out = run_command(&shutdown, "echo", &["connected"]).await.unwrap();
        assert_eq!(out, "connected");
    }

    #[tokio::test]
    async fn missing_binary_is_a_transport_error() {
        let shutdown = CancellationToken::new();
        let err = run_command(&shutdown, "/nonexistent/occtl", &["show", "users"])
            .await
            .unwrap_err();
        assert!(matches!(err, OcctlError::Transport(_)));
    }

    #[tokio::test]
    async fn rejected_command_is_a_command_error() {
        let shutdown = CancellationToken::new();
        let err = run_command(&shutdown, "false", &[]).await.unwrap_err();
        match err {
            OcctlError::Command { code, .. } => assert_ne!(code, 0),
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_fails_fast() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let err = run_command(&shutdown, "sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, OcctlError::Transport(_)));
    }
}
