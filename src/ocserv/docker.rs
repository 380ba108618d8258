//! Containerized control plane variant.
//!
//! Issues the same occtl/ocpasswd commands as the direct variant, but through
//! `docker exec` against the ocserv container. The password file path is the
//! container's own, not the host's.

use tokio_util::sync::CancellationToken;

use super::{run_command, OcctlError};

/// Password file path inside the ocserv container image.
const CONTAINER_PASSWD_FILE: &str = "/etc/ocserv/ocpasswd";

#[derive(Debug, Clone)]
pub struct DockerOcctl {
    container: String,
    shutdown: CancellationToken,
}

impl DockerOcctl {
    pub fn new(container: &str, shutdown: CancellationToken) -> Self {
        Self {
            container: container.to_string(),
            shutdown,
        }
    }

    pub async fn disconnect_user(&self, username: &str) -> Result<String, OcctlError> {
        run_command(
            &self.shutdown,
            "docker",
            &[
                "exec",
                &self.container,
                "occtl",
                "disconnect",
                "user",
                username,
            ],
        )
        .await
    }

    pub async fn lock_user(&self, username: &str) -> Result<String, OcctlError> {
        run_command(
            &self.shutdown,
            "docker",
            &[
                "exec",
                &self.container,
                "ocpasswd",
                "-c",
                CONTAINER_PASSWD_FILE,
                "-l",
                username,
            ],
        )
        .await
    }

    pub async fn unlock_user(&self, username: &str) -> Result<String, OcctlError> {
        run_command(
            &self.shutdown,
            "docker",
            &[
                "exec",
                &self.container,
                "ocpasswd",
                "-c",
                CONTAINER_PASSWD_FILE,
                "-u",
                username,
            ],
        )
        .await
    }
}
