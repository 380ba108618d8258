//! Direct control plane variant.
//!
//! Runs occtl and ocpasswd on the host the worker itself runs on. Binary
//! paths and the password file come from the `ocserv` config section.

use tokio_util::sync::CancellationToken;

use super::{run_command, OcctlError};

#[derive(Debug, Clone)]
pub struct DirectOcctl {
    occtl_bin: String,
    ocpasswd_bin: String,
    passwd_file: String,
    shutdown: CancellationToken,
}

impl DirectOcctl {
    pub fn new(
        occtl_bin: &str,
        ocpasswd_bin: &str,
        passwd_file: &str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            occtl_bin: occtl_bin.to_string(),
            ocpasswd_bin: ocpasswd_bin.to_string(),
            passwd_file: passwd_file.to_string(),
            shutdown,
        }
    }

    pub async fn disconnect_user(&self, username: &str) -> Result<String, OcctlError> {
        run_command(
            &self.shutdown,
            &self.occtl_bin,
            &["disconnect", "user", username],
        )
        .await
    }

    pub async fn lock_user(&self, username: &str) -> Result<String, OcctlError> {
        run_command(
            &self.shutdown,
            &self.ocpasswd_bin,
            &["-c", &self.passwd_file, "-l", username],
        )
        .await
    }

    pub async fn unlock_user(&self, username: &str) -> Result<String, OcctlError> {
        run_command(
            &self.shutdown,
            &self.ocpasswd_bin,
            &["-c", &self.passwd_file, "-u", username],
        )
        .await
    }
}
