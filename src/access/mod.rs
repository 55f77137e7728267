/// Access enforcement: grants and revokes network forwarding per client
/// address.
///
/// Invoked only after session state has committed; callers log failures and
/// never roll a session back over an enforcement error.
use crate::error::{PortalError, PortalResult};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, info};

/// Backend selection for the access controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessBackend {
    /// Track grants in memory only (development and tests).
    InMemory,
    /// Manage iptables FORWARD rules; `dry_run` logs commands without
    /// running them.
    Iptables { dry_run: bool },
}

pub struct AccessController {
    backend: AccessBackend,
    allowed: Mutex<HashSet<String>>,
}

impl AccessController {
    pub fn new(backend: AccessBackend) -> Self {
        info!("access controller using {:?} backend", backend);
        Self {
            backend,
            allowed: Mutex::new(HashSet::new()),
        }
    }

    pub async fn grant(&self, address: &str, duration_seconds: i64) -> PortalResult<()> {
        if self.is_allowed(address) {
            debug!("grant {}: already allowed", address);
            return Ok(());
        }

        if let AccessBackend::Iptables { dry_run } = self.backend {
            run_iptables(&["-I", "FORWARD", "-s", address, "-j", "ACCEPT"], dry_run).await?;
        }

        self.allowed.lock().unwrap().insert(address.to_string());
        info!("granted access to {} for {} seconds", address, duration_seconds);
        Ok(())
    }

    pub async fn revoke(&self, address: &str) -> PortalResult<()> {
        if !self.is_allowed(address) {
            return Ok(());
        }

        if let AccessBackend::Iptables { dry_run } = self.backend {
            run_iptables(&["-D", "FORWARD", "-s", address, "-j", "ACCEPT"], dry_run).await?;
        }

        self.allowed.lock().unwrap().remove(address);
        info!("revoked access for {}", address);
        Ok(())
    }

    pub fn is_allowed(&self, address: &str) -> bool {
        self.allowed.lock().unwrap().contains(address)
    }

    pub fn list_allowed(&self) -> Vec<String> {
        self.allowed.lock().unwrap().iter().cloned().collect()
    }
}

async fn run_iptables(args: &[&str], dry_run: bool) -> PortalResult<()> {
    debug!("iptables {} (dry_run={})", args.join(" "), dry_run);
    if dry_run {
        return Ok(());
    }

    let status = Command::new("iptables").args(args).status().await?;
    if !status.success() {
        return Err(PortalError::Internal(format!(
            "iptables {} exited with {}",
            args.join(" "),
            status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_grant_and_revoke() {
        let controller = AccessController::new(AccessBackend::InMemory);
        assert!(!controller.is_allowed("10.0.0.55"));

        controller.grant("10.0.0.55", 300).await.unwrap();
        assert!(controller.is_allowed("10.0.0.55"));
        assert_eq!(controller.list_allowed(), vec!["10.0.0.55".to_string()]);

        // Granting again is a no-op, not an error.
        controller.grant("10.0.0.55", 300).await.unwrap();

        controller.revoke("10.0.0.55").await.unwrap();
        assert!(!controller.is_allowed("10.0.0.55"));

        // Revoking an unknown address is a silent success.
        controller.revoke("10.0.0.99").await.unwrap();
    }

    #[tokio::test]
    async fn dry_run_iptables_never_executes() {
        let controller = AccessController::new(AccessBackend::Iptables { dry_run: true });
        controller.grant("192.168.4.2", 120).await.unwrap();
        assert!(controller.is_allowed("192.168.4.2"));
        controller.revoke("192.168.4.2").await.unwrap();
        assert!(!controller.is_allowed("192.168.4.2"));
    }
}
