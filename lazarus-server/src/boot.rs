// Boot identity
//
// A value that changes exactly when the host reboots. The collector compares
// it with the last stored one to tell "tmux server restarted after a reboot"
// apart from "a user closed a session".

use async_trait::async_trait;
use log::warn;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{System, SystemExt};

const BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Source of the current boot identity.
#[async_trait]
pub trait BootIdentity: Send + Sync {
    async fn boot_id(&self) -> std::io::Result<String>;
}

/// Reads the kernel boot id, falling back to the boot timestamp.
#[derive(Debug, Default, Clone)]
pub struct SystemBootId;

impl SystemBootId {
    pub fn new() -> Self {
        Self
    }

    fn from_boot_time() -> std::io::Result<String> {
        let system = System::new();
        let secs = system.boot_time();
        if secs == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "boot time unavailable",
            ));
        }
        Ok(format!("btime-{}", secs))
    }
}

#[async_trait]
impl BootIdentity for SystemBootId {
    async fn boot_id(&self) -> std::io::Result<String> {
        match tokio::fs::read_to_string(BOOT_ID_PATH).await {
            Ok(raw) if !raw.trim().is_empty() => Ok(raw.trim().to_string()),
            Ok(_) => Self::from_boot_time(),
            Err(e) => {
                warn!("Lazarus: {} unreadable ({}), using boot time", BOOT_ID_PATH, e);
                Self::from_boot_time()
            }
        }
    }
}

/// Fixed boot id that tests can change to simulate a reboot.
#[derive(Debug)]
pub struct StaticBootId {
    value: Mutex<String>,
}

impl StaticBootId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(value.into()),
        }
    }

    fn value(&self) -> MutexGuard<'_, String> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.value() = value.into();
    }
}

#[async_trait]
impl BootIdentity for StaticBootId {
    async fn boot_id(&self) -> std::io::Result<String> {
        Ok(self.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_boot_id_is_stable() {
        let boot = SystemBootId::new();
        let first = boot.boot_id().await.unwrap();
        let second = boot.boot_id().await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_static_boot_id_can_change() {
        let boot = StaticBootId::new("boot-a");
        assert_eq!(boot.boot_id().await.unwrap(), "boot-a");
        boot.set("boot-b");
        assert_eq!(boot.boot_id().await.unwrap(), "boot-b");
    }
}
