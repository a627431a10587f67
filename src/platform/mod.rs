/// Platform-specific lock and battery bindings

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

use anyhow::Result;

use crate::enforcement::LockController;

/// Lock the device using the platform-specific mechanism
pub fn lock_device() -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        windows::lock_device()
    }

    #[cfg(target_os = "macos")]
    {
        macos::lock_device()
    }

    #[cfg(target_os = "linux")]
    {
        linux::lock_device()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        anyhow::bail!("Unsupported operating system for device locking")
    }
}

/// Whether the lock mechanism is currently available on this platform
pub fn lock_capability_available() -> bool {
    #[cfg(target_os = "windows")]
    {
        windows::lock_capability_available()
    }

    #[cfg(target_os = "macos")]
    {
        macos::lock_capability_available()
    }

    #[cfg(target_os = "linux")]
    {
        linux::lock_capability_available()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        false
    }
}

/// Best-effort battery percentage for status reports (100 when the
/// platform exposes nothing readable)
pub fn battery_level() -> u8 {
    #[cfg(target_os = "windows")]
    {
        windows::battery_level()
    }

    #[cfg(target_os = "macos")]
    {
        macos::battery_level()
    }

    #[cfg(target_os = "linux")]
    {
        linux::battery_level()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        100
    }
}

/// Lock controller backed by the real platform bindings
pub struct PlatformLock;

impl LockController for PlatformLock {
    fn lock_now(&self) -> Result<()> {
        lock_device()
    }

    fn has_enforcement_capability(&self) -> bool {
        lock_capability_available()
    }
}
