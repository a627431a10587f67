use anyhow::Result;

/// Lock the device on Windows
pub fn lock_device() -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        use windows_sys::Win32::System::Shutdown::LockWorkStation;

        // Returns nonzero on success
        let ok = unsafe { LockWorkStation() };
        if ok == 0 {
            anyhow::bail!("LockWorkStation failed");
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    {
        anyhow::bail!("This function is only available on Windows")
    }
}

/// LockWorkStation is always present on Windows
pub fn lock_capability_available() -> bool {
    true
}

/// Battery reporting is not wired up on Windows yet
pub fn battery_level() -> u8 {
    100
}
