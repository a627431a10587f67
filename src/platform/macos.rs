use anyhow::{Context, Result};
use std::process::Command;

/// Lock the device on macOS via the system lock-screen keystroke
pub fn lock_device() -> Result<()> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg("tell application \"System Events\" to keystroke \"q\" using {command down, control down}")
        .output()
        .context("Failed to run osascript")?;

    if !output.status.success() {
        anyhow::bail!(
            "osascript lock failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(())
}

/// osascript ships with macOS
pub fn lock_capability_available() -> bool {
    true
}

/// Battery percentage from pmset; 100 on desktops or parse failure
pub fn battery_level() -> u8 {
    let Ok(output) = Command::new("pmset").args(["-g", "batt"]).output() else {
        return 100;
    };

    let text = String::from_utf8_lossy(&output.stdout);

    // pmset prints e.g. " -InternalBattery-0 (id=...)  85%; discharging; ..."
    text.split_whitespace()
        .find_map(|token| token.strip_suffix("%;").or_else(|| token.strip_suffix('%')))
        .and_then(|pct| pct.parse::<u8>().ok())
        .map(|level| level.min(100))
        .unwrap_or(100)
}
