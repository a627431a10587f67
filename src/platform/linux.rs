use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Screen lockers tried in order of preference
const LOCK_COMMANDS: &[(&str, &[&str])] = &[
    // systemd-logind (modern, works across desktop environments)
    ("loginctl", &["lock-session"]),
    // XDG screensaver
    ("xdg-screensaver", &["lock"]),
    // GNOME screensaver
    ("gnome-screensaver-command", &["--lock"]),
    // Cinnamon screensaver
    ("cinnamon-screensaver-command", &["--lock"]),
    // MATE screensaver
    ("mate-screensaver-command", &["--lock"]),
    // XScreenSaver
    ("xscreensaver-command", &["-lock"]),
    // Light-locker
    ("light-locker-command", &["--lock"]),
    // i3lock (minimalist)
    ("i3lock", &["-c", "000000"]),
    // slock (simple X screen locker)
    ("slock", &[]),
];

/// Lock the device on Linux, trying lockers in order of preference
pub fn lock_device() -> Result<()> {
    for (cmd, args) in LOCK_COMMANDS {
        if try_command(cmd, args).is_ok() {
            return Ok(());
        }
    }

    anyhow::bail!("No supported screen lock mechanism found on this Linux system")
}

/// Whether any supported locker is installed
pub fn lock_capability_available() -> bool {
    LOCK_COMMANDS.iter().any(|(cmd, _)| command_exists(cmd))
}

/// Battery percentage from sysfs; 100 when no battery is exposed
pub fn battery_level() -> u8 {
    let Ok(entries) = std::fs::read_dir("/sys/class/power_supply") else {
        return 100;
    };

    for entry in entries.flatten() {
        let capacity = entry.path().join("capacity");
        if let Ok(content) = std::fs::read_to_string(&capacity) {
            if let Ok(level) = content.trim().parse::<u8>() {
                return level.min(100);
            }
        }
    }

    100
}

/// Try to execute a command, returning Ok if successful
fn try_command(cmd: &str, args: &[&str]) -> Result<()> {
    let output = Command::new(cmd).args(args).output()?;

    if output.status.success() {
        Ok(())
    } else {
        anyhow::bail!("Command failed: {} {:?}", cmd, args)
    }
}

/// Check whether a binary is resolvable on PATH
fn command_exists(cmd: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };

    std::env::split_paths(&path).any(|dir| Path::new(&dir).join(cmd).is_file())
}
