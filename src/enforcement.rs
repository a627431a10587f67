use anyhow::Result;

/// The device lock capability, injected into the monitor loop.
///
/// Locking is enforceable; unlocking is not, so no unlock operation
/// exists. The real implementation lives in the `platform` module; tests
/// use a recording fake.
pub trait LockController {
    /// Attempt to lock the device right now
    fn lock_now(&self) -> Result<()>;

    /// Whether the administrative privilege needed to lock is currently
    /// granted
    fn has_enforcement_capability(&self) -> bool;
}

/// A pending enforcement transition for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Schedules became active while unlocked: lock the device and
    /// report locked
    Engage,
    /// All schedules ended while locked: report unlocked. The agent has
    /// no unlock capability, so this only notifies.
    DisengageNotify,
}

/// The agent's belief about the device's lock status.
///
/// This is not a ground-truth read-back from the OS; it tracks whether
/// the agent last issued a lock and has not yet seen all schedules end.
/// Initialized unlocked on startup and never persisted; a restart
/// re-derives it from the next cycle's evaluation.
#[derive(Debug, Default)]
pub struct EnforcementState {
    locked: bool,
}

impl EnforcementState {
    pub fn new() -> Self {
        Self { locked: false }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Decide which transition (if any) this cycle requires
    pub fn transition(&self, any_active: bool) -> Option<Transition> {
        match (any_active, self.locked) {
            (true, false) => Some(Transition::Engage),
            (false, true) => Some(Transition::DisengageNotify),
            _ => None,
        }
    }

    /// Record a successful lock
    pub fn mark_locked(&mut self) {
        self.locked = true;
    }

    /// Record that all schedules have ended
    pub fn mark_unlocked(&mut self) {
        self.locked = false;
    }
}
