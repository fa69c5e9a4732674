//! Kill registry: live workers and their termination handles.
//!
//! Pure bookkeeping. Invoking a [`KillSwitch`] is the supervisor's job; the
//! registry only guarantees a switch is handed out at most once.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// OS process id of a spawned worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(pid: u32) -> Self {
        Self(pid)
    }

    /// Get the raw process id.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of one successful spawn, unique for the supervisor's life.
///
/// Process ids can be reused by the OS once a worker is reaped; launch ids
/// never are, so per-worker bookkeeping is keyed by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaunchId(u64);

impl LaunchId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Termination handle for one registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillSwitch {
    launch: LaunchId,
    worker: WorkerId,
    escalation_timeout: Duration,
}

impl KillSwitch {
    pub fn new(launch: LaunchId, worker: WorkerId, escalation_timeout: Duration) -> Self {
        Self {
            launch,
            worker,
            escalation_timeout,
        }
    }

    pub fn launch(&self) -> LaunchId {
        self.launch
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Grace period between the graceful and the forceful signal.
    pub fn escalation_timeout(&self) -> Duration {
        self.escalation_timeout
    }

    /// Same switch with a different grace period.
    pub fn with_escalation_timeout(self, escalation_timeout: Duration) -> Self {
        Self {
            escalation_timeout,
            ..self
        }
    }
}

/// Workers that are alive and not yet asked to terminate.
#[derive(Debug, Default)]
pub struct KillRegistry {
    entries: HashMap<LaunchId, KillSwitch>,
}

impl KillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned worker. Returns the switch it replaced, if any.
    pub fn register(&mut self, switch: KillSwitch) -> Option<KillSwitch> {
        self.entries.insert(switch.launch(), switch)
    }

    /// Remove a worker, handing back its switch. `None` when already removed.
    pub fn deregister(&mut self, launch: LaunchId) -> Option<KillSwitch> {
        self.entries.remove(&launch)
    }

    /// Remove every worker, oldest launch first, handing back all switches.
    pub fn drain(&mut self) -> Vec<KillSwitch> {
        let mut switches: Vec<_> = self.entries.drain().map(|(_, switch)| switch).collect();
        switches.sort_by_key(KillSwitch::launch);
        switches
    }

    pub fn contains(&self, launch: LaunchId) -> bool {
        self.entries.contains_key(&launch)
    }

    /// Registered worker ids, oldest launch first.
    pub fn workers(&self) -> Vec<WorkerId> {
        self.drain_order().into_iter().map(|s| s.worker()).collect()
    }

    fn drain_order(&self) -> Vec<KillSwitch> {
        let mut switches: Vec<_> = self.entries.values().copied().collect();
        switches.sort_by_key(KillSwitch::launch);
        switches
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch(launch: u64, pid: u32) -> KillSwitch {
        KillSwitch::new(LaunchId::new(launch), WorkerId::new(pid), Duration::from_secs(3))
    }

    #[test]
    fn deregister_is_idempotent() {
        let mut registry = KillRegistry::new();
        registry.register(switch(1, 10));

        assert_eq!(registry.deregister(LaunchId::new(1)), Some(switch(1, 10)));
        assert_eq!(registry.deregister(LaunchId::new(1)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties_registry_oldest_first() {
        let mut registry = KillRegistry::new();
        registry.register(switch(2, 20));
        registry.register(switch(1, 30));
        assert_eq!(registry.workers(), vec![WorkerId::new(30), WorkerId::new(20)]);

        let drained = registry.drain();
        assert_eq!(drained, vec![switch(1, 30), switch(2, 20)]);
        assert_eq!(registry.len(), 0);
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn reused_pid_does_not_collide() {
        let mut registry = KillRegistry::new();
        registry.register(switch(1, 77));
        registry.register(switch(2, 77));

        assert_eq!(registry.deregister(LaunchId::new(1)), Some(switch(1, 77)));
        assert!(registry.contains(LaunchId::new(2)));
        assert_eq!(registry.workers(), vec![WorkerId::new(77)]);
    }

    #[test]
    fn timeout_override_keeps_worker() {
        let overridden = switch(1, 5).with_escalation_timeout(Duration::from_millis(50));
        assert_eq!(overridden.worker(), WorkerId::new(5));
        assert_eq!(overridden.launch(), LaunchId::new(1));
        assert_eq!(overridden.escalation_timeout(), Duration::from_millis(50));
    }
}
