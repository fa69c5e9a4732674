//! Launch-failure budget.

/// Remaining launches allowed before supervision gives up.
///
/// Decremented by every failed launch and refilled by every successful
/// spawn, so only consecutive failures count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorBudget {
    max: u32,
    remaining: u32,
}

impl SupervisorBudget {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    /// Record one failed launch. Returns `true` while another attempt is allowed.
    pub fn consume(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    /// Refill after a successful spawn.
    pub fn reset(&mut self) {
        self.remaining = self.max;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.max - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_max_failures() {
        let mut budget = SupervisorBudget::new(3);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert!(budget.is_exhausted());
        assert_eq!(budget.failures(), 3);
    }

    #[test]
    fn reset_refills() {
        let mut budget = SupervisorBudget::new(2);
        budget.consume();
        budget.reset();
        assert_eq!(budget.remaining(), 2);
        assert_eq!(budget.failures(), 0);
    }

    #[test]
    fn consume_past_zero_stays_exhausted() {
        let mut budget = SupervisorBudget::new(1);
        assert!(!budget.consume());
        assert!(!budget.consume());
        assert_eq!(budget.remaining(), 0);
    }
}
