//! Relaunch pacing after failed launches.

use std::time::Duration;

use rand::Rng;

/// Jitter is drawn from `[0, delay / JITTER_DIVISOR)`.
const JITTER_DIVISOR: u64 = 10;

/// Deterministic part of the delay: `base_ms` doubled per failure after
/// the first, never above `max_ms`.
fn ceiling_ms(failures: u32, base_ms: u64, max_ms: u64) -> u64 {
    let doublings = failures.saturating_sub(1);
    base_ms
        .checked_shl(doublings)
        .filter(|scaled| scaled >> doublings == base_ms)
        .map_or(max_ms, |scaled| scaled.min(max_ms))
}

/// Wait imposed before relaunching after `failures` consecutive failed launches.
///
/// No failures, or a zero base, relaunches on the next loop turn.
pub fn relaunch_delay(failures: u32, base_ms: u64, max_ms: u64) -> Duration {
    if failures == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let delay = ceiling_ms(failures, base_ms, max_ms);
    let spread = delay / JITTER_DIVISOR;
    let jitter = match spread {
        0 => 0,
        n => rand::thread_rng().gen_range(0..n),
    };
    Duration::from_millis(delay + jitter)
}
