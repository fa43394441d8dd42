//! # Fibonacci Backoff
//!
//! Progressive delay between sync session restarts. Grows more slowly than
//! exponential backoff, so a flapping watch is retried often at first without
//! hammering the API server later.
//!
//! Sequence (seconds): 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 60 (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff in seconds (for reset)
    min_secs: u64,
    /// Previous backoff in seconds
    prev_secs: u64,
    /// Current backoff in seconds
    current_secs: u64,
    /// Maximum backoff in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_secs` and capped at `max_secs`.
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_secs;

        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next, self.max_secs);

        Duration::from_secs(result)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 60);
        let sequence: Vec<u64> = (0..10).map(|_| secs(&mut backoff)).collect();
        assert_eq!(sequence, vec![1, 1, 2, 3, 5, 8, 13, 21, 34, 55]);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::new(1, 60);
        for _ in 0..10 {
            backoff.next_backoff();
        }
        // Next would be 89 (55+34), capped at 60
        assert_eq!(secs(&mut backoff), 60);
        // Should stay at max
        assert_eq!(secs(&mut backoff), 60);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(1, 60);

        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 2);
        assert_eq!(secs(&mut backoff), 3);

        backoff.reset();

        // Should restart from beginning after a healthy session
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 2);
    }
}
