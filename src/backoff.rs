use std::time::Duration;
use tokio::time::sleep;

/// Retry pacing for transient source failures: the wait doubles after every
/// failed attempt, saturating at a ceiling, until the attempt budget is
/// spent. One `Backoff` covers one fetch; a new fetch starts fresh.
#[derive(Debug)]
pub struct Backoff {
    next_delay: Duration,
    max_delay: Duration,
    remaining: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, budget: u32) -> Self {
        Self {
            next_delay: initial.min(max),
            max_delay: max,
            remaining: budget,
        }
    }

    /// Wait before the next attempt. Returns `false` once the budget is
    /// spent, without sleeping.
    pub async fn wait(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;

        log::warn!(
            "Backing off {:?} before retry ({} attempts left)",
            self.next_delay,
            self.remaining
        );
        sleep(self.next_delay).await;

        self.next_delay = (self.next_delay * 2).min(self.max_delay);
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delay_doubles_up_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4), 5);

        let before = tokio::time::Instant::now();
        assert!(backoff.wait().await); // 1s
        assert!(backoff.wait().await); // 2s
        assert!(backoff.wait().await); // 4s
        assert!(backoff.wait().await); // capped at 4s
        assert_eq!(before.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_refuses_without_sleeping() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4), 2);
        assert!(backoff.wait().await);
        assert!(backoff.wait().await);

        let before = tokio::time::Instant::now();
        assert!(!backoff.wait().await);
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(backoff.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_clamped_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(5), 1);
        let before = tokio::time::Instant::now();
        assert!(backoff.wait().await);
        assert_eq!(before.elapsed(), Duration::from_secs(5));
    }
}
