use std::time::Duration;

/// Doubling backoff bounded between a floor and a cap, used by the claim
/// loop when the pending queue is empty (§4.2: "initial 250 ms, cap 5 s").
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self { floor, cap, current: floor }
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    /// Sleep for the current backoff, then double it (capped).
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.current).await;
        self.current = (self.current * 2).min(self.cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(5));
        backoff.current = Duration::from_secs(4);
        backoff.reset();
        assert_eq!(backoff.current, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn wait_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(3));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(2));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(3));
        backoff.wait().await;
        assert_eq!(backoff.current, Duration::from_millis(3));
    }
}
