use std::time::Instant;

/// Token bucket used for the per-player block/chat/event rate limits from
/// the concurrency model: a fixed burst capacity that refills continuously
/// at `rate` tokens/sec. `take()` drops the packet rather than queuing it.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f32,
    rate: f32,
    tokens: f32,
    last: Instant,
}

impl TokenBucket {
    pub fn new(rate: f32, capacity: f32) -> Self {
        Self {
            capacity,
            rate,
            tokens: capacity,
            last: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
    }

    /// Attempts to spend one token. Returns false (and drops the token
    /// bill) if the bucket is empty.
    pub fn take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_exhaust() {
        let mut bucket = TokenBucket::new(1.0, 3.0);
        assert!(bucket.take());
        assert!(bucket.take());
        assert!(bucket.take());
        assert!(!bucket.take());
    }

    #[test]
    fn refills_over_time() {
        let mut bucket = TokenBucket::new(1000.0, 1.0);
        assert!(bucket.take());
        assert!(!bucket.take());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(bucket.take());
    }
}
