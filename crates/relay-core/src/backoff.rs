use std::time::Duration;

/// Exponential retry delay: `min(cap, base * growth^(attempts - 1))`, zero
/// before the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub growth: u32,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            growth: 3,
            cap: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    pub fn delay(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = self.growth.checked_pow(attempts - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}
