use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 5;

// ============== Rate Limiter (fixed window) ==============

#[derive(Clone, Debug)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_seen: Instant,
}

/// Per-user bucket of `capacity` actions per `period`.
///
/// The window opens when the first token is taken from a full bucket and the
/// bucket refills completely once the window has elapsed.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    capacity: u32,
    period: Duration,
    buckets: HashMap<UserId, Bucket>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(capacity: u32, period: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            period,
            buckets: HashMap::new(),
        }
    }

    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> RateDecision {
        let bucket = self.buckets.entry(user_id).or_insert_with(|| Bucket {
            tokens: self.capacity,
            window_start: now,
            last_seen: now,
        });
        bucket.last_seen = now;

        if now.saturating_duration_since(bucket.window_start) > self.period {
            bucket.tokens = self.capacity;
        }
        if bucket.tokens == self.capacity {
            bucket.window_start = now;
        }

        if bucket.tokens == 0 {
            let elapsed = now.saturating_duration_since(bucket.window_start);
            return RateDecision::Denied {
                retry_after: self.period.saturating_sub(elapsed),
            };
        }

        bucket.tokens -= 1;
        RateDecision::Allowed
    }

    /// Forget buckets nobody touched for a whole period; they would be full anyway.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.buckets.len();
        let period = self.period;
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_seen) <= period);
        before - self.buckets.len()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.len()
    }
}

// ============== Violation Counter ==============

/// Consecutive denials per user. Independent of bucket state.
#[derive(Clone, Debug, Default)]
pub struct ViolationCounter {
    counts: HashMap<UserId, u32>,
}

impl ViolationCounter {
    pub fn record(&mut self, user_id: UserId) -> u32 {
        let n = self.counts.entry(user_id).or_insert(0);
        *n += 1;
        *n
    }

    pub fn reset(&mut self, user_id: UserId) {
        self.counts.remove(&user_id);
    }

    pub fn get(&self, user_id: UserId) -> u32 {
        self.counts.get(&user_id).copied().unwrap_or(0)
    }
}

// ============== Spam Guard ==============

/// What the caller should do with an event after the spam check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Allowed,
    /// Drop the event and tell the user when to retry.
    Throttled { retry_after: Duration },
    /// The user hit the violation threshold; run the escalation policy.
    Escalate { retry_after: Duration },
}

/// One rate limiter plus its own violation counter.
///
/// The bot keeps one guard per event source (voice joins, text commands), so
/// their counters never influence each other.
#[derive(Clone, Debug)]
pub struct SpamGuard {
    limiter: RateLimiter,
    violations: ViolationCounter,
    threshold: u32,
}

impl SpamGuard {
    pub fn new(capacity: u32, period: Duration, threshold: u32) -> Self {
        Self {
            limiter: RateLimiter::new(capacity, period),
            violations: ViolationCounter::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> Verdict {
        match self.limiter.check_at(user_id, now) {
            RateDecision::Allowed => {
                self.violations.reset(user_id);
                Verdict::Allowed
            }
            RateDecision::Denied { retry_after } => {
                if self.violations.record(user_id) >= self.threshold {
                    self.violations.reset(user_id);
                    Verdict::Escalate { retry_after }
                } else {
                    Verdict::Throttled { retry_after }
                }
            }
        }
    }

    pub fn violations(&self, user_id: UserId) -> u32 {
        self.violations.get(user_id)
    }

    pub fn prune(&mut self, now: Instant) -> usize {
        self.limiter.prune(now)
    }
}
