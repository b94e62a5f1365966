//! Counter state and the per-algorithm read-modify-write step.
//!
//! [`Transition::apply`] is a pure function of the prior state, the rule and
//! the timestamp. Stores call it inside whatever atomic primitive they have,
//! which keeps the math identical across backends.

use super::{Algorithm, RateLimitRule, Verdict};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MILLIS_PER_SEC: f64 = 1_000.0;

/// Persisted state for one [`RateLimitKey`](super::RateLimitKey).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitState {
    /// Tokens available and when they were last refilled.
    TokenBucket { tokens: f64, last_refill_millis: u64 },
    /// Queue level and when it last drained.
    LeakyBucket { level: f64, last_leak_millis: u64 },
    /// Count inside the window starting at `window_start_millis`.
    FixedWindow { window_start_millis: u64, count: u64 },
    /// Counts for the current window and the one right before it.
    SlidingWindow { previous_count: u64, current_count: u64, current_window_start_millis: u64 },
}

/// One admission attempt, ready to be applied atomically by a store.
///
/// This is plain data so that remote stores can ship it as script arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// Rule in force for the key.
    pub rule: RateLimitRule,
    /// Timestamp of the attempt.
    pub now_millis: u64,
}

impl Transition {
    /// Create a transition for `rule` at `now_millis`.
    pub fn new(rule: RateLimitRule, now_millis: u64) -> Self {
        Self { rule, now_millis }
    }

    /// Time-to-live the store should set on the written state.
    pub fn ttl(&self) -> Duration {
        self.rule.state_ttl()
    }

    /// Compute the next state and the verdict.
    ///
    /// State written by a different algorithm (the rule was hot-reloaded) is
    /// treated as absent.
    pub fn apply(&self, prior: Option<RateLimitState>) -> (RateLimitState, Verdict) {
        match self.rule.algorithm() {
            Algorithm::TokenBucket => self.token_bucket(prior),
            Algorithm::LeakyBucket => self.leaky_bucket(prior),
            Algorithm::FixedWindow => self.fixed_window(prior),
            Algorithm::SlidingWindow => self.sliding_window(prior),
        }
    }

    fn rate(&self) -> f64 {
        f64::from(self.rule.requests_per_second())
    }

    fn capacity(&self) -> f64 {
        f64::from(self.rule.burst_capacity())
    }

    // Exact for integer inputs, which keeps refill at whole-token boundaries precise.
    fn accrued(&self, since_millis: u64) -> f64 {
        let elapsed = self.now_millis.saturating_sub(since_millis) as f64;
        elapsed * self.rate() / MILLIS_PER_SEC
    }

    fn token_bucket(&self, prior: Option<RateLimitState>) -> (RateLimitState, Verdict) {
        let capacity = self.capacity();
        let tokens = match prior {
            Some(RateLimitState::TokenBucket { tokens, last_refill_millis }) => {
                (tokens + self.accrued(last_refill_millis)).min(capacity)
            }
            _ => capacity,
        };

        if tokens >= 1.0 {
            let left = tokens - 1.0;
            let state =
                RateLimitState::TokenBucket { tokens: left, last_refill_millis: self.now_millis };
            (state, Verdict::Admitted { remaining: left.floor() as u64 })
        } else {
            let wait = (1.0 - tokens) / self.rate();
            let state = RateLimitState::TokenBucket { tokens, last_refill_millis: self.now_millis };
            (state, Verdict::Rejected { retry_after: secs_to_duration(wait) })
        }
    }

    fn leaky_bucket(&self, prior: Option<RateLimitState>) -> (RateLimitState, Verdict) {
        let capacity = self.capacity();
        let level = match prior {
            Some(RateLimitState::LeakyBucket { level, last_leak_millis }) => {
                (level - self.accrued(last_leak_millis)).max(0.0)
            }
            _ => 0.0,
        };

        if level + 1.0 <= capacity {
            let filled = level + 1.0;
            let state =
                RateLimitState::LeakyBucket { level: filled, last_leak_millis: self.now_millis };
            (state, Verdict::Admitted { remaining: (capacity - filled).floor() as u64 })
        } else {
            let wait = (level + 1.0 - capacity) / self.rate();
            let state = RateLimitState::LeakyBucket { level, last_leak_millis: self.now_millis };
            (state, Verdict::Rejected { retry_after: secs_to_duration(wait) })
        }
    }

    fn window_start(&self) -> u64 {
        let window = self.rule.window_millis();
        self.now_millis - self.now_millis % window
    }

    fn fixed_window(&self, prior: Option<RateLimitState>) -> (RateLimitState, Verdict) {
        let limit = self.rule.window_limit();
        let window_start = self.window_start();
        let count = match prior {
            Some(RateLimitState::FixedWindow { window_start_millis, count })
                if window_start_millis == window_start =>
            {
                count
            }
            _ => 0,
        };

        if count < limit {
            let count = count + 1;
            let state = RateLimitState::FixedWindow { window_start_millis: window_start, count };
            (state, Verdict::Admitted { remaining: limit - count })
        } else {
            let window_end = window_start + self.rule.window_millis();
            let wait = Duration::from_millis(window_end - self.now_millis);
            let state = RateLimitState::FixedWindow { window_start_millis: window_start, count };
            (state, Verdict::Rejected { retry_after: wait })
        }
    }

    fn sliding_window(&self, prior: Option<RateLimitState>) -> (RateLimitState, Verdict) {
        let limit = self.rule.window_limit();
        let window = self.rule.window_millis();
        let current_start = self.window_start();
        let (previous, current) = match prior {
            Some(RateLimitState::SlidingWindow {
                previous_count,
                current_count,
                current_window_start_millis,
            }) => {
                if current_window_start_millis == current_start {
                    (previous_count, current_count)
                } else if current_window_start_millis + window == current_start {
                    (current_count, 0)
                } else {
                    (0, 0)
                }
            }
            _ => (0, 0),
        };

        let elapsed = (self.now_millis - current_start) as f64 / window as f64;
        let effective = current as f64 + previous as f64 * (1.0 - elapsed);
        let limit_f = limit as f64;

        if effective < limit_f {
            let state = RateLimitState::SlidingWindow {
                previous_count: previous,
                current_count: current + 1,
                current_window_start_millis: current_start,
            };
            let remaining = (limit_f - effective - 1.0).max(0.0).floor() as u64;
            (state, Verdict::Admitted { remaining })
        } else {
            let state = RateLimitState::SlidingWindow {
                previous_count: previous,
                current_count: current,
                current_window_start_millis: current_start,
            };
            let until_window_end = current_start + window - self.now_millis;
            let wait_millis = if current >= limit || previous == 0 {
                until_window_end
            } else {
                // Fraction of the window at which the previous window's weight
                // has decayed enough to fit one more request.
                let needed = 1.0 - (limit_f - current as f64) / previous as f64;
                let millis = ((needed - elapsed) * window as f64).ceil() as u64;
                millis.clamp(1, until_window_end)
            };
            (state, Verdict::Rejected { retry_after: Duration::from_millis(wait_millis) })
        }
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
