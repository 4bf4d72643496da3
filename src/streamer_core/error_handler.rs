use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Reconnect delay schedule: `base * 2^attempt`, capped at `max`, with up to
/// `jitter * delay` shaved off at random so a fleet of clients does not
/// reconnect in lockstep.
///
/// Jitter is subtractive and below one half, so every uncapped delay is
/// strictly larger than the one before it.
#[derive(Debug)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter.clamp(0.0, 0.49),
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, advancing the schedule
    pub fn next_delay(&mut self) -> Duration {
        let capped = self.ceiling_for(self.current_attempt);
        self.current_attempt = self.current_attempt.saturating_add(1);

        if self.jitter == 0.0 {
            return capped;
        }

        let shave = rand::thread_rng().gen_range(0.0..self.jitter);
        capped.mul_f64(1.0 - shave)
    }

    /// Un-jittered delay for a given attempt number
    pub fn ceiling_for(&self, attempt: u32) -> Duration {
        // 2^31 * base overflows long before it matters; clamp the exponent
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
