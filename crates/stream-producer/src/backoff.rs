// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Configuration parameters for exponential backoff between retries of
/// partially failed batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub min: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Growth factor applied per attempt.
    pub factor: f64,
    /// Randomize each delay between `min` and the computed value.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

/// Tracks the attempt count of one retry sequence.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Returns the delay for the current attempt and advances to the next one.
    pub fn duration(&mut self) -> Duration {
        let min = self.config.min.as_nanos() as f64;
        let max = self.config.max.as_nanos() as f64;
        // Cap exponent so powi cannot overflow to infinity.
        let exponent = self.attempt.min(64) as i32;
        self.attempt = self.attempt.saturating_add(1);

        let mut delay = (min * self.config.factor.powi(exponent)).min(max);
        if self.config.jitter && delay > min {
            delay = fastrand::f64() * (delay - min) + min;
        }
        Duration::from_nanos(delay.max(0.0).round() as u64)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
