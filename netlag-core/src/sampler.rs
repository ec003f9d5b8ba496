//! Delay sampling for intercepted calls.
//!
//! Turns a [`SimulationConfig`] into a concrete delay in whole milliseconds.
//! The result is never negative: offsets that would push a delay below zero
//! are clamped, whatever the configuration.

use std::f64::consts::TAU;
use std::time::Duration;

use crate::config::{Distribution, SimulationConfig};
use crate::random::RandomSource;

/// Probability that a burst sample stays in the small band.
const BURST_STABLE_PROBABILITY: f64 = 0.9;

/// Fraction of jitter bounding the small band of the burst profile.
const BURST_STABLE_FRACTION: f64 = 0.2;

/// Samples the delay for one call, in milliseconds.
pub fn pick_delay(config: &SimulationConfig, rng: &mut dyn RandomSource) -> u64 {
    let jitter = config.jitter_ms;
    let offset = match config.distribution {
        Distribution::Uniform => (rng.next_unit() * 2.0 - 1.0) * jitter,
        Distribution::Normal => standard_normal(rng) * jitter,
        Distribution::Burst => {
            if rng.next_unit() < BURST_STABLE_PROBABILITY {
                rng.next_unit() * BURST_STABLE_FRACTION * jitter
            } else {
                rng.next_unit() * jitter
            }
        }
    };

    clamp_to_millis(config.base_latency_ms + offset)
}

/// Samples the delay for one call as a [`Duration`].
pub fn delay_duration(config: &SimulationConfig, rng: &mut dyn RandomSource) -> Duration {
    Duration::from_millis(pick_delay(config, rng))
}

/// Standard normal sample via the Box-Muller transform.
fn standard_normal(rng: &mut dyn RandomSource) -> f64 {
    let u1 = nonzero_unit(rng);
    let u2 = nonzero_unit(rng);
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

// ln(0) is undefined
fn nonzero_unit(rng: &mut dyn RandomSource) -> f64 {
    loop {
        let value = rng.next_unit();
        if value != 0.0 {
            return value;
        }
    }
}

fn clamp_to_millis(raw: f64) -> u64 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    // Float-to-int casts saturate, so +inf lands on u64::MAX.
    raw.round() as u64
}
