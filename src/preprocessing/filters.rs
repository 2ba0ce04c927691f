// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Digital filters for sampled analog inputs

/// Lowest accepted cutoff frequency in Hz
pub const MIN_CUTOFF_HZ: f64 = 0.001;
/// Highest accepted cutoff frequency in Hz
pub const MAX_CUTOFF_HZ: f64 = 50.0;

/// First-order low-pass filter in exponential moving average form.
///
/// `average_n = α·raw_n + (1 - α)·average_(n-1)`, seeded with the first
/// sample. α is derived from a cutoff frequency and the sample period with
/// `α = 1 - exp(-2π·fc·Ts)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialMovingAverage {
    alpha: f64,
    sample_period_s: f64,
    average: Option<f64>,
}

impl ExponentialMovingAverage {
    /// Create a filter from a smoothing factor, clamped to `(0, 1]`
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            sample_period_s: 0.0,
            average: None,
        }
    }

    /// Create a filter from a cutoff frequency and a sample period
    pub fn from_cutoff(cutoff_hz: f64, sample_period_s: f64) -> Self {
        Self {
            alpha: frequency_to_alpha(cutoff_hz, sample_period_s),
            sample_period_s,
            average: None,
        }
    }

    /// Retune the cutoff, the current average is kept
    pub fn set_cutoff(&mut self, cutoff_hz: f64) {
        self.alpha = frequency_to_alpha(cutoff_hz, self.sample_period_s);
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = clamp_alpha(alpha);
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Feed one raw sample and return the new average
    pub fn push(&mut self, raw: f64) -> f64 {
        let average = match self.average {
            Some(previous) => self.alpha * raw + (1.0 - self.alpha) * previous,
            None => raw,
        };
        self.average = Some(average);
        average
    }

    /// Current average, `None` before the first sample
    pub fn average(&self) -> Option<f64> {
        self.average
    }

    pub fn reset(&mut self) {
        self.average = None;
    }
}

/// Smoothing factor of a first-order low-pass with cutoff `cutoff_hz`
/// sampled every `sample_period_s` seconds.
pub fn frequency_to_alpha(cutoff_hz: f64, sample_period_s: f64) -> f64 {
    let alpha = 1.0 - (-2.0 * std::f64::consts::PI * cutoff_hz * sample_period_s).exp();
    clamp_alpha(alpha)
}

fn clamp_alpha(alpha: f64) -> f64 {
    if alpha.is_nan() {
        1.0
    } else {
        alpha.clamp(f64::EPSILON, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn alpha_for_one_hertz_at_ten_milliseconds() {
        let alpha = frequency_to_alpha(1.0, 0.01);
        assert_relative_eq!(alpha, 0.0609, epsilon = 1e-4);
    }

    #[test]
    fn first_sample_seeds_the_average() {
        let mut ema = ExponentialMovingAverage::new(0.1);
        assert_eq!(ema.average(), None);
        assert_eq!(ema.push(42.0), 42.0);
        assert_relative_eq!(ema.push(52.0), 43.0);
    }

    #[test]
    fn converges_to_a_constant_input() {
        let mut ema = ExponentialMovingAverage::from_cutoff(5.0, 0.01);
        ema.push(0.0);
        let mut last = 0.0;
        for _ in 0..500 {
            last = ema.push(100.0);
        }
        assert_relative_eq!(last, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn set_cutoff_keeps_average() {
        let mut ema = ExponentialMovingAverage::from_cutoff(1.0, 0.01);
        ema.push(10.0);
        ema.set_cutoff(50.0);
        assert_eq!(ema.average(), Some(10.0));
        assert!(ema.alpha() > 0.9);
    }

    #[test]
    fn alpha_is_clamped() {
        assert_eq!(ExponentialMovingAverage::new(3.0).alpha(), 1.0);
        assert!(ExponentialMovingAverage::new(-1.0).alpha() > 0.0);
        assert_eq!(ExponentialMovingAverage::new(f64::NAN).alpha(), 1.0);
    }
}
