//! Randomised draw helpers (spec-supplement, grounded on
//! `original_source/src/simulator/base.py`'s `Base.uni`/`iuni`/`norm`/`pnorm`/
//! `cnorm`/`jitter`).
//!
//! Every draw takes an explicit `deterministic` flag rather than reading a
//! global — callers pass `clock.is_deterministic()` so the collapse-to-mean
//! behaviour used by scenario tests is a property of the clock, not of this
//! module. When `deterministic` is `true` every helper returns the same
//! value `base.py` returns when its `randomize` flag is unset.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use rand_distr::{Distribution, Normal};

pub struct Rng {
    inner: Mutex<StdRng>,
}

impl Default for Rng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl Rng {
    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform float in `[low, high]`; the deterministic value is the
    /// midpoint.
    pub fn uni(&self, deterministic: bool, low: f64, high: f64) -> f64 {
        if deterministic {
            (high + low) / 2.0
        } else {
            self.inner.lock().gen_range(low..=high)
        }
    }

    /// Uniform integer in `[low, high]`, optionally weighted; the
    /// deterministic value is the rounded midpoint, or the heaviest-weighted
    /// choice when weights are given.
    pub fn iuni(&self, deterministic: bool, low: i64, high: i64, weights: Option<&[f64]>) -> i64 {
        if let Some(weights) = weights {
            let choices: Vec<i64> = (low..=high).collect();
            if deterministic {
                let (idx, _) = weights
                    .iter()
                    .enumerate()
                    .fold((0usize, f64::MIN), |best, (i, &w)| {
                        if w > best.1 { (i, w) } else { best }
                    });
                choices[idx]
            } else {
                let total: f64 = weights.iter().sum();
                let mut draw = self.inner.lock().gen_range(0.0..total);
                for (choice, weight) in choices.iter().zip(weights) {
                    if draw < *weight {
                        return *choice;
                    }
                    draw -= weight;
                }
                *choices.last().unwrap()
            }
        } else if deterministic {
            ((high + low) as f64 / 2.0).round() as i64
        } else {
            self.inner.lock().gen_range(low..high)
        }
    }

    /// Draw from `N(mu, sigma)`; deterministic value is `mu`.
    pub fn norm(&self, deterministic: bool, mu: f64, sigma: f64) -> f64 {
        if deterministic {
            mu
        } else {
            let dist = Normal::new(mu, sigma).expect("sigma must be finite and non-negative");
            dist.sample(&mut *self.inner.lock())
        }
    }

    /// `|norm(mu, sigma)|`; deterministic value is `|mu|`.
    pub fn pnorm(&self, deterministic: bool, mu: f64, sigma: f64) -> f64 {
        self.norm(deterministic, mu, sigma).abs()
    }

    /// Treats `(low, high)` as the 5%/95% confidence interval of a standard
    /// normal and rescales a draw from it into `[low, high]`.
    pub fn cnorm(&self, deterministic: bool, low: f64, high: f64) -> f64 {
        let z = self.norm(deterministic, 0.0, 1.0);
        let pos = (z - (-1.96)) / (1.96 * 2.0);
        pos * (high - low) + low
    }

    /// A very small jitter duration in `[0, max_ms]`; deterministic value is
    /// `max_ms / 2`.
    pub fn jitter(&self, deterministic: bool, max_ms: u64) -> Duration {
        let ms = self.uni(deterministic, 0.0, max_ms as f64);
        Duration::from_secs_f64(ms / 1000.0)
    }

    /// A wait duration drawn from `N(low, 0.01 * scaler)` clamped to `>= 0`,
    /// or from [`Self::cnorm`] when `high` is given.
    pub fn wnorm(&self, deterministic: bool, low: f64, high: Option<f64>, scaler: f64) -> Duration {
        let secs = match high {
            None => self.norm(deterministic, low, 0.01 * scaler).max(0.0),
            Some(high) => self.cnorm(deterministic, low, high).max(0.0),
        };
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_draws_collapse_to_mean() {
        let rng = Rng::from_entropy();
        assert_eq!(rng.uni(true, 10.0, 20.0), 15.0);
        assert_eq!(rng.norm(true, 5.0, 2.0), 5.0);
        assert_eq!(rng.pnorm(true, -3.0, 1.0), 3.0);
    }

    #[test]
    fn iuni_weighted_deterministic_picks_heaviest_weight() {
        let rng = Rng::from_entropy();
        assert_eq!(rng.iuni(true, 3, 5, Some(&[0.8, 0.1, 0.1])), 3);
    }

    #[test]
    fn randomised_draws_stay_within_bounds() {
        let rng = Rng::from_seed(42);
        for _ in 0..100 {
            let v = rng.uni(false, 0.0, 1.0);
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
