//! Poisson sampling of per-second message counts.
//!
//! [`PoissonSampler`] draws from Poisson(λ) using the multiplication method for
//! small means and transformed rejection with squeeze (PTRS) for `λ >= 30`.
//! Every draw lands in the integer window `[ceil(max(0, λ - √λ)), floor(λ + √λ)]`.
//!
//! Uniform draws come from any [`RandomSource`], so tests can script the
//! sequence while production code uses [`UniformSource`] over `rand`'s `StdRng`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Result, TrafficError};

/// Below this mean the multiplication method is used.
pub const PTRS_THRESHOLD: f64 = 30.0;

/// Upper bound on uniform draws (small λ) or rejection rounds (large λ) per sample.
pub const MAX_ATTEMPTS: u32 = 10_000;

/// Largest mean the sampler accepts.
pub const MAX_LAMBDA: f64 = 1.0e9;

/// A source of independent uniform draws in `[0, 1)`.
pub trait RandomSource {
    fn next_uniform(&mut self) -> f64;
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn next_uniform(&mut self) -> f64 {
        (**self).next_uniform()
    }
}

impl<T: RandomSource + ?Sized> RandomSource for Box<T> {
    fn next_uniform(&mut self) -> f64 {
        (**self).next_uniform()
    }
}

/// [`RandomSource`] backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct UniformSource<R = StdRng> {
    rng: R,
}

impl UniformSource<StdRng> {
    /// Generator seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Deterministic generator for reproducible plans.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl<R: Rng> UniformSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> RandomSource for UniformSource<R> {
    fn next_uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Regime {
    Zero,
    Multiplication { limit: f64 },
    Ptrs { b: f64, a: f64, inv_alpha: f64, v_r: f64, log_lambda: f64 },
}

/// Draws clamped Poisson(λ) counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonSampler {
    lambda: f64,
    low: u32,
    high: u32,
    regime: Regime,
}

impl PoissonSampler {
    /// Prepare a sampler for mean `lambda`.
    ///
    /// `lambda` must be finite, non-negative and at most [`MAX_LAMBDA`].
    pub fn new(lambda: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda < 0.0 || lambda > MAX_LAMBDA {
            return Err(TrafficError::configuration(format!(
                "Poisson mean must be within [0, {MAX_LAMBDA}], got {lambda}"
            )));
        }

        let spread = lambda.sqrt();
        let low = (lambda - spread).max(0.0).ceil() as u32;
        let high = (lambda + spread).floor() as u32;

        let regime = if lambda == 0.0 {
            Regime::Zero
        } else if lambda < PTRS_THRESHOLD {
            Regime::Multiplication { limit: (-lambda).exp() }
        } else {
            let b = 0.931 + 2.53 * spread;
            Regime::Ptrs {
                b,
                a: -0.059 + 0.02483 * b,
                inv_alpha: 1.1239 + 1.1328 / (b - 3.4),
                v_r: 0.9277 - 3.6224 / (b - 2.0),
                log_lambda: lambda.ln(),
            }
        };

        Ok(Self { lambda, low, high, regime })
    }

    /// Inclusive range every draw falls in.
    pub fn bounds(&self) -> (u32, u32) {
        (self.low, self.high)
    }

    /// Draw one count.
    ///
    /// Fails with [`TrafficError::Sampling`] when the source keeps producing
    /// values that never terminate the algorithm within [`MAX_ATTEMPTS`].
    pub fn sample<R: RandomSource + ?Sized>(&self, source: &mut R) -> Result<u32> {
        match self.regime {
            Regime::Zero => Ok(0),
            Regime::Multiplication { limit } => self.multiply(limit, source),
            Regime::Ptrs { b, a, inv_alpha, v_r, log_lambda } => {
                self.transformed_rejection(b, a, inv_alpha, v_r, log_lambda, source)
            }
        }
    }

    fn multiply<R: RandomSource + ?Sized>(&self, limit: f64, source: &mut R) -> Result<u32> {
        let mut product = 1.0;
        let mut draws: u32 = 0;

        while product > limit {
            if draws >= MAX_ATTEMPTS {
                return Err(self.exhausted(draws));
            }
            draws += 1;
            product *= source.next_uniform();
        }

        let k = draws.saturating_sub(1);
        Ok(k.clamp(self.low, self.high))
    }

    fn transformed_rejection<R: RandomSource + ?Sized>(
        &self,
        b: f64,
        a: f64,
        inv_alpha: f64,
        v_r: f64,
        log_lambda: f64,
        source: &mut R,
    ) -> Result<u32> {
        let (low, high) = (f64::from(self.low), f64::from(self.high));

        for _ in 0..MAX_ATTEMPTS {
            let u = source.next_uniform() - 0.5;
            let v = source.next_uniform();
            let us = 0.5 - u.abs();

            if us < 0.013 && v > us {
                continue;
            }

            let k = ((2.0 * a / us + b) * u + self.lambda + 0.43).floor();
            if !k.is_finite() || k < low || k > high {
                continue;
            }

            // Squeeze acceptance
            if us >= 0.07 && v <= v_r {
                return Ok(k as u32);
            }
            if us < 0.013 && v <= (-0.5 * k * k / self.lambda).exp() {
                return Ok(k as u32);
            }

            let lhs = v.ln() + inv_alpha.ln() - (a / (us * us) + b).ln();
            let rhs = -self.lambda + k * log_lambda - log_factorial(k);
            if lhs <= rhs {
                return Ok(k as u32);
            }
        }

        Err(self.exhausted(MAX_ATTEMPTS))
    }

    fn exhausted(&self, attempts: u32) -> TrafficError {
        TrafficError::Sampling { lambda: self.lambda, attempts }
    }
}

/// `ln(k!)` for non-negative integral `k`, via `ln Γ(k + 1)`.
pub fn log_factorial(k: f64) -> f64 {
    log_gamma(k + 1.0)
}

/// Stirling series for `ln Γ(x)`, `x > 0`, shifting small arguments up to 7.
fn log_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 10] = [
        8.333333333333333e-02,
        -2.777777777777778e-03,
        7.936507936507937e-04,
        -5.952380952380952e-04,
        8.417508417508418e-04,
        -1.917526917526918e-03,
        6.410256410256410e-03,
        -2.955065359477124e-02,
        1.796443723688307e-01,
        -1.39243221690590e+00,
    ];
    const LN_2PI: f64 = 1.8378770664093453;

    if x == 1.0 || x == 2.0 {
        return 0.0;
    }

    let shift = if x <= 7.0 { (7.0 - x).floor() } else { 0.0 };
    let mut x0 = x + shift;
    let x2 = 1.0 / (x0 * x0);

    let series = COEFFS.iter().rev().fold(0.0, |acc, c| acc * x2 + c);
    let mut value = series / x0 + 0.5 * LN_2PI + (x0 - 0.5) * x0.ln() - x0;

    for _ in 0..shift as u32 {
        value -= (x0 - 1.0).ln();
        x0 -= 1.0;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedSource;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_draws_stay_inside_window(lambda in 0.0f64..400.0, seed in any::<u64>()) {
            let sampler = PoissonSampler::new(lambda).unwrap();
            let (low, high) = sampler.bounds();
            let mut source = UniformSource::seeded(seed);

            for _ in 0..50 {
                let k = sampler.sample(&mut source).unwrap();
                prop_assert!(k >= low && k <= high, "lambda={} k={} window=[{}, {}]", lambda, k, low, high);
                prop_assert!(f64::from(k) >= (lambda - lambda.sqrt()).max(0.0) - 1e-9);
                prop_assert!(f64::from(k) <= lambda + lambda.sqrt() + 1e-9);
            }
        }
    }

    #[test]
    fn zero_mean_always_draws_zero() {
        let sampler = PoissonSampler::new(0.0).unwrap();
        let mut source = UniformSource::seeded(7);
        assert_eq!(sampler.bounds(), (0, 0));
        assert!((0..1000).all(|_| sampler.sample(&mut source).unwrap() == 0));
    }

    #[test]
    fn window_for_five_is_three_to_seven() {
        let sampler = PoissonSampler::new(5.0).unwrap();
        assert_eq!(sampler.bounds(), (3, 7));
    }

    #[test]
    fn sample_mean_converges_in_both_regimes() {
        for lambda in [4.0, 12.5, 30.0, 250.0] {
            let sampler = PoissonSampler::new(lambda).unwrap();
            let mut source = UniformSource::seeded(0xB0B5);
            let n = 20_000;
            let total: u64 = (0..n).map(|_| u64::from(sampler.sample(&mut source).unwrap())).sum();
            let mean = total as f64 / n as f64;
            // The window truncation keeps the mean within a few percent of λ.
            assert!((mean - lambda).abs() / lambda < 0.05, "lambda={lambda} mean={mean}");
        }
    }

    #[test]
    fn multiplication_counts_draws_above_limit() {
        // e^-1 ≈ 0.368: 0.9 → 0.9, 0.5 → 0.45, 0.5 → 0.225 stops after three draws, k = 2
        let sampler = PoissonSampler::new(1.0).unwrap();
        let mut source = ScriptedSource::new(vec![0.9, 0.5, 0.5]);
        assert_eq!(sampler.sample(&mut source).unwrap(), 2);
    }

    #[test]
    fn small_mean_results_are_clamped_up() {
        // First draw already below e^-9, so the raw count is 0 but the window starts at 6.
        let sampler = PoissonSampler::new(9.0).unwrap();
        let mut source = ScriptedSource::new(vec![0.0]);
        assert_eq!(sampler.sample(&mut source).unwrap(), 6);
    }

    #[test]
    fn ptrs_squeeze_accepts_centre_draw() {
        // U = 0 gives k = floor(λ + 0.43) and us = 0.5 passes the squeeze with small V.
        let sampler = PoissonSampler::new(100.0).unwrap();
        let mut source = ScriptedSource::new(vec![0.5, 0.1]);
        assert_eq!(sampler.sample(&mut source).unwrap(), 100);
    }

    #[test]
    fn degenerate_sources_exhaust_the_budget() {
        let sampler = PoissonSampler::new(5.0).unwrap();
        let mut stuck = ScriptedSource::new(vec![0.99999]);
        assert!(matches!(
            sampler.sample(&mut stuck),
            Err(TrafficError::Sampling { attempts: MAX_ATTEMPTS, .. })
        ));

        let sampler = PoissonSampler::new(100.0).unwrap();
        let mut zeros = ScriptedSource::new(vec![0.0]);
        let err = sampler.sample(&mut zeros).unwrap_err();
        assert!(matches!(err, TrafficError::Sampling { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejects_invalid_means() {
        assert!(PoissonSampler::new(-1.0).is_err());
        assert!(PoissonSampler::new(f64::NAN).is_err());
        assert!(PoissonSampler::new(f64::INFINITY).is_err());
    }

    #[test]
    fn log_factorial_matches_exact_values() {
        let mut exact = 0.0f64;
        for k in 1..=40u32 {
            exact += f64::from(k).ln();
            let approx = log_factorial(f64::from(k));
            assert!((approx - exact).abs() < 1e-9, "k={k}: {approx} vs {exact}");
        }
        assert_eq!(log_factorial(0.0), 0.0);
    }
}
