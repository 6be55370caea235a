//! Chebyshev approximation of activation functions.
//!
//! Every nonlinear activation is evaluated homomorphically as a fixed-degree
//! polynomial in the Chebyshev basis, fitted over the interval the unit's
//! pre-activation value is known to stay in. The fit itself is pure numerics:
//!
//! ```text
//! fit(f, lo, hi, d)          interpolant at d+1 interior Chebyshev nodes
//!   ↓
//! change_of_basis()          affine map [lo,hi] → [-1,1], applied to the
//!   ↓                        ciphertext before polynomial evaluation
//! evaluate (engine)          minimal-depth evaluation in the basis domain
//! ```
//!
//! Coefficient sums are accumulated exactly in fixed-point `BigInt`
//! arithmetic. Plain f64 summation leaves spurious high-order coefficients
//! around 1e-15, and those explode when a low-degree polynomial (identity,
//! square) is legitimately evaluated outside its fit interval: T_31 already
//! exceeds 1e30 a few half-widths out. Exact accumulation plus the relative
//! pruning pass below keeps such polynomials exactly sparse.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{KanFheError, Result};

/// Fractional bits of the fixed-point coefficient accumulator.
const ACCUMULATOR_FRACTION_BITS: i64 = 128;

/// Coefficients whose magnitude is below this fraction of the largest
/// coefficient are artifacts of f64 node evaluation, not of the function.
const PRUNE_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Closed approximation interval `[lo, hi]`.
///
/// Serialised as a two-element array, so model artifacts read
/// `"interval": [-16.0, 16.0]`. Construction validates `lo < hi` and
/// finiteness; the reversed `[K, -K]` call is rejected, not reinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", try_from = "[f64; 2]")]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Result<Self> {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(KanFheError::DegenerateInterval { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    /// Symmetric interval `[-k, k]`, the common case in trained models.
    pub fn symmetric(k: f64) -> Result<Self> {
        Self::new(-k, k)
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lo <= x && x <= self.hi
    }
}

impl From<Interval> for [f64; 2] {
    fn from(iv: Interval) -> Self {
        [iv.lo, iv.hi]
    }
}

impl TryFrom<[f64; 2]> for Interval {
    type Error = KanFheError;

    fn try_from(raw: [f64; 2]) -> Result<Self> {
        Interval::new(raw[0], raw[1])
    }
}

/// Chebyshev-basis polynomial fitted on an interval.
///
/// `coeffs[k]` multiplies `T_k(t)` where `t` is the image of `x` under the
/// change of basis. The homomorphic evaluator consumes the coefficients in
/// the basis domain; [`ChebyshevPoly::eval`] folds the remap back in for
/// cleartext use.
#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevPoly {
    pub coeffs: Vec<f64>,
    pub interval: Interval,
}

impl ChebyshevPoly {
    /// Fit `f` on `[lo, hi]` with a degree-`degree` Chebyshev interpolant.
    ///
    /// The nodes are strictly interior to the interval, so endpoint
    /// singularities of `f` (logarithm at zero, say) do not poison the fit -
    /// whether the fit is any *good* near such a point is a modeling decision
    /// made where the interval is chosen, not here.
    ///
    /// # Arguments
    ///
    /// * `f` - the activation, evaluated in f64
    /// * `lo`, `hi` - approximation interval, `lo < hi`
    /// * `degree` - polynomial degree, >= 1
    pub fn fit(f: impl Fn(f64) -> f64, lo: f64, hi: f64, degree: usize) -> Result<Self> {
        let interval = Interval::new(lo, hi)?;
        if degree == 0 {
            return Err(KanFheError::InvalidDegree(0));
        }

        let n = degree + 1;
        let half_width = 0.5 * interval.width();
        let center = 0.5 * (interval.lo + interval.hi);

        // Sample f at the Chebyshev nodes t_j = cos(pi (j + 1/2) / n).
        let mut samples = Vec::with_capacity(n);
        for j in 0..n {
            let theta = PI * (j as f64 + 0.5) / n as f64;
            let t = theta.cos();
            samples.push(f(center + half_width * t));
        }

        // c_k = (2/n) * sum_j f_j cos(k theta_j), with c_0 halved.
        let mut coeffs = Vec::with_capacity(n);
        for k in 0..n {
            let mut acc = FixedPointSum::new();
            for (j, &sample) in samples.iter().enumerate() {
                let theta = PI * (k as f64) * (j as f64 + 0.5) / n as f64;
                acc.add(sample * theta.cos());
            }
            let weight = if k == 0 { 1.0 } else { 2.0 };
            coeffs.push(acc.value() * weight / n as f64);
        }

        prune_coefficients(&mut coeffs);

        Ok(Self { coeffs, interval })
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Affine remap `t = scalar * x + constant` taking `[lo, hi]` onto the
    /// basis domain `[-1, 1]`. Applied to the ciphertext (one scalar
    /// multiplication, one constant addition, one rescale) before the
    /// polynomial itself is evaluated.
    pub fn change_of_basis(&self) -> (f64, f64) {
        let scalar = 2.0 / self.interval.width();
        let constant = -(self.interval.hi + self.interval.lo) / self.interval.width();
        (scalar, constant)
    }

    /// Evaluate at `x` in the original domain.
    pub fn eval(&self, x: f64) -> f64 {
        let (scalar, constant) = self.change_of_basis();
        self.eval_basis(scalar * x + constant)
    }

    /// Evaluate at `t` in the basis domain via the Clenshaw recurrence.
    ///
    /// Engines call this per slot after the change of basis has already been
    /// applied homomorphically.
    pub fn eval_basis(&self, t: f64) -> f64 {
        let two_t = 2.0 * t;
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        for &c in self.coeffs.iter().skip(1).rev() {
            let b0 = c + two_t * b1 - b2;
            b2 = b1;
            b1 = b0;
        }
        self.coeffs[0] + t * b1 - b2
    }
}

/// Multiplicative depth a minimal-depth (Paterson-Stockmeyer style)
/// homomorphic evaluation of a degree-`degree` polynomial consumes:
/// `ceil(log2(degree + 1))`.
pub fn multiplicative_depth(degree: usize) -> usize {
    let mut depth = 0;
    while (1usize << depth) < degree + 1 {
        depth += 1;
    }
    depth
}

/// Zero out coefficients that sit below f64 sampling noise relative to the
/// dominant coefficient. See the module docs for why this matters.
fn prune_coefficients(coeffs: &mut [f64]) {
    let max = coeffs.iter().fold(0.0f64, |m, c| m.max(c.abs()));
    if max == 0.0 {
        return;
    }
    let threshold = max * PRUNE_RELATIVE_TOLERANCE;
    for c in coeffs.iter_mut() {
        if c.abs() < threshold {
            *c = 0.0;
        }
    }
}

/// Exact accumulator for sums of f64 terms.
///
/// Each term is decomposed into its exact mantissa/exponent pair and added to
/// a `BigInt` holding 128 fractional bits, so the summation itself introduces
/// no rounding beyond the 2^-128 quantisation of each term.
struct FixedPointSum {
    bits: BigInt,
}

impl FixedPointSum {
    fn new() -> Self {
        Self { bits: BigInt::zero() }
    }

    fn add(&mut self, x: f64) {
        if x == 0.0 || !x.is_finite() {
            // Non-finite samples (a singularity sampled head-on) would poison
            // the whole sum; the fit is already garbage, keep it finite.
            return;
        }
        let raw = x.to_bits();
        let negative = raw >> 63 == 1;
        let exp_bits = ((raw >> 52) & 0x7ff) as i64;
        let frac = raw & ((1u64 << 52) - 1);
        let (mantissa, exponent) = if exp_bits == 0 {
            (frac, -1074i64)
        } else {
            (frac | (1u64 << 52), exp_bits - 1075)
        };

        let mut term = BigInt::from(mantissa);
        let shift = exponent + ACCUMULATOR_FRACTION_BITS;
        if shift >= 0 {
            term <<= shift as u64;
        } else {
            term >>= (-shift) as u64;
        }
        if negative {
            term = -term;
        }
        self.bits += term;
    }

    fn value(&self) -> f64 {
        let approx = self.bits.to_f64().unwrap_or_else(|| {
            if self.bits.is_negative() {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }
        });
        approx / 2f64.powi(ACCUMULATOR_FRACTION_BITS as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_error(poly: &ChebyshevPoly, f: impl Fn(f64) -> f64, lo: f64, hi: f64) -> f64 {
        let mut worst = 0.0f64;
        for i in 0..=200 {
            let x = lo + (hi - lo) * i as f64 / 200.0;
            worst = worst.max((poly.eval(x) - f(x)).abs());
        }
        worst
    }

    #[test]
    fn test_rejects_degenerate_interval() {
        assert!(ChebyshevPoly::fit(|x| x, 1.0, 1.0, 7).is_err());
        // The reversed [K, -K] call must fail, not silently flip.
        assert!(ChebyshevPoly::fit(f64::sin, 16.0, -16.0, 31).is_err());
        assert!(ChebyshevPoly::fit(|x| x, f64::NAN, 1.0, 7).is_err());
    }

    #[test]
    fn test_rejects_zero_degree() {
        match ChebyshevPoly::fit(|x| x, -1.0, 1.0, 0) {
            Err(KanFheError::InvalidDegree(0)) => {}
            other => panic!("expected InvalidDegree, got {:?}", other.map(|p| p.coeffs)),
        }
    }

    #[test]
    fn test_identity_degree_one_is_exact() {
        let poly = ChebyshevPoly::fit(|x| x, -8.0, 8.0, 1).unwrap();
        // c_0 = 0, c_1 = half-width.
        assert!(poly.coeffs[0].abs() < 1e-12);
        assert!((poly.coeffs[1] - 8.0).abs() < 1e-12);
        for &x in &[-8.0, -1.3, 0.0, 2.5, 8.0] {
            assert!((poly.eval(x) - x).abs() < 1e-12, "identity broken at {}", x);
        }
    }

    #[test]
    fn test_identity_extrapolates_exactly() {
        // The readout layers of trained models run an affine step through an
        // identity "activation" whose inputs land far outside the fit
        // interval. Pruning must leave the polynomial exactly linear so that
        // extrapolation is safe.
        let poly = ChebyshevPoly::fit(|x| x, -16.0, 16.0, 31).unwrap();
        for (k, &c) in poly.coeffs.iter().enumerate() {
            if k != 1 {
                assert_eq!(c, 0.0, "spurious coefficient c_{} = {:e}", k, c);
            }
        }
        for &x in &[-150.0, 85.59, 372.0] {
            assert!(
                (poly.eval(x) - x).abs() < 1e-9 * x.abs(),
                "extrapolation off at {}: {}",
                x,
                poly.eval(x)
            );
        }
    }

    #[test]
    fn test_square_matches_exactly() {
        let poly = ChebyshevPoly::fit(|x| x * x, -16.0, 16.0, 31).unwrap();
        let err = max_error(&poly, |x| x * x, -16.0, 16.0);
        assert!(err < 1e-9, "square fit error {}", err);
    }

    #[test]
    fn test_change_of_basis_maps_endpoints() {
        let poly = ChebyshevPoly::fit(f64::sin, 0.0, 16.0, 15).unwrap();
        let (scalar, constant) = poly.change_of_basis();
        assert!((scalar * 0.0 + constant + 1.0).abs() < 1e-12);
        assert!((scalar * 16.0 + constant - 1.0).abs() < 1e-12);
        assert!((scalar * 8.0 + constant).abs() < 1e-12);
    }

    #[test]
    fn test_sin_accuracy_wide_interval() {
        let poly = ChebyshevPoly::fit(f64::sin, -16.0, 16.0, 31).unwrap();
        let err = max_error(&poly, f64::sin, -16.0, 16.0);
        assert!(err < 1e-4, "sin fit error {} too large", err);
    }

    #[test]
    fn test_tanh_error_shrinks_with_degree() {
        // Activation fidelity must improve monotonically with degree.
        let errors: Vec<f64> = [8, 16, 31]
            .iter()
            .map(|&d| {
                let poly = ChebyshevPoly::fit(f64::tanh, -5.0, 5.0, d).unwrap();
                max_error(&poly, f64::tanh, -5.0, 5.0)
            })
            .collect();
        assert!(errors[0] < 0.5, "degree 8 error {}", errors[0]);
        assert!(errors[1] < 0.05, "degree 16 error {}", errors[1]);
        assert!(errors[2] < 5e-3, "degree 31 error {}", errors[2]);
        assert!(errors[1] < errors[0], "no improvement 8 -> 16: {:?}", errors);
        assert!(errors[2] < errors[1], "no improvement 16 -> 31: {:?}", errors);
    }

    #[test]
    fn test_log_near_singularity_is_finite() {
        // Interior nodes keep the fit finite even with a singularity at an
        // endpoint; quality near the endpoint is the caller's problem.
        let poly = ChebyshevPoly::fit(f64::ln, 0.0, 16.0, 31).unwrap();
        assert!(poly.coeffs.iter().all(|c| c.is_finite()));
        // Convergence is only algebraic with the singularity on the
        // boundary, but away from it the fit should still be usable.
        let err = max_error(&poly, f64::ln, 2.0, 16.0);
        assert!(err < 0.2, "log fit error {} away from endpoint", err);
    }

    #[test]
    fn test_multiplicative_depth() {
        assert_eq!(multiplicative_depth(1), 1);
        assert_eq!(multiplicative_depth(2), 2);
        assert_eq!(multiplicative_depth(3), 2);
        assert_eq!(multiplicative_depth(7), 3);
        assert_eq!(multiplicative_depth(8), 4);
        assert_eq!(multiplicative_depth(15), 4);
        assert_eq!(multiplicative_depth(31), 5);
        assert_eq!(multiplicative_depth(63), 6);
    }

    #[test]
    fn test_interval_serde_as_pair() {
        let iv = Interval::new(-16.0, 16.0).unwrap();
        let json = serde_json::to_string(&iv).unwrap();
        assert_eq!(json, "[-16.0,16.0]");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, iv);
        // Reversed pairs are rejected at deserialisation time.
        assert!(serde_json::from_str::<Interval>("[16.0,-16.0]").is_err());
    }
}
