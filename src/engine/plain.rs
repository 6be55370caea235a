//! Levelled reference engine.
//!
//! Simulates the approximate scheme's bookkeeping - slot packing, scale
//! growth and rescaling, level consumption, refresh, and the associated noise
//! - over cleartext f64 slots. Arithmetic on slot values is exact up to the
//! injected noise, so end-to-end runs against this engine measure exactly the
//! error the *evaluator* is responsible for (approximation quality, depth
//! scheduling), not lattice arithmetic.
//!
//! The noise model is deliberately coarse: Gaussian encoding noise on
//! encrypt, rounding noise on rescale and polynomial evaluation, and a
//! larger configured error on bootstrap. Magnitudes come from
//! [`SchemeParams`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

use crate::chebyshev::{multiplicative_depth, ChebyshevPoly};
use crate::engine::{HomomorphicEngine, LevelledCiphertext};
use crate::error::{KanFheError, Result};
use crate::params::SchemeParams;

/// Relative slack allowed when comparing operand scales.
const SCALE_TOLERANCE: f64 = 1e-9;

/// Ciphertext of the reference engine: the decoded slot values plus the
/// scale/level metadata a real ciphertext would carry.
#[derive(Debug, Clone)]
pub struct PlainCiphertext {
    pub slots: Vec<f64>,
    pub scale: f64,
    pub level: usize,
}

impl LevelledCiphertext for PlainCiphertext {
    fn level(&self) -> usize {
        self.level
    }

    fn scale(&self) -> f64 {
        self.scale
    }
}

/// Cleartext simulator of a levelled approximate homomorphic scheme.
pub struct PlainEngine {
    params: SchemeParams,
    rng: Mutex<ChaCha20Rng>,
    bootstraps: AtomicUsize,
}

impl PlainEngine {
    pub fn new(params: SchemeParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
            bootstraps: AtomicUsize::new(0),
        })
    }

    /// Deterministic noise stream, for reproducible tests.
    pub fn with_seed(params: SchemeParams, seed: u64) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
            bootstraps: AtomicUsize::new(0),
        })
    }

    pub fn params(&self) -> &SchemeParams {
        &self.params
    }

    /// Number of bootstrap invocations since construction. The orchestrator's
    /// refresh policy is judged against this counter.
    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::Relaxed)
    }

    fn add_noise(&self, slots: &mut [f64], std: f64) {
        if std == 0.0 {
            return;
        }
        // Normal::new only fails on a non-finite or negative std, which
        // validate() has excluded.
        let normal = match Normal::new(0.0, std) {
            Ok(n) => n,
            Err(_) => return,
        };
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.iter_mut() {
            *slot += normal.sample(&mut *rng);
        }
    }

    fn check_compatible(&self, a: &PlainCiphertext, b: &PlainCiphertext) -> Result<()> {
        if a.level != b.level {
            return Err(KanFheError::LevelMismatch { lhs: a.level, rhs: b.level });
        }
        let max = a.scale.abs().max(b.scale.abs());
        if (a.scale - b.scale).abs() > SCALE_TOLERANCE * max {
            return Err(KanFheError::ScaleMismatch { lhs: a.scale, rhs: b.scale });
        }
        Ok(())
    }
}

impl HomomorphicEngine for PlainEngine {
    type Ciphertext = PlainCiphertext;

    fn encrypt(&self, values: &[f64]) -> Result<PlainCiphertext> {
        let slots = self.params.slot_count();
        if values.len() > slots {
            return Err(KanFheError::Engine(format!(
                "{} values do not fit in {} slots",
                values.len(),
                slots
            )));
        }
        let mut packed = vec![0.0; slots];
        packed[..values.len()].copy_from_slice(values);
        // Fresh encryption noise, expressed in slot-value units.
        self.add_noise(&mut packed, self.params.error_std / self.params.default_scale());
        Ok(PlainCiphertext {
            slots: packed,
            scale: self.params.default_scale(),
            level: self.params.max_level(),
        })
    }

    fn decrypt(&self, ct: &PlainCiphertext) -> Result<Vec<f64>> {
        Ok(ct.slots.clone())
    }

    fn add(&self, a: &PlainCiphertext, b: &PlainCiphertext) -> Result<PlainCiphertext> {
        self.check_compatible(a, b)?;
        let slots = a.slots.iter().zip(&b.slots).map(|(x, y)| x + y).collect();
        Ok(PlainCiphertext { slots, scale: a.scale, level: a.level })
    }

    fn add_scalar(&self, ct: &PlainCiphertext, scalar: f64) -> Result<PlainCiphertext> {
        let slots = ct.slots.iter().map(|x| x + scalar).collect();
        Ok(PlainCiphertext { slots, scale: ct.scale, level: ct.level })
    }

    fn mul_scalar(&self, ct: &PlainCiphertext, scalar: f64) -> Result<PlainCiphertext> {
        // The plaintext operand is encoded at the default scale, so the
        // product's scale is the product of the two scales regardless of the
        // scalar's value.
        let slots = ct.slots.iter().map(|x| x * scalar).collect();
        Ok(PlainCiphertext {
            slots,
            scale: ct.scale * self.params.default_scale(),
            level: ct.level,
        })
    }

    fn rescale(&self, ct: &PlainCiphertext) -> Result<PlainCiphertext> {
        if ct.level == 0 {
            return Err(KanFheError::DepthExhausted { needed: 1, available: 0 });
        }
        let new_scale = ct.scale / self.params.rescale_divisor(ct.level);
        let mut slots = ct.slots.clone();
        // Rounding error of dropping the top modulus.
        self.add_noise(&mut slots, self.params.error_std / new_scale);
        Ok(PlainCiphertext { slots, scale: new_scale, level: ct.level - 1 })
    }

    fn evaluate_polynomial(
        &self,
        ct: &PlainCiphertext,
        poly: &ChebyshevPoly,
    ) -> Result<PlainCiphertext> {
        let depth = multiplicative_depth(poly.degree());
        if ct.level < depth {
            return Err(KanFheError::DepthExhausted { needed: depth, available: ct.level });
        }
        let mut slots: Vec<f64> = ct.slots.iter().map(|&t| poly.eval_basis(t)).collect();
        self.add_noise(&mut slots, self.params.error_std / self.params.default_scale());
        Ok(PlainCiphertext {
            slots,
            // Minimal-depth evaluation targets the default scale.
            scale: self.params.default_scale(),
            level: ct.level - depth,
        })
    }

    fn bootstrap(&self, ct: &PlainCiphertext) -> Result<PlainCiphertext> {
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
        let mut slots = ct.slots.clone();
        self.add_noise(&mut slots, self.params.bootstrap_error_std);
        Ok(PlainCiphertext {
            slots,
            scale: self.params.default_scale(),
            level: self.params.max_level(),
        })
    }

    fn max_level(&self) -> usize {
        self.params.max_level()
    }

    fn slot_count(&self) -> usize {
        self.params.slot_count()
    }

    fn default_scale(&self) -> f64 {
        self.params.default_scale()
    }
}
