//! Scheme parameter sets for the levelled approximate scheme.
//!
//! The configuration is fixed at startup and never mutated at request time:
//! ring size, modulus chain (bit width per level, which bounds the
//! multiplicative depth available between refreshes), default fixed-point
//! scale, and the noise magnitudes the reference engine injects.
//!
//! ## Chain layout
//!
//! `log_q[0]` is the base modulus and is never consumed; each rescale drops
//! the top remaining modulus, so a chain of length `L + 1` gives `L` levels
//! of multiplicative depth before a bootstrap is required. Scaling moduli are
//! sized to match the default scale so a rescale returns the ciphertext to
//! the canonical scale exactly.

use crate::error::{KanFheError, Result};

/// Parameters of the levelled scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeParams {
    /// Log2 of the ring degree. Slot count is half the ring degree.
    pub log_n: u32,

    /// Log2 of each modulus in the chain, base first.
    pub log_q: Vec<u32>,

    /// Log2 of the default fixed-point scale.
    pub log_default_scale: u32,

    /// Standard deviation of fresh encryption / rounding noise, in integer
    /// units of the scale (the usual 3.2 of RLWE parameter sets).
    pub error_std: f64,

    /// Absolute slot-value error a bootstrap may introduce.
    pub bootstrap_error_std: f64,
}

impl SchemeParams {
    /// Production-shaped parameters: ring degree 2^16 and the depth-10 chain
    /// `{55, 40 x 10}` at scale 2^40 used by the trained models.
    pub fn new_depth10_logn16() -> Self {
        Self {
            log_n: 16,
            log_q: vec![55, 40, 40, 40, 40, 40, 40, 40, 40, 40, 40],
            log_default_scale: 40,
            error_std: 3.2,
            bootstrap_error_std: 1e-8,
        }
    }

    /// Same chain on a small insecure ring, for tests. Analogous to running
    /// the production configuration with a reduced ring degree.
    pub fn new_test_logn12() -> Self {
        Self {
            log_n: 12,
            ..Self::new_depth10_logn16()
        }
    }

    /// Deliberately short chain (7 levels: exactly one degree-31 layer) on a
    /// small ring. Forces a refresh at every layer boundary, which is what
    /// bootstrap-policy tests want to observe.
    pub fn new_shallow_logn12() -> Self {
        Self {
            log_n: 12,
            log_q: vec![55, 40, 40, 40, 40, 40, 40, 40],
            log_default_scale: 40,
            error_std: 3.2,
            bootstrap_error_std: 1e-8,
        }
    }

    /// Remaining multiplicative depth of a fresh ciphertext.
    pub fn max_level(&self) -> usize {
        self.log_q.len().saturating_sub(1)
    }

    /// Values packed per ciphertext.
    pub fn slot_count(&self) -> usize {
        1usize << (self.log_n - 1)
    }

    pub fn default_scale(&self) -> f64 {
        2f64.powi(self.log_default_scale as i32)
    }

    /// Modulus dropped when rescaling away from `level`.
    pub fn rescale_divisor(&self, level: usize) -> f64 {
        2f64.powi(self.log_q[level] as i32)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_n < 2 {
            return Err(KanFheError::InvalidParams(format!(
                "ring degree 2^{} too small",
                self.log_n
            )));
        }
        if self.log_q.len() < 2 {
            return Err(KanFheError::InvalidParams(
                "modulus chain needs a base modulus and at least one level".into(),
            ));
        }
        if self.log_default_scale == 0 {
            return Err(KanFheError::InvalidParams("default scale must be positive".into()));
        }
        if self.error_std < 0.0 || self.bootstrap_error_std < 0.0 {
            return Err(KanFheError::InvalidParams("noise magnitudes must be >= 0".into()));
        }
        Ok(())
    }
}
