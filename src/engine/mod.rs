//! The collaborator-engine seam.
//!
//! The cryptographic primitives proper - key generation, encoding,
//! encryption, the low-level bootstrap and minimal-depth polynomial
//! evaluation - live behind [`HomomorphicEngine`]. The evaluator only ever
//! schedules these operations; it never looks inside a ciphertext beyond the
//! `level`/`scale` metadata every levelled scheme exposes.
//!
//! Ciphertexts are value-semantic: every operation returns a new ciphertext
//! and never mutates its operands, so configuration and in-flight ciphertexts
//! can be shared freely across concurrently evaluated units.
//!
//! [`plain::PlainEngine`] is the in-repo implementation: a cleartext
//! simulator of the scheme's scale/level/noise bookkeeping used for tests and
//! accuracy validation. A binding to a real lattice backend implements the
//! same trait.

pub mod plain;

use crate::chebyshev::ChebyshevPoly;
use crate::error::Result;

/// Metadata every ciphertext of a levelled approximate scheme carries.
pub trait LevelledCiphertext {
    /// Remaining multiplicative depth before a refresh is required.
    fn level(&self) -> usize;

    /// Fixed-point precision factor currently encoded into the values.
    fn scale(&self) -> f64;
}

/// Operations the evaluator schedules on a homomorphic backend.
pub trait HomomorphicEngine {
    type Ciphertext: LevelledCiphertext + Clone + Send + Sync;

    // === Boundary ===

    /// Encrypt a slot vector (at most [`slot_count`](Self::slot_count)
    /// values; missing slots are zero). Boundary only.
    fn encrypt(&self, values: &[f64]) -> Result<Self::Ciphertext>;

    /// Decrypt and decode a full slot vector. Boundary only.
    fn decrypt(&self, ct: &Self::Ciphertext) -> Result<Vec<f64>>;

    // === Homomorphic arithmetic ===

    /// Slot-wise addition of two ciphertexts at the same level and scale.
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Add a plaintext constant to every slot. Scale and level unchanged.
    fn add_scalar(&self, ct: &Self::Ciphertext, scalar: f64) -> Result<Self::Ciphertext>;

    /// Multiply every slot by a plaintext constant. Grows the scale by the
    /// default scale; follow with [`rescale`](Self::rescale) before any
    /// further multiplicative operation.
    fn mul_scalar(&self, ct: &Self::Ciphertext, scalar: f64) -> Result<Self::Ciphertext>;

    /// Drop the scale back to the canonical step, consuming one level.
    fn rescale(&self, ct: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Minimal-depth evaluation of a Chebyshev-basis polynomial on a
    /// ciphertext already mapped into the basis domain. Consumes
    /// [`multiplicative_depth`](crate::chebyshev::multiplicative_depth)
    /// levels and returns at the default scale.
    fn evaluate_polynomial(
        &self,
        ct: &Self::Ciphertext,
        poly: &ChebyshevPoly,
    ) -> Result<Self::Ciphertext>;

    /// Refresh a ciphertext to (near-)maximum level, approximately
    /// preserving its decrypted value. By far the most expensive operation;
    /// the orchestrator invokes it only when the next stage would otherwise
    /// run out of depth.
    fn bootstrap(&self, ct: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    // === Configuration ===

    /// Level of a fresh ciphertext.
    fn max_level(&self) -> usize;

    /// Values packed per ciphertext.
    fn slot_count(&self) -> usize;

    /// Canonical fixed-point scale.
    fn default_scale(&self) -> f64;
}
