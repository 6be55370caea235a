//! A single encrypted unit: affine combination plus approximated activation.
//!
//! The operation order inside a unit is load-bearing, not stylistic:
//!
//! ```text
//! affine combine (mul_scalar each input, add, add bias)
//!   ↓ rescale            - back to the canonical scale
//! change of basis (mul_scalar, add_scalar)
//!   ↓ rescale            - back to the canonical scale
//! polynomial evaluation  - minimal-depth, in the Chebyshev basis domain
//! ```
//!
//! The sequence is enforced in this one place instead of being re-derived at
//! every call site. A unit consumes `2 + multiplicative_depth(degree)`
//! levels.

use crate::activation::Activation;
use crate::chebyshev::{ChebyshevPoly, Interval};
use crate::engine::HomomorphicEngine;
use crate::error::{KanFheError, Result};

/// One unit of a layer: the trained affine coefficients and the activation
/// whose Chebyshev approximation follows the affine step.
///
/// Model-scoped and immutable; request-scoped ciphertexts are passed to
/// [`forward`](Node::forward). Coefficients that collapse to exact integers
/// degrade the scheme's encoding precision (not correctness); the artifact
/// loader nudges them off the integer grid before a `Node` is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub coefficients: Vec<f64>,
    pub bias: f64,
    pub activation: Activation,
}

impl Node {
    pub fn new(coefficients: Vec<f64>, bias: f64, activation: Activation) -> Self {
        Self { coefficients, bias, activation }
    }

    /// Number of encrypted inputs the unit combines.
    pub fn arity(&self) -> usize {
        self.coefficients.len()
    }

    /// Encrypted affine combination: `sum_i c_i * input_i + bias`, rescaled
    /// back to the canonical scale. Consumes one level.
    pub fn affine_combination<E: HomomorphicEngine>(
        &self,
        inputs: &[E::Ciphertext],
        engine: &E,
    ) -> Result<E::Ciphertext> {
        if inputs.len() != self.coefficients.len() || inputs.is_empty() {
            return Err(KanFheError::CoefficientMismatch {
                expected: self.coefficients.len(),
                actual: inputs.len(),
            });
        }

        let mut acc = engine.mul_scalar(&inputs[0], self.coefficients[0])?;
        for (coefficient, input) in self.coefficients.iter().zip(inputs).skip(1) {
            let term = engine.mul_scalar(input, *coefficient)?;
            acc = engine.add(&acc, &term)?;
        }
        let acc = engine.add_scalar(&acc, self.bias)?;
        engine.rescale(&acc)
    }

    /// Full forward pass of the unit.
    ///
    /// # Arguments
    ///
    /// * `inputs` - upstream ciphertexts, one per coefficient; sharing a
    ///   ciphertext with other units is fine
    /// * `interval` - pre-activation bound the approximation is fitted on
    /// * `degree` - Chebyshev degree of the activation approximation
    /// * `engine` - collaborator backend executing the schedule
    ///
    /// Any engine failure aborts the unit; there is no partial result.
    pub fn forward<E: HomomorphicEngine>(
        &self,
        inputs: &[E::Ciphertext],
        interval: Interval,
        degree: usize,
        engine: &E,
    ) -> Result<E::Ciphertext> {
        let acc = self.affine_combination(inputs, engine)?;

        let poly = ChebyshevPoly::fit(
            |x| self.activation.eval(x),
            interval.lo,
            interval.hi,
            degree,
        )?;

        let (scalar, constant) = poly.change_of_basis();
        let remapped = engine.mul_scalar(&acc, scalar)?;
        let remapped = engine.add_scalar(&remapped, constant)?;
        let remapped = engine.rescale(&remapped)?;

        engine.evaluate_polynomial(&remapped, &poly)
    }
}
