//! The closed set of univariate activations a trained network may use.
//!
//! The original models wire activations in as bare closures; here they are a
//! tagged enum so model artifacts can name them, the approximator stays
//! generic, and the set is exhaustively testable. `Contract` is the trained
//! models' near-zero passthrough (`factor * x`, factor around 1e-6) used to
//! disable a branch without changing the network shape.

use serde::{Deserialize, Serialize};

/// Activation function of a single unit.
///
/// Each variant maps to a pure `f64 -> f64` function: the exact form on the
/// cleartext reference path, and the target of the Chebyshev fit on the
/// encrypted path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Tanh,
    Sin,
    Tan,
    Abs,
    Exp,
    Log,
    Sqrt,
    Pow { exponent: i32 },
    Contract { factor: f64 },
}

impl Activation {
    /// Exact evaluation.
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Tanh => x.tanh(),
            Activation::Sin => x.sin(),
            Activation::Tan => x.tan(),
            Activation::Abs => x.abs(),
            Activation::Exp => x.exp(),
            Activation::Log => x.ln(),
            Activation::Sqrt => x.sqrt(),
            Activation::Pow { exponent } => x.powi(*exponent),
            Activation::Contract { factor } => factor * x,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Tanh => "tanh",
            Activation::Sin => "sin",
            Activation::Tan => "tan",
            Activation::Abs => "abs",
            Activation::Exp => "exp",
            Activation::Log => "log",
            Activation::Sqrt => "sqrt",
            Activation::Pow { .. } => "pow",
            Activation::Contract { .. } => "contract",
        }
    }
}
