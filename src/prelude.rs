// src/prelude.rs
//! The "everything" import for kan_fhe.
//!
//! Brings the commonly used types and functions in with one glob:
//! ```rust
//! use kan_fhe::prelude::*;
//! ```

// network description
pub use crate::activation::Activation;
pub use crate::block::Block;
pub use crate::chebyshev::{ChebyshevPoly, Interval};
pub use crate::model::ModelArtifact;
pub use crate::network::{LayerSpec, Source, Topology};
pub use crate::node::Node;

// engine seam and reference backend
pub use crate::engine::plain::{PlainCiphertext, PlainEngine};
pub use crate::engine::{HomomorphicEngine, LevelledCiphertext};
pub use crate::params::SchemeParams;

// validation helpers
pub use crate::oracle::{argmax, classification_accuracy, reference};

pub use crate::error::{KanFheError, Result};
