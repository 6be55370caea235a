//! # kan_fhe
//!
//! Encrypted inference for Kolmogorov-Arnold networks: weighted sums of
//! learned univariate nonlinearities, evaluated entirely on ciphertexts of a
//! levelled approximate homomorphic scheme. The client encrypts a feature
//! vector once; the server schedules scalar products, rescales, Chebyshev
//! activation approximations, and bootstrap refreshes without ever seeing a
//! plaintext.
//!
//! ```rust
//! use kan_fhe::prelude::*;
//!
//! # fn main() -> kan_fhe::Result<()> {
//! let topology = ModelArtifact::breast_cancer()?.into_topology()?;
//! let engine = PlainEngine::with_seed(SchemeParams::new_test_logn12(), 1)?;
//!
//! // One ciphertext per feature; samples are packed across slots.
//! let features = vec![0.5; topology.num_features()];
//! let inputs = features
//!     .iter()
//!     .map(|&x| engine.encrypt(&[x]))
//!     .collect::<kan_fhe::Result<Vec<_>>>()?;
//!
//! let scores = topology.run(&inputs, &engine)?;
//! let decrypted: Vec<f64> = scores
//!     .iter()
//!     .map(|ct| engine.decrypt(ct).map(|slots| slots[0]))
//!     .collect::<kan_fhe::Result<Vec<_>>>()?;
//! assert_eq!(decrypted.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! The cryptographic primitives proper live behind the
//! [`HomomorphicEngine`](engine::HomomorphicEngine) trait;
//! [`PlainEngine`](engine::plain::PlainEngine) is the in-repo levelled
//! simulator used for tests and accuracy validation.

pub mod activation;
pub mod block;
pub mod chebyshev;
pub mod engine;
pub mod error;
pub mod model;
pub mod network;
pub mod node;
pub mod oracle;
pub mod params;
pub mod prelude;

// --- Public API exports ---

pub use activation::Activation;
pub use block::Block;
pub use chebyshev::{multiplicative_depth, ChebyshevPoly, Interval};
pub use engine::plain::{PlainCiphertext, PlainEngine};
pub use engine::{HomomorphicEngine, LevelledCiphertext};
pub use error::{KanFheError, Result};
pub use model::ModelArtifact;
pub use network::{levels_required, LayerSpec, Source, Topology};
pub use node::Node;
pub use params::SchemeParams;
