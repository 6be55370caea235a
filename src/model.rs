//! Versioned model-parameter artifacts.
//!
//! Trained networks arrive as data, not code: a flat table of
//! `{inputs, coefficients, bias, activation, interval, degree}` per unit,
//! grouped into layers, serialised as JSON. The artifact is loaded once at
//! startup into an immutable [`Topology`]; adding a model variant means
//! adding a file under `models/`, not new control flow.
//!
//! Two artifacts recovered from the trained system ship with the crate:
//! a two-class breast-cancer network (9 features) and a single-score sepsis
//! network (37 features).

use log::debug;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::block::Block;
use crate::chebyshev::Interval;
use crate::error::Result;
use crate::network::{LayerSpec, Source, Topology};
use crate::node::Node;

/// Offset applied to coefficients that collapse to an exact integer.
///
/// Integer-scale coefficients hit a degenerate spot in the scheme's plaintext
/// encoding (a stability issue, not a correctness one); trained-model exports
/// carry literals like `10.000001` for exactly this reason. The loader
/// applies the same offset uniformly, away from zero.
pub const COEFFICIENT_NUDGE: f64 = 1e-6;

/// One unit of a model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitArtifact {
    pub inputs: Vec<Source>,
    pub coefficients: Vec<f64>,
    pub bias: f64,
    pub activation: Activation,
    pub interval: Interval,
    pub degree: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerArtifact {
    pub units: Vec<UnitArtifact>,
}

/// A trained model as persisted configuration data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub version: u32,
    pub num_features: usize,
    pub layers: Vec<LayerArtifact>,
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The two-class breast-cancer network: 9 features, 36 single-feature
    /// inner units, 4 combining units, an `exp`/`tanh` head, and an affine
    /// readout per class.
    pub fn breast_cancer() -> Result<Self> {
        Self::from_json(include_str!("../models/breast_cancer.json"))
    }

    /// The sepsis network: 37 features, 37 single-feature inner units, one
    /// sin combining unit, one affine readout.
    pub fn sepsis() -> Result<Self> {
        Self::from_json(include_str!("../models/sepsis.json"))
    }

    /// Build the immutable evaluation topology, nudging integer-degenerate
    /// coefficients and validating the whole graph.
    pub fn into_topology(self) -> Result<Topology> {
        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in self.layers {
            let mut nodes = Vec::with_capacity(layer.units.len());
            let mut wiring = Vec::with_capacity(layer.units.len());
            let mut intervals = Vec::with_capacity(layer.units.len());
            let mut degrees = Vec::with_capacity(layer.units.len());
            for unit in layer.units {
                let coefficients: Vec<f64> =
                    unit.coefficients.iter().map(|&c| nudge_integer(c)).collect();
                nodes.push(Node::new(coefficients, unit.bias, unit.activation));
                wiring.push(unit.inputs);
                intervals.push(unit.interval);
                degrees.push(unit.degree);
            }
            layers.push(LayerSpec { block: Block::new(nodes), wiring, intervals, degrees });
        }
        debug!("model '{}' v{}: building topology", self.name, self.version);
        Topology::new(self.num_features, layers)
    }
}

/// Push an exact-integer coefficient off the integer grid, away from zero.
fn nudge_integer(c: f64) -> f64 {
    if c.fract() != 0.0 {
        return c;
    }
    if c < 0.0 {
        c - COEFFICIENT_NUDGE
    } else {
        c + COEFFICIENT_NUDGE
    }
}
