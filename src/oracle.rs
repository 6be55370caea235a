//! Cleartext reference path.
//!
//! Structurally mirrors the encrypted walk but computes on plain f64 with the
//! exact activation functions and no scale/level bookkeeping. Used only to
//! validate the encrypted path and to compute baseline accuracy; it never
//! runs on the request path.

use crate::error::{KanFheError, Result};
use crate::network::{Source, Topology};

/// Exact forward pass for one feature vector.
pub fn reference(topology: &Topology, features: &[f64]) -> Result<Vec<f64>> {
    Ok(trace(topology, features)?.outputs)
}

/// Exact forward pass for a batch of feature vectors.
pub fn reference_batch(topology: &Topology, samples: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    samples.iter().map(|s| reference(topology, s)).collect()
}

/// Per-unit pre-activation record of one exact forward pass.
///
/// The approximation contract only holds while every unit's pre-activation
/// stays inside its configured interval; this trace is how tests (and
/// interval tuning) check that a given input distribution honours the
/// contract.
#[derive(Debug, Clone)]
pub struct ReferenceTrace {
    /// `pre_activations[layer][unit]`.
    pub pre_activations: Vec<Vec<f64>>,
    pub outputs: Vec<f64>,
}

impl ReferenceTrace {
    /// True when every pre-activation lies inside its unit's interval.
    ///
    /// `Identity` units are exempt: a degree-capped fit of the identity is
    /// exactly linear, so the affine readout layers of the trained models
    /// extrapolate safely far outside their nominal interval.
    pub fn within_intervals(&self, topology: &Topology) -> bool {
        for (layer, spec) in topology.layers().iter().enumerate() {
            for (unit, &pre) in self.pre_activations[layer].iter().enumerate() {
                let exempt = matches!(
                    spec.block.nodes[unit].activation,
                    crate::activation::Activation::Identity
                );
                if !exempt && !spec.intervals[unit].contains(pre) {
                    return false;
                }
            }
        }
        true
    }
}

/// Exact forward pass keeping every unit's pre-activation.
pub fn trace(topology: &Topology, features: &[f64]) -> Result<ReferenceTrace> {
    if features.len() != topology.num_features() {
        return Err(KanFheError::CoefficientMismatch {
            expected: topology.num_features(),
            actual: features.len(),
        });
    }

    let mut pre_activations: Vec<Vec<f64>> = Vec::with_capacity(topology.num_layers());
    let mut produced: Vec<Vec<f64>> = Vec::with_capacity(topology.num_layers());

    for layer in topology.layers() {
        let mut pres = Vec::with_capacity(layer.block.len());
        let mut outs = Vec::with_capacity(layer.block.len());
        for (unit, sources) in layer.wiring.iter().enumerate() {
            let node = &layer.block.nodes[unit];
            let mut acc = node.bias;
            for (coefficient, source) in node.coefficients.iter().zip(sources) {
                let upstream = match *source {
                    Source::Feature(f) => features[f],
                    Source::Unit { layer: l, unit: u } => produced[l][u],
                };
                acc += coefficient * upstream;
            }
            pres.push(acc);
            outs.push(node.activation.eval(acc));
        }
        pre_activations.push(pres);
        produced.push(outs);
    }

    let outputs = produced.pop().ok_or(KanFheError::EmptyNetwork)?;
    Ok(ReferenceTrace { pre_activations, outputs })
}

/// Index of the largest score; the predicted class of a score vector.
pub fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

/// Fraction of predictions matching the labels.
pub fn classification_accuracy(predicted: &[usize], labels: &[usize]) -> f64 {
    if predicted.is_empty() || predicted.len() != labels.len() {
        return 0.0;
    }
    let hits = predicted.iter().zip(labels).filter(|(p, l)| p == l).count();
    hits as f64 / predicted.len() as f64
}
