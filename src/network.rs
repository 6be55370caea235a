//! The layer graph and its orchestrator.
//!
//! A [`Topology`] is a data-driven description of the trained network: an
//! ordered list of layers whose units name their upstream ciphertexts
//! explicitly. Adding a model variant means writing a new artifact, not new
//! control flow.
//!
//! ## Refresh policy
//!
//! Bootstrapping is the single most expensive operation, so the orchestrator
//! pays for it only when the depth accounting says the next layer would
//! otherwise fail. A degree-`d` unit consumes
//!
//! ```text
//! 1 (affine rescale) + 1 (change-of-basis rescale) + ceil(log2(d + 1))
//! ```
//!
//! levels. Before a layer runs, every distinct upstream ciphertext is checked
//! against the most demanding unit consuming it and refreshed at most once.
//! A ciphertext therefore moves through
//! `fresh -> degraded -> (bootstrapped -> degraded ->)* final output`; the
//! only other exit is the abort-on-first-failure path.

use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::chebyshev::{multiplicative_depth, Interval};
use crate::engine::{HomomorphicEngine, LevelledCiphertext};
use crate::error::{KanFheError, Result};

/// Where a unit input comes from: a network input feature or the output of a
/// unit in an earlier layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Feature(usize),
    Unit { layer: usize, unit: usize },
}

/// One layer of the graph: the block of units plus, per unit, its upstream
/// sources, approximation interval, and approximation degree.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub block: Block,
    pub wiring: Vec<Vec<Source>>,
    pub intervals: Vec<Interval>,
    pub degrees: Vec<usize>,
}

/// The fixed network graph. Built once from a trained model, immutable and
/// shareable across concurrent inference requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    num_features: usize,
    layers: Vec<LayerSpec>,
}

/// Levels a degree-`degree` unit consumes end to end.
pub fn levels_required(degree: usize) -> usize {
    2 + multiplicative_depth(degree)
}

impl Topology {
    /// Validate and freeze a layer graph.
    ///
    /// All configuration errors - empty network, shape mismatches, wiring
    /// that references a missing feature, a later layer, or a missing unit,
    /// zero degrees - are caught here, before any ciphertext exists.
    pub fn new(num_features: usize, layers: Vec<LayerSpec>) -> Result<Self> {
        if layers.is_empty() {
            return Err(KanFheError::EmptyNetwork);
        }
        if num_features == 0 {
            return Err(KanFheError::InvalidWiring("network has no input features".into()));
        }

        for (li, layer) in layers.iter().enumerate() {
            let units = layer.block.len();
            if units == 0 {
                return Err(KanFheError::InvalidWiring(format!("layer {} has no units", li)));
            }
            if layer.wiring.len() != units
                || layer.intervals.len() != units
                || layer.degrees.len() != units
            {
                return Err(KanFheError::InvalidWiring(format!(
                    "layer {}: {} unit(s) but {} wiring row(s), {} interval(s), {} degree(s)",
                    li,
                    units,
                    layer.wiring.len(),
                    layer.intervals.len(),
                    layer.degrees.len()
                )));
            }

            for (ui, sources) in layer.wiring.iter().enumerate() {
                let node = &layer.block.nodes[ui];
                if sources.len() != node.arity() || sources.is_empty() {
                    return Err(KanFheError::CoefficientMismatch {
                        expected: node.arity(),
                        actual: sources.len(),
                    });
                }
                for source in sources {
                    match *source {
                        Source::Feature(f) if f >= num_features => {
                            return Err(KanFheError::InvalidWiring(format!(
                                "layer {} unit {} reads feature {} of {}",
                                li, ui, f, num_features
                            )));
                        }
                        Source::Unit { layer: src_layer, unit } => {
                            if src_layer >= li {
                                return Err(KanFheError::InvalidWiring(format!(
                                    "layer {} unit {} reads layer {} (not earlier)",
                                    li, ui, src_layer
                                )));
                            }
                            if unit >= layers[src_layer].block.len() {
                                return Err(KanFheError::InvalidWiring(format!(
                                    "layer {} unit {} reads unit {} of layer {} ({} units)",
                                    li,
                                    ui,
                                    unit,
                                    src_layer,
                                    layers[src_layer].block.len()
                                )));
                            }
                        }
                        Source::Feature(_) => {}
                    }
                }
                Interval::new(layer.intervals[ui].lo, layer.intervals[ui].hi)?;
                if layer.degrees[ui] == 0 {
                    return Err(KanFheError::InvalidDegree(0));
                }
            }
        }

        Ok(Self { num_features, layers })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Number of ciphertexts the final layer produces.
    pub fn output_arity(&self) -> usize {
        self.layers.last().map(|l| l.block.len()).unwrap_or(0)
    }

    /// Run the network on encrypted inputs, one ciphertext per feature.
    ///
    /// Walks the layers in dependency order, refreshing upstream ciphertexts
    /// exactly when the next layer's depth requirement exceeds their
    /// remaining level. Returns the final layer's ciphertexts; the first
    /// failure aborts the request with no output.
    pub fn run<E>(&self, inputs: &[E::Ciphertext], engine: &E) -> Result<Vec<E::Ciphertext>>
    where
        E: HomomorphicEngine + Sync,
    {
        if inputs.len() != self.num_features {
            return Err(KanFheError::CoefficientMismatch {
                expected: self.num_features,
                actual: inputs.len(),
            });
        }

        let mut features: Vec<E::Ciphertext> = inputs.to_vec();
        let mut produced: Vec<Vec<E::Ciphertext>> = Vec::with_capacity(self.layers.len());

        for (li, layer) in self.layers.iter().enumerate() {
            // Most demanding consumer per distinct upstream ciphertext.
            let mut required: HashMap<Source, usize> = HashMap::new();
            for (ui, sources) in layer.wiring.iter().enumerate() {
                let need = levels_required(layer.degrees[ui]);
                for &source in sources {
                    let entry = required.entry(source).or_insert(0);
                    *entry = (*entry).max(need);
                }
            }

            let stale: Vec<Source> = required
                .iter()
                .filter(|&(&source, &need)| {
                    self.resolve(&features, &produced, source).level() < need
                })
                .map(|(&source, _)| source)
                .collect();

            if !stale.is_empty() {
                info!(
                    "layer {}: refreshing {} of {} upstream ciphertext(s)",
                    li,
                    stale.len(),
                    required.len()
                );
                let refreshed = self.bootstrap_many(&features, &produced, &stale, engine)?;
                for (source, ct) in stale.into_iter().zip(refreshed) {
                    match source {
                        Source::Feature(f) => features[f] = ct,
                        Source::Unit { layer: l, unit } => produced[l][unit] = ct,
                    }
                }
            }

            let unit_inputs: Vec<Vec<E::Ciphertext>> = layer
                .wiring
                .iter()
                .map(|sources| {
                    sources
                        .iter()
                        .map(|&source| self.resolve(&features, &produced, source).clone())
                        .collect()
                })
                .collect();

            debug!("layer {}: evaluating {} unit(s)", li, layer.block.len());
            let outputs = layer
                .block
                .forward(&unit_inputs, &layer.intervals, &layer.degrees, engine)
                .map_err(|err| {
                    error!("request aborted at layer {}: {}", li, err);
                    err
                })?;
            produced.push(outputs);
        }

        produced.pop().ok_or(KanFheError::EmptyNetwork)
    }

    fn resolve<'a, C>(&self, features: &'a [C], produced: &'a [Vec<C>], source: Source) -> &'a C {
        match source {
            Source::Feature(f) => &features[f],
            Source::Unit { layer, unit } => &produced[layer][unit],
        }
    }

    /// Refresh the listed ciphertexts, independently per ciphertext.
    fn bootstrap_many<E>(
        &self,
        features: &[E::Ciphertext],
        produced: &[Vec<E::Ciphertext>],
        stale: &[Source],
        engine: &E,
    ) -> Result<Vec<E::Ciphertext>>
    where
        E: HomomorphicEngine + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            stale
                .par_iter()
                .map(|&source| engine.bootstrap(self.resolve(features, produced, source)))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            stale
                .iter()
                .map(|&source| engine.bootstrap(self.resolve(features, produced, source)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::engine::plain::PlainEngine;
    use crate::node::Node;
    use crate::params::SchemeParams;

    fn single_input_layer(units: Vec<(f64, f64, Activation)>, k: f64, degree: usize) -> LayerSpec {
        let len = units.len();
        LayerSpec {
            block: Block::new(
                units
                    .into_iter()
                    .map(|(c, b, a)| Node::new(vec![c], b, a))
                    .collect(),
            ),
            wiring: (0..len).map(|f| vec![Source::Feature(f)]).collect(),
            intervals: vec![Interval::symmetric(k).unwrap(); len],
            degrees: vec![degree; len],
        }
    }

    fn combine_layer(
        coefficients: Vec<f64>,
        bias: f64,
        activation: Activation,
        upstream: usize,
        k: f64,
        degree: usize,
    ) -> LayerSpec {
        let arity = coefficients.len();
        LayerSpec {
            block: Block::new(vec![Node::new(coefficients, bias, activation)]),
            wiring: vec![(0..arity).map(|u| Source::Unit { layer: upstream, unit: u }).collect()],
            intervals: vec![Interval::symmetric(k).unwrap()],
            degrees: vec![degree],
        }
    }

    /// 2 features -> 2 single-input units -> 1 combining unit.
    fn small_topology() -> Topology {
        Topology::new(
            2,
            vec![
                single_input_layer(
                    vec![
                        (1.1000001, -0.3000001, Activation::Tanh),
                        (0.9000001, 0.4000001, Activation::Sin),
                    ],
                    4.0,
                    31,
                ),
                combine_layer(vec![0.7000001, -1.2000001], 0.5000001, Activation::Sin, 0, 4.0, 31),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_construction_rejects_bad_wiring() {
        // Forward reference.
        let bad = Topology::new(
            1,
            vec![LayerSpec {
                block: Block::new(vec![Node::new(vec![1.0], 0.0, Activation::Sin)]),
                wiring: vec![vec![Source::Unit { layer: 0, unit: 0 }]],
                intervals: vec![Interval::symmetric(1.0).unwrap()],
                degrees: vec![31],
            }],
        );
        assert!(matches!(bad, Err(KanFheError::InvalidWiring(_))));

        // Feature index out of range.
        let bad = Topology::new(
            1,
            vec![LayerSpec {
                block: Block::new(vec![Node::new(vec![1.0], 0.0, Activation::Sin)]),
                wiring: vec![vec![Source::Feature(3)]],
                intervals: vec![Interval::symmetric(1.0).unwrap()],
                degrees: vec![31],
            }],
        );
        assert!(matches!(bad, Err(KanFheError::InvalidWiring(_))));

        // Coefficient count vs fan-in.
        let bad = Topology::new(
            2,
            vec![LayerSpec {
                block: Block::new(vec![Node::new(vec![1.0, 2.0], 0.0, Activation::Sin)]),
                wiring: vec![vec![Source::Feature(0)]],
                intervals: vec![Interval::symmetric(1.0).unwrap()],
                degrees: vec![31],
            }],
        );
        assert!(matches!(bad, Err(KanFheError::CoefficientMismatch { expected: 2, actual: 1 })));

        // No layers.
        assert!(matches!(Topology::new(2, vec![]), Err(KanFheError::EmptyNetwork)));
    }

    #[test]
    fn test_levels_required() {
        assert_eq!(levels_required(1), 3);
        assert_eq!(levels_required(31), 7);
        assert_eq!(levels_required(63), 8);
    }

    #[test]
    fn test_run_matches_cleartext_composition() {
        let topology = small_topology();
        let engine = PlainEngine::with_seed(SchemeParams::new_test_logn12(), 31).unwrap();

        let features = [[0.4, -0.8], [1.0, 0.3]];
        let inputs: Vec<_> = (0..2)
            .map(|f| engine.encrypt(&[features[0][f], features[1][f]]).unwrap())
            .collect();
        let outputs = topology.run(&inputs, &engine).unwrap();
        assert_eq!(outputs.len(), 1);

        let have = engine.decrypt(&outputs[0]).unwrap();
        for (sample, row) in features.iter().enumerate() {
            let u0 = (1.1000001 * row[0] - 0.3000001).tanh();
            let u1 = (0.9000001 * row[1] + 0.4000001).sin();
            let want = (0.7000001 * u0 - 1.2000001 * u1 + 0.5000001).sin();
            assert!(
                (have[sample] - want).abs() < 5e-3,
                "sample {}: {} vs {}",
                sample,
                have[sample],
                want
            );
        }
    }

    #[test]
    fn test_no_bootstrap_when_depth_suffices() {
        // Single degree-31 layer on a depth-10 chain: fresh inputs carry
        // more than the 7 required levels, so no refresh may happen.
        let topology = Topology::new(
            2,
            vec![single_input_layer(
                vec![
                    (1.1000001, -0.3000001, Activation::Tanh),
                    (0.9000001, 0.4000001, Activation::Sin),
                ],
                4.0,
                31,
            )],
        )
        .unwrap();
        let engine = PlainEngine::with_seed(SchemeParams::new_test_logn12(), 5).unwrap();
        let inputs = vec![engine.encrypt(&[0.1]).unwrap(), engine.encrypt(&[0.2]).unwrap()];
        topology.run(&inputs, &engine).unwrap();
        assert_eq!(engine.bootstrap_count(), 0);
    }

    #[test]
    fn test_bootstraps_exactly_the_stale_ciphertexts() {
        // 10-level chain: layer 0 leaves its outputs at level 3, layer 1
        // needs 7, so both layer-0 outputs must be refreshed - and nothing
        // else.
        let topology = small_topology();
        let engine = PlainEngine::with_seed(SchemeParams::new_test_logn12(), 5).unwrap();
        let inputs = vec![engine.encrypt(&[0.1]).unwrap(), engine.encrypt(&[0.2]).unwrap()];
        topology.run(&inputs, &engine).unwrap();
        assert_eq!(engine.bootstrap_count(), 2);
    }

    #[test]
    fn test_shallow_chain_refreshes_every_boundary() {
        // 7-level chain: each degree-31 layer consumes the whole budget.
        let topology = small_topology();
        let engine = PlainEngine::with_seed(SchemeParams::new_shallow_logn12(), 5).unwrap();
        let inputs = vec![engine.encrypt(&[0.1]).unwrap(), engine.encrypt(&[0.2]).unwrap()];
        let outputs = topology.run(&inputs, &engine).unwrap();
        assert_eq!(outputs.len(), 1);
        // Layer 0 consumes fresh inputs exactly; layer 1 must refresh both
        // layer-0 outputs (level 0 < 7).
        assert_eq!(engine.bootstrap_count(), 2);
    }

    #[test]
    fn test_depth_starvation_is_fatal_not_silent() {
        // A chain too short even for one layer: bootstrap cannot help and
        // the request must abort with DepthExhausted.
        let params = SchemeParams {
            log_q: vec![55, 40, 40, 40, 40],
            ..SchemeParams::new_test_logn12()
        };
        let topology = small_topology();
        let engine = PlainEngine::with_seed(params, 5).unwrap();
        let inputs = vec![engine.encrypt(&[0.1]).unwrap(), engine.encrypt(&[0.2]).unwrap()];
        match topology.run(&inputs, &engine) {
            Err(KanFheError::DepthExhausted { .. }) => {}
            other => panic!("expected DepthExhausted, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_run_rejects_wrong_feature_count() {
        let topology = small_topology();
        let engine = PlainEngine::with_seed(SchemeParams::new_test_logn12(), 5).unwrap();
        let inputs = vec![engine.encrypt(&[0.1]).unwrap()];
        assert!(matches!(
            topology.run(&inputs, &engine),
            Err(KanFheError::CoefficientMismatch { expected: 2, actual: 1 })
        ));
    }
}
