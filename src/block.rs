//! A layer of independent encrypted units sharing one forward pass.
//!
//! Units within a block have no data dependency on one another: they read
//! disjoint or shared-but-immutable upstream ciphertexts and produce disjoint
//! outputs. That makes the block the natural scale-out axis - with the
//! `parallel` feature each unit runs as an independent rayon task.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::chebyshev::Interval;
use crate::engine::HomomorphicEngine;
use crate::error::{KanFheError, Result};
use crate::node::Node;

/// Ordered collection of units evaluated together.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forward pass of every unit.
    ///
    /// `inputs[i]` holds the ciphertexts feeding unit `i`; the same upstream
    /// ciphertext may appear under several units (aliasing is expected, not
    /// an ownership conflict). Outputs are ordered by unit index regardless
    /// of execution order.
    pub fn forward<E>(
        &self,
        inputs: &[Vec<E::Ciphertext>],
        intervals: &[Interval],
        degrees: &[usize],
        engine: &E,
    ) -> Result<Vec<E::Ciphertext>>
    where
        E: HomomorphicEngine + Sync,
    {
        if inputs.len() != self.nodes.len()
            || intervals.len() != self.nodes.len()
            || degrees.len() != self.nodes.len()
        {
            return Err(KanFheError::InvalidWiring(format!(
                "block of {} unit(s) given {} input set(s), {} interval(s), {} degree(s)",
                self.nodes.len(),
                inputs.len(),
                intervals.len(),
                degrees.len()
            )));
        }

        #[cfg(feature = "parallel")]
        {
            self.nodes
                .par_iter()
                .zip(inputs.par_iter())
                .zip(intervals.par_iter().zip(degrees.par_iter()))
                .map(|((node, unit_inputs), (&interval, &degree))| {
                    node.forward(unit_inputs, interval, degree, engine)
                })
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            self.nodes
                .iter()
                .zip(inputs)
                .zip(intervals.iter().zip(degrees))
                .map(|((node, unit_inputs), (&interval, &degree))| {
                    node.forward(unit_inputs, interval, degree, engine)
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::engine::plain::PlainEngine;
    use crate::engine::LevelledCiphertext;
    use crate::params::SchemeParams;

    fn engine() -> PlainEngine {
        PlainEngine::with_seed(SchemeParams::new_test_logn12(), 23).unwrap()
    }

    #[test]
    fn test_units_share_an_upstream_ciphertext() {
        let engine = engine();
        let block = Block::new(vec![
            Node::new(vec![2.0000001], 0.0000001, Activation::Sin),
            Node::new(vec![-0.4999999], 1.2500001, Activation::Tanh),
        ]);
        let interval = Interval::symmetric(4.0).unwrap();

        // Both units read the same ciphertext with different coefficients.
        let shared = engine.encrypt(&[0.6, -0.9]).unwrap();
        let inputs = vec![vec![shared.clone()], vec![shared]];
        let out = block
            .forward(&inputs, &[interval, interval], &[31, 31], &engine)
            .unwrap();
        assert_eq!(out.len(), 2);

        let first = engine.decrypt(&out[0]).unwrap();
        let second = engine.decrypt(&out[1]).unwrap();
        for (slot, &x) in [0.6f64, -0.9].iter().enumerate() {
            let want_sin = (2.0000001 * x + 0.0000001).sin();
            let want_tanh = (-0.4999999 * x + 1.2500001).tanh();
            assert!((first[slot] - want_sin).abs() < 1e-3, "unit 0 slot {}", slot);
            assert!((second[slot] - want_tanh).abs() < 1e-3, "unit 1 slot {}", slot);
        }
    }

    #[test]
    fn test_outputs_keep_unit_order() {
        let engine = engine();
        let block = Block::new(vec![
            Node::new(vec![1.0000001], 1.0000001, Activation::Identity),
            Node::new(vec![1.0000001], 2.0000001, Activation::Identity),
            Node::new(vec![1.0000001], 3.0000001, Activation::Identity),
        ]);
        let interval = Interval::symmetric(8.0).unwrap();
        let ct = engine.encrypt(&[0.0]).unwrap();
        let inputs = vec![vec![ct.clone()], vec![ct.clone()], vec![ct]];
        let out = block
            .forward(&inputs, &[interval; 3], &[1, 1, 1], &engine)
            .unwrap();
        for (i, ct) in out.iter().enumerate() {
            let have = engine.decrypt(ct).unwrap()[0];
            let want = (i + 1) as f64 + 0.0000001;
            assert!((have - want).abs() < 1e-5, "unit {}: {}", i, have);
        }
    }

    #[test]
    fn test_shape_mismatch_is_config_error() {
        let engine = engine();
        let block = Block::new(vec![Node::new(vec![1.0], 0.0, Activation::Sin)]);
        let interval = Interval::symmetric(1.0).unwrap();
        let ct = engine.encrypt(&[0.0]).unwrap();
        let result = block.forward(&[vec![ct]], &[interval, interval], &[31], &engine);
        match result {
            Err(KanFheError::InvalidWiring(_)) => {}
            other => panic!("expected InvalidWiring, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_uniform_depth_across_units() {
        let engine = engine();
        let block = Block::new(vec![
            Node::new(vec![1.1000001], 0.0000001, Activation::Sin),
            Node::new(vec![0.9000001], 0.1000001, Activation::Tanh),
        ]);
        let interval = Interval::symmetric(4.0).unwrap();
        let ct = engine.encrypt(&[0.25]).unwrap();
        let out = block
            .forward(
                &[vec![ct.clone()], vec![ct]],
                &[interval, interval],
                &[31, 31],
                &engine,
            )
            .unwrap();
        for ct in &out {
            assert_eq!(ct.level(), engine.max_level() - 7);
        }
    }
}
