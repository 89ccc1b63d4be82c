//! Random-sample generation from the posterior network.
//!
//! A variation on forward sampling that walks the clique forest instead of
//! the network graph: each clique's posterior is refactored into a
//! conditional over its not-yet-visited variables given the variables seen
//! in earlier cliques, and observations are drawn clique by clique in
//! traversal order. Sampling from posteriors means any evidence set on the
//! engine shapes every draw it can reach.

use std::collections::{HashMap, VecDeque};

use rand::Rng;

use crate::engine::errors::InferError;
use crate::engine::evaluation::evaluate;
use crate::engine::graph::{CliqueId, NodeId};
use crate::engine::infer::InferenceEngine;
use crate::engine::potential::{
    combination_to_index, evaluate_marginal, index_to_combination, kahan_sum, Potential,
};

/// Everything needed to draw one clique's variables given the draws of the
/// cliques visited before it.
struct CliqueSampler {
    /// Variables drawn by earlier cliques, conditioning this one.
    parents: Vec<NodeId>,
    /// Variables this clique draws.
    heads: Vec<NodeId>,
    parent_levels: Vec<usize>,
    head_levels: Vec<usize>,
    /// Number of rows in one parent block.
    head_size: usize,
    /// Conditional distribution over `[parents..., heads...]`; one parent
    /// combination occupies one contiguous block of `head_size` rows.
    conditional: Potential,
}

impl InferenceEngine {
    /// Draws a random sample of the given size, reflecting any evidence
    /// currently set on the engine.
    pub fn sample(&mut self, size: usize) -> Result<Vec<HashMap<String, String>>, InferError> {
        self.sample_with(size, &mut rand::thread_rng())
    }

    /// Draws a random sample using the caller's random source.
    pub fn sample_with<R: Rng + ?Sized>(
        &mut self,
        size: usize,
        rng: &mut R,
    ) -> Result<Vec<HashMap<String, String>>, InferError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let samplers = self.build_samplers()?;
        (0..size).map(|_| self.draw(&samplers, rng)).collect()
    }

    /// Breadth-first traversal of every component, refactoring each clique's
    /// posterior into a conditional on the way.
    fn build_samplers(&mut self) -> Result<Vec<CliqueSampler>, InferError> {
        let components = self.components.clone();
        let mut samplers = Vec::with_capacity(self.cliques.len());
        for component in components {
            let mut visited_cliques: Vec<CliqueId> = Vec::new();
            let mut visited_nodes: Vec<NodeId> = Vec::new();
            let mut queue: VecDeque<CliqueId> = VecDeque::new();
            if let Some(&first) = component.first() {
                queue.push_back(first);
            }
            while let Some(clique) = queue.pop_front() {
                if visited_cliques.contains(&clique) {
                    continue;
                }
                let sampler = self.build_clique_sampler(clique, &visited_nodes)?;
                visited_cliques.push(clique);
                visited_nodes.extend(sampler.heads.iter().copied());
                samplers.push(sampler);
                for &neighbor in &self.cliques[clique.0].neighbors {
                    if !visited_cliques.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        Ok(samplers)
    }

    /// Refactors one clique's posterior joint P(X) into P(X − Y | Y), where
    /// Y are the variables some earlier clique has already drawn.
    fn build_clique_sampler(
        &mut self,
        clique: CliqueId,
        visited: &[NodeId],
    ) -> Result<CliqueSampler, InferError> {
        let posterior_id = self.cliques[clique.0].posterior_formula()?;
        let value = evaluate(posterior_id, &self.nodes, &self.arena, &mut self.cache)?;
        let formula = self.arena.get(posterior_id)?;

        let heads: Vec<NodeId> = formula
            .domain
            .iter()
            .filter(|v| !visited.contains(v))
            .copied()
            .collect();
        if heads.is_empty() {
            return Err(InferError::Internal(format!(
                "cannot generate a random sample: clique {} has no head variables",
                clique.0
            )));
        }
        let parents: Vec<NodeId> = formula
            .domain
            .iter()
            .filter(|v| visited.contains(v))
            .copied()
            .collect();

        let head_levels: Vec<usize> = heads.iter().map(|v| self.nodes[v.0].levels.len()).collect();
        let parent_levels: Vec<usize> =
            parents.iter().map(|v| self.nodes[v.0].levels.len()).collect();
        let head_size: usize = head_levels.iter().product();
        let parent_size: usize = parent_levels.iter().product();

        // Permute the posterior into [parents..., heads...] order so one
        // parent combination is one contiguous block.
        let conditional_domain: Vec<NodeId> =
            parents.iter().chain(&heads).copied().collect();
        let conditional_levels: Vec<usize> = parent_levels
            .iter()
            .chain(&head_levels)
            .copied()
            .collect();
        let permuted = evaluate_marginal(
            &value,
            &formula.domain,
            &formula.levels,
            &conditional_domain,
            &conditional_levels,
            value.len(),
            false,
        )?;
        let parent_potential = evaluate_marginal(
            &value,
            &formula.domain,
            &formula.levels,
            &parents,
            &parent_levels,
            parent_size,
            false,
        )?;

        // Divide each block by its parent mass. A zero-mass parent
        // combination (inconsistent evidence) falls back to a uniform block
        // so a draw is always possible.
        let mut conditional = Vec::with_capacity(permuted.len());
        for offset in 0..parent_size {
            let block = &permuted[offset * head_size..(offset + 1) * head_size];
            let mass = parent_potential[offset];
            if mass <= 0.0 {
                conditional.extend(std::iter::repeat(1.0 / head_size as f64).take(head_size));
                continue;
            }
            let quotient: Vec<f64> = block.iter().map(|v| v / mass).collect();
            let total = kahan_sum(quotient.iter().copied());
            if total <= 0.0 {
                conditional.extend(std::iter::repeat(1.0 / head_size as f64).take(head_size));
            } else {
                conditional.extend(quotient.iter().map(|v| v / total));
            }
        }

        Ok(CliqueSampler {
            parents,
            heads,
            parent_levels,
            head_levels,
            head_size,
            conditional,
        })
    }

    fn draw<R: Rng + ?Sized>(
        &self,
        samplers: &[CliqueSampler],
        rng: &mut R,
    ) -> Result<HashMap<String, String>, InferError> {
        let mut drawn: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut observation = HashMap::new();
        for sampler in samplers {
            let parent_combo: Vec<usize> = sampler
                .parents
                .iter()
                .map(|v| {
                    drawn[v.0].ok_or_else(|| {
                        InferError::Internal(format!(
                            "variable {} was not drawn before a clique that conditions on it",
                            self.nodes[v.0].name
                        ))
                    })
                })
                .collect::<Result<_, _>>()?;
            let offset = combination_to_index(&parent_combo, &sampler.parent_levels);
            let block =
                &sampler.conditional[offset * sampler.head_size..(offset + 1) * sampler.head_size];
            let head_combo = index_to_combination(pick_index(block, rng), &sampler.head_levels);
            for (v, &level) in sampler.heads.iter().zip(head_combo.iter()) {
                drawn[v.0] = Some(level);
                observation.insert(
                    self.nodes[v.0].name.clone(),
                    self.nodes[v.0].levels[level].clone(),
                );
            }
        }
        Ok(observation)
    }
}

/// Draws an index from a normalized block by inverse transform sampling.
fn pick_index<R: Rng + ?Sized>(block: &[f64], rng: &mut R) -> usize {
    let mut r: f64 = rng.gen();
    for (index, &p) in block.iter().enumerate() {
        if r <= p {
            return index;
        }
        r -= p;
    }
    block.len().saturating_sub(1)
}
