//! The inference engine façade.
//!
//! Construction follows the lazy propagation strategy of Madsen and Jensen,
//! extended with a symbolic message-passing architecture: message passing
//! populates formulas for every message and posterior marginal exactly once,
//! and the syntax of the formulas is chosen so that the pass never has to be
//! repeated when hard or soft evidence changes. Potentials are evaluated on
//! demand when a query arrives, and every intermediate result is cached to
//! serve later queries. The separation between message passing and
//! evaluation is what allows fast retraction of evidence, and replacement of
//! a single variable's local distribution, without invalidating the whole
//! cache.

use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::compact::infer_join_probability;
use crate::engine::errors::InferError;
use crate::engine::evaluation::{clear_cached_values, evaluate, PotentialCache};
use crate::engine::formula::FormulaArena;
use crate::engine::graph::{
    build_cliques, build_nodes, pick_root_clique, Clique, CliqueId, Node, NodeId, Separator,
};
use crate::engine::join::evaluate_join;
use crate::engine::potential::{
    combination_to_index, index_to_combination, kahan_sum, normalize_conditional,
};
use crate::engine::propagation::{
    assemble_node_marginals, assemble_posteriors, assemble_separator_posteriors, propagate,
};
use crate::engine::snapshot::EngineSnapshot;
use crate::model::{Distribution, JunctionTreeSpec, NetworkSpec, Variable};

/// An event: variable name → acceptable levels. Several levels for one
/// variable accumulate their outcomes; several variables combine over every
/// consistent combination.
pub type Event = HashMap<String, Vec<String>>;

/// Marginals of every variable: name → (level → probability).
pub type NetworkResult = HashMap<String, HashMap<String, f64>>;

/// Exact inference engine over a discrete Bayesian network, using lazy
/// symbolic propagation on an externally supplied junction tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InferenceEngine {
    pub(crate) nodes: Vec<Node>,
    pub(crate) cliques: Vec<Clique>,
    pub(crate) separators: Vec<Separator>,
    pub(crate) components: Vec<Vec<CliqueId>>,
    pub(crate) arena: FormulaArena,
    pub(crate) cache: PotentialCache,
}

impl InferenceEngine {
    /// Builds an engine from a network definition and the junction-tree
    /// structure computed by an external triangulation step.
    pub fn new(network: &NetworkSpec, junction: &JunctionTreeSpec) -> Result<Self, InferError> {
        let mut arena = FormulaArena::new();
        let mut nodes = build_nodes(network, &mut arena)?;
        let (mut cliques, mut separators, components) =
            build_cliques(junction, &mut nodes, &mut arena)?;
        let roots: Vec<CliqueId> = components.iter().map(|c| c[0]).collect();

        let messages = propagate(&mut arena, &nodes, &cliques, &separators, &roots)?;
        assemble_posteriors(&mut arena, &nodes, &mut cliques, &messages)?;
        assemble_separator_posteriors(&mut arena, &cliques, &mut separators)?;
        assemble_node_marginals(&mut arena, &mut nodes, &cliques, &separators)?;

        let cache: PotentialCache = vec![None; arena.len()];
        let mut engine = InferenceEngine {
            nodes,
            cliques,
            separators,
            components,
            arena,
            cache,
        };
        engine.seed_local_distributions(network)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            variables = engine.nodes.len(),
            cliques = engine.cliques.len(),
            formulas = engine.arena.len(),
            "symbolic propagation complete"
        );
        Ok(engine)
    }

    /// Seeds every variable's local distribution from its definition:
    /// a prepared distribution, a conditional probability table, a raw
    /// potential, or the per-block uniform default.
    fn seed_local_distributions(&mut self, network: &NetworkSpec) -> Result<(), InferError> {
        for index in 0..self.nodes.len() {
            let name = self.nodes[index].name.clone();
            let def = network.find(&name).ok_or_else(|| {
                InferError::Internal(format!("variable {} vanished from the network", name))
            })?;
            let distribution = if let Some(distribution) = &def.distribution {
                distribution.clone()
            } else if let Some(cpt) = &def.cpt {
                let parents = self.parent_variables(NodeId(index));
                Distribution::from_cpt(&name, &self.nodes[index].levels, &parents, cpt)?
            } else if let Some(potential) = &def.potential {
                let head = Variable::new(name.clone(), self.nodes[index].levels.clone());
                Distribution::new(vec![head], self.parent_variables(NodeId(index)), potential.clone())?
            } else {
                let head_count = self.nodes[index].levels.len();
                let parent_size: usize = self.nodes[index]
                    .parents
                    .iter()
                    .map(|p| self.nodes[p.0].levels.len())
                    .product();
                let uniform = vec![1.0 / head_count as f64; head_count * parent_size];
                let head = Variable::new(name.clone(), self.nodes[index].levels.clone());
                Distribution::new(vec![head], self.parent_variables(NodeId(index)), uniform)?
            };
            self.store_local_distribution(&distribution)?;
        }
        Ok(())
    }

    fn parent_variables(&self, node: NodeId) -> Vec<Variable> {
        self.nodes[node.0]
            .parents
            .iter()
            .map(|p| Variable::new(self.nodes[p.0].name.clone(), self.nodes[p.0].levels.clone()))
            .collect()
    }

    fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn has_variable(&self, name: &str) -> bool {
        self.find_node(name).is_some()
    }

    pub fn get_variables(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    pub fn get_parents(&self, name: &str) -> Vec<String> {
        self.find_node(name)
            .map(|node| {
                node.parents
                    .iter()
                    .map(|p| self.nodes[p.0].name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_parent(&self, name: &str, parent: &str) -> bool {
        self.get_parents(name).iter().any(|p| p == parent)
    }

    pub fn get_levels(&self, name: &str) -> Vec<String> {
        self.find_node(name)
            .map(|node| node.levels.clone())
            .unwrap_or_default()
    }

    pub fn has_level(&self, name: &str, level: &str) -> bool {
        self.find_node(name)
            .map(|node| node.level_index(level).is_some())
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Evidence
    // ------------------------------------------------------------------

    /// Replaces all evidence in the network with the given mapping.
    pub fn set_evidence(&mut self, evidence: &Event) -> Result<(), InferError> {
        let updates = self.resolve_evidence(evidence)?;
        self.remove_all_evidence()?;
        self.apply_evidence(updates)
    }

    /// Updates the evidence for the named variables, leaving evidence for
    /// all other variables unchanged.
    pub fn update_evidence(&mut self, evidence: &Event) -> Result<(), InferError> {
        let updates = self.resolve_evidence(evidence)?;
        self.apply_evidence(updates)
    }

    /// Resolves level names before any mutation, so an invalid level cannot
    /// leave the engine partially updated. Names of unknown variables are
    /// ignored, matching the query surface's treatment of unknown names.
    fn resolve_evidence(&self, evidence: &Event) -> Result<Vec<(NodeId, Vec<usize>)>, InferError> {
        let mut updates = Vec::new();
        for (name, levels) in evidence {
            let Some(node) = self.find_node(name) else {
                continue;
            };
            let mut indexes = Vec::with_capacity(levels.len());
            for level in levels {
                let index = node.level_index(level).ok_or_else(|| {
                    InferError::Validation(format!(
                        "cannot update the evidence: {} is not a level of {}",
                        level, name
                    ))
                })?;
                if !indexes.contains(&index) {
                    indexes.push(index);
                }
            }
            if indexes.is_empty() {
                continue;
            }
            indexes.sort_unstable();
            updates.push((node.id, indexes));
        }
        Ok(updates)
    }

    fn apply_evidence(&mut self, updates: Vec<(NodeId, Vec<usize>)>) -> Result<(), InferError> {
        for (node, levels) in updates {
            let formula = self.nodes[node.0].evidence_formula;
            if self.arena.set_evidence_levels(formula, Some(levels))? {
                clear_cached_values(&self.arena, &mut self.cache, formula)?;
            }
        }
        Ok(())
    }

    /// Removes any evidence for the given variable. Cached values that
    /// depend on it, directly or indirectly, are cleared.
    pub fn remove_evidence(&mut self, name: &str) -> Result<(), InferError> {
        let Some(node) = self.find_node(name) else {
            return Ok(());
        };
        let formula = node.evidence_formula;
        if self.arena.set_evidence_levels(formula, None)? {
            clear_cached_values(&self.arena, &mut self.cache, formula)?;
        }
        Ok(())
    }

    /// Removes all evidence from the network.
    pub fn remove_all_evidence(&mut self) -> Result<(), InferError> {
        for index in 0..self.nodes.len() {
            let formula = self.nodes[index].evidence_formula;
            if self.arena.set_evidence_levels(formula, None)? {
                clear_cached_values(&self.arena, &mut self.cache, formula)?;
            }
        }
        Ok(())
    }

    pub fn has_evidence_for(&self, name: &str) -> bool {
        self.evidence_indexes(name).is_some()
    }

    /// The evidenced levels of a variable, by label.
    pub fn get_evidence(&self, name: &str) -> Option<Vec<String>> {
        let node = self.find_node(name)?;
        let levels = self.evidence_indexes(name)?;
        Some(
            levels
                .iter()
                .filter_map(|&l| node.levels.get(l).cloned())
                .collect(),
        )
    }

    /// All evidence currently set, by variable name.
    pub fn get_all_evidence(&self) -> Event {
        let mut result = Event::new();
        for node in &self.nodes {
            if let Some(levels) = self.get_evidence(&node.name) {
                if !levels.is_empty() {
                    result.insert(node.name.clone(), levels);
                }
            }
        }
        result
    }

    fn evidence_indexes(&self, name: &str) -> Option<Vec<usize>> {
        let node = self.find_node(name)?;
        self.arena
            .evidence_levels(node.evidence_formula)
            .ok()
            .flatten()
            .cloned()
    }

    fn evidence_entries(&self) -> Result<Vec<(NodeId, Vec<usize>)>, InferError> {
        let mut entries = Vec::new();
        for node in &self.nodes {
            if let Some(levels) = self.arena.evidence_levels(node.evidence_formula)? {
                if !levels.is_empty() {
                    entries.push((node.id, levels.clone()));
                }
            }
        }
        Ok(entries)
    }

    // ------------------------------------------------------------------
    // Distributions
    // ------------------------------------------------------------------

    /// The prior local distribution of a variable, exactly as seeded.
    pub fn get_prior_distribution(&self, name: &str) -> Result<Distribution, InferError> {
        let node = self.find_node(name).ok_or_else(|| {
            InferError::Validation(format!(
                "cannot get the prior distribution for {}: the variable does not exist",
                name
            ))
        })?;
        let potential = self
            .cache
            .get(node.potential_formula.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| {
                InferError::Internal(format!(
                    "local distribution for variable {} has not been initialized",
                    name
                ))
            })?;
        Distribution::new(
            vec![Variable::new(node.name.clone(), node.levels.clone())],
            self.parent_variables(node.id),
            potential.as_ref().clone(),
        )
    }

    /// The posterior distribution of a variable given its parents, under the
    /// current evidence.
    pub fn get_posterior_distribution(&mut self, name: &str) -> Result<Distribution, InferError> {
        let parents = self
            .find_node(name)
            .map(|node| {
                node.parents
                    .iter()
                    .map(|p| self.nodes[p.0].name.clone())
                    .collect::<Vec<_>>()
            })
            .ok_or_else(|| {
                InferError::Validation(format!(
                    "cannot get the posterior distribution for {}: the variable does not exist",
                    name
                ))
            })?;
        let parent_refs: Vec<&str> = parents.iter().map(|p| p.as_str()).collect();
        self.get_joint_distribution(&[name], &parent_refs)
    }

    /// Computes the joint distribution over the head variables, conditioned
    /// on the parent variables, under the current evidence.
    ///
    /// A modified symbolic message-passing pass reuses as many previously
    /// computed potentials as possible; formulas it adds are kept, so a
    /// repeated request is answered from the cache.
    pub fn get_joint_distribution(
        &mut self,
        heads: &[&str],
        parents: &[&str],
    ) -> Result<Distribution, InferError> {
        let head_ids = self.resolve_join_variables(heads, "head")?;
        let parent_ids = self.resolve_join_variables(parents, "parent")?;
        let potential = evaluate_join(
            &mut self.arena,
            &self.nodes,
            &self.cliques,
            &self.separators,
            &self.components,
            &mut self.cache,
            &head_ids,
            &parent_ids,
        )?;
        Distribution::new(
            head_ids
                .iter()
                .map(|v| Variable::new(self.nodes[v.0].name.clone(), self.nodes[v.0].levels.clone()))
                .collect(),
            parent_ids
                .iter()
                .map(|v| Variable::new(self.nodes[v.0].name.clone(), self.nodes[v.0].levels.clone()))
                .collect(),
            potential,
        )
    }

    fn resolve_join_variables(
        &self,
        names: &[&str],
        role: &str,
    ) -> Result<Vec<NodeId>, InferError> {
        names
            .iter()
            .map(|name| {
                self.find_node(name).map(|n| n.id).ok_or_else(|| {
                    InferError::InvalidJoin(format!(
                        "some of the {} variables do not exist in the network",
                        role
                    ))
                })
            })
            .collect()
    }

    /// Replaces a variable's local distribution and invalidates every cached
    /// potential that depends on it, directly or indirectly.
    pub fn set_distribution(&mut self, distribution: &Distribution) -> Result<bool, InferError> {
        let node = self.store_local_distribution(distribution)?;
        let formula = self.nodes[node.0].potential_formula;
        let fresh = self.cache[formula.0].clone();
        clear_cached_values(&self.arena, &mut self.cache, formula)?;
        self.cache[formula.0] = fresh;
        Ok(true)
    }

    /// Validates a distribution against a variable's declared shape, repacks
    /// it into the engine's domain order, normalizes each parent block, and
    /// stores it as the variable's local potential.
    fn store_local_distribution(
        &mut self,
        distribution: &Distribution,
    ) -> Result<NodeId, InferError> {
        let heads = distribution.head_variables();
        let fail = |name: &str, reason: &str| {
            Err(InferError::Validation(format!(
                "cannot set the distribution for {}: {}",
                name, reason
            )))
        };
        if heads.len() != 1 {
            return fail(
                heads.first().map(|h| h.name.as_str()).unwrap_or("<none>"),
                "it must have exactly one head variable",
            );
        }
        let head = &heads[0];
        let Some(node) = self.find_node(&head.name) else {
            return fail(&head.name, "the variable does not exist in the network");
        };
        let node_id = node.id;

        // Level maps carry each provided level index onto the engine's
        // declared order; the level sets must coincide.
        let head_map = level_map(&head.levels, &self.nodes[node_id.0].levels)
            .ok_or_else(|| {
                InferError::Validation(format!(
                    "cannot set the distribution for {}: the provided levels do not match the variable's levels",
                    head.name
                ))
            })?;

        let engine_parents = self.nodes[node_id.0].parents.clone();
        let provided = distribution.parent_variables();
        if provided.len() != engine_parents.len() {
            return fail(&head.name, "the provided parents do not match the variable's parents");
        }
        // For each engine parent: its position among the provided parents
        // and the level map of that parent.
        let mut parent_positions = Vec::with_capacity(engine_parents.len());
        let mut parent_maps: Vec<Vec<usize>> = vec![Vec::new(); engine_parents.len()];
        for (slot, parent_id) in engine_parents.iter().enumerate() {
            let parent_name = &self.nodes[parent_id.0].name;
            let Some(position) = provided.iter().position(|p| &p.name == parent_name) else {
                return fail(&head.name, "the provided parents do not match the variable's parents");
            };
            let map = level_map(&provided[position].levels, &self.nodes[parent_id.0].levels)
                .ok_or_else(|| {
                    InferError::Validation(format!(
                        "cannot set the distribution for {}: the levels of parent {} do not match",
                        head.name, parent_name
                    ))
                })?;
            parent_positions.push(position);
            parent_maps[slot] = map;
        }

        // Repack the provided potential into the engine's `[head, parents]`
        // order. Both layouts keep the head most significant.
        let provided_counts = distribution.level_counts();
        let engine_counts: Vec<usize> = std::iter::once(node_id)
            .chain(engine_parents.iter().copied())
            .map(|v| self.nodes[v.0].levels.len())
            .collect();
        let parent_size: usize = engine_counts[1..].iter().product();
        let mut repacked = vec![0.0; engine_counts.iter().product()];
        for (index, &value) in distribution.potential().iter().enumerate() {
            let combo = index_to_combination(index, &provided_counts);
            let mut target = Vec::with_capacity(engine_counts.len());
            target.push(head_map[combo[0]]);
            for (slot, &position) in parent_positions.iter().enumerate() {
                target.push(parent_maps[slot][combo[1 + position]]);
            }
            repacked[combination_to_index(&target, &engine_counts)] = value;
        }
        normalize_conditional(&mut repacked, parent_size);

        let formula = self.nodes[node_id.0].potential_formula;
        self.cache[formula.0] = Some(Rc::new(repacked));
        Ok(node_id)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Infers the probability of an event subject to the current evidence.
    ///
    /// An event naming an unknown variable, or restricting a variable to
    /// levels it does not have (or that contradict the evidence), has
    /// probability zero; the empty event has probability one.
    pub fn infer(&mut self, event: &Event) -> Result<f64, InferError> {
        if event.is_empty() {
            return Ok(1.0);
        }

        // Resolve the event to ids and level indexes, sorted by id so a
        // semantically identical event always takes an identical path
        // through the formula arena.
        let mut names: Vec<&String> = event.keys().collect();
        names.sort();
        let mut entries: Vec<(NodeId, Vec<usize>)> = Vec::with_capacity(names.len());
        for name in names {
            let Some(node) = self.find_node(name) else {
                return Ok(0.0);
            };
            let mut indexes: Vec<usize> = Vec::new();
            for level in &event[name.as_str()] {
                if let Some(index) = node.level_index(level) {
                    if !indexes.contains(&index) {
                        indexes.push(index);
                    }
                }
            }
            if let Some(evidenced) = self.arena.evidence_levels(node.evidence_formula)? {
                indexes.retain(|i| evidenced.contains(i));
            }
            if indexes.is_empty() {
                return Ok(0.0);
            }
            indexes.sort_unstable();
            entries.push((node.id, indexes));
        }
        entries.sort_by_key(|(id, _)| *id);

        if entries.len() == 1 {
            let (node, levels) = &entries[0];
            return self.infer_from_marginal(*node, levels);
        }

        let join_domain: Vec<NodeId> = entries.iter().map(|(id, _)| *id).collect();
        let root = pick_root_clique(self.cliques.iter(), &join_domain, &self.arena)?;
        if join_domain
            .iter()
            .all(|v| self.cliques[root.0].domain.contains(v))
        {
            return self.infer_from_clique(root, &entries);
        }
        self.infer_from_join(&entries)
    }

    /// Marginal probabilities of every level of every variable, under the
    /// current evidence.
    pub fn infer_all(&mut self) -> Result<NetworkResult, InferError> {
        let variables: Vec<(String, Vec<String>)> = self
            .nodes
            .iter()
            .map(|n| (n.name.clone(), n.levels.clone()))
            .collect();
        let mut result = NetworkResult::new();
        for (name, levels) in variables {
            let mut marginals = HashMap::new();
            for level in levels {
                let mut event = Event::new();
                event.insert(name.clone(), vec![level.clone()]);
                marginals.insert(level, self.infer(&event)?);
            }
            result.insert(name, marginals);
        }
        Ok(result)
    }

    /// Single-variable events read the variable's posterior marginal.
    fn infer_from_marginal(&mut self, node: NodeId, levels: &[usize]) -> Result<f64, InferError> {
        let formula = self.nodes[node.0].posterior_marginal_formula()?;
        let value = evaluate(formula, &self.nodes, &self.arena, &mut self.cache)?;
        Ok(kahan_sum(levels.iter().map(|&l| value[l])))
    }

    /// Events confined to one clique sum the matching rows of that clique's
    /// posterior.
    fn infer_from_clique(
        &mut self,
        clique: CliqueId,
        entries: &[(NodeId, Vec<usize>)],
    ) -> Result<f64, InferError> {
        let formula_id = self.cliques[clique.0].posterior_formula()?;
        let value = evaluate(formula_id, &self.nodes, &self.arena, &mut self.cache)?;
        let formula = self.arena.get(formula_id)?;
        let positions: Vec<usize> = entries
            .iter()
            .map(|(node, _)| {
                formula.domain.iter().position(|v| v == node).ok_or_else(|| {
                    InferError::Internal(format!(
                        "variable {} is missing from the posterior of clique {}",
                        node.0, clique.0
                    ))
                })
            })
            .collect::<Result<_, _>>()?;
        let total = kahan_sum(value.iter().enumerate().filter_map(|(index, &p)| {
            let combo = index_to_combination(index, &formula.levels);
            let consistent = positions
                .iter()
                .zip(entries)
                .all(|(&position, (_, levels))| levels.contains(&combo[position]));
            consistent.then_some(p)
        }));
        Ok(total)
    }

    /// Events spanning several cliques join the posteriors of the cliques
    /// involved by a modified message-passing pass.
    ///
    /// With no evidence set, the compacted fast path sums the event's rows
    /// directly. Otherwise the event probability is the Bayes quotient
    /// P(event, evidence) / P(evidence), computed over a temporarily
    /// evidence-free network under a snapshot that is restored afterwards.
    fn infer_from_join(&mut self, entries: &[(NodeId, Vec<usize>)]) -> Result<f64, InferError> {
        let join_domain: Vec<NodeId> = entries.iter().map(|(id, _)| *id).collect();
        let mut restrictions: Vec<Option<Vec<usize>>> = vec![None; self.nodes.len()];
        for (node, levels) in entries {
            restrictions[node.0] = Some(levels.clone());
        }

        let evidence = self.evidence_entries()?;
        if evidence.is_empty() {
            return infer_join_probability(
                &mut self.arena,
                &self.nodes,
                &self.cliques,
                &self.separators,
                &self.components,
                &mut self.cache,
                &join_domain,
                &restrictions,
            );
        }

        let snapshot = self.snapshot();
        self.remove_all_evidence()?;

        let mut joint_domain = join_domain.clone();
        let mut joint_restrictions = restrictions;
        for (node, levels) in &evidence {
            if !joint_domain.contains(node) {
                joint_domain.push(*node);
                joint_restrictions[node.0] = Some(levels.clone());
            }
        }
        joint_domain.sort_unstable();

        let mut evidence_restrictions: Vec<Option<Vec<usize>>> = vec![None; self.nodes.len()];
        let evidence_domain: Vec<NodeId> = evidence.iter().map(|(id, _)| *id).collect();
        for (node, levels) in &evidence {
            evidence_restrictions[node.0] = Some(levels.clone());
        }

        let outcome = (|| {
            let joint = infer_join_probability(
                &mut self.arena,
                &self.nodes,
                &self.cliques,
                &self.separators,
                &self.components,
                &mut self.cache,
                &joint_domain,
                &joint_restrictions,
            )?;
            if joint == 0.0 {
                return Ok(0.0);
            }
            let prior = infer_join_probability(
                &mut self.arena,
                &self.nodes,
                &self.cliques,
                &self.separators,
                &self.components,
                &mut self.cache,
                &evidence_domain,
                &evidence_restrictions,
            )?;
            Ok(joint / prior)
        })();

        self.restore(&snapshot)?;
        outcome
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Captures the mutable state of the engine: a shallow copy of the
    /// potentials cache and the evidence map.
    pub fn snapshot(&self) -> EngineSnapshot {
        let evidence = self
            .nodes
            .iter()
            .map(|node| {
                self.arena
                    .evidence_levels(node.evidence_formula)
                    .ok()
                    .flatten()
                    .cloned()
            })
            .collect();
        EngineSnapshot::capture(&self.cache, evidence)
    }

    /// Restores a previously captured snapshot: evidence filters are put
    /// back and exactly the cache entries that changed since the snapshot
    /// are reset (entries for formulas created afterwards become
    /// unevaluated).
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<(), InferError> {
        if snapshot.evidence.len() != self.nodes.len() {
            return Err(InferError::Validation(
                "the snapshot does not belong to this engine".into(),
            ));
        }
        for (node, levels) in self.nodes.iter().zip(&snapshot.evidence) {
            self.arena
                .set_evidence_levels(node.evidence_formula, levels.clone())?;
        }
        for (index, slot) in self.cache.iter_mut().enumerate() {
            *slot = snapshot.potentials.get(index).cloned().flatten();
        }
        Ok(())
    }
}

/// Maps each provided level index onto the declared level order; `None` when
/// the two lists are not permutations of one another.
fn level_map(provided: &[String], declared: &[String]) -> Option<Vec<usize>> {
    if provided.len() != declared.len() {
        return None;
    }
    let map: Vec<usize> = provided
        .iter()
        .map(|level| declared.iter().position(|d| d == level))
        .collect::<Option<_>>()?;
    let mut seen = vec![false; declared.len()];
    for &position in &map {
        if seen[position] {
            return None;
        }
        seen[position] = true;
    }
    Some(map)
}
