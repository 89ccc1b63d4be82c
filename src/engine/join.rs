//! Arbitrary-join queries over the junction forest.
//!
//! A joint distribution over variables that do not share a clique is
//! synthesized on demand by re-running the collect pass with a widened
//! keep-set: requested variables are never marginalized away, even where
//! they fall outside a separator. The pass may create supplemental formulas
//! that initial propagation never needed; they are appended to the shared
//! arena through the same upsert factory, so a repeated request finds its
//! formulas (and any cached potentials) already in place.
//!
//! Only connected components containing a requested variable are traversed;
//! their per-component joint formulas are multiplied into the final joint,
//! since cliques in different components are mutually independent.

use crate::engine::errors::InferError;
use crate::engine::evaluation::{evaluate, sync_cache, PotentialCache};
use crate::engine::formula::{FormulaArena, FormulaId};
use crate::engine::graph::{pick_root_clique, Clique, CliqueId, Node, NodeId, Separator};
use crate::engine::potential::{evaluate_marginal, normalize_conditional, Potential};
use crate::engine::propagation::{collect_messages, MessageMap};

/// Validates a join request: heads non-empty and distinct, parents distinct,
/// the two sets disjoint, and every id in range.
fn validate_join_request(
    nodes: &[Node],
    heads: &[NodeId],
    parents: &[NodeId],
) -> Result<(), InferError> {
    let fail = |reason: &str| Err(InferError::InvalidJoin(reason.into()));
    if heads.is_empty() {
        return fail("no head variables were provided");
    }
    if heads
        .iter()
        .enumerate()
        .any(|(i, v)| heads[..i].contains(v))
    {
        return fail("the head variables are not distinct");
    }
    if parents
        .iter()
        .enumerate()
        .any(|(i, v)| parents[..i].contains(v))
    {
        return fail("the parent variables are not distinct");
    }
    if heads.iter().any(|v| parents.contains(v)) {
        return fail("the head and parent variables are not disjoint");
    }
    if heads.iter().any(|v| v.0 >= nodes.len()) {
        return fail("some of the head variables do not exist in the network");
    }
    if parents.iter().any(|v| v.0 >= nodes.len()) {
        return fail("some of the parent variables do not exist in the network");
    }
    Ok(())
}

/// Builds the formula of the joint distribution over `heads ∪ parents`,
/// extending the arena with whatever supplemental formulas the widened
/// collect pass requires.
pub(crate) fn propagate_join_messages(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    components: &[Vec<CliqueId>],
    heads: &[NodeId],
    parents: &[NodeId],
) -> Result<FormulaId, InferError> {
    validate_join_request(nodes, heads, parents)?;
    let join_domain: Vec<NodeId> = heads.iter().chain(parents).copied().collect();

    let relevant: Vec<&Vec<CliqueId>> = components
        .iter()
        .filter(|cc| {
            cc.iter()
                .any(|c| cliques[c.0].domain.iter().any(|v| join_domain.contains(v)))
        })
        .collect();

    let mut messages = MessageMap::default();
    let mut component_formulas = Vec::with_capacity(relevant.len());
    for component in relevant {
        let these_variables: Vec<NodeId> = join_domain
            .iter()
            .filter(|v| {
                component
                    .iter()
                    .any(|c| cliques[c.0].domain.contains(v))
            })
            .copied()
            .collect();
        let root = pick_root_clique(
            component.iter().map(|c| &cliques[c.0]),
            &these_variables,
            arena,
        )?;
        collect_messages(
            arena,
            nodes,
            cliques,
            separators,
            &mut messages,
            root,
            &these_variables,
        )?;

        // The root's joint over everything it now holds: its prior, the
        // collected messages, and the evidence functions of its domain. The
        // upsert factory makes this the clique's existing posterior whenever
        // the widened messages coincide with the initial ones.
        let root_clique = &cliques[root.0];
        let mut factors = vec![arena.reference(root_clique.prior)?];
        for &neighbor in &root_clique.neighbors {
            if let Some(message) = messages.get(&(neighbor, root)) {
                factors.extend(message.iter().copied());
            }
        }
        for v in &root_clique.domain {
            factors.push(nodes[v.0].evidence_formula);
        }
        let clique_formula = arena.product(factors)?;
        component_formulas.push(arena.marginal(&these_variables, clique_formula)?);
    }

    arena.product(component_formulas)
}

/// Evaluates the joint distribution over `heads` conditioned on `parents`
/// with the general strategy: build the join formula, evaluate it fully
/// through the shared cache, permute the result into `[heads..., parents...]`
/// order, and normalize each parent block (blocks with zero mass are left
/// unnormalized).
pub(crate) fn evaluate_join(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    components: &[Vec<CliqueId>],
    cache: &mut PotentialCache,
    heads: &[NodeId],
    parents: &[NodeId],
) -> Result<Potential, InferError> {
    #[cfg(feature = "tracing")]
    let arena_len_before = arena.len();
    let joint = propagate_join_messages(
        arena, nodes, cliques, separators, components, heads, parents,
    )?;
    #[cfg(feature = "tracing")]
    tracing::debug!(
        joint = joint.0,
        supplemental = arena.len() - arena_len_before,
        "join propagation complete"
    );
    sync_cache(cache, arena);
    let value = evaluate(joint, nodes, arena, cache)?;
    let formula = arena.get(joint)?;

    let join_domain: Vec<NodeId> = heads.iter().chain(parents).copied().collect();
    let mut result = if formula.domain == join_domain {
        value.to_vec()
    } else {
        let levels: Vec<usize> = join_domain
            .iter()
            .map(|v| nodes[v.0].levels.len())
            .collect();
        let size = levels.iter().product();
        evaluate_marginal(
            &value,
            &formula.domain,
            &formula.levels,
            &join_domain,
            &levels,
            size,
            false,
        )?
    };

    let parent_size: usize = parents.iter().map(|v| nodes[v.0].levels.len()).product();
    normalize_conditional(&mut result, parent_size);
    Ok(result)
}
