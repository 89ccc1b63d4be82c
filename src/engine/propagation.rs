//! Symbolic junction-tree message passing.
//!
//! Message passing runs once, at construction, and never touches a number:
//! it only builds formulas through the arena's upsert factory. A message
//! between adjacent cliques is a *list* of factor formulas (lazy
//! propagation): factors whose domains already fit inside the keep-set pass
//! through untouched, together with the evidence functions riding on them;
//! everything else is multiplied and marginalized onto the keep-set as one
//! new formula.
//!
//! The initial pass keeps exactly the separator variables and computes the
//! messages of both directions of every edge (collect toward the root, then
//! distribute outward). The arbitrary-join pass reuses the same machinery
//! with the keep-set widened by the requested join domain, and only
//! collects. After collection each clique's posterior formula references
//! every neighbor's message, which is what makes the formula graph
//! consistent without an eager distribution of numbers.

use rustc_hash::FxHashMap;

use crate::engine::errors::InferError;
use crate::engine::formula::{FormulaArena, FormulaId, FormulaKind};
use crate::engine::graph::{Clique, CliqueId, Node, NodeId, Separator};

/// Messages passed between adjacent cliques, keyed by (source, target).
pub(crate) type MessageMap = FxHashMap<(CliqueId, CliqueId), Vec<FormulaId>>;

/// Depth-first traversal order from a root clique; every entry carries the
/// clique and the neighbor it was reached from. Parents precede children.
fn traversal_order(
    cliques: &[Clique],
    root: CliqueId,
) -> Vec<(CliqueId, Option<CliqueId>)> {
    let mut order = Vec::new();
    let mut stack = vec![(root, None)];
    while let Some((clique, parent)) = stack.pop() {
        for &neighbor in &cliques[clique.0].neighbors {
            if Some(neighbor) != parent {
                stack.push((neighbor, Some(clique)));
            }
        }
        order.push((clique, parent));
    }
    order
}

/// Computes the message from `src` to `trg`: the factors received from the
/// source's other neighbors plus its own prior, pushed through the keep-set
/// `separator ∪ join_domain`.
fn pass_message(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    messages: &mut MessageMap,
    src: CliqueId,
    trg: CliqueId,
    join_domain: &[NodeId],
) -> Result<(), InferError> {
    let source = &cliques[src.0];

    // Factors received from the other neighbors are forwarded; evidence
    // functions among them are tracked separately so they can ride along
    // with whichever factor mentions their variable.
    let mut neighbor_factors: Vec<FormulaId> = Vec::new();
    let mut evidence: Vec<FormulaId> = Vec::new();
    for &neighbor in &source.neighbors {
        if neighbor == trg {
            continue;
        }
        if let Some(received) = messages.get(&(neighbor, src)) {
            for &formula in received {
                if matches!(
                    arena.get(formula)?.kind,
                    FormulaKind::EvidenceFunction { .. }
                ) {
                    if !evidence.contains(&formula) {
                        evidence.push(formula);
                    }
                } else if !neighbor_factors.contains(&formula) {
                    neighbor_factors.push(formula);
                }
            }
        }
    }
    for v in &source.domain {
        let formula = nodes[v.0].evidence_formula;
        if !evidence.contains(&formula) {
            evidence.push(formula);
        }
    }

    let mut factors: Vec<FormulaId> = vec![arena.reference(source.prior)?];
    for formula in neighbor_factors {
        if !factors.contains(&formula) {
            factors.push(formula);
        }
    }

    let separator = &separators[source.separator_toward(trg)?.0];
    let mut keepers: Vec<NodeId> = separator.domain.clone();
    for v in join_domain {
        if !keepers.contains(v) {
            keepers.push(*v);
        }
    }

    // Factors that fit inside the keep-set pass through unchanged; the rest
    // must be joined before marginalization, because marginalization does
    // not distribute over the join.
    let mut pass_through: Vec<FormulaId> = Vec::new();
    let mut needs_marginalization: Vec<FormulaId> = Vec::new();
    for formula in factors {
        if arena
            .get(formula)?
            .domain
            .iter()
            .all(|v| keepers.contains(v))
        {
            pass_through.push(formula);
        } else {
            needs_marginalization.push(formula);
        }
    }

    let touches = |arena: &FormulaArena,
                   group: &[FormulaId],
                   evidence_formula: FormulaId|
     -> Result<bool, InferError> {
        let node = match &arena.get(evidence_formula)?.kind {
            FormulaKind::EvidenceFunction { node, .. } => *node,
            _ => return Ok(false),
        };
        for &formula in group {
            if arena.get(formula)?.domain.contains(&node) {
                return Ok(true);
            }
        }
        Ok(false)
    };

    let mut message: Vec<FormulaId> = pass_through.clone();
    for &e in &evidence {
        if touches(arena, &pass_through, e)? && !message.contains(&e) {
            message.push(e);
        }
    }
    if !needs_marginalization.is_empty() {
        let mut joined = needs_marginalization.clone();
        for &e in &evidence {
            if touches(arena, &needs_marginalization, e)? && !joined.contains(&e) {
                joined.push(e);
            }
        }
        let marginal = if joined.len() == 1 {
            arena.marginal(&keepers, joined[0])?
        } else {
            let product = arena.product(joined)?;
            arena.marginal(&keepers, product)?
        };
        message.push(marginal);
    }

    messages.insert((src, trg), message);
    Ok(())
}

/// Collects messages from the leaves toward the root: every clique's message
/// to its traversal parent is computed after the messages from its other
/// neighbors.
pub(crate) fn collect_messages(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    messages: &mut MessageMap,
    root: CliqueId,
    join_domain: &[NodeId],
) -> Result<(), InferError> {
    let order = traversal_order(cliques, root);
    for &(clique, parent) in order.iter().rev() {
        if let Some(parent) = parent {
            pass_message(
                arena, nodes, cliques, separators, messages, clique, parent, join_domain,
            )?;
        }
    }
    Ok(())
}

/// Distributes messages outward from the root, giving every edge its second
/// direction. Parents precede children in the traversal order, so each
/// clique has already received the message from its own parent when it
/// passes messages on.
fn distribute_messages(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    messages: &mut MessageMap,
    root: CliqueId,
) -> Result<(), InferError> {
    let order = traversal_order(cliques, root);
    for &(clique, parent) in &order {
        if let Some(parent) = parent {
            pass_message(
                arena, nodes, cliques, separators, messages, parent, clique, &[],
            )?;
        }
    }
    Ok(())
}

/// Runs the initial symbolic propagation over every connected component and
/// returns the full message map (two messages per edge).
pub(crate) fn propagate(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    roots: &[CliqueId],
) -> Result<MessageMap, InferError> {
    let mut messages = MessageMap::default();
    for &root in roots {
        collect_messages(arena, nodes, cliques, separators, &mut messages, root, &[])?;
        distribute_messages(arena, nodes, cliques, separators, &mut messages, root)?;
    }
    Ok(messages)
}

/// Assembles each clique's posterior formula: its prior, every message
/// received from its neighbors, and the evidence functions of its domain.
pub(crate) fn assemble_posteriors(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &mut [Clique],
    messages: &MessageMap,
) -> Result<(), InferError> {
    for index in 0..cliques.len() {
        let clique_id = cliques[index].id;
        let neighbors = cliques[index].neighbors.clone();
        let mut factors = vec![cliques[index].prior];
        let mut received: Vec<Vec<FormulaId>> = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let message = messages
                .get(&(neighbor, clique_id))
                .cloned()
                .unwrap_or_default();
            factors.extend(message.iter().copied());
            let mut non_unit = Vec::new();
            for formula in message {
                if !matches!(arena.get(formula)?.kind, FormulaKind::Unit) {
                    non_unit.push(formula);
                }
            }
            received.push(non_unit);
        }
        for v in &cliques[index].domain {
            factors.push(nodes[v.0].evidence_formula);
        }
        let posterior = arena.product(factors)?;
        cliques[index].posterior = Some(posterior);
        cliques[index].messages_received = received;
    }
    Ok(())
}

/// Assigns each separator's posterior: the marginal of the smaller of its
/// two adjacent cliques' posteriors onto the separator's variable set.
pub(crate) fn assemble_separator_posteriors(
    arena: &mut FormulaArena,
    cliques: &[Clique],
    separators: &mut [Separator],
) -> Result<(), InferError> {
    for index in 0..separators.len() {
        let (domain, adjacent) = {
            let separator = &separators[index];
            (separator.domain.clone(), separator.cliques.clone())
        };
        if adjacent.len() < 2 {
            return Err(InferError::Internal(format!(
                "separator {} has fewer than two adjacent cliques",
                index
            )));
        }
        let first = &cliques[adjacent[0].0];
        let position = first
            .separators
            .iter()
            .position(|s| s.0 == index)
            .ok_or_else(|| {
                InferError::Internal(format!(
                    "clique {} does not list separator {}",
                    first.id.0, index
                ))
            })?;
        let second = &cliques[first.neighbors[position].0];
        let first_posterior = first.posterior_formula()?;
        let second_posterior = second.posterior_formula()?;
        // Evaluating the smaller posterior costs less when this marginal is
        // eventually pulled through the cache.
        let smaller = if arena.get(first_posterior)?.size <= arena.get(second_posterior)?.size {
            first_posterior
        } else {
            second_posterior
        };
        separators[index].posterior = Some(arena.marginal(&domain, smaller)?);
    }
    Ok(())
}

/// Assigns each variable's posterior-marginal formula, marginalizing the
/// smallest available posterior (its first clique's, or any separator's
/// whose domain contains the variable).
pub(crate) fn assemble_node_marginals(
    arena: &mut FormulaArena,
    nodes: &mut [Node],
    cliques: &[Clique],
    separators: &[Separator],
) -> Result<(), InferError> {
    for index in 0..nodes.len() {
        let node_id = nodes[index].id;
        let home = nodes[index].cliques.first().copied().ok_or_else(|| {
            InferError::Internal(format!(
                "variable {} does not occur in any clique",
                nodes[index].name
            ))
        })?;
        let mut base = cliques[home.0].posterior_formula()?;
        if nodes[index].cliques.len() > 1 {
            for separator in separators.iter() {
                let candidate = separator.posterior_formula()?;
                if separator.domain.contains(&node_id)
                    && arena.get(candidate)?.size < arena.get(base)?.size
                {
                    base = candidate;
                }
            }
        }
        nodes[index].posterior_marginal = Some(arena.marginal(&[node_id], base)?);
    }
    Ok(())
}
