//! On-demand evaluation of formulas with dependency-aware invalidation.
//!
//! The potentials cache is an array parallel to the formula arena; `None`
//! means "not yet evaluated under the current evidence and local
//! distributions". Every product and marginal is normalized to total mass
//! one as it is computed (zero totals are left alone), so a non-null cache
//! entry is either a normalized distribution over the formula's full domain
//! or identically zero. Entries are shared by `Rc` so snapshots of the cache
//! are shallow.

use std::rc::Rc;

use crate::engine::errors::InferError;
use crate::engine::formula::{Formula, FormulaArena, FormulaId, FormulaKind};
use crate::engine::graph::Node;
use crate::engine::potential::{evaluate_marginal, evaluate_product, Potential};

/// Cache of evaluated potentials, parallel to the formula arena.
pub type PotentialCache = Vec<Option<Rc<Potential>>>;

/// Grows the cache to match the arena after new formulas were appended.
pub fn sync_cache(cache: &mut PotentialCache, arena: &FormulaArena) {
    if cache.len() < arena.len() {
        cache.resize(arena.len(), None);
    }
}

fn cached(cache: &PotentialCache, id: FormulaId) -> Result<&Option<Rc<Potential>>, InferError> {
    cache
        .get(id.0)
        .ok_or_else(|| InferError::Internal(format!("no cache slot for formula {}", id.0)))
}

fn store(
    cache: &mut PotentialCache,
    id: FormulaId,
    value: Potential,
) -> Result<Rc<Potential>, InferError> {
    let slot = cache
        .get_mut(id.0)
        .ok_or_else(|| InferError::Internal(format!("no cache slot for formula {}", id.0)))?;
    let rc = Rc::new(value);
    *slot = Some(rc.clone());
    Ok(rc)
}

/// The indicator vector an evidence function currently denotes: all ones
/// when unrestricted, otherwise 1 on the included levels and 0 elsewhere.
pub fn evidence_vector(level_count: usize, levels: Option<&Vec<usize>>) -> Potential {
    match levels {
        None => vec![1.0; level_count],
        Some(kept) => {
            let mut vector = vec![0.0; level_count];
            for &level in kept {
                if level < level_count {
                    vector[level] = 1.0;
                }
            }
            vector
        }
    }
}

/// Evaluates a formula by recursive descent, memoizing every intermediate
/// result in the cache at its own formula id.
pub fn evaluate(
    id: FormulaId,
    nodes: &[Node],
    arena: &FormulaArena,
    cache: &mut PotentialCache,
) -> Result<Rc<Potential>, InferError> {
    if let Some(value) = cached(cache, id)? {
        return Ok(value.clone());
    }
    let formula = arena.get(id)?;
    match &formula.kind {
        FormulaKind::Unit => store(cache, id, vec![1.0]),
        FormulaKind::NodePotential { node } => {
            // Local distributions are seeded at construction and re-seeded by
            // `set_distribution`; invalidation never reaches this leaf.
            Err(InferError::Internal(format!(
                "local distribution for variable {} has not been initialized",
                nodes
                    .get(node.0)
                    .map(|n| n.name.as_str())
                    .unwrap_or("<unknown>")
            )))
        }
        FormulaKind::EvidenceFunction { levels, .. } => {
            let vector = evidence_vector(formula.size, levels.as_ref());
            store(cache, id, vector)
        }
        FormulaKind::Product { factors } => {
            let factors = factors.clone();
            let mut values = Vec::with_capacity(factors.len());
            for factor in &factors {
                values.push(evaluate(*factor, nodes, arena, cache)?);
            }
            let factor_formulas: Vec<&Formula> = factors
                .iter()
                .map(|f| arena.get(*f))
                .collect::<Result<_, _>>()?;
            let slices: Vec<&[f64]> = values.iter().map(|v| v.as_slice()).collect();
            let factor_domains: Vec<_> = factor_formulas
                .iter()
                .map(|f| f.domain.as_slice())
                .collect();
            let factor_levels: Vec<_> = factor_formulas
                .iter()
                .map(|f| f.levels.as_slice())
                .collect();
            let result = evaluate_product(
                &slices,
                &factor_domains,
                &factor_levels,
                &formula.domain,
                &formula.levels,
                formula.size,
                true,
            )?;
            store(cache, id, result)
        }
        FormulaKind::Marginal { inner } => {
            let inner = *inner;
            let value = evaluate(inner, nodes, arena, cache)?;
            let inner_formula = arena.get(inner)?;
            let result = evaluate_marginal(
                &value,
                &inner_formula.domain,
                &inner_formula.levels,
                &formula.domain,
                &formula.levels,
                formula.size,
                true,
            )?;
            store(cache, id, result)
        }
        FormulaKind::Reference { target } => evaluate(*target, nodes, arena, cache),
    }
}

/// Recursively clears the cached potentials reachable from the given
/// formula through the reverse-dependency edges.
///
/// An already-null entry stops the recursion down that branch: the formula
/// graph is a DAG with shared subformulas, and a null entry implies all of
/// its dependents are already null, so every formula is visited at most once.
pub fn clear_cached_values(
    arena: &FormulaArena,
    cache: &mut PotentialCache,
    id: FormulaId,
) -> Result<(), InferError> {
    let slot = cache
        .get_mut(id.0)
        .ok_or_else(|| InferError::Internal(format!("no cache slot for formula {}", id.0)))?;
    if slot.is_none() {
        return Ok(());
    }
    *slot = None;
    let dependents = arena.get(id)?.referenced_by.clone();
    for dependent in dependents {
        clear_cached_values(arena, cache, dependent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::NodeId;

    #[test]
    fn evidence_vector_is_the_multiplicative_identity_when_unrestricted() {
        assert_eq!(evidence_vector(3, None), vec![1.0, 1.0, 1.0]);
        assert_eq!(evidence_vector(3, Some(&vec![0, 2])), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn invalidation_stops_at_already_null_entries() {
        let mut arena = FormulaArena::new();
        let a = arena.node_potential(NodeId(0), vec![NodeId(0)], vec![2]);
        let e = arena.evidence_function(NodeId(0), 2);
        let p = arena.product(vec![a, e]).unwrap();
        // Keeping the full domain collapses the marginal onto the product
        // itself, so the graph stays a simple chain leaf -> product.
        let m = arena.marginal(&[NodeId(0)], p).unwrap();
        assert_eq!(m, p);
        let mut cache: PotentialCache = vec![None; arena.len()];
        cache[a.0] = Some(Rc::new(vec![0.5, 0.5]));
        cache[e.0] = Some(Rc::new(vec![1.0, 1.0]));
        cache[p.0] = Some(Rc::new(vec![0.5, 0.5]));
        clear_cached_values(&arena, &mut cache, e).unwrap();
        assert!(cache[e.0].is_none());
        assert!(cache[p.0].is_none());
        // The other leaf is not a dependent of the evidence function.
        assert!(cache[a.0].is_some());
        // Clearing again is a no-op.
        clear_cached_values(&arena, &mut cache, e).unwrap();
    }
}
