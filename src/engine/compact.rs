//! Event-probability fast path with row compaction.
//!
//! When no evidence is set, the probability of an event is the sum of the
//! joint's rows consistent with the event, so rows that can never
//! contribute need not be computed or carried. This module evaluates the
//! join formula while filtering ("compacting") every potential down to the
//! rows consistent with the event's level restrictions.
//!
//! Compaction is purely an optimization: it must produce exactly the sum the
//! general strategy would. The subtlety is that cached potentials are
//! normalized, and a compacted potential has lost the rows needed to
//! renormalize numerically. Supplemental products instead apply a
//! combinatorial scale factor derived from full level counts, which equals
//! the missing normalization constant precisely because, with no evidence
//! set, every factor entering a join message is conditional-shaped: its raw
//! mass is the level-count product of its conditioning variables.
//!
//! Compacted values are event-specific and are kept in a scratch overlay;
//! only full-domain values ever enter the shared cache.

use crate::engine::errors::InferError;
use crate::engine::evaluation::{evaluate, sync_cache, PotentialCache};
use crate::engine::formula::{FormulaArena, FormulaId, FormulaKind};
use crate::engine::graph::{Clique, CliqueId, Node, NodeId, Separator};
use crate::engine::join::propagate_join_messages;
use crate::engine::potential::{
    compact_potential, evaluate_marginal, evaluate_product, kahan_sum, restricted_levels,
    Potential,
};

/// Infers the probability of an event spanning arbitrary cliques, assuming
/// no evidence is currently set.
///
/// `restrictions` is indexed by variable id: `Some(levels)` restricts that
/// variable to the (sorted) level set of the event, `None` leaves it free.
pub(crate) fn infer_join_probability(
    arena: &mut FormulaArena,
    nodes: &[Node],
    cliques: &[Clique],
    separators: &[Separator],
    components: &[Vec<CliqueId>],
    cache: &mut PotentialCache,
    join_domain: &[NodeId],
    restrictions: &[Option<Vec<usize>>],
) -> Result<f64, InferError> {
    let initial_len = arena.len();
    let joint = propagate_join_messages(
        arena, nodes, cliques, separators, components, join_domain, &[],
    )?;
    sync_cache(cache, arena);

    let sizes: Vec<usize> = arena
        .formulas()
        .iter()
        .map(|f| {
            restricted_levels(&f.domain, &f.levels, restrictions)
                .iter()
                .product()
        })
        .collect();

    let mut evaluation = CompactedEvaluation {
        initial_len,
        sizes,
        restrictions,
        scratch: vec![None; arena.len() - initial_len],
    };
    let compacted = evaluation.evaluate(joint, nodes, arena, cache)?;
    Ok(kahan_sum(compacted))
}

/// State of one compacted evaluation pass.
struct CompactedEvaluation<'a> {
    /// Arena length before join propagation; formulas below this boundary
    /// are evaluated in full through the shared cache and compacted on the
    /// way out, formulas at or above it are evaluated compacted.
    initial_len: usize,
    /// Compacted size of every formula under the current restrictions.
    sizes: Vec<usize>,
    restrictions: &'a [Option<Vec<usize>>],
    /// Event-specific values for the supplemental formulas.
    scratch: Vec<Option<Potential>>,
}

impl CompactedEvaluation<'_> {
    fn evaluate(
        &mut self,
        id: FormulaId,
        nodes: &[Node],
        arena: &FormulaArena,
        cache: &mut PotentialCache,
    ) -> Result<Potential, InferError> {
        if id.0 < self.initial_len {
            let formula = arena.get(id)?;
            if let Some(cached) = cache.get(id.0).and_then(|slot| slot.as_ref()) {
                if cached.len() == self.sizes[id.0] {
                    return Ok(cached.to_vec());
                }
                return Ok(compact_potential(
                    cached,
                    &formula.domain,
                    &formula.levels,
                    self.restrictions,
                ));
            }
            // Not yet cached: evaluate in full so the uncompacted potential
            // is stored for future queries, then compact for this one.
            let full = evaluate(id, nodes, arena, cache)?;
            return Ok(compact_potential(
                &full,
                &formula.domain,
                &formula.levels,
                self.restrictions,
            ));
        }

        if let Some(value) = &self.scratch[id.0 - self.initial_len] {
            return Ok(value.clone());
        }
        let formula = arena.get(id)?;
        let result = match &formula.kind {
            FormulaKind::Product { factors } => {
                let factors = factors.clone();
                let mut values = Vec::with_capacity(factors.len());
                for &factor in &factors {
                    values.push(self.evaluate(factor, nodes, arena, cache)?);
                }
                let scale = scale_factor(arena, nodes, &factors)?;
                let factor_formulas: Vec<_> = factors
                    .iter()
                    .map(|f| arena.get(*f))
                    .collect::<Result<Vec<_>, _>>()?;
                let factor_levels: Vec<Vec<usize>> = factor_formulas
                    .iter()
                    .map(|f| restricted_levels(&f.domain, &f.levels, self.restrictions))
                    .collect();
                let slices: Vec<&[f64]> = values.iter().map(|v| v.as_slice()).collect();
                let domains: Vec<&[NodeId]> =
                    factor_formulas.iter().map(|f| f.domain.as_slice()).collect();
                let level_slices: Vec<&[usize]> =
                    factor_levels.iter().map(|l| l.as_slice()).collect();
                let levels = restricted_levels(&formula.domain, &formula.levels, self.restrictions);
                let mut product = evaluate_product(
                    &slices,
                    &domains,
                    &level_slices,
                    &formula.domain,
                    &levels,
                    self.sizes[id.0],
                    false,
                )?;
                for value in product.iter_mut() {
                    *value *= scale;
                }
                product
            }
            FormulaKind::Marginal { inner } => {
                let inner = *inner;
                let value = self.evaluate(inner, nodes, arena, cache)?;
                let inner_formula = arena.get(inner)?;
                let inner_levels =
                    restricted_levels(&inner_formula.domain, &inner_formula.levels, self.restrictions);
                let levels = restricted_levels(&formula.domain, &formula.levels, self.restrictions);
                evaluate_marginal(
                    &value,
                    &inner_formula.domain,
                    &inner_levels,
                    &formula.domain,
                    &levels,
                    self.sizes[id.0],
                    false,
                )?
            }
            FormulaKind::Reference { target } => {
                let target = *target;
                self.evaluate(target, nodes, arena, cache)?
            }
            _ => {
                return Err(InferError::Internal(
                    "unexpected formula kind during compacted evaluation".into(),
                ))
            }
        };
        self.scratch[id.0 - self.initial_len] = Some(result.clone());
        Ok(result)
    }
}

/// The normalization constant a supplemental product loses by being
/// evaluated from compacted rows, reconstructed combinatorially.
///
/// Non-evidence factors are folded left to right. Each node potential
/// contributes its parents' level-count product to the divisor (a
/// conditional's raw mass); each factor past the first contributes the
/// level-count product of its overlap with the accumulated domain to the
/// multiplier. All counts are full, never compacted.
fn scale_factor(
    arena: &FormulaArena,
    nodes: &[Node],
    factor_ids: &[FormulaId],
) -> Result<f64, InferError> {
    let mut factors = Vec::with_capacity(factor_ids.len());
    for &id in factor_ids {
        let formula = arena.get(id)?;
        if !matches!(formula.kind, FormulaKind::EvidenceFunction { .. }) {
            factors.push(formula);
        }
    }

    let mut divisor = 1.0;
    for formula in &factors {
        if matches!(formula.kind, FormulaKind::NodePotential { .. }) {
            divisor *= formula.levels[1..].iter().product::<usize>() as f64;
        }
    }

    let mut multiplier = 1.0;
    let mut accumulated: Vec<NodeId> = Vec::new();
    for (i, formula) in factors.iter().enumerate() {
        if i > 0 {
            for v in &formula.domain {
                if accumulated.contains(v) {
                    multiplier *= nodes[v.0].levels.len() as f64;
                }
            }
        }
        for v in &formula.domain {
            if !accumulated.contains(v) {
                accumulated.push(*v);
            }
        }
    }
    Ok(multiplier / divisor)
}
