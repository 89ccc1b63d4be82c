//! The symbolic formula graph and its canonicalizing factory.
//!
//! Every posterior distribution the engine can produce is described exactly
//! once as a formula: a node of an acyclic, content-addressed graph held in a
//! single arena. Formulas are appended to the arena and addressed by integer
//! id; ids are never reused. A canonical name derived from a formula's kind
//! and operands deduplicates structurally identical formulas, so two requests
//! for the same intermediate quantity always resolve to one cached slot.
//!
//! Each formula records the set of formulas that consume it
//! (`referenced_by`); these reverse edges drive cache invalidation when
//! evidence or a local distribution changes.

use rustc_hash::FxHashMap;

use crate::engine::errors::InferError;
use crate::engine::graph::NodeId;

/// A unique identifier for a formula; the formula's position in the arena.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormulaId(pub usize);

/// The operation a formula denotes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormulaKind {
    /// The empty-domain potential with value 1.
    Unit,
    /// The local conditional distribution of one variable.
    NodePotential { node: NodeId },
    /// A per-variable indicator factor. `None` means no restriction (an
    /// all-ones vector); a sorted level list keeps mass only on those levels.
    /// This is the only mutable field in the whole graph.
    EvidenceFunction {
        node: NodeId,
        levels: Option<Vec<usize>>,
    },
    /// The join of the named factor formulas.
    Product { factors: Vec<FormulaId> },
    /// The sum-out of the inner formula onto this formula's domain.
    Marginal { inner: FormulaId },
    /// An alias for another formula. Never stored in the arena (the factory
    /// dereferences aliases on sight) but kept in the type so the evaluator
    /// can forward defensively.
    Reference { target: FormulaId },
}

/// A node of the formula graph.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Formula {
    pub id: FormulaId,
    /// Canonical name used for structural deduplication.
    pub name: String,
    pub kind: FormulaKind,
    /// Ordered variable domain; the first position is most significant.
    pub domain: Vec<NodeId>,
    /// Level count per domain position.
    pub levels: Vec<usize>,
    /// Product of the level counts.
    pub size: usize,
    /// Formulas that consume this one; the reverse-dependency edge set used
    /// for cache invalidation.
    pub referenced_by: Vec<FormulaId>,
}

/// The arena of all formulas, with the canonicalizing upsert factory.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormulaArena {
    formulas: Vec<Formula>,
    names: FxHashMap<String, FormulaId>,
}

impl FormulaArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Looks up a formula by id. A dangling id is a fatal internal
    /// consistency error, never recoverable.
    pub fn get(&self, id: FormulaId) -> Result<&Formula, InferError> {
        self.formulas
            .get(id.0)
            .ok_or_else(|| InferError::Internal(format!("dangling reference to formula {}", id.0)))
    }

    pub fn formulas(&self) -> &[Formula] {
        &self.formulas
    }

    /// Dereferences alias formulas down to a live arena entry.
    pub fn resolve(&self, id: FormulaId) -> Result<FormulaId, InferError> {
        let mut current = id;
        loop {
            match &self.get(current)?.kind {
                FormulaKind::Reference { target } => current = *target,
                _ => return Ok(current),
            }
        }
    }

    /// Inserts a formula under its canonical name, or returns the existing
    /// entry with that name. New formulas register themselves in the
    /// reverse-dependency sets of their operands.
    fn upsert(
        &mut self,
        name: String,
        kind: FormulaKind,
        domain: Vec<NodeId>,
        levels: Vec<usize>,
        operands: &[FormulaId],
    ) -> FormulaId {
        if let Some(&existing) = self.names.get(&name) {
            return existing;
        }
        let id = FormulaId(self.formulas.len());
        let size = levels.iter().product();
        self.names.insert(name.clone(), id);
        self.formulas.push(Formula {
            id,
            name,
            kind,
            domain,
            levels,
            size,
            referenced_by: Vec::new(),
        });
        for &operand in operands {
            let referenced_by = &mut self.formulas[operand.0].referenced_by;
            if !referenced_by.contains(&id) {
                referenced_by.push(id);
            }
        }
        id
    }

    /// The unit formula: empty domain, value 1.
    pub fn unit(&mut self) -> FormulaId {
        self.upsert("1".into(), FormulaKind::Unit, Vec::new(), Vec::new(), &[])
    }

    /// The leaf formula for one variable's local conditional distribution.
    /// `domain` must be `[node, parents...]` with the variable first.
    pub fn node_potential(
        &mut self,
        node: NodeId,
        domain: Vec<NodeId>,
        levels: Vec<usize>,
    ) -> FormulaId {
        self.upsert(
            format!("phi({})", node.0),
            FormulaKind::NodePotential { node },
            domain,
            levels,
            &[],
        )
    }

    /// The indicator formula carrying evidence for one variable. Created
    /// unrestricted; [`FormulaArena::set_evidence_levels`] mutates it.
    pub fn evidence_function(&mut self, node: NodeId, level_count: usize) -> FormulaId {
        self.upsert(
            format!("eps({})", node.0),
            FormulaKind::EvidenceFunction { node, levels: None },
            vec![node],
            vec![level_count],
            &[],
        )
    }

    /// Validates an alias target and collapses the alias: a reference is
    /// never stored, its live target stands in for it.
    pub fn reference(&self, target: FormulaId) -> Result<FormulaId, InferError> {
        self.resolve(target)
    }

    /// The join of the given factors.
    ///
    /// Duplicate factors and unit factors are dropped; a product of nothing
    /// is the unit formula and a product of one factor is that factor. The
    /// domain is the sorted union of the factor domains.
    pub fn product(&mut self, factors: Vec<FormulaId>) -> Result<FormulaId, InferError> {
        let mut distinct: Vec<FormulaId> = Vec::with_capacity(factors.len());
        for factor in factors {
            let factor = self.resolve(factor)?;
            if matches!(self.get(factor)?.kind, FormulaKind::Unit) {
                continue;
            }
            if !distinct.contains(&factor) {
                distinct.push(factor);
            }
        }
        match distinct.len() {
            0 => return Ok(self.unit()),
            1 => return Ok(distinct[0]),
            _ => {}
        }

        let mut domain: Vec<NodeId> = Vec::new();
        for factor in &distinct {
            for v in &self.get(*factor)?.domain {
                if !domain.contains(v) {
                    domain.push(*v);
                }
            }
        }
        domain.sort_unstable();
        let levels = self.domain_levels(&domain, &distinct)?;

        let mut sorted: Vec<usize> = distinct.iter().map(|f| f.0).collect();
        sorted.sort_unstable();
        let name = format!(
            "prod({})",
            sorted
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let operands = distinct.clone();
        Ok(self.upsert(
            name,
            FormulaKind::Product { factors: distinct },
            domain,
            levels,
            &operands,
        ))
    }

    /// The marginal of `inner` onto the kept variables.
    ///
    /// The kept domain preserves the order of `keep` filtered to the inner
    /// domain, so a marginal can express a pure permutation. Keeping the
    /// inner domain exactly (same variables, same order) collapses to the
    /// inner formula itself.
    pub fn marginal(&mut self, keep: &[NodeId], inner: FormulaId) -> Result<FormulaId, InferError> {
        let inner = self.resolve(inner)?;
        let inner_formula = self.get(inner)?;
        let mut kept: Vec<NodeId> = Vec::new();
        for v in keep {
            if inner_formula.domain.contains(v) && !kept.contains(v) {
                kept.push(*v);
            }
        }
        if kept == inner_formula.domain {
            return Ok(inner);
        }
        let levels: Vec<usize> = kept
            .iter()
            .map(|v| {
                let position = inner_formula
                    .domain
                    .iter()
                    .position(|d| d == v)
                    .unwrap_or_default();
                inner_formula.levels[position]
            })
            .collect();
        let name = format!(
            "marg({}|{})",
            kept.iter()
                .map(|v| v.0.to_string())
                .collect::<Vec<_>>()
                .join(","),
            inner.0
        );
        Ok(self.upsert(
            name,
            FormulaKind::Marginal { inner },
            kept,
            levels,
            &[inner],
        ))
    }

    /// Replaces the level filter of an evidence function. Returns whether the
    /// filter actually changed, so the caller knows whether to invalidate.
    pub fn set_evidence_levels(
        &mut self,
        id: FormulaId,
        new_levels: Option<Vec<usize>>,
    ) -> Result<bool, InferError> {
        let formula = self
            .formulas
            .get_mut(id.0)
            .ok_or_else(|| InferError::Internal(format!("dangling reference to formula {}", id.0)))?;
        match &mut formula.kind {
            FormulaKind::EvidenceFunction { levels, .. } => {
                if *levels == new_levels {
                    Ok(false)
                } else {
                    *levels = new_levels;
                    Ok(true)
                }
            }
            _ => Err(InferError::Internal(format!(
                "formula {} is not an evidence function",
                id.0
            ))),
        }
    }

    /// Current level filter of an evidence function.
    pub fn evidence_levels(&self, id: FormulaId) -> Result<Option<&Vec<usize>>, InferError> {
        match &self.get(id)?.kind {
            FormulaKind::EvidenceFunction { levels, .. } => Ok(levels.as_ref()),
            _ => Err(InferError::Internal(format!(
                "formula {} is not an evidence function",
                id.0
            ))),
        }
    }

    /// Level count of each domain variable, looked up from the first factor
    /// whose domain mentions it.
    fn domain_levels(
        &self,
        domain: &[NodeId],
        factors: &[FormulaId],
    ) -> Result<Vec<usize>, InferError> {
        domain
            .iter()
            .map(|v| {
                for factor in factors {
                    let f = self.get(*factor)?;
                    if let Some(position) = f.domain.iter().position(|d| d == v) {
                        return Ok(f.levels[position]);
                    }
                }
                Err(InferError::Internal(format!(
                    "no factor carries the level count of variable {}",
                    v.0
                )))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut FormulaArena, node: usize, levels: Vec<usize>) -> FormulaId {
        let domain = (node..node + levels.len()).map(NodeId).collect();
        arena.node_potential(NodeId(node), domain, levels)
    }

    #[test]
    fn upsert_deduplicates_structurally_identical_formulas() {
        let mut arena = FormulaArena::new();
        let a = leaf(&mut arena, 0, vec![2]);
        let b = leaf(&mut arena, 1, vec![3]);
        let p1 = arena.product(vec![a, b]).unwrap();
        let p2 = arena.product(vec![b, a]).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn product_drops_units_and_collapses_singletons() {
        let mut arena = FormulaArena::new();
        let unit = arena.unit();
        let a = leaf(&mut arena, 0, vec![2]);
        assert_eq!(arena.product(vec![unit, a]).unwrap(), a);
        assert_eq!(arena.product(vec![]).unwrap(), unit);
        assert_eq!(arena.product(vec![a, a]).unwrap(), a);
    }

    #[test]
    fn product_domain_is_the_sorted_union() {
        let mut arena = FormulaArena::new();
        let b = leaf(&mut arena, 1, vec![3]);
        let a = leaf(&mut arena, 0, vec![2]);
        let p = arena.product(vec![b, a]).unwrap();
        let formula = arena.get(p).unwrap();
        assert_eq!(formula.domain, vec![NodeId(0), NodeId(1)]);
        assert_eq!(formula.levels, vec![2, 3]);
        assert_eq!(formula.size, 6);
    }

    #[test]
    fn marginal_onto_the_full_domain_collapses_to_the_inner_formula() {
        let mut arena = FormulaArena::new();
        let a = leaf(&mut arena, 0, vec![2, 3]);
        let collapsed = arena.marginal(&[NodeId(0), NodeId(1)], a).unwrap();
        assert_eq!(collapsed, a);
        // A reordering of the same variables is a distinct (permuting)
        // formula.
        let permuted = arena.marginal(&[NodeId(1), NodeId(0)], a).unwrap();
        assert_ne!(permuted, a);
    }

    #[test]
    fn operands_record_their_consumers() {
        let mut arena = FormulaArena::new();
        let a = leaf(&mut arena, 0, vec![2]);
        let b = leaf(&mut arena, 1, vec![3]);
        let p = arena.product(vec![a, b]).unwrap();
        let m = arena.marginal(&[NodeId(1)], p).unwrap();
        assert!(arena.get(a).unwrap().referenced_by.contains(&p));
        assert!(arena.get(b).unwrap().referenced_by.contains(&p));
        assert!(arena.get(p).unwrap().referenced_by.contains(&m));
    }

    #[test]
    fn dangling_ids_fail_fast() {
        let arena = FormulaArena::new();
        assert!(arena.get(FormulaId(4)).is_err());
        assert!(arena.reference(FormulaId(4)).is_err());
    }

    #[test]
    fn evidence_levels_mutate_in_place() {
        let mut arena = FormulaArena::new();
        let e = arena.evidence_function(NodeId(0), 3);
        assert!(arena.set_evidence_levels(e, Some(vec![1])).unwrap());
        assert!(!arena.set_evidence_levels(e, Some(vec![1])).unwrap());
        assert_eq!(arena.evidence_levels(e).unwrap(), Some(&vec![1]));
        assert!(arena.set_evidence_levels(e, None).unwrap());
        assert_eq!(arena.evidence_levels(e).unwrap(), None);
    }
}
