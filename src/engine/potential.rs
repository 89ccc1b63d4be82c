//! Pure potential algebra over flattened combinatorial arrays.
//!
//! A potential is a flat vector of non-negative reals over an ordered domain
//! of discrete variables. Index `i` decodes to a combination via mixed-radix
//! decomposition where the first domain position is the most significant
//! digit (varies slowest). Every combination/index routine in the crate uses
//! this convention; it determines the block structure of conditional
//! distributions (the block size of a head variable is the product of the
//! level counts of all following positions).
//!
//! The two primitives here, [`evaluate_product`] and [`evaluate_marginal`],
//! are stateless. They also serve the compacted ("restricted") evaluation
//! mode of the event-probability fast path: restricted potentials are dense
//! row-major arrays over reduced radices, so the same kernels apply with the
//! reduced level counts passed in.

use smallvec::SmallVec;

use crate::engine::errors::InferError;
use crate::engine::graph::NodeId;

/// A flat potential over an ordered variable domain.
pub type Potential = Vec<f64>;

/// Per-row combination buffer; networks rarely have cliques wider than this.
pub type Combination = SmallVec<[usize; 8]>;

/// Compensated (Kahan) summation.
///
/// Long chains of marginalizations sum many near-equal small values; naive
/// accumulation loses low-order bits to cancellation.
pub fn kahan_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut total = 0.0;
    let mut compensation = 0.0;
    for x in values {
        let y = x - compensation;
        let t = total + y;
        compensation = (t - total) - y;
        total = t;
    }
    total
}

/// Decodes a flat index into a combination, most significant digit first.
pub fn index_to_combination(index: usize, levels: &[usize]) -> Combination {
    let mut combo: Combination = SmallVec::from_elem(0, levels.len());
    let mut rest = index;
    for position in (0..levels.len()).rev() {
        combo[position] = rest % levels[position];
        rest /= levels[position];
    }
    combo
}

/// Encodes a combination into a flat index, most significant digit first.
pub fn combination_to_index(combination: &[usize], levels: &[usize]) -> usize {
    let mut index = 0;
    for (value, count) in combination.iter().zip(levels) {
        index = index * count + value;
    }
    index
}

/// Positions of each element of `inner` within `outer`.
///
/// Fails when `inner` mentions a variable that `outer` lacks; the callers
/// construct output domains as unions/subsets, so a miss is a construction
/// bug rather than a user error.
fn domain_positions(inner: &[NodeId], outer: &[NodeId]) -> Result<Combination, InferError> {
    inner
        .iter()
        .map(|v| {
            outer.iter().position(|o| o == v).ok_or_else(|| {
                InferError::Internal(format!(
                    "variable {} is missing from the target domain",
                    v.0
                ))
            })
        })
        .collect()
}

/// Computes the product of factor potentials over a target domain.
///
/// Each output index is decoded into a combination, every factor's
/// sub-combination is projected out and converted back to that factor's
/// index, and the factor values are multiplied. The degenerate zero-factor
/// product is the unit potential (a single 1 over the empty domain).
///
/// When `normalize` is set the result is scaled to total mass one; a zero
/// total leaves the values as computed so that contradictory evidence
/// propagates as an all-zero potential instead of NaN.
pub fn evaluate_product(
    factors: &[&[f64]],
    factor_domains: &[&[NodeId]],
    factor_levels: &[&[usize]],
    domain: &[NodeId],
    levels: &[usize],
    size: usize,
    normalize: bool,
) -> Result<Potential, InferError> {
    if factors.is_empty() {
        return Ok(vec![1.0]);
    }

    let positions: Vec<Combination> = factor_domains
        .iter()
        .map(|fd| domain_positions(fd, domain))
        .collect::<Result<_, _>>()?;

    let mut result = Vec::with_capacity(size);
    let mut sub: Combination = SmallVec::new();
    for index in 0..size {
        let combo = index_to_combination(index, levels);
        let mut value = 1.0;
        for (factor, (map, factor_levels)) in
            factors.iter().zip(positions.iter().zip(factor_levels))
        {
            sub.clear();
            sub.extend(map.iter().map(|&p| combo[p]));
            value *= factor[combination_to_index(&sub, factor_levels)];
        }
        result.push(value);
    }

    if normalize {
        normalize_in_place(&mut result);
    }
    Ok(result)
}

/// Marginalizes a potential onto a kept sub-domain.
///
/// Every inner value is accumulated into the output slot addressed by the
/// projection of its combination onto the kept domain. The kept domain may
/// be a permutation of the inner domain, in which case this is a pure
/// reindexing. Accumulation is compensated per output slot.
pub fn evaluate_marginal(
    inner: &[f64],
    inner_domain: &[NodeId],
    inner_levels: &[usize],
    domain: &[NodeId],
    levels: &[usize],
    size: usize,
    normalize: bool,
) -> Result<Potential, InferError> {
    let positions = domain_positions(domain, inner_domain)?;

    let mut result = vec![0.0; size];
    let mut compensation = vec![0.0; size];
    let mut kept: Combination = SmallVec::new();
    for (index, &value) in inner.iter().enumerate() {
        let combo = index_to_combination(index, inner_levels);
        kept.clear();
        kept.extend(positions.iter().map(|&p| combo[p]));
        let slot = combination_to_index(&kept, levels);
        let y = value - compensation[slot];
        let t = result[slot] + y;
        compensation[slot] = (t - result[slot]) - y;
        result[slot] = t;
    }

    if normalize {
        normalize_in_place(&mut result);
    }
    Ok(result)
}

/// Scales a potential to total mass one, skipping all-zero potentials.
pub fn normalize_in_place(potential: &mut [f64]) {
    let total = kahan_sum(potential.iter().copied());
    if total != 0.0 {
        for value in potential.iter_mut() {
            *value /= total;
        }
    }
}

/// Normalizes a joint over `[heads..., parents...]` per parent combination.
///
/// With heads most significant, the rows of one parent combination form a
/// strided block `{h * parent_size + p : h}`. Blocks with zero mass are left
/// untouched; an impossible parent combination stays identically zero.
pub fn normalize_conditional(potential: &mut [f64], parent_size: usize) {
    if parent_size == 0 {
        return;
    }
    let head_size = potential.len() / parent_size;
    for p in 0..parent_size {
        let total = kahan_sum((0..head_size).map(|h| potential[h * parent_size + p]));
        if total != 0.0 {
            for h in 0..head_size {
                potential[h * parent_size + p] /= total;
            }
        }
    }
}

/// Filters out the rows of a potential whose variable assignments conflict
/// with a restriction map, producing a dense potential over the reduced
/// radices in the same index convention.
///
/// `restrictions` is indexed by variable id; `None` means unrestricted and a
/// sorted level list keeps only those levels. This does not correspond to an
/// operation of the potential algebra; it exists so the event-probability
/// path can avoid carrying rows that cannot contribute to the final sum.
pub fn compact_potential(
    potential: &[f64],
    domain: &[NodeId],
    levels: &[usize],
    restrictions: &[Option<Vec<usize>>],
) -> Potential {
    if domain.iter().all(|v| restrictions[v.0].is_none()) {
        return potential.to_vec();
    }
    potential
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            let combo = index_to_combination(*index, levels);
            combo.iter().zip(domain).all(|(&level, v)| {
                restrictions[v.0]
                    .as_ref()
                    .map_or(true, |kept| kept.contains(&level))
            })
        })
        .map(|(_, &value)| value)
        .collect()
}

/// Level counts of a domain after applying a restriction map.
pub fn restricted_levels(
    domain: &[NodeId],
    levels: &[usize],
    restrictions: &[Option<Vec<usize>>],
) -> Vec<usize> {
    domain
        .iter()
        .zip(levels)
        .map(|(v, &full)| restrictions[v.0].as_ref().map_or(full, |kept| kept.len()))
        .collect()
}
