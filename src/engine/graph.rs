//! Runtime records for variables, cliques and separators.
//!
//! The engine consumes junction-tree *construction* (triangulation, clique
//! discovery) as an external oracle: [`JunctionTreeSpec`] describes the
//! cliques, their adjacency and the separator variable sets, and this module
//! validates that description and lowers it, together with the network
//! definition, into dense, id-indexed records. Connected components and the
//! per-component root cliques are derived here from the adjacency.

use rustc_hash::FxHashMap;

use crate::engine::errors::InferError;
use crate::engine::formula::{FormulaArena, FormulaId};
use crate::model::{JunctionTreeSpec, NetworkSpec};

/// A unique identifier for a variable (node) of the Bayes network.
///
/// Implements `Ord` for stable, deterministic domain ordering.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub usize);

/// A unique identifier for a clique of the junction forest.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CliqueId(pub usize);

/// A unique identifier for a separator between adjacent cliques.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeparatorId(pub usize);

/// A variable of the network with its formula bindings.
///
/// Levels and parents are immutable after construction. The evidence-function
/// formula id is likewise immutable; only that formula's level filter mutates
/// when evidence changes.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Ordered outcome labels for this variable.
    pub levels: Vec<String>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    /// Cliques whose domain contains this variable.
    pub cliques: Vec<CliqueId>,
    /// Leaf formula holding the local conditional distribution, with domain
    /// `[self, parents...]` and this variable most significant.
    pub potential_formula: FormulaId,
    /// Per-variable indicator formula whose level filter carries evidence.
    pub evidence_formula: FormulaId,
    /// Posterior marginal formula, assigned during symbolic propagation.
    pub posterior_marginal: Option<FormulaId>,
}

impl Node {
    pub(crate) fn posterior_marginal_formula(&self) -> Result<FormulaId, InferError> {
        self.posterior_marginal.ok_or_else(|| {
            InferError::Internal(format!(
                "posterior marginal for variable {} has not been assigned",
                self.name
            ))
        })
    }

    /// Index of a level label, if the label names one of this variable's
    /// outcomes.
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }
}

/// A clique of the junction forest.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Clique {
    pub id: CliqueId,
    /// Sorted variable domain.
    pub domain: Vec<NodeId>,
    pub neighbors: Vec<CliqueId>,
    /// Separator toward each neighbor, parallel to `neighbors`.
    pub separators: Vec<SeparatorId>,
    /// Variables whose local distribution is assigned to this clique.
    pub factors: Vec<NodeId>,
    /// Product of the assigned local distributions (the unit formula when no
    /// factor is assigned).
    pub prior: FormulaId,
    /// Posterior formula, assigned after message passing.
    pub posterior: Option<FormulaId>,
    /// Non-unit message formulas received from each neighbor.
    pub messages_received: Vec<Vec<FormulaId>>,
    /// Connected component this clique belongs to.
    pub component: usize,
}

impl Clique {
    pub(crate) fn posterior_formula(&self) -> Result<FormulaId, InferError> {
        self.posterior.ok_or_else(|| {
            InferError::Internal(format!(
                "posterior for clique {} has not been assigned",
                self.id.0
            ))
        })
    }

    /// Separator toward the given neighbor.
    pub(crate) fn separator_toward(&self, neighbor: CliqueId) -> Result<SeparatorId, InferError> {
        self.neighbors
            .iter()
            .position(|&n| n == neighbor)
            .map(|i| self.separators[i])
            .ok_or_else(|| {
                InferError::Internal(format!(
                    "cliques {} and {} are not adjacent",
                    self.id.0, neighbor.0
                ))
            })
    }
}

/// The variable set shared by two adjacent cliques.
///
/// Edges sharing the same variable set share one separator record, and with
/// it one posterior formula.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Separator {
    pub id: SeparatorId,
    /// Sorted variable domain.
    pub domain: Vec<NodeId>,
    /// Cliques adjacent through this separator (at least two).
    pub cliques: Vec<CliqueId>,
    /// Posterior formula, assigned after message passing.
    pub posterior: Option<FormulaId>,
}

impl Separator {
    pub(crate) fn posterior_formula(&self) -> Result<FormulaId, InferError> {
        self.posterior.ok_or_else(|| {
            InferError::Internal(format!(
                "posterior for separator {} has not been assigned",
                self.id.0
            ))
        })
    }
}

/// Builds the node records and their leaf formulas from a network definition.
///
/// The node-potential formulas are allocated first (one per variable, in
/// declaration order), followed by the evidence-function formulas, matching
/// the arena layout the rest of construction assumes.
pub(crate) fn build_nodes(
    network: &NetworkSpec,
    arena: &mut FormulaArena,
) -> Result<Vec<Node>, InferError> {
    if network.variables.is_empty() {
        return Err(InferError::Validation(
            "cannot build an inference engine for a network with no variables".into(),
        ));
    }

    let mut name_to_id: FxHashMap<&str, NodeId> = FxHashMap::default();
    for (i, var) in network.variables.iter().enumerate() {
        if name_to_id.insert(var.name.as_str(), NodeId(i)).is_some() {
            return Err(InferError::Validation(format!(
                "variable {} is declared more than once",
                var.name
            )));
        }
        if var.levels.is_empty() {
            return Err(InferError::Validation(format!(
                "variable {} has no levels",
                var.name
            )));
        }
        for (j, level) in var.levels.iter().enumerate() {
            if var.levels[..j].contains(level) {
                return Err(InferError::Validation(format!(
                    "variable {} declares level {} more than once",
                    var.name, level
                )));
            }
        }
    }

    let mut nodes = Vec::with_capacity(network.variables.len());
    for (i, var) in network.variables.iter().enumerate() {
        let mut parents = Vec::with_capacity(var.parents.len());
        for parent in &var.parents {
            let &pid = name_to_id.get(parent.as_str()).ok_or_else(|| {
                InferError::Validation(format!(
                    "variable {} names unknown parent {}",
                    var.name, parent
                ))
            })?;
            if pid == NodeId(i) {
                return Err(InferError::Validation(format!(
                    "variable {} cannot be its own parent",
                    var.name
                )));
            }
            if parents.contains(&pid) {
                return Err(InferError::Validation(format!(
                    "variable {} names parent {} more than once",
                    var.name, parent
                )));
            }
            parents.push(pid);
        }

        // Domain [self, parents...] keeps the variable most significant, so
        // one parent combination occupies a strided block of rows.
        let mut domain = vec![NodeId(i)];
        domain.extend(parents.iter().copied());
        let levels: Vec<usize> = domain
            .iter()
            .map(|v| network.variables[v.0].levels.len())
            .collect();
        let potential_formula = arena.node_potential(NodeId(i), domain, levels);

        nodes.push(Node {
            id: NodeId(i),
            name: var.name.clone(),
            levels: var.levels.clone(),
            parents,
            children: Vec::new(),
            cliques: Vec::new(),
            potential_formula,
            evidence_formula: FormulaId(0),
            posterior_marginal: None,
        });
    }

    for i in 0..nodes.len() {
        let (id, parents) = (nodes[i].id, nodes[i].parents.clone());
        for pid in parents {
            nodes[pid.0].children.push(id);
        }
    }

    for node in nodes.iter_mut() {
        node.evidence_formula = arena.evidence_function(node.id, node.levels.len());
    }

    Ok(nodes)
}

/// Validates the junction-tree oracle input and lowers it into clique and
/// separator records, deriving connected components from the adjacency.
///
/// Each variable's local distribution is assigned as a factor to the first
/// clique that covers the variable together with all of its parents; a
/// network whose junction tree covers no such clique is rejected.
pub(crate) fn build_cliques(
    junction: &JunctionTreeSpec,
    nodes: &mut [Node],
    arena: &mut FormulaArena,
) -> Result<(Vec<Clique>, Vec<Separator>, Vec<Vec<CliqueId>>), InferError> {
    if junction.cliques.is_empty() {
        return Err(InferError::Validation(
            "the junction tree has no cliques".into(),
        ));
    }

    let name_to_id: FxHashMap<&str, NodeId> = nodes
        .iter()
        .map(|n| (n.name.as_str(), n.id))
        .collect();
    let resolve = |name: &str| -> Result<NodeId, InferError> {
        name_to_id.get(name).copied().ok_or_else(|| {
            InferError::Validation(format!(
                "the junction tree names unknown variable {}",
                name
            ))
        })
    };

    let mut domains: Vec<Vec<NodeId>> = Vec::with_capacity(junction.cliques.len());
    for (i, clique) in junction.cliques.iter().enumerate() {
        if clique.members.is_empty() {
            return Err(InferError::Validation(format!("clique {} is empty", i)));
        }
        let mut domain = clique
            .members
            .iter()
            .map(|m| resolve(m))
            .collect::<Result<Vec<_>, _>>()?;
        domain.sort_unstable();
        domain.dedup();
        if domain.len() != clique.members.len() {
            return Err(InferError::Validation(format!(
                "clique {} lists a variable more than once",
                i
            )));
        }
        domains.push(domain);
    }

    // Separator records are shared between edges with the same variable set.
    let mut separators: Vec<Separator> = Vec::new();
    let mut separator_ids: FxHashMap<Vec<NodeId>, SeparatorId> = FxHashMap::default();
    let mut neighbors: Vec<Vec<CliqueId>> = vec![Vec::new(); domains.len()];
    let mut edge_separators: Vec<Vec<SeparatorId>> = vec![Vec::new(); domains.len()];
    for edge in &junction.edges {
        let (a, b) = edge.cliques;
        if a == b || a >= domains.len() || b >= domains.len() {
            return Err(InferError::Validation(format!(
                "junction edge ({}, {}) does not join two distinct cliques",
                a, b
            )));
        }
        if neighbors[a].contains(&CliqueId(b)) {
            return Err(InferError::Validation(format!(
                "cliques {} and {} are joined by more than one edge",
                a, b
            )));
        }
        if edge.separator.is_empty() {
            return Err(InferError::Validation(format!(
                "the separator between cliques {} and {} is empty",
                a, b
            )));
        }
        let mut members = edge
            .separator
            .iter()
            .map(|m| resolve(m))
            .collect::<Result<Vec<_>, _>>()?;
        members.sort_unstable();
        members.dedup();
        for member in &members {
            if !domains[a].contains(member) || !domains[b].contains(member) {
                return Err(InferError::Validation(format!(
                    "separator variable {} is not shared by cliques {} and {}",
                    nodes[member.0].name, a, b
                )));
            }
        }
        let sep_id = *separator_ids.entry(members.clone()).or_insert_with(|| {
            let id = SeparatorId(separators.len());
            separators.push(Separator {
                id,
                domain: members,
                cliques: Vec::new(),
                posterior: None,
            });
            id
        });
        for &(src, dst) in &[(a, b), (b, a)] {
            neighbors[src].push(CliqueId(dst));
            edge_separators[src].push(sep_id);
            if !separators[sep_id.0].cliques.contains(&CliqueId(src)) {
                separators[sep_id.0].cliques.push(CliqueId(src));
            }
        }
    }

    // Connected components, in ascending clique order. The traversal also
    // rejects cycles: message passing is only defined on a forest.
    let mut component_of = vec![usize::MAX; domains.len()];
    let mut components: Vec<Vec<CliqueId>> = Vec::new();
    for start in 0..domains.len() {
        if component_of[start] != usize::MAX {
            continue;
        }
        let component = components.len();
        let mut members = Vec::new();
        let mut queue = vec![(start, usize::MAX)];
        component_of[start] = component;
        while let Some((clique, parent)) = queue.pop() {
            members.push(CliqueId(clique));
            for neighbor in &neighbors[clique] {
                if neighbor.0 == parent {
                    continue;
                }
                if component_of[neighbor.0] != usize::MAX {
                    return Err(InferError::Validation(
                        "the junction graph contains a cycle".into(),
                    ));
                }
                component_of[neighbor.0] = component;
                queue.push((neighbor.0, clique));
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    // Assign each variable's local distribution to the first clique covering
    // the variable together with its parents.
    let mut factors: Vec<Vec<NodeId>> = vec![Vec::new(); domains.len()];
    for node in nodes.iter() {
        let family: Vec<NodeId> = std::iter::once(node.id)
            .chain(node.parents.iter().copied())
            .collect();
        let home = domains
            .iter()
            .position(|d| family.iter().all(|v| d.contains(v)))
            .ok_or_else(|| {
                InferError::Validation(format!(
                    "no clique covers variable {} together with its parents",
                    node.name
                ))
            })?;
        factors[home].push(node.id);
    }

    let mut cliques = Vec::with_capacity(domains.len());
    for (i, domain) in domains.into_iter().enumerate() {
        for v in &domain {
            nodes[v.0].cliques.push(CliqueId(i));
        }
        let prior = if factors[i].is_empty() {
            arena.unit()
        } else {
            let factor_formulas: Vec<FormulaId> = factors[i]
                .iter()
                .map(|v| nodes[v.0].potential_formula)
                .collect();
            arena.product(factor_formulas)?
        };
        cliques.push(Clique {
            id: CliqueId(i),
            domain,
            neighbors: std::mem::take(&mut neighbors[i]),
            separators: std::mem::take(&mut edge_separators[i]),
            factors: std::mem::take(&mut factors[i]),
            prior,
            posterior: None,
            messages_received: Vec::new(),
            component: component_of[i],
        });
    }

    // Every variable must live in at least one clique, or it could never be
    // queried.
    for node in nodes.iter() {
        if node.cliques.is_empty() {
            return Err(InferError::Validation(format!(
                "variable {} does not occur in any clique",
                node.name
            )));
        }
    }

    Ok((cliques, separators, components))
}

/// Chooses the clique from which to begin a traversal of the junction
/// forest: the clique containing the most join-domain variables, breaking
/// ties by smaller posterior size, then fewer neighbors, then smaller id.
pub(crate) fn pick_root_clique<'a, I>(
    cliques: I,
    join_domain: &[NodeId],
    arena: &FormulaArena,
) -> Result<CliqueId, InferError>
where
    I: IntoIterator<Item = &'a Clique>,
{
    let mut best: Option<(&Clique, usize, usize)> = None;
    for clique in cliques {
        let members = clique
            .domain
            .iter()
            .filter(|v| join_domain.contains(v))
            .count();
        let size = arena.get(clique.posterior_formula()?)?.size;
        let better = match &best {
            None => true,
            Some((current, current_members, current_size)) => {
                members > *current_members
                    || (members == *current_members
                        && (size < *current_size
                            || (size == *current_size
                                && (clique.neighbors.len() < current.neighbors.len()
                                    || (clique.neighbors.len() == current.neighbors.len()
                                        && clique.id < current.id)))))
            }
        };
        if better {
            best = Some((clique, members, size));
        }
    }
    best.map(|(clique, _, _)| clique.id)
        .ok_or_else(|| InferError::Internal("cannot pick a root among zero cliques".into()))
}
