//! User-facing description of a discrete Bayesian network.
//!
//! A network is an ordered list of variable definitions; the declaration
//! order fixes the dense integer ids the engine works with. Each variable
//! carries its outcome levels, its parents, and one of several forms of
//! local distribution: a conditional probability table, a prepared
//! [`Distribution`](crate::model::Distribution), or a raw potential. A
//! variable with none of these starts out uniform.

use std::collections::HashMap;

use crate::model::Distribution;

/// A conditional probability table in one of its two user-facing shapes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CptSpec {
    /// Level → probability, for a variable without parents.
    Unconditioned(HashMap<String, f64>),
    /// One row per parent combination, for a variable with parents.
    Conditioned(Vec<CptRow>),
}

impl CptSpec {
    /// Builds an unconditioned table from `(level, probability)` pairs.
    pub fn root<L: Into<String>, I: IntoIterator<Item = (L, f64)>>(entries: I) -> Self {
        CptSpec::Unconditioned(entries.into_iter().map(|(l, p)| (l.into(), p)).collect())
    }
}

/// One row of a conditioned table: the parent combination it applies to and
/// the probability of each level under that combination.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CptRow {
    /// Parent variable → level label.
    pub when: HashMap<String, String>,
    /// Level label → probability.
    pub then: HashMap<String, f64>,
}

impl CptRow {
    pub fn new(when: &[(&str, &str)], then: &[(&str, f64)]) -> Self {
        CptRow {
            when: when
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            then: then.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

/// Definition of one network variable.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableDef {
    pub name: String,
    /// Ordered outcome labels.
    pub levels: Vec<String>,
    /// Parent variable names.
    pub parents: Vec<String>,
    /// Local distribution as a conditional probability table.
    pub cpt: Option<CptSpec>,
    /// Local distribution as a prepared distribution object.
    pub distribution: Option<Distribution>,
    /// Local distribution as a raw potential over `[self, parents...]`.
    pub potential: Option<Vec<f64>>,
}

impl VariableDef {
    pub fn new<N, L, I>(name: N, levels: I) -> Self
    where
        N: Into<String>,
        L: Into<String>,
        I: IntoIterator<Item = L>,
    {
        VariableDef {
            name: name.into(),
            levels: levels.into_iter().map(Into::into).collect(),
            ..VariableDef::default()
        }
    }

    pub fn with_parents<P: Into<String>, I: IntoIterator<Item = P>>(mut self, parents: I) -> Self {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cpt(mut self, cpt: CptSpec) -> Self {
        self.cpt = Some(cpt);
        self
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn with_potential(mut self, potential: Vec<f64>) -> Self {
        self.potential = Some(potential);
        self
    }
}

/// An ordered collection of variable definitions.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkSpec {
    pub variables: Vec<VariableDef>,
}

impl NetworkSpec {
    pub fn new() -> Self {
        NetworkSpec::default()
    }

    /// Appends a variable definition, chaining-style.
    pub fn variable(mut self, def: VariableDef) -> Self {
        self.variables.push(def);
        self
    }

    pub fn find(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Junction-tree oracle input: the cliques of the triangulated network and
/// the separator sets along the tree edges.
///
/// Building this structure (moralization, triangulation, clique discovery)
/// is the job of an external collaborator; the engine validates it and
/// consumes it as given. Connected components are derived from the edges, so
/// a junction *forest* is described simply by leaving components unlinked.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JunctionTreeSpec {
    pub cliques: Vec<CliqueSpec>,
    pub edges: Vec<JunctionEdgeSpec>,
}

impl JunctionTreeSpec {
    pub fn new() -> Self {
        JunctionTreeSpec::default()
    }

    /// Appends a clique over the named variables, chaining-style.
    pub fn clique<M: Into<String>, I: IntoIterator<Item = M>>(mut self, members: I) -> Self {
        self.cliques.push(CliqueSpec {
            members: members.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Joins cliques `a` and `b` (by position) through the given separator
    /// variables, chaining-style.
    pub fn edge<M: Into<String>, I: IntoIterator<Item = M>>(
        mut self,
        a: usize,
        b: usize,
        separator: I,
    ) -> Self {
        self.edges.push(JunctionEdgeSpec {
            cliques: (a, b),
            separator: separator.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// One clique, by variable names.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CliqueSpec {
    pub members: Vec<String>,
}

/// One junction-tree edge with its separator variable set.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JunctionEdgeSpec {
    /// Positions of the two adjacent cliques in the clique list.
    pub cliques: (usize, usize),
    pub separator: Vec<String>,
}
