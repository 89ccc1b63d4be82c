//! Joint and conditional distributions over named variables.
//!
//! A [`Distribution`] pairs an ordered list of head variables (and optional
//! parent variables) with a flat potential over `[heads..., parents...]` in
//! the crate-wide index convention: the first position is the most
//! significant digit. For a conditional distribution the rows of one parent
//! combination therefore form a strided block, and each such block sums to
//! one unless the parent combination itself is impossible.

use std::collections::HashMap;

use crate::engine::errors::InferError;
use crate::engine::potential::{index_to_combination, kahan_sum, Potential};
use crate::model::network::{CptRow, CptSpec};

/// A named variable with its ordered outcome levels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub name: String,
    pub levels: Vec<String>,
}

impl Variable {
    pub fn new<N, L, I>(name: N, levels: I) -> Self
    where
        N: Into<String>,
        L: Into<String>,
        I: IntoIterator<Item = L>,
    {
        Variable {
            name: name.into(),
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }
}

/// A (possibly conditional) distribution over discrete variables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Distribution {
    heads: Vec<Variable>,
    parents: Vec<Variable>,
    potential: Potential,
}

impl Distribution {
    /// Creates a distribution over the given variables.
    ///
    /// The potential length must equal the product of all level counts, and
    /// the variable names (heads and parents together) must be distinct.
    pub fn new(
        heads: Vec<Variable>,
        parents: Vec<Variable>,
        potential: Potential,
    ) -> Result<Self, InferError> {
        if heads.is_empty() {
            return Err(InferError::Validation(
                "a distribution requires at least one head variable".into(),
            ));
        }
        let mut seen: Vec<&str> = Vec::new();
        for variable in heads.iter().chain(&parents) {
            if variable.levels.is_empty() {
                return Err(InferError::Validation(format!(
                    "variable {} has no levels",
                    variable.name
                )));
            }
            if seen.contains(&variable.name.as_str()) {
                return Err(InferError::Validation(format!(
                    "variable {} occurs more than once in the distribution",
                    variable.name
                )));
            }
            seen.push(&variable.name);
        }
        let size: usize = heads
            .iter()
            .chain(&parents)
            .map(|v| v.levels.len())
            .product();
        if potential.len() != size {
            return Err(InferError::Validation(format!(
                "the potential has {} entries but the domain has {} combinations",
                potential.len(),
                size
            )));
        }
        Ok(Distribution {
            heads,
            parents,
            potential,
        })
    }

    /// Builds a variable's local distribution from a conditional probability
    /// table. Combinations not covered by the table are left at zero.
    pub fn from_cpt(
        name: &str,
        levels: &[String],
        parents: &[Variable],
        cpt: &CptSpec,
    ) -> Result<Self, InferError> {
        let head = Variable {
            name: name.to_string(),
            levels: levels.to_vec(),
        };
        let parent_size: usize = parents.iter().map(|p| p.levels.len()).product();
        let mut potential = vec![0.0; levels.len() * parent_size];

        let head_index = |level: &str| -> Result<usize, InferError> {
            levels.iter().position(|l| l == level).ok_or_else(|| {
                InferError::Validation(format!("{} is not a level of variable {}", level, name))
            })
        };

        match cpt {
            CptSpec::Unconditioned(entries) => {
                if !parents.is_empty() {
                    return Err(InferError::Validation(format!(
                        "variable {} has parents but an unconditioned table",
                        name
                    )));
                }
                for (level, probability) in entries {
                    potential[head_index(level)?] = *probability;
                }
            }
            CptSpec::Conditioned(rows) => {
                if parents.is_empty() {
                    return Err(InferError::Validation(format!(
                        "variable {} has no parents but a conditioned table",
                        name
                    )));
                }
                for row in rows {
                    let offset = parent_combination(parents, row)?;
                    for (level, probability) in &row.then {
                        potential[head_index(level)? * parent_size + offset] = *probability;
                    }
                }
            }
        }
        Distribution::new(vec![head], parents.to_vec(), potential)
    }

    pub fn head_variables(&self) -> &[Variable] {
        &self.heads
    }

    pub fn parent_variables(&self) -> &[Variable] {
        &self.parents
    }

    pub fn potential(&self) -> &[f64] {
        &self.potential
    }

    /// Level counts over the full domain, heads first.
    pub fn level_counts(&self) -> Vec<usize> {
        self.heads
            .iter()
            .chain(&self.parents)
            .map(|v| v.levels.len())
            .collect()
    }

    /// The cumulative mass of all rows consistent with an event.
    ///
    /// Each event entry restricts one variable to a set of levels; variables
    /// absent from the event are unrestricted. An event naming a variable
    /// outside the domain, or restricting a variable to levels it does not
    /// have, has probability zero. The empty event sums the whole potential.
    pub fn infer(&self, event: &HashMap<String, Vec<String>>) -> f64 {
        let variables: Vec<&Variable> = self.heads.iter().chain(&self.parents).collect();
        let mut allowed: Vec<Option<Vec<usize>>> = vec![None; variables.len()];
        for (name, levels) in event {
            let Some(position) = variables.iter().position(|v| &v.name == name) else {
                return 0.0;
            };
            let indexes: Vec<usize> = levels
                .iter()
                .filter_map(|l| variables[position].levels.iter().position(|x| x == l))
                .collect();
            if indexes.is_empty() {
                return 0.0;
            }
            allowed[position] = Some(indexes);
        }
        let counts = self.level_counts();
        kahan_sum(self.potential.iter().enumerate().filter_map(|(i, &p)| {
            let combo = index_to_combination(i, &counts);
            let consistent = combo.iter().zip(&allowed).all(|(level, restriction)| {
                restriction.as_ref().map_or(true, |ls| ls.contains(level))
            });
            consistent.then_some(p)
        }))
    }
}

/// Index of the parent combination a table row describes, with the first
/// parent most significant.
fn parent_combination(parents: &[Variable], row: &CptRow) -> Result<usize, InferError> {
    let mut index = 0;
    for parent in parents {
        let level = row.when.get(&parent.name).ok_or_else(|| {
            InferError::Validation(format!(
                "a table row does not name parent {}",
                parent.name
            ))
        })?;
        let position = parent.levels.iter().position(|l| l == level).ok_or_else(|| {
            InferError::Validation(format!(
                "{} is not a level of parent {}",
                level, parent.name
            ))
        })?;
        index = index * parent.levels.len() + position;
    }
    for named in row.when.keys() {
        if !parents.iter().any(|p| &p.name == named) {
            return Err(InferError::Validation(format!(
                "a table row names {} which is not a parent",
                named
            )));
        }
    }
    Ok(index)
}
