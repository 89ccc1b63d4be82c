//! Shared fixtures and a brute-force reference evaluator.
//!
//! The reference evaluator computes event probabilities by enumerating the
//! full joint (the product of every variable's table row), which is a
//! substantially different computation from junction-tree propagation and
//! therefore a meaningful cross-check.

#![allow(dead_code)]

use std::collections::HashMap;

use juncture::{CptRow, CptSpec, Event, JunctionTreeSpec, NetworkSpec, VariableDef};

/// Builds an event from name/levels pairs.
pub fn ev(pairs: &[(&str, &[&str])]) -> Event {
    pairs
        .iter()
        .map(|(name, levels)| {
            (
                name.to_string(),
                levels.iter().map(|l| l.to_string()).collect(),
            )
        })
        .collect()
}

/// Relative-tolerance comparison for probabilities.
pub fn assert_close(observed: f64, expected: f64) {
    let difference = (observed - expected).abs();
    if difference == 0.0 {
        return;
    }
    let relative = 2.0 * difference / (observed.abs() + expected.abs());
    assert!(
        relative < 1e-6 || difference < 1e-12,
        "observed {} but expected {}",
        observed,
        expected
    );
}

/// A single coin, one clique.
pub fn coin() -> (NetworkSpec, JunctionTreeSpec) {
    let network = NetworkSpec::new().variable(
        VariableDef::new("COIN", ["HEADS", "TAILS"])
            .with_cpt(CptSpec::root([("HEADS", 0.5), ("TAILS", 0.5)])),
    );
    let junction = JunctionTreeSpec::new().clique(["COIN"]);
    (network, junction)
}

/// The coin/win chain: P(WIN=TRUE|HEADS) = 1, P(WIN=TRUE|TAILS) = 0.
pub fn coin_win() -> (NetworkSpec, JunctionTreeSpec) {
    let network = NetworkSpec::new()
        .variable(
            VariableDef::new("COIN", ["HEADS", "TAILS"])
                .with_cpt(CptSpec::root([("HEADS", 0.5), ("TAILS", 0.5)])),
        )
        .variable(
            VariableDef::new("WIN", ["TRUE", "FALSE"])
                .with_parents(["COIN"])
                .with_cpt(CptSpec::Conditioned(vec![
                    CptRow::new(&[("COIN", "HEADS")], &[("TRUE", 1.0), ("FALSE", 0.0)]),
                    CptRow::new(&[("COIN", "TAILS")], &[("TRUE", 0.0), ("FALSE", 1.0)]),
                ])),
        );
    let junction = JunctionTreeSpec::new().clique(["COIN", "WIN"]);
    (network, junction)
}

/// Two independent coins: a junction forest with two components.
pub fn two_coins() -> (NetworkSpec, JunctionTreeSpec) {
    let coin = |name: &str| {
        VariableDef::new(name, ["HEADS", "TAILS"])
            .with_cpt(CptSpec::root([("HEADS", 0.5), ("TAILS", 0.5)]))
    };
    let network = NetworkSpec::new().variable(coin("COIN")).variable(coin("COIN2"));
    let junction = JunctionTreeSpec::new().clique(["COIN"]).clique(["COIN2"]);
    (network, junction)
}

/// The rain/sprinkler/grass-wet network; its moral graph is one clique.
pub fn sprinkler() -> (NetworkSpec, JunctionTreeSpec) {
    let network = NetworkSpec::new()
        .variable(
            VariableDef::new("RAIN", ["T", "F"])
                .with_cpt(CptSpec::root([("T", 0.2), ("F", 0.8)])),
        )
        .variable(
            VariableDef::new("SPRINKLER", ["T", "F"])
                .with_parents(["RAIN"])
                .with_cpt(CptSpec::Conditioned(vec![
                    CptRow::new(&[("RAIN", "T")], &[("T", 0.01), ("F", 0.99)]),
                    CptRow::new(&[("RAIN", "F")], &[("T", 0.4), ("F", 0.6)]),
                ])),
        )
        .variable(
            VariableDef::new("GRASS_WET", ["T", "F"])
                .with_parents(["RAIN", "SPRINKLER"])
                .with_cpt(CptSpec::Conditioned(vec![
                    CptRow::new(
                        &[("RAIN", "T"), ("SPRINKLER", "T")],
                        &[("T", 0.99), ("F", 0.01)],
                    ),
                    CptRow::new(
                        &[("RAIN", "T"), ("SPRINKLER", "F")],
                        &[("T", 0.8), ("F", 0.2)],
                    ),
                    CptRow::new(
                        &[("RAIN", "F"), ("SPRINKLER", "T")],
                        &[("T", 0.9), ("F", 0.1)],
                    ),
                    CptRow::new(
                        &[("RAIN", "F"), ("SPRINKLER", "F")],
                        &[("T", 0.0), ("F", 1.0)],
                    ),
                ])),
        );
    let junction = JunctionTreeSpec::new().clique(["RAIN", "SPRINKLER", "GRASS_WET"]);
    (network, junction)
}

/// A five-variable chain A→B→C→D→E over four cliques, so joins between the
/// ends of the chain cross every separator.
pub fn chain5() -> (NetworkSpec, JunctionTreeSpec) {
    let conditioned = |name: &str, parent: &str, pt: f64, pf: f64| {
        VariableDef::new(name, ["T", "F"])
            .with_parents([parent])
            .with_cpt(CptSpec::Conditioned(vec![
                CptRow::new(&[(parent, "T")], &[("T", pt), ("F", 1.0 - pt)]),
                CptRow::new(&[(parent, "F")], &[("T", pf), ("F", 1.0 - pf)]),
            ]))
    };
    let network = NetworkSpec::new()
        .variable(
            VariableDef::new("A", ["T", "F"]).with_cpt(CptSpec::root([("T", 0.3), ("F", 0.7)])),
        )
        .variable(conditioned("B", "A", 0.7, 0.2))
        .variable(conditioned("C", "B", 0.6, 0.3))
        .variable(conditioned("D", "C", 0.9, 0.4))
        .variable(conditioned("E", "D", 0.25, 0.75));
    let junction = JunctionTreeSpec::new()
        .clique(["A", "B"])
        .clique(["B", "C"])
        .clique(["C", "D"])
        .clique(["D", "E"])
        .edge(0, 1, ["B"])
        .edge(1, 2, ["C"])
        .edge(2, 3, ["D"]);
    (network, junction)
}

/// Brute-force reference: the full joint by enumeration.
pub struct BruteForce {
    names: Vec<String>,
    levels: Vec<Vec<String>>,
    rows: Vec<(Vec<usize>, f64)>,
}

impl BruteForce {
    pub fn new(network: &NetworkSpec) -> Self {
        let names: Vec<String> = network.variables.iter().map(|v| v.name.clone()).collect();
        let levels: Vec<Vec<String>> =
            network.variables.iter().map(|v| v.levels.clone()).collect();
        let total: usize = levels.iter().map(|l| l.len()).product();

        let mut rows = Vec::with_capacity(total);
        for index in 0..total {
            let mut assignment = vec![0; names.len()];
            let mut rest = index;
            for position in (0..names.len()).rev() {
                assignment[position] = rest % levels[position].len();
                rest /= levels[position].len();
            }
            let mut probability = 1.0;
            for (position, def) in network.variables.iter().enumerate() {
                probability *= local_probability(def, &names, &levels, &assignment, position);
            }
            rows.push((assignment, probability));
        }
        BruteForce {
            names,
            levels,
            rows,
        }
    }

    fn consistent(&self, assignment: &[usize], restriction: &Event) -> Option<bool> {
        for (name, allowed) in restriction {
            let position = self.names.iter().position(|n| n == name)?;
            let label = &self.levels[position][assignment[position]];
            if !allowed.contains(label) {
                return Some(false);
            }
        }
        Some(true)
    }

    /// P(event | evidence) by filtering and summing joint rows.
    pub fn probability(&self, event: &Event, evidence: &Event) -> f64 {
        let mass = |restrictions: &[&Event]| -> f64 {
            self.rows
                .iter()
                .filter(|(assignment, _)| {
                    restrictions
                        .iter()
                        .all(|r| self.consistent(assignment, r).unwrap_or(false))
                })
                .map(|(_, p)| p)
                .sum()
        };
        let numerator = mass(&[event, evidence]);
        if evidence.is_empty() {
            return numerator;
        }
        let denominator = mass(&[evidence]);
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }
}

fn local_probability(
    def: &VariableDef,
    names: &[String],
    levels: &[Vec<String>],
    assignment: &[usize],
    position: usize,
) -> f64 {
    let level = &levels[position][assignment[position]];
    match def.cpt.as_ref() {
        Some(CptSpec::Unconditioned(entries)) => entries.get(level).copied().unwrap_or(0.0),
        Some(CptSpec::Conditioned(rows)) => {
            let parent_assignment: HashMap<&str, &str> = def
                .parents
                .iter()
                .map(|p| {
                    let parent_position = names.iter().position(|n| n == p).unwrap_or_default();
                    (
                        p.as_str(),
                        levels[parent_position][assignment[parent_position]].as_str(),
                    )
                })
                .collect();
            rows.iter()
                .find(|row| {
                    row.when.iter().all(|(parent, parent_level)| {
                        parent_assignment.get(parent.as_str()) == Some(&parent_level.as_str())
                    })
                })
                .and_then(|row| row.then.get(level).copied())
                .unwrap_or(0.0)
        }
        None => 1.0 / levels[position].len() as f64,
    }
}
