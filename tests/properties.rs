//! Property tests: junction-tree inference against brute-force enumeration
//! over randomized conditional probability tables.

mod common;

use common::{ev, BruteForce};
use juncture::{CptRow, CptSpec, Event, InferenceEngine, JunctionTreeSpec, NetworkSpec, VariableDef};
use proptest::prelude::*;

/// A three-variable chain A→B→C over two cliques, parameterized by its
/// table entries.
fn chain3(pa: f64, pbt: f64, pbf: f64, pct: f64, pcf: f64) -> (NetworkSpec, JunctionTreeSpec) {
    let network = NetworkSpec::new()
        .variable(
            VariableDef::new("A", ["T", "F"]).with_cpt(CptSpec::root([("T", pa), ("F", 1.0 - pa)])),
        )
        .variable(
            VariableDef::new("B", ["T", "F"])
                .with_parents(["A"])
                .with_cpt(CptSpec::Conditioned(vec![
                    CptRow::new(&[("A", "T")], &[("T", pbt), ("F", 1.0 - pbt)]),
                    CptRow::new(&[("A", "F")], &[("T", pbf), ("F", 1.0 - pbf)]),
                ])),
        )
        .variable(
            VariableDef::new("C", ["T", "F"])
                .with_parents(["B"])
                .with_cpt(CptSpec::Conditioned(vec![
                    CptRow::new(&[("B", "T")], &[("T", pct), ("F", 1.0 - pct)]),
                    CptRow::new(&[("B", "F")], &[("T", pcf), ("F", 1.0 - pcf)]),
                ])),
        );
    let junction = JunctionTreeSpec::new()
        .clique(["A", "B"])
        .clique(["B", "C"])
        .edge(0, 1, ["B"]);
    (network, junction)
}

fn close(observed: f64, expected: f64) -> Result<(), TestCaseError> {
    let difference = (observed - expected).abs();
    let scale = observed.abs() + expected.abs();
    prop_assert!(
        difference <= 1e-9 + 1e-6 * scale,
        "observed {} but expected {}",
        observed,
        expected
    );
    Ok(())
}

fn probability() -> impl Strategy<Value = f64> {
    0.01f64..0.99
}

proptest! {
    #[test]
    fn cross_clique_joints_match_enumeration(
        pa in probability(),
        pbt in probability(),
        pbf in probability(),
        pct in probability(),
        pcf in probability(),
    ) {
        let (network, junction) = chain3(pa, pbt, pbf, pct, pcf);
        let reference = BruteForce::new(&network);
        let mut engine = InferenceEngine::new(&network, &junction).unwrap();

        for a in ["T", "F"] {
            for c in ["T", "F"] {
                let event = ev(&[("A", &[a]), ("C", &[c])]);
                close(
                    engine.infer(&event).unwrap(),
                    reference.probability(&event, &Event::new()),
                )?;
            }
        }
        // The four joint outcomes together are certain.
        close(engine.infer(&ev(&[("A", &["T", "F"]), ("C", &["T", "F"])])).unwrap(), 1.0)?;
    }

    #[test]
    fn evidence_conditioning_matches_enumeration(
        pa in probability(),
        pbt in probability(),
        pbf in probability(),
        pct in probability(),
        pcf in probability(),
        evidence_level in 0usize..2,
    ) {
        let (network, junction) = chain3(pa, pbt, pbf, pct, pcf);
        let reference = BruteForce::new(&network);
        let mut engine = InferenceEngine::new(&network, &junction).unwrap();

        let level = ["T", "F"][evidence_level];
        let evidence = ev(&[("B", &[level])]);
        engine.set_evidence(&evidence).unwrap();

        let event = ev(&[("A", &["T"]), ("C", &["T"])]);
        close(
            engine.infer(&event).unwrap(),
            reference.probability(&event, &evidence),
        )?;
        // Marginals under evidence agree as well.
        let marginal = ev(&[("C", &["T"])]);
        close(
            engine.infer(&marginal).unwrap(),
            reference.probability(&marginal, &evidence),
        )?;
    }

    #[test]
    fn compaction_never_changes_the_result(
        pa in probability(),
        pbt in probability(),
        pbf in probability(),
        pct in probability(),
        pcf in probability(),
    ) {
        let (network, junction) = chain3(pa, pbt, pbf, pct, pcf);
        let mut engine = InferenceEngine::new(&network, &junction).unwrap();

        let event = ev(&[("A", &["T"]), ("C", &["T"])]);
        // No evidence: `infer` compacts, the joint distribution does not.
        let fast = engine.infer(&event).unwrap();
        let general = engine
            .get_joint_distribution(&["A", "C"], &[])
            .unwrap()
            .infer(&event);
        close(fast, general)?;
    }

    #[test]
    fn conditional_blocks_sum_to_one(
        pa in probability(),
        pbt in probability(),
        pbf in probability(),
        pct in probability(),
        pcf in probability(),
    ) {
        let (network, junction) = chain3(pa, pbt, pbf, pct, pcf);
        let mut engine = InferenceEngine::new(&network, &junction).unwrap();
        let joint = engine.get_joint_distribution(&["C"], &["A"]).unwrap();
        let potential = joint.potential();
        // Domain [C, A]: rows c * 2 + a.
        for a in 0..2 {
            close(potential[a] + potential[2 + a], 1.0)?;
        }
    }
}
