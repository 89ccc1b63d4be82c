//! Inference on the rain/sprinkler/grass-wet network, checked against an
//! independently computed joint table.

mod common;

use common::{assert_close, ev, sprinkler};
use juncture::{Event, InferenceEngine};

/// Joint probabilities over (RAIN, SPRINKLER, GRASS_WET), computed
/// independently in R.
const GOLD_STANDARD: [([&str; 3], f64); 8] = [
    (["T", "T", "T"], 1.98e-3),
    (["F", "T", "T"], 2.88e-1),
    (["T", "F", "T"], 1.584e-1),
    (["F", "F", "T"], 0.0),
    (["T", "T", "F"], 2.0e-5),
    (["F", "T", "F"], 3.2e-2),
    (["T", "F", "F"], 3.96e-2),
    (["F", "F", "F"], 4.8e-1),
];

const NAMES: [&str; 3] = ["RAIN", "SPRINKLER", "GRASS_WET"];

/// Aggregates the gold-standard table over the rows consistent with a
/// restriction, the same way a spreadsheet filter would.
fn aggregate(restriction: &Event) -> f64 {
    GOLD_STANDARD
        .iter()
        .filter(|(combination, _)| {
            NAMES.iter().enumerate().all(|(i, name)| {
                restriction
                    .get(*name)
                    .map_or(true, |levels| levels.contains(&combination[i].to_string()))
            })
        })
        .map(|(_, p)| p)
        .sum()
}

fn merge(a: &Event, b: &Event) -> Event {
    let mut merged = a.clone();
    for (k, v) in b {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[test]
fn joint_point_events_match_the_gold_standard() {
    let (network, junction) = sprinkler();
    let mut engine = InferenceEngine::new(&network, &junction).unwrap();
    for (combination, expected) in GOLD_STANDARD {
        let event = ev(&[
            ("RAIN", &[combination[0]]),
            ("SPRINKLER", &[combination[1]]),
            ("GRASS_WET", &[combination[2]]),
        ]);
        assert_close(engine.infer(&event).unwrap(), expected);
    }
}

#[test]
fn the_canonical_all_true_row_is_about_two_in_a_thousand() {
    let (network, junction) = sprinkler();
    let mut engine = InferenceEngine::new(&network, &junction).unwrap();
    let event = ev(&[
        ("RAIN", &["T"]),
        ("SPRINKLER", &["T"]),
        ("GRASS_WET", &["T"]),
    ]);
    assert_close(engine.infer(&event).unwrap(), 1.98e-3);
}

/// Sweeps every combination of placing each variable in the event, in the
/// evidence, or nowhere, with point and cumulative level choices, and checks
/// the engine against gold-standard aggregation.
#[test]
fn every_event_and_evidence_placement_matches_the_gold_standard() {
    let (network, junction) = sprinkler();
    let mut engine = InferenceEngine::new(&network, &junction).unwrap();
    let choices: [&[&str]; 3] = [&["T"], &["F"], &["T", "F"]];

    // Each variable takes one of 9 states: 3 placements x 3 level choices.
    for code in 0..9usize.pow(3) {
        let mut event = Event::new();
        let mut evidence = Event::new();
        let mut rest = code;
        for name in NAMES {
            let placement = rest % 3;
            let choice = (rest / 3) % 3;
            rest /= 9;
            let levels: Vec<String> = choices[choice].iter().map(|l| l.to_string()).collect();
            match placement {
                1 => {
                    event.insert(name.to_string(), levels);
                }
                2 => {
                    evidence.insert(name.to_string(), levels);
                }
                _ => {}
            }
        }
        if event.is_empty() {
            continue;
        }

        let expected = if evidence.is_empty() {
            aggregate(&event)
        } else {
            let numerator = aggregate(&merge(&evidence, &event));
            let denominator = aggregate(&evidence);
            if numerator == 0.0 {
                0.0
            } else {
                numerator / denominator
            }
        };

        engine.set_evidence(&evidence).unwrap();
        let observed = engine.infer(&event).unwrap();
        engine.remove_all_evidence().unwrap();
        assert_close(observed, expected);
    }
}

#[test]
fn posterior_marginals_respond_to_evidence() {
    let (network, junction) = sprinkler();
    let mut engine = InferenceEngine::new(&network, &junction).unwrap();

    // P(RAIN=T | GRASS_WET=T) by Bayes: 0.16038 / 0.44838.
    engine.set_evidence(&ev(&[("GRASS_WET", &["T"])])).unwrap();
    assert_close(
        engine.infer(&ev(&[("RAIN", &["T"])])).unwrap(),
        0.160_38 / 0.448_38,
    );
}
