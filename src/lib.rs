//! # Juncture
//!
//! Exact probabilistic inference over discrete Bayesian networks with a
//! junction-tree architecture and *lazy, symbolic propagation*: message
//! passing builds a formula (an abstract-syntax graph) for every posterior
//! distribution exactly once, and the numeric potentials those formulas
//! denote are computed only on demand and cached. Hard and soft evidence can
//! be retracted or changed, and single-variable distributions replaced,
//! without re-running message passing; only the numeric results that
//! actually depend on the change are invalidated.
//!
//! Junction-tree *construction* (triangulation and clique discovery) is an
//! external concern: the engine consumes a [`model::JunctionTreeSpec`]
//! describing cliques, adjacency and separator sets as an opaque oracle.
//!
//! ```no_run
//! use juncture::{CptSpec, InferenceEngine, JunctionTreeSpec, NetworkSpec, VariableDef};
//!
//! let network = NetworkSpec::new()
//!     .variable(VariableDef::new("COIN", ["HEADS", "TAILS"])
//!         .with_cpt(CptSpec::root([("HEADS", 0.5), ("TAILS", 0.5)])));
//! let junction = JunctionTreeSpec::new().clique(["COIN"]);
//! let mut engine = InferenceEngine::new(&network, &junction)?;
//! let mut event = juncture::Event::new();
//! event.insert("COIN".into(), vec!["HEADS".into()]);
//! assert!((engine.infer(&event)? - 0.5).abs() < 1e-9);
//! # Ok::<(), juncture::InferError>(())
//! ```

pub mod engine;
pub mod model;

pub use engine::errors::InferError;
pub use engine::infer::{Event, InferenceEngine, NetworkResult};
pub use engine::potential::Potential;
pub use engine::snapshot::EngineSnapshot;
pub use model::{
    CliqueSpec, CptRow, CptSpec, Distribution, JunctionEdgeSpec, JunctionTreeSpec, NetworkSpec,
    Variable, VariableDef,
};
