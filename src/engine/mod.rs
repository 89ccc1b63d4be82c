//! The lazy symbolic inference engine.
//!
//! This module provides:
//! - **errors**: error types for construction and query failures
//! - **potential**: pure product/marginal algebra over flat potentials
//! - **formula**: the symbolic formula graph and its deduplicating factory
//! - **graph**: runtime variable/clique/separator records
//! - **propagation**: one-time symbolic junction-tree message passing
//! - **evaluation**: on-demand evaluation with cache invalidation
//! - **join**: arbitrary joint distributions across cliques
//! - **compact**: the no-evidence event-probability fast path
//! - **infer**: the [`InferenceEngine`](infer::InferenceEngine) façade
//! - **snapshot**: shallow snapshot/restore of mutable engine state
//! - **sampling**: random samples drawn from the posterior cliques

pub mod errors;
pub mod evaluation;
pub mod formula;
pub mod graph;
pub mod infer;
pub mod potential;
pub mod snapshot;

mod compact;
mod join;
mod propagation;
mod sampling;
