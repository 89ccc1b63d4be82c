//! User-facing definition types: network descriptions, junction-tree oracle
//! input, and distribution objects.

mod distribution;
mod network;

pub use distribution::{Distribution, Variable};
pub use network::{
    CliqueSpec, CptRow, CptSpec, JunctionEdgeSpec, JunctionTreeSpec, NetworkSpec, VariableDef,
};
