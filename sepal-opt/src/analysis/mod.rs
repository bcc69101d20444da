//! Analyses over the Sepal IR.
//!
//! The analyses construct data-structures that make answering certain
//! queries about functions and procs easier.

mod dataflow;
mod state_dependency;
mod timing_edges;

pub use dataflow::{run_dataflow, DataflowVisitor};
pub use state_dependency::StateDependency;
pub use timing_edges::TimingEdges;
