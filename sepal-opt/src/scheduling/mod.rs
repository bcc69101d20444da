//! Pipeline scheduling: assigning every node of a function to a cycle.
//!
//! The formulation is SDC scheduling: a linear program over real-valued
//! cycle variables whose constraint matrix is totally unimodular, so the LP
//! optimum is integral and an LP solver stands in for an ILP solver. See
//! [schedule] for the entry point.

mod bounds;
mod delay;
mod sdc;

pub use bounds::ScheduleBounds;
pub use delay::{
    compute_node_delays, DelayEstimator, DelayMap, TableDelayEstimator,
};
pub use sdc::{
    schedule, CycleMap, IoConstraint, IoDirection, SchedulingConstraint,
};
