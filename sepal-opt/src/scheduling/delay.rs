//! The delay oracle seam between the scheduler and the delay model.

use sepal_ir::{FunctionBase, GetName, Node, NodeId};
use sepal_utils::{Error, SepalResult};
use std::collections::HashMap;

/// Combinational delay of each node, in picoseconds. Total over the live
/// nodes of the function it was computed for.
pub type DelayMap = HashMap<NodeId, i64>;

/// Estimates the combinational delay of a single operation. The scheduler
/// treats this as a pure function of the node.
pub trait DelayEstimator {
    fn operation_delay_ps(&self, node: &Node) -> SepalResult<i64>;
}

/// Any infallible function of a node is an estimator; handy for tests and
/// for models that cannot fail.
impl<F> DelayEstimator for F
where
    F: Fn(&Node) -> i64,
{
    fn operation_delay_ps(&self, node: &Node) -> SepalResult<i64> {
        Ok(self(node))
    }
}

/// An estimator backed by an explicit per-node table. Nodes missing from the
/// table are an error in the caller's model.
pub struct TableDelayEstimator {
    delays: HashMap<NodeId, i64>,
}

impl TableDelayEstimator {
    pub fn new(delays: HashMap<NodeId, i64>) -> Self {
        TableDelayEstimator { delays }
    }
}

impl DelayEstimator for TableDelayEstimator {
    fn operation_delay_ps(&self, node: &Node) -> SepalResult<i64> {
        self.delays.get(&node.id()).copied().ok_or_else(|| {
            Error::invalid_argument(format!(
                "no delay recorded for node `{}'",
                node.name()
            ))
        })
    }
}

/// Evaluate the estimator over every live node of `f`.
pub fn compute_node_delays<E: DelayEstimator>(
    f: &FunctionBase,
    estimator: &E,
) -> SepalResult<DelayMap> {
    let mut result = DelayMap::with_capacity(f.node_count());
    for node in f.nodes() {
        result.insert(node.id(), estimator.operation_delay_ps(node)?);
    }
    Ok(result)
}
