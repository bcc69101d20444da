//! ASAP/ALAP cycle windows for every node of a function.

use crate::scheduling::DelayMap;
use sepal_ir::{FunctionBase, GetName, NodeId};
use sepal_utils::{Error, SepalResult};
use std::collections::HashMap;

/// A `[lb, ub]` cycle interval per node, bracketing where a legal schedule
/// may place it. The windows are monotone along operand edges: an edge
/// `u -> v` has `lb(v) >= lb(u)` and `ub(u) <= ub(v)`.
#[derive(Debug)]
pub struct ScheduleBounds {
    lb: HashMap<NodeId, i64>,
    ub: HashMap<NodeId, i64>,
}

impl ScheduleBounds {
    /// Compute ASAP lower bounds and ALAP upper bounds for a
    /// `pipeline_length`-stage schedule, refining each window with the
    /// in-cycle critical-path delay: a node whose arrival including its own
    /// delay would overflow the clock period starts the next cycle.
    ///
    /// Fails with an internal error when some window is empty: the pipeline
    /// is too short for the clock period, and the caller should relax one of
    /// the two.
    pub fn compute(
        f: &FunctionBase,
        pipeline_length: i64,
        clock_period_ps: i64,
        delays: &DelayMap,
    ) -> SepalResult<Self> {
        let order = f.topo_sort();
        let last = pipeline_length - 1;

        // Forward (ASAP). `arrival` is the critical-path delay inside the
        // node's cycle, inclusive of the node itself.
        let mut lb: HashMap<NodeId, i64> = HashMap::new();
        let mut arrival: HashMap<NodeId, i64> = HashMap::new();
        for id in &order {
            let node = f.node(*id);
            let cycle = node
                .operands()
                .iter()
                .map(|o| lb[o])
                .max()
                .unwrap_or(0);
            let path = node
                .operands()
                .iter()
                .filter(|o| lb[*o] == cycle)
                .map(|o| arrival[o])
                .max()
                .unwrap_or(0);
            let delay = delays[id];
            if path > 0 && path + delay > clock_period_ps {
                // Cannot finish in the operands' cycle; start the next one.
                lb.insert(*id, cycle + 1);
                arrival.insert(*id, delay);
            } else {
                lb.insert(*id, cycle);
                arrival.insert(*id, path + delay);
            }
        }

        // Backward (ALAP). `required` mirrors `arrival` from the sink side.
        let mut ub: HashMap<NodeId, i64> = HashMap::new();
        let mut required: HashMap<NodeId, i64> = HashMap::new();
        for id in order.iter().rev() {
            let node = f.node(*id);
            let cycle = node
                .users()
                .map(|u| ub[&u])
                .min()
                .unwrap_or(last);
            let path = node
                .users()
                .filter(|u| ub[u] == cycle)
                .map(|u| required[&u])
                .max()
                .unwrap_or(0);
            let delay = delays[id];
            if path > 0 && path + delay > clock_period_ps {
                ub.insert(*id, cycle - 1);
                required.insert(*id, delay);
            } else {
                ub.insert(*id, cycle);
                required.insert(*id, path + delay);
            }
        }

        for id in &order {
            if lb[id] > ub[id] {
                return Err(Error::internal(format!(
                    "node `{}' cannot be scheduled within {} stages: \
                     earliest cycle {} is after latest cycle {}",
                    f.node(*id).name(),
                    pipeline_length,
                    lb[id],
                    ub[id]
                )));
            }
        }

        Ok(ScheduleBounds { lb, ub })
    }

    /// Adopt externally computed windows. The maps must be total over the
    /// function the bounds will be used with.
    pub fn from_bounds(
        lb: HashMap<NodeId, i64>,
        ub: HashMap<NodeId, i64>,
    ) -> Self {
        ScheduleBounds { lb, ub }
    }

    pub fn lb(&self, node: NodeId) -> i64 {
        self.lb[&node]
    }

    pub fn ub(&self, node: NodeId) -> i64 {
        self.ub[&node]
    }
}
