//! SDC formulation of pipeline scheduling.
//!
//! Cycle assignments are modeled as real-valued LP variables related by
//! difference constraints; the constraint matrix is totally unimodular, so
//! the LP optimum is integral and minimizing over the relaxation solves the
//! integer problem. The objective charges each node's register lifetime by
//! its bit width, with a small per-cycle term to break ties toward early
//! cycles.
//!
//! References:
//!   - Cong & Zhang, "An efficient and versatile scheduling algorithm based
//!     on SDC formulation", DAC 2006.

use crate::analysis::TimingEdges;
use crate::scheduling::{compute_node_delays, DelayEstimator, ScheduleBounds};
use good_lp::{
    constraint, default_solver, Constraint, Expression, ProblemVariables,
    Solution, SolverModel, Variable,
};
use sepal_ir::{FunctionBase, GetName, Id, NodeId};
use sepal_utils::{Error, SepalResult};
use std::collections::HashMap;

/// The scheduler's output: the pipeline stage of every live node.
pub type CycleMap = HashMap<NodeId, i64>;

/// Which half of a channel an I/O constraint endpoint names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoDirection {
    Send,
    Receive,
}

/// Bounds the latency between two channel operations: every matching
/// `(source, target)` pair must satisfy
/// `minimum_latency <= cycle(target) - cycle(source) <= maximum_latency`.
/// Channels with no matching operations in the scheduled function
/// contribute nothing.
#[derive(Clone, Debug)]
pub struct IoConstraint {
    pub source_channel: Id,
    pub source_direction: IoDirection,
    pub target_channel: Id,
    pub target_direction: IoDirection,
    pub minimum_latency: i64,
    pub maximum_latency: i64,
}

/// A user-supplied restriction on the schedule.
#[derive(Clone, Debug)]
pub enum SchedulingConstraint {
    Io(IoConstraint),
    /// Every receive in cycle 0; every send in the last cycle.
    RecvsFirstSendsLast,
}

/// Accumulates the LP rows for one scheduling problem.
struct ConstraintBuilder<'a> {
    f: &'a FunctionBase,
    pipeline_length: i64,
    /// Node's cycle after scheduling.
    cycle: HashMap<NodeId, Variable>,
    /// Node's lifetime: cycles from production until the last consumer.
    lifetime: HashMap<NodeId, Variable>,
    /// An artificial sink consuming every value that escapes the function.
    cycle_at_sink: Variable,
    rows: Vec<Constraint>,
}

impl<'a> ConstraintBuilder<'a> {
    fn new(
        f: &'a FunctionBase,
        vars: &mut ProblemVariables,
        pipeline_length: i64,
        bounds: &ScheduleBounds,
    ) -> Self {
        let mut cycle = HashMap::with_capacity(f.node_count());
        let mut lifetime = HashMap::with_capacity(f.node_count());
        for id in f.node_ids() {
            cycle.insert(
                id,
                vars.add(
                    good_lp::variable()
                        .min(bounds.lb(id) as f64)
                        .max(bounds.ub(id) as f64),
                ),
            );
            lifetime.insert(id, vars.add(good_lp::variable().min(0.0)));
        }
        let cycle_at_sink = vars.add(good_lp::variable());
        ConstraintBuilder {
            f,
            pipeline_length,
            cycle,
            lifetime,
            cycle_at_sink,
            rows: Vec::new(),
        }
    }

    /// Causal and lifetime rows for one def-use edge. `None` stands for the
    /// artificial sink.
    fn add_def_use_constraints(&mut self, node: NodeId, user: Option<NodeId>) {
        let cycle_at_node = self.cycle[&node];
        let lifetime_at_node = self.lifetime[&node];
        let cycle_at_user =
            user.map_or(self.cycle_at_sink, |u| self.cycle[&u]);

        // cycle[node] <= cycle[user]
        self.rows
            .push(constraint!(cycle_at_node - cycle_at_user <= 0.0));
        // cycle[user] - cycle[node] <= lifetime[node]
        self.rows.push(constraint!(
            cycle_at_user - cycle_at_node - lifetime_at_node <= 0.0
        ));
    }

    fn add_timing_constraints(&mut self, timing: &TimingEdges) {
        for source in self.f.node_ids() {
            for target in timing.successors(source) {
                let cycle_at_source = self.cycle[&source];
                let cycle_at_target = self.cycle[target];
                self.rows.push(constraint!(
                    cycle_at_target - cycle_at_source >= 1.0
                ));
                log::debug!(
                    "timing: 1 <= cycle[{}] - cycle[{}]",
                    self.f.node(*target).name(),
                    self.f.node(source).name()
                );
            }
        }
    }

    fn add_scheduling_constraint(&mut self, constraint: &SchedulingConstraint) {
        match constraint {
            SchedulingConstraint::Io(io) => self.add_io_constraint(io),
            SchedulingConstraint::RecvsFirstSendsLast => {
                self.add_rfsl_constraint()
            }
        }
    }

    fn add_io_constraint(&mut self, io: &IoConstraint) {
        let f = self.f;
        let mut channel_to_nodes: HashMap<Id, Vec<NodeId>> = HashMap::new();
        for node in f.nodes() {
            if let Some(channel) = node.channel() {
                channel_to_nodes.entry(channel).or_default().push(node.id());
            }
        }
        let matches_direction = |id: NodeId, dir: IoDirection| {
            let node = f.node(id);
            (node.is_send() && dir == IoDirection::Send)
                || (node.is_receive() && dir == IoDirection::Receive)
        };

        // A constraint naming a channel with no operations here is not an
        // error; the affected pairs are simply absent.
        let empty = Vec::new();
        let sources =
            channel_to_nodes.get(&io.source_channel).unwrap_or(&empty);
        let targets =
            channel_to_nodes.get(&io.target_channel).unwrap_or(&empty);
        for &source in sources {
            for &target in targets {
                if !matches_direction(source, io.source_direction)
                    || !matches_direction(target, io.target_direction)
                    || source == target
                {
                    continue;
                }
                let cycle_at_source = self.cycle[&source];
                let cycle_at_target = self.cycle[&target];
                let min = io.minimum_latency as f64;
                let max = io.maximum_latency as f64;
                self.rows.push(constraint!(
                    cycle_at_source - cycle_at_target <= -min
                ));
                self.rows.push(constraint!(
                    cycle_at_target - cycle_at_source <= max
                ));
                log::debug!(
                    "io: {} <= cycle[{}] - cycle[{}] <= {}",
                    io.minimum_latency,
                    self.f.node(target).name(),
                    self.f.node(source).name(),
                    io.maximum_latency
                );
            }
        }
    }

    fn add_rfsl_constraint(&mut self) {
        let last = (self.pipeline_length - 1) as f64;
        for node in self.f.nodes() {
            if node.is_receive() {
                let cycle_at_node = self.cycle[&node.id()];
                self.rows.push(constraint!(cycle_at_node <= 0.0));
                log::debug!("rfsl: cycle[{}] <= 0", node.name());
            }
            if node.is_send() {
                let cycle_at_node = self.cycle[&node.id()];
                self.rows.push(constraint!(cycle_at_node >= last));
                log::debug!(
                    "rfsl: {} <= cycle[{}]",
                    self.pipeline_length - 1,
                    node.name()
                );
            }
        }
    }

    /// Minimize register lifetimes weighted by width, with a unit cycle term
    /// as tie-breaker. The lifetime weight is a power of two so scaling adds
    /// no floating-point imprecision.
    fn objective(&self) -> Expression {
        self.f
            .nodes()
            .map(|node| {
                let weight = 1024.0 * node.ty().flat_bit_count() as f64;
                1.0 * self.cycle[&node.id()]
                    + weight * self.lifetime[&node.id()]
            })
            .sum()
    }
}

/// Schedule every node of `f` into `[0, pipeline_stages)` so that no
/// combinational path exceeds `clock_period_ps`, data dependencies never run
/// backwards, and every user constraint holds, minimizing total register
/// bits held across stage boundaries.
///
/// Fails with [Error::Internal] when the constraints admit no schedule (the
/// usual remedy is more pipeline stages) or when the solver returns a
/// non-integral solution, and with [Error::Unavailable] when no solver
/// backend can be instantiated.
pub fn schedule<E: DelayEstimator>(
    f: &FunctionBase,
    pipeline_stages: i64,
    clock_period_ps: i64,
    estimator: &E,
    bounds: &ScheduleBounds,
    constraints: &[SchedulingConstraint],
) -> SepalResult<CycleMap> {
    if pipeline_stages < 1 {
        return Err(Error::invalid_argument(format!(
            "pipeline must have at least one stage, got {pipeline_stages}"
        )));
    }
    log::debug!(
        "scheduling `{}' into {} stages at {}ps",
        f.name(),
        pipeline_stages,
        clock_period_ps
    );

    let delay_map = compute_node_delays(f, estimator)?;

    let mut vars = ProblemVariables::new();
    let mut builder =
        ConstraintBuilder::new(f, &mut vars, pipeline_stages, bounds);

    for constraint in constraints {
        builder.add_scheduling_constraint(constraint);
    }

    for id in f.node_ids() {
        let users: Vec<NodeId> = f.node(id).users().collect();
        for user in users {
            builder.add_def_use_constraints(id, Some(user));
        }
        if f.has_implicit_use(id) {
            builder.add_def_use_constraints(id, None);
        }
    }

    let timing = TimingEdges::compute(f, clock_period_ps, &delay_map);
    builder.add_timing_constraints(&timing);

    let objective = builder.objective();
    let ConstraintBuilder { cycle, rows, .. } = builder;

    let mut model = vars.minimise(objective).using(default_solver);
    for row in rows {
        model = model.with(row);
    }
    let solution = model.solve().map_err(|e| {
        log::warn!("LP solve failed: {e}");
        Error::internal("the problem does not have an optimal solution")
    })?;

    let mut cycle_map = CycleMap::with_capacity(cycle.len());
    for (id, var) in cycle {
        let value = solution.value(var);
        if (value - value.round()).abs() > 0.001 {
            return Err(Error::internal(
                "the scheduling result is expected to be integer",
            ));
        }
        cycle_map.insert(id, value.round() as i64);
    }
    Ok(cycle_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepal_ir::{Node, Op, Proc, Type};

    fn zero_delay() -> impl DelayEstimator {
        |_: &Node| 0i64
    }

    /// Check the universal schedule invariants against a function.
    fn check_invariants(
        f: &FunctionBase,
        cycles: &CycleMap,
        timing: &TimingEdges,
        bounds: &ScheduleBounds,
    ) {
        for node in f.nodes() {
            let c = cycles[&node.id()];
            assert!(bounds.lb(node.id()) <= c && c <= bounds.ub(node.id()));
            for user in node.users() {
                assert!(c <= cycles[&user], "cycle({node:?}) > cycle(user)");
            }
        }
        for (source, target) in timing.iter() {
            assert!(cycles[&target] - cycles[&source] >= 1);
        }
    }

    #[test]
    fn single_stage_add() {
        let mut f = FunctionBase::new("f");
        let x = f.add_param("x", Type::bits(8));
        let y = f.add_param("y", Type::bits(8));
        let z = f.add_node(Op::Add, Type::bits(8), &[x, y]);
        let estimator =
            |n: &Node| -> i64 { if matches!(n.op(), Op::Add) { 500 } else { 0 } };
        let delays = compute_node_delays(&f, &estimator).unwrap();
        let bounds = ScheduleBounds::compute(&f, 1, 1000, &delays).unwrap();
        let cycles =
            schedule(&f, 1, 1000, &estimator, &bounds, &[]).unwrap();
        assert_eq!(cycles[&x], 0);
        assert_eq!(cycles[&y], 0);
        assert_eq!(cycles[&z], 0);
        assert!(TimingEdges::compute(&f, 1000, &delays).is_empty());
    }

    #[test]
    fn two_stage_pipeline() {
        let mut f = FunctionBase::new("f");
        let p = f.add_param("p", Type::bits(8));
        let q = f.add_node(Op::Not, Type::bits(8), &[p]);
        let r = f.add_node(Op::Not, Type::bits(8), &[q]);
        let s = f.add_node(Op::Not, Type::bits(8), &[r]);
        let estimator = |n: &Node| -> i64 { if n.is_param() { 0 } else { 800 } };
        let bounds = ScheduleBounds::from_bounds(
            HashMap::from([(p, 0), (q, 0), (r, 0), (s, 2)]),
            HashMap::from([(p, 0), (q, 2), (r, 2), (s, 2)]),
        );
        let cycles =
            schedule(&f, 3, 1000, &estimator, &bounds, &[]).unwrap();
        assert_eq!(cycles[&p], 0);
        assert_eq!(cycles[&q], 0);
        assert_eq!(cycles[&r], 1);
        assert_eq!(cycles[&s], 2);

        let delays = compute_node_delays(&f, &estimator).unwrap();
        let timing = TimingEdges::compute(&f, 1000, &delays);
        check_invariants(&f, &cycles, &timing, &bounds);
    }

    /// Build a proc that receives on `in`, sends the payload on `out`.
    fn passthrough_proc() -> (Proc, NodeId, NodeId, NodeId) {
        let mut p = Proc::new("p");
        let tok = p.token_param();
        let rcv = p.add_node(
            Op::Receive { channel: "in".into() },
            Type::tuple(vec![Type::Token, Type::bits(8)]),
            &[tok],
        );
        let rtok = p.add_node(Op::TupleIndex(0), Type::Token, &[rcv]);
        let data = p.add_node(Op::TupleIndex(1), Type::bits(8), &[rcv]);
        let snd = p.add_node(
            Op::Send { channel: "out".into() },
            Type::Token,
            &[rtok, data],
        );
        p.set_next_token(snd).unwrap();
        (p, rcv, data, snd)
    }

    #[test]
    fn recvs_first_sends_last() {
        let (p, rcv, data, snd) = passthrough_proc();
        let estimator = zero_delay();
        let delays = compute_node_delays(p.base(), &estimator).unwrap();
        let bounds =
            ScheduleBounds::compute(p.base(), 4, 1000, &delays).unwrap();
        let cycles = schedule(
            p.base(),
            4,
            1000,
            &estimator,
            &bounds,
            &[SchedulingConstraint::RecvsFirstSendsLast],
        )
        .unwrap();
        assert_eq!(cycles[&rcv], 0);
        assert_eq!(cycles[&snd], 3);
        // The tie-breaker pulls the unconstrained compute to cycle 0.
        assert_eq!(cycles[&data], 0);
    }

    #[test]
    fn io_constraint_separates_channel_ops() {
        let (p, rcv, _, snd) = passthrough_proc();
        let estimator = zero_delay();
        let delays = compute_node_delays(p.base(), &estimator).unwrap();
        let bounds =
            ScheduleBounds::compute(p.base(), 4, 1000, &delays).unwrap();
        let io = IoConstraint {
            source_channel: "in".into(),
            source_direction: IoDirection::Receive,
            target_channel: "out".into(),
            target_direction: IoDirection::Send,
            minimum_latency: 2,
            maximum_latency: 2,
        };
        let cycles = schedule(
            p.base(),
            4,
            1000,
            &estimator,
            &bounds,
            &[SchedulingConstraint::Io(io)],
        )
        .unwrap();
        assert_eq!(cycles[&snd] - cycles[&rcv], 2);
    }

    #[test]
    fn io_constraint_on_absent_channel_is_inert() {
        let (p, ..) = passthrough_proc();
        let estimator = zero_delay();
        let delays = compute_node_delays(p.base(), &estimator).unwrap();
        let bounds =
            ScheduleBounds::compute(p.base(), 2, 1000, &delays).unwrap();
        let io = IoConstraint {
            source_channel: "elsewhere".into(),
            source_direction: IoDirection::Receive,
            target_channel: "out".into(),
            target_direction: IoDirection::Send,
            minimum_latency: 5,
            maximum_latency: 9,
        };
        assert!(schedule(
            p.base(),
            2,
            1000,
            &estimator,
            &bounds,
            &[SchedulingConstraint::Io(io)],
        )
        .is_ok());
    }

    #[test]
    fn isolated_node_lands_on_its_lower_bound() {
        let mut f = FunctionBase::new("f");
        let x = f.add_param("x", Type::bits(8));
        let bounds = ScheduleBounds::from_bounds(
            HashMap::from([(x, 2)]),
            HashMap::from([(x, 3)]),
        );
        let cycles =
            schedule(&f, 4, 1000, &zero_delay(), &bounds, &[]).unwrap();
        assert_eq!(cycles[&x], 2);
    }

    #[test]
    fn conflicting_constraints_are_internal_errors() {
        // A timing edge demands separation while the bounds pin both nodes
        // to cycle 0.
        let mut f = FunctionBase::new("f");
        let a = f.add_param("a", Type::bits(8));
        let b = f.add_node(Op::Not, Type::bits(8), &[a]);
        let estimator = |_: &Node| 600i64;
        let bounds = ScheduleBounds::from_bounds(
            HashMap::from([(a, 0), (b, 0)]),
            HashMap::from([(a, 0), (b, 0)]),
        );
        let err = schedule(&f, 1, 1000, &estimator, &bounds, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn rejects_empty_pipelines() {
        let f = FunctionBase::new("f");
        let bounds =
            ScheduleBounds::from_bounds(HashMap::new(), HashMap::new());
        let err = schedule(&f, 0, 1000, &zero_delay(), &bounds, &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
