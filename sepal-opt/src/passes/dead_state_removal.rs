//! Removal of proc state elements that no observable operation depends on.

use crate::analysis::StateDependency;
use crate::passes::{Named, ProcPass};
use itertools::Itertools;
use petgraph::unionfind::UnionFind;
use sepal_ir::{GetName, NodeId, Proc};
use sepal_utils::SepalResult;
use std::collections::HashMap;

/// Removes dead state from procs.
///
/// A state element is *observable* when a side-effecting operation depends
/// on it, or when the next-state value of an observable element depends on
/// it (a least fixed point over the proc's next-state back edges). Elements
/// outside the fixed point, and elements of zero width, are deleted after
/// their reads are rewritten to zero literals.
pub struct DeadStateRemoval;

impl Named for DeadStateRemoval {
    fn name() -> &'static str {
        "dead-state-removal"
    }

    fn description() -> &'static str {
        "removes state elements that cannot influence any side-effecting \
         operation"
    }
}

impl ProcPass for DeadStateRemoval {
    fn run(proc_: &mut Proc) -> SepalResult<bool> {
        let mut changed = remove_zero_width_state_elements(proc_)?;
        changed |= remove_unobservable_state_elements(proc_)?;
        Ok(changed)
    }
}

fn remove_zero_width_state_elements(proc_: &mut Proc) -> SepalResult<bool> {
    // Highest index first so removal never shifts an index still to be
    // visited.
    let to_remove: Vec<usize> = (0..proc_.state_element_count())
        .rev()
        .filter(|i| proc_.state_type(*i).flat_bit_count() == 0)
        .collect();
    if to_remove.is_empty() {
        return Ok(false);
    }
    for i in to_remove {
        let param = proc_.state_param(i);
        log::debug!(
            "removing zero-width state element `{}'",
            proc_.node(param).name()
        );
        let ty = proc_.state_type(i).clone();
        let zero = proc_.add_zero_literal(&ty);
        proc_.replace_uses_with(param, zero)?;
        proc_.remove_state_element(i)?;
    }
    Ok(true)
}

fn remove_unobservable_state_elements(proc_: &mut Proc) -> SepalResult<bool> {
    let dependencies = StateDependency::new(proc_);
    let count = proc_.state_element_count();

    // Map from node to the state element indices for which the node is the
    // designated next-state value.
    let mut next_state_indices: HashMap<NodeId, Vec<usize>> = HashMap::new();
    for i in 0..count {
        next_state_indices
            .entry(proc_.next_state_element(i))
            .or_default()
            .push(i);
    }

    // Equivalence classes of mutually supporting state elements: `i` and
    // `j` share a class when the next-state value of one depends on the
    // other. All observable indices end up in a single class, represented by
    // `observable_rep` once the first observable index is found.
    let mut components: UnionFind<usize> = UnionFind::new(count);
    let mut observable_rep: Option<usize> = None;

    for node in proc_.nodes() {
        if node.op().is_side_effecting() && !node.is_param() {
            for i in (0..count).filter(|i| dependencies.depends_on(node.id(), *i))
            {
                log::debug!(
                    "state element `{}' is observable: side-effecting `{}' \
                     depends on it",
                    proc_.node(proc_.state_param(i)).name(),
                    node.name()
                );
                match observable_rep {
                    None => observable_rep = Some(i),
                    Some(rep) => {
                        components.union(i, rep);
                    }
                }
            }
        }
        if let Some(indices) = next_state_indices.get(&node.id()) {
            for &next_index in indices {
                for i in
                    (0..count).filter(|i| dependencies.depends_on(node.id(), *i))
                {
                    components.union(i, next_index);
                }
            }
        }
    }

    // Canonicalize the representative so membership is a single `find`.
    if let Some(rep) = observable_rep {
        observable_rep = Some(components.find(rep));
    }

    let to_remove: Vec<usize> = (0..count)
        .rev()
        .filter(|i| {
            !matches!(observable_rep, Some(rep) if components.find(*i) == rep)
        })
        .collect();
    if to_remove.is_empty() {
        return Ok(false);
    }
    log::debug!(
        "unobservable state elements: {}",
        to_remove
            .iter()
            .map(|i| proc_.node(proc_.state_param(*i)).name())
            .join(", ")
    );

    // Rewrite every live read to a zero literal before removing anything, so
    // mutually supporting elements release each other's parameters.
    for &i in &to_remove {
        let param = proc_.state_param(i);
        if proc_.node(param).has_users() {
            let ty = proc_.state_type(i).clone();
            let zero = proc_.add_zero_literal(&ty);
            proc_.replace_uses_with(param, zero)?;
        }
    }
    for &i in &to_remove {
        log::debug!(
            "removing dead state element `{}' of type {}",
            proc_.node(proc_.state_param(i)).name(),
            proc_.state_type(i)
        );
        proc_.remove_state_element(i)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::optimize_proc_state;
    use sepal_ir::{Op, Type, Value};

    /// Send `payload` on `channel`, threading the proc's token.
    fn send(proc_: &mut Proc, channel: &str, payload: NodeId) -> NodeId {
        let tok = proc_.token_param();
        let snd = proc_.add_node(
            Op::Send { channel: channel.into() },
            Type::Token,
            &[tok, payload],
        );
        proc_.set_next_token(snd).unwrap();
        snd
    }

    #[test]
    fn empty_proc_is_unchanged() {
        let mut p = Proc::new("p");
        assert!(!optimize_proc_state(&mut p).unwrap());
    }

    #[test]
    fn zero_width_state_is_removed() {
        let mut p = Proc::new("p");
        let s0 = p.add_state_element("s0", Value::zero(&Type::bits(8)));
        let s1 = p.add_state_element("s1", Value::zero(&Type::bits(0)));
        // Keep s0 observable so only the zero-width element goes away.
        let read = p.state_param(s0);
        send(&mut p, "out", read);
        let next = p.add_node(Op::Not, Type::bits(8), &[read]);
        p.set_next_state_element(s0, next).unwrap();
        let _ = s1;

        assert!(optimize_proc_state(&mut p).unwrap());
        assert_eq!(p.state_element_count(), 1);
        assert_eq!(*p.state_type(0), Type::bits(8));
        // Second run finds nothing left to do.
        assert!(!optimize_proc_state(&mut p).unwrap());
    }

    #[test]
    fn unobserved_counter_is_removed() {
        let mut p = Proc::new("p");
        let s0 = p.add_state_element("s0", Value::zero(&Type::bits(8)));
        let s1 = p.add_state_element("s1", Value::zero(&Type::bits(8)));

        // s0 only feeds its own next value.
        let s0_param = p.state_param(s0);
        let s0_next = p.add_node(Op::Not, Type::bits(8), &[s0_param]);
        p.set_next_state_element(s0, s0_next).unwrap();

        // s1 feeds its own next value *and* a send.
        let s1_param_pre = p.state_param(s1);
        let s1_next = p.add_node(Op::Not, Type::bits(8), &[s1_param_pre]);
        p.set_next_state_element(s1, s1_next).unwrap();
        let s1_param = p.state_param(s1);
        send(&mut p, "out", s1_param);

        assert!(optimize_proc_state(&mut p).unwrap());
        assert_eq!(p.state_element_count(), 1);
        assert_eq!(p.state_param(0), s1_param);
        assert!(!optimize_proc_state(&mut p).unwrap());
    }

    #[test]
    fn mutually_supporting_pair_is_removed() {
        let mut p = Proc::new("p");
        let a = p.add_state_element("a", Value::zero(&Type::bits(4)));
        let b = p.add_state_element("b", Value::zero(&Type::bits(4)));
        // Each feeds the other's next value; neither reaches a side effect.
        let b_param_pre = p.state_param(b);
        let a_next = p.add_node(Op::Not, Type::bits(4), &[b_param_pre]);
        let a_param_pre = p.state_param(a);
        let b_next = p.add_node(Op::Not, Type::bits(4), &[a_param_pre]);
        p.set_next_state_element(a, a_next).unwrap();
        p.set_next_state_element(b, b_next).unwrap();

        assert!(optimize_proc_state(&mut p).unwrap());
        assert_eq!(p.state_element_count(), 0);
        assert!(!optimize_proc_state(&mut p).unwrap());
    }

    #[test]
    fn support_of_observable_state_survives() {
        let mut p = Proc::new("p");
        let a = p.add_state_element("a", Value::zero(&Type::bits(4)));
        let b = p.add_state_element("b", Value::zero(&Type::bits(4)));
        // b's next value depends on a, and b is sent: both are observable.
        let a_param_pre = p.state_param(a);
        let b_param_pre = p.state_param(b);
        let b_next = p.add_node(Op::Add, Type::bits(4), &[a_param_pre, b_param_pre]);
        p.set_next_state_element(b, b_next).unwrap();
        let b_param = p.state_param(b);
        send(&mut p, "out", b_param);

        assert!(!optimize_proc_state(&mut p).unwrap());
        assert_eq!(p.state_element_count(), 2);
        let _ = a;
    }

    #[test]
    fn tuple_packing_does_not_conflate_elements() {
        let mut p = Proc::new("p");
        let a = p.add_state_element("a", Value::zero(&Type::bits(4)));
        let b = p.add_state_element("b", Value::zero(&Type::bits(4)));
        // Pack both into a tuple but only send element 1 (= b). Leaf-exact
        // propagation must keep a unobservable.
        let a_param_pre = p.state_param(a);
        let b_param_pre = p.state_param(b);
        let pair = p.add_node(
            Op::Tuple,
            Type::tuple(vec![Type::bits(4); 2]),
            &[a_param_pre, b_param_pre],
        );
        let only_b = p.add_node(Op::TupleIndex(1), Type::bits(4), &[pair]);
        send(&mut p, "out", only_b);

        assert!(optimize_proc_state(&mut p).unwrap());
        assert_eq!(p.state_element_count(), 1);
        assert_eq!(*p.state_type(0), Type::bits(4));
        let _ = b;
    }

    #[test]
    fn assert_keeps_its_support() {
        let mut p = Proc::new("p");
        let s = p.add_state_element("s", Value::zero(&Type::bits(1)));
        let tok = p.token_param();
        let s_param = p.state_param(s);
        p.add_node(Op::Assert, Type::Token, &[tok, s_param]);
        assert!(!optimize_proc_state(&mut p).unwrap());
        assert_eq!(p.state_element_count(), 1);
    }
}
