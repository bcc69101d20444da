//! Which state elements each node of a proc transitively reads.

use crate::analysis::{run_dataflow, DataflowVisitor};
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use sepal_ir::{FunctionBase, GetName, LeafTypeTree, Node, NodeId, Proc};
use std::collections::HashMap;

/// Per-node state-dependency bitmaps: bit `i` is set on a node when the
/// node's value may depend on state element `i`.
///
/// Computed in a single forward pass, so dependence through the proc's
/// next-state back edge is *not* included; observability analysis closes
/// over the back edge separately.
pub struct StateDependency {
    flat: HashMap<NodeId, FixedBitSet>,
    state_count: usize,
}

struct StateDependencyVisitor<'a> {
    proc_: &'a Proc,
}

impl DataflowVisitor for StateDependencyVisitor<'_> {
    type Value = FixedBitSet;

    fn bottom(&self) -> FixedBitSet {
        FixedBitSet::with_capacity(self.proc_.state_element_count())
    }

    fn join(&self, acc: &mut FixedBitSet, other: &FixedBitSet) {
        acc.union_with(other);
    }

    fn handle(
        &mut self,
        _f: &FunctionBase,
        node: &Node,
        _operand_values: &[&LeafTypeTree<FixedBitSet>],
    ) -> Option<LeafTypeTree<FixedBitSet>> {
        // A state parameter depends exactly on itself. The token parameter
        // (and every other op) takes the framework rules.
        let index = self.proc_.state_param_index(node.id())?;
        let mut bitmap = self.bottom();
        bitmap.insert(index);
        Some(LeafTypeTree::same(node.ty(), bitmap))
    }
}

impl StateDependency {
    pub fn new(proc_: &Proc) -> Self {
        let mut visitor = StateDependencyVisitor { proc_ };
        let values = run_dataflow(proc_.base(), &mut visitor);
        let state_count = proc_.state_element_count();
        let flat = values
            .into_iter()
            .map(|(id, tree)| {
                let mut bitmap = FixedBitSet::with_capacity(state_count);
                for leaf in tree.elements() {
                    bitmap.union_with(leaf);
                }
                (id, bitmap)
            })
            .collect();
        let analysis = StateDependency { flat, state_count };
        if log::log_enabled!(log::Level::Debug) {
            for id in proc_.topo_sort() {
                log::debug!(
                    "state dependencies of `{}': {{{}}}",
                    proc_.node(id).name(),
                    analysis
                        .dependencies(id)
                        .ones()
                        .map(|i| proc_.node(proc_.state_param(i)).name())
                        .join(", ")
                );
            }
        }
        analysis
    }

    /// Whether `node` may depend on state element `state_index`.
    pub fn depends_on(&self, node: NodeId, state_index: usize) -> bool {
        self.flat[&node].contains(state_index)
    }

    /// The full dependency bitmap of `node`.
    pub fn dependencies(&self, node: NodeId) -> &FixedBitSet {
        &self.flat[&node]
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }
}
