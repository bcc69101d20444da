//! A forward dataflow framework over leaf-type-trees.
//!
//! The driver visits nodes in topological order and memoizes one
//! [LeafTypeTree] per node. Tuple and array shuffling is handled here so
//! every visitor gets leaf-exact propagation for free: reading element 0 of
//! a tuple does not import facts about element 1.

use sepal_ir::{FunctionBase, LeafTypeTree, Node, NodeId, Op};
use std::collections::HashMap;

/// A forward dataflow over a function's nodes.
///
/// Implementors supply the lattice ([DataflowVisitor::bottom] and
/// [DataflowVisitor::join]) and may claim individual nodes through
/// [DataflowVisitor::handle]; everything unclaimed falls to the framework
/// rules: leaf-exact propagation for tuple/array ops, and for all other ops
/// every leaf of the result joins every leaf of every operand.
pub trait DataflowVisitor {
    type Value: Clone;

    /// The lattice bottom: the value of a node with no dependencies.
    fn bottom(&self) -> Self::Value;

    /// Join `other` into `acc`.
    fn join(&self, acc: &mut Self::Value, other: &Self::Value);

    /// Op-specific transfer function. Return `None` to use the framework
    /// rules for this node.
    fn handle(
        &mut self,
        f: &FunctionBase,
        node: &Node,
        operand_values: &[&LeafTypeTree<Self::Value>],
    ) -> Option<LeafTypeTree<Self::Value>> {
        let _ = (f, node, operand_values);
        None
    }
}

/// Run `visitor` over `f` and return the per-node leaf-type-tree values.
pub fn run_dataflow<V: DataflowVisitor>(
    f: &FunctionBase,
    visitor: &mut V,
) -> HashMap<NodeId, LeafTypeTree<V::Value>> {
    let mut values: HashMap<NodeId, LeafTypeTree<V::Value>> = HashMap::new();
    for id in f.topo_sort() {
        let node = f.node(id);
        let result = {
            let operand_values: Vec<&LeafTypeTree<V::Value>> =
                node.operands().iter().map(|o| &values[o]).collect();
            match visitor.handle(f, node, &operand_values) {
                Some(value) => value,
                None => transfer(f, visitor, node, &operand_values),
            }
        };
        debug_assert_eq!(result.ty(), node.ty());
        values.insert(id, result);
    }
    values
}

/// The framework transfer function for nodes the visitor did not claim.
fn transfer<V: DataflowVisitor>(
    f: &FunctionBase,
    visitor: &V,
    node: &Node,
    operand_values: &[&LeafTypeTree<V::Value>],
) -> LeafTypeTree<V::Value> {
    match node.op() {
        Op::Tuple | Op::Array => {
            // Concatenate the operand trees leaf-for-leaf.
            let elements = operand_values
                .iter()
                .flat_map(|t| t.elements().iter().cloned())
                .collect();
            LeafTypeTree::from_elements(node.ty().clone(), elements)
        }
        Op::TupleIndex(index) => {
            // Slice out exactly the leaves of the selected element.
            let tuple_ty = f.node(node.operands()[0]).ty();
            let range = tuple_ty.tuple_leaf_range(*index);
            LeafTypeTree::from_elements(
                node.ty().clone(),
                operand_values[0].elements()[range].to_vec(),
            )
        }
        Op::ArrayIndex => {
            // The selected element could be any of them: join corresponding
            // leaves across all elements, then fold in the index value since
            // it decides which element is read.
            let element_leaves = node.ty().leaf_count();
            let array = operand_values[0].elements();
            let mut index_deps = visitor.bottom();
            for leaf in operand_values[1].elements() {
                visitor.join(&mut index_deps, leaf);
            }
            let elements = (0..element_leaves)
                .map(|leaf| {
                    let mut acc = index_deps.clone();
                    for chunk in array.chunks(element_leaves) {
                        visitor.join(&mut acc, &chunk[leaf]);
                    }
                    acc
                })
                .collect();
            LeafTypeTree::from_elements(node.ty().clone(), elements)
        }
        _ => {
            // Default rule: every leaf depends on every leaf of every
            // operand.
            let mut acc = visitor.bottom();
            for tree in operand_values {
                for leaf in tree.elements() {
                    visitor.join(&mut acc, leaf);
                }
            }
            LeafTypeTree::same(node.ty(), acc)
        }
    }
}
