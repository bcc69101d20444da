use crate::{Node, NodeId, Op, Type, Value};
use petgraph::{algo, graph::DiGraph, graph::NodeIndex};
use sepal_utils::{Error, GetName, Id, SepalResult};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};

/// An arena of IR nodes with user back-edges and an implicit-use set.
///
/// Operands must exist before the node that consumes them, so the operand
/// graph is acyclic by construction. Nodes are only ever removed by the
/// state optimizer (through [crate::Proc::remove_state_element]); removed
/// slots are tombstoned and their ids never reused.
pub struct FunctionBase {
    name: Id,
    nodes: Vec<Option<Node>>,
    params: Vec<NodeId>,
    /// Nodes whose value escapes the function: a function's return value, a
    /// proc's next-token and next-state values. Owned by the wrappers.
    implicit_uses: BTreeSet<NodeId>,
}

impl FunctionBase {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        FunctionBase {
            name: name.into(),
            nodes: Vec::new(),
            params: Vec::new(),
            implicit_uses: BTreeSet::new(),
        }
    }

    /// Add a named parameter node.
    pub fn add_param<S: Into<Id>>(&mut self, name: S, ty: Type) -> NodeId {
        let id = self.insert(name.into(), Op::Param, ty, &[]);
        self.params.push(id);
        id
    }

    /// Add a node computing `op` over `operands`. The node is auto-named
    /// after its mnemonic.
    ///
    /// # Panics
    /// Panics if an operand does not name a live node.
    pub fn add_node(&mut self, op: Op, ty: Type, operands: &[NodeId]) -> NodeId {
        let name = Id::new(format!("{}_{}", op.mnemonic(), self.nodes.len()));
        self.insert(name, op, ty, operands)
    }

    /// Add a zero-valued literal of `ty`.
    pub fn add_zero_literal(&mut self, ty: &Type) -> NodeId {
        self.add_node(Op::Literal(Value::zero(ty)), ty.clone(), &[])
    }

    fn insert(
        &mut self,
        name: Id,
        op: Op,
        ty: Type,
        operands: &[NodeId],
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for operand in operands {
            assert!(
                self.is_live(*operand),
                "operand {operand} of new node `{name}' is not a live node"
            );
        }
        self.nodes.push(Some(Node {
            id,
            name,
            op,
            ty,
            operands: SmallVec::from_slice(operands),
            users: BTreeSet::new(),
        }));
        for operand in operands {
            self.node_mut(*operand).users.insert(id);
        }
        id
    }

    fn is_live(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.index())
            .is_some_and(|slot| slot.is_some())
    }

    /// The node with the given id.
    ///
    /// # Panics
    /// Panics if `id` refers to a removed node.
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("use of removed node {id}"))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("use of removed node {id}"))
    }

    /// Iterate over the live nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Ids of the live nodes in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().map(Node::id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn params(&self) -> &[NodeId] {
        &self.params
    }

    /// Whether this node's value escapes the function.
    pub fn has_implicit_use(&self, id: NodeId) -> bool {
        self.implicit_uses.contains(&id)
    }

    pub(crate) fn set_implicit_uses(&mut self, uses: BTreeSet<NodeId>) {
        self.implicit_uses = uses;
    }

    /// Rewrite every user of `node` to consume `replacement` instead.
    /// Implicit uses are positional designations and do not transfer.
    pub fn replace_uses_with(
        &mut self,
        node: NodeId,
        replacement: NodeId,
    ) -> SepalResult<()> {
        if !self.is_live(node) || !self.is_live(replacement) {
            return Err(Error::invalid_argument(format!(
                "replace_uses_with({node}, {replacement}) on removed node"
            )));
        }
        if node == replacement {
            return Ok(());
        }
        let users = std::mem::take(&mut self.node_mut(node).users);
        for user in &users {
            for operand in self.node_mut(*user).operands.iter_mut() {
                if *operand == node {
                    *operand = replacement;
                }
            }
        }
        self.node_mut(replacement).users.extend(users);
        Ok(())
    }

    /// Tombstone a node. The node must be dead: no users and no implicit
    /// use.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> SepalResult<()> {
        if !self.is_live(id) {
            return Err(Error::invalid_argument(format!(
                "remove_node({id}) on removed node"
            )));
        }
        if self.node(id).has_users() {
            return Err(Error::invalid_argument(format!(
                "cannot remove node `{}': it still has users",
                self.node(id).name()
            )));
        }
        if self.has_implicit_use(id) {
            return Err(Error::invalid_argument(format!(
                "cannot remove node `{}': it has an implicit use",
                self.node(id).name()
            )));
        }
        let operands: SmallVec<[NodeId; 4]> =
            self.node(id).operands.clone();
        for operand in operands {
            self.node_mut(operand).users.remove(&id);
        }
        self.params.retain(|p| *p != id);
        self.nodes[id.index()] = None;
        Ok(())
    }

    /// A topological order over the live nodes: every node appears after all
    /// of its operands.
    pub fn topo_sort(&self) -> Vec<NodeId> {
        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();
        for id in self.node_ids() {
            indices.insert(id, graph.add_node(id));
        }
        for node in self.nodes() {
            for operand in node.operands() {
                graph.add_edge(indices[operand], indices[&node.id()], ());
            }
        }
        algo::toposort(&graph, None)
            .expect("operand graph is acyclic by construction")
            .into_iter()
            .map(|idx| graph[idx])
            .collect()
    }
}

impl GetName for FunctionBase {
    fn name(&self) -> Id {
        self.name
    }
}
