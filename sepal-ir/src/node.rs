use crate::{Type, Value};
use sepal_utils::{GetName, Id};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

/// Dense index of a node within its function's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The operation a node performs. Channel operations carry the name of the
/// channel they touch; everything else is identified by the variant alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// A function or proc parameter, including proc state parameters.
    Param,
    /// A constant.
    Literal(Value),
    Add,
    Sub,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Eq,
    Lt,
    /// Construct a tuple from the operands.
    Tuple,
    /// Read element `usize` of a tuple-typed operand.
    TupleIndex(usize),
    /// Construct an array from the operands.
    Array,
    /// Read a dynamically selected element of an array-typed operand.
    ArrayIndex,
    /// Join the token operands into a single token.
    AfterAll,
    /// Transmit the data operand on `channel`. Operands: token, data.
    Send { channel: Id },
    /// Receive a value from `channel`. Operands: token. Produces
    /// `(token, data)`.
    Receive { channel: Id },
    /// Fail execution when the condition operand is false.
    Assert,
    /// Record coverage of the condition operand.
    Cover,
    /// Emit the data operands to the simulation log.
    Trace,
}

impl Op {
    /// Whether executing this operation is externally observable. Params are
    /// in this set: their values arrive from outside the function. Analyses
    /// that only care about *non-parameter* effects filter params themselves.
    pub fn is_side_effecting(&self) -> bool {
        matches!(
            self,
            Op::Param
                | Op::Send { .. }
                | Op::Receive { .. }
                | Op::Assert
                | Op::Cover
                | Op::Trace
        )
    }

    /// The channel this operation communicates on, if any.
    pub fn channel(&self) -> Option<Id> {
        match self {
            Op::Send { channel } | Op::Receive { channel } => Some(*channel),
            _ => None,
        }
    }

    /// Short name used to derive node names.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Param => "param",
            Op::Literal(_) => "literal",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Not => "not",
            Op::Neg => "neg",
            Op::Eq => "eq",
            Op::Lt => "lt",
            Op::Tuple => "tuple",
            Op::TupleIndex(_) => "tuple_index",
            Op::Array => "array",
            Op::ArrayIndex => "array_index",
            Op::AfterAll => "after_all",
            Op::Send { .. } => "send",
            Op::Receive { .. } => "receive",
            Op::Assert => "assert",
            Op::Cover => "cover",
            Op::Trace => "trace",
        }
    }
}

/// A single IR node: an operation applied to an ordered list of operands,
/// producing one value of a known type. User back-edges are kept as an
/// ordered set so every traversal over them is deterministic.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: Id,
    pub(crate) op: Op,
    pub(crate) ty: Type,
    pub(crate) operands: SmallVec<[NodeId; 4]>,
    pub(crate) users: BTreeSet<NodeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    /// The nodes that use this node's value, in id order.
    pub fn users(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.users.iter().copied()
    }

    pub fn has_users(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn is_param(&self) -> bool {
        matches!(self.op, Op::Param)
    }

    pub fn is_send(&self) -> bool {
        matches!(self.op, Op::Send { .. })
    }

    pub fn is_receive(&self) -> bool {
        matches!(self.op, Op::Receive { .. })
    }

    pub fn channel(&self) -> Option<Id> {
        self.op.channel()
    }
}

impl GetName for Node {
    fn name(&self) -> Id {
        self.name
    }
}
