//! Dataflow intermediate representation for the Sepal backend.
//!
//! A [FunctionBase] is an arena of [Node]s forming a DAG: each node has an
//! opcode, a type, an ordered operand list, and a set of user back-edges.
//! Two wrappers give the arena its meaning: [Function] designates a return
//! value, while [Proc] carries a token parameter and a list of state
//! elements, each with an initial value and a designated next-state node.
//! The proc's "back edge" from a next-state node to its state parameter is
//! represented out-of-band through [Proc::next_state_element]; the node graph
//! itself stays acyclic.

mod function;
mod ltt;
mod node;
mod proc;
mod types;
mod value;

pub use function::FunctionBase;
pub use ltt::LeafTypeTree;
pub use node::{Node, NodeId, Op};
pub use proc::{Function, Proc, StateElement};
pub use types::Type;
pub use value::Value;

// Re-export types from the utility crate.
pub use sepal_utils::{GetName, Id};
