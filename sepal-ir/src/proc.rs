use crate::{FunctionBase, NodeId, Type, Value};
use sepal_utils::{Error, Id, SepalResult};
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

/// A pure computation with a designated return value.
pub struct Function {
    base: FunctionBase,
    return_value: Option<NodeId>,
}

impl Function {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Function {
            base: FunctionBase::new(name),
            return_value: None,
        }
    }

    pub fn base(&self) -> &FunctionBase {
        &self.base
    }

    pub fn return_value(&self) -> Option<NodeId> {
        self.return_value
    }

    /// Designate the node whose value the function returns. The return value
    /// escapes the function and so carries an implicit use.
    pub fn set_return(&mut self, node: NodeId) {
        self.return_value = Some(node);
        self.base.set_implicit_uses(BTreeSet::from([node]));
    }
}

impl Deref for Function {
    type Target = FunctionBase;

    fn deref(&self) -> &FunctionBase {
        &self.base
    }
}

impl DerefMut for Function {
    fn deref_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }
}

/// One element of a proc's carried state: a parameter node exposing the
/// current value, the initial value, and the designated next-state node.
pub struct StateElement {
    param: NodeId,
    init: Value,
    next: NodeId,
}

impl StateElement {
    pub fn param(&self) -> NodeId {
        self.param
    }

    pub fn init(&self) -> &Value {
        &self.init
    }

    pub fn next(&self) -> NodeId {
        self.next
    }
}

/// A stateful, channel-communicating process. Each iteration consumes the
/// token parameter and the current state values and produces a next token
/// and next state values; the recurrence from next-state back to state
/// parameter is semantic and deliberately *not* an operand edge.
pub struct Proc {
    base: FunctionBase,
    token_param: NodeId,
    next_token: NodeId,
    state: Vec<StateElement>,
}

impl Proc {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        let mut base = FunctionBase::new(name);
        let token_param = base.add_param("tok", Type::Token);
        let mut proc_ = Proc {
            base,
            token_param,
            next_token: token_param,
            state: Vec::new(),
        };
        proc_.recompute_implicit_uses();
        proc_
    }

    pub fn base(&self) -> &FunctionBase {
        &self.base
    }

    pub fn token_param(&self) -> NodeId {
        self.token_param
    }

    pub fn next_token(&self) -> NodeId {
        self.next_token
    }

    /// Designate the token produced by one proc iteration.
    pub fn set_next_token(&mut self, node: NodeId) -> SepalResult<()> {
        if *self.base.node(node).ty() != Type::Token {
            return Err(Error::invalid_argument(format!(
                "next token `{}' is not token-typed",
                self.base.node(node).name
            )));
        }
        self.next_token = node;
        self.recompute_implicit_uses();
        Ok(())
    }

    pub fn state_element_count(&self) -> usize {
        self.state.len()
    }

    pub fn state_elements(&self) -> &[StateElement] {
        &self.state
    }

    /// Append a state element with the given initial value. The next-state
    /// designation defaults to the state parameter itself, i.e. the element
    /// holds its value until redesignated. Returns the element's index.
    pub fn add_state_element<S: Into<Id>>(
        &mut self,
        name: S,
        init: Value,
    ) -> usize {
        let param = self.base.add_param(name, init.ty());
        self.state.push(StateElement {
            param,
            init,
            next: param,
        });
        self.recompute_implicit_uses();
        self.state.len() - 1
    }

    pub fn state_param(&self, index: usize) -> NodeId {
        self.state[index].param
    }

    pub fn state_type(&self, index: usize) -> &Type {
        self.base.node(self.state[index].param).ty()
    }

    pub fn next_state_element(&self, index: usize) -> NodeId {
        self.state[index].next
    }

    /// The state index exposed by a parameter node, if it is one.
    pub fn state_param_index(&self, node: NodeId) -> Option<usize> {
        self.state.iter().position(|e| e.param == node)
    }

    /// Designate the node computing the next value of state element `index`.
    pub fn set_next_state_element(
        &mut self,
        index: usize,
        node: NodeId,
    ) -> SepalResult<()> {
        if self.base.node(node).ty() != self.state_type(index) {
            return Err(Error::invalid_argument(format!(
                "next value `{}' of state element {} has type {}, expected {}",
                self.base.node(node).name,
                index,
                self.base.node(node).ty(),
                self.state_type(index)
            )));
        }
        self.state[index].next = node;
        self.recompute_implicit_uses();
        Ok(())
    }

    /// Remove state element `index`, shifting higher indices down. The state
    /// parameter must be dead.
    pub fn remove_state_element(&mut self, index: usize) -> SepalResult<()> {
        let param = self.state[index].param;
        if self.base.node(param).has_users() {
            return Err(Error::invalid_argument(format!(
                "cannot remove state element `{}': its parameter still has \
                 users",
                self.base.node(param).name
            )));
        }
        self.state.remove(index);
        self.recompute_implicit_uses();
        self.base.remove_node(param)
    }

    fn recompute_implicit_uses(&mut self) {
        let mut uses = BTreeSet::from([self.next_token]);
        uses.extend(self.state.iter().map(StateElement::next));
        self.base.set_implicit_uses(uses);
    }
}

impl Deref for Proc {
    type Target = FunctionBase;

    fn deref(&self) -> &FunctionBase {
        &self.base
    }
}

impl DerefMut for Proc {
    fn deref_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }
}
