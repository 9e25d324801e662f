//! Per-evaluation context (spec §3.5).

use std::any::Any;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::formatter::Formatter;
use crate::program::Program;
use crate::value::Value;

/// Argument buffer handed to callbacks. Most operators and functions take
/// a handful of arguments, so this avoids a heap allocation for the
/// common case (spec §4.6: "callback(scope, stack.tail(N))").
pub type Args = SmallVec<[Value; 4]>;

/// The evaluation scope passed to every callback and threaded through one
/// [`crate::vm::Vm::run`] call. A `Scope` exclusively owns its stack and
/// nested-call list; it must never be shared between two concurrent VM
/// calls (spec §5) — running the same [`Program`] on two threads requires
/// two distinct `Scope`s.
pub struct Scope {
    stack: Vec<Value>,
    formatter: Formatter,
    /// Programs currently being evaluated on this call chain, used by the
    /// VM to detect recursive named-expression invocation (spec §4.6
    /// step 1, §3.7 "Named-expression acyclicity at evaluation time").
    nested_call_stack: Vec<(String, Arc<Program>)>,
    /// Host-defined extension data a callback can downcast into.
    extensions: Box<dyn Any + Send + Sync>,
}

impl Scope {
    pub fn new(formatter: Formatter) -> Self {
        Scope {
            stack: Vec::new(),
            formatter,
            nested_call_stack: Vec::new(),
            extensions: Box::new(()),
        }
    }

    pub fn with_extensions(formatter: Formatter, extensions: Box<dyn Any + Send + Sync>) -> Self {
        Scope { stack: Vec::new(), formatter, nested_call_stack: Vec::new(), extensions }
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    pub fn extensions(&self) -> &(dyn Any + Send + Sync) {
        self.extensions.as_ref()
    }

    pub fn extensions_mut(&mut self) -> &mut (dyn Any + Send + Sync) {
        self.extensions.as_mut()
    }

    // --- stack access, used by the VM and by callbacks that need to push
    // extra intermediate results (none of the built-ins do, but the
    // contract allows it) ---

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn truncate(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    /// Pop `n` values off the stack, returning them in original
    /// (declaration) order.
    pub fn pop_n(&mut self, n: usize) -> Args {
        let start = self.stack.len().saturating_sub(n);
        self.stack.drain(start..).collect()
    }

    pub(crate) fn is_active(&self, program: &Arc<Program>) -> bool {
        self.nested_call_stack.iter().any(|(_, p)| Arc::ptr_eq(p, program))
    }

    pub(crate) fn push_active(&mut self, name: String, program: Arc<Program>) {
        self.nested_call_stack.push((name, program));
    }

    pub(crate) fn pop_active(&mut self) {
        self.nested_call_stack.pop();
    }

    /// The chain of named-expression invocations currently on this call
    /// stack, oldest first — used to report the cycle path in
    /// `CircularNestedExpressionsInfo`.
    pub fn active_chain(&self) -> Vec<String> {
        self.nested_call_stack.iter().map(|(name, _)| name.clone()).collect()
    }
}
