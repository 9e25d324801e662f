//! Plugin trait, dispatch helper, and priority-ordered registry (spec §4.2).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::EvalResult;
use crate::scope::Scope;
use crate::value::{TypeRegistry, TypeTag, Value};

/// A host callback invoked by `FUNC` commands and by compile-time (CT)
/// plugin invocation. Receives the scope and the argument values already
/// popped off the runtime (or compile-time constant) stack, in
/// declaration order.
pub type Callback = Arc<dyn Fn(&mut Scope, &[Value]) -> EvalResult<Value> + Send + Sync>;

/// Whether a callback is safe to invoke during compilation when every
/// argument is a compile-time constant (spec glossary: CT vs ET).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocability {
    /// Compile-time-invokable.
    Ct,
    /// Evaluation-time-only.
    Et,
}

/// The result of a successful plugin dispatch for an identifier, function,
/// or operator. One shape serves all four `try_compile_*` hooks; fields
/// that don't apply to a given hook (e.g. `rewritten_name` for operators)
/// are simply left `None`.
#[derive(Clone)]
pub struct Match {
    pub callback: Callback,
    pub result_type: TypeTag,
    pub invocability: Invocability,
    /// Function-name rewrite (e.g. case normalization) — function hook only.
    pub rewritten_name: Option<String>,
    /// A plugin may short-circuit straight to a constant instead of asking
    /// the compiler to invoke its callback (spec §4.2 item 2).
    pub short_circuit: Option<Value>,
}

impl Match {
    pub fn new(callback: Callback, result_type: TypeTag, invocability: Invocability) -> Self {
        Match { callback, result_type, invocability, rewritten_name: None, short_circuit: None }
    }

    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.rewritten_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn constant(mut self, value: Value) -> Self {
        self.short_circuit = Some(value);
        self
    }
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("result_type", &self.result_type)
            .field("invocability", &self.invocability)
            .field("rewritten_name", &self.rewritten_name)
            .finish()
    }
}

/// A single cast leg used by an [`AutoCast`]: the callback that performs
/// the conversion plus the name the decompiler should print for the
/// reverse operation (spec §4.3: "Casts carry a reverse-cast function
/// name used by the decompiler so that the normalized string displays
/// `Integer(x)` or `Float(x)` explicitly").
#[derive(Clone)]
pub struct CastLeg {
    pub callback: Callback,
    pub result_type: TypeTag,
    pub reverse_cast_name: String,
}

impl fmt::Debug for CastLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastLeg")
            .field("result_type", &self.result_type)
            .field("reverse_cast_name", &self.reverse_cast_name)
            .finish()
    }
}

/// Where an auto-cast is being inserted, passed to
/// [`Plugin::try_compile_auto_cast`] so a plugin can decide differently
/// for e.g. a conditional's branches vs. a binary operator's operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoCastContext {
    Conditional,
    BinaryOperator { symbol: String },
}

/// A candidate implicit widening for one or both operands.
#[derive(Debug, Clone, Default)]
pub struct AutoCast {
    pub lhs: Option<CastLeg>,
    pub rhs: Option<CastLeg>,
}

/// A compiler extension that resolves identifiers, functions, and
/// operators for specific argument-type combinations (spec §4.2).
///
/// All four compile hooks are optional; a plugin that only contributes,
/// say, arithmetic operators leaves the identifier and auto-cast hooks at
/// their default (`None`) implementations.
pub trait Plugin: Send + Sync {
    /// A short name for diagnostics (not used for dispatch).
    fn plugin_name(&self) -> &str;

    fn try_compile_identifier(&self, _name: &str, _types: &TypeRegistry) -> Option<Match> {
        None
    }

    /// `arg_values` is `Some` only when every argument compiled down to a
    /// literal or optimization constant (spec §4.3).
    fn try_compile_function(
        &self,
        _name: &str,
        _arg_types: &[TypeTag],
        _arg_values: Option<&[Value]>,
        _types: &TypeRegistry,
    ) -> Option<Match> {
        None
    }

    fn try_compile_unary_op(
        &self,
        _symbol: &str,
        _arg_type: TypeTag,
        _arg_value: Option<&Value>,
        _types: &TypeRegistry,
    ) -> Option<Match> {
        None
    }

    fn try_compile_binary_op(
        &self,
        _symbol: &str,
        _lhs_type: TypeTag,
        _rhs_type: TypeTag,
        _lhs_value: Option<&Value>,
        _rhs_value: Option<&Value>,
        _types: &TypeRegistry,
    ) -> Option<Match> {
        None
    }

    fn try_compile_auto_cast(
        &self,
        _ctx: AutoCastContext,
        _lhs_type: TypeTag,
        _rhs_type: TypeTag,
        _types: &TypeRegistry,
    ) -> Option<AutoCast> {
        None
    }

    /// Identity/absorbing-element rewrite for a binary operator where
    /// exactly one operand is a known compile-time constant (spec §4.2
    /// "Dispatch helper (Calculus)", "binary operator optimization
    /// table"). `constant_side` says which operand holds `constant`;
    /// `other_type` is the type of the non-constant operand.
    fn try_compile_binary_optimization(
        &self,
        _symbol: &str,
        _constant_side: Side,
        _constant: &Value,
        _other_type: TypeTag,
        _types: &TypeRegistry,
    ) -> Option<Replacement> {
        None
    }

    /// An unconditional, type-independent operator alias (spec §4.2
    /// "operator alias table", e.g. the verbal operators of spec §6: `and`
    /// aliases to `&&`). Consulted before operator dispatch (spec §4.3:
    /// "an alias rewrites the symbol before dispatch"). Context-*dependent*
    /// aliasing (bitwise `&`/`|`/`~` gated on boolean operands, `=` gated on
    /// the `AliasEqualsOperatorWithAssignOperator` flag) is handled directly
    /// by the [`crate::compiler::Compiler`] instead, since it needs
    /// information (operand types, compile flags) this hook doesn't see.
    fn alias_of(&self, _symbol: &str) -> Option<String> {
        None
    }
}

/// Numeric dispatch priority; higher values are queried first. Built-in
/// plugins register at fixed, comparatively low priorities so that
/// third-party plugins installed at [`Priority::CUSTOM`] (the default for
/// [`crate::compiler::Compiler::install_plugin`] callers that don't
/// specify one) always get first refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    pub const BUILTIN_CAST: Priority = Priority(100);
    pub const BUILTIN_OPERATORS: Priority = Priority(200);
    pub const CUSTOM: Priority = Priority(1000);
}

/// Priority-ordered collection of plugins (spec §4.2/§3.6). The first
/// plugin (in priority order, ties broken by insertion order) whose hook
/// returns `Some` wins.
pub struct PluginRegistry {
    plugins: Vec<(Priority, Arc<dyn Plugin>)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry { plugins: Vec::new() }
    }

    /// Install a plugin. Stable sort preserves insertion order among
    /// plugins installed at equal priority (spec: "stable ordering across
    /// equal priorities is required").
    pub fn install(&mut self, plugin: Arc<dyn Plugin>, priority: Priority) {
        self.plugins.push((priority, plugin));
        self.plugins.sort_by(|a, b| b.0.cmp(&a.0));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter().map(|(_, p)| p)
    }

    pub fn find_identifier(&self, name: &str, types: &TypeRegistry) -> Option<Match> {
        self.iter().find_map(|p| p.try_compile_identifier(name, types))
    }

    pub fn find_function(
        &self,
        name: &str,
        arg_types: &[TypeTag],
        arg_values: Option<&[Value]>,
        types: &TypeRegistry,
    ) -> Option<Match> {
        self.iter().find_map(|p| p.try_compile_function(name, arg_types, arg_values, types))
    }

    pub fn find_unary_op(
        &self,
        symbol: &str,
        arg_type: TypeTag,
        arg_value: Option<&Value>,
        types: &TypeRegistry,
    ) -> Option<Match> {
        self.iter().find_map(|p| p.try_compile_unary_op(symbol, arg_type, arg_value, types))
    }

    pub fn find_binary_op(
        &self,
        symbol: &str,
        lhs_type: TypeTag,
        rhs_type: TypeTag,
        lhs_value: Option<&Value>,
        rhs_value: Option<&Value>,
        types: &TypeRegistry,
    ) -> Option<Match> {
        self.iter()
            .find_map(|p| p.try_compile_binary_op(symbol, lhs_type, rhs_type, lhs_value, rhs_value, types))
    }

    pub fn find_auto_cast(
        &self,
        ctx: AutoCastContext,
        lhs_type: TypeTag,
        rhs_type: TypeTag,
        types: &TypeRegistry,
    ) -> Option<AutoCast> {
        self.iter().find_map(|p| p.try_compile_auto_cast(ctx.clone(), lhs_type, rhs_type, types))
    }

    /// First plugin-contributed alias for `symbol`, if any (spec §4.3:
    /// consulted before operator dispatch, both unary and binary).
    pub fn find_alias(&self, symbol: &str) -> Option<String> {
        self.iter().find_map(|p| p.alias_of(symbol))
    }

    pub fn find_binary_optimization(
        &self,
        symbol: &str,
        constant_side: Side,
        constant: &Value,
        other_type: TypeTag,
        types: &TypeRegistry,
    ) -> Option<Replacement> {
        self.iter().find_map(|p| {
            p.try_compile_binary_optimization(symbol, constant_side, constant, other_type, types)
        })
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Which side of a binary operator carries the constant operand, for
/// [`BinaryOptRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Lhs,
    Rhs,
}

/// What an identity/absorbing-element rewrite collapses a binary
/// operator expression to.
#[derive(Clone)]
pub enum Replacement {
    /// Replace the whole sub-expression with the non-constant operand
    /// (e.g. `x + 0 -> x`).
    OtherOperand,
    /// Replace the whole sub-expression with a constant (e.g. `x * 0 -> 0`).
    Constant(Value),
}

/// One identity/absorbing-element rule: `symbol` with a constant on
/// `side` satisfying `matches_constant`, paired against any operand of
/// `other_type`, folds to `replacement`.
pub struct BinaryOptRule {
    pub symbol: &'static str,
    pub side: Side,
    pub other_type: TypeTag,
    pub matches_constant: fn(&Value) -> bool,
    pub replacement: Replacement,
}

/// A reusable dispatch base a [`Plugin`] can embed: three lookup tables
/// keyed by (name-or-symbol, argument-type signature), plus an optional
/// operator alias table and an optional binary-operator optimization
/// table for identity/absorbing-element rewrites (spec §4.2, "Dispatch
/// helper (Calculus)").
#[derive(Default)]
pub struct Calculus {
    identifiers: HashMap<String, Match>,
    functions: HashMap<(String, Vec<TypeTag>), Match>,
    unary_ops: HashMap<(String, TypeTag), Match>,
    binary_ops: HashMap<(String, TypeTag, TypeTag), Match>,
    /// e.g. `&` -> `&&` when both operands are boolean; applied by the
    /// caller only under the conditions it decides (the table itself just
    /// records the rewrite).
    aliases: HashMap<String, String>,
    binary_opts: Vec<BinaryOptRule>,
}

impl Calculus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_identifier(&mut self, name: impl Into<String>, m: Match) {
        self.identifiers.insert(name.into(), m);
    }

    pub fn add_function(&mut self, name: impl Into<String>, arg_types: Vec<TypeTag>, m: Match) {
        self.functions.insert((name.into(), arg_types), m);
    }

    pub fn add_unary_op(&mut self, symbol: impl Into<String>, arg_type: TypeTag, m: Match) {
        self.unary_ops.insert((symbol.into(), arg_type), m);
    }

    pub fn add_binary_op(&mut self, symbol: impl Into<String>, lhs: TypeTag, rhs: TypeTag, m: Match) {
        self.binary_ops.insert((symbol.into(), lhs, rhs), m);
    }

    pub fn add_alias(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.aliases.insert(from.into(), to.into());
    }

    pub fn add_binary_opt(&mut self, rule: BinaryOptRule) {
        self.binary_opts.push(rule);
    }

    pub fn alias_of(&self, symbol: &str) -> Option<&str> {
        self.aliases.get(symbol).map(String::as_str)
    }

    pub fn lookup_identifier(&self, name: &str) -> Option<Match> {
        self.identifiers.get(name).cloned()
    }

    pub fn lookup_function(&self, name: &str, arg_types: &[TypeTag]) -> Option<Match> {
        self.functions.get(&(name.to_string(), arg_types.to_vec())).cloned()
    }

    pub fn lookup_unary_op(&self, symbol: &str, arg_type: TypeTag) -> Option<Match> {
        self.unary_ops.get(&(symbol.to_string(), arg_type)).cloned()
    }

    pub fn lookup_binary_op(&self, symbol: &str, lhs: TypeTag, rhs: TypeTag) -> Option<Match> {
        self.binary_ops.get(&(symbol.to_string(), lhs, rhs)).cloned()
    }

    /// Look for an identity/absorbing-element rewrite given which side
    /// holds a known constant.
    pub fn lookup_binary_opt(
        &self,
        symbol: &str,
        side: Side,
        constant: &Value,
        other_type: TypeTag,
    ) -> Option<&Replacement> {
        self.binary_opts.iter().find_map(|rule| {
            if rule.symbol == symbol
                && rule.side == side
                && rule.other_type == other_type
                && (rule.matches_constant)(constant)
            {
                Some(&rule.replacement)
            } else {
                None
            }
        })
    }
}
