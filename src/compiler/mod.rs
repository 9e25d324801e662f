//! Compiles an [`Ast`] into a bytecode [`Program`] (spec §4.3).
//!
//! Walks the tree post-order: every node compiles its children first, then
//! asks the [`PluginRegistry`] to resolve itself against the children's
//! result types. A node whose children (and itself) all resolved to
//! compile-time constants collapses to a single `Const` command — this is
//! the whole of the optimizer; there is no separate peephole pass (contrast
//! the teacher's two-pass `optimizer/mod.rs`, which runs after a full
//! tree-walk compile specifically because MeTTa's grounded ops are not
//! looked up with argument values in hand the way a [`Plugin`] here is).

mod conditional;
mod folding;
mod nested;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ast::{Ast, SourcePos};
use crate::config::{CompileFlags, NormalizeFlags};
use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::normalize;
use crate::plugin::{CastLeg, Invocability, Match, Plugin, PluginRegistry, Priority};
use crate::program::{DecompileKind, Op, Program, ProgramBuilder};
use crate::value::{TypeRegistry, TypeTag, Value};

pub use nested::NamedTable;

/// Drives one or more [`Compiler::compile`] calls against a shared plugin
/// registry, type registry, and named-expression table (spec §6, "the
/// embedding interface").
pub struct Compiler {
    plugins: PluginRegistry,
    types: TypeRegistry,
    flags: CompileFlags,
    normalize_flags: NormalizeFlags,
    named: NamedTable,
}

impl Compiler {
    pub fn new(flags: CompileFlags, normalize_flags: NormalizeFlags) -> Self {
        Compiler {
            plugins: PluginRegistry::new(),
            types: TypeRegistry::new(),
            flags,
            normalize_flags,
            named: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn install_plugin(&mut self, plugin: Arc<dyn Plugin>, priority: Priority) {
        self.plugins.install(plugin, priority);
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub(crate) fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn flags(&self) -> CompileFlags {
        self.flags
    }

    pub fn normalize_flags(&self) -> NormalizeFlags {
        self.normalize_flags
    }

    /// A clone of the shared handle the VM uses to resolve late-bound
    /// `Expression(...)` calls (spec §4.4). Pass this to whatever
    /// evaluates programs produced by this compiler.
    pub fn named_table(&self) -> NamedTable {
        Arc::clone(&self.named)
    }

    pub fn add_named(&self, name: impl Into<String>, program: Arc<Program>) -> Option<Arc<Program>> {
        self.named.write().unwrap().insert(name.into(), program)
    }

    pub fn remove_named(&self, name: &str) -> Option<Arc<Program>> {
        self.named.write().unwrap().remove(name)
    }

    pub fn get_named(&self, name: &str) -> Option<Arc<Program>> {
        self.named.read().unwrap().get(name).cloned()
    }

    /// Render an AST back to text without compiling it (spec §4.8).
    pub fn normalize(&self, ast: &Ast) -> String {
        normalize::render(ast, self.normalize_flags)
    }

    /// Reconstruct the AST a [`Program`] would decompile to (spec §4.7).
    pub fn decompile(&self, program: &Program) -> Ast {
        crate::decompiler::decompile(program.commands())
    }

    /// Compile `ast`, producing a fully optimized, position-independent
    /// [`Program`] (spec §4.3/§6).
    pub fn compile(&mut self, ast: &Ast) -> CompileResult<Program> {
        self.compile_with_name(ast, None)
    }

    /// Compile `ast` and register the result under `name` in one step —
    /// the common case for building up a library of named expressions
    /// before compiling programs that reference them via `*name`.
    pub fn compile_named(&mut self, name: impl Into<String>, ast: &Ast) -> CompileResult<Arc<Program>> {
        let name = name.into();
        let program = Arc::new(self.compile_with_name(ast, Some(name.clone()))?);
        self.add_named(name, Arc::clone(&program));
        Ok(program)
    }

    pub(crate) fn compile_with_name(&mut self, ast: &Ast, name: Option<String>) -> CompileResult<Program> {
        let mut builder = ProgramBuilder::new();
        let (result_type, _) = self.compile_node(ast, &mut builder)?;
        let original_source = normalize::render(ast, NormalizeFlags::empty());
        let normalized_source = normalize::render(ast, self.normalize_flags);
        let decompiled = crate::decompiler::decompile(builder.commands());
        let optimized_source = normalize::render(&decompiled, self.normalize_flags);
        let callback_exception_fall_through =
            self.flags.contains(CompileFlags::CALLBACK_EXCEPTION_FALL_THROUGH);
        Ok(builder.finish(
            original_source,
            normalized_source,
            optimized_source,
            name,
            result_type,
            callback_exception_fall_through,
        ))
    }

    pub(crate) fn compile_node(
        &mut self,
        ast: &Ast,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        match ast {
            Ast::Literal { value, pos } => {
                builder.emit(
                    Op::Const(value.clone()),
                    value.type_tag(),
                    *pos,
                    DecompileKind::LiteralConstant,
                    None,
                );
                Ok((value.type_tag(), Some(value.clone())))
            }

            Ast::Identifier { name, pos } => self.compile_identifier(name, *pos, builder),

            Ast::UnaryOp { symbol, operand, pos } if symbol == "*" => {
                nested::compile_star_ref(self, operand, *pos, builder)
            }

            Ast::UnaryOp { symbol, operand, pos } => {
                let start = builder.len();
                let (operand_type, operand_const) = self.compile_node(operand, builder)?;
                let aliased = self.plugins.find_alias(symbol);
                let symbol = aliased.as_deref().unwrap_or(symbol);
                let symbol = if self.flags.contains(CompileFlags::ALLOW_BITWISE_BOOLEAN_OPERATORS)
                    && symbol == "~"
                    && operand_type == TypeTag::BOOL
                {
                    "!"
                } else {
                    symbol
                };
                let m = self
                    .plugins
                    .find_unary_op(symbol, operand_type, operand_const.as_ref(), &self.types)
                    .ok_or_else(|| {
                        CompileError::new(CompileErrorKind::UnaryOperatorNotDefined {
                            symbol: symbol.to_string(),
                            operand_type: self.types.name_of(operand_type).to_string(),
                        })
                        .context(format!("unary operator '{symbol}'"), *pos)
                    })?;
                let args = operand_const.map(|v| vec![v]);
                self.emit_dispatch(start, *pos, symbol, m, args, 1, DecompileKind::Unary, builder)
            }

            Ast::BinaryOp { symbol, lhs, rhs, pos } => {
                self.compile_binary(symbol, lhs, rhs, *pos, builder)
            }

            Ast::Function { name, args, pos, .. } if name == "Expression" => {
                nested::compile_expression_call(self, args, *pos, builder)
            }

            Ast::Function { name, args, was_identifier_form, pos } => {
                self.compile_function(name, args, *was_identifier_form, *pos, builder)
            }

            Ast::Conditional { cond, then_branch, else_branch, pos } => {
                conditional::compile_conditional(self, cond, then_branch, else_branch, *pos, builder)
            }
        }
    }

    fn compile_identifier(
        &mut self,
        name: &str,
        pos: SourcePos,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        if let Some(m) = self.plugins.find_identifier(name, &self.types) {
            let start = builder.len();
            return self.emit_dispatch(start, pos, name, m, Some(Vec::new()), 0, DecompileKind::Identifier, builder);
        }
        if self.flags.contains(CompileFlags::ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS) {
            if self.get_named(name).is_some() {
                return nested::compile_named_call(self, name, pos, builder);
            }
        }
        Err(CompileError::new(CompileErrorKind::UnknownIdentifier { name: name.to_string() })
            .context(format!("identifier '{name}'"), pos))
    }

    fn compile_function(
        &mut self,
        name: &str,
        args: &[Ast],
        was_identifier_form: bool,
        pos: SourcePos,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        if was_identifier_form && args.is_empty() {
            if !self.flags.contains(CompileFlags::ALLOW_EMPTY_PARENS_FOR_IDENTIFIER_FUNCTIONS)
                && self.plugins.find_identifier(name, &self.types).is_some()
            {
                return Err(CompileError::new(CompileErrorKind::IdentifierWithFunctionParentheses {
                    name: name.to_string(),
                })
                .context(format!("'{name}()'"), pos));
            }
        }

        let start = builder.len();
        let mut arg_types = Vec::with_capacity(args.len());
        let mut arg_values: Option<Vec<Value>> = Some(Vec::with_capacity(args.len()));
        for arg in args {
            let (ty, val) = self.compile_node(arg, builder)?;
            arg_types.push(ty);
            match (&mut arg_values, val) {
                (Some(values), Some(v)) => values.push(v),
                _ => arg_values = None,
            }
        }

        let m = self
            .plugins
            .find_function(name, &arg_types, arg_values.as_deref(), &self.types)
            .ok_or_else(|| {
                CompileError::new(CompileErrorKind::UnknownFunction { name: name.to_string(), arity: args.len() })
                    .context(format!("function '{name}'"), pos)
            })?;
        self.emit_dispatch(start, pos, name, m, arg_values, args.len(), DecompileKind::Function, builder)
    }

    fn compile_binary(
        &mut self,
        symbol: &str,
        lhs: &Ast,
        rhs: &Ast,
        pos: SourcePos,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        // Unconditional plugin-contributed aliases (e.g. verbal operators)
        // rewrite first (spec §4.3: "an alias rewrites the symbol before
        // dispatch"); `=` as `==` doesn't depend on operand types either, so
        // it rewrites before compiling anything too (spec §6
        // `AliasEqualsOperatorWithAssignOperator`).
        let aliased = self.plugins.find_alias(symbol);
        let symbol = aliased.as_deref().unwrap_or(symbol);
        let symbol = if self.flags.contains(CompileFlags::ALIAS_EQUALS_WITH_ASSIGN) && symbol == "=" {
            "=="
        } else {
            symbol
        };

        // Elvis (`a ?: b`) is `a ? a : b` (spec §4.4's Elvis fixture):
        // lowering to the conditional, rather than dispatching it as an
        // ordinary binary operator, tests `a`'s own truthiness before
        // branch-type unification casts it away. Dispatching it as a
        // plain binary op would auto-cast `a` to the branches' common
        // type *before* the callback ever saw it, so `false ?: "Elvis"`
        // would test the truthiness of the string `"false"` (always
        // truthy) instead of the bool `false`.
        if symbol == "?:" {
            return conditional::compile_conditional(self, lhs, lhs, rhs, pos, builder);
        }

        let lhs_start = builder.len();
        let (mut lhs_type, mut lhs_const) = self.compile_node(lhs, builder)?;
        let lhs_end = builder.len();
        let (mut rhs_type, mut rhs_const) = self.compile_node(rhs, builder)?;
        let rhs_end = builder.len();

        // `&`/`|` as `&&`/`||` is gated on both operands being boolean, which
        // is only known once they're compiled (spec §6
        // `AllowBitwiseBooleanOperators`).
        let symbol = if self.flags.contains(CompileFlags::ALLOW_BITWISE_BOOLEAN_OPERATORS)
            && lhs_type == TypeTag::BOOL
            && rhs_type == TypeTag::BOOL
        {
            match symbol {
                "&" => "&&",
                "|" => "||",
                other => other,
            }
        } else {
            symbol
        };

        if folding::optimizations_enabled(self.flags) {
            match (&lhs_const, &rhs_const) {
                (Some(c), None) => {
                    if let Some(repl) = self.plugins.find_binary_optimization(
                        symbol,
                        crate::plugin::Side::Lhs,
                        c,
                        rhs_type,
                        &self.types,
                    ) {
                        return self.apply_binary_opt(
                            repl,
                            crate::plugin::Side::Lhs,
                            lhs_start,
                            lhs_end,
                            rhs_type,
                            pos,
                            builder,
                        );
                    }
                }
                (None, Some(c)) => {
                    if let Some(repl) = self.plugins.find_binary_optimization(
                        symbol,
                        crate::plugin::Side::Rhs,
                        c,
                        lhs_type,
                        &self.types,
                    ) {
                        return self.apply_binary_opt(
                            repl,
                            crate::plugin::Side::Rhs,
                            lhs_start,
                            lhs_end,
                            lhs_type,
                            pos,
                            builder,
                        );
                    }
                }
                _ => {}
            }
        }

        let mut m = self
            .plugins
            .find_binary_op(symbol, lhs_type, rhs_type, lhs_const.as_ref(), rhs_const.as_ref(), &self.types);

        if m.is_none() {
            if let Some(cast) = self.plugins.find_auto_cast(
                crate::plugin::AutoCastContext::BinaryOperator { symbol: symbol.to_string() },
                lhs_type,
                rhs_type,
                &self.types,
            ) {
                // The lhs cast shifts everything after it by however many
                // commands it net added or removed: +1 if it spliced in a
                // `Func` cast, but some other delta (0 or negative) if it
                // folded a constant via `remove_range`+`insert`. Measure the
                // builder instead of assuming a fixed shift.
                let mut lhs_cast_delta: isize = 0;
                if let Some(leg) = &cast.lhs {
                    let len_before = builder.len();
                    let (ty, val) =
                        self.apply_cast(leg, lhs_start, lhs_end, lhs_const.clone(), pos, builder)?;
                    lhs_type = ty;
                    lhs_const = val;
                    lhs_cast_delta = builder.len() as isize - len_before as isize;
                }
                let rhs_start_after_cast = (lhs_end as isize + lhs_cast_delta) as usize;
                let rhs_end_after_cast = (rhs_end as isize + lhs_cast_delta) as usize;
                if let Some(leg) = &cast.rhs {
                    let (ty, val) = self.apply_cast(
                        leg,
                        rhs_start_after_cast,
                        rhs_end_after_cast,
                        rhs_const.clone(),
                        pos,
                        builder,
                    )?;
                    rhs_type = ty;
                    rhs_const = val;
                }
            }
            m = self.plugins.find_binary_op(symbol, lhs_type, rhs_type, lhs_const.as_ref(), rhs_const.as_ref(), &self.types);
        }

        let m = m.ok_or_else(|| {
            CompileError::new(CompileErrorKind::BinaryOperatorNotDefined {
                symbol: symbol.to_string(),
                lhs_type: self.types.name_of(lhs_type).to_string(),
                rhs_type: self.types.name_of(rhs_type).to_string(),
            })
            .context(format!("binary operator '{symbol}'"), pos)
        })?;

        let args = match (lhs_const, rhs_const) {
            (Some(a), Some(b)) => Some(vec![a, b]),
            _ => None,
        };
        self.emit_dispatch(lhs_start, pos, symbol, m, args, 2, DecompileKind::Binary, builder)
    }

    /// Apply an identity/absorbing-element rewrite found for a binary
    /// operator with exactly one constant operand (spec §4.2 "binary
    /// operator optimization table"; scenario 12: `x * 0` -> just `CONST
    /// 0`). `other_type` is the type the surviving operand (if any) keeps.
    #[allow(clippy::too_many_arguments)]
    fn apply_binary_opt(
        &mut self,
        repl: crate::plugin::Replacement,
        constant_side: crate::plugin::Side,
        lhs_start: usize,
        lhs_end: usize,
        other_type: TypeTag,
        pos: SourcePos,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        builder.bump_optimizations();
        match repl {
            crate::plugin::Replacement::OtherOperand => {
                match constant_side {
                    // Constant was lhs: drop its code, keep rhs's (which
                    // now starts where lhs used to).
                    crate::plugin::Side::Lhs => builder.remove_range(lhs_start, lhs_end),
                    // Constant was rhs: just drop its trailing code.
                    crate::plugin::Side::Rhs => builder.truncate(lhs_end),
                }
                Ok((other_type, None))
            }
            crate::plugin::Replacement::Constant(value) => {
                builder.truncate(lhs_start);
                let ty = value.type_tag();
                builder.emit(
                    Op::Const(value.clone()),
                    ty,
                    pos,
                    DecompileKind::OptimizationConstant,
                    None,
                );
                Ok((ty, Some(value)))
            }
        }
    }

    /// Insert/fold an auto-cast applied to the sub-expression occupying
    /// `[start, end)`. If that sub-expression was a compile-time constant
    /// the cast folds into a replacement `Const`; otherwise a `Func`
    /// command performing the cast is spliced in right after it.
    pub(crate) fn apply_cast(
        &mut self,
        leg: &CastLeg,
        start: usize,
        end: usize,
        const_val: Option<Value>,
        pos: SourcePos,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        if let Some(v) = const_val {
            let casted = folding::invoke_ct(&leg.callback, &[v], self.flags)?;
            // `[start, end)` may have trailing siblings after it (e.g. the
            // other operand's already-compiled commands) still in `builder`,
            // so only the operand's own range is removed and replaced —
            // `truncate` would also drop everything after it.
            builder.remove_range(start, end);
            builder.insert(
                start,
                Op::Const(casted.clone()),
                leg.result_type,
                pos,
                DecompileKind::OptimizationConstant,
                Some(leg.reverse_cast_name.clone()),
            );
            builder.bump_optimizations();
            Ok((leg.result_type, Some(casted)))
        } else {
            builder.insert(
                end,
                Op::Func { callback: Arc::clone(&leg.callback), arg_count: 1, was_identifier_form: false },
                leg.result_type,
                pos,
                DecompileKind::AutoCast,
                Some(leg.reverse_cast_name.clone()),
            );
            Ok((leg.result_type, None))
        }
    }

    /// Shared tail for identifier/unary/binary/function dispatch: honor a
    /// plugin's `short_circuit`, fold a CT-invocable match with all-constant
    /// args, or emit a `Func` command.
    fn emit_dispatch(
        &mut self,
        start: usize,
        pos: SourcePos,
        display_name: &str,
        m: Match,
        const_args: Option<Vec<Value>>,
        arg_count: usize,
        kind: DecompileKind,
        builder: &mut ProgramBuilder,
    ) -> CompileResult<(TypeTag, Option<Value>)> {
        if let Some(v) = m.short_circuit {
            builder.truncate(start);
            builder.emit(
                Op::Const(v.clone()),
                m.result_type,
                pos,
                DecompileKind::OptimizationConstant,
                Some(display_name.to_string()),
            );
            builder.bump_optimizations();
            return Ok((m.result_type, Some(v)));
        }

        if m.invocability == Invocability::Ct && folding::optimizations_enabled(self.flags) {
            if let Some(args) = &const_args {
                let v = folding::invoke_ct(&m.callback, args, self.flags)?;
                builder.truncate(start);
                builder.emit(
                    Op::Const(v.clone()),
                    m.result_type,
                    pos,
                    DecompileKind::OptimizationConstant,
                    Some(display_name.to_string()),
                );
                builder.bump_optimizations();
                return Ok((m.result_type, Some(v)));
            }
        }

        let name = m.rewritten_name.unwrap_or_else(|| display_name.to_string());
        builder.emit(
            Op::Func { callback: m.callback, arg_count: arg_count as i32, was_identifier_form: false },
            m.result_type,
            pos,
            kind,
            Some(name),
        );
        Ok((m.result_type, None))
    }
}
