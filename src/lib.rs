//! A typed, extensible expression engine: parses (front end out of scope,
//! see `ast`) single-line expressions into an AST, type-checks and
//! optimizes them against a pluggable set of operators/functions/
//! identifiers, compiles to bytecode, and evaluates that bytecode against
//! an evaluation scope. Named expressions may reference one another
//! (nested expressions), including recursively at evaluation time, which
//! the virtual machine detects and refuses.
//!
//! # Architecture
//!
//! The compilation pipeline is: expression source -> external parser (not
//! part of this crate) -> [`ast::Ast`] -> [`compiler::Compiler`] (consulting
//! the [`plugin::PluginRegistry`], performing constant folding and
//! identity-rewrite optimization as it goes) -> [`program::Program`]. The
//! evaluation pipeline is: `Program` + [`scope::Scope`] -> [`vm::Vm`] ->
//! [`value::Value`].
//!
//! [`Engine`] bundles a `Compiler` and a `Vm` behind the embedding
//! interface (spec §6): `compile`, `evaluate`, `add_named`/`remove_named`/
//! `get_named`, `install_plugin`, `decompile`, `normalized_source`,
//! `optimized_source`. Because the lexer/parser front end is out of scope,
//! callers build [`ast::Ast`] values directly with its constructor helpers
//! rather than parsing text — see [`Engine::compile`]'s doc example.
//!
//! # Example
//!
//! ```
//! use expr_engine::ast::Ast;
//! use expr_engine::value::Value;
//! use expr_engine::Engine;
//!
//! let mut engine = Engine::with_builtins();
//! // 1 + 2 * 3
//! let ast = Ast::binary(
//!     "+",
//!     Ast::literal(Value::Int(1)),
//!     Ast::binary("*", Ast::literal(Value::Int(2)), Ast::literal(Value::Int(3))),
//! );
//! let program = engine.compile(&ast).unwrap();
//! let mut scope = engine.new_scope();
//! let result = engine.evaluate(&program, &mut scope).unwrap();
//! assert_eq!(result, Value::Int(7));
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod decompiler;
pub mod error;
pub mod formatter;
pub mod normalize;
pub mod plugin;
pub mod plugins;
pub mod program;
pub mod scope;
pub mod value;
pub mod vm;

use std::sync::Arc;

use tracing::instrument;

pub use ast::Ast;
pub use compiler::Compiler;
pub use config::{CompileFlags, NormalizeFlags};
pub use error::{CompileError, CompileResult, EvalError, EvalResult};
pub use formatter::Formatter;
pub use program::Program;
pub use scope::Scope;
pub use value::{TypeRegistry, TypeTag, Value};
pub use vm::Vm;

/// Bundles a [`Compiler`] and a [`Vm`] behind the embedding interface spec
/// §6 describes. Not required to use the crate — a host that wants to
/// drive `Compiler`/`Vm` directly (e.g. to compile on one thread and
/// evaluate on several without funneling everything through one `Engine`)
/// is free to; `Engine` is a convenience, not a privileged API.
pub struct Engine {
    compiler: Compiler,
    vm: Vm,
}

impl Engine {
    pub fn new(flags: CompileFlags, normalize_flags: NormalizeFlags) -> Self {
        Engine { compiler: Compiler::new(flags, normalize_flags), vm: Vm::new() }
    }

    /// An engine configured with default flags and the built-in plugin
    /// fixtures installed (spec §1 carve-out; see [`plugins`]).
    pub fn with_builtins() -> Self {
        let mut engine = Engine::new(CompileFlags::default(), NormalizeFlags::default());
        plugins::install_builtins(&mut engine.compiler);
        engine
    }

    pub fn install_plugin(&mut self, plugin: Arc<dyn plugin::Plugin>, priority: plugin::Priority) {
        self.compiler.install_plugin(plugin, priority);
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        self.compiler.types_mut()
    }

    /// Compile `ast` into a standalone [`Program`] (spec §6 `compile`).
    #[instrument(skip(self, ast))]
    pub fn compile(&mut self, ast: &Ast) -> CompileResult<Arc<Program>> {
        Ok(Arc::new(self.compiler.compile(ast)?))
    }

    /// Compile `ast` and register it under `name` in one step, so later
    /// compiles can reference it via `*name` or `Expression(name, ...)`
    /// (spec §4.4).
    #[instrument(skip(self, ast))]
    pub fn compile_named(&mut self, name: impl Into<String>, ast: &Ast) -> CompileResult<Arc<Program>> {
        self.compiler.compile_named(name, ast)
    }

    pub fn add_named(&self, name: impl Into<String>, program: Arc<Program>) -> Option<Arc<Program>> {
        self.compiler.add_named(name, program)
    }

    pub fn remove_named(&self, name: &str) -> Option<Arc<Program>> {
        self.compiler.remove_named(name)
    }

    pub fn get_named(&self, name: &str) -> Option<Arc<Program>> {
        self.compiler.get_named(name)
    }

    /// Reconstruct the AST a [`Program`] would decompile to (spec §4.7).
    pub fn decompile(&self, program: &Program) -> Ast {
        self.vm.decompile(program)
    }

    pub fn normalized_source<'p>(&self, program: &'p Program) -> &'p str {
        program.normalized_source()
    }

    pub fn optimized_source<'p>(&self, program: &'p Program) -> &'p str {
        program.optimized_source()
    }

    /// A fresh [`Scope`] wired to this engine's named-expression table, so
    /// late-bound `Expression(...)` calls in evaluated programs can find
    /// names registered after those programs were compiled.
    pub fn new_scope(&self) -> Scope {
        Scope::with_extensions(Formatter::default(), Box::new(self.compiler.named_table()))
    }

    /// Evaluate `program` against `scope` (spec §6 `evaluate`).
    #[instrument(skip(self, program, scope))]
    pub fn evaluate(&self, program: &Arc<Program>, scope: &mut Scope) -> EvalResult<Value> {
        self.vm.run(program, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::with_builtins()
    }

    #[test]
    fn scenario_1_precedence() {
        let mut e = engine();
        let ast = Ast::binary(
            "+",
            Ast::literal(Value::Int(1)),
            Ast::binary("*", Ast::literal(Value::Int(2)), Ast::literal(Value::Int(3))),
        );
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(7));
    }

    #[test]
    fn scenario_2_equals_binds_tighter_than_and() {
        let mut e = engine();
        // true && false == false && true
        let ast = Ast::binary(
            "&&",
            Ast::binary(
                "&&",
                Ast::literal(Value::Bool(true)),
                Ast::binary("==", Ast::literal(Value::Bool(false)), Ast::literal(Value::Bool(false))),
            ),
            Ast::literal(Value::Bool(true)),
        );
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Bool(true));
    }

    #[test]
    fn scenario_3_string_concat() {
        let mut e = engine();
        let ast = Ast::binary(
            "+",
            Ast::binary("+", Ast::literal(Value::str("Hello")), Ast::literal(Value::str(" "))),
            Ast::literal(Value::str("World")),
        );
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::str("Hello World"));
    }

    #[test]
    fn scenario_4_elvis() {
        let mut e = engine();
        let ast = Ast::binary("?:", Ast::literal(Value::Bool(false)), Ast::literal(Value::str("Elvis")));
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::str("Elvis"));
    }

    #[test]
    fn scenario_5_unknown_star_ref_fails_at_compile_time() {
        let mut e = engine();
        let ast = Ast::unary("*", Ast::ident("unknown"));
        let err = e.compile(&ast).unwrap_err();
        assert!(matches!(err.kind, error::CompileErrorKind::NestedExpressionNotFoundCt { .. }));
    }

    #[test]
    fn scenario_6_expression_default_path() {
        let mut e = engine();
        let ast = Ast::call(
            "Expression",
            vec![Ast::literal(Value::str("unknown")), Ast::literal(Value::Int(42))],
        );
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(42));
    }

    #[test]
    fn scenario_7_nested_named_expression() {
        let mut e = engine();
        e.compile_named("nested", &Ast::literal(Value::Int(42))).unwrap();
        let ast = Ast::binary("+", Ast::unary("*", Ast::ident("nested")), Ast::literal(Value::Int(1)));
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(43));
    }

    #[test]
    fn scenario_8_conditional_auto_casts_to_string() {
        let mut e = engine();
        let ast = Ast::cond(
            Ast::literal(Value::Bool(true)),
            Ast::literal(Value::Int(1)),
            Ast::literal(Value::str("x")),
        );
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::str("1"));
    }

    #[test]
    fn scenario_11_circular_named_expressions() {
        let mut e = engine();
        e.compile_named(
            "a",
            &Ast::call("Expression", vec![Ast::literal(Value::str("b")), Ast::literal(Value::Int(0))]),
        )
        .unwrap();
        // `b := *a` needs `a` compiled first so `*a` resolves; both flags on
        // so the Expression(...) above lowers to a direct subroutine too.
        e.compile_named("b", &Ast::unary("*", Ast::ident("a"))).unwrap();

        let ast = Ast::unary("*", Ast::ident("a"));
        let program = e.compile(&ast).unwrap();
        let mut scope = e.new_scope();
        let err = e.evaluate(&program, &mut scope).unwrap_err();
        assert!(matches!(err.kind, error::EvalErrorKind::CircularNestedExpressions { .. }));
    }

    #[test]
    fn scenario_12_absorbing_element_collapses_program() {
        let mut e = Engine::new(
            CompileFlags::default(),
            NormalizeFlags::default(),
        );
        plugins::install_builtins(&mut e.compiler);
        e.install_plugin(
            Arc::new(IdentityIdentifier),
            plugin::Priority::CUSTOM,
        );
        let ast = Ast::binary("*", Ast::ident("x"), Ast::literal(Value::Int(0)));
        let program = e.compile(&ast).unwrap();
        assert_eq!(program.len(), 1);
    }

    /// A non-constant Int-producing identifier plugin, used only to give
    /// scenario 12's `x` a type without it being a compile-time constant.
    struct IdentityIdentifier;
    impl plugin::Plugin for IdentityIdentifier {
        fn plugin_name(&self) -> &str {
            "test.identity_identifier"
        }
        fn try_compile_identifier(&self, name: &str, _types: &TypeRegistry) -> Option<plugin::Match> {
            if name != "x" {
                return None;
            }
            Some(plugin::Match::new(
                std::sync::Arc::new(|_: &mut Scope, _: &[Value]| Ok(Value::Int(7))),
                TypeTag::INT,
                plugin::Invocability::Et,
            ))
        }
    }
}
