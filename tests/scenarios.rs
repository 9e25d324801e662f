//! Black-box tests driving the public `Engine` API with hand-built ASTs
//! (there is no parser in this crate), covering the scenario table and
//! testable properties around compilation, optimization, casting, and
//! nested-expression resolution.

use std::sync::Arc;

use expr_engine::ast::Ast;
use expr_engine::config::{CompileFlags, NormalizeFlags};
use expr_engine::error::{CompileErrorKind, EvalErrorKind};
use expr_engine::plugin::{Invocability, Match, Plugin, Priority};
use expr_engine::value::{TypeRegistry, TypeTag, Value};
use expr_engine::Engine;

fn engine() -> Engine {
    Engine::with_builtins()
}

/// A non-constant `Int` identifier, used where a scenario needs something
/// that can't fold away on its own.
struct NonConstInt(&'static str, i64);

impl Plugin for NonConstInt {
    fn plugin_name(&self) -> &str {
        "test.non_const_int"
    }

    fn try_compile_identifier(&self, name: &str, _types: &TypeRegistry) -> Option<Match> {
        if name != self.0 {
            return None;
        }
        let value = self.1;
        Some(Match::new(
            Arc::new(move |_, _: &[Value]| Ok(Value::Int(value))),
            TypeTag::INT,
            Invocability::Et,
        ))
    }
}

/// A non-constant `Float` identifier, used to exercise casts applied to a
/// constant operand sitting beside an already-compiled non-constant sibling.
struct NonConstFloat(&'static str, f64);

impl Plugin for NonConstFloat {
    fn plugin_name(&self) -> &str {
        "test.non_const_float"
    }

    fn try_compile_identifier(&self, name: &str, _types: &TypeRegistry) -> Option<Match> {
        if name != self.0 {
            return None;
        }
        let value = self.1;
        Some(Match::new(
            Arc::new(move |_, _: &[Value]| Ok(Value::Float(value))),
            TypeTag::FLOAT,
            Invocability::Et,
        ))
    }
}

#[test]
fn binary_operators_respect_precedence_through_the_tree_shape() {
    // The tree shape itself encodes precedence, since there's no parser
    // here to get it wrong: 1 + (2 * 3) must be built as the caller wants.
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
fn constant_sub_expressions_fold_entirely_away() {
    let mut e = engine();
    let ast = Ast::binary(
        "+",
        Ast::literal(Value::Int(1)),
        Ast::binary("*", Ast::literal(Value::Int(2)), Ast::literal(Value::Int(3))),
    );
    let program = e.compile(&ast).unwrap();
    assert_eq!(program.len(), 1, "a fully constant expression compiles to one CONST command");
    assert!(program.optimization_count() > 0);
}

#[test]
fn identity_rewrite_drops_the_constant_operand_without_folding_the_whole_tree() {
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstInt("x", 7)), Priority::CUSTOM);
    // x + 0 -> just the code for `x`.
    let ast = Ast::binary("+", Ast::ident("x"), Ast::literal(Value::Int(0)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(7));
}

#[test]
fn absorbing_element_collapses_to_a_single_constant() {
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstInt("x", 7)), Priority::CUSTOM);
    let ast = Ast::binary("*", Ast::ident("x"), Ast::literal(Value::Int(0)));
    let program = e.compile(&ast).unwrap();
    assert_eq!(program.len(), 1);
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(0));
}

#[test]
fn string_concatenation_is_compile_time_foldable() {
    let mut e = engine();
    let ast = Ast::binary(
        "+",
        Ast::binary("+", Ast::literal(Value::str("Hello")), Ast::literal(Value::str(" "))),
        Ast::literal(Value::str("World")),
    );
    let program = e.compile(&ast).unwrap();
    assert_eq!(program.len(), 1);
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::str("Hello World"));
}

#[test]
fn elvis_operator_falls_back_on_a_falsy_left_operand() {
    let mut e = engine();
    let ast = Ast::binary("?:", Ast::literal(Value::Bool(false)), Ast::literal(Value::str("Elvis")));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::str("Elvis"));
}

#[test]
fn conditional_auto_casts_both_branches_to_a_common_type() {
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
fn conditional_with_constant_condition_eliminates_the_dead_branch() {
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstInt("live", 42)), Priority::CUSTOM);
    let ast = Ast::cond(Ast::literal(Value::Bool(true)), Ast::ident("live"), Ast::literal(Value::Int(0)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(42));
}

#[test]
fn unknown_star_reference_fails_at_compile_time() {
    let mut e = engine();
    let ast = Ast::unary("*", Ast::ident("does_not_exist"));
    let err = e.compile(&ast).unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::NestedExpressionNotFoundCt { .. }));
}

#[test]
fn late_bound_expression_call_uses_its_default_when_the_name_is_missing() {
    let mut e = engine();
    let ast = Ast::call("Expression", vec![Ast::literal(Value::str("missing")), Ast::literal(Value::Int(42))]);
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(42));
}

#[test]
fn late_bound_expression_call_throws_when_told_to_and_missing() {
    let mut e = engine();
    let ast = Ast::call(
        "Expression",
        vec![
            Ast::literal(Value::str("missing")),
            Ast::literal(Value::Int(42)),
            Ast::literal(Value::Bool(true)),
        ],
    );
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    let err = e.evaluate(&program, &mut scope).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::NestedExpressionNotFoundEt { .. }));
}

#[test]
fn registering_a_name_after_compiling_is_visible_to_a_late_bound_caller() {
    let mut e = engine();
    let caller = e.compile(&Ast::call("Expression", vec![Ast::literal(Value::str("late")), Ast::literal(Value::Int(0))])).unwrap();

    e.compile_named("late", &Ast::literal(Value::Int(99))).unwrap();

    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&caller, &mut scope).unwrap(), Value::Int(99));
}

#[test]
fn unary_star_reference_is_pinned_at_compile_time_and_survives_removal() {
    let mut e = engine();
    e.compile_named("pinned", &Ast::literal(Value::Int(5))).unwrap();
    let ast = Ast::binary("+", Ast::unary("*", Ast::ident("pinned")), Ast::literal(Value::Int(1)));
    let program = e.compile(&ast).unwrap();

    e.remove_named("pinned");

    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(6));
}

#[test]
fn circular_named_expressions_are_rejected_at_evaluation_time() {
    let mut e = engine();
    e.compile_named(
        "a",
        &Ast::call("Expression", vec![Ast::literal(Value::str("b")), Ast::literal(Value::Int(0))]),
    )
    .unwrap();
    e.compile_named("b", &Ast::unary("*", Ast::ident("a"))).unwrap();

    let ast = Ast::unary("*", Ast::ident("a"));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    let err = e.evaluate(&program, &mut scope).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::CircularNestedExpressions { .. }));
}

#[test]
fn verbal_operators_alias_to_their_symbolic_form() {
    let mut e = engine();
    let ast = Ast::binary("and", Ast::literal(Value::Bool(true)), Ast::literal(Value::Bool(false)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Bool(false));
}

#[test]
fn verbal_operators_normalize_back_to_symbolic_form() {
    let flags = NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC | NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS;
    let mut e = Engine::new(CompileFlags::default(), flags);
    e.install_plugin(Arc::new(expr_engine::plugins::ComparePlugin::new()), Priority::BUILTIN_OPERATORS);

    // `nOt true aNd false`: lower-casing mixed-case verbal operators is the
    // parser's job (spec §8 scenario 10), so the compiler only ever sees
    // the canonical lowercase spellings it dispatches on.
    let ast = Ast::binary(
        "and",
        Ast::unary("not", Ast::literal(Value::Bool(true))),
        Ast::literal(Value::Bool(false)),
    );
    let program = e.compile(&ast).unwrap();
    assert_eq!(e.normalized_source(&program), "!true && false");
}

#[test]
fn equals_sign_aliases_to_equality_only_under_the_assign_alias_flag() {
    let mut e = Engine::new(CompileFlags::ALIAS_EQUALS_WITH_ASSIGN, NormalizeFlags::default());
    e.install_plugin(Arc::new(expr_engine::plugins::ComparePlugin::new()), Priority::BUILTIN_OPERATORS);

    let ast = Ast::binary("=", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(1)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Bool(true));
}

#[test]
fn equals_sign_is_not_aliased_without_the_flag() {
    let mut e = Engine::new(CompileFlags::empty(), NormalizeFlags::default());
    e.install_plugin(Arc::new(expr_engine::plugins::ComparePlugin::new()), Priority::BUILTIN_OPERATORS);

    let ast = Ast::binary("=", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(1)));
    let err = e.compile(&ast).unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::BinaryOperatorNotDefined { .. }));
}

#[test]
fn bitwise_operators_alias_to_logical_ones_only_on_boolean_operands() {
    let mut e = Engine::new(CompileFlags::ALLOW_BITWISE_BOOLEAN_OPERATORS, NormalizeFlags::default());
    e.install_plugin(Arc::new(expr_engine::plugins::ComparePlugin::new()), Priority::BUILTIN_OPERATORS);
    let ast = Ast::binary("&", Ast::literal(Value::Bool(true)), Ast::literal(Value::Bool(false)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Bool(false));
}

#[test]
fn numeric_widening_lets_int_and_float_compare() {
    let mut e = engine();
    let ast = Ast::binary("<", Ast::literal(Value::Int(1)), Ast::literal(Value::Float(1.5)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Bool(true));
}

#[test]
fn normalized_source_renders_operator_spacing() {
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstInt("x", 1)), Priority::CUSTOM);
    let ast = Ast::binary("+", Ast::ident("x"), Ast::literal(Value::Int(1)));
    let program = e.compile(&ast).unwrap();
    assert_eq!(e.normalized_source(&program), "x + 1");
}

#[test]
fn optimized_source_reflects_the_folded_program_not_the_original() {
    let mut e = engine();
    let ast = Ast::binary("+", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(1)));
    let program = e.compile(&ast).unwrap();
    assert_eq!(e.normalized_source(&program), "1 + 1");
    assert_eq!(e.optimized_source(&program), "2");
}

#[test]
fn decompile_reconstructs_an_ast_for_an_unfolded_program() {
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstInt("x", 1)), Priority::CUSTOM);
    let ast = Ast::binary("+", Ast::ident("x"), Ast::literal(Value::Int(1)));
    let program = e.compile(&ast).unwrap();
    let rebuilt = e.decompile(&program);
    assert!(matches!(rebuilt, Ast::BinaryOp { ref symbol, .. } if symbol == "+"));
}

#[test]
fn two_scopes_can_evaluate_the_same_program_independently() {
    let mut e = engine();
    let ast = Ast::binary("+", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(1)));
    let program = e.compile(&ast).unwrap();
    let mut scope_a = e.new_scope();
    let mut scope_b = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope_a).unwrap(), Value::Int(2));
    assert_eq!(e.evaluate(&program, &mut scope_b).unwrap(), Value::Int(2));
}

#[test]
fn division_by_zero_is_an_evaluation_time_callback_error_not_a_panic() {
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstInt("zero", 0)), Priority::CUSTOM);
    let ast = Ast::binary("/", Ast::literal(Value::Int(10)), Ast::ident("zero"));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    let err = e.evaluate(&program, &mut scope).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::ExceptionInCallback { .. }));
}

#[test]
fn late_bound_call_rejects_a_resolved_program_whose_type_drifted() {
    // `caller` is compiled while "x" is unregistered, so its declared
    // result type comes from the default (Int). If "x" is later
    // registered with a different result type, the late-bound lookup
    // must reject it rather than silently pushing a Str where an Int
    // is declared (spec §7 NestedExpressionResultTypeError).
    let mut e = engine();
    let caller = e
        .compile(&Ast::call("Expression", vec![Ast::literal(Value::str("x")), Ast::literal(Value::Int(0))]))
        .unwrap();

    e.compile_named("x", &Ast::literal(Value::str("not an int"))).unwrap();

    let mut scope = e.new_scope();
    let err = e.evaluate(&caller, &mut scope).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::NestedExpressionResultTypeError { .. }));
}

/// A non-constant `Str` identifier, used to exercise `Expression(...)`'s
/// name argument as a genuinely runtime-evaluated expression rather than a
/// literal.
struct NonConstStr(&'static str, &'static str);

impl Plugin for NonConstStr {
    fn plugin_name(&self) -> &str {
        "test.non_const_str"
    }

    fn try_compile_identifier(&self, name: &str, _types: &TypeRegistry) -> Option<Match> {
        if name != self.0 {
            return None;
        }
        let value = self.1;
        Some(Match::new(Arc::new(move |_, _: &[Value]| Ok(Value::str(value))), TypeTag::STR, Invocability::Et))
    }
}

/// An identifier whose callback counts how many times it actually ran, so
/// a test can observe whether an unevaluated branch's side effects fired.
struct CountingInt {
    name: &'static str,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl Plugin for CountingInt {
    fn plugin_name(&self) -> &str {
        "test.counting_int"
    }

    fn try_compile_identifier(&self, name: &str, _types: &TypeRegistry) -> Option<Match> {
        if name != self.name {
            return None;
        }
        let calls = Arc::clone(&self.calls);
        Some(Match::new(
            Arc::new(move |_, _: &[Value]| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Value::Int(0))
            }),
            TypeTag::INT,
            Invocability::Et,
        ))
    }
}

#[test]
fn expression_call_resolves_a_genuinely_dynamic_name_at_runtime() {
    // The name argument is a non-constant identifier expression, not a
    // literal — the general late-bound form (spec §4.4 "the arguments are
    // evaluated at runtime") has to compile and run it like any other
    // operand rather than requiring it to fold to a constant.
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstStr("which", "target")), Priority::CUSTOM);
    e.compile_named("target", &Ast::literal(Value::Int(7))).unwrap();

    let ast = Ast::call("Expression", vec![Ast::ident("which"), Ast::literal(Value::Int(99))]);
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(7));
}

#[test]
fn expression_call_always_runs_its_default_even_when_the_name_resolves() {
    // spec §4.6: "pop default, pop name ... on hit, recurse and then drop
    // the name/default region of the stack" — default's bytecode runs
    // (and its result is discarded) whether or not the name resolves.
    let mut e = engine();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    e.install_plugin(Arc::new(CountingInt { name: "counted", calls: Arc::clone(&calls) }), Priority::CUSTOM);
    e.compile_named("found", &Ast::literal(Value::Int(1))).unwrap();

    let ast = Ast::call("Expression", vec![Ast::literal(Value::str("found")), Ast::ident("counted")]);
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(1));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn constant_operand_cast_beside_a_non_constant_sibling_keeps_the_sibling_intact() {
    // `1 + x` with `x` a non-constant Float: the Int constant lhs needs
    // widening to Float, but `x`'s already-compiled command sits right
    // after it in the same builder and must survive the cast untouched.
    let mut e = engine();
    e.install_plugin(Arc::new(NonConstFloat("x", 2.5)), Priority::CUSTOM);
    let ast = Ast::binary("+", Ast::literal(Value::Int(1)), Ast::ident("x"));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Float(3.5));
}

#[test]
fn dead_branch_elimination_preserves_the_conditional_for_decompile() {
    let mut e = engine();
    let ast = Ast::cond(Ast::literal(Value::Bool(true)), Ast::literal(Value::Int(1)), Ast::literal(Value::Int(2)));
    let program = e.compile(&ast).unwrap();
    let mut scope = e.new_scope();
    assert_eq!(e.evaluate(&program, &mut scope).unwrap(), Value::Int(1));

    let rebuilt = e.decompile(&program);
    match rebuilt {
        Ast::Conditional { cond, then_branch, else_branch, .. } => {
            assert!(matches!(*cond, Ast::Literal { value: Value::Bool(true), .. }));
            assert!(matches!(*then_branch, Ast::Literal { value: Value::Int(1), .. }));
            assert!(matches!(*else_branch, Ast::Literal { value: Value::Int(2), .. }));
        }
        other => panic!("expected a reconstructed Conditional, got {other:?}"),
    }
}
