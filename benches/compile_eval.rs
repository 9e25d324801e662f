//! Compile/evaluate hot-path benchmarks.
//!
//! Run with:
//!   cargo bench --bench compile_eval

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use expr_engine::ast::Ast;
use expr_engine::value::Value;
use expr_engine::Engine;

/// A moderately deep arithmetic expression: `((...((1 + 2) * 3) - 4)...)`
/// chained 20 times, none of it foldable to a constant because one leaf
/// is a non-constant identifier.
fn deep_arithmetic(depth: u32) -> Ast {
    let mut ast = Ast::ident("seed");
    for i in 0..depth {
        let op = match i % 3 {
            0 => "+",
            1 => "*",
            _ => "-",
        };
        ast = Ast::binary(op, ast, Ast::literal(Value::Int((i + 1) as i64)));
    }
    ast
}

/// A fully constant version of the same shape, which the optimizer folds
/// down to a single `Const` at compile time.
fn deep_constant_arithmetic(depth: u32) -> Ast {
    let mut ast = Ast::literal(Value::Int(1));
    for i in 0..depth {
        let op = match i % 3 {
            0 => "+",
            1 => "*",
            _ => "-",
        };
        ast = Ast::binary(op, ast, Ast::literal(Value::Int((i + 1) as i64)));
    }
    ast
}

struct SeedIdentifier;

impl expr_engine::plugin::Plugin for SeedIdentifier {
    fn plugin_name(&self) -> &str {
        "bench.seed_identifier"
    }

    fn try_compile_identifier(
        &self,
        name: &str,
        _types: &expr_engine::value::TypeRegistry,
    ) -> Option<expr_engine::plugin::Match> {
        if name != "seed" {
            return None;
        }
        Some(expr_engine::plugin::Match::new(
            std::sync::Arc::new(|_: &mut expr_engine::scope::Scope, _: &[Value]| Ok(Value::Int(1))),
            expr_engine::value::TypeTag::INT,
            expr_engine::plugin::Invocability::Et,
        ))
    }
}

fn engine() -> Engine {
    let mut engine = Engine::with_builtins();
    engine.install_plugin(std::sync::Arc::new(SeedIdentifier), expr_engine::plugin::Priority::CUSTOM);
    engine
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("non_constant_chain_20", |b| {
        let ast = deep_arithmetic(20);
        let mut engine = engine();
        b.iter(|| {
            let program = engine.compile(black_box(&ast)).expect("compiles");
            black_box(program);
        });
    });

    group.bench_function("constant_fold_chain_20", |b| {
        let ast = deep_constant_arithmetic(20);
        let mut engine = engine();
        b.iter(|| {
            let program = engine.compile(black_box(&ast)).expect("compiles");
            black_box(program);
        });
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    group.bench_function("non_constant_chain_20", |b| {
        let mut engine = engine();
        let ast = deep_arithmetic(20);
        let program = engine.compile(&ast).expect("compiles");
        b.iter(|| {
            let mut scope = engine.new_scope();
            let result = engine.evaluate(black_box(&program), &mut scope).expect("evaluates");
            black_box(result);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);
