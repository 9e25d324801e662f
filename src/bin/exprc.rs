//! exprc - expression engine demonstration CLI
//!
//! There is no text parser in this crate (spec §1: front end out of
//! scope), so this binary doesn't read expression source. Instead it
//! builds a small fixed set of example [`Ast`] trees, compiles each with
//! the built-in plugin fixtures installed, and prints its normalized
//! source, optimized source, and evaluation result. It exists only to
//! exercise the embedding interface end to end with a visible subscriber
//! attached; the library never initializes one itself.

use std::process;

use expr_engine::ast::Ast;
use expr_engine::value::Value;
use expr_engine::Engine;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("exprc v{VERSION}");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    exprc [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help       Print this help message");
    eprintln!("    -v, --version    Print version information");
    eprintln!("    -q, --quiet      Suppress tracing output");
    eprintln!();
    eprintln!("Runs a fixed set of example expressions through the compiler and VM,");
    eprintln!("printing each one's normalized source, optimized source, and result.");
}

fn print_version() {
    println!("exprc {VERSION}");
}

struct Options {
    quiet: bool,
}

fn parse_args() -> Result<Options, String> {
    let mut quiet = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-q" | "--quiet" => quiet = true,
            other => return Err(format!("Unknown option: {other}")),
        }
    }
    Ok(Options { quiet })
}

/// One example AST plus a human-readable label, standing in for the
/// expression source a front end would otherwise hand the compiler.
fn examples() -> Vec<(&'static str, Ast)> {
    vec![
        (
            "1 + 2 * 3",
            Ast::binary(
                "+",
                Ast::literal(Value::Int(1)),
                Ast::binary("*", Ast::literal(Value::Int(2)), Ast::literal(Value::Int(3))),
            ),
        ),
        (
            "x * 0  (identity/absorbing-element fold)",
            Ast::binary("*", Ast::ident("x"), Ast::literal(Value::Int(0))),
        ),
        (
            "false ?: \"Elvis\"",
            Ast::binary("?:", Ast::literal(Value::Bool(false)), Ast::literal(Value::str("Elvis"))),
        ),
        (
            "true ? 1 : \"x\"  (conditional auto-cast to Str)",
            Ast::cond(Ast::literal(Value::Bool(true)), Ast::literal(Value::Int(1)), Ast::literal(Value::str("x"))),
        ),
    ]
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage();
            process::exit(2);
        }
    };

    if !options.quiet {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let mut engine = Engine::with_builtins();
    // `x` has no plugin that resolves it; give it a throwaway identifier
    // binding just so the "x * 0" example has something to fold away.
    engine.install_plugin(std::sync::Arc::new(ConstantX), expr_engine::plugin::Priority::CUSTOM);

    let mut had_error = false;
    for (label, ast) in examples() {
        println!("=== {label} ===");
        match engine.compile(&ast) {
            Ok(program) => {
                println!("normalized: {}", engine.normalized_source(&program));
                println!("optimized:  {}", engine.optimized_source(&program));
                let mut scope = engine.new_scope();
                match engine.evaluate(&program, &mut scope) {
                    Ok(value) => println!("result:     {value}"),
                    Err(e) => {
                        println!("eval error: {e}");
                        had_error = true;
                    }
                }
            }
            Err(e) => {
                println!("compile error: {e}");
                had_error = true;
            }
        }
        println!();
    }

    if had_error {
        process::exit(1);
    }
}

/// Identifier fixture for the `x * 0` demo example above; not part of the
/// library's built-in plugin set.
struct ConstantX;

impl expr_engine::plugin::Plugin for ConstantX {
    fn plugin_name(&self) -> &str {
        "exprc.constant_x"
    }

    fn try_compile_identifier(
        &self,
        name: &str,
        _types: &expr_engine::value::TypeRegistry,
    ) -> Option<expr_engine::plugin::Match> {
        if name != "x" {
            return None;
        }
        Some(expr_engine::plugin::Match::new(
            std::sync::Arc::new(|_: &mut expr_engine::scope::Scope, _: &[Value]| Ok(Value::Int(9))),
            expr_engine::value::TypeTag::INT,
            expr_engine::plugin::Invocability::Et,
        ))
    }
}
