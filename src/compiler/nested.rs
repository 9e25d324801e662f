//! Named-expression and nested-expression compilation (spec §3.6/§4.4):
//! the unary `*name` reference operator and the `Expression(name, default[,
//! throw])` function form.
//!
//! Unlike every other construct in the language, nested-expression
//! dispatch is wired directly into the [`Compiler`] rather than routed
//! through the [`crate::plugin::Plugin`] mechanism — it needs privileged
//! access to the named-expression table and to emit the `SUBROUTINE`
//! opcode, neither of which a plugin callback can reach.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::Compiler;
use crate::ast::{Ast, SourcePos};
use crate::config::CompileFlags;
use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::program::{DecompileKind, Op, Program, ProgramBuilder};
use crate::value::{TypeTag, Value};

/// Shared, mutable table of named expressions. Held by both the
/// [`Compiler`] (to resolve `Expression(...)` calls compiled in the
/// future) and the VM (to resolve late-bound calls compiled in the past),
/// so a name registered or replaced after compilation is visible to
/// already-compiled programs that reference it late-bound.
pub type NamedTable = Arc<RwLock<HashMap<String, Arc<Program>>>>;

/// `*name`: always resolved at compile time against the table as it
/// stands right now. Once resolved the reference is pinned via `Arc` and
/// is immune to later `remove_named` calls (spec §3.7: "a compile-time
/// nested-expression reference, once resolved, is stable for the
/// lifetime of the program that holds it").
pub fn compile_star_ref(
    compiler: &mut Compiler,
    operand: &Ast,
    pos: SourcePos,
    builder: &mut ProgramBuilder,
) -> CompileResult<(TypeTag, Option<Value>)> {
    let name = match operand {
        Ast::Identifier { name, .. } => name.clone(),
        _ => {
            return Err(CompileError::new(CompileErrorKind::SyntaxErrorExpectation(
                "an identifier naming a named expression after '*'".to_string(),
            ))
            .context("nested-expression reference", pos))
        }
    };
    compile_resolved_reference(compiler, &name, pos, builder)
}

/// A bare identifier that no plugin claims, falling back to a named
/// expression lookup under `AllowIdentifiersForNestedExpressions` (spec
/// §6). Semantically identical to `*name`.
pub fn compile_named_call(
    compiler: &mut Compiler,
    name: &str,
    pos: SourcePos,
    builder: &mut ProgramBuilder,
) -> CompileResult<(TypeTag, Option<Value>)> {
    compile_resolved_reference(compiler, name, pos, builder)
}

fn compile_resolved_reference(
    compiler: &mut Compiler,
    name: &str,
    pos: SourcePos,
    builder: &mut ProgramBuilder,
) -> CompileResult<(TypeTag, Option<Value>)> {
    let program = compiler.get_named(name).ok_or_else(|| {
        CompileError::new(CompileErrorKind::NestedExpressionNotFoundCt { name: name.to_string() })
            .context(format!("'*{name}'"), pos)
    })?;
    let result_type = program.result_type();
    builder.pin_nested(Arc::clone(&program));
    builder.emit(
        Op::Subroutine { target: Some(program), throws: true },
        result_type,
        pos,
        DecompileKind::Subroutine,
        Some(format!("*{name}")),
    );
    Ok((result_type, None))
}

/// `Expression(name, default[, throw])` (spec §4.4: "the arguments are
/// evaluated at runtime"). `name` and `default` compile as ordinary
/// children, in that order, directly into the surrounding command stream,
/// so `default`'s bytecode always runs — its side effects happen whether
/// or not `name` resolves (spec §4.6: "pop default, pop name ... on miss
/// without marker, use default"). `throw`, if given, is a structural
/// marker rather than a runtime value and so must still be a compile-time
/// constant.
///
/// The one case that *is* resolved right now is compile-time lowering
/// under `AllowCompileTimeNestedExpressions`: when the name is already
/// known (a bare identifier under `AllowIdentifiersForNestedExpressions`,
/// or a source expression that folds to a constant `Str`) and it already
/// names a live program, this collapses to the exact same direct
/// `SUBROUTINE` the unary `*name` form emits, and `default` is never
/// compiled at all — that path is no longer reachable.
pub fn compile_expression_call(
    compiler: &mut Compiler,
    args: &[Ast],
    pos: SourcePos,
    builder: &mut ProgramBuilder,
) -> CompileResult<(TypeTag, Option<Value>)> {
    if args.len() < 2 || args.len() > 3 {
        return Err(CompileError::new(CompileErrorKind::NestedExpressionCallArgumentMismatch {
            expected: "2 or 3".to_string(),
            got: args.len(),
        })
        .context("Expression(...)", pos));
    }

    let throws = if args.len() == 3 {
        resolve_const_bool_argument(compiler, &args[2], pos)?
    } else {
        false
    };

    // A bare identifier under `AllowIdentifiersForNestedExpressions` names
    // the table entry directly — it is never compiled as an ordinary
    // identifier expression, since no plugin need claim it.
    let bare_name = if compiler.flags().contains(CompileFlags::ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS) {
        match &args[0] {
            Ast::Identifier { name, .. } => Some(name.clone()),
            _ => None,
        }
    } else {
        None
    };

    if compiler.flags().contains(CompileFlags::ALLOW_COMPILE_TIME_NESTED_EXPRESSIONS) {
        let const_name = match &bare_name {
            Some(name) => Some(name.clone()),
            None => {
                let mut probe = ProgramBuilder::new();
                match compiler.compile_node(&args[0], &mut probe)?.1 {
                    Some(Value::Str(s)) => Some(s.to_string()),
                    _ => None,
                }
            }
        };
        if let Some(program) = const_name.as_deref().and_then(|name| compiler.get_named(name)) {
            let result_type = program.result_type();
            builder.pin_nested(Arc::clone(&program));
            builder.emit(
                Op::Subroutine { target: Some(program), throws: true },
                result_type,
                pos,
                DecompileKind::Subroutine,
                const_name,
            );
            return Ok((result_type, None));
        }
    }

    if let Some(name) = bare_name {
        builder.emit(Op::Const(Value::str(name)), TypeTag::STR, pos, DecompileKind::LiteralConstant, None);
    } else {
        let (name_type, _) = compiler.compile_node(&args[0], builder)?;
        if name_type != TypeTag::STR {
            return Err(CompileError::new(CompileErrorKind::NestedExpressionCallArgumentMismatch {
                expected: "a Str name argument".to_string(),
                got: args.len(),
            })
            .context("Expression(...) name argument", pos));
        }
    }

    let (result_type, _) = compiler.compile_node(&args[1], builder)?;

    builder.emit(Op::Subroutine { target: None, throws }, result_type, pos, DecompileKind::Subroutine, None);
    Ok((result_type, None))
}

fn resolve_const_bool_argument(compiler: &mut Compiler, arg: &Ast, pos: SourcePos) -> CompileResult<bool> {
    let mut probe = ProgramBuilder::new();
    let (_, value) = compiler.compile_node(arg, &mut probe)?;
    match value {
        Some(Value::Bool(b)) => Ok(b),
        _ => Err(CompileError::new(CompileErrorKind::NamedExpressionNotConstant)
            .context("Expression(...) throw argument", pos)),
    }
}
