//! Conditional compilation: branch type unification via auto-cast, and
//! dead-branch elimination when the condition folds to a constant (spec
//! §4.3 point 4).

use super::folding;
use super::Compiler;
use crate::ast::{Ast, SourcePos};
use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::plugin::AutoCastContext;
use crate::program::{DecompileKind, Op, ProgramBuilder};
use crate::value::{TypeTag, Value};

pub fn compile_conditional(
    compiler: &mut Compiler,
    cond: &Ast,
    then_branch: &Ast,
    else_branch: &Ast,
    pos: SourcePos,
    builder: &mut ProgramBuilder,
) -> CompileResult<(TypeTag, Option<Value>)> {
    let cond_start = builder.len();
    let (_cond_type, cond_const) = compiler.compile_node(cond, builder)?;

    // Each branch compiles into its own scratch builder first so the two
    // can be type-unified (and cast) before either lands in the real
    // command stream.
    let mut then_builder = ProgramBuilder::new();
    let (mut then_type, mut then_const) = compiler.compile_node(then_branch, &mut then_builder)?;
    let mut else_builder = ProgramBuilder::new();
    let (mut else_type, mut else_const) = compiler.compile_node(else_branch, &mut else_builder)?;

    if then_type != else_type {
        let cast = compiler
            .plugins()
            .find_auto_cast(AutoCastContext::Conditional, then_type, else_type, compiler.types())
            .ok_or_else(|| {
                CompileError::new(CompileErrorKind::IncompatibleTypesInConditional {
                    then_type: compiler.types().name_of(then_type).to_string(),
                    else_type: compiler.types().name_of(else_type).to_string(),
                })
                .context("conditional expression", pos)
            })?;

        if let Some(leg) = &cast.lhs {
            let then_end = then_builder.len();
            let (ty, val) = compiler.apply_cast(leg, 0, then_end, then_const.clone(), pos, &mut then_builder)?;
            then_type = ty;
            then_const = val;
        }
        if let Some(leg) = &cast.rhs {
            let else_end = else_builder.len();
            let (ty, val) = compiler.apply_cast(leg, 0, else_end, else_const.clone(), pos, &mut else_builder)?;
            else_type = ty;
            else_const = val;
        }
    }

    debug_assert_eq!(then_type, else_type, "auto-cast must unify conditional branch types");
    let result_type = then_type;

    // Dead-branch elimination: a statically known condition needs neither
    // the untaken branch's bytecode, the jumps, nor even the condition's
    // own code — but the choice still gets recorded (spec §4.3 point 2)
    // via a `DeadBranchEliminated` marker carrying the eliminated branch's
    // already-decompiled form, so `decompile`/`optimized_source` can
    // reconstruct the full ternary even though only the taken branch ever
    // runs. Gated by `NoOptimization` (spec §6) along with the other two
    // optimization sites in `compiler::folding`.
    if folding::optimizations_enabled(compiler.flags()) {
        if let Some(cond_value) = cond_const {
            builder.truncate(cond_start);
            let (taken_builder, taken_const, eliminated_builder) = if cond_value.is_truthy() {
                (then_builder, then_const, else_builder)
            } else {
                (else_builder, else_const, then_builder)
            };
            let eliminated_branch = Box::new(crate::decompiler::decompile(eliminated_builder.commands()));
            let taken_len = taken_builder.len();
            builder.emit(
                Op::DeadBranchEliminated { condition: cond_value, taken_len, eliminated_branch },
                result_type,
                pos,
                DecompileKind::DeadBranchEliminated,
                None,
            );
            builder.append(taken_builder);
            return Ok((result_type, taken_const));
        }
    }

    let jump_to_else = builder.emit_jump(true, result_type, pos);
    builder.append(then_builder);
    let jump_to_end = builder.emit_jump(false, result_type, pos);
    builder.patch_jump(jump_to_else);
    builder.append(else_builder);
    builder.patch_jump(jump_to_end);

    Ok((result_type, None))
}
