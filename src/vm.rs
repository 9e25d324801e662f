//! Stack-based virtual machine that executes a [`Program`] against a
//! [`Scope`] (spec §4.6).
//!
//! Grounded on the teacher's `backend/bytecode/vm.rs`: a `pc`-indexed loop
//! dispatching on opcode against a `Vec<Value>` stack. The teacher's VM
//! additionally carries a call stack (for user-defined chunks) and choice
//! points (for nondeterministic backtracking) — neither applies here, since
//! this language has no user-defined functions and no nondeterminism, so
//! `SUBROUTINE` recurses directly through Rust's own call stack instead of
//! pushing a `CallFrame`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::ast::Ast;
use crate::compiler::NamedTable;
use crate::error::{EvalError, EvalErrorKind, EvalResult};
use crate::plugin::Callback;
use crate::program::{Command, Op, Program};
use crate::scope::Scope;
use crate::value::Value;

/// Executes compiled [`Program`]s. Stateless — the only per-call state
/// lives on the [`Scope`] the caller supplies, so one `Vm` can run many
/// programs, including concurrently on distinct scopes (spec §5).
#[derive(Default)]
pub struct Vm;

impl Vm {
    pub fn new() -> Self {
        Vm
    }

    /// Run `program` against `scope`, returning its single result value
    /// (spec §4.6). A failed run leaves the scope's stack depth
    /// unspecified; callers must discard the scope rather than reuse it
    /// (spec §7 propagation rules).
    pub fn run(&self, program: &Arc<Program>, scope: &mut Scope) -> EvalResult<Value> {
        let base = scope.stack_len();
        self.run_at(program, scope)?;
        debug_assert_eq!(scope.stack_len(), base + 1, "a Program must change stack size by exactly +1");
        Ok(scope.pop().expect("run_at guarantees exactly one value was pushed"))
    }

    /// Reconstruct the AST a [`Program`] would decompile to, reachable
    /// through the same handle callers run programs with (spec §6).
    pub fn decompile(&self, program: &Program) -> Ast {
        crate::decompiler::decompile(program.commands())
    }

    /// Run `program`, leaving its result on top of `scope`'s stack without
    /// popping it — used both by [`Vm::run`] and recursively by
    /// `SUBROUTINE`, so a nested call's result lands directly where its
    /// caller expects it (spec §4.6 step 3 "SUBROUTINE").
    fn run_at(&self, program: &Arc<Program>, scope: &mut Scope) -> EvalResult<()> {
        if scope.is_active(program) {
            let mut cycle = scope.active_chain();
            cycle.push(program.name().unwrap_or("<anonymous>").to_string());
            return Err(EvalError::new(EvalErrorKind::CircularNestedExpressions { cycle }));
        }

        let name = program.name().unwrap_or("<anonymous>").to_string();
        trace!(program = %name, "entering program");
        scope.push_active(name, Arc::clone(program));
        let result = self.run_commands(program, scope);
        scope.pop_active();

        match &result {
            Ok(()) => trace!(program = program.name(), "program returned"),
            Err(e) => debug!(program = program.name(), error = %e, "program raised"),
        }
        result
    }

    fn run_commands(&self, program: &Program, scope: &mut Scope) -> EvalResult<()> {
        let fall_through = program.callback_exception_fall_through();
        let commands = program.commands();
        let mut pc: isize = 0;
        while (pc as usize) < commands.len() {
            let cmd = &commands[pc as usize];
            self.exec(cmd, scope, fall_through, &mut pc)?;
            pc += 1;
        }
        Ok(())
    }

    fn exec(&self, cmd: &Command, scope: &mut Scope, fall_through: bool, pc: &mut isize) -> EvalResult<()> {
        match &cmd.op {
            Op::Const(value) => scope.push(value.clone()),

            Op::Func { callback, arg_count, .. } => {
                let args =
                    if *arg_count <= 0 { crate::scope::Args::new() } else { scope.pop_n(*arg_count as usize) };
                let result = invoke_callback(callback, scope, &args, cmd, fall_through)?;
                debug_assert_eq!(
                    result.type_tag(),
                    cmd.result_type,
                    "callback result type must match the Command's declared result_type"
                );
                scope.push(result);
            }

            Op::JumpIfFalse(offset) => {
                let cond = scope.pop().expect("JUMP_IF_FALSE with empty stack: compiler bug");
                if !cond.is_truthy() {
                    *pc += *offset as isize - 1;
                }
            }

            Op::Jump(offset) => *pc += *offset as isize - 1,

            Op::Subroutine { target, throws } => {
                self.exec_subroutine(target, *throws, cmd, scope)?;
            }

            // Decompile-only bookkeeping; the taken branch's commands
            // immediately follow and run normally.
            Op::DeadBranchEliminated { .. } => {}
        }
        Ok(())
    }

    fn exec_subroutine(
        &self,
        target: &Option<Arc<Program>>,
        throws: bool,
        cmd: &Command,
        scope: &mut Scope,
    ) -> EvalResult<()> {
        if let Some(program) = target {
            return self
                .run_at(program, scope)
                .map_err(|e| e.context(format!("nested expression '{}'", display_name(cmd)), cmd.pos));
        }

        // Late-bound `Expression(name, default[, throw])`: `name` and
        // `default` were compiled as ordinary children right before this
        // command (spec §4.4), so both are already evaluated and sit on
        // top of the stack. Pop `default` first, then `name` — this
        // guarantees `default`'s side effects already ran regardless of
        // which branch below fires (spec §4.6).
        let default = scope.pop().expect("Expression(...) missing its default operand: compiler bug");
        let name = match scope.pop().expect("Expression(...) missing its name operand: compiler bug") {
            Value::Str(s) => s,
            other => unreachable!("Expression(...) name must compile to a Str, got {other:?}"),
        };

        match resolve_named(scope, &name) {
            // The looked-up program's declared type is only known at
            // evaluation time (it may have been redefined since this
            // `Subroutine` was compiled), so it has to be checked against
            // `cmd.result_type` — fixed at compile time from the default's
            // type — on every call (spec §7 `NestedExpressionResultTypeError`).
            Some(program) if program.result_type() == cmd.result_type => self
                .run_at(&program, scope)
                .map_err(|e| e.context(format!("nested expression '{name}'"), cmd.pos)),
            Some(program) => Err(EvalError::new(EvalErrorKind::NestedExpressionResultTypeError {
                expected: format!("{:?}", cmd.result_type),
                got: format!("{:?}", program.result_type()),
            })
            .context(format!("nested expression '{name}'"), cmd.pos)),
            None if throws => {
                Err(EvalError::new(EvalErrorKind::NestedExpressionNotFoundEt { name: name.to_string() })
                    .context(format!("Expression('{name}', ...)"), cmd.pos))
            }
            None => {
                scope.push(default);
                Ok(())
            }
        }
    }
}

fn invoke_callback(
    callback: &Callback,
    scope: &mut Scope,
    args: &[Value],
    cmd: &Command,
    fall_through: bool,
) -> EvalResult<Value> {
    let name = display_name(cmd);
    trace!(callback = %name, "invoking callback");
    match panic::catch_unwind(AssertUnwindSafe(|| callback(scope, args))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if fall_through => Err(e.context(format!("callback '{name}'"), cmd.pos)),
        Ok(Err(e)) => Err(EvalError::new(EvalErrorKind::ExceptionInCallback { message: e.to_string() })
            .context(format!("callback '{name}'"), cmd.pos)),
        Err(panic_payload) => {
            Err(EvalError::new(EvalErrorKind::StdExceptionInfo { message: panic_message(&panic_payload) })
                .context(format!("callback '{name}'"), cmd.pos))
        }
    }
}

fn display_name(cmd: &Command) -> String {
    cmd.display_name.clone().unwrap_or_else(|| "<anonymous>".to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked with a non-string payload".to_string()
    }
}

/// Resolve a late-bound `Expression(...)` name against the compiler's
/// shared named-expression table, reachable through the scope's extensions
/// when the host installs one (see [`crate::Engine::new_scope`], which
/// always does). A scope built without a table simply never finds a named
/// expression, falling back to the default every time.
fn resolve_named(scope: &Scope, name: &str) -> Option<Arc<Program>> {
    scope.extensions().downcast_ref::<NamedTable>().and_then(|table| table.read().unwrap().get(name).cloned())
}
