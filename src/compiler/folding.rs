//! Compile-time constant invocation (spec §4.3: "A CT-invocable callback
//! whose arguments are all compile-time constants is called during
//! compilation and its result becomes a literal").
//!
//! Grounded on the teacher's `compiler/folding.rs` `try_eval_constant`
//! recursive fold, generalized from MeTTa's fixed grounded-op set to any
//! plugin callback. Mirrors `vm::Vm`'s callback-invocation wrapping (spec
//! §7): a plugin `Err` is folded into `ExceptionInPlugin` unless
//! `CompileFlags::PLUGIN_EXCEPTION_FALL_THROUGH` is set, and a panic is
//! always caught and reported as `StdExceptionInfo` regardless of the flag
//! (a plugin panicking on constant folding is a plugin bug, not a domain
//! error the flag is meant to pass through).
use std::panic::{self, AssertUnwindSafe};

use crate::config::CompileFlags;
use crate::error::{CompileError, CompileErrorKind};
use crate::formatter::Formatter;
use crate::plugin::Callback;
use crate::scope::Scope;
use crate::value::Value;

/// Run a CT-invocable callback with a throwaway [`Scope`] (compile time has
/// no caller-supplied extensions or nested-call history to thread through).
pub fn invoke_ct(callback: &Callback, args: &[Value], flags: CompileFlags) -> Result<Value, CompileError> {
    let mut scope = Scope::new(Formatter::default());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&mut scope, args)));
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(eval_err)) if flags.contains(CompileFlags::PLUGIN_EXCEPTION_FALL_THROUGH) => {
            Err(CompileError::new(CompileErrorKind::PluginExceptionRaw(eval_err.to_string())))
        }
        Ok(Err(eval_err)) => {
            Err(CompileError::new(CompileErrorKind::ExceptionInPlugin(eval_err.to_string())))
        }
        Err(panic_payload) => {
            Err(CompileError::new(CompileErrorKind::StdExceptionInfo(panic_message(&panic_payload))))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked with a non-string payload".to_string()
    }
}

/// Whether the optimizer is enabled for this compile (spec §6
/// `NoOptimization` flag).
pub fn optimizations_enabled(flags: CompileFlags) -> bool {
    !flags.contains(CompileFlags::NO_OPTIMIZATION)
}
