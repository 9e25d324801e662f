//! Bytecode program container (spec §3.4).
//!
//! A [`Command`] folds spec's "opcode plus operand union" into a single
//! Rust enum discriminant — the idiomatic equivalent, since the operand
//! shape is fully determined by the opcode and there is nothing to gain
//! from keeping them as two separate fields (contrast with the teacher's
//! byte-packed `BytecodeChunk`, which needs a literal opcode byte because
//! its operands are flat bytes in a `Vec<u8>`; see DESIGN.md).

use std::sync::Arc;

use crate::ast::{Ast, SourcePos};
use crate::plugin::Callback;
use crate::value::{TypeTag, Value};

/// How the decompiler (§4.7) should rebuild an AST node from a `Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompileKind {
    LiteralConstant,
    OptimizationConstant,
    Unary,
    Binary,
    Function,
    Identifier,
    AutoCast,
    Subroutine,
    DeadBranchEliminated,
}

/// One bytecode instruction's opcode and operand (spec §3.4 table).
pub enum Op {
    /// Push a value.
    Const(Value),
    /// Pop `arg_count` args (or none, if `arg_count <= 0`), push
    /// `callback(args)`. `arg_count < 0` marks a bare-identifier call for
    /// decompile purposes only (spec: "if arg-count<0 the argument was
    /// parsed as a bare identifier").
    Func { callback: Callback, arg_count: i32, was_identifier_form: bool },
    /// Pop; if falsy, add `offset - 1` to `pc`.
    JumpIfFalse(i32),
    /// Unconditionally add `offset - 1` to `pc`.
    Jump(i32),
    /// Invoke a nested [`Program`]. `target: Some` for a compile-time
    /// resolved call (unary `*name`, or `Expression(...)` lowered under
    /// `AllowCompileTimeNestedExpressions`) — resolution never changes
    /// after compilation even if the name is later removed from the
    /// named-expression table, since the `Arc` is pinned directly.
    ///
    /// `target: None` marks a late-bound `Expression(name, default[,
    /// throw])` call: `name` and `default` were compiled as ordinary
    /// preceding commands (in that order, spec §4.4 "the arguments are
    /// evaluated at runtime"), so both values already sit on top of the
    /// stack when this command runs. It pops `default` then `name`, looks
    /// `name` up in the live named-expression table, and either recurses
    /// into the hit or falls back to the already-evaluated `default` —
    /// `default`'s side effects always happen, hit or miss. `throws` says
    /// whether a miss instead raises `NestedExpressionNotFoundEt`.
    Subroutine { target: Option<Arc<Program>>, throws: bool },
    /// Dead-branch elimination marker (spec §4.3 point 2). Emitted instead
    /// of the usual `JumpIfFalse`/`Jump` pair when a conditional's
    /// condition folded to a compile-time constant: only the taken
    /// branch's own commands (the `taken_len` commands right after this
    /// one) are actually in the stream and run. `eliminated_branch` is the
    /// already-decompiled form of the branch whose bytecode was never
    /// emitted, carried so `decompile`/`optimized_source` can still show
    /// the full ternary instead of losing it. The VM treats this as a
    /// no-op and falls through into the taken branch's commands.
    DeadBranchEliminated { condition: Value, taken_len: usize, eliminated_branch: Box<Ast> },
}

/// One compiled instruction plus the metadata the decompiler, listings,
/// and diagnostics need (spec §3.4: "Commands additionally carry...").
pub struct Command {
    pub op: Op,
    pub result_type: TypeTag,
    pub pos: SourcePos,
    pub decompile_kind: DecompileKind,
    /// The symbol or name used at source level (operator symbol,
    /// function/identifier name, or nested-expression name).
    pub display_name: Option<String>,
}

/// The compiled form of an expression (spec §3.4). Immutable once built;
/// cheap to share via `Arc` (multiple callers, and any `Program` that
/// calls it directly through `*name`, keep it alive).
pub struct Program {
    commands: Vec<Command>,
    /// Keeps directly-called nested programs alive (spec §3.4, §9 "shared
    /// ownership of subroutines").
    nested_programs: Vec<Arc<Program>>,
    original_source: String,
    normalized_source: String,
    optimized_source: String,
    /// Name this program was registered under, if it is a named
    /// expression — used in error context and cycle reporting.
    name: Option<String>,
    result_type: TypeTag,
    optimization_count: u32,
    /// Whether a panic from a callback invoked while running this program
    /// should propagate raw instead of being caught and converted to
    /// `EvalErrorKind::ExceptionInCallback` (spec §6
    /// `CallbackExceptionFallThrough`, decided once at compile time).
    callback_exception_fall_through: bool,
}

impl Program {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn nested_programs(&self) -> &[Arc<Program>] {
        &self.nested_programs
    }

    pub fn original_source(&self) -> &str {
        &self.original_source
    }

    pub fn normalized_source(&self) -> &str {
        &self.normalized_source
    }

    pub fn optimized_source(&self) -> &str {
        &self.optimized_source
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn result_type(&self) -> TypeTag {
        self.result_type
    }

    pub fn optimization_count(&self) -> u32 {
        self.optimization_count
    }

    pub fn callback_exception_fall_through(&self) -> bool {
        self.callback_exception_fall_through
    }
}

/// Builder for a [`Program`] (mirrors the teacher's `ChunkBuilder`):
/// incrementally `emit`s commands and supports jump back-patching for
/// control flow (spec §4.3 conditional compilation).
#[derive(Default)]
pub struct ProgramBuilder {
    commands: Vec<Command>,
    nested_programs: Vec<Arc<Program>>,
    optimization_count: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn truncate(&mut self, len: usize) {
        self.commands.truncate(len);
    }

    /// Drop the command range `[start, end)`, shifting everything after it
    /// back. Safe under the same sub-expression-boundary rule as
    /// [`ProgramBuilder::insert`]: every jump offset is relative, so a
    /// contiguous block disappearing from in front of later code doesn't
    /// desynchronize anything after it.
    pub fn remove_range(&mut self, start: usize, end: usize) {
        self.commands.drain(start..end);
    }

    /// Splice a command in at `index`, shifting everything from `index`
    /// onward forward by one slot.
    ///
    /// Safe only at a sub-expression boundary (e.g. right after a fully
    /// compiled operand, before its sibling): every jump offset is stored
    /// as a distance relative to its own position, so a block that shifts
    /// uniformly keeps its internal jumps correct. Inserting in the
    /// middle of an already-compiled sub-expression would desynchronize
    /// its jumps from their targets.
    pub fn insert(
        &mut self,
        index: usize,
        op: Op,
        result_type: TypeTag,
        pos: SourcePos,
        decompile_kind: DecompileKind,
        display_name: Option<String>,
    ) {
        self.commands.insert(index, Command { op, result_type, pos, decompile_kind, display_name });
    }

    pub fn emit(
        &mut self,
        op: Op,
        result_type: TypeTag,
        pos: SourcePos,
        decompile_kind: DecompileKind,
        display_name: Option<String>,
    ) -> usize {
        self.commands.push(Command { op, result_type, pos, decompile_kind, display_name });
        self.commands.len() - 1
    }

    /// Emit a jump with a placeholder offset, returning its index so the
    /// caller can [`ProgramBuilder::patch_jump`] it once the target
    /// position is known.
    pub fn emit_jump(
        &mut self,
        conditional: bool,
        result_type: TypeTag,
        pos: SourcePos,
    ) -> usize {
        let op = if conditional { Op::JumpIfFalse(0) } else { Op::Jump(0) };
        self.emit(op, result_type, pos, DecompileKind::Binary, None)
    }

    /// Patch a jump emitted at `index` to land just past the current end
    /// of the command stream.
    pub fn patch_jump(&mut self, index: usize) {
        let offset = (self.commands.len() - index) as i32;
        match &mut self.commands[index].op {
            Op::Jump(o) | Op::JumpIfFalse(o) => *o = offset,
            _ => unreachable!("patch_jump called on a non-jump command"),
        }
    }

    pub fn pin_nested(&mut self, program: Arc<Program>) {
        self.nested_programs.push(program);
    }

    /// Move another builder's commands onto the end of this one. Safe
    /// because every jump offset is relative to its own position, so a
    /// block of commands keeps working wherever it lands (see
    /// [`ProgramBuilder::insert`]'s doc comment).
    pub fn append(&mut self, other: ProgramBuilder) {
        self.commands.extend(other.commands);
        self.nested_programs.extend(other.nested_programs);
        self.optimization_count += other.optimization_count;
    }

    pub fn bump_optimizations(&mut self) {
        self.optimization_count += 1;
    }

    pub fn optimization_count(&self) -> u32 {
        self.optimization_count
    }

    pub fn finish(
        self,
        original_source: String,
        normalized_source: String,
        optimized_source: String,
        name: Option<String>,
        result_type: TypeTag,
        callback_exception_fall_through: bool,
    ) -> Program {
        Program {
            commands: self.commands,
            nested_programs: self.nested_programs,
            original_source,
            normalized_source,
            optimized_source,
            name,
            result_type,
            optimization_count: self.optimization_count,
            callback_exception_fall_through,
        }
    }
}
