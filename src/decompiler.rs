//! Reconstructs an [`Ast`] from a finalized [`Program`]'s command stream
//! (spec §4.7). Used both to render `optimized_source` and as a
//! general-purpose "what did this actually compile to" inspection tool.
//!
//! Walks the commands left to right with a stack of completed nodes,
//! exactly mirroring how the VM walks them with a stack of values — the
//! one exception is `JUMP_IF_FALSE`/`JUMP`, which the VM follows but the
//! decompiler instead uses to carve out the then/else sub-ranges and
//! recurse into each independently (a jump-target stack of one entry per
//! nested conditional).
//!
//! Relies on an invariant private to this crate's own compiler: a
//! conditional's unconditional `Jump` always sits at `else_start - 1`
//! (see `compiler::conditional`). A hand-assembled [`Program`] that
//! didn't preserve that layout would trip the `unreachable!` below —
//! acceptable since nothing outside this crate constructs a `Program`.

use crate::ast::Ast;
use crate::program::{Command, DecompileKind, Op};
use crate::value::Value;

pub fn decompile(commands: &[Command]) -> Ast {
    let mut stack = Vec::new();
    decompile_range(commands, 0, commands.len(), &mut stack);
    assert_eq!(stack.len(), 1, "a well-formed command stream decompiles to exactly one root node");
    stack.pop().unwrap()
}

fn decompile_range(commands: &[Command], start: usize, end: usize, stack: &mut Vec<Ast>) {
    let mut i = start;
    while i < end {
        let cmd = &commands[i];
        match &cmd.op {
            Op::Const(value) => {
                stack.push(Ast::Literal { value: value.clone(), pos: cmd.pos });
                i += 1;
            }

            Op::JumpIfFalse(offset) => {
                let cond = stack.pop().expect("conditional missing its condition operand");
                let else_start = i + (*offset as usize);
                let then_end = else_start - 1;
                let else_end = match &commands[then_end].op {
                    Op::Jump(jump_offset) => then_end + (*jump_offset as usize),
                    _ => unreachable!("conditional's then-branch must end in an unconditional jump"),
                };

                let mut then_stack = Vec::new();
                decompile_range(commands, i + 1, then_end, &mut then_stack);
                let mut else_stack = Vec::new();
                decompile_range(commands, else_start, else_end, &mut else_stack);

                stack.push(Ast::Conditional {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_stack.pop().expect("then branch must produce one node")),
                    else_branch: Box::new(else_stack.pop().expect("else branch must produce one node")),
                    pos: cmd.pos,
                });
                i = else_end;
            }

            Op::Jump(_) => unreachable!("unconditional jump encountered outside a conditional"),

            Op::Func { arg_count, was_identifier_form, .. } => {
                let n = (*arg_count).max(0) as usize;
                let mut args = split_off_n(stack, n);
                let name = cmd.display_name.clone().unwrap_or_default();
                let ast = match cmd.decompile_kind {
                    DecompileKind::Identifier => Ast::Identifier { name, pos: cmd.pos },
                    DecompileKind::Unary => {
                        Ast::UnaryOp { symbol: name, operand: Box::new(args.remove(0)), pos: cmd.pos }
                    }
                    DecompileKind::Binary => {
                        let rhs = args.pop().expect("binary operator missing rhs");
                        let lhs = args.pop().expect("binary operator missing lhs");
                        Ast::BinaryOp { symbol: name, lhs: Box::new(lhs), rhs: Box::new(rhs), pos: cmd.pos }
                    }
                    _ => Ast::Function { name, args, was_identifier_form: *was_identifier_form, pos: cmd.pos },
                };
                stack.push(ast);
                i += 1;
            }

            Op::DeadBranchEliminated { condition, taken_len, eliminated_branch } => {
                let taken_start = i + 1;
                let taken_end = taken_start + *taken_len;
                let mut taken_stack = Vec::new();
                decompile_range(commands, taken_start, taken_end, &mut taken_stack);
                let taken_branch =
                    taken_stack.pop().expect("dead-branch-eliminated taken branch must produce one node");

                let cond = Ast::Literal { value: condition.clone(), pos: cmd.pos };
                let (then_branch, else_branch) = if condition.is_truthy() {
                    (taken_branch, (**eliminated_branch).clone())
                } else {
                    ((**eliminated_branch).clone(), taken_branch)
                };
                stack.push(Ast::Conditional {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                    pos: cmd.pos,
                });
                i = taken_end;
            }

            Op::Subroutine { target, throws } => {
                let ast = match target {
                    Some(_) => {
                        let name = cmd.display_name.clone().unwrap_or_default();
                        Ast::UnaryOp {
                            symbol: "*".to_string(),
                            operand: Box::new(Ast::Identifier {
                                name: name.trim_start_matches('*').to_string(),
                                pos: cmd.pos,
                            }),
                            pos: cmd.pos,
                        }
                    }
                    // Late-bound: `name` and `default` were compiled as
                    // ordinary preceding commands, in that order, so they
                    // decompile the same way a binary operator's operands
                    // do — as the two most recently completed nodes on the
                    // stack (spec §4.7: "pop two children").
                    None => {
                        let mut children = split_off_n(stack, 2);
                        let default_ast = children.pop().expect("Expression(...) missing its default child");
                        let name_ast = children.pop().expect("Expression(...) missing its name child");
                        let mut call_args = vec![name_ast, default_ast];
                        if *throws {
                            call_args.push(Ast::literal(Value::Bool(true)));
                        }
                        Ast::Function {
                            name: "Expression".to_string(),
                            args: call_args,
                            was_identifier_form: false,
                            pos: cmd.pos,
                        }
                    }
                };
                stack.push(ast);
                i += 1;
            }
        }
    }
}

fn split_off_n(stack: &mut Vec<Ast>, n: usize) -> Vec<Ast> {
    let start = stack.len() - n;
    stack.split_off(start)
}
