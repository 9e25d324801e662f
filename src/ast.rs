//! Abstract syntax tree consumed by the compiler (spec §3.3).
//!
//! The core never parses source text — an external front end (out of
//! scope, see spec.md §1) hands the compiler an [`Ast`]. Tests and the
//! `exprc` demonstration binary build [`Ast`] values directly with the
//! constructor helpers below instead of a parser.

use crate::value::Value;

/// Original-source and normalized-source byte offsets for one AST node,
/// per spec §3.3 ("every node carries a source position (original and
/// normalized offsets)"). Kept as a plain pair rather than a packed
/// bitfield (see SPEC_FULL.md §3 / DESIGN.md Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub original: u32,
    pub normalized: u32,
}

impl SourcePos {
    pub const UNKNOWN: SourcePos = SourcePos { original: u32::MAX, normalized: u32::MAX };
}

/// One node in the parsed expression tree. The AST owns its children.
#[derive(Debug, Clone)]
pub enum Ast {
    Literal { value: Value, pos: SourcePos },
    Identifier { name: String, pos: SourcePos },
    UnaryOp { symbol: String, operand: Box<Ast>, pos: SourcePos },
    BinaryOp { symbol: String, lhs: Box<Ast>, rhs: Box<Ast>, pos: SourcePos },
    /// `was_identifier_form` is true for calls written without parentheses
    /// that the parser nonetheless recognized as function invocations
    /// (spec §4.3: affects decompile only).
    Function { name: String, args: Vec<Ast>, was_identifier_form: bool, pos: SourcePos },
    Conditional { cond: Box<Ast>, then_branch: Box<Ast>, else_branch: Box<Ast>, pos: SourcePos },
}

impl Ast {
    pub fn pos(&self) -> SourcePos {
        match self {
            Ast::Literal { pos, .. }
            | Ast::Identifier { pos, .. }
            | Ast::UnaryOp { pos, .. }
            | Ast::BinaryOp { pos, .. }
            | Ast::Function { pos, .. }
            | Ast::Conditional { pos, .. } => *pos,
        }
    }

    pub fn literal(value: Value) -> Ast {
        Ast::Literal { value, pos: SourcePos::UNKNOWN }
    }

    pub fn ident(name: impl Into<String>) -> Ast {
        Ast::Identifier { name: name.into(), pos: SourcePos::UNKNOWN }
    }

    pub fn unary(symbol: impl Into<String>, operand: Ast) -> Ast {
        Ast::UnaryOp { symbol: symbol.into(), operand: Box::new(operand), pos: SourcePos::UNKNOWN }
    }

    pub fn binary(symbol: impl Into<String>, lhs: Ast, rhs: Ast) -> Ast {
        Ast::BinaryOp {
            symbol: symbol.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            pos: SourcePos::UNKNOWN,
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Ast>) -> Ast {
        Ast::Function { name: name.into(), args, was_identifier_form: false, pos: SourcePos::UNKNOWN }
    }

    pub fn bare_call(name: impl Into<String>) -> Ast {
        Ast::Function { name: name.into(), args: Vec::new(), was_identifier_form: true, pos: SourcePos::UNKNOWN }
    }

    pub fn cond(cond: Ast, then_branch: Ast, else_branch: Ast) -> Ast {
        Ast::Conditional {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            pos: SourcePos::UNKNOWN,
        }
    }
}
