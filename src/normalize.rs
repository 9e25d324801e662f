//! Renders an [`Ast`] back to text (spec §4.8). Used both for
//! `normalized_source`/`optimized_source` on a compiled [`crate::program::Program`]
//! and standalone via [`crate::compiler::Compiler::normalize`].
//!
//! Parenthesization is precedence-aware: a binary operand only gets
//! parens when omitting them would actually change what it parses back
//! to. `NormalizeFlags::REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP`
//! controls the one case where that would otherwise drop brackets a human
//! reader might still want — an RHS operand whose operator binds tighter
//! than its parent's (spec §8 scenario 10's `!true && false`, unary binds
//! tighter than any binary, has no parens with the flag unset).

use crate::ast::Ast;
use crate::config::{NormalizeFlags, VerbalCasePolicy};
use crate::formatter::Formatter;
use crate::value::Value;

const VERBAL_BINARY: &[(&str, &str)] = &[("&&", "and"), ("||", "or")];
const VERBAL_UNARY: &[(&str, &str)] = &[("!", "not")];

/// Binary operator precedence, loosest first. An operator this renderer
/// doesn't recognize (a host-defined symbol) gets the lowest precedence of
/// all, so it's always conservatively parenthesized as an operand.
fn binary_precedence(symbol: &str) -> i32 {
    match symbol {
        "||" => 1,
        "&&" => 2,
        "==" | "!=" => 3,
        "<" | "<=" | ">" | ">=" => 4,
        "+" | "-" => 5,
        "*" | "/" => 6,
        _ => 0,
    }
}

pub fn render(ast: &Ast, flags: NormalizeFlags) -> String {
    render_with(ast, flags, &Formatter::default().with_normalize_flags(flags))
}

pub fn render_with(ast: &Ast, flags: NormalizeFlags, formatter: &Formatter) -> String {
    let mut out = String::new();
    write_node(ast, flags, formatter, &mut out);
    out
}

fn write_node(ast: &Ast, flags: NormalizeFlags, formatter: &Formatter, out: &mut String) {
    match ast {
        Ast::Literal { value, .. } => out.push_str(&render_value(value, formatter)),
        Ast::Identifier { name, .. } => out.push_str(name),
        Ast::UnaryOp { symbol, operand, .. } => {
            out.push_str(&operator_text(symbol, VERBAL_UNARY, flags));
            if flags.contains(NormalizeFlags::SPACE_AROUND_UNARY_OPERATORS) {
                out.push(' ');
            }
            write_operand(operand, flags, formatter, out);
        }
        Ast::BinaryOp { symbol, lhs, rhs, .. } => {
            write_lhs_operand(lhs, symbol, flags, formatter, out);
            if flags.contains(NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS) {
                out.push(' ');
            }
            out.push_str(&operator_text(symbol, VERBAL_BINARY, flags));
            if flags.contains(NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS) {
                out.push(' ');
            }
            write_rhs_operand(rhs, symbol, flags, formatter, out);
        }
        Ast::Function { name, args, was_identifier_form, .. } => {
            out.push_str(name);
            if !was_identifier_form || !args.is_empty() {
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                        if flags.contains(NormalizeFlags::SPACE_AFTER_FUNCTION_COMMA) {
                            out.push(' ');
                        }
                    }
                    write_node(arg, flags, formatter, out);
                }
                out.push(')');
            }
        }
        Ast::Conditional { cond, then_branch, else_branch, .. } => {
            write_operand(cond, flags, formatter, out);
            let sep = if flags.contains(NormalizeFlags::SPACE_AROUND_CONDITIONAL) { " " } else { "" };
            out.push_str(sep);
            out.push('?');
            out.push_str(sep);
            write_operand(then_branch, flags, formatter, out);
            out.push_str(sep);
            out.push(':');
            out.push_str(sep);
            write_operand(else_branch, flags, formatter, out);
        }
    }
}

fn write_operand(ast: &Ast, flags: NormalizeFlags, formatter: &Formatter, out: &mut String) {
    let needs_parens = matches!(ast, Ast::BinaryOp { .. } | Ast::Conditional { .. } | Ast::UnaryOp { .. });
    if needs_parens {
        out.push('(');
        write_node(ast, flags, formatter, out);
        out.push(')');
    } else {
        write_node(ast, flags, formatter, out);
    }
}

/// The left-hand operand of a binary operator: a left-associative parse
/// never needs parens around a nested binary lhs whose precedence is
/// equal to or tighter than the parent's — `(a op1 b) op2 c` parses back
/// the same without parens whenever `op1` binds at least as tightly as
/// `op2` (spec §8 scenario 9: `1 - 2 - 3 - 4`, same precedence, stays
/// unparenthesized). A unary lhs
/// never needs parens either, since unary always binds tighter than any
/// binary operator. Anything else (a weaker-binding binary, or a
/// conditional) still gets parens.
fn write_lhs_operand(ast: &Ast, parent_symbol: &str, flags: NormalizeFlags, formatter: &Formatter, out: &mut String) {
    match ast {
        Ast::BinaryOp { symbol, .. } if binary_precedence(symbol) >= binary_precedence(parent_symbol) => {
            write_node(ast, flags, formatter, out);
        }
        Ast::UnaryOp { .. } => write_node(ast, flags, formatter, out),
        _ => write_operand(ast, flags, formatter, out),
    }
}

/// The right-hand operand of a binary operator. Unlike the lhs, the rhs of
/// a left-associative parent needs parens even at *equal* precedence
/// (`a - (b - c)` is not `a - b - c`), so only a strictly tighter-binding
/// rhs can safely drop them — and
/// `NormalizeFlags::REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP`
/// can still force them back on even then, for a human reader who'd
/// rather see them (spec §6). A unary rhs is always the tightest-binding
/// case there is, so it's gated by the same flag.
fn write_rhs_operand(ast: &Ast, parent_symbol: &str, flags: NormalizeFlags, formatter: &Formatter, out: &mut String) {
    let redundant_flag = flags.contains(NormalizeFlags::REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP);
    match ast {
        Ast::BinaryOp { symbol, .. } if binary_precedence(symbol) > binary_precedence(parent_symbol) => {
            if redundant_flag {
                wrap_in_parens(ast, flags, formatter, out);
            } else {
                write_node(ast, flags, formatter, out);
            }
        }
        Ast::UnaryOp { .. } if !redundant_flag => write_node(ast, flags, formatter, out),
        _ => write_operand(ast, flags, formatter, out),
    }
}

fn wrap_in_parens(ast: &Ast, flags: NormalizeFlags, formatter: &Formatter, out: &mut String) {
    out.push('(');
    write_node(ast, flags, formatter, out);
    out.push(')');
}

/// `symbol` may already be in either spelling — the AST doesn't track
/// whether a node was originally written symbolically or verbally, so
/// both columns of `verbal_table` are searched before picking the one
/// the requested policy wants (spec §8 scenario 10: `nOt ... aNd ...`
/// normalizes to `!... && ...` under `ReplaceVerbalOperatorsToSymbolic`,
/// the reverse of what the other verbal-case flags do).
fn operator_text(symbol: &str, verbal_table: &[(&str, &str)], flags: NormalizeFlags) -> String {
    match flags.verbal_case_policy() {
        VerbalCasePolicy::None => symbol.to_string(),
        VerbalCasePolicy::Symbolic => verbal_table
            .iter()
            .find(|(sym, verbal)| *sym == symbol || *verbal == symbol)
            .map(|(sym, _)| sym.to_string())
            .unwrap_or_else(|| symbol.to_string()),
        policy => verbal_table
            .iter()
            .find(|(sym, verbal)| *sym == symbol || *verbal == symbol)
            .map(|(_, verbal)| apply_case(verbal, policy))
            .unwrap_or_else(|| symbol.to_string()),
    }
}

fn apply_case(word: &str, policy: VerbalCasePolicy) -> String {
    match policy {
        VerbalCasePolicy::Lowercase => word.to_lowercase(),
        VerbalCasePolicy::Uppercase => word.to_uppercase(),
        // No original casing is tracked through compilation, so "defined
        // letter case" degrades to the table's own casing.
        VerbalCasePolicy::DefinedLetterCase | VerbalCasePolicy::Symbolic | VerbalCasePolicy::None => {
            word.to_string()
        }
    }
}

fn render_value(value: &Value, formatter: &Formatter) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => formatter.format_int(*i),
        Value::Float(f) => formatter.format_float(*f),
        Value::Str(s) => format!("\"{s}\""),
        Value::Custom(_, payload) => format!("{payload:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;

    #[test]
    fn renders_binary_with_spacing() {
        let ast = Ast::binary("+", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(2)));
        let flags = NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS;
        assert_eq!(render(&ast, flags), "1 + 2");
    }

    #[test]
    fn renders_binary_without_spacing() {
        let ast = Ast::binary("+", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(2)));
        assert_eq!(render(&ast, NormalizeFlags::empty()), "1+2");
    }

    #[test]
    fn verbal_lowercase_rewrites_symbolic_operator() {
        let ast = Ast::binary("&&", Ast::literal(Value::Bool(true)), Ast::literal(Value::Bool(false)));
        let flags = NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS | NormalizeFlags::LOWERCASE_VERBAL_OPERATORS;
        assert_eq!(render(&ast, flags), "true and false");
    }

    #[test]
    fn verbal_operand_normalizes_to_symbolic_form() {
        // spec §8 scenario 10: unary always binds tighter than any binary
        // operator, so its lhs operand needs no parens.
        let ast = Ast::binary(
            "and",
            Ast::unary("not", Ast::literal(Value::Bool(true))),
            Ast::literal(Value::Bool(false)),
        );
        let flags = NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC | NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS;
        assert_eq!(render(&ast, flags), "!true && false");
    }

    #[test]
    fn redundant_rhs_brackets_flag_forces_parens_around_tighter_binding_rhs() {
        // "1 + 2 * 3": "*" binds tighter than "+", so the rhs needs no
        // parens by default, but the flag can still force them on.
        let ast = Ast::binary(
            "+",
            Ast::literal(Value::Int(1)),
            Ast::binary("*", Ast::literal(Value::Int(2)), Ast::literal(Value::Int(3))),
        );
        assert_eq!(render(&ast, NormalizeFlags::empty()), "1+2*3");
        let flags = NormalizeFlags::REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP;
        assert_eq!(render(&ast, flags), "1+(2*3)");
    }

    #[test]
    fn rhs_of_same_precedence_still_gets_parens() {
        // "1 - (2 - 3)" must keep its parens: dropping them would silently
        // change the value ("1 - 2 - 3" is left-associative).
        let ast = Ast::binary(
            "-",
            Ast::literal(Value::Int(1)),
            Ast::binary("-", Ast::literal(Value::Int(2)), Ast::literal(Value::Int(3))),
        );
        assert_eq!(render(&ast, NormalizeFlags::empty()), "1-(2-3)");
    }

    #[test]
    fn nested_binary_operand_gets_parens() {
        let inner = Ast::binary("+", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(2)));
        let ast = Ast::binary("*", inner, Ast::literal(Value::Int(3)));
        assert_eq!(render(&ast, NormalizeFlags::empty()), "(1+2)*3");
    }

    #[test]
    fn same_operator_chain_stays_unparenthesized() {
        // ((1 - 2) - 3) - 4, as a left-associative parse would build it.
        let a = Ast::binary("-", Ast::literal(Value::Int(1)), Ast::literal(Value::Int(2)));
        let b = Ast::binary("-", a, Ast::literal(Value::Int(3)));
        let c = Ast::binary("-", b, Ast::literal(Value::Int(4)));
        let flags = NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS;
        assert_eq!(render(&c, flags), "1 - 2 - 3 - 4");
    }
}
