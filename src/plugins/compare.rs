//! Comparison/logical fixture: `< <= > >= == !=` over `Int`/`Float`/`Str`/
//! `Bool` (equality only for `Bool`/`Str`) and `&& || !` over `Bool`, plus
//! the alias table entries spec §6 requires (`&`/`|`/`~` as bitwise-as-
//! boolean, `=` as `==`) and the verbal-operator synonyms (`and or not sm
//! smaller smeq smaller_or_equal gt greater gteq greater_or_equal eq equals
//! neq not_equals`).
//!
//! The `&`/`|`/`~`/`=` aliasing is gated on operand types known only once
//! both sides are compiled, so [`crate::compiler::Compiler::compile_binary`]
//! and [`crate::compiler::Compiler::compile_node`] apply those two
//! conditionally themselves rather than consulting this plugin's alias
//! table — this plugin's `alias_of` is reserved for unconditional,
//! context-free aliases such as the verbal operators below.

use std::sync::Arc;

use crate::plugin::{Calculus, Invocability, Match, Plugin};
use crate::scope::Scope;
use crate::value::{TypeRegistry, TypeTag, Value};

pub struct ComparePlugin {
    calc: Calculus,
}

impl ComparePlugin {
    pub fn new() -> Self {
        let mut calc = Calculus::new();

        for ty in [TypeTag::INT, TypeTag::FLOAT] {
            add_ordering(&mut calc, ty);
        }
        for ty in [TypeTag::INT, TypeTag::FLOAT, TypeTag::STR, TypeTag::BOOL] {
            add_equality(&mut calc, ty);
        }

        calc.add_binary_op(
            "&&",
            TypeTag::BOOL,
            TypeTag::BOOL,
            Match::new(
                Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Bool(bool_of(&args[0]) && bool_of(&args[1])))),
                TypeTag::BOOL,
                Invocability::Ct,
            ),
        );
        calc.add_binary_op(
            "||",
            TypeTag::BOOL,
            TypeTag::BOOL,
            Match::new(
                Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Bool(bool_of(&args[0]) || bool_of(&args[1])))),
                TypeTag::BOOL,
                Invocability::Ct,
            ),
        );
        calc.add_unary_op(
            "!",
            TypeTag::BOOL,
            Match::new(Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Bool(!bool_of(&args[0])))), TypeTag::BOOL, Invocability::Ct),
        );

        // Verbal operators (spec §6): case-insensitive, but the external
        // parser is responsible for lower-casing before handing the
        // compiler a symbol, so this table only needs the canonical
        // lowercase spellings (spec §8 scenario 10: `nOt true aNd false`
        // normalizes the same as `!true && false`, which is a parser
        // front-end concern, not a dispatch one — the alias table here
        // only needs to recognize what the parser passes through).
        for (verbal, symbolic) in [
            ("and", "&&"),
            ("or", "||"),
            ("not", "!"),
            ("sm", "<"),
            ("smaller", "<"),
            ("smeq", "<="),
            ("smaller_or_equal", "<="),
            ("gt", ">"),
            ("greater", ">"),
            ("gteq", ">="),
            ("greater_or_equal", ">="),
            ("eq", "=="),
            ("equals", "=="),
            ("neq", "!="),
            ("not_equals", "!="),
        ] {
            calc.add_alias(verbal, symbolic);
        }

        ComparePlugin { calc }
    }
}

impl Default for ComparePlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn bool_of(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        _ => unreachable!("dispatch already checked the operand type"),
    }
}

fn add_ordering(calc: &mut Calculus, ty: TypeTag) {
    add_compare(calc, "<", ty, |o| o == std::cmp::Ordering::Less);
    add_compare(calc, "<=", ty, |o| o != std::cmp::Ordering::Greater);
    add_compare(calc, ">", ty, |o| o == std::cmp::Ordering::Greater);
    add_compare(calc, ">=", ty, |o| o != std::cmp::Ordering::Less);
}

fn add_compare(calc: &mut Calculus, symbol: &'static str, ty: TypeTag, pred: fn(std::cmp::Ordering) -> bool) {
    calc.add_binary_op(
        symbol,
        ty,
        ty,
        Match::new(
            Arc::new(move |_: &mut Scope, args: &[Value]| Ok(Value::Bool(pred(compare(&args[0], &args[1]))))),
            TypeTag::BOOL,
            Invocability::Ct,
        ),
    );
}

fn add_equality(calc: &mut Calculus, ty: TypeTag) {
    calc.add_binary_op(
        "==",
        ty,
        ty,
        Match::new(
            Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Bool(args[0] == args[1]))),
            TypeTag::BOOL,
            Invocability::Ct,
        ),
    );
    calc.add_binary_op(
        "!=",
        ty,
        ty,
        Match::new(
            Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Bool(args[0] != args[1]))),
            TypeTag::BOOL,
            Invocability::Ct,
        ),
    );
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        }
        _ => unreachable!("dispatch already checked the operand types"),
    }
}

impl Plugin for ComparePlugin {
    fn plugin_name(&self) -> &str {
        "builtin.compare"
    }

    fn try_compile_binary_op(
        &self,
        symbol: &str,
        lhs_type: TypeTag,
        rhs_type: TypeTag,
        _lhs_value: Option<&Value>,
        _rhs_value: Option<&Value>,
        _types: &TypeRegistry,
    ) -> Option<Match> {
        self.calc.lookup_binary_op(symbol, lhs_type, rhs_type)
    }

    fn try_compile_unary_op(
        &self,
        symbol: &str,
        arg_type: TypeTag,
        _arg_value: Option<&Value>,
        _types: &TypeRegistry,
    ) -> Option<Match> {
        self.calc.lookup_unary_op(symbol, arg_type)
    }

    fn alias_of(&self, symbol: &str) -> Option<String> {
        self.calc.alias_of(symbol).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_defined_for_bool_and_str() {
        let plugin = ComparePlugin::new();
        let types = TypeRegistry::new();
        assert!(plugin.try_compile_binary_op("==", TypeTag::BOOL, TypeTag::BOOL, None, None, &types).is_some());
        assert!(plugin.try_compile_binary_op("==", TypeTag::STR, TypeTag::STR, None, None, &types).is_some());
    }

    #[test]
    fn ordering_not_defined_for_bool() {
        let plugin = ComparePlugin::new();
        let types = TypeRegistry::new();
        assert!(plugin.try_compile_binary_op("<", TypeTag::BOOL, TypeTag::BOOL, None, None, &types).is_none());
    }

    #[test]
    fn verbal_synonyms_alias_to_symbolic_forms() {
        let plugin = ComparePlugin::new();
        assert_eq!(plugin.calc.alias_of("and"), Some("&&"));
        assert_eq!(plugin.calc.alias_of("smeq"), Some("<="));
    }
}
