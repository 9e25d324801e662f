//! Auto-cast fixture: `Int -> Float` widening for arithmetic/comparison,
//! and `(Bool|Int|Float) -> Str` widening for conditional-branch
//! unification (spec §4.3 "Auto-cast", scenario 8: `true ? 1 : "x"` ->
//! `"1"`). Elvis (`a ?: b`) is lowered to the conditional `a ? a : b`
//! before compilation reaches auto-cast dispatch (see
//! `compiler::compile_binary`), so it unifies its branches through the
//! same `Conditional` context as an ordinary ternary rather than through
//! `BinaryOperator`.

use std::sync::Arc;

use crate::error::EvalResult;
use crate::plugin::{AutoCast, AutoCastContext, CastLeg, Plugin};
use crate::scope::Scope;
use crate::value::{TypeRegistry, TypeTag, Value};

pub struct CastPlugin;

impl Plugin for CastPlugin {
    fn plugin_name(&self) -> &str {
        "builtin.cast"
    }

    fn try_compile_auto_cast(
        &self,
        ctx: AutoCastContext,
        lhs_type: TypeTag,
        rhs_type: TypeTag,
        _types: &TypeRegistry,
    ) -> Option<AutoCast> {
        if let Some(cast) = numeric_widening(lhs_type, rhs_type) {
            return Some(cast);
        }
        let wants_string_widening = match &ctx {
            AutoCastContext::Conditional => true,
            // Elvis is lowered to a conditional before auto-cast dispatch,
            // so no binary operator reaching this arm wants string widening.
            AutoCastContext::BinaryOperator { .. } => false,
        };
        if wants_string_widening {
            return string_widening(lhs_type, rhs_type);
        }
        None
    }
}

fn numeric_widening(lhs_type: TypeTag, rhs_type: TypeTag) -> Option<AutoCast> {
    if lhs_type == TypeTag::INT && rhs_type == TypeTag::FLOAT {
        Some(AutoCast { lhs: Some(int_to_float_leg()), rhs: None })
    } else if lhs_type == TypeTag::FLOAT && rhs_type == TypeTag::INT {
        Some(AutoCast { lhs: None, rhs: Some(int_to_float_leg()) })
    } else {
        None
    }
}

fn string_widening(lhs_type: TypeTag, rhs_type: TypeTag) -> Option<AutoCast> {
    let castable = |t: TypeTag| t == TypeTag::BOOL || t == TypeTag::INT || t == TypeTag::FLOAT;
    match (lhs_type == TypeTag::STR, rhs_type == TypeTag::STR) {
        (true, false) if castable(rhs_type) => Some(AutoCast { lhs: None, rhs: Some(to_str_leg()) }),
        (false, true) if castable(lhs_type) => Some(AutoCast { lhs: Some(to_str_leg()), rhs: None }),
        _ => None,
    }
}

fn int_to_float_leg() -> CastLeg {
    CastLeg {
        callback: Arc::new(|_: &mut Scope, args: &[Value]| -> EvalResult<Value> {
            match args[0] {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                ref other => Ok(other.clone()),
            }
        }),
        result_type: TypeTag::FLOAT,
        reverse_cast_name: "Float".to_string(),
    }
}

fn to_str_leg() -> CastLeg {
    CastLeg {
        callback: Arc::new(|_: &mut Scope, args: &[Value]| -> EvalResult<Value> { Ok(Value::str(args[0].to_string())) }),
        result_type: TypeTag::STR,
        reverse_cast_name: "Str".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_int_toward_float_either_side() {
        assert!(numeric_widening(TypeTag::INT, TypeTag::FLOAT).is_some());
        assert!(numeric_widening(TypeTag::FLOAT, TypeTag::INT).is_some());
        assert!(numeric_widening(TypeTag::INT, TypeTag::INT).is_none());
    }

    #[test]
    fn widens_numeric_or_bool_toward_str_in_conditionals() {
        assert!(string_widening(TypeTag::INT, TypeTag::STR).is_some());
        assert!(string_widening(TypeTag::STR, TypeTag::BOOL).is_some());
        assert!(string_widening(TypeTag::STR, TypeTag::STR).is_none());
    }
}
