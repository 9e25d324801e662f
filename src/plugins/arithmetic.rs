//! Arithmetic fixture: `+ - * /` over `Int`/`Float`, unary `-`, with the
//! identity/absorbing-element table entries that drive scenario 12 (`x * 0`
//! folds to `CONST 0`) and the rest of spec §4.2's "binary operator
//! optimization table".

use std::sync::Arc;

use crate::error::{EvalError, EvalErrorKind};
use crate::plugin::{BinaryOptRule, Calculus, Invocability, Match, Plugin, Replacement, Side};
use crate::scope::Scope;
use crate::value::{TypeRegistry, TypeTag, Value};

pub struct ArithmeticPlugin {
    calc: Calculus,
}

impl ArithmeticPlugin {
    pub fn new() -> Self {
        let mut calc = Calculus::new();

        add_int_binary(&mut calc, "+", |a, b| a + b);
        add_int_binary(&mut calc, "-", |a, b| a - b);
        add_int_binary(&mut calc, "*", |a, b| a * b);
        add_float_binary(&mut calc, "+", |a, b| a + b);
        add_float_binary(&mut calc, "-", |a, b| a - b);
        add_float_binary(&mut calc, "*", |a, b| a * b);

        calc.add_binary_op(
            "/",
            TypeTag::INT,
            TypeTag::INT,
            Match::new(
                Arc::new(|_: &mut Scope, args: &[Value]| {
                    let divisor = int(&args[1]);
                    if divisor == 0 {
                        return Err(EvalError::new(EvalErrorKind::ExceptionInCallback {
                            message: "division by zero".to_string(),
                        }));
                    }
                    Ok(Value::Int(int(&args[0]) / divisor))
                }),
                TypeTag::INT,
                Invocability::Ct,
            ),
        );
        calc.add_binary_op(
            "/",
            TypeTag::FLOAT,
            TypeTag::FLOAT,
            Match::new(
                Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Float(float(&args[0]) / float(&args[1])))),
                TypeTag::FLOAT,
                Invocability::Ct,
            ),
        );

        calc.add_unary_op(
            "-",
            TypeTag::INT,
            Match::new(Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Int(-int(&args[0])))), TypeTag::INT, Invocability::Ct),
        );
        calc.add_unary_op(
            "-",
            TypeTag::FLOAT,
            Match::new(Arc::new(|_: &mut Scope, args: &[Value]| Ok(Value::Float(-float(&args[0])))), TypeTag::FLOAT, Invocability::Ct),
        );

        // Identity/absorbing-element rewrites (spec §4.2 "Calculus" table,
        // §8 scenario 12). `0 - x` is deliberately omitted: it is not an
        // identity, the rhs still has to be negated.
        let is_int_zero = |v: &Value| matches!(v, Value::Int(0));
        let is_int_one = |v: &Value| matches!(v, Value::Int(1));
        let is_float_zero = |v: &Value| matches!(v, Value::Float(f) if *f == 0.0);
        let is_float_one = |v: &Value| matches!(v, Value::Float(f) if *f == 1.0);

        for (symbol, side) in [("+", Side::Rhs), ("+", Side::Lhs), ("-", Side::Rhs)] {
            calc.add_binary_opt(BinaryOptRule {
                symbol,
                side,
                other_type: TypeTag::INT,
                matches_constant: is_int_zero,
                replacement: Replacement::OtherOperand,
            });
            calc.add_binary_opt(BinaryOptRule {
                symbol,
                side,
                other_type: TypeTag::FLOAT,
                matches_constant: is_float_zero,
                replacement: Replacement::OtherOperand,
            });
        }
        for (symbol, side) in [("*", Side::Rhs), ("*", Side::Lhs)] {
            calc.add_binary_opt(BinaryOptRule {
                symbol,
                side,
                other_type: TypeTag::INT,
                matches_constant: is_int_one,
                replacement: Replacement::OtherOperand,
            });
            calc.add_binary_opt(BinaryOptRule {
                symbol,
                side,
                other_type: TypeTag::FLOAT,
                matches_constant: is_float_one,
                replacement: Replacement::OtherOperand,
            });
            calc.add_binary_opt(BinaryOptRule {
                symbol,
                side,
                other_type: TypeTag::INT,
                matches_constant: is_int_zero,
                replacement: Replacement::Constant(Value::Int(0)),
            });
            calc.add_binary_opt(BinaryOptRule {
                symbol,
                side,
                other_type: TypeTag::FLOAT,
                matches_constant: is_float_zero,
                replacement: Replacement::Constant(Value::Float(0.0)),
            });
        }

        ArithmeticPlugin { calc }
    }
}

impl Default for ArithmeticPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn int(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        _ => unreachable!("dispatch already checked the operand type"),
    }
}

fn float(v: &Value) -> f64 {
    match v {
        Value::Float(f) => *f,
        _ => unreachable!("dispatch already checked the operand type"),
    }
}

fn add_int_binary(calc: &mut Calculus, symbol: &'static str, op: fn(i64, i64) -> i64) {
    calc.add_binary_op(
        symbol,
        TypeTag::INT,
        TypeTag::INT,
        Match::new(
            Arc::new(move |_: &mut Scope, args: &[Value]| Ok(Value::Int(op(int(&args[0]), int(&args[1]))))),
            TypeTag::INT,
            Invocability::Ct,
        ),
    );
}

fn add_float_binary(calc: &mut Calculus, symbol: &'static str, op: fn(f64, f64) -> f64) {
    calc.add_binary_op(
        symbol,
        TypeTag::FLOAT,
        TypeTag::FLOAT,
        Match::new(
            Arc::new(move |_: &mut Scope, args: &[Value]| Ok(Value::Float(op(float(&args[0]), float(&args[1]))))),
            TypeTag::FLOAT,
            Invocability::Ct,
        ),
    );
}

impl Plugin for ArithmeticPlugin {
    fn plugin_name(&self) -> &str {
        "builtin.arithmetic"
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

    fn try_compile_binary_optimization(
        &self,
        symbol: &str,
        constant_side: Side,
        constant: &Value,
        other_type: TypeTag,
        _types: &TypeRegistry,
    ) -> Option<Replacement> {
        self.calc.lookup_binary_opt(symbol, constant_side, constant, other_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeRegistry;

    #[test]
    fn addition_dispatches_for_matching_int_types() {
        let plugin = ArithmeticPlugin::new();
        let types = TypeRegistry::new();
        let m = plugin.try_compile_binary_op("+", TypeTag::INT, TypeTag::INT, None, None, &types);
        assert!(m.is_some());
        assert_eq!(m.unwrap().result_type, TypeTag::INT);
    }

    #[test]
    fn x_times_zero_folds_to_constant_zero() {
        let plugin = ArithmeticPlugin::new();
        let types = TypeRegistry::new();
        let repl = plugin.try_compile_binary_optimization(
            "*",
            Side::Rhs,
            &Value::Int(0),
            TypeTag::INT,
            &types,
        );
        assert!(matches!(repl, Some(Replacement::Constant(Value::Int(0)))));
    }

    #[test]
    fn x_plus_zero_folds_to_the_other_operand() {
        let plugin = ArithmeticPlugin::new();
        let types = TypeRegistry::new();
        let repl = plugin.try_compile_binary_optimization("+", Side::Rhs, &Value::Int(0), TypeTag::INT, &types);
        assert!(matches!(repl, Some(Replacement::OtherOperand)));
    }
}
