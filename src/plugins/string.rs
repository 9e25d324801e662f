//! String fixture: `+` (concatenation) over `Str`, compile-time-invokable.

use std::sync::Arc;

use crate::plugin::{Calculus, Invocability, Match, Plugin};
use crate::scope::Scope;
use crate::value::{TypeRegistry, TypeTag, Value};

pub struct StringPlugin {
    calc: Calculus,
}

impl StringPlugin {
    pub fn new() -> Self {
        let mut calc = Calculus::new();
        calc.add_binary_op(
            "+",
            TypeTag::STR,
            TypeTag::STR,
            Match::new(
                Arc::new(|_: &mut Scope, args: &[Value]| {
                    let (a, b) = (str_of(&args[0]), str_of(&args[1]));
                    Ok(Value::str(format!("{a}{b}")))
                }),
                TypeTag::STR,
                Invocability::Ct,
            ),
        );
        StringPlugin { calc }
    }
}

impl Default for StringPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn str_of(v: &Value) -> &str {
    match v {
        Value::Str(s) => s,
        _ => unreachable!("dispatch already checked the operand type"),
    }
}

impl Plugin for StringPlugin {
    fn plugin_name(&self) -> &str {
        "builtin.string"
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation_is_compile_time_invocable() {
        let plugin = StringPlugin::new();
        let types = TypeRegistry::new();
        let m = plugin.try_compile_binary_op("+", TypeTag::STR, TypeTag::STR, None, None, &types).unwrap();
        assert_eq!(m.invocability, Invocability::Ct);
        let mut scope = Scope::new(crate::formatter::Formatter::default());
        let result = (m.callback)(&mut scope, &[Value::str("Hello "), Value::str("World")]).unwrap();
        assert_eq!(result, Value::str("Hello World"));
    }
}
