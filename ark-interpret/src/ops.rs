use ark_ast::{BinOp, Span, UnaryOp};
use ark_core::{RuntimeError, RuntimeErrorKind, Value};

/// Applies a non-short-circuit binary operator. Arithmetic needs both
/// operands `Integer` or both `Float`; `+` with a `String` on either side
/// concatenates. Integer arithmetic wraps (the reference semantics have no
/// overflow trap).
pub(crate) fn binary(
    op: BinOp,
    lhs: Value,
    rhs: Value,
    span: Span,
) -> Result<Value, RuntimeError> {
    use BinOp::*;
    use Value::{Float, Integer, Str};

    let result = match (op, &lhs, &rhs) {
        (Add, Str(_), _) | (Add, _, Str(_)) => Str(format!("{lhs}{rhs}")),
        (Add, Integer(a), Integer(b)) => Integer(a.wrapping_add(*b)),
        (Sub, Integer(a), Integer(b)) => Integer(a.wrapping_sub(*b)),
        (Mul, Integer(a), Integer(b)) => Integer(a.wrapping_mul(*b)),
        (Div, Integer(a), Integer(b)) => {
            if *b == 0 {
                return Err(RuntimeError::at(RuntimeErrorKind::DivisionByZero, span));
            }
            Integer(a.wrapping_div(*b))
        }
        (Mod, Integer(a), Integer(b)) => {
            if *b == 0 {
                return Err(RuntimeError::at(RuntimeErrorKind::DivisionByZero, span));
            }
            Integer(a.wrapping_rem(*b))
        }

        (Add, Float(a), Float(b)) => Float(a + b),
        (Sub, Float(a), Float(b)) => Float(a - b),
        (Mul, Float(a), Float(b)) => Float(a * b),
        (Div, Float(a), Float(b)) => {
            if *b == 0.0 {
                return Err(RuntimeError::at(RuntimeErrorKind::DivisionByZero, span));
            }
            Float(a / b)
        }
        (Mod, Float(a), Float(b)) => {
            if *b == 0.0 {
                return Err(RuntimeError::at(RuntimeErrorKind::DivisionByZero, span));
            }
            Float(a % b)
        }

        (Eq, _, _) => Value::Bool(lhs == rhs),
        (Ne, _, _) => Value::Bool(lhs != rhs),

        (Lt, Integer(a), Integer(b)) => Value::Bool(a < b),
        (Gt, Integer(a), Integer(b)) => Value::Bool(a > b),
        (Le, Integer(a), Integer(b)) => Value::Bool(a <= b),
        (Ge, Integer(a), Integer(b)) => Value::Bool(a >= b),
        (Lt, Float(a), Float(b)) => Value::Bool(a < b),
        (Gt, Float(a), Float(b)) => Value::Bool(a > b),
        (Le, Float(a), Float(b)) => Value::Bool(a <= b),
        (Ge, Float(a), Float(b)) => Value::Bool(a >= b),
        (Lt, Str(a), Str(b)) => Value::Bool(a < b),
        (Gt, Str(a), Str(b)) => Value::Bool(a > b),
        (Le, Str(a), Str(b)) => Value::Bool(a <= b),
        (Ge, Str(a), Str(b)) => Value::Bool(a >= b),

        _ => {
            return Err(RuntimeError::at(
                RuntimeErrorKind::TypeMismatch {
                    op: op.to_string(),
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                },
                span,
            ));
        }
    };
    Ok(result)
}

pub(crate) fn unary(op: UnaryOp, value: Value, span: Span) -> Result<Value, RuntimeError> {
    match (op, &value) {
        (UnaryOp::Neg, Value::Integer(n)) => Ok(Value::Integer(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, other) => Err(RuntimeError::at(
            RuntimeErrorKind::UnaryTypeMismatch {
                op: op.to_string(),
                operand: other.type_name(),
            },
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::new(1, 1)
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(
            binary(BinOp::Add, Value::Integer(2), Value::Integer(3), sp()).unwrap(),
            Value::Integer(5)
        );
        assert_eq!(
            binary(BinOp::Mod, Value::Integer(7), Value::Integer(4), sp()).unwrap(),
            Value::Integer(3)
        );
    }

    #[test]
    fn plus_concatenates_when_either_side_is_string() {
        assert_eq!(
            binary(BinOp::Add, Value::Str("n=".into()), Value::Integer(3), sp()).unwrap(),
            Value::Str("n=3".into())
        );
        assert_eq!(
            binary(BinOp::Add, Value::Integer(3), Value::Str("!".into()), sp()).unwrap(),
            Value::Str("3!".into())
        );
    }

    #[test]
    fn mixed_numeric_operands_are_a_type_mismatch() {
        let err = binary(BinOp::Add, Value::Integer(1), Value::Float(2.0), sp()).unwrap_err();
        assert_eq!(
            err.kind,
            RuntimeErrorKind::TypeMismatch {
                op: "+".to_string(),
                lhs: "Integer",
                rhs: "Float"
            }
        );
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = binary(BinOp::Div, Value::Integer(1), Value::Integer(0), sp()).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    }

    #[test]
    fn not_follows_truthiness() {
        assert_eq!(
            unary(UnaryOp::Not, Value::Str(String::new()), sp()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            unary(UnaryOp::Not, Value::list(vec![]), sp()).unwrap(),
            Value::Bool(false)
        );
    }
}
