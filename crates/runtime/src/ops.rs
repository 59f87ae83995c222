//! Operator dispatch over runtime values.
//!
//! Each operator is a pure function over its operands returning a Value,
//! with failures carried as `Value::Error`. Operators never short-circuit
//! on errors: operands are coerced, and coercing an Error propagates it
//! (left operand first).

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal::prelude::ToPrimitive;
use tally_dsl::ast::{BinaryOp, UnaryOp};

use crate::value::{ErrorValue, Value};

/// Apply a binary operator.
pub fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    if lhs.is_error() {
        return lhs;
    }
    if rhs.is_error() {
        return rhs;
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        | BinaryOp::Pow => arithmetic(op, &lhs, &rhs),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => comparison(op, &lhs, &rhs),
        BinaryOp::Concat => match (lhs.coerce_string(), rhs.coerce_string()) {
            (Ok(mut l), Ok(r)) => {
                l.push_str(&r);
                Value::String(l)
            }
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },
        BinaryOp::And => logic(&lhs, &rhs, |l, r| l && r),
        BinaryOp::Or => logic(&lhs, &rhs, |l, r| l || r),
        BinaryOp::Eq => Value::Bool(lhs.loose_eq(&rhs)),
        BinaryOp::Ne => Value::Bool(!lhs.loose_eq(&rhs)),
    }
}

/// Apply a unary operator. `await` is scheduling syntax handled by the
/// planner; by the time evaluation reaches it, it is the identity.
pub fn unary(op: UnaryOp, operand: Value) -> Value {
    if operand.is_error() {
        return operand;
    }

    match op {
        UnaryOp::Neg => match operand.coerce_number() {
            Ok(n) => Value::Number(-n),
            Err(e) => Value::Error(e),
        },
        UnaryOp::Not => match operand.coerce_bool() {
            Ok(b) => Value::Bool(!b),
            Err(e) => Value::Error(e),
        },
        UnaryOp::Await => operand,
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let (l, r) = match (lhs.coerce_number(), rhs.coerce_number()) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };

    let result = match op {
        BinaryOp::Add => l.checked_add(r).ok_or_else(overflow),
        BinaryOp::Sub => l.checked_sub(r).ok_or_else(overflow),
        BinaryOp::Mul => l.checked_mul(r).ok_or_else(overflow),
        BinaryOp::Div => {
            if r.is_zero() {
                Err(ErrorValue::math("division by zero"))
            } else {
                l.checked_div(r).ok_or_else(overflow)
            }
        }
        BinaryOp::Mod => remainder(l, r),
        BinaryOp::Pow => power(l, r),
        _ => unreachable!("non-arithmetic operator"),
    };

    match result {
        Ok(n) => Value::Number(n),
        Err(e) => Value::Error(e),
    }
}

fn remainder(l: Decimal, r: Decimal) -> Result<Decimal, ErrorValue> {
    if !l.fract().is_zero() || !r.fract().is_zero() {
        return Err(ErrorValue::math("remainder requires integer operands"));
    }
    if r.is_zero() {
        return Err(ErrorValue::math("remainder by zero"));
    }
    l.checked_rem(r).ok_or_else(overflow)
}

fn power(base: Decimal, exp: Decimal) -> Result<Decimal, ErrorValue> {
    if base.is_zero() && exp.is_zero() {
        return Err(ErrorValue::math("0^0 is undefined"));
    }
    if base.is_zero() && exp.is_sign_negative() {
        return Err(ErrorValue::math("zero to a negative power"));
    }

    if exp.fract().is_zero() {
        let e = exp
            .to_i64()
            .ok_or_else(|| ErrorValue::math("exponent out of range"))?;
        base.checked_powi(e).ok_or_else(overflow)
    } else {
        if base.is_sign_negative() {
            return Err(ErrorValue::math("fractional power of a negative number"));
        }
        base.checked_powd(exp).ok_or_else(overflow)
    }
}

fn comparison(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let (l, r) = match (lhs.coerce_number(), rhs.coerce_number()) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };

    Value::Bool(match op {
        BinaryOp::Lt => l < r,
        BinaryOp::Le => l <= r,
        BinaryOp::Gt => l > r,
        BinaryOp::Ge => l >= r,
        _ => unreachable!("non-comparison operator"),
    })
}

fn logic(lhs: &Value, rhs: &Value, apply: impl Fn(bool, bool) -> bool) -> Value {
    match (lhs.coerce_bool(), rhs.coerce_bool()) {
        (Ok(l), Ok(r)) => Value::Bool(apply(l, r)),
        (Err(e), _) | (_, Err(e)) => Value::Error(e),
    }
}

fn overflow() -> ErrorValue {
    ErrorValue::math("arithmetic overflow")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RuntimeErrorKind;
    use std::str::FromStr;

    fn num(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    fn err_kind(value: Value) -> RuntimeErrorKind {
        match value {
            Value::Error(e) => e.kind,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(BinaryOp::Add, num("1.1"), num("2.2")), num("3.3"));
        assert_eq!(binary(BinaryOp::Sub, num("5"), num("7")), num("-2"));
        assert_eq!(binary(BinaryOp::Mul, num("0.1"), num("0.2")), num("0.02"));
        assert_eq!(binary(BinaryOp::Div, num("1"), num("8")), num("0.125"));
        assert_eq!(binary(BinaryOp::Mod, num("10"), num("3")), num("1"));
        assert_eq!(binary(BinaryOp::Pow, num("2"), num("10")), num("1024"));
    }

    #[test]
    fn test_arithmetic_coerces_operands() {
        assert_eq!(binary(BinaryOp::Add, Value::string("2"), num("3")), num("5"));
        assert_eq!(binary(BinaryOp::Mul, Value::Bool(true), num("9")), num("9"));
        assert_eq!(
            err_kind(binary(BinaryOp::Add, Value::string("abc"), num("1"))),
            RuntimeErrorKind::CoercionFailed
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            err_kind(binary(BinaryOp::Div, num("1"), num("0"))),
            RuntimeErrorKind::MathDomain
        );
    }

    #[test]
    fn test_zero_pow_zero() {
        assert_eq!(
            err_kind(binary(BinaryOp::Pow, num("0"), num("0"))),
            RuntimeErrorKind::MathDomain
        );
    }

    #[test]
    fn test_fractional_remainder() {
        assert_eq!(
            err_kind(binary(BinaryOp::Mod, num("10.5"), num("3"))),
            RuntimeErrorKind::MathDomain
        );
        assert_eq!(
            err_kind(binary(BinaryOp::Mod, num("10"), num("0"))),
            RuntimeErrorKind::MathDomain
        );
    }

    #[test]
    fn test_comparison() {
        assert_eq!(binary(BinaryOp::Lt, num("1"), num("2")), Value::Bool(true));
        assert_eq!(binary(BinaryOp::Ge, num("2"), num("2")), Value::Bool(true));
        assert_eq!(
            binary(BinaryOp::Gt, Value::string("10"), num("9")),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            binary(BinaryOp::Concat, Value::string("a"), num("1.50")),
            Value::string("a1.5")
        );
    }

    #[test]
    fn test_logic_is_strict() {
        assert_eq!(
            binary(BinaryOp::And, Value::Bool(true), Value::Bool(false)),
            Value::Bool(false)
        );
        assert_eq!(
            binary(BinaryOp::Or, Value::Bool(false), num("1")),
            Value::Bool(true)
        );
        // both sides are coerced even when the left decides
        assert_eq!(
            err_kind(binary(BinaryOp::Or, Value::Bool(true), Value::string("x"))),
            RuntimeErrorKind::CoercionFailed
        );
    }

    #[test]
    fn test_equality_never_errors() {
        assert_eq!(
            binary(BinaryOp::Eq, Value::List(vec![]), num("1")),
            Value::Bool(false)
        );
        assert_eq!(
            binary(BinaryOp::Ne, num("1"), Value::string("1")),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_error_operand_propagates() {
        let e = Value::Error(ErrorValue::math("boom"));
        assert_eq!(err_kind(binary(BinaryOp::Add, e.clone(), num("1"))), RuntimeErrorKind::MathDomain);
        assert_eq!(err_kind(binary(BinaryOp::Eq, num("1"), e.clone())), RuntimeErrorKind::MathDomain);
        assert_eq!(err_kind(unary(UnaryOp::Not, e)), RuntimeErrorKind::MathDomain);
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, num("2.5")), num("-2.5"));
        assert_eq!(unary(UnaryOp::Neg, Value::string("4")), num("-4"));
        assert_eq!(unary(UnaryOp::Not, Value::Bool(false)), Value::Bool(true));
        assert_eq!(unary(UnaryOp::Await, num("1")), num("1"));
    }
}
