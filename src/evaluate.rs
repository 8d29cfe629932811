use std::{cmp::Ordering, collections::HashMap};

use chrono::{Duration, NaiveDate};

use crate::{
    ast::{BinaryOp, Expression, UnaryOp},
    error::{Error, Result},
    methods::{DeclaringType, KnownMethod, MemberRef},
    value::Value,
};

/// Computes closed subtrees: the shapes [evaluate] does not handle itself.
pub trait ClosedEvaluator {
    /// Value of a static field or property, e.g. `DateTime.Today`.
    fn static_member(&self, member: &MemberRef) -> Result<Value>;

    /// Value of a closed subtree that is neither a constant nor a member
    ///  access. Implementations recurse through [evaluate] for children.
    fn evaluate_closed(&self, expr: &Expression) -> Result<Value>;
}

impl<T: ClosedEvaluator + ?Sized> ClosedEvaluator for &T {
    fn static_member(&self, member: &MemberRef) -> Result<Value> {
        (**self).static_member(member)
    }

    fn evaluate_closed(&self, expr: &Expression) -> Result<Value> {
        (**self).evaluate_closed(expr)
    }
}

/// True when the subtree references no lambda parameter and can therefore be
///  computed before translation. A nested lambda is an error: there is nothing
///  to bind it to.
pub fn is_evaluatable(expr: &Expression) -> Result<bool> {
    Ok(match expr {
        Expression::Binary { left, right, .. } => is_evaluatable(left)? && is_evaluatable(right)?,
        Expression::Unary { operand, .. } => is_evaluatable(operand)?,
        Expression::Constant { .. } => true,
        Expression::Parameter { .. } => false,
        Expression::MethodCall { target, args, .. } => {
            let target = match target {
                Some(target) => is_evaluatable(target)?,
                None => true,
            };
            target && all_evaluatable(args)?
        }
        Expression::MemberAccess { owner, .. } => match owner {
            Some(owner) => is_evaluatable(owner)?,
            None => true,
        },
        Expression::New { args, .. } => all_evaluatable(args)?,
        Expression::NewArray { items, .. } => all_evaluatable(items)?,
        Expression::Conditional {
            test,
            if_true,
            if_false,
        } => is_evaluatable(test)? && is_evaluatable(if_true)? && is_evaluatable(if_false)?,
        Expression::Lambda { .. } => return Err(Error::UnsupportedNode(expr.kind())),
    })
}

fn all_evaluatable(exprs: &[Expression]) -> Result<bool> {
    for expr in exprs {
        if !is_evaluatable(expr)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluates a closed subtree. Constants and member reads are handled here;
///  everything else goes to `fallback`.
pub fn evaluate(expr: &Expression, fallback: &dyn ClosedEvaluator) -> Result<Value> {
    match expr {
        Expression::Constant { value, .. } => Ok(value.clone()),
        Expression::MemberAccess {
            owner: Some(owner),
            member,
        } => {
            let owner = evaluate(owner, fallback)?;
            owner
                .member(&member.name)
                .ok_or_else(|| Error::unsupported_member(owner.type_name(), &member.name))
        }
        Expression::MemberAccess {
            owner: None,
            member,
        } => fallback.static_member(member),
        _ => fallback.evaluate_closed(expr),
    }
}

/// The evaluator used unless the caller supplies their own. Covers operators,
///  array and object construction for dates, the common string methods and a
///  handful of well known statics. Further statics can be registered.
#[derive(Debug, Clone, Default)]
pub struct StandardEvaluator {
    statics: HashMap<(String, String), Value>,
}

impl StandardEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `declaring_type.name` evaluate to `value`. Registered values take
    ///  precedence over the built in ones.
    pub fn with_static(
        mut self,
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.statics
            .insert((declaring_type.into(), name.into()), value.into());
        self
    }

    fn eval(&self, expr: &Expression) -> Result<Value> {
        evaluate(expr, self)
    }

    fn eval_all(&self, exprs: &[Expression]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_call(
        &self,
        target: Option<&Expression>,
        method: &crate::methods::MethodRef,
        args: &[Expression],
    ) -> Result<Value> {
        let unsupported = || Error::unsupported_method(method);
        let known = method.known().ok_or_else(unsupported)?;

        let target = target.map(|t| self.eval(t)).transpose()?;
        let args = self.eval_all(args)?;

        match (target, known, args.as_slice()) {
            // Extension form: Enumerable.Contains(collection, item)
            (None, KnownMethod::Contains, [collection, item])
                if method.declaring_type.is_sequence() =>
            {
                sequence_contains(collection, item)
            }
            (Some(Value::Str(s)), method, args) => string_method(&s, method, args),
            (Some(collection @ Value::List(_)), KnownMethod::Contains, [item]) => {
                sequence_contains(&collection, item)
            }
            (Some(Value::DateTime(d)), KnownMethod::AddDays, [days]) => {
                let days = as_days(days)?;
                d.checked_add_signed(days)
                    .map(Value::DateTime)
                    .ok_or_else(|| Error::Evaluation("date out of range".to_string()))
            }
            (Some(Value::Date(d)), KnownMethod::AddDays, [days]) => {
                let days = as_days(days)?;
                d.checked_add_signed(days)
                    .map(Value::Date)
                    .ok_or_else(|| Error::Evaluation("date out of range".to_string()))
            }
            (Some(Value::Null), _, _) => Err(Error::Evaluation(format!(
                "{} called on a null value",
                method.name
            ))),
            (Some(v), KnownMethod::ToString, []) => Ok(Value::Str(display_plain(&v))),
            (Some(v), KnownMethod::Equals, [other]) => Ok(Value::Bool(values_equal(&v, other))),
            (None, KnownMethod::Abs, [v]) if method.declaring_type == DeclaringType::Math => {
                match v {
                    Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(unsupported),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    _ => Err(unsupported()),
                }
            }
            (None, KnownMethod::Max | KnownMethod::Min, [a, b])
                if method.declaring_type == DeclaringType::Math =>
            {
                let ord = compare(a, b).ok_or_else(unsupported)?;
                let take_a = match known {
                    KnownMethod::Max => ord != Ordering::Less,
                    _ => ord != Ordering::Greater,
                };
                Ok(if take_a { a.clone() } else { b.clone() })
            }
            _ => Err(unsupported()),
        }
    }

    fn construct(&self, ty: &str, args: &[Expression]) -> Result<Value> {
        let args = self.eval_all(args)?;
        let ints: Option<Vec<i64>> = args
            .iter()
            .map(|a| match a {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        let bad = || Error::Evaluation(format!("cannot construct {ty} from ({})", list(&args)));

        match (ty, ints.as_deref()) {
            ("DateOnly", Some([y, m, d])) => date(*y, *m, *d).map(Value::Date).ok_or_else(bad),
            ("DateTime", Some([y, m, d])) => date(*y, *m, *d)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(Value::DateTime)
                .ok_or_else(bad),
            ("DateTime", Some([y, mo, d, h, mi, s])) => date(*y, *mo, *d)
                .and_then(|d| {
                    d.and_hms_opt(
                        u32::try_from(*h).ok()?,
                        u32::try_from(*mi).ok()?,
                        u32::try_from(*s).ok()?,
                    )
                })
                .map(Value::DateTime)
                .ok_or_else(bad),
            _ => Err(bad()),
        }
    }
}

impl ClosedEvaluator for StandardEvaluator {
    fn static_member(&self, member: &MemberRef) -> Result<Value> {
        let key = (member.declaring_type.clone(), member.name.clone());
        if let Some(value) = self.statics.get(&key) {
            return Ok(value.clone());
        }

        let now = chrono::Local::now().naive_local();
        match (member.declaring_type.as_str(), member.name.as_str()) {
            ("DateTime", "Now") => Ok(Value::DateTime(now)),
            ("DateTime", "UtcNow") => Ok(Value::DateTime(chrono::Utc::now().naive_utc())),
            ("DateTime", "Today") => Ok(now
                .date()
                .and_hms_opt(0, 0, 0)
                .map(Value::DateTime)
                .unwrap_or(Value::DateTime(now))),
            ("string" | "String", "Empty") => Ok(Value::Str(String::new())),
            ("int" | "Int32", "MaxValue") => Ok(Value::Int(i32::MAX.into())),
            ("int" | "Int32", "MinValue") => Ok(Value::Int(i32::MIN.into())),
            ("long" | "Int64", "MaxValue") => Ok(Value::Int(i64::MAX)),
            ("long" | "Int64", "MinValue") => Ok(Value::Int(i64::MIN)),
            _ => Err(Error::unsupported_member(
                &member.declaring_type,
                &member.name,
            )),
        }
    }

    fn evaluate_closed(&self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Constant { .. } | Expression::MemberAccess { .. } => self.eval(expr),

            // && and || short circuit like the source language
            Expression::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                let left = self.eval(left)?;
                match (op, left.as_bool()) {
                    (BinaryOp::And, Some(false)) => Ok(Value::Bool(false)),
                    (BinaryOp::Or, Some(true)) => Ok(Value::Bool(true)),
                    (_, Some(_)) => match self.eval(right)? {
                        v @ Value::Bool(_) => Ok(v),
                        other => Err(Error::Evaluation(format!(
                            "{} expects booleans, got {other}",
                            op.symbol()
                        ))),
                    },
                    (_, None) => Err(Error::Evaluation(format!(
                        "{} expects booleans, got {left}",
                        op.symbol()
                    ))),
                }
            }
            Expression::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                eval_binary_op(*op, left, right)
            }

            Expression::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match (op, v) {
                    (UnaryOp::Convert, v) => Ok(v),
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Negate, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| Error::Evaluation("integer overflow".to_string())),
                    (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
                    (op, v) => Err(Error::Evaluation(format!("invalid operand {v} for {op:?}"))),
                }
            }

            Expression::Conditional {
                test,
                if_true,
                if_false,
            } => match self.eval(test)? {
                Value::Bool(true) => self.eval(if_true),
                Value::Bool(false) => self.eval(if_false),
                other => Err(Error::Evaluation(format!(
                    "conditional test must be boolean, got {other}"
                ))),
            },

            Expression::NewArray { items, .. } => Ok(Value::List(self.eval_all(items)?)),
            Expression::New { ty, args } => self.construct(ty, args),
            Expression::MethodCall {
                target,
                method,
                args,
            } => self.eval_call(target.as_deref(), method, args),

            Expression::Parameter { .. } | Expression::Lambda { .. } => {
                Err(Error::NotEvaluatable(expr.kind()))
            }
        }
    }
}

fn eval_binary_op(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use Value::*;
    let invalid = |left: &Value, right: &Value| {
        Error::Evaluation(format!("invalid operands {left} {} {right}", op.symbol()))
    };
    let overflow = || Error::Evaluation("integer overflow".to_string());

    match op {
        BinaryOp::Equal => Ok(Bool(values_equal(&left, &right))),
        BinaryOp::NotEqual => Ok(Bool(!values_equal(&left, &right))),

        // Ordering against null is false, as for lifted operators
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            if left.is_null() || right.is_null() {
                return Ok(Bool(false));
            }
            let ord = compare(&left, &right).ok_or_else(|| invalid(&left, &right))?;
            Ok(Bool(match op {
                BinaryOp::LessThan => ord == Ordering::Less,
                BinaryOp::LessThanOrEqual => ord != Ordering::Greater,
                BinaryOp::GreaterThan => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }

        BinaryOp::ArrayIndex => match (&left, &right) {
            (List(items), Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| Error::Evaluation(format!("index {i} is out of range"))),
            (Str(s), Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Str(c.to_string()))
                .ok_or_else(|| Error::Evaluation(format!("index {i} is out of range"))),
            _ => Err(invalid(&left, &right)),
        },

        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Bool(a), Bool(b)) => Ok(Bool(if op == BinaryOp::And { a && b } else { a || b })),
            (l, r) => Err(invalid(&l, &r)),
        },

        // String concatenation accepts any right hand side
        BinaryOp::Add if matches!(left, Str(_)) || matches!(right, Str(_)) => {
            Ok(Str(format!("{}{}", display_plain(&left), display_plain(&right))))
        }
        _ if left.is_null() || right.is_null() => Ok(Null),

        _ => match (left, right) {
            (Int(a), Int(b)) => match op {
                BinaryOp::Add => a.checked_add(b).map(Int).ok_or_else(overflow),
                BinaryOp::Subtract => a.checked_sub(b).map(Int).ok_or_else(overflow),
                BinaryOp::Multiply => a.checked_mul(b).map(Int).ok_or_else(overflow),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                    Err(Error::Evaluation("division by zero".to_string()))
                }
                BinaryOp::Divide => a.checked_div(b).map(Int).ok_or_else(overflow),
                BinaryOp::Modulo => a.checked_rem(b).map(Int).ok_or_else(overflow),
                _ => Err(invalid(&Int(a), &Int(b))),
            },
            (l, r) => match (as_float(&l), as_float(&r)) {
                (Some(a), Some(b)) => match op {
                    BinaryOp::Add => Ok(Float(a + b)),
                    BinaryOp::Subtract => Ok(Float(a - b)),
                    BinaryOp::Multiply => Ok(Float(a * b)),
                    BinaryOp::Divide => Ok(Float(a / b)),
                    BinaryOp::Modulo => Ok(Float(a % b)),
                    _ => Err(invalid(&l, &r)),
                },
                _ => Err(invalid(&l, &r)),
            },
        },
    }
}

fn string_method(s: &str, method: KnownMethod, args: &[Value]) -> Result<Value> {
    use Value::*;
    let arg_error = || {
        Error::Evaluation(format!(
            "string.{method} does not accept ({})",
            list(args)
        ))
    };
    match (method, args) {
        (KnownMethod::Contains, [Str(needle)]) => Ok(Bool(s.contains(needle.as_str()))),
        (KnownMethod::StartsWith, [Str(prefix)]) => Ok(Bool(s.starts_with(prefix.as_str()))),
        (KnownMethod::EndsWith, [Str(suffix)]) => Ok(Bool(s.ends_with(suffix.as_str()))),
        (KnownMethod::ToUpper, []) => Ok(Str(s.to_uppercase())),
        (KnownMethod::ToLower, []) => Ok(Str(s.to_lowercase())),
        (KnownMethod::Trim, []) => Ok(Str(s.trim().to_string())),
        (KnownMethod::ToString, []) => Ok(Str(s.to_string())),
        (KnownMethod::Equals, [other]) => Ok(Bool(matches!(other, Str(o) if o == s))),
        (KnownMethod::Substring, [Int(start)]) => {
            let start = usize::try_from(*start).map_err(|_| arg_error())?;
            Ok(Str(s.chars().skip(start).collect()))
        }
        (KnownMethod::Substring, [Int(start), Int(len)]) => {
            let start = usize::try_from(*start).map_err(|_| arg_error())?;
            let len = usize::try_from(*len).map_err(|_| arg_error())?;
            Ok(Str(s.chars().skip(start).take(len).collect()))
        }
        _ => Err(arg_error()),
    }
}

fn sequence_contains(collection: &Value, item: &Value) -> Result<Value> {
    match collection {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, item)))),
        other => Err(Error::Evaluation(format!(
            "Contains expects a sequence, got {other}"
        ))),
    }
}

fn as_days(v: &Value) -> Result<Duration> {
    let range = || Error::Evaluation("date out of range".to_string());
    match v {
        Value::Int(days) => Duration::try_days(*days).ok_or_else(range),
        Value::Float(days) => Duration::try_seconds((days * 86_400.0) as i64).ok_or_else(range),
        other => Err(Error::Evaluation(format!(
            "AddDays expects a number, got {other}"
        ))),
    }
}

fn date(y: i64, m: i64, d: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::try_from(y).ok()?,
        u32::try_from(m).ok()?,
        u32::try_from(d).ok()?,
    )
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Equality with integer/float promotion.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            as_float(a) == as_float(b)
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => as_float(a)?.partial_cmp(&as_float(b)?),
    }
}

/// A value as `ToString()` would render it: strings without quotes.
fn display_plain(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn list(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{methods::MethodRef, value::Record};

    fn eval(expr: &Expression) -> Result<Value> {
        evaluate(expr, &StandardEvaluator::new())
    }

    fn c(v: impl Into<Value>) -> Expression {
        Expression::constant(v)
    }

    #[test]
    fn evaluatable() {
        let p = Expression::param("p", "Person");
        assert!(is_evaluatable(&c(1)).unwrap());
        assert!(!is_evaluatable(&p.clone().member("Id")).unwrap());
        assert!(is_evaluatable(&Expression::static_member("DateTime", "Today")).unwrap());
        assert!(
            !is_evaluatable(&Expression::new_array(
                crate::value::ValueType::Int,
                vec![c(1), p.clone().member("Id")]
            ))
            .unwrap()
        );
        let lambda = Expression::lambda("x", "Person", c(true));
        assert_eq!(
            is_evaluatable(&lambda),
            Err(Error::UnsupportedNode("Lambda"))
        );
    }

    #[test]
    fn arithmetic_and_comparison() {
        let sum = Expression::binary(BinaryOp::Add, c(2), c(3));
        assert_eq!(eval(&sum), Ok(Value::Int(5)));

        let mixed = Expression::binary(BinaryOp::Multiply, c(2), c(1.5));
        assert_eq!(eval(&mixed), Ok(Value::Float(3.0)));

        let cmp = Expression::binary(BinaryOp::LessThanOrEqual, c(2), c(2.0));
        assert_eq!(eval(&cmp), Ok(Value::Bool(true)));

        let concat = Expression::binary(BinaryOp::Add, c("id-"), c(7));
        assert_eq!(eval(&concat), Ok(Value::from("id-7")));

        let div = Expression::binary(BinaryOp::Divide, c(1), c(0));
        assert!(matches!(eval(&div), Err(Error::Evaluation(_))));

        let null_sum = Expression::binary(BinaryOp::Add, c(1), Expression::null());
        assert_eq!(eval(&null_sum), Ok(Value::Null));
    }

    #[test]
    fn member_of_closure_record() {
        let closure = c(Record::new("<>c__DisplayClass0").with("ids", vec![1, 2, 3]));
        let ids = closure.clone().member("ids");
        assert_eq!(eval(&ids), Ok(Value::from(vec![1, 2, 3])));

        let missing = closure.member("nope");
        assert_eq!(
            eval(&missing),
            Err(Error::unsupported_member("<>c__DisplayClass0", "nope"))
        );

        let through_null = Expression::null().member("Anything");
        assert_eq!(eval(&through_null), Ok(Value::Null));
    }

    #[test]
    fn statics() {
        let today = eval(&Expression::static_member("DateTime", "Today")).unwrap();
        let Value::DateTime(today) = today else {
            panic!("expected a DateTime")
        };
        assert_eq!(today.time(), chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());

        assert_eq!(
            eval(&Expression::static_member("string", "Empty")),
            Ok(Value::from(""))
        );

        let evaluator = StandardEvaluator::new().with_static("Settings", "Limit", 10);
        assert_eq!(
            evaluate(&Expression::static_member("Settings", "Limit"), &evaluator),
            Ok(Value::Int(10))
        );
        assert_eq!(
            eval(&Expression::static_member("Settings", "Limit")),
            Err(Error::unsupported_member("Settings", "Limit"))
        );
    }

    #[test]
    fn methods_and_construction() {
        let upper = Expression::call(c("bob"), MethodRef::new("string", "ToUpper"), vec![]);
        assert_eq!(eval(&upper), Ok(Value::from("BOB")));

        let contains = Expression::contains(
            Expression::new_array(crate::value::ValueType::Int, vec![c(1), c(2)]),
            c(2),
        );
        assert_eq!(eval(&contains), Ok(Value::Bool(true)));

        let date = Expression::New {
            ty: "DateOnly".into(),
            args: vec![c(2024), c(2), c(29)],
        };
        assert_eq!(
            eval(&date),
            Ok(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );

        let bad_date = Expression::New {
            ty: "DateOnly".into(),
            args: vec![c(2023), c(2), c(29)],
        };
        assert!(matches!(eval(&bad_date), Err(Error::Evaluation(_))));

        let unknown = Expression::call(c("bob"), MethodRef::new("string", "Frobnicate"), vec![]);
        assert_eq!(
            eval(&unknown),
            Err(Error::UnsupportedMethod {
                declaring_type: "String".into(),
                method: "Frobnicate".into()
            })
        );
    }

    #[test]
    fn conditional_and_index() {
        let pick = Expression::conditional(
            Expression::binary(BinaryOp::GreaterThan, c(3), c(2)),
            c("yes"),
            c("no"),
        );
        assert_eq!(eval(&pick), Ok(Value::from("yes")));

        let index = Expression::binary(BinaryOp::ArrayIndex, c(vec![10, 20]), c(1));
        assert_eq!(eval(&index), Ok(Value::Int(20)));

        let out_of_range = Expression::binary(BinaryOp::ArrayIndex, c(vec![10, 20]), c(5));
        assert!(matches!(eval(&out_of_range), Err(Error::Evaluation(_))));
    }
}
