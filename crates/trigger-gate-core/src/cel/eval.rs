//! Tree walking evaluator.

use super::{
    extensions,
    functions::{self, eval_error, no_overload},
    parser::{BinaryOp, Expr, MacroKind, UnaryOp},
    value::{Value, ValueMap},
    Activation, CelError,
};
use std::cmp::Ordering;

pub(crate) fn evaluate(expr: &Expr, activation: &Activation) -> Result<Value, CelError> {
    Evaluator {
        activation,
        locals: Vec::new(),
    }
    .eval(expr)
}

struct Evaluator<'a> {
    activation: &'a Activation,
    /// Comprehension variables, innermost last.
    locals: Vec<(String, Value)>,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, CelError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.resolve(name),
            Expr::Select {
                operand,
                field,
                test_only,
            } => {
                let operand = self.eval(operand)?;
                select(&operand, field, *test_only)
            }
            Expr::Index { operand, index } => {
                let operand = self.eval(operand)?;
                let index = self.eval(index)?;
                index_value(&operand, &index)
            }
            Expr::Call {
                function,
                target,
                args,
            } => {
                let target = target.as_deref().map(|t| self.eval(t)).transpose()?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                match target {
                    Some(target) if extensions::handles(function) => extensions::call_member(
                        function,
                        &target,
                        &args,
                        self.activation.secrets(),
                    ),
                    Some(target) => functions::call_member(function, &target, &args),
                    None => functions::call_global(function, &args),
                }
            }
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::list),
            Expr::Map(entries) => {
                let mut map = ValueMap::new();
                for (key_expr, value_expr) in entries {
                    let key = match self.eval(key_expr)? {
                        Value::String(s) => s,
                        other => {
                            return Err(eval_error(format!(
                                "unsupported map key type {}",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.eval(value_expr)?;
                    if map.insert(key.clone(), value).is_some() {
                        return Err(eval_error(format!("duplicate map key '{key}'")));
                    }
                }
                Ok(Value::map(map))
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                unary(*op, &operand)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs)
            }
            Expr::And(lhs, rhs) => self.logical(lhs, rhs, false),
            Expr::Or(lhs, rhs) => self.logical(lhs, rhs, true),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.eval(condition)? {
                Value::Bool(true) => self.eval(then),
                Value::Bool(false) => self.eval(otherwise),
                other => Err(no_overload("_?_:_", None, std::slice::from_ref(&other))),
            },
            Expr::Comprehension {
                kind,
                range,
                variable,
                predicate,
                transform,
            } => {
                let range = self.eval(range)?;
                self.comprehension(
                    *kind,
                    &range,
                    variable,
                    predicate.as_deref(),
                    transform.as_deref(),
                )
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<Value, CelError> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        self.activation
            .variable(name)
            .cloned()
            .ok_or_else(|| eval_error(format!("undeclared reference to '{name}'")))
    }

    /// `&&` when `short_circuit` is false, `||` when true.
    ///
    /// An error on one side is absorbed when the other side alone decides the
    /// result.
    fn logical(&mut self, lhs: &Expr, rhs: &Expr, short_circuit: bool) -> Result<Value, CelError> {
        let op = if short_circuit { "_||_" } else { "_&&_" };
        let as_bool = |result: Result<Value, CelError>| -> Result<bool, CelError> {
            match result? {
                Value::Bool(b) => Ok(b),
                other => Err(no_overload(op, None, std::slice::from_ref(&other))),
            }
        };

        let left = as_bool(self.eval(lhs));
        if matches!(left, Ok(b) if b == short_circuit) {
            return Ok(Value::Bool(short_circuit));
        }
        let right = as_bool(self.eval(rhs));
        match (left, right) {
            (_, Ok(b)) if b == short_circuit => Ok(Value::Bool(short_circuit)),
            (Err(l), Err(r)) => Err(pending_first(l, r)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            _ => Ok(Value::Bool(!short_circuit)),
        }
    }

    fn with_local(&mut self, name: &str, value: Value, expr: &Expr) -> Result<Value, CelError> {
        self.locals.push((name.to_string(), value));
        let result = self.eval(expr);
        self.locals.pop();
        result
    }

    fn predicate(
        &mut self,
        name: &str,
        value: Value,
        expr: &Expr,
        macro_name: &str,
    ) -> Result<bool, CelError> {
        match self.with_local(name, value, expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(eval_error(format!(
                "{macro_name}() predicate returned {}, not bool",
                other.type_name()
            ))),
        }
    }

    fn comprehension(
        &mut self,
        kind: MacroKind,
        range: &Value,
        variable: &str,
        predicate: Option<&Expr>,
        transform: Option<&Expr>,
    ) -> Result<Value, CelError> {
        let elements: Vec<Value> = match range {
            Value::List(items) => items.iter().cloned().collect(),
            Value::Map(entries) => entries.keys().map(|k| Value::String(k.clone())).collect(),
            other => {
                return Err(eval_error(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        };

        match (kind, predicate, transform) {
            (MacroKind::All, Some(p), _) | (MacroKind::Exists, Some(p), _) => {
                // The deciding value wins over errors seen on other elements.
                let decisive = kind == MacroKind::Exists;
                let name = if decisive { "exists" } else { "all" };
                let mut deferred = None;
                for element in elements {
                    match self.predicate(variable, element, p, name) {
                        Ok(b) if b == decisive => return Ok(Value::Bool(decisive)),
                        Ok(_) => {}
                        Err(e) => {
                            deferred = Some(match deferred.take() {
                                Some(seen) => pending_first(seen, e),
                                None => e,
                            });
                        }
                    }
                }
                match deferred {
                    Some(e) => Err(e),
                    None => Ok(Value::Bool(!decisive)),
                }
            }
            (MacroKind::ExistsOne, Some(p), _) => {
                let mut count = 0usize;
                for element in elements {
                    if self.predicate(variable, element, p, "exists_one")? {
                        count += 1;
                    }
                }
                Ok(Value::Bool(count == 1))
            }
            (MacroKind::Filter, Some(p), _) => {
                let mut kept = Vec::new();
                for element in elements {
                    if self.predicate(variable, element.clone(), p, "filter")? {
                        kept.push(element);
                    }
                }
                Ok(Value::list(kept))
            }
            (MacroKind::Map, filter, Some(t)) => {
                let mut mapped = Vec::new();
                for element in elements {
                    if let Some(p) = filter {
                        if !self.predicate(variable, element.clone(), p, "map")? {
                            continue;
                        }
                    }
                    mapped.push(self.with_local(variable, element, t)?);
                }
                Ok(Value::list(mapped))
            }
            _ => Err(eval_error("malformed comprehension")),
        }
    }
}

/// Of two errors, keep one that asks for a secret so that the caller can bind
/// it and evaluate again.
fn pending_first(first: CelError, second: CelError) -> CelError {
    if !first.is_unresolved_secret() && second.is_unresolved_secret() {
        second
    } else {
        first
    }
}

fn select(operand: &Value, field: &str, test_only: bool) -> Result<Value, CelError> {
    match operand {
        Value::Map(entries) if test_only => Ok(Value::Bool(entries.contains_key(field))),
        Value::Map(entries) => entries
            .get(field)
            .cloned()
            .ok_or_else(|| eval_error(format!("no such key: {field}"))),
        other => Err(eval_error(format!(
            "type {} does not support field selection",
            other.type_name()
        ))),
    }
}

fn list_index(index: &Value) -> Option<i64> {
    match index {
        Value::Int(i) => Some(*i),
        Value::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
        _ => None,
    }
}

fn index_value(operand: &Value, index: &Value) -> Result<Value, CelError> {
    match (operand, index) {
        (Value::List(items), _) => {
            let i = list_index(index)
                .ok_or_else(|| no_overload("_[_]", Some(operand), std::slice::from_ref(index)))?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| eval_error(format!("index out of range: {i}")))
        }
        (Value::Map(entries), Value::String(key)) => entries
            .get(key)
            .cloned()
            .ok_or_else(|| eval_error(format!("no such key: {key}"))),
        (Value::Map(_), other) => Err(eval_error(format!("no such key: {other}"))),
        _ => Err(no_overload("_[_]", Some(operand), std::slice::from_ref(index))),
    }
}

fn unary(op: UnaryOp, operand: &Value) -> Result<Value, CelError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| eval_error("integer overflow")),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Not, other) => Err(no_overload("!_", None, std::slice::from_ref(other))),
        (UnaryOp::Neg, other) => Err(no_overload("-_", None, std::slice::from_ref(other))),
    }
}

fn binary_overload(op: BinaryOp, lhs: &Value, rhs: &Value) -> CelError {
    eval_error(format!(
        "no such overload: {} {} {}",
        lhs.type_name(),
        op.symbol(),
        rhs.type_name()
    ))
}

fn overflow() -> CelError {
    eval_error("integer overflow")
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, CelError> {
    use Value::{Bytes, Double, Int, List, String as Str};

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => return Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = lhs
                .compare(rhs)
                .ok_or_else(|| binary_overload(op, lhs, rhs))?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        BinaryOp::In => {
            return match rhs {
                List(items) => Ok(Value::Bool(items.iter().any(|item| item == lhs))),
                Value::Map(entries) => Ok(Value::Bool(
                    lhs.as_str().is_some_and(|key| entries.contains_key(key)),
                )),
                _ => Err(binary_overload(op, lhs, rhs)),
            };
        }
        _ => {}
    }

    match (op, lhs, rhs) {
        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Add, Double(a), Double(b)) => Ok(Double(a + b)),
        (BinaryOp::Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
        (BinaryOp::Add, Bytes(a), Bytes(b)) => Ok(Bytes([a.as_slice(), b.as_slice()].concat())),
        (BinaryOp::Add, List(a), List(b)) => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Sub, Double(a), Double(b)) => Ok(Double(a - b)),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Mul, Double(a), Double(b)) => Ok(Double(a * b)),
        (BinaryOp::Div, Int(_), Int(0)) => Err(eval_error("division by zero")),
        (BinaryOp::Div, Int(a), Int(b)) => a.checked_div(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Div, Double(a), Double(b)) => Ok(Double(a / b)),
        (BinaryOp::Rem, Int(_), Int(0)) => Err(eval_error("modulus by zero")),
        (BinaryOp::Rem, Int(a), Int(b)) => a.checked_rem(*b).map(Int).ok_or_else(overflow),
        _ => Err(binary_overload(op, lhs, rhs)),
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
