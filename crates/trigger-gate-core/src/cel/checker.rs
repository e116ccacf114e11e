//! Compile time checks over a parsed expression.
//!
//! References must name a declared variable or a comprehension variable in
//! scope, and calls must name a declared function with a valid argument
//! count. Types are checked at evaluation time.

use super::{
    extensions::SecretLookup,
    functions::{is_declared, lookup},
    parser::Expr,
    value::Value,
    CelError,
};

/// Variables every expression may reference.
pub(crate) const VARIABLES: &[&str] = &["body", "header", "extensions", "requestURL"];

/// Check `expr` and collect the literal arguments of every `compareSecret` call.
pub(crate) fn check(expr: &Expr) -> Result<Vec<SecretLookup>, CelError> {
    let mut checker = Checker {
        scope: Vec::new(),
        lookups: Vec::new(),
    };
    checker.visit(expr)?;
    Ok(checker.lookups)
}

struct Checker {
    scope: Vec<String>,
    lookups: Vec<SecretLookup>,
}

impl Checker {
    fn visit(&mut self, expr: &Expr) -> Result<(), CelError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::Ident(name) => {
                if VARIABLES.contains(&name.as_str()) || self.scope.iter().any(|v| v == name) {
                    Ok(())
                } else {
                    Err(CelError::UndeclaredReference { name: name.clone() })
                }
            }
            Expr::Select { operand, .. } => self.visit(operand),
            Expr::Index { operand, index } => {
                self.visit(operand)?;
                self.visit(index)
            }
            Expr::Call {
                function,
                target,
                args,
            } => {
                self.check_call(function, target.is_some(), args.len())?;
                if function == "compareSecret" {
                    self.collect_secret_lookup(args);
                }
                if let Some(target) = target {
                    self.visit(target)?;
                }
                args.iter().try_for_each(|arg| self.visit(arg))
            }
            Expr::List(items) => items.iter().try_for_each(|item| self.visit(item)),
            Expr::Map(entries) => entries.iter().try_for_each(|(k, v)| {
                self.visit(k)?;
                self.visit(v)
            }),
            Expr::Unary { operand, .. } => self.visit(operand),
            Expr::Binary { lhs, rhs, .. } | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                self.visit(lhs)?;
                self.visit(rhs)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.visit(condition)?;
                self.visit(then)?;
                self.visit(otherwise)
            }
            Expr::Comprehension {
                range,
                variable,
                predicate,
                transform,
                ..
            } => {
                self.visit(range)?;
                self.scope.push(variable.clone());
                let result = predicate
                    .iter()
                    .chain(transform.iter())
                    .try_for_each(|e| self.visit(e));
                self.scope.pop();
                result
            }
        }
    }

    fn check_call(&self, function: &str, receiver: bool, arg_count: usize) -> Result<(), CelError> {
        let Some(decl) = lookup(function, receiver) else {
            let message = if is_declared(function) {
                let style = if receiver { "as a method" } else { "as a global function" };
                format!("function '{function}' cannot be called {style}")
            } else {
                format!("undeclared function '{function}'")
            };
            return Err(CelError::Check { message });
        };

        if arg_count < decl.min_args || arg_count > decl.max_args {
            let expected = if decl.min_args == decl.max_args {
                decl.min_args.to_string()
            } else {
                format!("{} to {}", decl.min_args, decl.max_args)
            };
            return Err(CelError::Check {
                message: format!(
                    "function '{function}' expects {expected} arguments, got {arg_count}"
                ),
            });
        }
        Ok(())
    }

    fn collect_secret_lookup(&mut self, args: &[Expr]) {
        let literal = |e: &Expr| match e {
            Expr::Literal(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        let found = match args {
            [key, name] => literal(key).zip(literal(name)).map(|(k, n)| (k, n, None)),
            [key, name, namespace] => match (literal(key), literal(name), literal(namespace)) {
                (Some(k), Some(n), Some(ns)) => Some((k, n, Some(ns))),
                _ => None,
            },
            _ => None,
        };
        if let Some((secret_key, secret_name, namespace)) = found {
            let lookup = SecretLookup {
                secret_key,
                secret_name,
                namespace,
            };
            if !self.lookups.contains(&lookup) {
                self.lookups.push(lookup);
            }
        }
    }
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod tests;
