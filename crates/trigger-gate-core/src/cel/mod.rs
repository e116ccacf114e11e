//! # CEL Expression Engine
//!
//! A Common Expression Language evaluator covering the subset used by webhook
//! filters and overlays, together with webhook specific extension functions.
//!
//! Expressions are compiled once into a [`Program`] (parse plus declaration
//! checks) and evaluated against an [`Activation`] holding the four variables
//! every expression can see:
//!
//! | Variable     | Content                                          |
//! |--------------|--------------------------------------------------|
//! | `body`       | parsed JSON body, `{}` when the body is empty     |
//! | `header`     | request headers, a map of lists of strings        |
//! | `extensions` | extensions written by earlier interceptors        |
//! | `requestURL` | URL of the incoming event                         |
//!
//! ## Usage
//!
//! ```rust
//! use trigger_gate_core::cel::{parse_body, Activation, Program, Value};
//! use std::collections::HashMap;
//!
//! let program = Program::compile("body.ref.truncate(7)").unwrap();
//! let body = parse_body(r#"{"ref": "ec26c3e57ca3a959ca5aad62de7213c562f8c821"}"#).unwrap();
//! let activation = Activation::new(body, &HashMap::new(), &serde_json::Map::new(), "");
//!
//! assert_eq!(program.evaluate(&activation).unwrap(), Value::from("ec26c3e"));
//! ```

use crate::{headers::HeaderMap, secrets::SecretResolver};

mod checker;
mod eval;
mod extensions;
mod functions;
mod lexer;
mod parser;
pub mod value;

pub use extensions::{SecretBindings, SecretLookup};
pub use value::{Value, ValueMap};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CelError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("undeclared reference to '{name}'")]
    UndeclaredReference { name: String },

    #[error("{message}")]
    Check { message: String },

    #[error("evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("conversion failed: {message}")]
    Conversion { message: String },

    /// `compareSecret` needs a secret that is not bound in the activation.
    #[error("compareSecret: secret {} was not resolved", .lookup.secret_name)]
    UnresolvedSecret { lookup: SecretLookup },
}

impl CelError {
    pub(crate) fn is_unresolved_secret(&self) -> bool {
        matches!(self, Self::UnresolvedSecret { .. })
    }
}

/// Upper bound on secrets resolved on demand during one evaluation.
const MAX_ON_DEMAND_SECRETS: usize = 16;

// ============================================================================
// Program
// ============================================================================

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    expr: parser::Expr,
    secret_lookups: Vec<SecretLookup>,
}

impl Program {
    /// Parse and check `source`.
    ///
    /// # Errors
    /// - `CelError::Syntax` - The source does not parse
    /// - `CelError::UndeclaredReference` - An unknown variable is referenced
    /// - `CelError::Check` - An unknown function or wrong argument count
    pub fn compile(source: &str) -> Result<Self, CelError> {
        let expr = parser::parse(source)?;
        let secret_lookups = checker::check(&expr)?;
        Ok(Self {
            source: source.to_string(),
            expr,
            secret_lookups,
        })
    }

    /// Source text of the expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Secrets the expression compares against with literal arguments.
    ///
    /// Resolving these into [`SecretBindings`] up front saves a re-evaluation
    /// per secret in [`Program::evaluate_resolving`].
    pub fn secret_lookups(&self) -> &[SecretLookup] {
        &self.secret_lookups
    }

    /// Evaluate the program.
    ///
    /// # Errors
    ///
    /// Returns `CelError::Evaluation` for runtime failures such as a missing
    /// map key, a failed conversion or a call with mismatched argument types.
    pub fn evaluate(&self, activation: &Activation) -> Result<Value, CelError> {
        eval::evaluate(&self.expr, activation)
    }

    /// Evaluate the program, resolving secrets through `resolver` as
    /// `compareSecret` calls with computed arguments ask for them.
    ///
    /// Evaluation has no side effects, so it is repeated after each secret
    /// that turns out to be missing from the activation is bound.
    ///
    /// # Errors
    ///
    /// As [`Program::evaluate`]. A failed secret resolution surfaces as a
    /// `CelError::Evaluation` from the `compareSecret` call that needed it.
    pub async fn evaluate_resolving(
        &self,
        activation: &mut Activation,
        resolver: &SecretResolver,
        trigger_namespace: Option<&str>,
    ) -> Result<Value, CelError> {
        for _ in 0..MAX_ON_DEMAND_SECRETS {
            match self.evaluate(activation) {
                Err(CelError::UnresolvedSecret { lookup }) => {
                    let result = resolver.resolve(&lookup.secret_ref(), trigger_namespace).await;
                    activation.secrets.insert(lookup, result);
                }
                other => return other,
            }
        }
        match self.evaluate(activation) {
            Err(CelError::UnresolvedSecret { .. }) => Err(CelError::Evaluation {
                message: format!(
                    "compareSecret: more than {MAX_ON_DEMAND_SECRETS} secrets referenced"
                ),
            }),
            other => other,
        }
    }
}

/// Compile and evaluate `source` in one step.
///
/// # Errors
///
/// See [`Program::compile`] and [`Program::evaluate`].
pub fn evaluate(source: &str, activation: &Activation) -> Result<Value, CelError> {
    Program::compile(source)?.evaluate(activation)
}

// ============================================================================
// Activation
// ============================================================================

/// Variable bindings for one evaluation.
#[derive(Debug, Clone)]
pub struct Activation {
    body: Value,
    header: Value,
    extensions: Value,
    request_url: Value,
    secrets: SecretBindings,
}

impl Activation {
    /// Build an activation from request parts.
    pub fn new(
        body: Value,
        header: &HeaderMap,
        extensions: &serde_json::Map<String, serde_json::Value>,
        request_url: &str,
    ) -> Self {
        let header = header
            .iter()
            .map(|(name, values)| {
                let values = values.iter().map(|v| Value::String(v.clone())).collect();
                (name.clone(), Value::list(values))
            })
            .collect();
        let extensions = extensions
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();

        Self {
            body,
            header: Value::map(header),
            extensions: Value::map(extensions),
            request_url: Value::string(request_url),
            secrets: SecretBindings::default(),
        }
    }

    /// Attach secrets resolved for `compareSecret`.
    pub fn with_secrets(mut self, secrets: SecretBindings) -> Self {
        self.secrets = secrets;
        self
    }

    pub(crate) fn variable(&self, name: &str) -> Option<&Value> {
        match name {
            "body" => Some(&self.body),
            "header" => Some(&self.header),
            "extensions" => Some(&self.extensions),
            "requestURL" => Some(&self.request_url),
            _ => None,
        }
    }

    pub(crate) fn secrets(&self) -> &SecretBindings {
        &self.secrets
    }
}

/// Parse a request body for use as the `body` variable.
///
/// An empty or whitespace-only body becomes an empty map.
///
/// # Errors
///
/// Returns `CelError::Conversion` when the body is not valid JSON.
pub fn parse_body(body: &str) -> Result<Value, CelError> {
    if body.trim().is_empty() {
        return Ok(Value::empty_map());
    }
    serde_json::from_str::<serde_json::Value>(body)
        .map(|json| Value::from_json(&json))
        .map_err(|e| CelError::Conversion {
            message: format!("request body is not valid JSON: {e}"),
        })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
