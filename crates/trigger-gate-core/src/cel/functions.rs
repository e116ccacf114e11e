//! Standard function library: declarations used by the checker and the
//! implementations of the builtin functions.
//!
//! String positions are counted in Unicode code points, never in bytes.

use super::{value::Value, CelError};
use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine as _,
};
use regex::Regex;

/// Declared shape of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FunctionDecl {
    pub name: &'static str,
    /// Called as `target.name(args)` rather than `name(args)`.
    pub receiver: bool,
    pub min_args: usize,
    pub max_args: usize,
}

const fn global(name: &'static str, min_args: usize, max_args: usize) -> FunctionDecl {
    FunctionDecl {
        name,
        receiver: false,
        min_args,
        max_args,
    }
}

const fn member(name: &'static str, min_args: usize, max_args: usize) -> FunctionDecl {
    FunctionDecl {
        name,
        receiver: true,
        min_args,
        max_args,
    }
}

pub(crate) const DECLARATIONS: &[FunctionDecl] = &[
    // Core
    global("size", 1, 1),
    global("int", 1, 1),
    global("double", 1, 1),
    global("string", 1, 1),
    global("bytes", 1, 1),
    global("dyn", 1, 1),
    global("matches", 2, 2),
    member("size", 0, 0),
    member("matches", 1, 1),
    member("contains", 1, 1),
    member("startsWith", 1, 1),
    member("endsWith", 1, 1),
    // String library
    member("lowerAscii", 0, 0),
    member("upperAscii", 0, 0),
    member("trim", 0, 0),
    member("replace", 2, 3),
    member("substring", 1, 2),
    member("charAt", 1, 1),
    member("indexOf", 1, 2),
    member("lastIndexOf", 1, 2),
    member("join", 0, 1),
    // Encoders
    global("base64.encode", 1, 1),
    global("base64.decode", 1, 1),
    // Webhook extensions
    member("match", 2, 2),
    member("canonical", 1, 1),
    member("truncate", 1, 1),
    member("split", 1, 2),
    member("compareSecret", 2, 3),
    member("decodeb64", 0, 0),
    member("decodeB64", 0, 0),
    member("parseJSON", 0, 0),
    member("parseYAML", 0, 0),
    member("parseURL", 0, 0),
    member("marshalJSON", 0, 0),
    member("translate", 2, 2),
];

/// Find the declaration of `name` called globally or on a receiver.
pub(crate) fn lookup(name: &str, receiver: bool) -> Option<&'static FunctionDecl> {
    DECLARATIONS
        .iter()
        .find(|d| d.name == name && d.receiver == receiver)
}

/// Whether any declaration uses `name`.
pub(crate) fn is_declared(name: &str) -> bool {
    DECLARATIONS.iter().any(|d| d.name == name)
}

pub(crate) fn eval_error(message: impl Into<String>) -> CelError {
    CelError::Evaluation {
        message: message.into(),
    }
}

/// Error for a call whose argument types match no overload.
pub(crate) fn no_overload(name: &str, target: Option<&Value>, args: &[Value]) -> CelError {
    let arg_types = args
        .iter()
        .map(Value::type_name)
        .collect::<Vec<_>>()
        .join(", ");
    let message = match target {
        Some(t) => format!("no such overload: {}.{name}({arg_types})", t.type_name()),
        None => format!("no such overload: {name}({arg_types})"),
    };
    eval_error(message)
}

/// Compile a regular expression, reporting failures as evaluation errors.
pub(crate) fn compile_regex(pattern: &str) -> Result<Regex, CelError> {
    Regex::new(pattern)
        .map_err(|e| eval_error(format!("invalid regular expression '{pattern}': {e}")))
}

// ============================================================================
// Global functions
// ============================================================================

pub(crate) fn call_global(name: &str, args: &[Value]) -> Result<Value, CelError> {
    match (name, args) {
        ("size", [v]) => size(v).ok_or_else(|| no_overload(name, None, args)),
        ("int", [v]) => to_int(v),
        ("double", [v]) => to_double(v),
        ("string", [v]) => to_string(v),
        ("bytes", [Value::String(s)]) => Ok(Value::Bytes(s.as_bytes().to_vec())),
        ("bytes", [Value::Bytes(b)]) => Ok(Value::Bytes(b.clone())),
        ("dyn", [v]) => Ok(v.clone()),
        ("matches", [Value::String(s), Value::String(re)]) => {
            Ok(Value::Bool(compile_regex(re)?.is_match(s)))
        }
        ("base64.encode", [Value::Bytes(b)]) => Ok(Value::String(STANDARD.encode(b))),
        ("base64.encode", [Value::String(s)]) => Ok(Value::String(STANDARD.encode(s))),
        ("base64.decode", [Value::String(s)]) => STANDARD
            .decode(s)
            .or_else(|_| STANDARD_NO_PAD.decode(s))
            .map(Value::Bytes)
            .map_err(|e| eval_error(format!("base64.decode: {e}"))),
        _ => Err(no_overload(name, None, args)),
    }
}

fn size(value: &Value) -> Option<Value> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        _ => return None,
    };
    Some(Value::Int(len as i64))
}

fn to_int(value: &Value) -> Result<Value, CelError> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Double(d) => {
            // The range check is exclusive of 2^63 itself.
            if d.is_finite() && *d > -9.223_372_036_854_776e18 && *d < 9.223_372_036_854_776e18 {
                Ok(Value::Int(d.trunc() as i64))
            } else {
                Err(eval_error(format!("double {d} out of int range")))
            }
        }
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| eval_error(format!("cannot convert string {s:?} to int"))),
        other => Err(no_overload("int", None, std::slice::from_ref(other))),
    }
}

fn to_double(value: &Value) -> Result<Value, CelError> {
    match value {
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| eval_error(format!("cannot convert string {s:?} to double"))),
        other => Err(no_overload("double", None, std::slice::from_ref(other))),
    }
}

fn to_string(value: &Value) -> Result<Value, CelError> {
    match value {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        Value::Double(d) => Ok(Value::String(d.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Bytes(b) => String::from_utf8(b.clone())
            .map(Value::String)
            .map_err(|_| eval_error("bytes are not valid UTF-8")),
        other => Err(no_overload("string", None, std::slice::from_ref(other))),
    }
}

// ============================================================================
// Member functions
// ============================================================================

pub(crate) fn call_member(name: &str, target: &Value, args: &[Value]) -> Result<Value, CelError> {
    if name == "size" && args.is_empty() {
        return size(target).ok_or_else(|| no_overload(name, Some(target), args));
    }
    if name == "join" {
        return join(target, args).ok_or_else(|| no_overload(name, Some(target), args))?;
    }

    let Value::String(s) = target else {
        return Err(no_overload(name, Some(target), args));
    };

    match (name, args) {
        ("contains", [Value::String(sub)]) => Ok(Value::Bool(s.contains(sub.as_str()))),
        ("startsWith", [Value::String(prefix)]) => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
        ("endsWith", [Value::String(suffix)]) => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
        ("matches", [Value::String(re)]) => Ok(Value::Bool(compile_regex(re)?.is_match(s))),
        ("lowerAscii", []) => Ok(Value::String(s.to_ascii_lowercase())),
        ("upperAscii", []) => Ok(Value::String(s.to_ascii_uppercase())),
        ("trim", []) => Ok(Value::String(s.trim().to_string())),
        ("replace", [Value::String(from), Value::String(to)]) => {
            Ok(Value::String(s.replace(from.as_str(), to)))
        }
        ("replace", [Value::String(from), Value::String(to), Value::Int(n)]) => {
            let replaced = match usize::try_from(*n) {
                Ok(n) => s.replacen(from.as_str(), to, n),
                Err(_) => s.replace(from.as_str(), to),
            };
            Ok(Value::String(replaced))
        }
        ("substring", [Value::Int(start)]) => substring(s, *start, None),
        ("substring", [Value::Int(start), Value::Int(end)]) => substring(s, *start, Some(*end)),
        ("charAt", [Value::Int(i)]) => char_at(s, *i),
        ("indexOf", [Value::String(sub)]) => index_of(s, sub, 0),
        ("indexOf", [Value::String(sub), Value::Int(offset)]) => index_of(s, sub, *offset),
        ("lastIndexOf", [Value::String(sub)]) => {
            last_index_of(s, sub, s.chars().count() as i64)
        }
        ("lastIndexOf", [Value::String(sub), Value::Int(offset)]) => {
            last_index_of(s, sub, *offset)
        }
        _ => Err(no_overload(name, Some(target), args)),
    }
}

fn join(target: &Value, args: &[Value]) -> Option<Result<Value, CelError>> {
    let Value::List(items) = target else {
        return None;
    };
    let separator = match args {
        [] => "",
        [Value::String(sep)] => sep.as_str(),
        _ => return None,
    };
    let parts: Result<Vec<&str>, CelError> = items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| {
                    eval_error(format!(
                        "join: list element is {}, not string",
                        item.type_name()
                    ))
                })
        })
        .collect();
    Some(parts.map(|p| Value::String(p.join(separator))))
}

/// Byte offset of the `index`th code point, or `None` when out of range.
/// `index == len` maps to the end of the string.
fn byte_offset(s: &str, index: i64) -> Option<usize> {
    let index = usize::try_from(index).ok()?;
    if index == 0 {
        return Some(0);
    }
    match s.char_indices().nth(index) {
        Some((offset, _)) => Some(offset),
        None if s.chars().count() == index => Some(s.len()),
        None => None,
    }
}

fn substring(s: &str, start: i64, end: Option<i64>) -> Result<Value, CelError> {
    let end = end.unwrap_or(s.chars().count() as i64);
    if start > end {
        return Err(eval_error(format!("substring: start {start} is after end {end}")));
    }
    let (Some(from), Some(to)) = (byte_offset(s, start), byte_offset(s, end)) else {
        return Err(eval_error(format!("substring: index out of range [{start}, {end})")));
    };
    Ok(Value::String(s[from..to].to_string()))
}

fn char_at(s: &str, index: i64) -> Result<Value, CelError> {
    let from = byte_offset(s, index)
        .ok_or_else(|| eval_error(format!("charAt: index {index} out of range")))?;
    Ok(Value::String(
        s[from..].chars().next().map(String::from).unwrap_or_default(),
    ))
}

fn index_of(s: &str, sub: &str, offset: i64) -> Result<Value, CelError> {
    let from = byte_offset(s, offset)
        .ok_or_else(|| eval_error(format!("indexOf: offset {offset} out of range")))?;
    Ok(Value::Int(match s[from..].find(sub) {
        Some(found) => s[..from + found].chars().count() as i64,
        None => -1,
    }))
}

fn last_index_of(s: &str, sub: &str, offset: i64) -> Result<Value, CelError> {
    let upto = byte_offset(s, offset)
        .ok_or_else(|| eval_error(format!("lastIndexOf: offset {offset} out of range")))?;
    // A match may start at `offset` and extend past it.
    let window_end = (upto + sub.len()).min(s.len());
    let window_end = (window_end..=s.len())
        .find(|i| s.is_char_boundary(*i))
        .unwrap_or(s.len());
    Ok(Value::Int(match s[..window_end].rfind(sub) {
        Some(found) if found <= upto => s[..found].chars().count() as i64,
        _ => -1,
    }))
}

#[cfg(test)]
#[path = "functions_tests.rs"]
mod tests;
