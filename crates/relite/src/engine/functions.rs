//! Built-in scalar functions (§4.4.9), including the minimal JSON dot-path
//! dialect resolved by Open Question 6: `$.field` and `$.field.nested`
//! against a TEXT-encoded JSON column, backed by `serde_json::Value`
//! rather than a hand-rolled parser.

use relite_sats::Value;

use crate::error::{EngineError, EngineResult, ExecutionError};

pub fn call(name: &str, args: &[Value]) -> EngineResult<Value> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "LENGTH" | "LEN" => Ok(Value::Int(arg_text(args, 0)?.chars().count() as i64)),
        "UPPER" => Ok(Value::Text(arg_text(args, 0)?.to_uppercase())),
        "LOWER" => Ok(Value::Text(arg_text(args, 0)?.to_lowercase())),
        "TRIM" => Ok(Value::Text(arg_text(args, 0)?.trim_matches(is_sql_whitespace).to_owned())),
        "LTRIM" => Ok(Value::Text(arg_text(args, 0)?.trim_start_matches(is_sql_whitespace).to_owned())),
        "RTRIM" => Ok(Value::Text(arg_text(args, 0)?.trim_end_matches(is_sql_whitespace).to_owned())),
        "SUBSTR" | "SUBSTRING" => substr(args),
        "CONCAT" => Ok(Value::Text(args.iter().filter(|v| !v.is_null()).map(Value::coerce_text).collect())),
        "ABS" => Ok(numeric_unary(args, f64::abs)?),
        "ROUND" => round(args),
        "FLOOR" => Ok(numeric_unary(args, f64::floor)?),
        "CEIL" | "CEILING" => Ok(numeric_unary(args, f64::ceil)?),
        "COALESCE" | "IFNULL" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        "NULLIF" => {
            let (a, b) = (arg(args, 0)?, arg(args, 1)?);
            Ok(if relite_sats::scalar_cmp(a, b) == Some(std::cmp::Ordering::Equal) { Value::Null } else { a.clone() })
        }
        "REPLACE" => {
            let (s, old, new) = (arg_text(args, 0)?, arg_text(args, 1)?, arg_text(args, 2)?);
            Ok(Value::Text(if old.is_empty() { s } else { s.replace(&old, &new) }))
        }
        "INSTR" => {
            let (haystack, needle) = (arg_text(args, 0)?, arg_text(args, 1)?);
            Ok(Value::Int(haystack.find(&needle).map(|p| p as i64 + 1).unwrap_or(0)))
        }
        "PRINTF" => printf(args),
        "CAST" => cast(args),
        "JSON_EXTRACT" => {
            let path = parse_dot_path(&arg_text(args, 1)?);
            json_path(arg(args, 0)?, &path, false)
        }
        "JSON_SET" => json_set(args),
        "JSON_VALID" => Ok(Value::Bool(serde_json::from_str::<serde_json::Value>(&arg_text(args, 0)?).is_ok())),
        "JSON_ARRAY_LENGTH" => {
            let json: serde_json::Value =
                serde_json::from_str(&arg_text(args, 0)?).unwrap_or(serde_json::Value::Null);
            Ok(Value::Int(json.as_array().map(|a| a.len() as i64).unwrap_or(0)))
        }
        "JSON_TYPE" => {
            let json: serde_json::Value =
                serde_json::from_str(&arg_text(args, 0)?).unwrap_or(serde_json::Value::Null);
            Ok(Value::Text(json_type_name(&json).to_owned()))
        }
        other => Err(EngineError::Execution(ExecutionError::UnknownFunction(other.to_owned()))),
    }
}

fn arg<'a>(args: &'a [Value], i: usize) -> EngineResult<&'a Value> {
    args.get(i).ok_or_else(|| EngineError::Execution(ExecutionError::TypeMismatch(format!("missing argument {i}"))))
}

fn arg_text(args: &[Value], i: usize) -> EngineResult<String> {
    Ok(arg(args, i)?.coerce_text())
}

fn is_sql_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn numeric_unary(args: &[Value], f: impl Fn(f64) -> f64) -> EngineResult<Value> {
    let v = arg(args, 0)?;
    match v.as_numeric() {
        Some(n) => Ok(if matches!(v, Value::Int(_)) { Value::Int(f(n) as i64) } else { Value::Float(f(n)) }),
        None => Ok(Value::Null),
    }
}

fn round(args: &[Value]) -> EngineResult<Value> {
    let n = match arg(args, 0)?.as_numeric() {
        Some(n) => n,
        None => return Ok(Value::Null),
    };
    let digits = args.get(1).and_then(Value::as_int).unwrap_or(0);
    let factor = 10f64.powi(digits as i32);
    Ok(Value::Float((n * factor).round() / factor))
}

fn substr(args: &[Value]) -> EngineResult<Value> {
    let s = arg_text(args, 0)?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let mut start = args.get(1).and_then(Value::as_int).unwrap_or(0);
    if start < 0 {
        start = (len + start).max(0);
    }
    let start = start.min(len) as usize;
    let take = match args.get(2).and_then(Value::as_int) {
        Some(n) => n.max(0) as usize,
        None => chars.len().saturating_sub(start),
    };
    let end = (start + take).min(chars.len());
    Ok(Value::Text(chars[start..end].iter().collect()))
}

fn printf(args: &[Value]) -> EngineResult<Value> {
    let fmt = arg_text(args, 0)?;
    let mut out = String::new();
    let mut rest = args[1..].iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push_str(&rest.next().map(Value::coerce_text).unwrap_or_default()),
            Some('d') | Some('i') => {
                let n = rest.next().and_then(Value::as_int).unwrap_or(0);
                out.push_str(&n.to_string());
            }
            Some('f') => {
                let n = rest.next().and_then(Value::as_numeric).unwrap_or(0.0);
                out.push_str(&format!("{n}"));
            }
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(Value::Text(out))
}

fn cast(args: &[Value]) -> EngineResult<Value> {
    let v = arg(args, 0)?;
    let ty = arg_text(args, 1)?.to_ascii_uppercase();
    Ok(match ty.as_str() {
        "INTEGER" | "INT" => v.as_int().map(Value::Int).unwrap_or_else(|| v.clone()),
        "REAL" | "FLOAT" => v.as_numeric().map(Value::Float).unwrap_or_else(|| v.clone()),
        "TEXT" => Value::Text(v.coerce_text()),
        "BOOLEAN" | "BOOL" => Value::Bool(v.is_truthy()),
        _ => v.clone(),
    })
}

/// Parses a `$.field.nested` path into its field segments. Only the plain
/// dot-path dialect is supported (no array indices, no wildcard).
pub fn parse_dot_path(path: &str) -> Vec<String> {
    path.trim_start_matches('$').trim_start_matches('.').split('.').filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

pub fn json_path(v: &Value, path: &[String], as_text: bool) -> EngineResult<Value> {
    let text = v.coerce_text();
    let mut current: serde_json::Value = match serde_json::from_str(&text) {
        Ok(json) => json,
        Err(_) => return Ok(Value::Null),
    };
    for segment in path {
        current = match current.get(segment) {
            Some(next) => next.clone(),
            None => return Ok(Value::Null),
        };
    }
    Ok(json_to_value(&current, as_text))
}

fn json_set(args: &[Value]) -> EngineResult<Value> {
    let base = arg_text(args, 0)?;
    let path = parse_dot_path(&arg_text(args, 1)?);
    let new_value = arg(args, 2)?;
    let mut json: serde_json::Value = serde_json::from_str(&base).unwrap_or(serde_json::Value::Object(Default::default()));
    set_path(&mut json, &path, value_to_json(new_value));
    Ok(Value::Text(json.to_string()))
}

fn set_path(json: &mut serde_json::Value, path: &[String], new_value: serde_json::Value) {
    let Some((head, rest)) = path.split_first() else { return };
    if !json.is_object() {
        *json = serde_json::Value::Object(Default::default());
    }
    let obj = json.as_object_mut().expect("coerced above");
    if rest.is_empty() {
        obj.insert(head.clone(), new_value);
    } else {
        let entry = obj.entry(head.clone()).or_insert(serde_json::Value::Object(Default::default()));
        set_path(entry, rest, new_value);
    }
}

fn json_to_value(json: &serde_json::Value, as_text: bool) -> Value {
    if as_text {
        return Value::Text(match json {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        serde_json::Value::Number(_) => "real",
        serde_json::Value::String(_) => "text",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_handles_negative_start() {
        let v = substr(&[Value::Text("hello".into()), Value::Int(-3)]).unwrap();
        assert_eq!(v, Value::Text("llo".into()));
    }

    #[test]
    fn json_extract_follows_dot_path() {
        let doc = Value::Text(r#"{"a":{"b":42}}"#.into());
        let v = json_path(&doc, &parse_dot_path("$.a.b"), false).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn json_set_creates_missing_objects() {
        let result = json_set(&[Value::Text("{}".into()), Value::Text("$.a.b".into()), Value::Int(1)]).unwrap();
        assert_eq!(result, Value::Text(r#"{"a":{"b":1}}"#.into()));
    }

    #[test]
    fn unknown_function_is_an_error() {
        assert!(call("NOPE", &[]).is_err());
    }
}
