//! The fixed builtin function table available to conditions.

use plang_contracts::{ir::Builtin, value::Value};

/// Apply `function` to already-evaluated arguments.
///
/// Errors are plain messages; the engine wraps them with the policy id.
pub fn call(function: Builtin, args: &[Value]) -> Result<Value, String> {
    if args.len() != function.arity() {
        return Err(format!(
            "{} expects {} argument(s), got {}",
            function.name(),
            function.arity(),
            args.len()
        ));
    }

    match function {
        Builtin::Contains => contains(&args[0], &args[1]).map(Value::Bool),
        Builtin::Len => len(&args[0]).map(|n| Value::Int(n as i64)),
        Builtin::IsEmpty => is_empty(&args[0]).map(Value::Bool),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, String> {
    match (haystack, needle) {
        (Value::Str(h), Value::Str(n)) => Ok(h.contains(n.as_str())),
        (Value::List(items), n) => Ok(items.iter().any(|item| item.loose_eq(n))),
        (Value::Map(entries), Value::Str(key)) => Ok(entries.contains_key(key)),
        (Value::Null, _) => Ok(false),
        (h, n) => Err(format!(
            "contains: cannot search {} for {}",
            h.type_name(),
            n.type_name()
        )),
    }
}

fn len(value: &Value) -> Result<usize, String> {
    match value {
        Value::Null => Ok(0),
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.len()),
        Value::Map(entries) => Ok(entries.len()),
        other => Err(format!("len: unsupported type {}", other.type_name())),
    }
}

fn is_empty(value: &Value) -> Result<bool, String> {
    match value {
        Value::Null => Ok(true),
        Value::Str(s) => Ok(s.is_empty()),
        Value::List(items) => Ok(items.is_empty()),
        Value::Map(entries) => Ok(entries.is_empty()),
        other => Err(format!("is_empty: unsupported type {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn contains_over_strings_lists_and_maps() {
        assert_eq!(call(Builtin::Contains, &[Value::from("hello world"), Value::from("world")]), Ok(Value::Bool(true)));
        assert_eq!(call(Builtin::Contains, &[list(&["a", "b"]), Value::from("c")]), Ok(Value::Bool(false)));
        let map = Value::map([("ssn", Value::from("redacted"))]);
        assert_eq!(call(Builtin::Contains, &[map, Value::from("ssn")]), Ok(Value::Bool(true)));
        assert_eq!(call(Builtin::Contains, &[Value::Null, Value::from("x")]), Ok(Value::Bool(false)));
    }

    #[test]
    fn contains_rejects_scalar_haystack() {
        let err = call(Builtin::Contains, &[Value::Int(4), Value::Int(4)]).unwrap_err();
        assert!(err.contains("cannot search int"));
    }

    #[test]
    fn len_counts_characters_not_bytes() {
        assert_eq!(call(Builtin::Len, &[Value::from("héllo")]), Ok(Value::Int(5)));
        assert_eq!(call(Builtin::Len, &[Value::Null]), Ok(Value::Int(0)));
        assert!(call(Builtin::Len, &[Value::Bool(true)]).is_err());
    }

    #[test]
    fn is_empty_treats_null_as_empty() {
        assert_eq!(call(Builtin::IsEmpty, &[Value::Null]), Ok(Value::Bool(true)));
        assert_eq!(call(Builtin::IsEmpty, &[list(&["x"])]), Ok(Value::Bool(false)));
    }

    #[test]
    fn arity_is_checked() {
        assert!(call(Builtin::Len, &[]).is_err());
    }
}
