//! String free builtins: `startsWith, endsWith, upper, lower, trim,
//! replace, substring, split, join, match, matches`.

use crate::error::{ErrorKind, RunError};
use crate::value::Value;

fn want_string<'a>(v: &'a Value, who: &str) -> Result<&'a str, RunError> {
    match v {
        Value::String(s) => Ok(s),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("{who}() expects a string argument, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_starts_with(s: &Value, prefix: &Value) -> Result<Value, RunError> {
    Ok(Value::Bool(want_string(s, "startsWith")?.starts_with(want_string(prefix, "startsWith")?)))
}

pub fn builtin_ends_with(s: &Value, suffix: &Value) -> Result<Value, RunError> {
    Ok(Value::Bool(want_string(s, "endsWith")?.ends_with(want_string(suffix, "endsWith")?)))
}

pub fn builtin_upper(s: &Value) -> Result<Value, RunError> {
    Ok(Value::string(want_string(s, "upper")?.to_uppercase()))
}

pub fn builtin_lower(s: &Value) -> Result<Value, RunError> {
    Ok(Value::string(want_string(s, "lower")?.to_lowercase()))
}

pub fn builtin_trim(s: &Value) -> Result<Value, RunError> {
    Ok(Value::string(want_string(s, "trim")?.trim()))
}

pub fn builtin_replace(s: &Value, from: &Value, to: &Value) -> Result<Value, RunError> {
    let s = want_string(s, "replace")?;
    let from = want_string(from, "replace")?;
    let to = want_string(to, "replace")?;
    Ok(Value::string(s.replace(from, to)))
}

/// `substring(s, start, end)`: clamps out-of-range indices, then returns
/// an explicit `IndexOutOfRange` error if `start > end` after clamping
/// (Open Question 3).
pub fn builtin_substring(s: &Value, start: &Value, end: &Value) -> Result<Value, RunError> {
    let s = want_string(s, "substring")?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let raw_start = want_int(start, "substring")?;
    let raw_end = want_int(end, "substring")?;
    let clamped_start = raw_start.clamp(0, len) as usize;
    let clamped_end = raw_end.clamp(0, len) as usize;
    if clamped_start > clamped_end {
        return Err(RunError::new(
            ErrorKind::IndexOutOfRange,
            None,
            format!("substring(): start {raw_start} > end {raw_end} after clamping to [0, {len}]"),
        ));
    }
    let substring: String = chars[clamped_start..clamped_end].iter().collect();
    Ok(Value::string(substring))
}

fn want_int(v: &Value, who: &str) -> Result<i64, RunError> {
    match v {
        Value::Int(i) => Ok(*i),
        _ => Err(RunError::new(
            ErrorKind::TypeMismatch,
            None,
            format!("{who}() expects an integer argument, got '{}'", v.type_name()),
        )),
    }
}

pub fn builtin_split(s: &Value, sep: &Value) -> Result<Value, RunError> {
    let s = want_string(s, "split")?;
    let sep = want_string(sep, "split")?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::string).collect()
    };
    Ok(Value::slice(parts))
}

pub fn builtin_join(v: &Value, sep: &Value) -> Result<Value, RunError> {
    let sep = want_string(sep, "join")?;
    let elements = match v {
        Value::Slice(elements, _) => elements,
        _ => {
            return Err(RunError::new(
                ErrorKind::TypeMismatch,
                None,
                format!("join() expects a slice, got '{}'", v.type_name()),
            ))
        }
    };
    let parts: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
    Ok(Value::string(parts.join(sep)))
}

/// A deliberately small pattern language rather than a full regex engine:
/// `*` matches any run of characters, every other character matches
/// itself literally. Sufficient for predicate-style glob matching without
/// pulling in a regex dependency nothing else in this crate needs.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            Some(c) => t.first().is_some_and(|tc| tc == c) && helper(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    helper(&p, &t)
}

pub fn builtin_matches(s: &Value, pattern: &Value) -> Result<Value, RunError> {
    let s = want_string(s, "matches")?;
    let pattern = want_string(pattern, "matches")?;
    Ok(Value::Bool(glob_match(pattern, s)))
}

/// `match(s, pattern)` returns the whole string when it matches the
/// pattern, `Nil` otherwise (there being no capture groups in the glob
/// pattern language above to extract a narrower match from).
pub fn builtin_match(s: &Value, pattern: &Value) -> Result<Value, RunError> {
    let text = want_string(s, "match")?;
    let pattern_str = want_string(pattern, "match")?;
    if glob_match(pattern_str, text) {
        Ok(Value::string(text))
    } else {
        Ok(Value::Nil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_clamps_then_rejects_inverted_range() {
        let s = Value::string("hello");
        assert_eq!(builtin_substring(&s, &Value::Int(-5), &Value::Int(3)).unwrap(), Value::string("hel"));
        assert_eq!(builtin_substring(&s, &Value::Int(0), &Value::Int(99)).unwrap(), Value::string("hello"));
        assert!(builtin_substring(&s, &Value::Int(4), &Value::Int(1)).is_err());
    }

    #[test]
    fn glob_match_star() {
        assert!(glob_match("foo*", "foobar"));
        assert!(!glob_match("foo*baz", "foobar"));
    }
}
