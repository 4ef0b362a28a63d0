//! The `REGEXP` predicate registered on every connection.
//!
//! `value REGEXP pattern` calls `regexp(pattern, value)`. Patterns produced by a
//! vague search arrive wrapped in `.*` on both sides; the wrapper is stripped and the rest
//! searched case-insensitively, or fully matched when it is single-quoted.
//! Unwrapped patterns fully match when quoted and otherwise search
//! case-sensitively. NULL and anything that fails to evaluate never match.

use regex::{Regex, RegexBuilder};
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;

use crate::error::Result;

#[derive(Debug, Clone)]
pub enum Matcher {
    Full(Regex),
    Search(Regex),
    Invalid,
}

fn strip_quotes(pattern: &str) -> Option<&str> {
    if pattern.starts_with('\'') && pattern.ends_with('\'') {
        let rest = &pattern[1..];
        Some(rest.strip_suffix('\'').unwrap_or(rest))
    } else {
        None
    }
}

impl Matcher {
    pub fn compile(pattern: &str) -> Self {
        let compiled = if pattern.starts_with(".*") && pattern.ends_with(".*") {
            let rest = &pattern[2..];
            let inner = rest.strip_suffix(".*").unwrap_or(rest);
            match strip_quotes(inner) {
                Some(quoted) => full(quoted),
                None => RegexBuilder::new(inner)
                    .case_insensitive(true)
                    .build()
                    .map(Matcher::Search),
            }
        } else {
            match strip_quotes(pattern) {
                Some(quoted) => full(quoted),
                None => Regex::new(pattern).map(Matcher::Search),
            }
        };
        compiled.unwrap_or(Matcher::Invalid)
    }
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Matcher::Full(re) | Matcher::Search(re) => re.is_match(value),
            Matcher::Invalid => false,
        }
    }
}

fn full(pattern: &str) -> std::result::Result<Matcher, regex::Error> {
    Regex::new(&format!(r"\A(?:{pattern})\z")).map(Matcher::Full)
}

/// Evaluates the predicate for one value; `None` stands for SQL NULL.
pub fn regexp(pattern: &str, value: Option<&str>) -> bool {
    match value {
        Some(value) => Matcher::compile(pattern).is_match(value),
        None => false,
    }
}

/// The text a stored value is matched against.
pub fn display_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) if r.is_finite() && r.fract() == 0.0 => Some(format!("{r:.1}")),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

pub fn register(connection: &Connection) -> Result<()> {
    connection.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let matcher = match ctx.get_or_create_aux(0, |pattern| pattern.as_str().map(Matcher::compile)) {
                Ok(matcher) => matcher,
                Err(_) => return Ok(false),
            };
            Ok(display_text(ctx.get_raw(1)).is_some_and(|value| matcher.is_match(&value)))
        },
    )?;
    Ok(())
}
