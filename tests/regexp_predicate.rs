use casefile::regexp::{Matcher, display_text, register, regexp};
use rusqlite::Connection;
use rusqlite::types::ValueRef;

#[test]
fn wrapped_patterns_search_without_case() {
    assert!(regexp(".*jane.*", Some("Jane Doe")));
    assert!(regexp(".*DOE.*", Some("Jane Doe")));
    assert!(!regexp(".*smith.*", Some("Jane Doe")));
}

#[test]
fn quoted_patterns_match_the_whole_value() {
    assert!(regexp(".*'Jane'.*", Some("Jane")));
    assert!(!regexp(".*'Jane'.*", Some("Jane Doe")));
    assert!(regexp("'Jane'", Some("Jane")));
    assert!(!regexp("'Jane'", Some("Jane Doe")));
    assert!(regexp("'Case \\d+'", Some("Case 7")));
    // full matching stays case-sensitive
    assert!(!regexp(".*'jane'.*", Some("Jane")));
}

#[test]
fn plain_patterns_search_with_case() {
    assert!(regexp("Jan", Some("Jane")));
    assert!(!regexp("jan", Some("Jane")));
    assert!(regexp("^J.*e$", Some("Jane")));
}

#[test]
fn null_and_invalid_never_match() {
    assert!(!regexp(".*Jane.*", None));
    assert!(!regexp(".*([.*", Some("([")));
    assert!(matches!(Matcher::compile("(["), Matcher::Invalid));
}

#[test]
fn degenerate_wrappers() {
    // ".*" alone strips to the empty pattern, which matches anything
    assert!(regexp(".*", Some("whatever")));
    assert!(regexp(".*.*", Some("")));
    assert!(regexp("'", Some("")));
}

#[test]
fn values_are_matched_as_display_text() {
    assert_eq!(display_text(ValueRef::Null), None);
    assert_eq!(display_text(ValueRef::Integer(42)).as_deref(), Some("42"));
    assert_eq!(display_text(ValueRef::Real(2.0)).as_deref(), Some("2.0"));
    assert_eq!(display_text(ValueRef::Real(2.5)).as_deref(), Some("2.5"));
    assert_eq!(display_text(ValueRef::Text(b"mul")).as_deref(), Some("mul"));
}

#[test]
fn registered_sql_function() {
    let conn = Connection::open_in_memory().unwrap();
    register(&conn).unwrap();
    let eval = |sql: &str| -> bool { conn.query_row(sql, [], |r| r.get(0)).unwrap() };
    assert!(eval("SELECT 'Jane Doe' REGEXP '.*doe.*'"));
    assert!(!eval("SELECT 'Jane Doe' REGEXP 'doe'"));
    assert!(eval("SELECT 5 REGEXP '''5'''"));
    assert!(!eval("SELECT NULL REGEXP 'x'"));
    assert!(!eval("SELECT 'x' REGEXP '(['"));
    let hits: i64 = conn
        .query_row(
            "SELECT count(*) FROM (SELECT 'Anna' AS v UNION ALL SELECT 'Jane' UNION ALL SELECT 'Janssen') WHERE v REGEXP ?",
            [".*jan.*"],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(hits, 2);
}
