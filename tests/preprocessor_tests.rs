//! Preprocessor behavior over whole statement blocks.

use tracesql_core::SqlSource;
use tracesql_engine::{ParsedStatement, Preprocessor, ReturnSpec, ScalarType, Statement};

fn parse_all(sql: &str) -> Vec<ParsedStatement> {
    Preprocessor::new(SqlSource::from_user(sql))
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn mixed_block_classifies_each_statement() {
    let stmts = parse_all(
        "CREATE TABLE raw(x INTEGER);\n\
         INSERT INTO raw VALUES (1), (2);\n\
         CREATE TRACE FUNCTION double(x INT) RETURNS INT AS SELECT $x * 2;\n\
         SELECT double(x) FROM raw;",
    );
    assert_eq!(stmts.len(), 4);
    assert!(matches!(stmts[0].statement, Statement::Passthrough { .. }));
    assert!(matches!(stmts[1].statement, Statement::Passthrough { .. }));
    assert!(matches!(stmts[2].statement, Statement::CreateFunction { .. }));
    assert!(matches!(stmts[3].statement, Statement::Passthrough { .. }));
}

#[test]
fn function_body_keeps_provenance() {
    let block = "SELECT 1;\nCREATE TRACE FUNCTION f(x INT) RETURNS INT AS\nSELECT $x;";
    let stmts = parse_all(block);
    let Statement::CreateFunction { body, .. } = &stmts[1].statement else {
        panic!("expected a create-function statement");
    };
    assert_eq!(body.sql(), "SELECT $x");
    // The body starts on line 3 of the block.
    assert!(body.as_traceback(0).contains("line 3"));
}

#[test]
fn comments_and_strings_do_not_confuse_splitting() {
    let stmts = parse_all(
        "SELECT 'a;b' AS s; -- trailing; comment\n\
         /* block; comment */ SELECT 2;",
    );
    assert_eq!(stmts.len(), 2);
}

#[test]
fn or_replace_is_recognized_for_both_forms() {
    let stmts = parse_all(
        "CREATE OR REPLACE TRACE FUNCTION f(x INT) RETURNS LONG AS SELECT $x;\n\
         CREATE OR REPLACE TRACE TABLE t AS SELECT 1 AS a;",
    );
    let Statement::CreateFunction {
        replace, returns, ..
    } = &stmts[0].statement
    else {
        panic!("expected a create-function statement");
    };
    assert!(replace);
    assert_eq!(*returns, ReturnSpec::Scalar(ScalarType::Long));
    assert!(matches!(stmts[1].statement, Statement::CreateTable { .. }));
}

#[test]
fn table_returns_parse_column_definitions() {
    let stmts = parse_all(
        "CREATE TRACE FUNCTION spans(min_dur LONG) RETURNS TABLE(id LONG, name STRING) \
         AS SELECT id, name FROM slice WHERE dur >= $min_dur;",
    );
    let Statement::CreateFunction { returns, .. } = &stmts[0].statement else {
        panic!("expected a create-function statement");
    };
    let ReturnSpec::Table(cols) = returns else {
        panic!("expected table returns");
    };
    assert_eq!(cols.len(), 2);
    assert_eq!(cols[0].name, "id");
    assert_eq!(cols[0].ty, ScalarType::Long);
    assert_eq!(cols[1].ty, ScalarType::String);
}

#[test]
fn trigger_creation_is_rejected_with_provenance() {
    let err = Preprocessor::new(SqlSource::from_user(
        "CREATE TRIGGER trg AFTER INSERT ON t BEGIN SELECT 1; END;",
    ))
    .next()
    .unwrap()
    .unwrap_err();
    assert!(err.to_string().contains("triggers"));
    assert!(err.has_traceback());
}

#[test]
fn unknown_return_type_is_a_syntax_error() {
    let err = Preprocessor::new(SqlSource::from_user(
        "CREATE TRACE FUNCTION f(x INT) RETURNS BLOB AS SELECT $x;",
    ))
    .next()
    .unwrap()
    .unwrap_err();
    assert!(err.to_string().contains("unknown type"));
}

#[test]
fn unterminated_final_statement_is_still_yielded() {
    let stmts = parse_all("SELECT 1; SELECT 2");
    assert_eq!(stmts.len(), 2);
}
