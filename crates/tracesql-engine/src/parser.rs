//! The dialect preprocessor.
//!
//! Splits a block of SQL into statements (string- and comment-aware) and
//! classifies each one: `CREATE [OR REPLACE] TRACE FUNCTION ...` and
//! `CREATE [OR REPLACE] TRACE TABLE ... AS ...` become dialect statements
//! handled by the engine; everything else passes through to SQLite verbatim.
//! Comment-only statements are skipped; `CREATE TRIGGER` is rejected.

use tracesql_core::{Error, Result, SqlSource};

use crate::prototype::{parse_argument_definitions, ArgumentDefinition, ScalarType};

/// What a created function declares it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnSpec {
    Scalar(ScalarType),
    Table(Vec<ArgumentDefinition>),
}

/// One classified statement.
#[derive(Debug, Clone)]
pub enum Statement {
    CreateFunction {
        replace: bool,
        prototype: String,
        returns: ReturnSpec,
        body: SqlSource,
    },
    CreateTable {
        name: String,
        body: SqlSource,
    },
    Passthrough {
        sql: SqlSource,
    },
}

/// A classified statement plus the span it was cut from.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub source: SqlSource,
}

/// Iterates classified statements over a source block.
pub struct Preprocessor {
    source: SqlSource,
    pos: usize,
}

impl Preprocessor {
    pub fn new(source: SqlSource) -> Self {
        Self { source, pos: 0 }
    }

    /// The span of the next `;`-terminated statement, or `None` at the end.
    fn next_statement_span(&mut self) -> Option<(usize, usize)> {
        let text = self.source.sql();
        if self.pos >= text.len() {
            return None;
        }
        let start = self.pos;
        let bytes = text.as_bytes();
        let mut i = start;
        while i < bytes.len() {
            match bytes[i] {
                b';' => {
                    self.pos = i + 1;
                    return Some((start, i + 1));
                }
                b'\'' | b'"' | b'`' => i = skip_quoted(text, i),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    i = text[i..].find('\n').map(|n| i + n + 1).unwrap_or(text.len());
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = text[i..].find("*/").map(|n| i + n + 2).unwrap_or(text.len());
                }
                _ => i += 1,
            }
        }
        self.pos = text.len();
        Some((start, text.len()))
    }

    fn classify(&self, start: usize, end: usize) -> Result<Option<ParsedStatement>> {
        let stmt_source = self.source.substr(start, end - start);
        let text = stmt_source.sql();
        let mut scanner = Scanner::new(text);

        // Spans include their terminating ';', so an empty statement still
        // yields one token.
        let first = match scanner.next_token() {
            None => return Ok(None),
            Some(t) if t.is_punct(';') => return Ok(None),
            Some(t) => t,
        };
        if !first.is_word("create") {
            return Ok(Some(ParsedStatement {
                statement: Statement::Passthrough {
                    sql: stmt_source.clone(),
                },
                source: stmt_source,
            }));
        }

        let mut replace = false;
        let mut tok = scanner.next_token();
        if tok.as_ref().is_some_and(|t| t.is_word("or")) {
            let next = scanner.next_token();
            if !next.as_ref().is_some_and(|t| t.is_word("replace")) {
                return Ok(Some(passthrough(stmt_source)));
            }
            replace = true;
            tok = scanner.next_token();
        }

        let Some(kind) = tok else {
            return Ok(Some(passthrough(stmt_source)));
        };
        if kind.is_word("trigger") {
            return Err(Error::Syntax("creating triggers is not supported".into())
                .with_traceback(stmt_source.as_traceback(kind.start)));
        }
        if !kind.is_word("trace") {
            return Ok(Some(passthrough(stmt_source)));
        }

        let statement = match scanner.next_token() {
            Some(t) if t.is_word("function") => {
                parse_create_function(&stmt_source, &mut scanner, replace)
            }
            Some(t) if t.is_word("table") => parse_create_table(&stmt_source, &mut scanner),
            other => Err(Error::Syntax(
                "expected FUNCTION or TABLE after CREATE TRACE".into(),
            )
            .with_traceback(
                stmt_source.as_traceback(other.map(|t| t.start).unwrap_or(text.len())),
            )),
        }?;
        Ok(Some(ParsedStatement {
            statement,
            source: stmt_source,
        }))
    }
}

impl Iterator for Preprocessor {
    type Item = Result<ParsedStatement>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (start, end) = self.next_statement_span()?;
            match self.classify(start, end) {
                Ok(Some(parsed)) => return Some(Ok(parsed)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn passthrough(source: SqlSource) -> ParsedStatement {
    ParsedStatement {
        statement: Statement::Passthrough {
            sql: source.clone(),
        },
        source,
    }
}

fn parse_create_function(
    stmt_source: &SqlSource,
    scanner: &mut Scanner<'_>,
    replace: bool,
) -> Result<Statement> {
    let err_at = |offset: usize, msg: &str| {
        Error::Syntax(msg.to_string()).with_traceback(stmt_source.as_traceback(offset))
    };

    let name = scanner
        .next_token()
        .filter(Token::is_identifier)
        .ok_or_else(|| err_at(scanner.pos, "expected a function name"))?;
    let open = scanner
        .next_token()
        .filter(|t| t.is_punct('('))
        .ok_or_else(|| err_at(scanner.pos, "expected '(' after the function name"))?;
    let close = scan_to_matching_paren(scanner)
        .ok_or_else(|| err_at(open.start, "unterminated argument list"))?;
    let prototype = stmt_source.sql()[name.start..close.end()].trim().to_string();

    if !scanner.next_token().is_some_and(|t| t.is_word("returns")) {
        return Err(err_at(scanner.pos, "expected RETURNS after the prototype"));
    }

    let returns = match scanner.next_token() {
        Some(t) if t.is_word("table") => {
            let open = scanner
                .next_token()
                .filter(|t| t.is_punct('('))
                .ok_or_else(|| err_at(scanner.pos, "expected '(' after RETURNS TABLE"))?;
            let close = scan_to_matching_paren(scanner)
                .ok_or_else(|| err_at(open.start, "unterminated column list"))?;
            let cols = &stmt_source.sql()[open.end()..close.start];
            ReturnSpec::Table(
                parse_argument_definitions(cols)
                    .map_err(|e| e.with_traceback(stmt_source.as_traceback(open.start)))?,
            )
        }
        Some(t) if t.is_identifier() => ReturnSpec::Scalar(
            ScalarType::parse(t.text)
                .map_err(|e| e.with_traceback(stmt_source.as_traceback(t.start)))?,
        ),
        _ => return Err(err_at(scanner.pos, "expected a return type after RETURNS")),
    };

    let body = parse_body(stmt_source, scanner)?;
    Ok(Statement::CreateFunction {
        replace,
        prototype,
        returns,
        body,
    })
}

fn parse_create_table(stmt_source: &SqlSource, scanner: &mut Scanner<'_>) -> Result<Statement> {
    let name = scanner
        .next_token()
        .filter(Token::is_identifier)
        .ok_or_else(|| {
            Error::Syntax("expected a table name".into())
                .with_traceback(stmt_source.as_traceback(scanner.pos))
        })?;
    let name = name.text.to_string();
    let body = parse_body(stmt_source, scanner)?;
    Ok(Statement::CreateTable { name, body })
}

/// Expect `AS`, then take the rest of the statement as the body span.
fn parse_body(stmt_source: &SqlSource, scanner: &mut Scanner<'_>) -> Result<SqlSource> {
    let as_kw = scanner.next_token();
    if !as_kw.as_ref().is_some_and(|t| t.is_word("as")) {
        return Err(Error::Syntax("expected AS before the body".into())
            .with_traceback(stmt_source.as_traceback(scanner.pos)));
    }
    scanner.skip_trivia();
    let start = scanner.pos;
    let text = stmt_source.sql();
    let end = text.trim_end_matches(|c: char| c == ';' || c.is_whitespace()).len();
    if start >= end {
        return Err(Error::Syntax("the body must not be empty".into())
            .with_traceback(stmt_source.as_traceback(start)));
    }
    Ok(stmt_source.substr(start, end - start))
}

/// Consume tokens until the ')' matching an already-consumed '('.
fn scan_to_matching_paren<'a>(scanner: &mut Scanner<'a>) -> Option<Token<'a>> {
    let mut depth = 0usize;
    while let Some(tok) = scanner.next_token() {
        if tok.is_punct('(') {
            depth += 1;
        } else if tok.is_punct(')') {
            if depth == 0 {
                return Some(tok);
            }
            depth -= 1;
        }
    }
    None
}

/// Minimal SQL scanner: words, punctuation, and quoted literals, skipping
/// whitespace and comments.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    start: usize,
}

impl<'a> Token<'a> {
    fn is_word(&self, word: &str) -> bool {
        self.text.eq_ignore_ascii_case(word)
    }

    fn is_punct(&self, c: char) -> bool {
        self.text.len() == c.len_utf8() && self.text.starts_with(c)
    }

    fn is_identifier(&self) -> bool {
        self.text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    }

    fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn skip_trivia(&mut self) {
        let bytes = self.text.as_bytes();
        loop {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if bytes.get(self.pos) == Some(&b'-') && bytes.get(self.pos + 1) == Some(&b'-') {
                self.pos = self.text[self.pos..]
                    .find('\n')
                    .map(|n| self.pos + n + 1)
                    .unwrap_or(self.text.len());
                continue;
            }
            if bytes.get(self.pos) == Some(&b'/') && bytes.get(self.pos + 1) == Some(&b'*') {
                self.pos = self.text[self.pos..]
                    .find("*/")
                    .map(|n| self.pos + n + 2)
                    .unwrap_or(self.text.len());
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        self.skip_trivia();
        let bytes = self.text.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }
        let start = self.pos;
        let c = bytes[start];
        if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' {
            let mut end = start + 1;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'.')
            {
                end += 1;
            }
            self.pos = end;
            return Some(Token {
                text: &self.text[start..end],
                start,
            });
        }
        if c == b'\'' || c == b'"' || c == b'`' {
            let end = skip_quoted(self.text, start);
            self.pos = end;
            return Some(Token {
                text: &self.text[start..end],
                start,
            });
        }
        self.pos = start + 1;
        Some(Token {
            text: &self.text[start..self.pos],
            start,
        })
    }
}

/// Given the index of an opening quote, return the index just past the
/// closing quote, honoring SQL's doubled-quote escape.
fn skip_quoted(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(sql: &str) -> Vec<ParsedStatement> {
        Preprocessor::new(SqlSource::from_user(sql))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn splits_statements_and_skips_empty_ones() {
        let stmts = parse_all("SELECT 1; ; -- a comment\n; SELECT 2;");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0].statement, Statement::Passthrough { .. }));
    }

    #[test]
    fn semicolons_in_strings_do_not_split() {
        let stmts = parse_all("SELECT 'a;b'; SELECT 2");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn parses_a_scalar_function() {
        let stmts =
            parse_all("CREATE TRACE FUNCTION f(x INT) RETURNS INT AS SELECT $x + 1;");
        let Statement::CreateFunction {
            replace,
            prototype,
            returns,
            body,
        } = &stmts[0].statement
        else {
            panic!("expected a create-function statement");
        };
        assert!(!replace);
        assert_eq!(prototype, "f(x INT)");
        assert_eq!(*returns, ReturnSpec::Scalar(ScalarType::Int));
        assert_eq!(body.sql(), "SELECT $x + 1");
    }

    #[test]
    fn parses_or_replace_and_table_returns() {
        let stmts = parse_all(
            "CREATE OR REPLACE TRACE FUNCTION f(x INT) RETURNS TABLE(y INT, z STRING) \
             AS SELECT $x AS y, 'v' AS z;",
        );
        let Statement::CreateFunction {
            replace, returns, ..
        } = &stmts[0].statement
        else {
            panic!("expected a create-function statement");
        };
        assert!(replace);
        let ReturnSpec::Table(cols) = returns else {
            panic!("expected table returns");
        };
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].name, "y");
    }

    #[test]
    fn parses_create_table() {
        let stmts = parse_all("CREATE TRACE TABLE t AS SELECT 1 AS a;");
        let Statement::CreateTable { name, body } = &stmts[0].statement else {
            panic!("expected a create-table statement");
        };
        assert_eq!(name, "t");
        assert_eq!(body.sql(), "SELECT 1 AS a");
    }

    #[test]
    fn rejects_triggers() {
        let err = Preprocessor::new(SqlSource::from_user(
            "CREATE TRIGGER trg AFTER INSERT ON t BEGIN SELECT 1; END;",
        ))
        .next()
        .unwrap()
        .unwrap_err();
        assert!(err.to_string().contains("triggers"));
    }

    #[test]
    fn non_dialect_create_passes_through() {
        let stmts = parse_all("CREATE TABLE t(a INTEGER);");
        assert!(matches!(stmts[0].statement, Statement::Passthrough { .. }));
    }

    #[test]
    fn missing_body_is_a_syntax_error() {
        let err = Preprocessor::new(SqlSource::from_user(
            "CREATE TRACE FUNCTION f(x INT) RETURNS INT AS ;",
        ))
        .next()
        .unwrap()
        .unwrap_err();
        assert!(err.has_traceback());
    }
}
