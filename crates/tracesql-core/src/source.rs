//! SQL source text with position metadata.
//!
//! Every statement the engine touches carries a `SqlSource` so errors can be
//! reported against the caller's original input, even after the text has been
//! split into statements or rewritten. Derived spans keep the provenance of
//! the text they came from.

/// A piece of SQL text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSource {
    sql: String,
    name: String,
    /// 1-based line of this span's first byte in the original input.
    line: u32,
    /// 1-based column of this span's first byte in the original input.
    col: u32,
}

impl SqlSource {
    /// Source typed directly by the user.
    pub fn from_user(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            name: "stdin".to_string(),
            line: 1,
            col: 1,
        }
    }

    /// Source originating from a module file, tagged with the import key.
    pub fn from_module_import(sql: impl Into<String>, import_key: &str) -> Self {
        Self {
            sql: sql.into(),
            name: format!("module:{import_key}"),
            line: 1,
            col: 1,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    /// Derive a sub-span, retaining provenance. `offset`/`len` are byte
    /// positions into this span's text and must lie on char boundaries.
    pub fn substr(&self, offset: usize, len: usize) -> SqlSource {
        let (line, col) = self.position_of(offset);
        SqlSource {
            sql: self.sql[offset..offset + len].to_string(),
            name: self.name.clone(),
            line,
            col,
        }
    }

    /// Replace the text of this span while keeping its provenance. Used for
    /// inert placeholder statements standing in for dialect statements.
    pub fn rewritten(&self, sql: impl Into<String>) -> SqlSource {
        SqlSource {
            sql: sql.into(),
            name: self.name.clone(),
            line: self.line,
            col: self.col,
        }
    }

    /// Render a traceback block pointing at `offset` within this span.
    pub fn as_traceback(&self, offset: usize) -> String {
        let offset = offset.min(self.sql.len());
        let (line, col) = self.position_of(offset);

        // The offending line, as the caller wrote it.
        let line_start = self.sql[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = self.sql[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(self.sql.len());
        let snippet = &self.sql[line_start..line_end];

        let caret_pad = self.sql[line_start..offset].chars().count();
        format!(
            "Traceback (most recent call last):\n  File \"{}\" line {} col {}\n    {}\n    {}^",
            self.name,
            line,
            col,
            snippet,
            " ".repeat(caret_pad),
        )
    }

    /// Line/col of `offset` in the original input this span was cut from.
    fn position_of(&self, offset: usize) -> (u32, u32) {
        let prefix = &self.sql[..offset.min(self.sql.len())];
        let newlines = prefix.matches('\n').count() as u32;
        if newlines == 0 {
            (self.line, self.col + prefix.chars().count() as u32)
        } else {
            let last_line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
            let col = prefix[last_line_start..].chars().count() as u32 + 1;
            (self.line + newlines, col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_keeps_provenance() {
        let src = SqlSource::from_user("SELECT 1;\nSELECT 2;");
        let second = src.substr(10, 9);
        assert_eq!(second.sql(), "SELECT 2;");
        assert_eq!(second.line(), 2);
        assert_eq!(second.col(), 1);
        assert_eq!(second.name(), "stdin");
    }

    #[test]
    fn traceback_points_at_offending_column() {
        let src = SqlSource::from_user("SELECT *\nFRM slice");
        let tb = src.as_traceback(9);
        assert!(tb.contains("Traceback (most recent call last):"));
        assert!(tb.contains("File \"stdin\" line 2 col 1"));
        assert!(tb.contains("FRM slice"));
        assert!(tb.ends_with("    ^"));
    }

    #[test]
    fn module_sources_carry_the_import_key() {
        let src = SqlSource::from_module_import("SELECT 1", "common.timestamps");
        assert_eq!(src.name(), "module:common.timestamps");
    }
}
