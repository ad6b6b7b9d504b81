//! Function prototypes: names, typed arguments, and body-parameter checks.

use tracesql_core::{Error, Result};
use tracesql_sqlite::PreparedStatement;

/// The closed set of scalar types a created function can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int,
    Long,
    Double,
    String,
}

impl ScalarType {
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "BOOL" => Ok(ScalarType::Bool),
            "INT" => Ok(ScalarType::Int),
            "LONG" => Ok(ScalarType::Long),
            "DOUBLE" => Ok(ScalarType::Double),
            "STRING" => Ok(ScalarType::String),
            other => Err(Error::Syntax(format!(
                "unknown type '{other}'; expected BOOL, INT, LONG, DOUBLE or STRING"
            ))),
        }
    }

    /// Whether values of this type are 64-bit integers at runtime.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarType::Bool | ScalarType::Int | ScalarType::Long)
    }

    /// The SQLite column type to declare for this type.
    pub fn sqlite_type(&self) -> &'static str {
        match self {
            ScalarType::Bool | ScalarType::Int | ScalarType::Long => "BIGINT",
            ScalarType::Double => "DOUBLE",
            ScalarType::String => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDefinition {
    pub name: String,
    pub ty: ScalarType,
}

/// A function or table-function signature: name plus ordered typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<ArgumentDefinition>,
}

impl Prototype {
    /// Position of a named argument, matched case-insensitively.
    pub fn arg_index(&self, name: &str) -> Option<usize> {
        self.args
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// Parse `name(arg TYPE, ...)`.
pub fn parse_prototype(text: &str) -> Result<Prototype> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| Error::Syntax(format!("malformed prototype '{text}': expected '('")))?;
    let name = text[..open].trim();
    if !is_identifier(name) {
        return Err(Error::Syntax(format!(
            "malformed prototype: '{name}' is not a valid function name"
        )));
    }
    if !text.ends_with(')') {
        return Err(Error::Syntax(format!(
            "malformed prototype '{text}': expected ')'"
        )));
    }
    let args = parse_argument_definitions(&text[open + 1..text.len() - 1])?;
    Ok(Prototype {
        name: name.to_string(),
        args,
    })
}

/// Parse a comma-separated `name TYPE` list (prototype arguments, or the
/// declared return columns of a table function).
pub fn parse_argument_definitions(text: &str) -> Result<Vec<ArgumentDefinition>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for part in text.split(',') {
        let mut words = part.split_whitespace();
        let (name, ty) = match (words.next(), words.next(), words.next()) {
            (Some(name), Some(ty), None) => (name, ty),
            _ => {
                return Err(Error::Syntax(format!(
                    "malformed argument '{}': expected 'name TYPE'",
                    part.trim()
                )))
            }
        };
        if !is_identifier(name) {
            return Err(Error::Syntax(format!(
                "malformed argument: '{name}' is not a valid argument name"
            )));
        }
        args.push(ArgumentDefinition {
            name: name.to_string(),
            ty: ScalarType::parse(ty)?,
        });
    }
    Ok(args)
}

/// Check every bound parameter of a prepared function body against the
/// prototype and return the bind order: entry `i` is the prototype argument
/// index bound at parameter slot `i + 1`.
///
/// Shared by scalar and table-valued registration; the failure modes are, in
/// order: nameless parameter, non-`$` sigil, parameter absent from the
/// prototype.
pub fn validate_body_parameters(
    stmt: &PreparedStatement,
    prototype: &Prototype,
) -> Result<Vec<usize>> {
    let mut binding_order = Vec::with_capacity(stmt.parameter_count());
    for slot in 1..=stmt.parameter_count() {
        let name = stmt.parameter_name(slot).ok_or_else(|| {
            Error::Structural(format!(
                "{}: the function body has a nameless parameter",
                prototype.name
            ))
        })?;
        let bare = name.strip_prefix('$').ok_or_else(|| {
            Error::Structural(format!(
                "{}: invalid parameter name '{}'; only the $ prefix is supported",
                prototype.name, name
            ))
        })?;
        let idx = prototype.arg_index(bare).ok_or_else(|| {
            Error::Structural(format!(
                "{}: parameter '{}' is not in the function prototype",
                prototype.name, name
            ))
        })?;
        binding_order.push(idx);
    }
    Ok(binding_order)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_two_argument_prototype() {
        let proto = parse_prototype("startup_slice(dur INT, name STRING)").unwrap();
        assert_eq!(proto.name, "startup_slice");
        assert_eq!(proto.args.len(), 2);
        assert_eq!(proto.args[0].name, "dur");
        assert_eq!(proto.args[0].ty, ScalarType::Int);
        assert_eq!(proto.args[1].ty, ScalarType::String);
    }

    #[test]
    fn empty_argument_list_is_valid() {
        let proto = parse_prototype("now()").unwrap();
        assert!(proto.args.is_empty());
    }

    #[test]
    fn rejects_missing_parens_and_bad_names() {
        assert!(parse_prototype("f").is_err());
        assert!(parse_prototype("f(a INT").is_err());
        assert!(parse_prototype("1f(a INT)").is_err());
        assert!(parse_prototype("f(a INT, b)").is_err());
    }

    #[test]
    fn rejects_unknown_types() {
        let err = parse_prototype("f(a BYTES)").unwrap_err();
        assert!(err.to_string().contains("unknown type"));
    }

    #[test]
    fn arg_lookup_is_case_insensitive() {
        let proto = parse_prototype("f(Value INT)").unwrap();
        assert_eq!(proto.arg_index("value"), Some(0));
        assert_eq!(proto.arg_index("missing"), None);
    }
}
