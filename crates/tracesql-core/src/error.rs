use thiserror::Error;

/// Canonical result for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Structural error: {0}")]
    Structural(String),

    // Failures reported by the embedded SQL engine itself; higher layers
    // annotate these with a traceback before surfacing them.
    #[error("SQL engine error: {0}")]
    Engine(String),

    // Wraps any of the above with source-position context. The wrapper is
    // applied at most once; `has_traceback` is how callers check.
    #[error("{context}\n{inner}")]
    Traceback {
        context: String,
        inner: Box<Error>,
    },
}

impl Error {
    /// True if a traceback has already been attached somewhere in the chain.
    pub fn has_traceback(&self) -> bool {
        matches!(self, Error::Traceback { .. })
    }

    /// Wrap this error with source-position context unless one is already
    /// attached.
    pub fn with_traceback(self, context: String) -> Error {
        if self.has_traceback() {
            return self;
        }
        Error::Traceback {
            context,
            inner: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traceback_attaches_at_most_once() {
        let err = Error::Engine("near \"FROM\": syntax error".into());
        assert!(!err.has_traceback());

        let wrapped = err.with_traceback("Traceback: stdin line 3".into());
        assert!(wrapped.has_traceback());

        let rewrapped = wrapped.with_traceback("Traceback: stdin line 9".into());
        let msg = rewrapped.to_string();
        assert!(msg.contains("line 3"));
        assert!(!msg.contains("line 9"));
    }
}
