//! Error types for the script engine.

use std::fmt;

/// Where an error originated: script name plus 1-based line and column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    /// Name of the script the failing statement belongs to.
    pub script: String,
    /// Line number in the script source (1-based).
    pub line: usize,
    /// Column of the failing token (1-based).
    pub column: usize,
}

impl Position {
    /// Create a position from 1-based coordinates.
    pub fn new(script: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            script: script.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.script, self.line, self.column)
    }
}

/// Classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tokenizer or statement validation failure, raised by the check pass.
    Parse,
    /// Data-dependent failure while running a statement.
    Runtime,
    /// Violated programming contract. Should be unreachable.
    Internal,
    /// File system failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Internal => "internal",
            ErrorKind::Io => "i/o",
        })
    }
}

/// Errors that can occur while loading, checking or running scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    /// The error message.
    pub message: String,
    /// Position information, attached once the failing statement is known.
    pub position: Option<Position>,
}

impl Error {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
        }
    }

    /// Create a parse (validation) error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    /// Create a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Create an internal invariant error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Wrap an I/O failure, naming the file involved.
    pub fn io(path: impl fmt::Display, err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("{}: {}", path, err))
    }

    /// Attach a position unless one is already present.
    ///
    /// The innermost position wins: a token-level position set by the
    /// tokenizer is kept when the statement loop adds its own.
    pub fn at(mut self, position: Position) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }

    pub fn is_parse(&self) -> bool {
        self.kind == ErrorKind::Parse
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{}: {} error: {}", pos, self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_display() {
        let err = Error::runtime("something went wrong");
        assert_eq!(err.to_string(), "runtime error: something went wrong");
    }

    #[test]
    fn error_with_position() {
        let err = Error::parse("unexpected token").at(Position::new("demo.ses", 3, 7));
        assert_eq!(
            err.to_string(),
            "demo.ses:3:7: parse error: unexpected token"
        );
    }

    #[test]
    fn innermost_position_wins() {
        let err = Error::parse("bad escape")
            .at(Position::new("a", 1, 12))
            .at(Position::new("a", 1, 1));
        assert_eq!(err.position, Some(Position::new("a", 1, 12)));
    }

    #[test]
    fn io_error_names_path() {
        let err = Error::io(
            "missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.to_string().contains("missing.txt"));
    }
}
