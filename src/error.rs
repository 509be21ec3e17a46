use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}

/// A line that could not be decoded, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}: {kind}")]
pub struct ParseError {
    pub line: u32,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: u32, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Neither `=` nor `:` separates a key from a value.
    #[error("cannot separate key from value")]
    MissingSeparator,
    /// A zero-length line reached the decoder.
    #[error("empty line")]
    EmptyLine,
}
