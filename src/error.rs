//! Module containing error definitions for the obfuscation pipeline.

use crate::token::Position;
use std::{error::Error, fmt};

/// Error encountered when tokenizing the script text.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
#[non_exhaustive]
pub enum LexError {
    /// An unexpected character is encountered in the script text.
    UnexpectedInput(String),
    /// A string literal is not terminated before a new-line or EOF.
    UnterminatedString,
    /// A string escape sequence is in an invalid format.
    MalformedEscapeSequence(String),
    /// A numeric literal is in an invalid format.
    MalformedNumber(String),
}

impl Error for LexError {}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedInput(s) => write!(f, "Unexpected '{}'", s),
            Self::UnterminatedString => f.write_str("Open string is not terminated"),
            Self::MalformedEscapeSequence(s) => write!(f, "Invalid escape sequence: '{}'", s),
            Self::MalformedNumber(s) => write!(f, "Invalid number: '{}'", s),
        }
    }
}

impl LexError {
    /// Convert a [`LexError`] into a [`ParseError`].
    #[inline(always)]
    #[must_use]
    pub fn into_err(self, pos: Position) -> ParseError {
        ParseError(Box::new(ParseErrorType::BadInput(self)), pos)
    }
}

/// Type of error encountered when parsing a script.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
#[non_exhaustive]
pub enum ParseErrorType {
    /// The script ends prematurely.  The wrapped value describes what was
    /// expected instead.
    UnexpectedEOF(String),
    /// Error in the script text.  Wrapped value is the lex error.
    BadInput(LexError),
    /// Expecting one construct but finding another.  Wrapped values are the
    /// expected construct and the offending token text.
    Expected(String, String),
    /// `break` encountered outside any enclosing loop.
    BreakOutsideLoop,
    /// Statement nesting exceeds the configured depth budget.
    ///
    /// The driver surfaces this as
    /// [`ResourceExceeded`][crate::ObfuscateError::ResourceExceeded].
    TooDeep(usize),
}

impl ParseErrorType {
    /// Convert a [`ParseErrorType`] into a [`ParseError`].
    #[inline(always)]
    #[must_use]
    pub fn into_err(self, pos: Position) -> ParseError {
        ParseError(Box::new(self), pos)
    }
}

impl fmt::Display for ParseErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEOF(s) => write!(f, "Script ended before {}", s),
            Self::BadInput(err) => write!(f, "{}", err),
            Self::Expected(expected, got) => {
                write!(f, "Expecting {}, found '{}'", expected, got)
            }
            Self::BreakOutsideLoop => f.write_str("'break' outside a loop"),
            Self::TooDeep(max) => write!(f, "Statement nesting exceeds {} levels", max),
        }
    }
}

/// Error when parsing a script.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct ParseError(
    /// Parse error type.
    pub Box<ParseErrorType>,
    /// [`Position`] of the parse error.
    pub Position,
);

impl Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        if !self.1.is_none() {
            write!(f, " ({})", self.1)?;
        }
        Ok(())
    }
}

/// Any error raised by the obfuscation pipeline.  The set is exhaustive:
/// passes surface errors upward unmodified and never recover a sibling's
/// failure.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ObfuscateError {
    /// The input script failed to parse.
    Parse(ParseError),
    /// A resource limit was exceeded.  Wrapped values name the limit and give
    /// the configured maximum and the observed amount.
    ResourceExceeded {
        /// Name of the exceeded limit.
        limit: &'static str,
        /// Configured maximum.
        max: usize,
        /// Observed amount.
        actual: usize,
    },
    /// An option key or value was not recognized.
    InvalidOption {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A pass invariant was violated.  Impossible for well-formed input; any
    /// occurrence is a bug.
    Internal {
        /// The pipeline stage that failed.
        stage: &'static str,
        /// Failure detail.
        message: String,
    },
}

impl Error for ObfuscateError {}

impl fmt::Display for ObfuscateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{}", err),
            Self::ResourceExceeded { limit, max, actual } => {
                write!(f, "Limit '{}' exceeded: {} > {}", limit, actual, max)
            }
            Self::InvalidOption { key, reason } => {
                write!(f, "Invalid option '{}': {}", key, reason)
            }
            Self::Internal { stage, message } => {
                write!(f, "Internal error in stage '{}': {}", stage, message)
            }
        }
    }
}

impl From<ParseError> for ObfuscateError {
    #[inline(always)]
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}
