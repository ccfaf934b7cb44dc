//! Error kinds, the internal unwinding error type, and the public exception
//! surfaced to the host.

use std::fmt::{self, Display};

use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::{resource::ResourceError, value::Value};

/// Result type alias for operations that can raise inside the interpreter.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// The standard error constructors of the source dialect.
///
/// The string representation matches the constructor name exactly
/// (e.g. `TypeError` -> "TypeError").
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    StrumDisplay,
    EnumString,
    IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum ErrorKind {
    /// The generic `Error` constructor, base of the six subclasses.
    Error,
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    URIError,
}

impl ErrorKind {
    /// All subclass kinds, in installation order.
    pub(crate) const SUBCLASSES: [Self; 6] = [
        Self::EvalError,
        Self::RangeError,
        Self::ReferenceError,
        Self::SyntaxError,
        Self::TypeError,
        Self::URIError,
    ];
}

/// Internal error raised while stepping.
///
/// `Thrown` carries an already-materialized interpreter value (the operand of
/// a `throw` statement). `Pending` is a cheaper form used by native code and
/// the machine itself; it is turned into a real error object only when the
/// unwinding machinery takes over, so error paths that get caught and
/// re-rendered never allocate twice.
#[derive(Debug)]
pub(crate) enum RunError {
    Thrown(Value),
    Pending { kind: ErrorKind, message: String },
    Resource(ResourceError),
    /// Host-level failure that bypasses `try`/`catch`: illegal control flow
    /// the parser missed, or an uncaught throw already rendered for the host.
    Host(Exception),
}

impl RunError {
    pub(crate) fn pending(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Pending {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::pending(ErrorKind::TypeError, message)
    }

    pub(crate) fn range_error(message: impl Into<String>) -> Self {
        Self::pending(ErrorKind::RangeError, message)
    }

    pub(crate) fn reference_error(message: impl Into<String>) -> Self {
        Self::pending(ErrorKind::ReferenceError, message)
    }

    pub(crate) fn syntax_error(message: impl Into<String>) -> Self {
        Self::pending(ErrorKind::SyntaxError, message)
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

impl From<Exception> for RunError {
    fn from(exc: Exception) -> Self {
        Self::Pending {
            kind: exc.kind,
            message: exc.message,
        }
    }
}

/// Source position of an error, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    /// Computes the location of a byte offset in `source`.
    pub(crate) fn from_offset(source: &str, offset: u32) -> Self {
        let offset = (offset as usize).min(source.len());
        let prefix = &source[..offset];
        let line = prefix.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
        let column = prefix.rfind('\n').map_or(offset, |nl| offset - nl - 1) as u32 + 1;
        Self { line, column }
    }
}

impl Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An error surfaced to the host.
///
/// This covers parse failures, uncaught interpreter-level throws, illegal
/// control flow the parser missed (`break` with no target, `return` outside a
/// call), protocol misuse (`append_code` while not idle) and tripped resource
/// limits. Native functions also use it as their error type; a native `Err`
/// becomes an interpreter-level throw that sandboxed code can catch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<CodeLoc>,
}

impl Exception {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Error, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    pub(crate) fn with_loc(mut self, loc: Option<CodeLoc>) -> Self {
        self.loc = loc;
        self
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }
        if let Some(loc) = self.loc {
            write!(f, " (at {loc})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_loc_counts_lines_and_columns() {
        let src = "var a;\nvar b;\n  a + b;";
        assert_eq!(CodeLoc::from_offset(src, 0), CodeLoc { line: 1, column: 1 });
        assert_eq!(CodeLoc::from_offset(src, 7), CodeLoc { line: 2, column: 1 });
        assert_eq!(CodeLoc::from_offset(src, 16), CodeLoc { line: 3, column: 3 });
    }

    #[test]
    fn exception_display_includes_kind_and_location() {
        let exc = Exception::type_error("x is not a function").with_loc(Some(CodeLoc { line: 3, column: 5 }));
        assert_eq!(exc.to_string(), "TypeError: x is not a function (at 3:5)");
    }
}
