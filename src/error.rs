use std::fmt::{Display, Write};
use std::rc::Rc;

use thiserror::Error;

use crate::class::Instance;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] SyntaxError: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: u32, message: &str) -> Self {
        Self { line, message: message.to_owned() }
    }
}

/// The built-in error classes. Each kind has a class of the same name in the registry,
/// all derived from `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("Error")]
    Error,
    #[error("IdentifierError")]
    Identifier,
    #[error("TypeError")]
    Type,
    #[error("ValueError")]
    Value,
    #[error("ZeroDivisionError")]
    ZeroDivision,
    #[error("AttributeError")]
    Attribute,
    #[error("AssertionError")]
    Assertion,
    #[error("IndexError")]
    Index,
    #[error("ImportError")]
    Import,
    #[error("SyntaxError")]
    Syntax,
    #[error("RecursionError")]
    Recursion,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Error,
        ErrorKind::Identifier,
        ErrorKind::Type,
        ErrorKind::Value,
        ErrorKind::ZeroDivision,
        ErrorKind::Attribute,
        ErrorKind::Assertion,
        ErrorKind::Index,
        ErrorKind::Import,
        ErrorKind::Syntax,
        ErrorKind::Recursion,
    ];
}

/// What was raised: either an error produced by the runtime itself, or an exception value
/// thrown by user code.
#[derive(Debug, Clone)]
pub enum Raised {
    Native { kind: ErrorKind, message: String },
    Value(Rc<Instance>),
}

impl Raised {
    pub fn class_name(&self) -> String {
        match self {
            Raised::Native { kind, .. } => kind.to_string(),
            Raised::Value(instance) => instance.class.name.clone(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Raised::Native { message, .. } => message.clone(),
            Raised::Value(instance) => instance.message(),
        }
    }
}

impl Display for Raised {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self.message();
        if message.is_empty() {
            write!(f, "{}", self.class_name())
        } else {
            write!(f, "{}: {message}", self.class_name())
        }
    }
}

/// One entry of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    pub source: String,
    pub scope: String,
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  File \"{}\", line {}, in {}\n    {}", self.file, self.line, self.scope, self.source)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{raised}")]
pub struct RuntimeError {
    pub raised: Raised,
    /// Innermost frame first.
    pub trace: Vec<TraceFrame>,
    recorded_depth: Option<usize>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::from_raised(Raised::Native { kind, message: message.into() })
    }

    pub fn thrown(instance: Rc<Instance>) -> Self {
        Self::from_raised(Raised::Value(instance))
    }

    fn from_raised(raised: Raised) -> Self {
        Self { raised, trace: vec![], recorded_depth: None }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self.raised {
            Raised::Native { kind, .. } => Some(kind),
            Raised::Value(_) => None,
        }
    }

    /// Record the statement the error passed through, once per call depth.
    pub fn record(&mut self, depth: usize, frame: impl FnOnce() -> TraceFrame) {
        if self.recorded_depth != Some(depth) {
            self.trace.push(frame());
            self.recorded_depth = Some(depth);
        }
    }

    /// Python style traceback: most recent call last, then the error itself.
    pub fn render_traceback(&self) -> String {
        let mut out = String::new();
        if !self.trace.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for frame in self.trace.iter().rev() {
                let _ = writeln!(out, "{frame}");
            }
        }
        let _ = write!(out, "{}", self.raised);
        out
    }
}

pub fn type_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::Type, message)
}

pub fn value_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::Value, message)
}

pub fn zero_division() -> RuntimeError {
    RuntimeError::new(ErrorKind::ZeroDivision, "division by zero")
}

pub fn index_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::Index, message)
}

pub fn attribute_error(type_name: &str, attribute: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::Attribute, format!("'{type_name}' has no attribute '{attribute}'"))
}

pub fn identifier_error(name: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::Identifier, format!("name '{name}' is not defined"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(line: u32, scope: &str) -> TraceFrame {
        TraceFrame {
            file: "main.crv".to_owned(),
            line,
            source: "x = 1 / 0;".to_owned(),
            scope: scope.to_owned(),
        }
    }

    #[test]
    fn records_once_per_depth() {
        let mut error = zero_division();
        error.record(1, || frame(3, "f"));
        error.record(1, || frame(2, "f"));
        error.record(0, || frame(7, "<module>"));

        assert_eq!(error.trace, vec![frame(3, "f"), frame(7, "<module>")]);
    }

    #[test]
    fn renders_most_recent_call_last() {
        let mut error = zero_division();
        error.record(1, || frame(3, "f"));
        error.record(0, || frame(7, "<module>"));

        let expected = "Traceback (most recent call last):\n  \
            File \"main.crv\", line 7, in <module>\n    x = 1 / 0;\n  \
            File \"main.crv\", line 3, in f\n    x = 1 / 0;\n\
            ZeroDivisionError: division by zero";
        assert_eq!(error.render_traceback(), expected);
    }

    #[test]
    fn displays_kind_and_message() {
        assert_eq!(type_error("bad").to_string(), "TypeError: bad");
        assert_eq!(ErrorKind::ZeroDivision.to_string(), "ZeroDivisionError");
    }
}
