//! Type errors.

use std::fmt;

use crate::source::Span;

use super::unify::UnifyError;

/// An error raised during type inference. Context notes accumulate as
/// the error travels up to the construct that explains it.
#[derive(Debug, Clone)]
pub struct TypeError {
    pub msg: String,
    pub span: Span,
}

impl TypeError {
    pub fn new(msg: impl Into<String>, span: Span) -> TypeError {
        TypeError {
            msg: msg.into(),
            span,
        }
    }

    pub fn from_unify(err: UnifyError, span: Span) -> TypeError {
        TypeError {
            msg: err.to_string(),
            span,
        }
    }

    pub fn note(mut self, msg: impl fmt::Display) -> TypeError {
        self.msg.push_str(&format!("\n  Note: {}", msg));
        self
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type error at {}: {}", self.span.start, self.msg)
    }
}

impl std::error::Error for TypeError {}
