//! Source buffers and positions.
//!
//! A [`Source`] owns the full text of one compilation unit and lives for
//! the whole pipeline; tokens and AST nodes carry positions into it.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;

/// One source file (or an in-memory snippet for tests and tooling).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Display path. `<dummy>` for in-memory sources.
    pub path: String,
    pub code: String,
    /// Whether `path` names a real file on disk.
    pub exists: bool,
}

impl Source {
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Rc<Source>> {
        let code = fs::read_to_string(&path)?;
        Ok(Rc::new(Source {
            path: path.as_ref().display().to_string(),
            code,
            exists: true,
        }))
    }

    /// An unnamed in-memory source.
    pub fn dummy(code: impl Into<String>) -> Rc<Source> {
        Rc::new(Source {
            path: "<dummy>".to_string(),
            code: code.into(),
            exists: false,
        })
    }
}

/// A point in a source: byte offset plus 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn start() -> Pos {
        Pos {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(line:{}, column:{})", self.line, self.column)
    }
}

/// Half-open region of a source. Empty spans are used for synthesized
/// nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Span {
        Span { start, end }
    }

    /// Span covering both operands.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}
