//! Probe marker injection and removal for C/C++ sources
//!
//! The engine walks a set of paths, asks a [`SourceParser`] for the function
//! definitions of each file, and rewrites the file with probe markers around
//! the selected bodies. Erasure is pattern based and needs no parse.
//!
//! # Example
//!
//! ```
//! use autoperf::annotation::{erase, inject, CScanner, Selection, SourceParser};
//!
//! let src = b"int f(int x) { return x + 1; }\n";
//! let functions = CScanner.parse(src).unwrap();
//! let (annotated, _) = inject(src, &functions, &Selection::All);
//! assert_ne!(annotated, src);
//! assert_eq!(erase(&annotated).0, src);
//! ```

pub mod engine;
pub mod inject;
pub mod parser;

pub use engine::{annotate, discover_sources, AnnotateMode, AnnotateOptions, AnnotationSummary, FileOutcome};
pub use inject::{erase, inject, Edit, EditKind, Selection};
pub use parser::CScanner;

use std::ops::{Range, RangeInclusive};

/// A `return` statement inside a function body, `end` is just past its `;`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnSite {
    pub start: usize,
    pub end: usize,
}

/// One function definition found by a parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    /// Name as written in the definition, possibly qualified (`ns::Cls::m`)
    pub name: String,
    /// Byte range of the body, from the opening `{` through the closing `}`
    pub body: Range<usize>,
    /// 1-based lines of the opening and closing brace
    pub lines: RangeInclusive<usize>,
    /// Offset of the first non-whitespace byte after the opening brace
    pub first_statement: usize,
    pub returns: Vec<ReturnSite>,
}

impl FunctionRecord {
    /// Offset just past the opening brace
    pub fn body_start(&self) -> usize {
        self.body.start + 1
    }

    /// Offset of the closing brace
    pub fn body_end(&self) -> usize {
        self.body.end - 1
    }
}

/// Failure to make sense of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub reason: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.reason, self.offset)
    }
}

impl std::error::Error for ParseError {}

/// Capability of locating function bodies in source bytes
pub trait SourceParser: Send + Sync {
    fn parse(&self, source: &[u8]) -> Result<Vec<FunctionRecord>, ParseError>;
}
