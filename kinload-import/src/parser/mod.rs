//! Interchange file parsing
//!
//! Three streaming stages, each a lazy iterator over the previous one:
//! - [`LineNormalizer`]: raw bytes to normalized text lines (BOM, encoding, terminators)
//! - [`Tokenizer`]: lines to `LEVEL [XREF] TAG [VALUE]` tokens, joining CONT/CONC
//! - [`RecordAssembler`]: tokens to one record tree per level-0 entity
//!
//! Every stage yields `Result` items; errors are per-line or per-record and
//! never end the stream.

pub mod assembler;
pub mod normalizer;
pub mod tokenizer;

pub use assembler::{Record, RecordAssembler, RecordKind, RecordNode, ResumePoint};
pub use normalizer::{LineNormalizer, NormalizedLine, SourceEncoding};
pub use tokenizer::{pointer_target, Token, Tokenizer};

use thiserror::Error;

/// Recoverable parse errors (reported and skipped by the orchestrator)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line does not start with a level number followed by whitespace
    #[error("line {line_number}: malformed line {content:?}")]
    MalformedLine { line_number: u64, content: String },

    /// CONT/CONC with no open parent to extend
    #[error("line {line_number}: {tag} continuation has no open parent value")]
    UnknownContinuation { line_number: u64, tag: String },

    /// Level deeper than the open record allows; the record is discarded
    #[error("line {line_number}: level {level} is deeper than open depth {depth}")]
    LevelSkew {
        line_number: u64,
        level: u32,
        depth: usize,
    },
}

impl ParseError {
    /// Source line the error was detected on
    pub fn line_number(&self) -> u64 {
        match self {
            ParseError::MalformedLine { line_number, .. }
            | ParseError::UnknownContinuation { line_number, .. }
            | ParseError::LevelSkew { line_number, .. } => *line_number,
        }
    }

    /// Stable error code recorded in the session error log
    pub fn error_code(&self) -> &'static str {
        match self {
            ParseError::MalformedLine { .. } => "MALFORMED_LINE",
            ParseError::UnknownContinuation { .. } => "UNKNOWN_CONTINUATION",
            ParseError::LevelSkew { .. } => "LEVEL_SKEW",
        }
    }
}

/// Parse a complete buffer into records, collecting errors alongside
///
/// Convenience for callers that do not need resumption.
pub fn parse_records(bytes: &[u8]) -> (Vec<Record>, Vec<ParseError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    for item in RecordAssembler::new(Tokenizer::new(LineNormalizer::new(bytes))) {
        match item {
            Ok(record) => records.push(record),
            Err(e) => errors.push(e),
        }
    }
    (records, errors)
}
