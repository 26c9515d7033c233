//! crates/cv_core/src/errors.rs
//! Minimal error set for core-domain parsing and for programming errors
//! (re-entrant parsing, double insertion) that must never be reported as
//! data diagnostics.

use core::fmt;

/// Parsing failures for core value types (months, metrics, releases).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoreError {
    InvalidMonth(String),
    InvalidDate(String),
    UnknownMetric(String),
    UnknownRelease(String),
    InvalidPeriod { begin: String, end: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidMonth(s) => write!(f, "invalid month: {s}"),
            CoreError::InvalidDate(s) => write!(f, "invalid date: {s}"),
            CoreError::UnknownMetric(s) => write!(f, "unknown Metric_Type: {s}"),
            CoreError::UnknownRelease(s) => write!(f, "unknown Release: {s}"),
            CoreError::InvalidPeriod { begin, end } => {
                write!(f, "period {begin}..{end} does not cover exactly one month")
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// Modeling bugs in the engine itself. These abort the current document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogicError {
    /// `begin_parse` while the node is already parsing (e.g. a header parsing itself).
    Reentrant(&'static str),
    /// `begin_parse` on a node that finished parsing.
    AlreadyParsed(&'static str),
    /// `end_parse` without a matching `begin_parse`.
    NotParsing(&'static str),
    /// Second `add` for the same (metric, month) pair within one parse.
    DuplicateCount { metric: String, month: String },
}

impl fmt::Display for LogicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicError::Reentrant(k) => write!(f, "re-entrant parse of {k}"),
            LogicError::AlreadyParsed(k) => write!(f, "{k} has already been parsed"),
            LogicError::NotParsing(k) => write!(f, "end_parse called on {k} outside of parsing"),
            LogicError::DuplicateCount { metric, month } => {
                write!(f, "count for {metric}/{month} added twice in one parse")
            }
        }
    }
}

impl std::error::Error for LogicError {}
