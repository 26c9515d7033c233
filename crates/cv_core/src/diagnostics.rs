//! crates/cv_core/src/diagnostics.rs
//! Diagnostic severities, position tokens and the sink interface.
//!
//! The engine never formats, sorts or filters findings: it emits them into a
//! `DiagnosticSink` together with a position token. JSON positions follow
//! `.Report_Items[3].Performance.Total_Item_Requests.2024-01`; tabular
//! positions are spreadsheet cell references (`C17`).

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ascending severity. Ordering is meaningful (`Notice < … < Fatal`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    Notice,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Notice => "Notice",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
            Severity::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Severity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notice" => Ok(Severity::Notice),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "fatal" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Where a finding was made.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Position {
    /// The document as a whole (e.g. unreadable input).
    Document,
    /// Dotted JSON path; the empty path is the document root.
    Json(String),
    /// Zero-based column and one-based row of a tabular sheet.
    Cell { column: usize, row: usize },
}

impl Position {
    pub fn root() -> Self {
        Position::Json(String::new())
    }

    pub fn cell(column: usize, row: usize) -> Self {
        Position::Cell { column, row }
    }

    /// Descend into an object member. Tabular positions are already exact.
    pub fn key(&self, key: &str) -> Self {
        match self {
            Position::Json(p) => Position::Json(format!("{p}.{key}")),
            other => other.clone(),
        }
    }

    /// Descend into an array element.
    pub fn index(&self, i: usize) -> Self {
        match self {
            Position::Json(p) => Position::Json(format!("{p}[{i}]")),
            other => other.clone(),
        }
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, Position::Cell { .. })
    }
}

/// Spreadsheet column letters for a zero-based column index (0 → A, 26 → AA).
pub fn column_letters(mut column: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (column % 26) as u8);
        if column < 26 {
            break;
        }
        column = column / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Document => f.write_str("document"),
            Position::Json(p) if p.is_empty() => f.write_str("."),
            Position::Json(p) => f.write_str(p),
            Position::Cell { column, row } => write!(f, "{}{}", column_letters(*column), row),
        }
    }
}

/// One finding.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub message: String,
    pub position: Position,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub data: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        summary: impl Into<String>,
        message: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            severity,
            summary: summary.into(),
            message: message.into(),
            position,
            data: None,
            hint: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Receiver of findings. Implemented by the rendering collaborator; the
/// engine only ever calls these methods.
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);

    fn notice(&mut self, summary: &str, message: String, position: &Position, data: Option<String>) {
        self.emit(with_data(Severity::Notice, summary, message, position, data));
    }

    fn warning(&mut self, summary: &str, message: String, position: &Position, data: Option<String>) {
        self.emit(with_data(Severity::Warning, summary, message, position, data));
    }

    fn error(&mut self, summary: &str, message: String, position: &Position, data: Option<String>) {
        self.emit(with_data(Severity::Error, summary, message, position, data));
    }

    fn critical(&mut self, summary: &str, message: String, position: &Position, data: Option<String>) {
        self.emit(with_data(Severity::Critical, summary, message, position, data));
    }

    fn fatal(&mut self, summary: &str, message: String, position: &Position, data: Option<String>) {
        self.emit(with_data(Severity::Fatal, summary, message, position, data));
    }
}

fn with_data(
    severity: Severity,
    summary: &str,
    message: String,
    position: &Position,
    data: Option<String>,
) -> Diagnostic {
    let mut d = Diagnostic::new(severity, summary, message, position.clone());
    d.data = data;
    d
}

/// In-memory sink preserving emission order.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity >= severity).count()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.entries.iter().map(|d| d.severity).max()
    }

    pub fn with_summary<'a>(&'a self, summary: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |d| d.summary == summary)
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }
}
