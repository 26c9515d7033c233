//! crates/cv_io/src/document.rs
//! Input documents: a parsed JSON tree, or a tabular sheet (tab-separated
//! cells) with its header block and heading row resolved.
//!
//! Tabular layout (1-based rows):
//!
//! ```text
//! Report_Name   <TAB> Title Master Report      ← header block: key/value rows
//! …
//! Created_By    <TAB> Example Platform
//! (blank row)
//! Title <TAB> Publisher <TAB> … <TAB> Metric_Type <TAB> Reporting_Period_Total <TAB> Jan-2024 …
//! row …                                         ← data rows
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::{IoError, IoResult};

/// Hard cap on input size; COUNTER reports above this are rejected unread.
pub const MAX_INPUT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputFormat {
    Json,
    Tabular,
}

impl InputFormat {
    /// Guess from the file extension (`.json` / `.tsv`, `.txt`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(InputFormat::Json),
            "tsv" | "txt" | "tab" => Some(InputFormat::Tabular),
            _ => None,
        }
    }
}

impl FromStr for InputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(InputFormat::Json),
            "tabular" | "tsv" => Ok(InputFormat::Tabular),
            other => Err(format!("unknown input format: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Document {
    Json(JsonDocument),
    Tabular(TabularSheet),
}

impl Document {
    pub fn format(&self) -> InputFormat {
        match self {
            Document::Json(_) => InputFormat::Json,
            Document::Tabular(_) => InputFormat::Tabular,
        }
    }
}

#[derive(Clone, Debug)]
pub struct JsonDocument {
    pub root: Value,
}

impl JsonDocument {
    pub fn parse(text: &str) -> IoResult<Self> {
        let root: Value = serde_json::from_str(strip_bom(text))?;
        Ok(Self { root })
    }
}

/* ------------------------------- Tabular ------------------------------- */

#[derive(Clone, Debug)]
pub struct TabularSheet {
    rows: Vec<Vec<String>>,
    /// 1-based row of the column headings.
    heading_row: usize,
}

impl TabularSheet {
    /// Split into rows and cells and locate the heading row: the first
    /// non-blank row after the blank row that ends the header block.
    pub fn parse(text: &str) -> IoResult<Self> {
        let rows: Vec<Vec<String>> = strip_bom(text)
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line).split('\t').map(str::to_string).collect())
            .collect();

        let separator = rows
            .iter()
            .position(|r| is_blank(r))
            .ok_or_else(|| IoError::Tabular { row: rows.len(), msg: "no blank row after the header block".into() })?;
        let heading_idx = (separator..rows.len())
            .find(|&i| !is_blank(&rows[i]))
            .ok_or_else(|| IoError::Tabular { row: separator + 1, msg: "no column headings".into() })?;

        debug!(rows = rows.len(), heading_row = heading_idx + 1, "tabular sheet parsed");
        Ok(Self { rows, heading_row: heading_idx + 1 })
    }

    /// Cell text by 1-based row and 0-based column.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row.checked_sub(1)?)?.get(column).map(String::as_str)
    }

    pub fn heading_row(&self) -> usize {
        self.heading_row
    }

    /// `(row, key, value)` for each header-block row (column A key, column B value).
    pub fn header_block(&self) -> Vec<(usize, &str, &str)> {
        self.rows
            .iter()
            .enumerate()
            .take_while(|(_, r)| !is_blank(r))
            .map(|(i, r)| {
                let key = r.first().map(String::as_str).unwrap_or("");
                let value = r.get(1).map(String::as_str).unwrap_or("");
                (i + 1, key, value)
            })
            .collect()
    }

    /// Column headings as given (trimmed), by 0-based column.
    pub fn headings(&self) -> Vec<(usize, String)> {
        self.rows
            .get(self.heading_row - 1)
            .map(|r| r.iter().enumerate().map(|(c, h)| (c, h.trim().to_string())).collect())
            .unwrap_or_default()
    }

    /// Non-blank rows below the headings, with their 1-based row number.
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> + '_ {
        self.rows
            .iter()
            .enumerate()
            .skip(self.heading_row)
            .filter(|(_, r)| !is_blank(r))
            .map(|(i, r)| (i + 1, r.as_slice()))
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/* ------------------------------- Loading ------------------------------- */

pub fn parse_str(text: &str, format: InputFormat) -> IoResult<Document> {
    match format {
        InputFormat::Json => Ok(Document::Json(JsonDocument::parse(text)?)),
        InputFormat::Tabular => Ok(Document::Tabular(TabularSheet::parse(text)?)),
    }
}

/// Read `path` (bounded by `MAX_INPUT_BYTES`) and parse it. Without an
/// explicit format the extension decides, then the first byte.
pub fn load_path(path: &Path, format: Option<InputFormat>) -> IoResult<Document> {
    let f = File::open(path).map_err(|e| IoError::Path(format!("{} ({e})", path.display())))?;
    let mut buf = Vec::new();
    f.take(MAX_INPUT_BYTES + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > MAX_INPUT_BYTES {
        return Err(IoError::Limit(format!("{} exceeds {MAX_INPUT_BYTES} bytes", path.display())));
    }
    let text = String::from_utf8(buf)
        .map_err(|_| IoError::Unsupported(format!("{} is not UTF-8 text", path.display())))?;

    let format = format
        .or_else(|| InputFormat::from_path(path))
        .unwrap_or_else(|| sniff(&text));
    debug!(path = %path.display(), ?format, bytes = text.len(), "loading document");
    parse_str(&text, format)
}

fn sniff(text: &str) -> InputFormat {
    match strip_bom(text).trim_start().chars().next() {
        Some('{') | Some('[') => InputFormat::Json,
        _ => InputFormat::Tabular,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "Report_Name\tTitle Master Report\r\nReport_ID\tTR\n\nTitle\tMetric_Type\tJan-2024\nA\tTotal_Item_Requests\t3\n\nB\tUnique_Item_Requests\t1\n";

    #[test]
    fn resolves_header_block_and_headings() {
        let s = TabularSheet::parse(SHEET).unwrap();
        assert_eq!(s.heading_row(), 4);
        assert_eq!(s.header_block(), vec![(1, "Report_Name", "Title Master Report"), (2, "Report_ID", "TR")]);
        assert_eq!(s.headings()[2], (2, "Jan-2024".to_string()));
        let rows: Vec<usize> = s.data_rows().map(|(r, _)| r).collect();
        assert_eq!(rows, [5, 7]);
        assert_eq!(s.cell(7, 0), Some("B"));
        assert_eq!(s.cell(0, 0), None);
    }

    #[test]
    fn sheet_without_headings_is_rejected() {
        assert!(matches!(TabularSheet::parse("Report_ID\tTR\n"), Err(IoError::Tabular { .. })));
    }

    #[test]
    fn load_detects_format_by_extension_then_content() {
        let dir = tempfile::tempdir().unwrap();
        let j = dir.path().join("report.json");
        std::fs::write(&j, "\u{feff}{\"Report_Header\":{}}").unwrap();
        assert!(matches!(load_path(&j, None).unwrap(), Document::Json(_)));

        let t = dir.path().join("report.dat");
        std::fs::write(&t, SHEET).unwrap();
        assert_eq!(load_path(&t, None).unwrap().format(), InputFormat::Tabular);
        assert!(load_path(&dir.path().join("missing.json"), None).is_err());
    }
}
