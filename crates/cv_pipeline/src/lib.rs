//! cv_pipeline — COUNTER Report-Item reconciliation (header → items → merge → relations → normalized output)
//! This crate performs no I/O: documents arrive already loaded by `cv_io`, rule tables
//! come in through `RuleTables`, and findings leave through a `DiagnosticSink`.
//!
//! Stages of `validate_document`:
//! 1. resolve the header (Fatal on unknown Release / Report_ID)
//! 2. parse each `Report_Items` record lazily and insert it into its hash-keyed container
//! 3. strip zero counts and settle usability (`store_data`)
//! 4. check metric relations over grouped usage and drop offending records
//! 5. serve the accepted tree as normalized JSON (`Report::to_normalized_json`)

#![forbid(unsafe_code)]

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use cv_core::diagnostics::{DiagnosticSink, Position, Severity};
use cv_core::errors::LogicError;
use cv_core::rules::{Release, RuleTables, Serialization};
use cv_io::document::{Document, TabularSheet};

pub mod collection;
pub mod context;
pub mod entity;
pub mod fields;
pub mod fragment;
pub mod header;
pub mod normalize;
pub mod performance;
pub mod r5;
pub mod r51;
pub mod relations;
pub mod report;
pub mod tabular;

use context::{IdentifierFormats, ParseCtx, ReportContext};
use fragment::Fragment;
use header::{parse_header, ReportHeader};
use report::{Report, ReportBody};

pub use entity::{Mergeable, Node};

/// Structural failures of the engine itself. Data problems are diagnostics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("logic error: {0}")]
    Logic(#[from] LogicError),

    #[error("identifier pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("no rule table for {0}")]
    MissingRules(String),
}

/// Knobs of one validation run.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Lowest severity that makes a run fail (used by callers for exit status).
    pub fail_on: Severity,
    /// Emit a Notice for each clean merge of repeated JSON records.
    pub merge_notices: bool,
    /// Run the cross-metric relation checks.
    pub check_relations: bool,
    /// Release the caller expects; a different header Release is Fatal.
    pub expect_release: Option<Release>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { fail_on: Severity::Error, merge_notices: true, check_relations: true, expect_release: None }
    }
}

const TOP_LEVEL: &[&str] = &["Report_Header", "Report_Items"];

/// Validate one loaded document. `Ok(None)` means a Fatal diagnostic
/// stopped processing before any item was looked at.
pub fn validate_document(
    document: &Document,
    tables: &dyn RuleTables,
    sink: &mut dyn DiagnosticSink,
    options: &EngineOptions,
) -> Result<Option<Report>, PipelineError> {
    let formats = IdentifierFormats::new()?;
    match document {
        Document::Json(doc) => validate_json(&doc.root, tables, &formats, sink, options),
        Document::Tabular(sheet) => validate_sheet(sheet, tables, &formats, sink, options),
    }
}

fn validate_json(
    root: &Value,
    tables: &dyn RuleTables,
    formats: &IdentifierFormats,
    sink: &mut dyn DiagnosticSink,
    options: &EngineOptions,
) -> Result<Option<Report>, PipelineError> {
    let top = Position::root();
    let Value::Object(root) = root else {
        sink.fatal("Invalid report", "the document root must be an object".into(), &Position::Document, None);
        return Ok(None);
    };
    for key in root.keys().filter(|k| !TOP_LEVEL.contains(&k.as_str())) {
        sink.error("Unknown element", format!("{key} is not a top-level element of a report"), &top.key(key), None);
    }
    let Some(Value::Object(header)) = root.get("Report_Header") else {
        sink.fatal("Report_Header missing", "Report_Header must be an object".into(), &top.key("Report_Header"), None);
        return Ok(None);
    };
    let header_fragment = Fragment::json(header.clone(), top.key("Report_Header"));
    let Some((header, report)) =
        resolve_header(header_fragment, Serialization::Json, tables, formats, sink, options)?
    else {
        return Ok(None);
    };

    let items_pos = top.key("Report_Items");
    let records: Vec<Fragment> = match root.get("Report_Items") {
        Some(Value::Array(list)) => list
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                Value::Object(o) => Some(Fragment::json(o.clone(), items_pos.index(i))),
                other => {
                    sink.error(
                        "Wrong data type",
                        "Report_Items entries must be objects".into(),
                        &items_pos.index(i),
                        Some(fields::show(other)),
                    );
                    None
                }
            })
            .collect(),
        _ => {
            sink.fatal("Report_Items missing", "Report_Items must be a list".into(), &items_pos, None);
            return Ok(None);
        }
    };
    reconcile(header, report, records, tables, formats, sink, options).map(Some)
}

fn validate_sheet(
    sheet: &TabularSheet,
    tables: &dyn RuleTables,
    formats: &IdentifierFormats,
    sink: &mut dyn DiagnosticSink,
    options: &EngineOptions,
) -> Result<Option<Report>, PipelineError> {
    let header_fragment = tabular::header_fragment(sheet, sink);
    let Some((header, report)) =
        resolve_header(header_fragment, Serialization::Tabular, tables, formats, sink, options)?
    else {
        return Ok(None);
    };
    let records = tabular::row_fragments(sheet, &report, sink);
    reconcile(header, report, records, tables, formats, sink, options).map(Some)
}

fn resolve_header(
    fragment: Fragment,
    serialization: Serialization,
    tables: &dyn RuleTables,
    formats: &IdentifierFormats,
    sink: &mut dyn DiagnosticSink,
    options: &EngineOptions,
) -> Result<Option<(ReportHeader, ReportContext)>, PipelineError> {
    let release_pos = fragment.field_position("Release");
    let Some((header, report)) = parse_header(fragment, serialization, tables, formats, options, sink)? else {
        warn!("header rejected; no items processed");
        return Ok(None);
    };
    if let Some(expected) = options.expect_release.filter(|r| *r != report.release) {
        sink.fatal(
            "Unexpected Release",
            format!("expected a Release {expected} report, found Release {}", report.release),
            &release_pos,
            None,
        );
        return Ok(None);
    }
    Ok(Some((header, report)))
}

fn reconcile(
    header: ReportHeader,
    report: ReportContext,
    records: Vec<Fragment>,
    tables: &dyn RuleTables,
    formats: &IdentifierFormats,
    sink: &mut dyn DiagnosticSink,
    options: &EngineOptions,
) -> Result<Report, PipelineError> {
    let mut body = ReportBody::for_report(&report);
    let given = records.len();
    {
        let mut ctx = ParseCtx { sink, tables, report: &report, formats, options };
        for record in records {
            body.ingest(record, &mut ctx)?;
        }
        body.store_data(&mut ctx)?;
        if options.check_relations {
            let violations = relations::check_report(&mut body, &mut ctx);
            debug!(violations, "relations done");
        }
        body.refresh();
    }
    let (kept, dropped, degraded) = body.summary();
    info!(
        report_id = %report.report_id,
        release = %report.release,
        records = given,
        kept,
        dropped,
        degraded,
        "Report_Items reconciled"
    );
    Ok(Report::new(header, report, body))
}

pub mod prelude {
    pub use crate::report::{Report, ReportBody};
    pub use crate::{validate_document, EngineOptions, PipelineError};
    pub use crate::{Mergeable, Node};
}
