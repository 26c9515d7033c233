//! crates/cv_pipeline/src/report.rs
//! The validated report: header, resolved context and the reconciled
//! `Report_Items` tree.

use serde_json::{Map, Value};
use tracing::debug;

use crate::collection::MergeCollection;
use crate::context::{ParseCtx, ReportContext};
use crate::entity::Node;
use crate::fragment::Fragment;
use crate::header::{header_json, ReportHeader};
use crate::normalize::body_json;
use crate::r5;
use crate::r51;
use crate::PipelineError;

/// Top-level container, shaped by release and master report.
#[derive(Debug)]
pub enum ReportBody {
    /// Items own their components; parents are interned by hash.
    R5 { items: MergeCollection<r5::ReportItem>, parents: MergeCollection<r5::ItemParent> },
    R51Items(MergeCollection<r51::ReportItem>),
    /// IR: each top-level record is a parent with `Items`.
    R51Parents(MergeCollection<r51::ParentItem>),
}

impl ReportBody {
    pub fn for_report(report: &ReportContext) -> Self {
        match report.release {
            cv_core::rules::Release::R5 => ReportBody::R5 {
                items: MergeCollection::new("Report_Item"),
                parents: MergeCollection::new("Item_Parent"),
            },
            cv_core::rules::Release::R51 if report.is_ir() => {
                ReportBody::R51Parents(MergeCollection::new("Report_Item"))
            }
            cv_core::rules::Release::R51 => ReportBody::R51Items(MergeCollection::new("Report_Item")),
        }
    }

    /// Parse one raw `Report_Items` record and insert or merge it.
    pub fn ingest(&mut self, fragment: Fragment, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        match self {
            ReportBody::R5 { items, parents } => {
                let mut item = r5::ReportItem::new(fragment);
                item.ensure_parsed(ctx)?;
                if let Some(parent) = item.take_parent() {
                    parents.intern(parent, ctx)?;
                }
                items.insert(item, ctx)
            }
            ReportBody::R51Items(items) => items.insert(r51::ReportItem::new(fragment), ctx),
            ReportBody::R51Parents(parents) => parents.insert(r51::ParentItem::new(fragment), ctx),
        }
    }

    pub fn store_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        match self {
            ReportBody::R5 { items, parents } => {
                parents.store_data(ctx)?;
                items.store_data(ctx)
            }
            ReportBody::R51Items(items) => items.store_data(ctx),
            ReportBody::R51Parents(parents) => parents.store_data(ctx),
        }
    }

    /// Re-settle usability after relation checks invalidated leaves.
    pub fn refresh(&mut self) {
        match self {
            ReportBody::R5 { items, .. } => items.entries_mut().iter_mut().for_each(r5::ReportItem::refresh),
            ReportBody::R51Items(items) => items.entries_mut().iter_mut().for_each(r51::ReportItem::refresh),
            ReportBody::R51Parents(parents) => {
                parents.entries_mut().iter_mut().for_each(r51::ParentItem::refresh)
            }
        }
    }

    /// `(kept, dropped, degraded)` of the top-level container.
    pub fn summary(&self) -> (usize, usize, bool) {
        let f = match self {
            ReportBody::R5 { items, .. } => {
                let f = items.finalize();
                (f.usable.len(), f.dropped, f.degraded)
            }
            ReportBody::R51Items(items) => {
                let f = items.finalize();
                (f.usable.len(), f.dropped, f.degraded)
            }
            ReportBody::R51Parents(parents) => {
                let f = parents.finalize();
                (f.usable.len(), f.dropped, f.degraded)
            }
        };
        debug!(kept = f.0, dropped = f.1, degraded = f.2, "Report_Items finalized");
        f
    }
}

/// A validated report. Built by [`crate::validate_document`].
#[derive(Debug)]
pub struct Report {
    header: ReportHeader,
    context: ReportContext,
    body: ReportBody,
}

impl Report {
    pub(crate) fn new(header: ReportHeader, context: ReportContext, body: ReportBody) -> Self {
        Self { header, context, body }
    }

    pub fn header(&self) -> &ReportHeader {
        &self.header
    }

    pub fn context(&self) -> &ReportContext {
        &self.context
    }

    pub fn body(&self) -> &ReportBody {
        &self.body
    }

    /// Number of usable top-level records.
    pub fn usable_items(&self) -> usize {
        self.body.summary().0
    }

    /// `{Report_Header, Report_Items}` in the report's release shape.
    pub fn to_normalized_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("Report_Header".into(), Value::Object(header_json(&self.header, &self.context)));
        out.insert("Report_Items".into(), body_json(&self.body, &self.context));
        Value::Object(out)
    }
}
