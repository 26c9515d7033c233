//! crates/cv_pipeline/src/normalize.rs
//! Normalized JSON of the accepted data.
//!
//! Only usable nodes are written and rejected values are left out. Field
//! order comes from `FieldMap`, and canonical serialization sorts keys on
//! output anyway.

use serde_json::{Map, Value};

use cv_core::value::{FieldMap, FieldValue};

use crate::collection::MergeCollection;
use crate::context::ReportContext;
use crate::entity::Node;
use crate::fields::identifiers_json;
use crate::performance::{metrics_json, periods_json};
use crate::r5;
use crate::r51;
use crate::report::ReportBody;

/// JSON of one accepted field in the report's release shape.
pub fn field_json(name: &str, value: &FieldValue, report: &ReportContext) -> Value {
    match value {
        FieldValue::Map(ids) if report.identifier_fields.contains(name) => identifiers_json(ids, report.release),
        other => plain_json(other),
    }
}

fn plain_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Int(i) => Value::from(*i),
        FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        FieldValue::List(items) => Value::Array(items.iter().map(plain_json).collect()),
        FieldValue::Map(m) => Value::Object(m.iter().map(|(k, v)| (k.clone(), plain_json(v))).collect()),
        FieldValue::Ref(h) => Value::String(h.clone()),
    }
}

fn data_json(data: &FieldMap, report: &ReportContext) -> Map<String, Value> {
    data.iter().map(|(k, v)| (k.clone(), field_json(k, v, report))).collect()
}

fn usable_json<E: Node>(children: &MergeCollection<E>, f: impl Fn(&E) -> Value) -> Value {
    Value::Array(children.usable().map(f).collect())
}

/* -------------------------------- Release 5 ------------------------------- */

fn r5_item_json(item: &r5::ReportItem, parents: &MergeCollection<r5::ItemParent>, report: &ReportContext) -> Value {
    let mut out = data_json(&item.entity().data, report);
    out.remove("Item_Parent");
    if let Some(parent) = item.parent_hash().and_then(|h| parents.get(h)) {
        out.insert("Item_Parent".into(), Value::Object(data_json(&parent.entity().data, report)));
    }
    if item.components().usable_count() > 0 {
        let components = usable_json(item.components(), |c| {
            let mut json = data_json(&c.entity().data, report);
            json.insert("Performance".into(), periods_json(c.performance()));
            Value::Object(json)
        });
        out.insert("Item_Component".into(), components);
    }
    if !item.performance().is_empty() {
        out.insert("Performance".into(), periods_json(item.performance()));
    }
    Value::Object(out)
}

/* ------------------------------- Release 5.1 ------------------------------ */

fn r51_block_json(block: &r51::AttributeBlock, report: &ReportContext) -> Value {
    let mut out = data_json(&block.entity().data, report);
    if !block.performance().is_empty() {
        out.insert("Performance".into(), metrics_json(block.performance()));
    }
    if block.components().usable_count() > 0 {
        let components = usable_json(block.components(), |c| {
            let mut json = data_json(&c.entity().data, report);
            json.insert("Performance".into(), metrics_json(c.performance()));
            Value::Object(json)
        });
        out.insert("Components".into(), components);
    }
    Value::Object(out)
}

fn r51_item_json(item: &r51::ReportItem, report: &ReportContext) -> Value {
    let mut out = data_json(&item.entity().data, report);
    out.insert("Attribute_Performance".into(), usable_json(item.blocks(), |b| r51_block_json(b, report)));
    Value::Object(out)
}

fn r51_parent_json(parent: &r51::ParentItem, report: &ReportContext) -> Value {
    let mut out = data_json(&parent.entity().data, report);
    out.insert("Items".into(), usable_json(parent.items(), |i| r51_item_json(i, report)));
    Value::Object(out)
}

/// `Report_Items` of the normalized report.
pub fn body_json(body: &ReportBody, report: &ReportContext) -> Value {
    match body {
        ReportBody::R5 { items, parents } => usable_json(items, |i| r5_item_json(i, parents, report)),
        ReportBody::R51Items(items) => usable_json(items, |i| r51_item_json(i, report)),
        ReportBody::R51Parents(parents) => usable_json(parents, |p| r51_parent_json(p, report)),
    }
}
