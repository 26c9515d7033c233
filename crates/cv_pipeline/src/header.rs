//! crates/cv_pipeline/src/header.rs
//! Report_Header: resolves the report profile and the rule-table key, and
//! validates the filters and attributes that shape item validation.

use serde_json::{Map, Value};
use tracing::debug;

use cv_core::diagnostics::{DiagnosticSink, Position};
use cv_core::month::parse_date;
use cv_core::rules::{NodeContext, Release, RuleTables, Serialization};
use cv_core::value::{FieldMap, FieldValue};

use crate::context::{IdentifierFormats, ParseCtx, ReportContext};
use crate::entity::{Entity, Node};
use crate::fields::{check_required, parse_fields, show};
use crate::fragment::Fragment;
use crate::{EngineOptions, PipelineError};

const REPORT_ATTRIBUTES: &[&str] = &[
    "Attributes_To_Show",
    "Include_Component_Details",
    "Include_Parent_Details",
    "Exclude_Monthly_Details",
    "Granularity",
];

#[derive(Debug)]
pub struct ReportHeader {
    entity: Entity,
}

impl ReportHeader {
    pub fn new(fragment: Fragment) -> Self {
        Self { entity: Entity::new("Report_Header", fragment) }
    }

    pub fn filters(&self) -> Option<&FieldMap> {
        self.entity.data.get("Report_Filters").and_then(FieldValue::as_map)
    }

    pub fn attributes(&self) -> Option<&FieldMap> {
        self.entity.data.get("Report_Attributes").and_then(FieldValue::as_map)
    }

    /// Apply `Report_Attributes` to the context items are validated with.
    fn settle(&self, report: &mut ReportContext) {
        let Some(attrs) = self.attributes() else {
            return;
        };
        if let Some(FieldValue::List(shown)) = attrs.get("Attributes_To_Show") {
            report.attributes_to_show = shown.iter().filter_map(|v| v.as_text().map(str::to_string)).collect();
        }
        let flag = |name: &str| attrs.get(name).and_then(FieldValue::as_text).map(|v| v.eq_ignore_ascii_case("True"));
        if report.profile.supports_parents {
            if let Some(on) = flag("Include_Parent_Details") {
                report.include_parent_details = on;
            }
        }
        if report.profile.supports_components {
            report.include_component_details = flag("Include_Component_Details").unwrap_or(false);
        }
    }

    fn parse_filters(&mut self, ctx: &mut ParseCtx<'_>) {
        let fragment = self.entity.fragment().clone();
        let Some(value) = fragment.get("Report_Filters") else {
            return;
        };
        let mut filters = FieldMap::new();
        for (name, raw, pos) in named_values(&fragment, "Report_Filters", value, ctx) {
            let v = match filter_value(&raw) {
                Some(v) => v,
                None => {
                    ctx.sink.error("Wrong data type", format!("filter {name} must be a string"), &pos, Some(show(&raw)));
                    self.entity.reject(format!("Report_Filters.{name}"), raw);
                    continue;
                }
            };
            if matches!(name.as_str(), "Begin_Date" | "End_Date") {
                let text = v.scalar_string();
                // Requests may use YYYY-MM; reports carry full dates.
                if parse_date(&text).is_err() {
                    ctx.sink.error("Invalid date", format!("{name} must be YYYY-MM-DD"), &pos, Some(text));
                    self.entity.reject(format!("Report_Filters.{name}"), raw);
                    continue;
                }
            }
            if filters.contains_key(&name) {
                ctx.sink.error("Duplicate filter", format!("{name} is given more than once"), &pos, None);
                continue;
            }
            filters.insert(name, v);
        }
        let pos = fragment.field_position("Report_Filters");
        for required in ["Begin_Date", "End_Date"] {
            if !filters.contains_key(required) && !self.entity.invalid.contains_key(&format!("Report_Filters.{required}")) {
                ctx.sink.error("Required element missing", format!("{required} is missing from Report_Filters"), &pos, None);
            }
        }
        self.entity.data.insert("Report_Filters".into(), FieldValue::Map(filters));
    }

    fn parse_attributes(&mut self, ctx: &mut ParseCtx<'_>) {
        let fragment = self.entity.fragment().clone();
        let Some(value) = fragment.get("Report_Attributes") else {
            return;
        };
        let report = ctx.report;
        let profile = &report.profile;
        let mut attrs = FieldMap::new();
        for (name, raw, pos) in named_values(&fragment, "Report_Attributes", value, ctx) {
            if !REPORT_ATTRIBUTES.contains(&name.as_str()) {
                ctx.sink.error("Unknown element", format!("{name} is not a report attribute"), &pos, Some(show(&raw)));
                self.entity.reject(format!("Report_Attributes.{name}"), raw);
                continue;
            }
            if name == "Attributes_To_Show" {
                if profile.is_standard_view() {
                    ctx.sink.error(
                        "Unexpected attribute",
                        format!("standard view {} has a fixed set of attributes", profile.report_id),
                        &pos,
                        Some(show(&raw)),
                    );
                    self.entity.reject("Report_Attributes.Attributes_To_Show", raw);
                    continue;
                }
                let mut shown = Vec::new();
                for a in split_list(&raw) {
                    if profile.attributes.contains(&a) {
                        shown.push(FieldValue::Text(a));
                    } else {
                        ctx.sink.error(
                            "Invalid value",
                            format!("{a} cannot be shown in {}; permitted: {}", profile.report_id, profile.attributes.join(", ")),
                            &pos,
                            Some(a.clone()),
                        );
                    }
                }
                attrs.insert(name, FieldValue::List(shown));
                continue;
            }
            match filter_value(&raw) {
                Some(v) => {
                    attrs.insert(name, v);
                }
                None => {
                    ctx.sink.error("Wrong data type", format!("{name} must be a string"), &pos, Some(show(&raw)));
                    self.entity.reject(format!("Report_Attributes.{name}"), raw);
                }
            }
        }
        self.entity.data.insert("Report_Attributes".into(), FieldValue::Map(attrs));
    }
}

impl Node for ReportHeader {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let rules = ctx.rules(NodeContext::Header)?;
        parse_fields(&mut self.entity, rules, ctx);
        self.parse_filters(ctx);
        self.parse_attributes(ctx);
        check_required(&mut self.entity, rules, ctx);
        Ok(())
    }
}

/// `Name → value` pairs of a filter/attribute block, given either as
/// `[{Name, Value}]` (Release 5) or as an object (Release 5.1).
fn named_values(
    fragment: &Fragment,
    field: &str,
    value: &Value,
    ctx: &mut ParseCtx<'_>,
) -> Vec<(String, Value, Position)> {
    match value {
        Value::Array(items) => {
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let named = item.as_object().and_then(|o| Some((o.get("Name")?.as_str()?, o.get("Value")?)));
                match named {
                    Some((n, v)) => out.push((n.to_string(), v.clone(), fragment.element_position(field, i, n))),
                    None => {
                        let pos = fragment.element_position(field, i, "");
                        ctx.sink.error("Wrong data type", format!("{field} entries need Name and Value"), &pos, Some(show(item)));
                    }
                }
            }
            out
        }
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone(), fragment.sub_position(field, k))).collect(),
        other => {
            let pos = fragment.field_position(field);
            ctx.sink.error("Wrong data type", format!("{field} must be a list or an object"), &pos, Some(show(other)));
            Vec::new()
        }
    }
}

fn filter_value(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::String(s) => Some(FieldValue::Text(s.trim().to_string())),
        Value::Number(n) => Some(FieldValue::Text(n.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|i| i.as_str().map(|s| FieldValue::Text(s.trim().to_string())))
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::List),
        _ => None,
    }
}

/// `a|b`, `a; b` or `["a", "b"]`.
fn split_list(raw: &Value) -> Vec<String> {
    match raw {
        Value::String(s) => s
            .split(|c| c == '|' || c == ';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(|s| s.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Validate the header and resolve the report context. `None` after a Fatal.
pub fn parse_header(
    fragment: Fragment,
    serialization: Serialization,
    tables: &dyn RuleTables,
    formats: &IdentifierFormats,
    options: &EngineOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<Option<(ReportHeader, ReportContext)>, PipelineError> {
    let release_text = match fragment.get("Release") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let release: Release = match release_text.parse() {
        Ok(r) => r,
        Err(_) => {
            sink.fatal(
                "Unknown Release",
                format!("Release {release_text:?} is not supported; expected 5 or 5.1"),
                &fragment.field_position("Release"),
                None,
            );
            return Ok(None);
        }
    };

    let report_id = fragment.get("Report_ID").and_then(Value::as_str).map(str::trim).unwrap_or_default();
    let Some(profile) = tables.profile(report_id, release) else {
        sink.fatal(
            "Unknown Report_ID",
            format!("Report_ID {report_id:?} is not a Release {release} report"),
            &fragment.field_position("Report_ID"),
            None,
        );
        return Ok(None);
    };

    let mut report = ReportContext::new(profile, serialization, tables);
    let mut header = ReportHeader::new(fragment);
    {
        let mut ctx = ParseCtx { sink, tables, report: &report, formats, options };
        header.ensure_parsed(&mut ctx)?;
    }
    header.settle(&mut report);
    debug!(
        report_id = %report.report_id,
        release = %report.release,
        attributes = ?report.attributes_to_show,
        parents = report.include_parent_details,
        components = report.include_component_details,
        "header resolved"
    );
    Ok(Some((header, report)))
}

/// Header JSON in the report's release shape.
pub fn header_json(header: &ReportHeader, report: &ReportContext) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in &header.entity.data {
        let json = match (name.as_str(), value) {
            ("Report_Filters" | "Report_Attributes", FieldValue::Map(m)) => named_json(m, report.release),
            _ => crate::normalize::field_json(name, value, report),
        };
        out.insert(name.clone(), json);
    }
    out
}

fn named_json(map: &FieldMap, release: Release) -> Value {
    let scalar = |v: &FieldValue| match v {
        FieldValue::List(items) => items.iter().map(FieldValue::scalar_string).collect::<Vec<_>>().join("|"),
        other => other.scalar_string(),
    };
    match release {
        Release::R5 => Value::Array(
            map.iter()
                .map(|(k, v)| {
                    let mut entry = Map::new();
                    entry.insert("Name".into(), Value::String(k.clone()));
                    entry.insert("Value".into(), Value::String(scalar(v)));
                    Value::Object(entry)
                })
                .collect(),
        ),
        Release::R51 => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let json = match v {
                        FieldValue::List(items) => {
                            Value::Array(items.iter().map(|i| Value::String(i.scalar_string())).collect())
                        }
                        other => Value::String(other.scalar_string()),
                    };
                    (k.clone(), json)
                })
                .collect(),
        ),
    }
}
