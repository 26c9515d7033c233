//! crates/cv_pipeline/src/tabular.rs
//! Tabular sheets to JSON-shaped fragments.
//!
//! The header block (column A key, column B value) becomes a `Report_Header`
//! object and every data row becomes one `Report_Items` record in the
//! report's release shape. Each field path is registered with the cell it
//! came from, so diagnostics point at spreadsheet cells.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::debug;

use cv_core::diagnostics::{DiagnosticSink, Position};
use cv_core::month::Month;
use cv_core::rules::Release;
use cv_io::document::TabularSheet;

use crate::context::ReportContext;
use crate::fragment::{Fragment, SheetCells};

/* --------------------------------- Header --------------------------------- */

/// `a=b; c=d` pairs of the `Report_Filters` / `Report_Attributes` rows.
fn key_values(text: &str) -> Vec<(String, String)> {
    text.split(';')
        .filter_map(|part| {
            let (k, v) = part.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `Type:Value; Type:Value` identifier lists. `Proprietary` values keep
/// their own `namespace:value` colon.
fn typed_ids(text: &str) -> Option<Map<String, Value>> {
    let mut out: Map<String, Value> = Map::new();
    for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (t, v) = part.split_once(':')?;
        let (t, v) = (t.trim().to_string(), Value::String(v.trim().to_string()));
        match out.get_mut(&t) {
            Some(Value::Array(list)) => list.push(v),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, v]);
            }
            None => {
                out.insert(t, v);
            }
        }
    }
    Some(out)
}

fn named_block(pairs: Vec<(String, Value)>, release: Release) -> Value {
    match release {
        Release::R5 => Value::Array(
            pairs
                .into_iter()
                .map(|(name, value)| {
                    let mut entry = Map::new();
                    entry.insert("Name".into(), Value::String(name));
                    entry.insert("Value".into(), value);
                    Value::Object(entry)
                })
                .collect(),
        ),
        Release::R51 => Value::Object(pairs.into_iter().collect()),
    }
}

/// R5.1 lists multi-valued filters and attributes as arrays.
fn filter_json(value: &str, release: Release) -> Value {
    match release {
        Release::R51 if value.contains('|') => {
            Value::Array(value.split('|').map(|v| Value::String(v.trim().to_string())).collect())
        }
        _ => Value::String(value.to_string()),
    }
}

/// The header block as a `Report_Header` fragment.
pub fn header_fragment(sheet: &TabularSheet, sink: &mut dyn DiagnosticSink) -> Fragment {
    let block = sheet.header_block();
    let release = block
        .iter()
        .find(|(_, k, _)| k.trim() == "Release")
        .and_then(|(_, _, v)| v.trim().parse::<Release>().ok())
        .unwrap_or(Release::R51);

    let mut cells = SheetCells::new(Position::cell(0, 1));
    let mut header = Map::new();
    let mut filters: Vec<(String, Value)> = Vec::new();

    for (row, key, value) in block {
        let (key, value) = (key.trim(), value.trim());
        let cell = Position::cell(1, row);
        if value.is_empty() {
            continue;
        }
        match key {
            "Report_Filters" => {
                for (name, v) in key_values(value) {
                    cells.fields.insert(format!("Report_Filters.{name}"), cell.clone());
                    filters.push((name, filter_json(&v, release)));
                }
                cells.fields.insert(key.into(), cell);
            }
            "Report_Attributes" => {
                let attrs: Vec<(String, Value)> = key_values(value)
                    .into_iter()
                    .map(|(name, v)| {
                        cells.fields.insert(format!("Report_Attributes.{name}"), cell.clone());
                        let json = if name == "Attributes_To_Show" && release == Release::R51 {
                            Value::Array(v.split('|').map(|a| Value::String(a.trim().to_string())).collect())
                        } else {
                            Value::String(v)
                        };
                        (name, json)
                    })
                    .collect();
                header.insert(key.into(), named_block(attrs, release));
                cells.fields.insert(key.into(), cell);
            }
            "Reporting_Period" => {
                for (name, v) in key_values(value) {
                    cells.fields.insert(format!("Report_Filters.{name}"), cell.clone());
                    filters.push((name, Value::String(v)));
                }
            }
            "Metric_Types" if release == Release::R51 => {
                cells.fields.insert("Report_Filters.Metric_Type".into(), cell.clone());
                filters.push(("Metric_Type".into(), filter_json(&value.replace(';', "|"), release)));
            }
            "Institution_ID" => match typed_ids(value) {
                Some(ids) => {
                    for t in ids.keys() {
                        cells.fields.insert(format!("Institution_ID.{t}"), cell.clone());
                    }
                    header.insert(key.into(), Value::Object(ids));
                    cells.fields.insert(key.into(), cell);
                }
                None => sink.error(
                    "Invalid identifier list",
                    "Institution_ID must be a list of Type:Value pairs".into(),
                    &cell,
                    Some(value.to_string()),
                ),
            },
            _ => {
                header.insert(key.into(), Value::String(value.to_string()));
                cells.fields.insert(key.into(), cell);
            }
        }
    }
    if !filters.is_empty() {
        header.insert("Report_Filters".into(), named_block(filters, release));
    }
    Fragment::sheet(header, Rc::new(cells))
}

/* ---------------------------------- Rows ---------------------------------- */

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Target {
    Item,
    Parent,
    Component,
    /// Attribute fields: the item itself (R5) or its block (R5.1).
    Attributes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Kind {
    Text(&'static str),
    /// One `Item_ID` type.
    Id(&'static str),
    /// A `Type:Value` list (`Publisher_ID`).
    IdList(&'static str),
    Authors,
    PublicationDate,
    ArticleVersion,
    Metric,
    Total,
    Month(Month),
}

fn id_type(heading: &str) -> Option<&'static str> {
    Some(match heading {
        "DOI" => "DOI",
        "ISBN" => "ISBN",
        "Print_ISSN" => "Print_ISSN",
        "Online_ISSN" => "Online_ISSN",
        "URI" => "URI",
        "Proprietary_ID" => "Proprietary",
        _ => return None,
    })
}

/// Fields of a `Parent_`/`Component_` prefixed heading.
fn related_kind(rest: &str, release: Release) -> Option<Kind> {
    if let Some(t) = id_type(rest) {
        return Some(Kind::Id(t));
    }
    Some(match rest {
        "Title" if release == Release::R5 => Kind::Text("Item_Name"),
        "Title" => Kind::Text("Title"),
        "Data_Type" => Kind::Text("Data_Type"),
        "Authors" => Kind::Authors,
        "Publication_Date" => Kind::PublicationDate,
        "Article_Version" => Kind::ArticleVersion,
        _ => return None,
    })
}

fn classify(heading: &str, release: Release) -> Option<(Target, Kind)> {
    if let Ok(m) = Month::from_heading(heading) {
        return Some((Target::Item, Kind::Month(m)));
    }
    if let Some(rest) = heading.strip_prefix("Parent_") {
        return related_kind(rest, release).map(|k| (Target::Parent, k));
    }
    if let Some(rest) = heading.strip_prefix("Component_") {
        if release == Release::R5 {
            return related_kind(rest, release).map(|k| (Target::Component, k));
        }
        return None;
    }
    if let Some(t) = id_type(heading) {
        return Some((Target::Item, Kind::Id(t)));
    }
    Some(match heading {
        "Title" => (Target::Item, Kind::Text("Title")),
        "Item" => (Target::Item, Kind::Text("Item")),
        "Database" => (Target::Item, Kind::Text("Database")),
        "Platform" => (Target::Item, Kind::Text("Platform")),
        "Publisher" => (Target::Item, Kind::Text("Publisher")),
        "Publisher_ID" => (Target::Item, Kind::IdList("Publisher_ID")),
        "Authors" => (Target::Item, Kind::Authors),
        "Publication_Date" => (Target::Item, Kind::PublicationDate),
        "Article_Version" => (Target::Item, Kind::ArticleVersion),
        "Data_Type" => (Target::Attributes, Kind::Text("Data_Type")),
        "Section_Type" => (Target::Attributes, Kind::Text("Section_Type")),
        "YOP" => (Target::Attributes, Kind::Text("YOP")),
        "Access_Type" => (Target::Attributes, Kind::Text("Access_Type")),
        "Access_Method" => (Target::Attributes, Kind::Text("Access_Method")),
        "Metric_Type" => (Target::Item, Kind::Metric),
        "Reporting_Period_Total" => (Target::Item, Kind::Total),
        _ => return None,
    })
}

/// Record paths of each target, by release and tree shape.
struct Layout {
    release: Release,
    item: &'static str,
    parent: &'static str,
    component: &'static str,
    attributes: &'static str,
}

impl Layout {
    fn for_report(report: &ReportContext) -> Self {
        match report.release {
            Release::R5 => Self {
                release: Release::R5,
                item: "",
                parent: "Item_Parent",
                component: "Item_Component",
                attributes: "",
            },
            Release::R51 if report.is_ir() => Self {
                release: Release::R51,
                item: "Items",
                parent: "",
                component: "",
                attributes: "Items.Attribute_Performance",
            },
            Release::R51 => Self {
                release: Release::R51,
                item: "",
                parent: "",
                component: "",
                attributes: "Attribute_Performance",
            },
        }
    }

    fn prefix(&self, target: Target) -> &'static str {
        match target {
            Target::Item => self.item,
            Target::Parent => self.parent,
            Target::Component => self.component,
            Target::Attributes => self.attributes,
        }
    }
}

fn path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// `Type/Value` entry of the Release 5 structured lists.
fn typed_entry(t: &str, key: &str, value: &str) -> Value {
    let mut entry = Map::new();
    entry.insert("Type".into(), Value::String(t.into()));
    entry.insert(key.into(), Value::String(value.into()));
    Value::Object(entry)
}

/// One row under construction.
#[derive(Default)]
struct Row {
    item: Map<String, Value>,
    parent: Map<String, Value>,
    component: Map<String, Value>,
    attributes: Map<String, Value>,
    metric: Option<String>,
    months: Map<String, Value>,
}

impl Row {
    fn target(&mut self, target: Target) -> &mut Map<String, Value> {
        match target {
            Target::Item => &mut self.item,
            Target::Parent => &mut self.parent,
            Target::Component => &mut self.component,
            Target::Attributes => &mut self.attributes,
        }
    }

    fn put_id(&mut self, target: Target, field: &str, id_type: &str, value: &str) {
        let ids = self.target(target).entry(field).or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ids) = ids {
            ids.insert(id_type.into(), Value::String(value.into()));
        }
    }
}

/// Data rows as `Report_Items` fragments.
pub fn row_fragments(sheet: &TabularSheet, report: &ReportContext, sink: &mut dyn DiagnosticSink) -> Vec<Fragment> {
    let layout = Layout::for_report(report);
    let heading_row = sheet.heading_row();
    let mut columns: Vec<(usize, Target, Kind)> = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for (col, heading) in sheet.headings() {
        if heading.is_empty() {
            continue;
        }
        let pos = Position::cell(col, heading_row);
        if let Some(first) = seen.insert(heading.clone(), col) {
            sink.error(
                "Duplicate column",
                format!("{heading} also heads column {}", Position::cell(first, heading_row)),
                &pos,
                None,
            );
            continue;
        }
        match classify(&heading, layout.release) {
            Some((target, kind)) => columns.push((col, target, kind)),
            None => sink.error("Unknown column", format!("{heading} is not a column of {}", report.report_id), &pos, None),
        }
    }
    if !columns.iter().any(|(_, _, k)| matches!(k, Kind::Month(_))) {
        sink.error(
            "Monthly details missing",
            "no month columns; usage cannot be assigned to months".into(),
            &Position::cell(0, heading_row),
            None,
        );
    }

    let rows: Vec<Fragment> = sheet
        .data_rows()
        .map(|(row_no, cells)| row_fragment(row_no, cells, &columns, &layout, sink))
        .collect();
    debug!(rows = rows.len(), columns = columns.len(), "tabular rows converted");
    rows
}

fn row_fragment(
    row_no: usize,
    cells: &[String],
    columns: &[(usize, Target, Kind)],
    layout: &Layout,
    sink: &mut dyn DiagnosticSink,
) -> Fragment {
    let mut sheet_cells = SheetCells::new(Position::cell(0, row_no));
    let mut row = Row::default();
    let mut total: Option<(u64, Position)> = None;
    // `None` once the months overflow a Count.
    let mut month_sum: Option<u64> = Some(0);
    let r5 = layout.release == Release::R5;

    for (col, target, kind) in columns {
        let text = cells.get(*col).map(|c| c.trim()).unwrap_or("");
        let pos = Position::cell(*col, row_no);
        let prefix = layout.prefix(*target);
        match kind {
            Kind::Month(m) => {
                sheet_cells.months.insert(*m, pos.clone());
                if text.is_empty() {
                    sink.error("Count missing", format!("no count for {m}; report 0 for months without usage"), &pos, None);
                    continue;
                }
                match text.parse::<u64>() {
                    Ok(c) => {
                        month_sum = match month_sum.map(|s| s.checked_add(c)) {
                            Some(None) => {
                                sink.error(
                                    "Invalid Count",
                                    "the months of this row add up to more than a Count can hold".into(),
                                    &pos,
                                    Some(text.into()),
                                );
                                None
                            }
                            other => other.flatten(),
                        };
                        row.months.insert(m.to_string(), Value::from(c));
                    }
                    Err(_) => {
                        sink.error("Invalid Count", "Count must be a non-negative integer".into(), &pos, Some(text.into()))
                    }
                }
                continue;
            }
            Kind::Total => {
                match text.parse::<u64>() {
                    Ok(t) => total = Some((t, pos)),
                    Err(_) => sink.error(
                        "Invalid Count",
                        "Reporting_Period_Total must be a non-negative integer".into(),
                        &pos,
                        Some(text.into()),
                    ),
                }
                continue;
            }
            _ => {}
        }
        if text.is_empty() {
            continue;
        }
        match kind {
            Kind::Text(field) => {
                row.target(*target).insert((*field).into(), Value::String(text.into()));
                sheet_cells.fields.insert(path(prefix, field), pos);
            }
            Kind::Id(t) => {
                row.put_id(*target, "Item_ID", t, text);
                sheet_cells.fields.insert(path(prefix, &format!("Item_ID.{t}")), pos.clone());
                sheet_cells.fields.entry(path(prefix, "Item_ID")).or_insert(pos);
            }
            Kind::IdList(field) => match typed_ids(text) {
                Some(ids) => {
                    for t in ids.keys() {
                        sheet_cells.fields.insert(path(prefix, &format!("{field}.{t}")), pos.clone());
                    }
                    row.target(*target).insert((*field).into(), Value::Object(ids));
                    sheet_cells.fields.insert(path(prefix, field), pos);
                }
                None => sink.error(
                    "Invalid identifier list",
                    format!("{field} must be a list of Type:Value pairs"),
                    &pos,
                    Some(text.into()),
                ),
            },
            Kind::Authors => {
                let names = text.split(';').map(str::trim).filter(|n| !n.is_empty());
                let (field, list): (&str, Vec<Value>) = if r5 {
                    ("Item_Contributors", names.map(|n| typed_entry("Author", "Name", n)).collect())
                } else {
                    (
                        "Authors",
                        names
                            .map(|n| {
                                let mut a = Map::new();
                                a.insert("Name".into(), Value::String(n.into()));
                                Value::Object(a)
                            })
                            .collect(),
                    )
                };
                row.target(*target).insert(field.into(), Value::Array(list));
                sheet_cells.fields.insert(path(prefix, field), pos);
            }
            Kind::PublicationDate if r5 => {
                let dates = vec![typed_entry("Publication_Date", "Value", text)];
                row.target(*target).insert("Item_Dates".into(), Value::Array(dates));
                sheet_cells.fields.insert(path(prefix, "Item_Dates"), pos);
            }
            Kind::PublicationDate => {
                row.target(*target).insert("Publication_Date".into(), Value::String(text.into()));
                sheet_cells.fields.insert(path(prefix, "Publication_Date"), pos);
            }
            Kind::ArticleVersion if r5 => {
                let attrs = vec![typed_entry("Article_Version", "Value", text)];
                row.target(*target).insert("Item_Attributes".into(), Value::Array(attrs));
                sheet_cells.fields.insert(path(prefix, "Item_Attributes"), pos);
            }
            Kind::ArticleVersion => {
                row.target(*target).insert("Article_Version".into(), Value::String(text.into()));
                sheet_cells.fields.insert(path(prefix, "Article_Version"), pos);
            }
            Kind::Metric => {
                row.metric = Some(text.to_string());
                sheet_cells.fields.insert("Metric_Type".into(), pos);
            }
            Kind::Month(_) | Kind::Total => {}
        }
    }

    if let (Some((t, pos)), Some(month_sum)) = (&total, month_sum) {
        if !row.months.is_empty() && *t != month_sum {
            sink.error(
                "Reporting_Period_Total mismatch",
                format!("Reporting_Period_Total is {t} but the months add up to {month_sum}"),
                pos,
                Some(format!("{t}, {month_sum}")),
            );
        }
    }

    let metric_cell = sheet_cells.fields.get("Metric_Type").cloned();
    let has_component = !row.component.is_empty();
    let perf_prefix = match layout.release {
        Release::R5 if has_component => layout.component,
        Release::R5 => layout.item,
        Release::R51 => layout.attributes,
    };
    if let Some(cell) = metric_cell {
        sheet_cells.fields.insert(path(perf_prefix, "Performance"), cell);
    }
    let performance = row.metric.take().map(|metric| {
        let mut p = Map::new();
        p.insert(metric, Value::Object(std::mem::take(&mut row.months)));
        Value::Object(p)
    });

    let object = assemble(row, performance, layout);
    Fragment::sheet(object, Rc::new(sheet_cells))
}

fn assemble(mut row: Row, performance: Option<Value>, layout: &Layout) -> Map<String, Value> {
    match layout.release {
        Release::R5 => {
            let mut item = row.item;
            item.extend(row.attributes);
            if !row.parent.is_empty() {
                item.insert("Item_Parent".into(), Value::Object(row.parent));
            }
            if row.component.is_empty() {
                if let Some(p) = performance {
                    item.insert("Performance".into(), p);
                }
            } else {
                if let Some(p) = performance {
                    row.component.insert("Performance".into(), p);
                }
                item.insert("Item_Component".into(), Value::Array(vec![Value::Object(row.component)]));
            }
            item
        }
        Release::R51 => {
            let mut block = row.attributes;
            if let Some(p) = performance {
                block.insert("Performance".into(), p);
            }
            let mut item = row.item;
            item.insert("Attribute_Performance".into(), Value::Array(vec![Value::Object(block)]));
            if layout.item.is_empty() {
                item
            } else {
                let mut parent = row.parent;
                parent.insert("Items".into(), Value::Array(vec![Value::Object(item)]));
                parent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::diagnostics::DiagnosticLog;

    #[test]
    fn headings_are_classified_per_release() {
        assert_eq!(classify("Parent_Title", Release::R5), Some((Target::Parent, Kind::Text("Item_Name"))));
        assert_eq!(classify("Parent_Title", Release::R51), Some((Target::Parent, Kind::Text("Title"))));
        assert_eq!(classify("Component_DOI", Release::R51), None);
        assert_eq!(classify("Proprietary_ID", Release::R5), Some((Target::Item, Kind::Id("Proprietary"))));
        assert!(matches!(classify("Mar-2024", Release::R51), Some((_, Kind::Month(_)))));
        assert_eq!(classify("Nonsense", Release::R5), None);
    }

    #[test]
    fn identifier_lists_keep_proprietary_namespaces() {
        let ids = typed_ids("ISNI:0000000419369078; Proprietary:pub:PrncU").unwrap_or_default();
        assert_eq!(ids["ISNI"], "0000000419369078");
        assert_eq!(ids["Proprietary"], "pub:PrncU");
        assert!(typed_ids("no colon here").is_none());
    }

    #[test]
    fn header_block_becomes_release_shaped_header() {
        let text = "Report_Name\tTitle Master Report\n\
                    Report_ID\tTR\n\
                    Release\t5.1\n\
                    Report_Filters\tData_Type=Book|Journal; Access_Method=Regular\n\
                    Reporting_Period\tBegin_Date=2024-01-01; End_Date=2024-03-31\n\
                    \n\
                    Title\tPlatform\tMetric_Type\tJan-2024\n";
        let sheet = TabularSheet::parse(text).unwrap();
        let mut log = DiagnosticLog::new();
        let header = header_fragment(&sheet, &mut log);
        let filters = header.get("Report_Filters").cloned().unwrap_or_default();
        assert_eq!(filters["Data_Type"], serde_json::json!(["Book", "Journal"]));
        assert_eq!(filters["Begin_Date"], "2024-01-01");
        assert_eq!(header.field_position("Report_ID").to_string(), "B2");
        assert_eq!(header.sub_position("Report_Filters", "End_Date").to_string(), "B5");
        assert!(log.is_empty());
    }
}
