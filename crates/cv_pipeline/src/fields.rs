//! crates/cv_pipeline/src/fields.rs
//! Rule-driven checks of plain fields. Nested fields (`Performance`,
//! `Attribute_Performance`, `Items`, …) are left to the owning node.
//!
//! Value fix-ups mark the node `Fixed` and keep the corrected value:
//! surrounding whitespace (Warning), capitalization of enumerated values and
//! identifier types (Error), numbers where strings are expected (Error).

use serde_json::{Map, Value};

use cv_core::diagnostics::Position;
use cv_core::month::parse_date;
use cv_core::rules::{FieldKind, FieldShape, NodeRules, Release};
use cv_core::value::{FieldMap, FieldValue};

use crate::context::ParseCtx;
use crate::entity::Entity;
use crate::fragment::Fragment;

/// Outcome of one field check.
#[derive(Debug, Default)]
struct Checked {
    value: Option<FieldValue>,
    fixed: bool,
    /// Rejected parts of a partially accepted value (`Item_ID.ISSN`, …).
    rejected: Vec<(String, Value)>,
}

impl Checked {
    fn keep(value: FieldValue, fixed: bool) -> Self {
        Self { value: Some(value), fixed, rejected: Vec::new() }
    }

    fn reject() -> Self {
        Self::default()
    }
}

/// Short rendering of a raw value for the `data` slot of a diagnostic.
pub fn show(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Check every non-nested field of the entity's fragment against `rules`.
pub fn parse_fields(entity: &mut Entity, rules: &NodeRules, ctx: &mut ParseCtx<'_>) {
    let fragment = entity.fragment().clone();
    let kind = entity.kind();
    let report = ctx.report;

    for (name, value) in fragment.object() {
        let pos = fragment.field_position(name);
        let Some(rule) = rules.get(name) else {
            ctx.sink.error(
                "Unknown element",
                format!("{name} is not a valid element of {kind}"),
                &pos,
                Some(show(value)),
            );
            entity.reject(name.as_str(), value.clone());
            continue;
        };
        if rule.shape == FieldShape::Nested {
            continue;
        }
        if value.is_null() {
            ctx.sink.error("Wrong data type", format!("{name} must not be null"), &pos, None);
            entity.reject(name.as_str(), Value::Null);
            continue;
        }

        let checked = match &rule.shape {
            FieldShape::Text => text(name, value, &pos, ctx).map_or_else(Checked::reject, |(s, f)| Checked::keep(s.into(), f)),
            FieldShape::Enumerated(allowed) => enumerated(name, value, allowed, &pos, ctx),
            FieldShape::Yop => yop(value, &pos, ctx),
            FieldShape::Date => date(name, value, &pos, ctx),
            FieldShape::Identifiers(types) => identifiers(name, value, types, &fragment, ctx),
            FieldShape::Structured => structured(value).map_or_else(Checked::reject, |v| Checked::keep(v, false)),
            FieldShape::Nested => continue,
        };
        for (part, raw) in checked.rejected {
            entity.reject(part, raw);
        }
        let Some(accepted) = checked.value else {
            entity.reject(name.as_str(), value.clone());
            continue;
        };

        if rule.kind == FieldKind::Attribute {
            if !report.allows_attribute(name) {
                ctx.sink.error(
                    "Unexpected attribute",
                    format!("{name} is not among the attributes shown in {}", report.report_id),
                    &pos,
                    Some(show(value)),
                );
                entity.reject(name.as_str(), value.clone());
                continue;
            }
            if let Some(permitted) = report.profile.restrictions.get(name) {
                let shown = accepted.scalar_string();
                if !permitted.iter().any(|p| *p == shown) {
                    ctx.sink.error(
                        "Value not permitted in this report",
                        format!("{name} must be one of {} in {}", permitted.join(", "), report.report_id),
                        &pos,
                        Some(shown),
                    );
                    entity.reject(name.as_str(), value.clone());
                    continue;
                }
            }
        }

        if checked.fixed {
            entity.mark_fixed();
        }
        entity.data.insert(name.clone(), accepted);
    }
}

/// End-of-parse completeness check: identity, required fields, shown attributes.
pub fn check_required(entity: &mut Entity, rules: &NodeRules, ctx: &mut ParseCtx<'_>) {
    let kind = entity.kind();
    let pos = entity.position();
    let present =
        |e: &Entity, f: &str| e.data.contains_key(f) || e.invalid.contains_key(f) || e.fragment().contains(f);

    let identity_missing =
        !rules.identity.is_empty() && rules.identity.iter().all(|f| !entity.data.contains_key(f));
    if identity_missing {
        ctx.sink.critical(
            "Identifying elements missing",
            format!("{kind} has no valid {}; it cannot be matched to other records", rules.identity.join(" or ")),
            &pos,
            None,
        );
        entity.mark_unusable();
        entity.keep_raw();
    }

    for name in rules.required() {
        if identity_missing && rules.identity.iter().any(|f| f == name) {
            continue;
        }
        if !present(entity, name) {
            ctx.sink.error("Required element missing", format!("{name} is missing from {kind}"), &pos, None);
        }
    }

    for name in ctx.report.shown_attributes() {
        let is_attribute = rules.get(name).map_or(false, |r| r.kind == FieldKind::Attribute);
        if is_attribute && !present(entity, name) {
            ctx.sink.error(
                "Attribute missing",
                format!("{name} must be reported in {} because it is shown", ctx.report.report_id),
                &pos,
                None,
            );
        }
    }
}

/* -------------------------------- Scalars -------------------------------- */

fn trimmed(name: &str, s: &str, pos: &Position, ctx: &mut ParseCtx<'_>) -> Option<(String, bool)> {
    let t = s.trim();
    if t.is_empty() {
        ctx.sink.error("Empty value", format!("{name} must not be empty"), pos, None);
        return None;
    }
    if t.len() != s.len() {
        ctx.sink.warning(
            "Leading or trailing whitespace",
            format!("whitespace removed from {name}"),
            pos,
            Some(s.to_string()),
        );
        return Some((t.to_string(), true));
    }
    Some((s.to_string(), false))
}

fn text(name: &str, value: &Value, pos: &Position, ctx: &mut ParseCtx<'_>) -> Option<(String, bool)> {
    match value {
        Value::String(s) => trimmed(name, s, pos, ctx),
        Value::Number(n) => {
            ctx.sink.error("Wrong data type", format!("{name} must be a string, found a number"), pos, Some(n.to_string()));
            Some((n.to_string(), true))
        }
        other => {
            ctx.sink.error("Wrong data type", format!("{name} must be a string"), pos, Some(show(other)));
            None
        }
    }
}

fn enumerated(name: &str, value: &Value, allowed: &[String], pos: &Position, ctx: &mut ParseCtx<'_>) -> Checked {
    let Some((s, fixed)) = text(name, value, pos, ctx) else {
        return Checked::reject();
    };
    if allowed.iter().any(|a| *a == s) {
        return Checked::keep(s.into(), fixed);
    }
    if let Some(correct) = allowed.iter().find(|a| a.eq_ignore_ascii_case(&s)) {
        ctx.sink.error(
            "Wrong capitalization",
            format!("{name} value {s} corrected to {correct}"),
            pos,
            Some(s.clone()),
        );
        return Checked::keep(correct.as_str().into(), true);
    }
    ctx.sink.error(
        "Invalid value",
        format!("{s} is not a valid {name}; permitted values are {}", allowed.join(", ")),
        pos,
        Some(s),
    );
    Checked::reject()
}

fn yop(value: &Value, pos: &Position, ctx: &mut ParseCtx<'_>) -> Checked {
    let (s, fixed) = match value {
        Value::Number(n) => match n.as_u64().filter(|y| (1..=9999).contains(y)) {
            Some(y) => {
                ctx.sink.error("Wrong data type", "YOP must be a string".to_string(), pos, Some(n.to_string()));
                (format!("{y:04}"), true)
            }
            None => {
                ctx.sink.error("Invalid value", "YOP must be a year between 0001 and 9999".into(), pos, Some(n.to_string()));
                return Checked::reject();
            }
        },
        other => match text("YOP", other, pos, ctx) {
            Some(t) => t,
            None => return Checked::reject(),
        },
    };
    let shaped = s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) && s != "0000";
    if !shaped {
        ctx.sink.error("Invalid value", "YOP must be a year between 0001 and 9999".into(), pos, Some(s));
        return Checked::reject();
    }
    Checked::keep(s.into(), fixed)
}

fn date(name: &str, value: &Value, pos: &Position, ctx: &mut ParseCtx<'_>) -> Checked {
    let Some((s, fixed)) = text(name, value, pos, ctx) else {
        return Checked::reject();
    };
    match parse_date(&s) {
        Ok(d) => Checked::keep(FieldValue::Date(d), fixed),
        Err(e) => {
            ctx.sink.error("Invalid date", format!("{name}: {e}"), pos, Some(s));
            Checked::reject()
        }
    }
}

/// Structured values are taken over as-is; `null` members are dropped.
pub fn structured(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
        Value::Number(n) => Some(n.as_i64().map_or_else(|| FieldValue::Text(n.to_string()), FieldValue::Int)),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Array(items) => Some(FieldValue::List(items.iter().filter_map(structured).collect())),
        Value::Object(map) => Some(FieldValue::Map(
            map.iter().filter_map(|(k, v)| structured(v).map(|v| (k.clone(), v))).collect(),
        )),
    }
}

/* ------------------------------ Identifiers ------------------------------ */

/// Typed identifiers, given either as `[{Type, Value}]` (Release 5) or as
/// `{Type: Value | [Value]}` (Release 5.1). Stored as `Type → Value`, with a
/// list where one type carries several values.
fn identifiers(name: &str, value: &Value, allowed: &[String], fragment: &Fragment, ctx: &mut ParseCtx<'_>) -> Checked {
    let mut pairs: Vec<(String, &Value, Position)> = Vec::new();
    let mut out = Checked::default();
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let typed = item.as_object().and_then(|o| Some((o.get("Type")?.as_str()?, o.get("Value")?)));
                match typed {
                    Some((t, v)) => pairs.push((t.to_string(), v, fragment.element_position(name, i, t))),
                    None => {
                        let pos = fragment.element_position(name, i, "");
                        ctx.sink.error("Wrong data type", format!("{name} entries need Type and Value"), &pos, Some(show(item)));
                        out.rejected.push((format!("{name}.{i}"), item.clone()));
                    }
                }
            }
        }
        Value::Object(map) => {
            for (t, v) in map {
                pairs.push((t.clone(), v, fragment.sub_position(name, t)));
            }
        }
        other => {
            let pos = fragment.field_position(name);
            ctx.sink.error("Wrong data type", format!("{name} must be a list of typed identifiers"), &pos, Some(show(other)));
            return Checked::reject();
        }
    }

    let multi = ctx.release() == Release::R51;
    let mut accepted = FieldMap::new();
    for (raw_type, raw_value, pos) in pairs {
        let id_type = match allowed.iter().find(|a| **a == raw_type) {
            Some(t) => t.clone(),
            None => match allowed.iter().find(|a| a.eq_ignore_ascii_case(&raw_type)) {
                Some(t) => {
                    ctx.sink.error("Wrong capitalization", format!("{name} type {raw_type} corrected to {t}"), &pos, None);
                    out.fixed = true;
                    t.clone()
                }
                None => {
                    ctx.sink.error(
                        "Identifier type not permitted",
                        format!("{raw_type} is not a permitted {name} type; permitted types are {}", allowed.join(", ")),
                        &pos,
                        Some(show(raw_value)),
                    );
                    out.rejected.push((format!("{name}.{raw_type}"), raw_value.clone()));
                    continue;
                }
            },
        };

        let values: Vec<&Value> = match raw_value {
            Value::Array(vs) if multi => vs.iter().collect(),
            v => vec![v],
        };
        for v in values {
            let label = format!("{name}.{id_type}");
            let Some((s, fixed)) = text(&label, v, &pos, ctx) else {
                out.rejected.push((label, v.clone()));
                continue;
            };
            out.fixed |= fixed;
            if !ctx.formats.is_valid(&id_type, &s) {
                ctx.sink.error("Invalid identifier", format!("{s} is not a valid {id_type}"), &pos, Some(s.clone()));
                out.rejected.push((label, v.clone()));
                continue;
            }
            match accepted.get_mut(&id_type) {
                None => {
                    accepted.insert(id_type.clone(), FieldValue::Text(s));
                }
                Some(existing) if multi => {
                    let mut list = match std::mem::replace(existing, FieldValue::List(Vec::new())) {
                        FieldValue::List(l) => l,
                        single => vec![single],
                    };
                    list.push(FieldValue::Text(s));
                    *existing = FieldValue::List(list);
                }
                Some(_) => {
                    ctx.sink.error("Duplicate identifier", format!("{name} carries {id_type} more than once"), &pos, Some(s));
                    out.rejected.push((label, v.clone()));
                }
            }
        }
    }

    if !accepted.is_empty() {
        out.value = Some(FieldValue::Map(accepted));
    }
    out
}

/// Release-specific JSON for stored identifiers: sorted `[{Type, Value}]`
/// for Release 5, `{Type: Value}` for Release 5.1.
pub fn identifiers_json(ids: &FieldMap, release: Release) -> Value {
    match release {
        Release::R5 => {
            let mut list = Vec::new();
            for (t, v) in ids {
                let values: Vec<&FieldValue> = match v {
                    FieldValue::List(vs) => vs.iter().collect(),
                    single => vec![single],
                };
                for value in values {
                    let mut entry = Map::new();
                    entry.insert("Type".into(), Value::String(t.clone()));
                    entry.insert("Value".into(), Value::String(value.scalar_string()));
                    list.push(Value::Object(entry));
                }
            }
            Value::Array(list)
        }
        Release::R51 => Value::Object(
            ids.iter()
                .map(|(t, v)| {
                    let json = match v {
                        FieldValue::List(vs) => {
                            Value::Array(vs.iter().map(|x| Value::String(x.scalar_string())).collect())
                        }
                        single => Value::String(single.scalar_string()),
                    };
                    (t.clone(), json)
                })
                .collect(),
        ),
    }
}
