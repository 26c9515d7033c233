//! crates/cv_core/src/value.rs
//! Closed value type for accepted/rejected node data.
//!
//! Node data is a `BTreeMap<String, FieldValue>`; the map keeps field names
//! sorted so iteration (and therefore hashing and output) is deterministic.

use std::collections::BTreeMap;

use chrono::NaiveDate;

pub type FieldMap = BTreeMap<String, FieldValue>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Date(NaiveDate),
    List(Vec<FieldValue>),
    Map(FieldMap),
    /// Handle into an arena, by canonical hash (e.g. an interned R5 parent).
    Ref(String),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_ref_hash(&self) -> Option<&str> {
        match self {
            FieldValue::Ref(h) => Some(h),
            _ => None,
        }
    }

    /// Scalar rendering used for hashing and messages. Containers render as
    /// an empty string; use `flatten_into` for those.
    pub fn scalar_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Ref(h) => format!("ref:{h}"),
            FieldValue::List(_) | FieldValue::Map(_) => String::new(),
        }
    }

    /// Append `(dotted_name, scalar)` leaves under `prefix`.
    pub fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        match self {
            FieldValue::List(items) => {
                for (i, v) in items.iter().enumerate() {
                    v.flatten_into(&format!("{prefix}.{i}"), out);
                }
            }
            FieldValue::Map(m) => {
                for (k, v) in m {
                    v.flatten_into(&format!("{prefix}.{k}"), out);
                }
            }
            scalar => out.push((prefix.to_string(), scalar.scalar_string())),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

/// Flatten a whole map to dotted leaves (`Item_ID.DOI`, `Item_Attributes.0.Value`).
pub fn flatten(map: &FieldMap) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(map.len());
    for (k, v) in map {
        v.flatten_into(k, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_values_flatten_with_dotted_names() {
        let mut ids = FieldMap::new();
        ids.insert("DOI".into(), "10.1/X".into());
        ids.insert("ISBN".into(), "978-3-16-148410-0".into());
        let mut m = FieldMap::new();
        m.insert("Item_ID".into(), FieldValue::Map(ids));
        m.insert(
            "Authors".into(),
            FieldValue::List(vec!["Ada".into(), "Alan".into()]),
        );
        m.insert("YOP".into(), FieldValue::Int(2020));
        m.insert(
            "Publication_Date".into(),
            FieldValue::Date(NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()),
        );
        m.insert("Item_Parent".into(), FieldValue::Ref("ab12".into()));

        let flat = flatten(&m);
        let names: Vec<&str> = flat.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            ["Authors.0", "Authors.1", "Item_ID.DOI", "Item_ID.ISBN", "Item_Parent", "Publication_Date", "YOP"]
        );
        assert!(flat.contains(&("Publication_Date".into(), "2020-05-01".into())));
        assert!(flat.contains(&("Item_Parent".into(), "ref:ab12".into())));
    }
}
