//! crates/cv_pipeline/src/fragment.rs
//! Raw input records in JSON shape, with enough origin information to
//! report positions.
//!
//! Tabular rows are converted to the same JSON shape before validation
//! (`crate::tabular`), so nodes never branch on the serialization to read a
//! field. Only positions differ: JSON fragments descend a dotted path, sheet
//! fragments look their cell up by field path.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use cv_core::diagnostics::Position;
use cv_core::month::Month;

/// Cells of one tabular record (a header block or a data row).
#[derive(Debug)]
pub struct SheetCells {
    /// Reported when no field-specific cell is known.
    pub anchor: Position,
    /// Field path (`Item_ID.DOI`, `Attribute_Performance.YOP`) → cell.
    pub fields: BTreeMap<String, Position>,
    /// Month column → count cell.
    pub months: BTreeMap<Month, Position>,
}

impl SheetCells {
    pub fn new(anchor: Position) -> Self {
        Self { anchor, fields: BTreeMap::new(), months: BTreeMap::new() }
    }
}

#[derive(Clone, Debug)]
pub enum Origin {
    Json(Position),
    Sheet { cells: Rc<SheetCells>, path: String },
}

#[derive(Clone, Debug)]
pub struct Fragment {
    object: Rc<Map<String, Value>>,
    origin: Origin,
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

impl Fragment {
    pub fn json(object: Map<String, Value>, position: Position) -> Self {
        Self { object: Rc::new(object), origin: Origin::Json(position) }
    }

    pub fn sheet(object: Map<String, Value>, cells: Rc<SheetCells>) -> Self {
        Self { object: Rc::new(object), origin: Origin::Sheet { cells, path: String::new() } }
    }

    pub fn object(&self) -> &Map<String, Value> {
        &self.object
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.object.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.object.contains_key(field)
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self.origin, Origin::Sheet { .. })
    }

    pub fn raw(&self) -> Value {
        Value::Object((*self.object).clone())
    }

    /// Position of the record itself.
    pub fn position(&self) -> Position {
        match &self.origin {
            Origin::Json(p) => p.clone(),
            Origin::Sheet { cells, .. } => cells.anchor.clone(),
        }
    }

    fn lookup(cells: &SheetCells, path: &str) -> Position {
        cells.fields.get(path).cloned().unwrap_or_else(|| cells.anchor.clone())
    }

    pub fn field_position(&self, field: &str) -> Position {
        match &self.origin {
            Origin::Json(p) => p.key(field),
            Origin::Sheet { cells, path } => Self::lookup(cells, &join(path, field)),
        }
    }

    /// `field.key` (identifier types, filter names).
    pub fn sub_position(&self, field: &str, key: &str) -> Position {
        match &self.origin {
            Origin::Json(p) => p.key(field).key(key),
            Origin::Sheet { cells, path } => {
                let full = join(&join(path, field), key);
                cells.fields.get(&full).cloned().unwrap_or_else(|| Self::lookup(cells, &join(path, field)))
            }
        }
    }

    /// Element `index` of an array field; sheets resolve it by `key` instead.
    pub fn element_position(&self, field: &str, index: usize, key: &str) -> Position {
        match &self.origin {
            Origin::Json(p) => p.key(field).index(index),
            Origin::Sheet { .. } => self.sub_position(field, key),
        }
    }

    /// Count cell of a sheet row; `None` for JSON fragments.
    pub fn month_position(&self, month: Month) -> Option<Position> {
        match &self.origin {
            Origin::Json(_) => None,
            Origin::Sheet { cells, .. } => cells.months.get(&month).cloned(),
        }
    }

    /// Nested record under `field` (element `index` for arrays).
    pub fn child(&self, field: &str, index: Option<usize>, object: Map<String, Value>) -> Fragment {
        let origin = match &self.origin {
            Origin::Json(p) => {
                let p = p.key(field);
                Origin::Json(match index {
                    Some(i) => p.index(i),
                    None => p,
                })
            }
            Origin::Sheet { cells, path } => Origin::Sheet { cells: Rc::clone(cells), path: join(path, field) },
        };
        Fragment { object: Rc::new(object), origin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn json_children_extend_the_path() {
        let f = Fragment::json(object(json!({"Title": "T"})), Position::root().key("Report_Items").index(2));
        let c = f.child("Attribute_Performance", Some(0), Map::new());
        assert_eq!(c.field_position("YOP").to_string(), ".Report_Items[2].Attribute_Performance[0].YOP");
        assert_eq!(f.sub_position("Item_ID", "DOI").to_string(), ".Report_Items[2].Item_ID.DOI");
        assert_eq!(f.month_position("2024-01".parse().unwrap()), None);
    }

    #[test]
    fn sheet_children_share_the_row_cells() {
        let mut cells = SheetCells::new(Position::cell(0, 9));
        cells.fields.insert("Title".into(), Position::cell(0, 9));
        cells.fields.insert("Attribute_Performance.YOP".into(), Position::cell(7, 9));
        cells.fields.insert("Item_ID.DOI".into(), Position::cell(3, 9));
        let f = Fragment::sheet(Map::new(), Rc::new(cells));
        let block = f.child("Attribute_Performance", Some(0), Map::new());
        assert_eq!(block.field_position("YOP").to_string(), "H9");
        assert_eq!(block.field_position("Access_Type").to_string(), "A9");
        assert_eq!(f.element_position("Item_ID", 4, "DOI").to_string(), "D9");
        assert!(f.is_tabular());
    }
}
