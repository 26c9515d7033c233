//! crates/cv_pipeline/src/entity.rs
//! Validated entity shared by every node kind, and the node traits.
//!
//! A node validates itself lazily: the first `get`/`get_data`/`ensure_parsed`
//! runs its parse body exactly once between `begin_parse` and `end_parse`.
//! Afterwards `data` and `invalid` change only through `merge`.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::trace;

use cv_core::diagnostics::Position;
use cv_core::lifecycle::Lifecycle;
use cv_core::value::{FieldMap, FieldValue};
use cv_io::hasher::{canonical_hash, HashVariant};

use crate::context::ParseCtx;
use crate::fragment::Fragment;
use crate::PipelineError;

/// Accepted and rejected values of one raw record.
#[derive(Clone, Debug)]
pub struct Entity {
    lifecycle: Lifecycle,
    fragment: Fragment,
    pub data: FieldMap,
    pub invalid: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(kind: &'static str, fragment: Fragment) -> Self {
        Self { lifecycle: Lifecycle::new(kind), fragment, data: FieldMap::new(), invalid: BTreeMap::new() }
    }

    pub fn kind(&self) -> &'static str {
        self.lifecycle.kind()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn position(&self) -> Position {
        self.fragment.position()
    }

    pub fn is_usable(&self) -> bool {
        self.lifecycle.is_usable()
    }

    pub fn is_fixed(&self) -> bool {
        self.lifecycle.is_fixed()
    }

    /// Anything rejected here or below.
    pub fn is_invalid(&self) -> bool {
        !self.lifecycle.is_usable() || !self.invalid.is_empty() || self.lifecycle.has_invalid_children()
    }

    pub fn mark_unusable(&mut self) {
        self.lifecycle.mark_unusable();
    }

    pub fn mark_fixed(&mut self) {
        self.lifecycle.mark_fixed();
    }

    pub fn mark_invalid_children(&mut self) {
        self.lifecycle.mark_invalid_children();
    }

    /// Keep the first rejected value per field.
    pub fn reject(&mut self, field: impl Into<String>, value: Value) {
        self.invalid.entry(field.into()).or_insert(value);
    }

    /// Keep the whole raw record for an unusable node.
    pub fn keep_raw(&mut self) {
        let raw = self.fragment.raw();
        self.invalid.insert("_raw".into(), raw);
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(FieldValue::as_text)
    }

    pub fn hash(&self, variant: HashVariant) -> String {
        canonical_hash(&self.data, variant)
    }

    /// Fold the bookkeeping of a same-hash entity into this one.
    pub fn absorb(&mut self, other: Entity) {
        if other.lifecycle.is_fixed() {
            self.lifecycle.mark_fixed();
        }
        if other.lifecycle.has_invalid_children() {
            self.lifecycle.mark_invalid_children();
        }
        for (k, v) in other.invalid {
            self.invalid.entry(k).or_insert(v);
        }
    }
}

/// A lazily validated node.
pub trait Node {
    fn entity(&self) -> &Entity;

    fn entity_mut(&mut self) -> &mut Entity;

    /// Node-specific validation; runs once.
    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError>;

    fn ensure_parsed(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        if self.entity().lifecycle().is_parsed() {
            return Ok(());
        }
        self.entity_mut().lifecycle_mut().begin_parse()?;
        self.parse_body(ctx)?;
        self.entity_mut().lifecycle_mut().end_parse()?;
        trace!(kind = self.entity().kind(), position = %self.entity().position(), "parsed");
        Ok(())
    }

    fn get(&mut self, ctx: &mut ParseCtx<'_>, field: &str) -> Result<Option<&FieldValue>, PipelineError> {
        self.ensure_parsed(ctx)?;
        Ok(self.entity().data.get(field))
    }

    fn get_invalid(&mut self, ctx: &mut ParseCtx<'_>, field: &str) -> Result<Option<&Value>, PipelineError> {
        self.ensure_parsed(ctx)?;
        Ok(self.entity().invalid.get(field))
    }

    fn get_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<&FieldMap, PipelineError> {
        self.ensure_parsed(ctx)?;
        Ok(&self.entity().data)
    }

    fn is_usable(&self) -> bool {
        self.entity().is_usable()
    }

    fn is_fixed(&self) -> bool {
        self.entity().is_fixed()
    }

    fn is_invalid(&self) -> bool {
        self.entity().is_invalid()
    }

    fn hash(&self, variant: HashVariant) -> String {
        self.entity().hash(variant)
    }

    fn position(&self) -> Position {
        self.entity().position()
    }
}

/// A node that can live in a `MergeCollection`.
pub trait Mergeable: Node + Sized {
    /// Fold a same-hash node into this one. Returns whether their usage
    /// overlapped (each overlap has been reported already).
    fn merge(&mut self, other: Self, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError>;

    /// Strip zero counts, finalize children and settle usability.
    fn store_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError>;

    fn merge_key(&self) -> String {
        self.hash(HashVariant::Full)
    }
}
