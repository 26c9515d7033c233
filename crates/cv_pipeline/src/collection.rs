//! crates/cv_pipeline/src/collection.rs
//! Hash-keyed merge collection: first-occurrence order, at most one entry
//! per canonical hash.

use std::collections::HashMap;

use tracing::debug;

use cv_core::diagnostics::{Diagnostic, Severity};

use crate::context::ParseCtx;
use crate::entity::{Mergeable, Node};
use crate::PipelineError;

pub const DUPLICATE: &str = "Duplicate object for the same logical record";
pub const MERGED: &str = "Multiple occurrences of the same logical record merged";

#[derive(Debug)]
pub struct MergeCollection<E> {
    label: &'static str,
    entries: Vec<E>,
    index: HashMap<String, usize>,
    /// Nodes that were unusable on arrival (missing identity).
    rejected: Vec<E>,
    degraded: bool,
}

/// Result of `finalize`.
pub struct Finalized<'c, E> {
    pub usable: Vec<&'c E>,
    pub dropped: usize,
    pub degraded: bool,
}

impl<E: Mergeable> MergeCollection<E> {
    pub fn new(label: &'static str) -> Self {
        Self { label, entries: Vec::new(), index: HashMap::new(), rejected: Vec::new(), degraded: false }
    }

    /// Parse `element` and insert or merge it, reporting repeated records.
    pub fn insert(&mut self, element: E, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        self.insert_with(element, ctx, true)
    }

    /// Like `insert`, without diagnostics for clean repeats (shared parents).
    pub fn intern(&mut self, element: E, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        self.insert_with(element, ctx, false)
    }

    fn insert_with(&mut self, mut element: E, ctx: &mut ParseCtx<'_>, announce: bool) -> Result<(), PipelineError> {
        element.ensure_parsed(ctx)?;
        if !element.is_usable() {
            self.degraded = true;
            self.rejected.push(element);
            return Ok(());
        }
        let key = element.merge_key();
        let slot = match self.index.get(&key).copied() {
            Some(slot) => slot,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(element);
                return Ok(());
            }
        };

        let position = element.position();
        let first = self.entries[slot].position();
        let conflicted = self.entries[slot].merge(element, ctx)?;
        debug!(label = self.label, %position, %first, conflicted, "merged same-hash record");
        if conflicted {
            let message = format!(
                "{} at {position} describes the same {} as {first} and repeats some of its usage",
                self.label, self.label
            );
            let severity = if ctx.is_tabular() { Severity::Notice } else { Severity::Error };
            ctx.sink.emit(Diagnostic::new(severity, DUPLICATE, message, position));
            if !self.entries[slot].is_usable() {
                self.degraded = true;
            }
        } else if announce && !ctx.is_tabular() && ctx.options.merge_notices {
            let message = format!("{} at {position} was merged into the one at {first}", self.label);
            ctx.sink.emit(
                Diagnostic::new(Severity::Notice, MERGED, message, position)
                    .with_hint("recommend a single object per logical record"),
            );
        }
        Ok(())
    }

    /// Merge another collection entry by entry, silently. Returns whether
    /// any entry overlapped.
    pub fn absorb(&mut self, other: MergeCollection<E>, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        let mut conflicted = false;
        for element in other.entries {
            let key = element.merge_key();
            match self.index.get(&key).copied() {
                Some(slot) => {
                    if self.entries[slot].merge(element, ctx)? {
                        conflicted = true;
                        if !self.entries[slot].is_usable() {
                            self.degraded = true;
                        }
                    }
                }
                None => {
                    self.index.insert(key, self.entries.len());
                    self.entries.push(element);
                }
            }
        }
        self.rejected.extend(other.rejected);
        self.degraded |= other.degraded;
        Ok(conflicted)
    }

    pub fn store_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        for e in &mut self.entries {
            e.store_data(ctx)?;
        }
        Ok(())
    }

    /// Usable entries in first-occurrence order.
    pub fn finalize(&self) -> Finalized<'_, E> {
        let usable: Vec<&E> = self.usable().collect();
        let dropped = self.entries.len() - usable.len() + self.rejected.len();
        Finalized { usable, dropped, degraded: self.degraded || dropped > 0 }
    }
}

impl<E: Node> MergeCollection<E> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn usable(&self) -> impl Iterator<Item = &E> + '_ {
        self.entries.iter().filter(|e| e.is_usable())
    }

    pub fn usable_count(&self) -> usize {
        self.usable().count()
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [E] {
        &mut self.entries
    }

    pub fn rejected(&self) -> &[E] {
        &self.rejected
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No records were given at all (neither kept nor rejected).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.rejected.is_empty()
    }

    pub fn has_unusable(&self) -> bool {
        self.degraded || !self.rejected.is_empty() || self.entries.iter().any(|e| !e.is_usable())
    }
}
