//! crates/cv_core/src/rules.rs
//! Typed rule tables: which fields exist per node kind, which are required,
//! which define an attribute block, and which metrics a report permits.
//!
//! The tables themselves live with the Config collaborator (see
//! `cv_io::config::BuiltinRules`); the engine only sees `RuleTables`.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::metric::MetricType;

/* ---------------------------------- Keys ---------------------------------- */

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Release {
    R5,
    R51,
}

impl Release {
    pub fn as_str(self) -> &'static str {
        match self {
            Release::R5 => "5",
            Release::R51 => "5.1",
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Release {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "5" => Ok(Release::R5),
            "5.1" => Ok(Release::R51),
            other => Err(CoreError::UnknownRelease(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Serialization {
    Json,
    Tabular,
}

/// Node kind a rule set applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NodeContext {
    Header,
    Item,
    Parent,
    Component,
    AttributeBlock,
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RuleKey {
    pub report_id: String,
    pub release: Release,
    pub serialization: Serialization,
    pub context: NodeContext,
}

impl RuleKey {
    pub fn new(
        report_id: impl Into<String>,
        release: Release,
        serialization: Serialization,
        context: NodeContext,
    ) -> Self {
        Self { report_id: report_id.into(), release, serialization, context }
    }
}

/* --------------------------------- Fields --------------------------------- */

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Describes the resource; part of the item hash.
    Metadata,
    /// Reporting attribute; defines an attribute block's identity.
    Attribute,
    /// Report-level filter (header only).
    Filter,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Requirement {
    Required,
    Optional,
}

/// Expected value shape, which selects the parser for the field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldShape {
    /// Non-empty string.
    Text,
    /// One of a closed value set (case-sensitive; case-only mismatches are fixed).
    Enumerated(Vec<String>),
    /// Typed identifiers; the list holds the permitted types.
    Identifiers(Vec<String>),
    /// Year of publication, `"0001"`..`"9999"`.
    Yop,
    /// ISO `YYYY-MM-DD`.
    Date,
    /// Structured value taken over as-is (authors, exceptions, dates lists).
    Structured,
    /// Owned child list or usage, handled by the node itself.
    Nested,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub requirement: Requirement,
    pub shape: FieldShape,
}

impl FieldRule {
    pub fn required(kind: FieldKind, shape: FieldShape) -> Self {
        Self { kind, requirement: Requirement::Required, shape }
    }

    pub fn optional(kind: FieldKind, shape: FieldShape) -> Self {
        Self { kind, requirement: Requirement::Optional, shape }
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

/// Field rules of one node kind.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeRules {
    pub fields: BTreeMap<String, FieldRule>,
    /// Identifying fields; a node carrying none of them cannot be reconciled.
    pub identity: Vec<String>,
}

impl NodeRules {
    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.fields.get(field)
    }

    pub fn required(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().filter(|(_, r)| r.is_required()).map(|(k, _)| k.as_str())
    }
}

/* -------------------------------- Profiles -------------------------------- */

/// Report-level facts for one Report_ID and release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReportProfile {
    pub report_id: String,
    pub release: Release,
    pub name: String,
    /// Master report this view derives from (`TR` for `TR_J1`); itself for masters.
    pub master: String,
    pub metrics: Vec<MetricType>,
    /// Attributes a master report may show via `Attributes_To_Show`.
    pub attributes: Vec<String>,
    /// Standard-view value restrictions (`Access_Method → [Regular]`).
    pub restrictions: BTreeMap<String, Vec<String>>,
    pub supports_parents: bool,
    pub supports_components: bool,
}

impl ReportProfile {
    pub fn is_master(&self) -> bool {
        self.master == self.report_id
    }

    pub fn is_standard_view(&self) -> bool {
        !self.is_master()
    }

    pub fn permits(&self, metric: MetricType) -> bool {
        self.metrics.contains(&metric)
    }

    /// Single permitted value of a restricted attribute (e.g. `Data_Type` of `TR_B1`).
    pub fn implied_value(&self, field: &str) -> Option<&str> {
        match self.restrictions.get(field).map(Vec::as_slice) {
            Some([only]) => Some(only.as_str()),
            _ => None,
        }
    }
}

/// Rule lookup provided by the Config collaborator.
pub trait RuleTables {
    fn profile(&self, report_id: &str, release: Release) -> Option<&ReportProfile>;

    fn node_rules(&self, key: &RuleKey) -> Option<&NodeRules>;

    /// Data types whose title-level metrics require item-level metrics (e.g. `Book`).
    fn unique_title_data_types(&self, release: Release) -> &[String];

    /// Data types for which database-level search metrics may be reported.
    fn database_data_types(&self, release: Release) -> &[String];

    fn is_unique_title_type(&self, release: Release, data_type: &str) -> bool {
        self.unique_title_data_types(release).iter().any(|t| t == data_type)
    }

    fn is_database_type(&self, release: Release, data_type: &str) -> bool {
        self.database_data_types(release).iter().any(|t| t == data_type)
    }
}
