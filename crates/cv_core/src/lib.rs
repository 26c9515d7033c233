//! cv_core — Core types for the COUNTER report validator.
//!
//! This crate is **I/O-free**. It defines the stable types shared by the
//! engine crates (`cv_io`, `cv_algo`, `cv_pipeline`, `cv_cli`):
//!
//! - Entity lifecycle state machine (`Unparsed → Parsing → Parsed` plus flags)
//! - Diagnostics: severities, position tokens, the sink interface
//! - `Month` ("YYYY-MM") and `MetricType`
//! - `PerformanceTable` with merge / aggregation / zero-stripping
//! - Closed `FieldValue` sum type for node data and its flattening for hashing
//! - Rule-table interface (`RuleTables`) implemented by the Config collaborator
//!
//! Serialization derives are gated behind the `serde` feature.

#![forbid(unsafe_code)]

pub mod diagnostics;
pub mod errors;
pub mod lifecycle;
pub mod metric;
pub mod month;
pub mod performance;
pub mod rules;
pub mod value;

pub mod prelude {
    pub use crate::diagnostics::{Diagnostic, DiagnosticLog, DiagnosticSink, Position, Severity};
    pub use crate::errors::{CoreError, LogicError};
    pub use crate::lifecycle::{Lifecycle, ParseState};
    pub use crate::metric::{MetricLevel, MetricType};
    pub use crate::month::Month;
    pub use crate::performance::{Conflict, Count, MonthlyTotals, PerformanceTable};
    pub use crate::rules::{
        FieldKind, FieldRule, FieldShape, NodeContext, NodeRules, Release, ReportProfile,
        Requirement, RuleKey, RuleTables, Serialization,
    };
    pub use crate::value::{FieldMap, FieldValue};
}
