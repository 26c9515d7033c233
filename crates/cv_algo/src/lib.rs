// crates/cv_algo/src/lib.rs
#![forbid(unsafe_code)]

//! Pure checks over aggregated usage. Nothing here knows about documents,
//! positions or diagnostics; callers translate violations into findings.

// ----------------------------- Metric relations -----------------------------

pub mod relations;

pub use relations::{
    check_relations, Relation, RelationKind, RuleScope, Violation, ViolationKind, RELATIONS,
};

// ----------------------------- Grouping -------------------------------------

pub mod grouping;

pub use grouping::{check_grouped, GroupViolation, UsageRow};
