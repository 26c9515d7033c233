//! Pairwise metric relations evaluated per month.
//!
//! A relation `(a, b)` reads "wherever `b` is present, `a` must be present
//! and `a >= b`". Two exceptions relax the presence half:
//! - Requests without Investigations is allowed (`InvestigationsRequests`);
//! - title-level usage without item-level usage is allowed unless the data
//!   type counts unique titles (`ItemTitle` outside e.g. `Book`).
//!
//! Conversely `a` without `b` is flagged for `Paired` relations, and for
//! `ItemTitle` relations on unique-title data types.

use core::fmt;

use cv_core::metric::{MetricLevel, MetricType};
use cv_core::month::Month;
use cv_core::performance::MonthlyTotals;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationKind {
    /// Total vs Unique of the same activity and level.
    Paired,
    /// Item-level vs title-level.
    ItemTitle,
    /// Investigations vs Requests of the same level.
    InvestigationsRequests,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Relation {
    pub a: MetricType,
    pub b: MetricType,
    pub kind: RelationKind,
}

impl Relation {
    const fn new(a: MetricType, b: MetricType, kind: RelationKind) -> Self {
        Self { a, b, kind }
    }

    pub fn involves_title_level(&self) -> bool {
        self.a.level() == MetricLevel::Title || self.b.level() == MetricLevel::Title
    }
}

/// Evaluation order is fixed; findings come out in this order per month.
pub const RELATIONS: [Relation; 9] = {
    use MetricType::*;
    use RelationKind::*;
    [
        Relation::new(TotalItemInvestigations, UniqueItemInvestigations, Paired),
        Relation::new(TotalItemRequests, UniqueItemRequests, Paired),
        Relation::new(UniqueItemInvestigations, UniqueTitleInvestigations, ItemTitle),
        Relation::new(UniqueItemRequests, UniqueTitleRequests, ItemTitle),
        Relation::new(TotalItemInvestigations, UniqueTitleInvestigations, ItemTitle),
        Relation::new(TotalItemRequests, UniqueTitleRequests, ItemTitle),
        Relation::new(TotalItemInvestigations, TotalItemRequests, InvestigationsRequests),
        Relation::new(UniqueItemInvestigations, UniqueItemRequests, InvestigationsRequests),
        Relation::new(UniqueTitleInvestigations, UniqueTitleRequests, InvestigationsRequests),
    ]
};

/// Which relations a caller wants evaluated over its aggregation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuleScope {
    All,
    /// Relations between item-level metrics only.
    ItemLevel,
    /// Relations with at least one title-level metric.
    TitleLevel,
}

impl RuleScope {
    fn includes(self, r: &Relation) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::ItemLevel => !r.involves_title_level(),
            RuleScope::TitleLevel => r.involves_title_level(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViolationKind {
    /// `b` present without `a`.
    MissingA,
    /// `a` present without `b`.
    MissingB,
    /// `a < b`.
    Greater,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Violation {
    pub month: Month,
    pub relation: Relation,
    pub kind: ViolationKind,
    pub a_count: Option<u64>,
    pub b_count: Option<u64>,
}

impl Violation {
    pub fn summary(&self) -> String {
        let (a, b) = (self.relation.a, self.relation.b);
        match self.kind {
            ViolationKind::MissingA => format!("{a} is missing while {b} is present"),
            ViolationKind::MissingB => format!("{b} is missing while {a} is present"),
            ViolationKind::Greater => format!("{b} is greater than {a}"),
        }
    }

    /// Both counts, absent ones omitted: `Total_Item_Requests: 3, Unique_Item_Requests: 5`.
    pub fn data(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if let Some(c) = self.a_count {
            parts.push(format!("{}: {c}", self.relation.a));
        }
        if let Some(c) = self.b_count {
            parts.push(format!("{}: {c}", self.relation.b));
        }
        parts.join(", ")
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.summary(), self.month)
    }
}

/// Check every in-scope relation against `totals`, month by month.
///
/// `permits` filters relations to metrics the report may carry; a relation
/// with a non-permitted metric is skipped entirely. `unique_title` tells
/// whether the resource's Data_Type counts unique titles.
pub fn check_relations(
    totals: &MonthlyTotals,
    permits: &dyn Fn(MetricType) -> bool,
    unique_title: bool,
    scope: RuleScope,
) -> Vec<Violation> {
    let active: Vec<&Relation> = RELATIONS
        .iter()
        .filter(|r| scope.includes(r) && permits(r.a) && permits(r.b))
        .collect();

    let mut out = Vec::new();
    for (month, metrics) in totals {
        for r in &active {
            let a = metrics.get(&r.a).copied();
            let b = metrics.get(&r.b).copied();
            let kind = match (a, b) {
                (None, Some(_)) => {
                    let exempt = r.kind == RelationKind::InvestigationsRequests
                        || (r.kind == RelationKind::ItemTitle && !unique_title);
                    (!exempt).then_some(ViolationKind::MissingA)
                }
                (Some(_), None) => {
                    let flagged = r.kind == RelationKind::Paired
                        || (r.kind == RelationKind::ItemTitle && unique_title);
                    flagged.then_some(ViolationKind::MissingB)
                }
                (Some(x), Some(y)) if x < y => Some(ViolationKind::Greater),
                _ => None,
            };
            if let Some(kind) = kind {
                out.push(Violation { month: *month, relation: **r, kind, a_count: a, b_count: b });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use MetricType::*;

    fn month(s: &str) -> Month {
        s.parse().unwrap()
    }

    fn totals(entries: &[(&str, MetricType, u64)]) -> MonthlyTotals {
        let mut t: MonthlyTotals = BTreeMap::new();
        for (m, metric, v) in entries {
            t.entry(month(m)).or_default().insert(*metric, *v);
        }
        t
    }

    fn all(_: MetricType) -> bool {
        true
    }

    #[test]
    fn unique_without_total_is_missing_total() {
        let t = totals(&[("2024-01", UniqueItemRequests, 3)]);
        let v = check_relations(&t, &all, false, RuleScope::All);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].summary(), "Total_Item_Requests is missing while Unique_Item_Requests is present");
        assert_eq!(v[0].data(), "Unique_Item_Requests: 3");
    }

    #[test]
    fn total_below_unique_reports_both_counts_once() {
        let t = totals(&[("2024-01", TotalItemRequests, 3), ("2024-01", UniqueItemRequests, 5)]);
        let v = check_relations(&t, &all, false, RuleScope::ItemLevel);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::Greater);
        assert_eq!(v[0].summary(), "Unique_Item_Requests is greater than Total_Item_Requests");
        assert_eq!(v[0].data(), "Total_Item_Requests: 3, Unique_Item_Requests: 5");
    }

    #[test]
    fn requests_without_investigations_is_allowed() {
        let t = totals(&[("2024-01", TotalItemRequests, 4), ("2024-01", UniqueItemRequests, 2)]);
        // Investigations are permitted but absent: no finding either way.
        assert!(check_relations(&t, &all, false, RuleScope::All).is_empty());
    }

    #[test]
    fn title_metrics_depend_on_unique_title_data_types() {
        let t = totals(&[
            ("2024-01", TotalItemRequests, 4),
            ("2024-01", UniqueItemRequests, 2),
            ("2024-01", UniqueTitleRequests, 1),
        ]);
        assert!(check_relations(&t, &all, true, RuleScope::TitleLevel).is_empty());

        let journal = totals(&[("2024-01", UniqueTitleRequests, 1)]);
        let v = check_relations(&journal, &all, false, RuleScope::TitleLevel);
        assert!(v.is_empty(), "{v:?}");

        let book = totals(&[("2024-01", TotalItemRequests, 4), ("2024-01", UniqueItemRequests, 2)]);
        let v = check_relations(&book, &all, true, RuleScope::TitleLevel);
        let summaries: Vec<String> = v.iter().map(Violation::summary).collect();
        assert_eq!(
            summaries,
            [
                "Unique_Title_Requests is missing while Unique_Item_Requests is present",
                "Unique_Title_Requests is missing while Total_Item_Requests is present",
            ]
        );
    }

    #[test]
    fn relations_with_unpermitted_metrics_are_skipped() {
        let t = totals(&[("2024-01", UniqueItemRequests, 3)]);
        let no_total = |m: MetricType| m != TotalItemRequests;
        assert!(check_relations(&t, &no_total, false, RuleScope::All).is_empty());
    }
}
