//! Aggregate usage rows before checking relations.
//!
//! Rows sharing the item-level key (hash without `Format`) are summed and
//! checked against item-level relations; rows sharing the title-level key
//! (hash without `Format` and `Section_Type`) are summed and checked against
//! relations involving title metrics, so that e.g. the chapter and article
//! rows of one book title are judged together.

use std::collections::BTreeMap;

use cv_core::metric::MetricType;
use cv_core::performance::{add_monthly, MonthlyTotals};

use crate::relations::{check_relations, RuleScope, Violation};

/// One leaf table of usage and the handle of the node that owns it.
#[derive(Clone, Debug)]
pub struct UsageRow<K> {
    pub item_key: String,
    pub title_key: String,
    pub unique_title: bool,
    pub totals: MonthlyTotals,
    pub owner: K,
}

/// A violation found on an aggregation, with every row owner that fed it.
#[derive(Clone, Debug)]
pub struct GroupViolation<K> {
    pub owners: Vec<K>,
    pub violation: Violation,
}

struct Group<'a, K> {
    totals: MonthlyTotals,
    unique_title: bool,
    rows: Vec<&'a UsageRow<K>>,
}

/// Group by key in first-occurrence order.
fn group_by<'a, K>(rows: &'a [UsageRow<K>], key: impl Fn(&UsageRow<K>) -> &str) -> Vec<Group<'a, K>> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut groups: Vec<Group<'a, K>> = Vec::new();
    for row in rows {
        let slot = *index.entry(key(row)).or_insert_with(|| {
            groups.push(Group { totals: MonthlyTotals::new(), unique_title: false, rows: Vec::new() });
            groups.len() - 1
        });
        let g = &mut groups[slot];
        add_monthly(&mut g.totals, &row.totals);
        g.unique_title |= row.unique_title;
        g.rows.push(row);
    }
    groups
}

/// Item-level relations over item groups, then title-level relations over
/// title groups.
pub fn check_grouped<K: Clone>(
    rows: &[UsageRow<K>],
    permits: &dyn Fn(MetricType) -> bool,
) -> Vec<GroupViolation<K>> {
    let mut out = Vec::new();
    let passes: [(RuleScope, fn(&UsageRow<K>) -> &str); 2] = [
        (RuleScope::ItemLevel, |r| r.item_key.as_str()),
        (RuleScope::TitleLevel, |r| r.title_key.as_str()),
    ];
    for (scope, key) in passes {
        for g in group_by(rows, key) {
            for violation in check_relations(&g.totals, permits, g.unique_title, scope) {
                out.push(GroupViolation {
                    owners: g.rows.iter().map(|r| r.owner.clone()).collect(),
                    violation,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::month::Month;
    use MetricType::*;

    fn row(item: &str, title: &str, entries: &[(MetricType, u64)], owner: usize) -> UsageRow<usize> {
        let mut totals = MonthlyTotals::new();
        let m: Month = "2024-03".parse().unwrap();
        for (metric, v) in entries {
            totals.entry(m).or_default().insert(*metric, *v);
        }
        UsageRow { item_key: item.into(), title_key: title.into(), unique_title: true, totals, owner }
    }

    #[test]
    fn split_rows_are_summed_before_checking() {
        // Chapter and article rows of one book: item keys differ, title key is shared.
        let rows = vec![
            row("chapter", "book", &[(TotalItemRequests, 2), (UniqueItemRequests, 2)], 0),
            row("article", "book", &[(TotalItemRequests, 1), (UniqueItemRequests, 1)], 1),
            row("whole", "book", &[(UniqueTitleRequests, 3)], 2),
        ];
        let v = check_grouped(&rows, &|_| true);
        assert!(v.is_empty(), "{:?}", v.iter().map(|g| g.violation.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn a_violation_names_every_owner_of_the_group() {
        let rows = vec![
            row("x", "x", &[(TotalItemRequests, 1)], 7),
            row("x", "x", &[(UniqueItemRequests, 2)], 9),
        ];
        let v = check_grouped(&rows, &|m| m != UniqueTitleRequests);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].owners, [7, 9]);
        assert_eq!(v[0].violation.b_count, Some(2));
    }
}
