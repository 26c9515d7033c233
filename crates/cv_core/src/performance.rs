//! crates/cv_core/src/performance.rs
//! `Metric_Type → Month → Count` with merge, month aggregation and the
//! zero-count lifecycle.
//!
//! A count of 0 is a transient marker: it is kept while the owning node is
//! still collecting merges so that a second submission of the same
//! (metric, month) pair is detected, and stripped once by
//! `strip_zeros_and_check_empty` before the table leaves the engine.

use std::collections::BTreeMap;

use crate::diagnostics::Position;
use crate::errors::LogicError;
use crate::metric::MetricType;
use crate::month::Month;

/// One stored count with the position it was read from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Count {
    pub value: u64,
    pub position: Position,
}

/// A (metric, month) pair submitted twice for the same logical record.
/// The kept value is always the first one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Conflict {
    pub metric: MetricType,
    pub month: Month,
    pub kept: Count,
    pub discarded: Count,
}

impl Conflict {
    pub fn counts_differ(&self) -> bool {
        self.kept.value != self.discarded.value
    }
}

/// Month-major view used by the metric-relation checks.
pub type MonthlyTotals = BTreeMap<Month, BTreeMap<MetricType, u64>>;

/// Sum `from` into `into` (used to combine the tables of a group of nodes).
/// Sums saturate at `u64::MAX`.
pub fn add_monthly(into: &mut MonthlyTotals, from: &MonthlyTotals) {
    for (month, metrics) in from {
        let slot = into.entry(*month).or_default();
        for (metric, v) in metrics {
            let sum = slot.entry(*metric).or_insert(0);
            *sum = sum.saturating_add(*v);
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PerformanceTable {
    cells: BTreeMap<MetricType, BTreeMap<Month, Count>>,
}

impl PerformanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(|m| m.is_empty())
    }

    /// Number of (metric, month) pairs.
    pub fn len(&self) -> usize {
        self.cells.values().map(|m| m.len()).sum()
    }

    pub fn contains(&self, metric: MetricType, month: Month) -> bool {
        self.cells.get(&metric).is_some_and(|m| m.contains_key(&month))
    }

    pub fn get(&self, metric: MetricType, month: Month) -> Option<u64> {
        self.cells.get(&metric).and_then(|m| m.get(&month)).map(|c| c.value)
    }

    pub fn count(&self, metric: MetricType, month: Month) -> Option<&Count> {
        self.cells.get(&metric).and_then(|m| m.get(&month))
    }

    /// Insert a count read during one parse. A second insertion for the same
    /// pair is a caller bug: parsers must check `contains` and report the
    /// duplicate as data first.
    pub fn add(
        &mut self,
        metric: MetricType,
        month: Month,
        value: u64,
        position: Position,
    ) -> Result<(), LogicError> {
        let slot = self.cells.entry(metric).or_default();
        if slot.contains_key(&month) {
            return Err(LogicError::DuplicateCount {
                metric: metric.to_string(),
                month: month.to_string(),
            });
        }
        slot.insert(month, Count { value, position });
        Ok(())
    }

    /// Fold `other` into `self`. Pairs absent here are copied; pairs present
    /// in both are returned as conflicts and the incoming value is dropped,
    /// whether or not the two counts are equal.
    pub fn merge(&mut self, other: PerformanceTable) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (metric, months) in other.cells {
            let slot = self.cells.entry(metric).or_default();
            for (month, incoming) in months {
                match slot.get(&month) {
                    Some(kept) => conflicts.push(Conflict {
                        metric,
                        month,
                        kept: kept.clone(),
                        discarded: incoming,
                    }),
                    None => {
                        slot.insert(month, incoming);
                    }
                }
            }
        }
        conflicts
    }

    pub fn aggregate_by_month(&self) -> MonthlyTotals {
        let mut out = MonthlyTotals::new();
        for (metric, months) in &self.cells {
            for (month, c) in months {
                let sum = out.entry(*month).or_default().entry(*metric).or_insert(0);
                *sum = sum.saturating_add(c.value);
            }
        }
        out
    }

    /// Remove every zero count; returns `true` when nothing remains.
    /// Idempotent.
    pub fn strip_zeros_and_check_empty(&mut self) -> bool {
        for months in self.cells.values_mut() {
            months.retain(|_, c| c.value != 0);
        }
        self.cells.retain(|_, months| !months.is_empty());
        self.cells.is_empty()
    }

    pub fn metrics(&self) -> impl Iterator<Item = MetricType> + '_ {
        self.cells.iter().filter(|(_, m)| !m.is_empty()).map(|(k, _)| *k)
    }

    /// All months carrying at least one count, ascending.
    pub fn months(&self) -> Vec<Month> {
        let mut v: Vec<Month> = self.cells.values().flat_map(|m| m.keys().copied()).collect();
        v.sort();
        v.dedup();
        v
    }

    /// `(metric, month, count)` in canonical order (metric, then month).
    pub fn iter(&self) -> impl Iterator<Item = (MetricType, Month, &Count)> + '_ {
        self.cells
            .iter()
            .flat_map(|(metric, months)| months.iter().map(move |(month, c)| (*metric, *month, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Month {
        s.parse().unwrap()
    }

    fn table(entries: &[(MetricType, &str, u64)]) -> PerformanceTable {
        let mut t = PerformanceTable::new();
        for (metric, month, v) in entries {
            t.add(*metric, m(month), *v, Position::root()).unwrap();
        }
        t
    }

    #[test]
    fn second_add_in_one_parse_is_rejected() {
        let mut t = table(&[(MetricType::TotalItemRequests, "2024-01", 5)]);
        let err = t.add(MetricType::TotalItemRequests, m("2024-01"), 6, Position::root());
        assert!(matches!(err, Err(LogicError::DuplicateCount { .. })));
        assert_eq!(t.get(MetricType::TotalItemRequests, m("2024-01")), Some(5));
    }

    #[test]
    fn merge_copies_disjoint_pairs_and_reports_every_overlap() {
        let mut a = table(&[(MetricType::TotalItemRequests, "2024-01", 5)]);
        let b = table(&[
            (MetricType::TotalItemRequests, "2024-01", 5),
            (MetricType::TotalItemRequests, "2024-02", 3),
        ]);
        let conflicts = a.merge(b);
        assert_eq!(conflicts.len(), 1);
        assert!(!conflicts[0].counts_differ());
        assert_eq!(a.get(MetricType::TotalItemRequests, m("2024-02")), Some(3));

        let c = table(&[(MetricType::TotalItemRequests, "2024-01", 7)]);
        let conflicts = a.merge(c);
        assert!(conflicts[0].counts_differ());
        assert_eq!(a.get(MetricType::TotalItemRequests, m("2024-01")), Some(5));
    }

    #[test]
    fn zero_stripping_is_idempotent() {
        let mut t = table(&[
            (MetricType::TotalItemRequests, "2024-01", 0),
            (MetricType::UniqueItemRequests, "2024-01", 2),
            (MetricType::UniqueItemRequests, "2024-02", 0),
        ]);
        assert!(!t.strip_zeros_and_check_empty());
        assert!(t.iter().all(|(_, _, c)| c.value != 0));
        let snapshot = t.clone();
        assert!(!t.strip_zeros_and_check_empty());
        assert_eq!(t, snapshot);
        assert_eq!(t.len(), 1);

        let mut only_zero = table(&[(MetricType::NoLicense, "2024-03", 0)]);
        assert!(only_zero.strip_zeros_and_check_empty());
        assert!(only_zero.is_empty());
    }

    #[test]
    fn aggregates_month_major() {
        let t = table(&[
            (MetricType::TotalItemRequests, "2024-01", 4),
            (MetricType::UniqueItemRequests, "2024-01", 2),
            (MetricType::TotalItemRequests, "2024-02", 1),
        ]);
        let agg = t.aggregate_by_month();
        assert_eq!(agg[&m("2024-01")][&MetricType::UniqueItemRequests], 2);
        assert_eq!(agg[&m("2024-02")].len(), 1);

        let mut sum = MonthlyTotals::new();
        add_monthly(&mut sum, &agg);
        add_monthly(&mut sum, &agg);
        assert_eq!(sum[&m("2024-01")][&MetricType::TotalItemRequests], 8);
        assert_eq!(t.months(), vec![m("2024-01"), m("2024-02")]);
    }

    #[test]
    fn group_sums_saturate_instead_of_overflowing() {
        let mut one = MonthlyTotals::new();
        one.entry(m("2024-05")).or_default().insert(MetricType::TotalItemRequests, u64::MAX);
        let mut sum = MonthlyTotals::new();
        add_monthly(&mut sum, &one);
        add_monthly(&mut sum, &one);
        assert_eq!(sum[&m("2024-05")][&MetricType::TotalItemRequests], u64::MAX);

        let t = table(&[(MetricType::TotalItemRequests, "2024-05", u64::MAX)]);
        assert_eq!(t.aggregate_by_month()[&m("2024-05")][&MetricType::TotalItemRequests], u64::MAX);
    }
}
