//! COUNTER Metric_Types (identical vocabulary in R5 and R5.1).
//!
//! Declaration order is the canonical output order.

use core::fmt;
use core::str::FromStr;

use crate::errors::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MetricType {
    SearchesPlatform,
    SearchesAutomated,
    SearchesFederated,
    SearchesRegular,
    TotalItemInvestigations,
    TotalItemRequests,
    UniqueItemInvestigations,
    UniqueItemRequests,
    UniqueTitleInvestigations,
    UniqueTitleRequests,
    LimitExceeded,
    NoLicense,
}

/// Which unit a metric counts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricLevel {
    Item,
    Title,
    Search,
    Denial,
}

impl MetricType {
    pub const ALL: [MetricType; 12] = [
        MetricType::SearchesPlatform,
        MetricType::SearchesAutomated,
        MetricType::SearchesFederated,
        MetricType::SearchesRegular,
        MetricType::TotalItemInvestigations,
        MetricType::TotalItemRequests,
        MetricType::UniqueItemInvestigations,
        MetricType::UniqueItemRequests,
        MetricType::UniqueTitleInvestigations,
        MetricType::UniqueTitleRequests,
        MetricType::LimitExceeded,
        MetricType::NoLicense,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::SearchesPlatform => "Searches_Platform",
            MetricType::SearchesAutomated => "Searches_Automated",
            MetricType::SearchesFederated => "Searches_Federated",
            MetricType::SearchesRegular => "Searches_Regular",
            MetricType::TotalItemInvestigations => "Total_Item_Investigations",
            MetricType::TotalItemRequests => "Total_Item_Requests",
            MetricType::UniqueItemInvestigations => "Unique_Item_Investigations",
            MetricType::UniqueItemRequests => "Unique_Item_Requests",
            MetricType::UniqueTitleInvestigations => "Unique_Title_Investigations",
            MetricType::UniqueTitleRequests => "Unique_Title_Requests",
            MetricType::LimitExceeded => "Limit_Exceeded",
            MetricType::NoLicense => "No_License",
        }
    }

    pub fn level(self) -> MetricLevel {
        match self {
            MetricType::SearchesPlatform
            | MetricType::SearchesAutomated
            | MetricType::SearchesFederated
            | MetricType::SearchesRegular => MetricLevel::Search,
            MetricType::TotalItemInvestigations
            | MetricType::TotalItemRequests
            | MetricType::UniqueItemInvestigations
            | MetricType::UniqueItemRequests => MetricLevel::Item,
            MetricType::UniqueTitleInvestigations | MetricType::UniqueTitleRequests => MetricLevel::Title,
            MetricType::LimitExceeded | MetricType::NoLicense => MetricLevel::Denial,
        }
    }

    /// Database-level searches (everything except `Searches_Platform`).
    pub fn is_database_search(self) -> bool {
        matches!(
            self,
            MetricType::SearchesAutomated | MetricType::SearchesFederated | MetricType::SearchesRegular
        )
    }

    /// Case-insensitive lookup, used to offer a fix for `total_item_requests`.
    pub fn from_str_ignore_case(s: &str) -> Option<MetricType> {
        MetricType::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::UnknownMetric(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for m in MetricType::ALL {
            assert_eq!(m.as_str().parse::<MetricType>().unwrap(), m);
        }
        assert!("Total_Item_Request".parse::<MetricType>().is_err());
        assert_eq!(
            MetricType::from_str_ignore_case("unique_item_requests"),
            Some(MetricType::UniqueItemRequests)
        );
    }

    #[test]
    fn classifies_levels_and_activities() {
        assert_eq!(MetricType::UniqueTitleRequests.level(), MetricLevel::Title);
        assert_eq!(MetricType::TotalItemInvestigations.level(), MetricLevel::Item);
        assert!(!MetricType::SearchesPlatform.is_database_search());
    }
}
