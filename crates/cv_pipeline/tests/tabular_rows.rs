//! Tabular (tab-separated) reports: one metric per row, rows of the same
//! item merged silently, findings positioned at cells.

use assert_json_diff::assert_json_eq;
use serde_json::json;

use cv_core::diagnostics::{DiagnosticLog, Severity};
use cv_io::config::BuiltinRules;
use cv_io::document::{Document, TabularSheet};
use cv_pipeline::report::Report;
use cv_pipeline::{validate_document, EngineOptions};

const HEADER: &str = "Report_Name\tTitle Master Report\n\
Report_ID\tTR\n\
Release\t5.1\n\
Institution_Name\tTest Library\n\
Institution_ID\tISNI:0000000419369078\n\
Metric_Types\tTotal_Item_Requests; Unique_Item_Requests\n\
Report_Filters\t\n\
Report_Attributes\tAttributes_To_Show=Data_Type|Access_Method\n\
Exceptions\t\n\
Reporting_Period\tBegin_Date=2024-01-01; End_Date=2024-02-29\n\
Created\t2024-03-05T09:00:00Z\n\
Created_By\tExample Platform\n\
Registry_Record\thttps://registry.countermetrics.org/platform/example\n\
\n";

const HEADINGS: &str =
    "Title\tPublisher\tPlatform\tOnline_ISSN\tData_Type\tAccess_Method\tMetric_Type\tReporting_Period_Total\tJan-2024\tFeb-2024\n";

fn row(metric: &str, total: u64, jan: u64, feb: u64) -> String {
    format!(
        "Journal of Tests\tExample Press\tExample Platform\t1234-5678\tJournal\tRegular\t{metric}\t{total}\t{jan}\t{feb}\n"
    )
}

fn run(rows: &[String]) -> (Option<Report>, DiagnosticLog) {
    let text = format!("{HEADER}{HEADINGS}{}", rows.concat());
    let sheet = TabularSheet::parse(&text).unwrap();
    let rules = BuiltinRules::new();
    let mut log = DiagnosticLog::new();
    let report = validate_document(&Document::Tabular(sheet), &rules, &mut log, &EngineOptions::default()).unwrap();
    (report, log)
}

#[test]
fn metric_rows_of_one_item_merge_without_notices() {
    let (report, log) = run(&[row("Total_Item_Requests", 9, 5, 4), row("Unique_Item_Requests", 5, 3, 2)]);
    let report = report.unwrap();

    assert!(log.is_empty(), "{:?}", log.entries());
    assert_eq!(report.usable_items(), 1);

    let normalized = report.to_normalized_json();
    assert_json_eq!(
        normalized["Report_Items"],
        json!([{
            "Title": "Journal of Tests",
            "Item_ID": {"Online_ISSN": "1234-5678"},
            "Platform": "Example Platform",
            "Publisher": "Example Press",
            "Attribute_Performance": [{
                "Data_Type": "Journal",
                "Access_Method": "Regular",
                "Performance": {
                    "Total_Item_Requests": {"2024-01": 5, "2024-02": 4},
                    "Unique_Item_Requests": {"2024-01": 3, "2024-02": 2}
                }
            }]
        }])
    );
    assert_eq!(normalized["Report_Header"]["Report_Filters"]["Begin_Date"], "2024-01-01");
    assert_eq!(normalized["Report_Header"]["Institution_ID"]["ISNI"], "0000000419369078");
}

#[test]
fn reporting_period_total_must_match_the_months() {
    let (report, log) = run(&[row("Total_Item_Requests", 10, 5, 4), row("Unique_Item_Requests", 5, 3, 2)]);
    assert!(report.is_some());

    let errors: Vec<_> = log.entries().iter().filter(|d| d.severity == Severity::Error).collect();
    assert_eq!(errors.len(), 1, "{:?}", log.entries());
    assert_eq!(errors[0].summary, "Reporting_Period_Total mismatch");
    assert_eq!(errors[0].position.to_string(), "H16");
    assert_eq!(errors[0].data.as_deref(), Some("10, 9"));
}

#[test]
fn relation_violations_point_at_month_cells() {
    let (report, log) = run(&[row("Total_Item_Requests", 9, 5, 4), row("Unique_Item_Requests", 10, 6, 4)]);
    let report = report.unwrap();

    assert_eq!(log.count(Severity::Critical), 1, "{:?}", log.entries());
    let critical = log.entries().iter().find(|d| d.severity == Severity::Critical).unwrap();
    assert!(critical.position.is_tabular());
    assert!(critical.position.to_string().starts_with('I'), "{}", critical.position);
    assert_eq!(critical.data.as_deref(), Some("Total_Item_Requests: 5, Unique_Item_Requests: 6"));
    assert_eq!(report.usable_items(), 0);
}

#[test]
fn empty_count_cells_are_errors_at_the_cell() {
    let blank = "Journal of Tests\tExample Press\tExample Platform\t1234-5678\tJournal\tRegular\tTotal_Item_Requests\t5\t5\t\n";
    let (_, log) = run(&[blank.to_string()]);

    let missing = log.entries().iter().find(|d| d.summary == "Count missing").unwrap();
    assert_eq!(missing.severity, Severity::Error);
    assert_eq!(missing.position.to_string(), "J16");
}

#[test]
fn repeated_and_unknown_columns_are_reported() {
    let text = format!(
        "{HEADER}Title\tTitle\tShoe_Size\tMetric_Type\tJan-2024\n\
         Journal of Tests\tJournal of Tests\t42\tTotal_Item_Requests\t1\n"
    );
    let sheet = TabularSheet::parse(&text).unwrap();
    let mut log = DiagnosticLog::new();
    let _ = validate_document(&Document::Tabular(sheet), &BuiltinRules::new(), &mut log, &EngineOptions::default())
        .unwrap();

    let duplicate = log.entries().iter().find(|d| d.summary == "Duplicate column").unwrap();
    assert_eq!(duplicate.position.to_string(), "B15");
    let unknown = log.entries().iter().find(|d| d.summary == "Unknown column").unwrap();
    assert_eq!(unknown.position.to_string(), "C15");
}

#[test]
fn sheets_without_month_columns_carry_no_usage() {
    let text = format!(
        "{HEADER}Title\tPublisher\tPlatform\tOnline_ISSN\tData_Type\tAccess_Method\tMetric_Type\tReporting_Period_Total\n\
         Journal of Tests\tExample Press\tExample Platform\t1234-5678\tJournal\tRegular\tTotal_Item_Requests\t9\n"
    );
    let sheet = TabularSheet::parse(&text).unwrap();
    let mut log = DiagnosticLog::new();
    let report = validate_document(&Document::Tabular(sheet), &BuiltinRules::new(), &mut log, &EngineOptions::default())
        .unwrap()
        .unwrap();

    assert!(log.entries().iter().any(|d| d.summary == "Monthly details missing"));
    assert_eq!(report.usable_items(), 0);
}

#[test]
fn month_sums_beyond_a_count_are_invalid_not_a_mismatch() {
    let (report, log) = run(&[row("Total_Item_Requests", 0, u64::MAX, 1)]);
    assert!(report.is_some());

    let invalid: Vec<_> = log.entries().iter().filter(|d| d.summary == "Invalid Count").collect();
    assert_eq!(invalid.len(), 1, "{:?}", log.entries());
    assert_eq!(invalid[0].severity, Severity::Error);
    assert_eq!(invalid[0].position.to_string(), "J16");
    assert!(log.entries().iter().all(|d| d.summary != "Reporting_Period_Total mismatch"));
}
