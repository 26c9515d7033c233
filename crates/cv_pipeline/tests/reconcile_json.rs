//! End-to-end reconciliation of JSON reports: merging, conflicts, relations,
//! zero counts and the normalized round trip.

use assert_json_diff::assert_json_eq;
use serde_json::{json, Value};

use cv_core::diagnostics::{DiagnosticLog, Severity};
use cv_core::metric::MetricType;
use cv_core::month::Month;
use cv_io::config::BuiltinRules;
use cv_io::document::{Document, JsonDocument};
use cv_pipeline::collection::{DUPLICATE, MERGED};
use cv_pipeline::performance::{CONFLICT_DIFFERENT, CONFLICT_IDENTICAL, ZERO_COUNT};
use cv_pipeline::report::{Report, ReportBody};
use cv_pipeline::{validate_document, EngineOptions, Node};

fn tr51(items: Value) -> Value {
    json!({
        "Report_Header": {
            "Report_Name": "Title Master Report",
            "Report_ID": "TR",
            "Release": "5.1",
            "Institution_Name": "Test Library",
            "Created": "2024-04-02T10:00:00Z",
            "Created_By": "Example Platform",
            "Registry_Record": "https://registry.countermetrics.org/platform/example",
            "Report_Filters": {"Begin_Date": "2024-01-01", "End_Date": "2024-03-31"},
            "Report_Attributes": {"Attributes_To_Show": ["Data_Type", "Access_Method"]}
        },
        "Report_Items": items
    })
}

fn journal(access_method: &str, performance: Value) -> Value {
    json!({
        "Title": "Journal of Tests",
        "Item_ID": {"Online_ISSN": "1234-5678"},
        "Platform": "Example Platform",
        "Publisher": "Example Press",
        "Attribute_Performance": [{
            "Data_Type": "Journal",
            "Access_Method": access_method,
            "Performance": performance
        }]
    })
}

fn run(root: Value) -> (Option<Report>, DiagnosticLog) {
    let rules = BuiltinRules::new();
    let mut log = DiagnosticLog::new();
    let doc = Document::Json(JsonDocument { root });
    let report = validate_document(&doc, &rules, &mut log, &EngineOptions::default()).unwrap();
    (report, log)
}

fn month(s: &str) -> Month {
    s.parse().unwrap()
}

fn only_r51_items(report: &Report) -> &cv_pipeline::collection::MergeCollection<cv_pipeline::r51::ReportItem> {
    match report.body() {
        ReportBody::R51Items(items) => items,
        other => panic!("unexpected body {other:?}"),
    }
}

#[test]
fn repeated_item_with_disjoint_months_is_merged_with_one_notice() {
    let (report, log) = run(tr51(json!([
        journal("Regular", json!({"Total_Item_Requests": {"2024-01": 5}, "Unique_Item_Requests": {"2024-01": 3}})),
        journal("Regular", json!({"Total_Item_Requests": {"2024-02": 4}, "Unique_Item_Requests": {"2024-02": 2}})),
    ])));
    let report = report.unwrap();

    assert_eq!(log.len(), 1, "{:?}", log.entries());
    let notice = &log.entries()[0];
    assert_eq!(notice.severity, Severity::Notice);
    assert_eq!(notice.summary, MERGED);
    assert!(notice.hint.is_some());

    let out = report.to_normalized_json();
    assert_json_eq!(
        out["Report_Items"],
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
}

#[test]
fn conflicting_counts_keep_the_first_and_drop_the_record() {
    let (report, log) = run(tr51(json!([
        journal("Regular", json!({"Total_Item_Investigations": {"2024-01": 5}})),
        journal("Regular", json!({"Total_Item_Investigations": {"2024-01": 7}})),
    ])));
    let report = report.unwrap();

    assert_eq!(log.count(Severity::Critical), 1, "{:?}", log.entries());
    let critical = log.with_summary(CONFLICT_DIFFERENT).next().unwrap();
    assert_eq!(critical.data.as_deref(), Some("5, 7"));
    assert_eq!(log.with_summary(DUPLICATE).count(), 1);

    let items = only_r51_items(&report);
    let item = &items.entries()[0];
    assert!(!item.is_usable());
    let block = &item.blocks().entries()[0];
    assert_eq!(block.performance().get(MetricType::TotalItemInvestigations, month("2024-01")), Some(5));
    assert_eq!(report.to_normalized_json()["Report_Items"], json!([]));
}

#[test]
fn identical_repeated_counts_are_still_a_conflict() {
    let perf = json!({"Total_Item_Requests": {"2024-03": 2}, "Unique_Item_Requests": {"2024-03": 2}});
    let (_, log) = run(tr51(json!([journal("Regular", perf.clone()), journal("Regular", perf)])));
    assert_eq!(log.with_summary(CONFLICT_IDENTICAL).count(), 2);
    assert_eq!(log.count(Severity::Critical), 2);
}

#[test]
fn unique_without_total_is_critical() {
    let (report, log) = run(tr51(json!([journal("Regular", json!({"Unique_Item_Requests": {"2024-01": 3}}))])));
    let critical: Vec<_> = log.entries().iter().filter(|d| d.severity == Severity::Critical).collect();
    assert_eq!(critical.len(), 1, "{:?}", log.entries());
    assert_eq!(critical[0].summary, "Total_Item_Requests is missing while Unique_Item_Requests is present");
    assert_eq!(report.unwrap().usable_items(), 0);
}

#[test]
fn total_below_unique_carries_both_counts() {
    let (_, log) = run(tr51(json!([journal(
        "Regular",
        json!({"Total_Item_Requests": {"2024-01": 3}, "Unique_Item_Requests": {"2024-01": 5}})
    )])));
    let found: Vec<_> = log.with_summary("Unique_Item_Requests is greater than Total_Item_Requests").collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].data.as_deref(), Some("Total_Item_Requests: 3, Unique_Item_Requests: 5"));
}

#[test]
fn zero_only_block_becomes_unusable() {
    let (report, log) = run(tr51(json!([journal("Regular", json!({"Total_Item_Requests": {"2024-01": 0}}))])));
    let zero = log.with_summary(ZERO_COUNT).next().unwrap();
    assert_eq!(zero.severity, Severity::Error);
    assert_eq!(zero.position.to_string(), ".Report_Items[0].Attribute_Performance[0].Performance.Total_Item_Requests.2024-01");

    let report = report.unwrap();
    let item = &only_r51_items(&report).entries()[0];
    assert!(!item.blocks().entries()[0].is_usable());
    assert!(item.blocks().entries()[0].performance().is_empty());
    assert!(!item.is_usable());
}

#[test]
fn fixed_values_round_trip_without_new_errors() {
    let (report, log) = run(tr51(json!([journal(
        "regular",
        json!({"Total_Item_Requests": {"2024-01": 5}, "Unique_Item_Requests": {"2024-01": 3}})
    )])));
    assert_eq!(log.count_at_least(Severity::Error), 1, "{:?}", log.entries());
    assert_eq!(log.entries()[0].summary, "Wrong capitalization");

    let report = report.unwrap();
    let block = &only_r51_items(&report).entries()[0].blocks().entries()[0];
    assert!(block.is_fixed());

    let normalized = report.to_normalized_json();
    assert_eq!(normalized["Report_Items"][0]["Attribute_Performance"][0]["Access_Method"], "Regular");
    let (again, log) = run(normalized.clone());
    assert_eq!(log.count_at_least(Severity::Error), 0, "{:?}", log.entries());
    assert_json_eq!(again.unwrap().to_normalized_json(), normalized);
}

#[test]
fn missing_identity_drops_the_record_and_keeps_the_raw_fragment() {
    let mut bad = journal("Regular", json!({"Total_Item_Requests": {"2024-01": 1}, "Unique_Item_Requests": {"2024-01": 1}}));
    if let Value::Object(o) = &mut bad {
        o.remove("Title");
        o.remove("Item_ID");
    }
    let (report, log) = run(tr51(json!([bad])));
    assert_eq!(log.with_summary("Identifying elements missing").count(), 1);
    let report = report.unwrap();
    let items = only_r51_items(&report);
    assert_eq!(items.rejected().len(), 1);
    assert!(items.rejected()[0].entity().invalid.contains_key("_raw"));
    assert_eq!(report.usable_items(), 0);
}

#[test]
fn unknown_report_id_is_fatal() {
    let mut root = tr51(json!([]));
    root["Report_Header"]["Report_ID"] = json!("XX_9");
    let (report, log) = run(root);
    assert!(report.is_none());
    assert_eq!(log.max_severity(), Some(Severity::Fatal));
}

#[test]
fn missing_report_items_is_fatal() {
    let mut root = tr51(json!([]));
    if let Value::Object(o) = &mut root {
        o.remove("Report_Items");
    }
    let (report, log) = run(root);
    assert!(report.is_none());
    assert_eq!(log.with_summary("Report_Items missing").count(), 1);
}

#[test]
fn unshown_attribute_is_rejected() {
    let mut item = journal("Regular", json!({"Total_Item_Requests": {"2024-01": 2}, "Unique_Item_Requests": {"2024-01": 1}}));
    item["Attribute_Performance"][0]["YOP"] = json!("2020");
    let (report, log) = run(tr51(json!([item])));
    assert_eq!(log.with_summary("Unexpected attribute").count(), 1);
    let report = report.unwrap();
    let block = &only_r51_items(&report).entries()[0].blocks().entries()[0];
    assert!(block.is_usable());
    assert!(block.entity().invalid.contains_key("YOP"));
    assert!(block.is_invalid());
}

/* -------------------------------- Release 5 ------------------------------- */

fn ir5(items: Value) -> Value {
    json!({
        "Report_Header": {
            "Report_Name": "Item Master Report",
            "Report_ID": "IR",
            "Release": "5",
            "Institution_Name": "Test Library",
            "Created": "2024-04-02T10:00:00Z",
            "Created_By": "Example Platform",
            "Report_Filters": [
                {"Name": "Begin_Date", "Value": "2024-01-01"},
                {"Name": "End_Date", "Value": "2024-01-31"}
            ],
            "Report_Attributes": [{"Name": "Include_Parent_Details", "Value": "True"}]
        },
        "Report_Items": items
    })
}

fn article(name: &str, doi: &str) -> Value {
    json!({
        "Item": name,
        "Item_ID": [{"Type": "DOI", "Value": doi}],
        "Platform": "Example Platform",
        "Publisher": "Example Press",
        "Item_Parent": {
            "Item_Name": "Journal of Tests",
            "Item_ID": [{"Type": "Online_ISSN", "Value": "1234-5678"}],
            "Data_Type": "Journal"
        },
        "Performance": [{
            "Period": {"Begin_Date": "2024-01-01", "End_Date": "2024-01-31"},
            "Instance": [
                {"Metric_Type": "Total_Item_Requests", "Count": 4},
                {"Metric_Type": "Unique_Item_Requests", "Count": 2}
            ]
        }]
    })
}

#[test]
fn r5_parents_are_interned_once_and_written_per_item() {
    let (report, log) = run(ir5(json!([article("Article A", "10.1000/a1"), article("Article B", "10.1000/b2")])));
    assert!(log.is_empty(), "{:?}", log.entries());
    let report = report.unwrap();
    match report.body() {
        ReportBody::R5 { items, parents } => {
            assert_eq!(items.len(), 2);
            assert_eq!(parents.len(), 1);
            let hash = items.entries()[0].parent_hash().unwrap();
            assert_eq!(Some(hash), items.entries()[1].parent_hash());
        }
        other => panic!("unexpected body {other:?}"),
    }

    let out = report.to_normalized_json();
    assert_json_eq!(
        out["Report_Items"][1],
        json!({
            "Item": "Article B",
            "Item_ID": [{"Type": "DOI", "Value": "10.1000/b2"}],
            "Platform": "Example Platform",
            "Publisher": "Example Press",
            "Item_Parent": {
                "Item_Name": "Journal of Tests",
                "Item_ID": [{"Type": "Online_ISSN", "Value": "1234-5678"}],
                "Data_Type": "Journal"
            },
            "Performance": [{
                "Period": {"Begin_Date": "2024-01-01", "End_Date": "2024-01-31"},
                "Instance": [
                    {"Metric_Type": "Total_Item_Requests", "Count": 4},
                    {"Metric_Type": "Unique_Item_Requests", "Count": 2}
                ]
            }]
        })
    );
}

#[test]
fn r5_parent_without_details_flag_is_rejected() {
    let mut root = ir5(json!([article("Article A", "10.1000/a1")]));
    root["Report_Header"]["Report_Attributes"] = json!([]);
    let (report, log) = run(root);
    assert_eq!(log.with_summary("Unexpected element").count(), 1, "{:?}", log.entries());
    let report = report.unwrap();
    assert_eq!(report.usable_items(), 1);
    assert!(report.to_normalized_json()["Report_Items"][0].get("Item_Parent").is_none());
}

#[test]
fn r5_quoted_count_is_fixed() {
    let mut item = article("Article A", "10.1000/a1");
    item["Performance"][0]["Instance"][0]["Count"] = json!("4");
    let (report, log) = run(ir5(json!([item])));
    let wrong = log.with_summary("Wrong data type").next().unwrap();
    assert_eq!(wrong.position.to_string(), ".Report_Items[0].Performance[0].Instance[0].Count");
    let report = report.unwrap();
    match report.body() {
        ReportBody::R5 { items, .. } => {
            assert!(items.entries()[0].is_fixed());
            assert_eq!(items.entries()[0].performance().get(MetricType::TotalItemRequests, month("2024-01")), Some(4));
        }
        other => panic!("unexpected body {other:?}"),
    }
}
