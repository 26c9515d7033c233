//! `cv validate` end to end: exit codes, diagnostics on stdout, normalized output.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn report(performance: Value) -> Value {
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
        "Report_Items": [{
            "Title": "Journal of Tests",
            "Item_ID": {"Online_ISSN": "1234-5678"},
            "Platform": "Example Platform",
            "Publisher": "Example Press",
            "Attribute_Performance": [{
                "Data_Type": "Journal",
                "Access_Method": "Regular",
                "Performance": performance
            }]
        }]
    })
}

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn cv(path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cv").unwrap();
    cmd.arg("validate").arg(path);
    cmd
}

#[test]
fn clean_report_exits_zero_and_writes_normalized_json() {
    let dir = TempDir::new().unwrap();
    let body = report(json!({"Total_Item_Requests": {"2024-01": 5}, "Unique_Item_Requests": {"2024-01": 3}}));
    let input = write(&dir, "tr.json", &body.to_string());
    let out = dir.path().join("normalized.json");

    cv(&input).arg("--normalized").arg(&out).assert().code(0).stdout(predicate::str::is_empty());

    let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["Report_Items"][0]["Title"], "Journal of Tests");
    assert_eq!(
        written["Report_Items"][0]["Attribute_Performance"][0]["Performance"]["Total_Item_Requests"]["2024-01"],
        5
    );
}

#[test]
fn relation_violation_fails_with_findings_code() {
    let dir = TempDir::new().unwrap();
    let body = report(json!({"Total_Item_Requests": {"2024-01": 3}, "Unique_Item_Requests": {"2024-01": 5}}));
    let input = write(&dir, "tr.json", &body.to_string());

    cv(&input).assert().code(2).stdout(predicate::str::contains("Critical"));
}

#[test]
fn fail_on_fatal_tolerates_critical_findings() {
    let dir = TempDir::new().unwrap();
    let body = report(json!({"Total_Item_Requests": {"2024-01": 3}, "Unique_Item_Requests": {"2024-01": 5}}));
    let input = write(&dir, "tr.json", &body.to_string());

    cv(&input).args(["--fail-on", "fatal"]).assert().code(0);
}

#[test]
fn json_diagnostics_are_a_list() {
    let dir = TempDir::new().unwrap();
    let body = report(json!({"Total_Item_Requests": {"2024-01": 0}}));
    let input = write(&dir, "tr.json", &body.to_string());

    let output = cv(&input).args(["--diagnostics", "json"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let list: Value = serde_json::from_slice(&output.stdout).unwrap();
    let list = list.as_array().unwrap();
    assert!(list.iter().any(|d| d["severity"] == "Error" && d["position"].as_str().unwrap_or("").ends_with("2024-01")));
}

#[test]
fn unexpected_release_is_fatal() {
    let dir = TempDir::new().unwrap();
    let body = report(json!({"Total_Item_Requests": {"2024-01": 5}}));
    let input = write(&dir, "tr.json", &body.to_string());

    cv(&input).args(["--release", "5"]).assert().code(3).stdout(predicate::str::contains("Unexpected Release"));
}

#[test]
fn malformed_json_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "broken.json", "{\"Report_Header\": ");

    cv(&input).assert().code(3).stderr(predicate::str::contains("unreadable document"));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    cv(&dir.path().join("absent.json")).assert().code(4).stderr(predicate::str::contains("file not found"));
}

#[test]
fn tabular_input_is_detected_by_extension() {
    let dir = TempDir::new().unwrap();
    let sheet = "Report_Name\tTitle Master Report\n\
Report_ID\tTR\n\
Release\t5.1\n\
Institution_Name\tTest Library\n\
Report_Attributes\tAttributes_To_Show=Data_Type|Access_Method\n\
Reporting_Period\tBegin_Date=2024-01-01; End_Date=2024-01-31\n\
Created\t2024-02-05T09:00:00Z\n\
Created_By\tExample Platform\n\
Registry_Record\thttps://registry.countermetrics.org/platform/example\n\
\n\
Title\tPublisher\tPlatform\tOnline_ISSN\tData_Type\tAccess_Method\tMetric_Type\tReporting_Period_Total\tJan-2024\n\
Journal of Tests\tExample Press\tExample Platform\t1234-5678\tJournal\tRegular\tTotal_Item_Requests\t7\t5\n";
    let input = write(&dir, "tr.tsv", sheet);

    cv(&input).assert().code(2).stdout(predicate::str::contains("H12").and(predicate::str::contains("mismatch")));
}
