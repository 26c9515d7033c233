// crates/cv_cli/src/main.rs
//
// `cv validate`: load one report, reconcile it, print diagnostics and
// optionally write the normalized report. Exit status reflects the most
// serious outcome of the run.

mod args;

mod exitcodes {
    pub const OK: i32 = 0;
    /// Diagnostics at or above `--fail-on`.
    pub const FINDINGS: i32 = 2;
    /// Fatal diagnostic or unreadable document.
    pub const FATAL: i32 = 3;
    pub const IO: i32 = 4;
}

use std::io::Write;
use std::process::ExitCode;

use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::{parse_and_validate, CliError, Command, DiagnosticsFormat, ValidateArgs};
use cv_core::diagnostics::{Diagnostic, DiagnosticLog, Severity};
use cv_io::canonical_json::{to_canonical_string, write_canonical_file};
use cv_io::config::BuiltinRules;
use cv_io::document::load_path;
use cv_io::hasher::sha256_file;
use cv_io::IoError;
use cv_pipeline::{validate_document, EngineOptions, PipelineError};

/// Central error type for CLI → exit-code mapping.
#[derive(Debug)]
enum MainError {
    /// The document could not be parsed at all.
    Document(String),
    /// Read/write/path/limit failures.
    Io(String),
    /// Engine failure (a bug, not a data problem).
    Pipeline(String),
}

impl std::fmt::Display for MainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainError::Document(m) => write!(f, "unreadable document: {m}"),
            MainError::Io(m) => write!(f, "i/o: {m}"),
            MainError::Pipeline(m) => write!(f, "engine: {m}"),
        }
    }
}

fn main() -> ExitCode {
    let cli = match parse_and_validate() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cv: error: {e}");
            return ExitCode::from(map_cli_err(&e) as u8);
        }
    };
    let Command::Validate(args) = cli.command;
    init_tracing(args.verbose);

    let rc = match run_validate(&args) {
        Ok(rc) => rc,
        Err(e) => {
            eprintln!("cv: error: {e}");
            map_error(&e)
        }
    };
    ExitCode::from(rc as u8)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_validate(args: &ValidateArgs) -> Result<i32, MainError> {
    let document = load_path(&args.path, args.format).map_err(map_io_err)?;
    let digest = sha256_file(&args.path).map_err(map_io_err)?;
    info!(path = %args.path.display(), format = ?document.format(), sha256 = %digest, "document loaded");

    let rules = BuiltinRules::new();
    let options = EngineOptions {
        fail_on: args.fail_on,
        merge_notices: !args.no_merge_notices,
        expect_release: args.release,
        ..EngineOptions::default()
    };
    let mut log = DiagnosticLog::new();
    let report = validate_document(&document, &rules, &mut log, &options).map_err(map_pipeline_err)?;

    print_diagnostics(&log, args.diagnostics)?;

    if let (Some(report), Some(out)) = (&report, &args.normalized) {
        write_canonical_file(out, &report.to_normalized_json()).map_err(map_io_err)?;
        info!(path = %out.display(), items = report.usable_items(), "normalized report written");
    }

    let failing = log.count_at_least(options.fail_on);
    info!(diagnostics = log.len(), failing, max = ?log.max_severity(), "validation finished");
    Ok(exit_status(report.is_some(), &log, options.fail_on))
}

/// Fatal beats findings; findings beat success.
fn exit_status(processed: bool, log: &DiagnosticLog, fail_on: Severity) -> i32 {
    if !processed || log.max_severity() == Some(Severity::Fatal) {
        exitcodes::FATAL
    } else if log.count_at_least(fail_on) > 0 {
        exitcodes::FINDINGS
    } else {
        exitcodes::OK
    }
}

fn diagnostic_json(d: &Diagnostic) -> Value {
    let mut v = json!({
        "severity": d.severity.to_string(),
        "summary": d.summary,
        "message": d.message,
        "position": d.position.to_string(),
    });
    if let Some(data) = &d.data {
        v["data"] = Value::String(data.clone());
    }
    if let Some(hint) = &d.hint {
        v["hint"] = Value::String(hint.clone());
    }
    v
}

fn print_diagnostics(log: &DiagnosticLog, format: DiagnosticsFormat) -> Result<(), MainError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let io = |e: std::io::Error| MainError::Io(format!("stdout: {e}"));
    match format {
        DiagnosticsFormat::Json => {
            let list = Value::Array(log.entries().iter().map(diagnostic_json).collect());
            let text = to_canonical_string(&list).map_err(map_io_err)?;
            writeln!(out, "{text}").map_err(io)?;
        }
        DiagnosticsFormat::Text => {
            for d in log.entries() {
                write!(out, "{}\t{}\t{}: {}", d.severity, d.position, d.summary, d.message).map_err(io)?;
                if let Some(data) = &d.data {
                    write!(out, " [{data}]").map_err(io)?;
                }
                writeln!(out).map_err(io)?;
            }
        }
    }
    Ok(())
}

fn map_error(e: &MainError) -> i32 {
    use exitcodes::*;
    match e {
        MainError::Document(_) => FATAL,
        MainError::Io(_) => IO,
        MainError::Pipeline(_) => IO,
    }
}

fn map_cli_err(e: &CliError) -> i32 {
    match e {
        CliError::NonLocalPath(_) | CliError::NotFound(_) => exitcodes::IO,
    }
}

/// Translate cv_io::IoError into MainError buckets for exit-code mapping.
fn map_io_err(e: IoError) -> MainError {
    use IoError::*;
    match e {
        Json { pointer, msg } => MainError::Document(format!("json {pointer}: {msg}")),
        Tabular { row, msg } => MainError::Document(format!("tabular row {row}: {msg}")),
        Unsupported(m) => MainError::Document(m),
        Path(m) => MainError::Io(format!("path: {m}")),
        Limit(m) => MainError::Io(format!("limit: {m}")),
    }
}

fn map_pipeline_err(e: PipelineError) -> MainError {
    MainError::Pipeline(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::diagnostics::{DiagnosticSink, Position};

    fn log_with(severities: &[Severity]) -> DiagnosticLog {
        let mut log = DiagnosticLog::new();
        for s in severities {
            log.emit(Diagnostic::new(*s, "Test", "test finding", Position::Document));
        }
        log
    }

    #[test]
    fn exit_status_follows_threshold() {
        assert_eq!(exit_status(true, &log_with(&[]), Severity::Error), exitcodes::OK);
        assert_eq!(exit_status(true, &log_with(&[Severity::Warning]), Severity::Error), exitcodes::OK);
        assert_eq!(exit_status(true, &log_with(&[Severity::Warning]), Severity::Warning), exitcodes::FINDINGS);
        assert_eq!(exit_status(true, &log_with(&[Severity::Critical]), Severity::Error), exitcodes::FINDINGS);
        assert_eq!(exit_status(false, &log_with(&[Severity::Fatal]), Severity::Error), exitcodes::FATAL);
    }

    #[test]
    fn diagnostic_json_omits_absent_fields() {
        let d = Diagnostic::new(Severity::Error, "Count missing", "no count", Position::cell(8, 16)).with_data("x");
        let v = diagnostic_json(&d);
        assert_eq!(v["position"], "I16");
        assert_eq!(v["severity"], Severity::Error.to_string());
        assert_eq!(v["data"], "x");
        assert!(v.get("hint").is_none());
    }
}
