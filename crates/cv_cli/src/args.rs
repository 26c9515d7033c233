// crates/cv_cli/src/args.rs
//
// Offline CLI argument surface: `cv validate <path> [flags]`.
// - Input is a local file; URL-like paths are rejected before anything is read
// - --format overrides the extension/first-byte guess
// - --release makes a header with another Release Fatal
// - --fail-on sets the lowest severity that yields exit code 2

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use cv_core::diagnostics::Severity;
use cv_core::rules::Release;
use cv_io::document::InputFormat;

/// Parsed CLI arguments (raw).
#[derive(Debug, Parser, Clone)]
#[command(
    name = "cv",
    disable_help_subcommand = true,
    about = "Offline validator and normalizer for COUNTER R5 / R5.1 reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate one report, print its diagnostics and optionally write the normalized report.
    Validate(ValidateArgs),
}

#[derive(Debug, ClapArgs, Clone)]
pub struct ValidateArgs {
    /// Report file (.json, or tab-separated .tsv/.txt).
    pub path: PathBuf,

    /// Input format; guessed from the extension when omitted.
    #[arg(long, value_parser = parse_format)]
    pub format: Option<InputFormat>,

    /// Expected Release (5 or 5.1).
    #[arg(long, value_parser = parse_release)]
    pub release: Option<Release>,

    /// Write the normalized report (canonical JSON) to this path.
    #[arg(long)]
    pub normalized: Option<PathBuf>,

    /// Diagnostics output on stdout.
    #[arg(long, value_enum, default_value_t = DiagnosticsFormat::Text)]
    pub diagnostics: DiagnosticsFormat,

    /// Lowest severity that fails the run (notice, warning, error, critical, fatal).
    #[arg(long, default_value = "error", value_parser = parse_severity)]
    pub fail_on: Severity,

    /// Do not report clean merges of repeated records.
    #[arg(long)]
    pub no_merge_notices: bool,

    /// Debug-level logging on stderr (RUST_LOG takes precedence).
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DiagnosticsFormat {
    Text,
    Json,
}

/// Errors surfaced by argument validation.
/// Keep messages short/stable (handy for scripts/tests).
#[derive(Debug)]
pub enum CliError {
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CliError::*;
        match self {
            NonLocalPath(p) => write!(f, "path must be a local file (no scheme): {p}"),
            NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}
impl std::error::Error for CliError {}

pub fn parse_format(s: &str) -> Result<InputFormat, String> {
    s.parse()
}

pub fn parse_release(s: &str) -> Result<Release, String> {
    s.parse::<Release>().map_err(|e| e.to_string())
}

pub fn parse_severity(s: &str) -> Result<Severity, String> {
    s.parse()
}

/// Reject any explicit URI scheme (e.g., http://, https://, file://).
#[inline]
fn has_scheme(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("file:")
}

#[inline]
fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    if let Some(s) = p.to_str() {
        if has_scheme(s) {
            return Err(CliError::NonLocalPath(s.to_string()));
        }
    }
    Ok(())
}

/// Ensure a path is local and exists as a regular file.
fn ensure_local_exists(p: &Path) -> Result<(), CliError> {
    ensure_local_path(p)?;
    let meta = fs::metadata(p).map_err(|_| CliError::NotFound(p.display().to_string()))?;
    if !meta.is_file() {
        return Err(CliError::NotFound(p.display().to_string()));
    }
    Ok(())
}

/// Best-effort normalization to an absolute path.
fn normalize_path(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(p)
        }
    })
}

/// Entry point used by main.rs. Clap itself exits with status 2 on usage errors.
pub fn parse_and_validate() -> Result<Cli, CliError> {
    let mut cli = Cli::parse();
    let Command::Validate(args) = &mut cli.command;

    ensure_local_exists(&args.path)?;
    args.path = normalize_path(&args.path);
    if let Some(out) = args.normalized.take() {
        ensure_local_path(&out)?;
        args.normalized = Some(normalize_path(&out));
    }
    Ok(cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_flags_parse() {
        let cli = Cli::try_parse_from([
            "cv",
            "validate",
            "tr.json",
            "--release",
            "5.1",
            "--fail-on",
            "critical",
            "--diagnostics",
            "json",
        ])
        .unwrap();
        let Command::Validate(a) = cli.command;
        assert_eq!(a.path, PathBuf::from("tr.json"));
        assert_eq!(a.release, Some(Release::R51));
        assert_eq!(a.fail_on, Severity::Critical);
        assert_eq!(a.diagnostics, DiagnosticsFormat::Json);
        assert!(a.format.is_none());
        assert!(!a.verbose);
    }

    #[test]
    fn defaults_fail_on_error_with_text_output() {
        let cli = Cli::try_parse_from(["cv", "validate", "tr.tsv", "--format", "tabular"]).unwrap();
        let Command::Validate(a) = cli.command;
        assert_eq!(a.fail_on, Severity::Error);
        assert_eq!(a.diagnostics, DiagnosticsFormat::Text);
        assert_eq!(a.format, Some(InputFormat::Tabular));
    }

    #[test]
    fn bad_values_are_usage_errors() {
        assert!(Cli::try_parse_from(["cv", "validate", "x.json", "--release", "4"]).is_err());
        assert!(Cli::try_parse_from(["cv", "validate", "x.json", "--fail-on", "loud"]).is_err());
        assert!(Cli::try_parse_from(["cv", "validate", "x.json", "--format", "xlsx"]).is_err());
    }

    #[test]
    fn ensure_local_path_rejects_schemes() {
        assert!(ensure_local_path(Path::new("http://x")).is_err());
        assert!(ensure_local_path(Path::new("file://C:/x.json")).is_err());
        assert!(ensure_local_path(Path::new("/tmp/report.json")).is_ok());
    }

    #[test]
    fn normalize_path_returns_absolute() {
        assert!(normalize_path(Path::new("does/not/exist.json")).is_absolute());
    }
}
