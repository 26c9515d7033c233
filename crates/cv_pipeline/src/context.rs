//! crates/cv_pipeline/src/context.rs
//! Per-document parse context: report facts resolved from the header, the
//! rule tables, the diagnostics sink and compiled identifier formats.

use std::collections::BTreeSet;

use regex::Regex;

use cv_core::diagnostics::DiagnosticSink;
use cv_core::rules::{
    FieldShape, NodeContext, NodeRules, Release, ReportProfile, RuleKey, RuleTables, Serialization,
};
use cv_core::value::FieldMap;

use crate::{EngineOptions, PipelineError};

/* ------------------------------ Report facts ------------------------------ */

/// What the header established about the report being validated.
#[derive(Clone, Debug)]
pub struct ReportContext {
    pub report_id: String,
    pub release: Release,
    pub serialization: Serialization,
    pub profile: ReportProfile,
    /// `Attributes_To_Show` of a master report (empty for standard views).
    pub attributes_to_show: Vec<String>,
    pub include_parent_details: bool,
    pub include_component_details: bool,
    /// Field names carrying typed identifiers, for release-specific output.
    pub identifier_fields: BTreeSet<String>,
}

impl ReportContext {
    pub fn new(profile: &ReportProfile, serialization: Serialization, tables: &dyn RuleTables) -> Self {
        let mut identifier_fields = BTreeSet::new();
        for context in [
            NodeContext::Header,
            NodeContext::Item,
            NodeContext::Parent,
            NodeContext::Component,
            NodeContext::AttributeBlock,
        ] {
            let key = RuleKey::new(profile.report_id.clone(), profile.release, serialization, context);
            if let Some(rules) = tables.node_rules(&key) {
                identifier_fields.extend(
                    rules
                        .fields
                        .iter()
                        .filter(|(_, r)| matches!(r.shape, FieldShape::Identifiers(_)))
                        .map(|(k, _)| k.clone()),
                );
            }
        }
        Self {
            report_id: profile.report_id.clone(),
            release: profile.release,
            serialization,
            profile: profile.clone(),
            attributes_to_show: Vec::new(),
            // Standard views with parents always carry them.
            include_parent_details: profile.supports_parents && profile.is_standard_view(),
            include_component_details: false,
            identifier_fields,
        }
    }

    pub fn key(&self, context: NodeContext) -> RuleKey {
        RuleKey::new(self.report_id.clone(), self.release, self.serialization, context)
    }

    pub fn is_tabular(&self) -> bool {
        self.serialization == Serialization::Tabular
    }

    pub fn is_ir(&self) -> bool {
        self.profile.master == "IR"
    }

    /// Attributes every attribute-bearing node must report.
    pub fn shown_attributes(&self) -> &[String] {
        if self.profile.is_master() {
            &self.attributes_to_show
        } else {
            &self.profile.attributes
        }
    }

    /// Whether an attribute may appear: shown, or restricted by a standard view.
    pub fn allows_attribute(&self, name: &str) -> bool {
        self.shown_attributes().iter().any(|a| a == name) || self.profile.restrictions.contains_key(name)
    }

    /// `Data_Type` as reported, or as implied by a standard view.
    pub fn data_type<'d>(&'d self, data: &'d FieldMap) -> Option<&'d str> {
        data.get("Data_Type")
            .and_then(|v| v.as_text())
            .or_else(|| self.profile.implied_value("Data_Type"))
    }
}

/* --------------------------- Identifier formats --------------------------- */

/// Compiled value patterns per identifier type. Types without a pattern
/// (`ISIL`, `OCLC` beyond digits, …) accept any non-empty value.
#[derive(Debug)]
pub struct IdentifierFormats {
    patterns: Vec<(&'static str, Regex)>,
}

impl IdentifierFormats {
    pub fn new() -> Result<Self, PipelineError> {
        let table: [(&'static str, &str); 9] = [
            ("DOI", r"^10\.\d{4,9}/\S+$"),
            ("ISBN", r"^97[89]-\d{1,5}-\d{1,7}-\d{1,7}-\d$"),
            ("Print_ISSN", r"^\d{4}-\d{3}[\dX]$"),
            ("Online_ISSN", r"^\d{4}-\d{3}[\dX]$"),
            ("Proprietary", r"^[^:\s]+:\S.*$"),
            ("ISNI", r"^\d{15}[\dX]$"),
            ("ROR", r"^0[a-hj-km-np-tv-z0-9]{6}\d{2}$"),
            ("URI", r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$"),
            ("OCLC", r"^\d+$"),
        ];
        let mut patterns = Vec::with_capacity(table.len());
        for (id_type, pattern) in table {
            patterns.push((id_type, Regex::new(pattern)?));
        }
        Ok(Self { patterns })
    }

    pub fn is_valid(&self, id_type: &str, value: &str) -> bool {
        let shaped = self
            .patterns
            .iter()
            .find(|(t, _)| *t == id_type)
            .map_or(true, |(_, re)| re.is_match(value));
        // Hyphenated ISBN-13 has exactly four hyphens and 13 digits.
        shaped && (id_type != "ISBN" || value.len() == 17)
    }
}

/* ------------------------------ Parse context ----------------------------- */

/// Everything a node needs while parsing.
pub struct ParseCtx<'a> {
    pub sink: &'a mut dyn DiagnosticSink,
    pub tables: &'a dyn RuleTables,
    pub report: &'a ReportContext,
    pub formats: &'a IdentifierFormats,
    pub options: &'a EngineOptions,
}

impl<'a> ParseCtx<'a> {
    pub fn rules(&self, context: NodeContext) -> Result<&'a NodeRules, PipelineError> {
        let tables: &'a dyn RuleTables = self.tables;
        let key = self.report.key(context);
        tables.node_rules(&key).ok_or_else(|| {
            PipelineError::MissingRules(format!(
                "{} release {} ({context:?})",
                key.report_id, key.release
            ))
        })
    }

    pub fn is_tabular(&self) -> bool {
        self.report.is_tabular()
    }

    pub fn release(&self) -> Release {
        self.report.release
    }

    pub fn is_unique_title(&self, data_type: Option<&str>) -> bool {
        data_type.map_or(false, |dt| self.tables.is_unique_title_type(self.report.release, dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_formats() {
        let f = IdentifierFormats::new().unwrap();
        assert!(f.is_valid("DOI", "10.1000/xyz123"));
        assert!(!f.is_valid("DOI", "doi:10.1000/xyz"));
        assert!(f.is_valid("ISBN", "978-3-16-148410-0"));
        assert!(!f.is_valid("ISBN", "9783161484100"));
        assert!(f.is_valid("Print_ISSN", "1234-567X"));
        assert!(!f.is_valid("Online_ISSN", "12345678"));
        assert!(f.is_valid("Proprietary", "publisher:abc-1"));
        assert!(!f.is_valid("Proprietary", "abc"));
        assert!(f.is_valid("ISIL", "anything"));
    }
}
