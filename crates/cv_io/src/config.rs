//! crates/cv_io/src/config.rs
//! Built-in COUNTER rule tables for Release 5 and 5.1.
//!
//! Node rules are shared by a master report and its standard views; a view
//! narrows them through its `ReportProfile` (metrics, shown attributes and
//! value restrictions). Tabular rows are mapped onto the JSON field names
//! before validation, so the serialization part of a `RuleKey` does not
//! select a different table.

use std::collections::BTreeMap;

use cv_core::metric::MetricType::{self, *};
use cv_core::rules::{
    FieldKind, FieldRule, FieldShape, NodeContext, NodeRules, Release, ReportProfile, RuleKey,
    RuleTables,
};

/* ---------------------------- Value vocabularies ---------------------------- */

const DATA_TYPES_R5: &[&str] = &[
    "Article", "Book", "Book_Segment", "Database", "Dataset", "Journal", "Multimedia",
    "Newspaper_or_Newsletter", "Other", "Platform", "Report", "Repository_Item",
    "Thesis_or_Dissertation",
];

const DATA_TYPES_R51: &[&str] = &[
    "Article", "Audiovisual", "Book", "Book_Segment", "Conference", "Conference_Item",
    "Database_AI", "Database_Aggregated", "Database_Full", "Database_Full_Item", "Dataset",
    "Image", "Interactive_Resource", "Journal", "Multimedia", "News_Item",
    "Newspaper_or_Newsletter", "Other", "Patent", "Platform", "Reference_Item", "Reference_Work",
    "Report", "Software", "Sound", "Standard", "Thesis_or_Dissertation", "Unspecified",
];

const SECTION_TYPES_R5: &[&str] = &["Article", "Book", "Chapter", "Other", "Section"];

const ACCESS_TYPES_R5: &[&str] = &["Controlled", "OA_Gold", "Other_Free_To_Read"];
const ACCESS_TYPES_R51: &[&str] = &["Controlled", "Free_To_Read", "Open"];

const ACCESS_METHODS: &[&str] = &["Regular", "TDM"];

const ARTICLE_VERSIONS: &[&str] = &["AM", "CVoR", "EVoR", "VoR"];

const ITEM_ID_TYPES: &[&str] = &["DOI", "ISBN", "Online_ISSN", "Print_ISSN", "Proprietary", "URI"];
const PUBLISHER_ID_TYPES_R5: &[&str] = &["ISNI", "Proprietary"];
const PUBLISHER_ID_TYPES_R51: &[&str] = &["ISNI", "Proprietary", "ROR"];
const INSTITUTION_ID_TYPES_R5: &[&str] = &["ISIL", "ISNI", "OCLC", "Proprietary"];
const INSTITUTION_ID_TYPES_R51: &[&str] = &["ISIL", "ISNI", "OCLC", "Proprietary", "ROR"];

const MASTERS: &[&str] = &["PR", "DR", "TR", "IR"];

/* ------------------------------ Construction ------------------------------- */

#[derive(Clone, Debug)]
pub struct BuiltinRules {
    profiles: BTreeMap<(String, Release), ReportProfile>,
    nodes: BTreeMap<(String, Release, NodeContext), NodeRules>,
    unique_title: BTreeMap<Release, Vec<String>>,
    database: BTreeMap<Release, Vec<String>>,
}

impl Default for BuiltinRules {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRules {
    pub fn new() -> Self {
        let mut rules = BuiltinRules {
            profiles: BTreeMap::new(),
            nodes: BTreeMap::new(),
            unique_title: BTreeMap::new(),
            database: BTreeMap::new(),
        };
        rules.unique_title.insert(Release::R5, strings(&["Book"]));
        rules.unique_title.insert(Release::R51, strings(&["Book", "Reference_Work"]));
        rules.database.insert(Release::R5, strings(&["Database"]));
        rules.database.insert(
            Release::R51,
            strings(&["Database_AI", "Database_Aggregated", "Database_Full", "Database_Full_Item"]),
        );
        for release in [Release::R5, Release::R51] {
            rules.add_profiles(release);
            rules.add_nodes(release);
        }
        rules
    }

    fn add_profiles(&mut self, release: Release) {
        let r51 = release == Release::R51;
        let searches_db = [SearchesAutomated, SearchesFederated, SearchesRegular];
        let item_metrics = [
            TotalItemInvestigations, TotalItemRequests, UniqueItemInvestigations, UniqueItemRequests,
        ];
        let title_metrics = [UniqueTitleInvestigations, UniqueTitleRequests];
        let denials = [LimitExceeded, NoLicense];

        let pr_attrs: &[&str] = &["Data_Type", "Access_Method"];
        let tr_attrs: &[&str] = if r51 {
            &["Data_Type", "YOP", "Access_Type", "Access_Method"]
        } else {
            &["Data_Type", "Section_Type", "YOP", "Access_Type", "Access_Method"]
        };
        let ir_attrs: &[&str] = &["Data_Type", "YOP", "Access_Type", "Access_Method"];
        let controlled: &[&str] = &["Controlled"];
        let regular: &[&str] = &["Regular"];
        let book: &[&str] = &["Book"];
        let journal: &[&str] = &["Journal"];
        let none: &[&str] = &[];

        let mut pr_metrics = vec![SearchesPlatform];
        pr_metrics.extend(item_metrics);
        pr_metrics.extend(title_metrics);
        let mut dr_metrics = searches_db.to_vec();
        dr_metrics.extend(item_metrics);
        dr_metrics.extend(denials);
        let mut tr_metrics = item_metrics.to_vec();
        tr_metrics.extend(title_metrics);
        tr_metrics.extend(denials);
        let mut ir_metrics = item_metrics.to_vec();
        if r51 {
            ir_metrics.extend(denials);
        }

        let specs: Vec<(&str, &str, &str, Vec<MetricType>, &[&str], Vec<(&str, &[&str])>)> = vec![
            ("PR", "PR", "Platform Master Report", pr_metrics, pr_attrs, vec![]),
            (
                "PR_P1",
                "PR",
                "Platform Usage",
                vec![SearchesPlatform, TotalItemRequests, UniqueItemRequests, UniqueTitleRequests],
                none,
                vec![("Access_Method", regular)],
            ),
            ("DR", "DR", "Database Master Report", dr_metrics, pr_attrs, vec![]),
            (
                "DR_D1",
                "DR",
                "Database Search and Item Usage",
                vec![
                    SearchesAutomated, SearchesFederated, SearchesRegular, TotalItemInvestigations,
                    TotalItemRequests,
                ],
                none,
                vec![("Access_Method", regular)],
            ),
            (
                "DR_D2",
                "DR",
                "Database Access Denied",
                vec![LimitExceeded, NoLicense],
                none,
                vec![("Access_Method", regular)],
            ),
            ("TR", "TR", "Title Master Report", tr_metrics, tr_attrs, vec![]),
            (
                "TR_B1",
                "TR",
                "Book Requests (Excluding OA_Gold)",
                vec![TotalItemRequests, UniqueTitleRequests],
                none,
                vec![("Data_Type", book), ("Access_Type", controlled), ("Access_Method", regular)],
            ),
            (
                "TR_B2",
                "TR",
                "Book Access Denied",
                vec![LimitExceeded, NoLicense],
                none,
                vec![("Data_Type", book), ("Access_Method", regular)],
            ),
            (
                "TR_B3",
                "TR",
                "Book Usage by Access Type",
                {
                    let mut m = item_metrics.to_vec();
                    m.extend(title_metrics);
                    m
                },
                &["YOP", "Access_Type"][..],
                vec![("Data_Type", book), ("Access_Method", regular)],
            ),
            (
                "TR_J1",
                "TR",
                "Journal Requests (Excluding OA_Gold)",
                vec![TotalItemRequests, UniqueItemRequests],
                none,
                vec![("Data_Type", journal), ("Access_Type", controlled), ("Access_Method", regular)],
            ),
            (
                "TR_J2",
                "TR",
                "Journal Access Denied",
                vec![LimitExceeded, NoLicense],
                none,
                vec![("Data_Type", journal), ("Access_Method", regular)],
            ),
            (
                "TR_J3",
                "TR",
                "Journal Usage by Access Type",
                item_metrics.to_vec(),
                &["Access_Type"][..],
                vec![("Data_Type", journal), ("Access_Method", regular)],
            ),
            (
                "TR_J4",
                "TR",
                "Journal Requests by YOP (Excluding OA_Gold)",
                vec![TotalItemRequests, UniqueItemRequests],
                &["YOP"][..],
                vec![("Data_Type", journal), ("Access_Type", controlled), ("Access_Method", regular)],
            ),
            ("IR", "IR", "Item Master Report", ir_metrics, ir_attrs, vec![]),
            (
                "IR_A1",
                "IR",
                "Journal Article Requests",
                vec![TotalItemRequests, UniqueItemRequests],
                &["Access_Type"][..],
                vec![("Data_Type", &["Article"][..]), ("Access_Method", regular)],
            ),
            (
                "IR_M1",
                "IR",
                "Multimedia Item Requests",
                if r51 { vec![TotalItemRequests, UniqueItemRequests] } else { vec![TotalItemRequests] },
                none,
                vec![("Data_Type", &["Multimedia"][..]), ("Access_Method", regular)],
            ),
        ];

        for (id, master, name, metrics, attributes, restrictions) in specs {
            let profile = ReportProfile {
                report_id: id.to_string(),
                release,
                name: name.to_string(),
                master: master.to_string(),
                metrics,
                attributes: strings(attributes),
                restrictions: restrictions.into_iter().map(|(k, v)| (k.to_string(), strings(v))).collect(),
                supports_parents: master == "IR" && id != "IR_M1",
                supports_components: master == "IR" && id == "IR",
            };
            self.profiles.insert((id.to_string(), release), profile);
        }
    }

    fn add_nodes(&mut self, release: Release) {
        let r51 = release == Release::R51;
        let data_types = if r51 { DATA_TYPES_R51 } else { DATA_TYPES_R5 };
        let access_types = if r51 { ACCESS_TYPES_R51 } else { ACCESS_TYPES_R5 };
        let publisher_ids = if r51 { PUBLISHER_ID_TYPES_R51 } else { PUBLISHER_ID_TYPES_R5 };

        let attr = |values: &[&str]| {
            FieldRule::optional(FieldKind::Attribute, FieldShape::Enumerated(strings(values)))
        };
        let meta_req = |shape: FieldShape| FieldRule::required(FieldKind::Metadata, shape);
        let meta_opt = |shape: FieldShape| FieldRule::optional(FieldKind::Metadata, shape);
        let ids = |types: &[&str]| FieldShape::Identifiers(strings(types));

        /* ---- header ---- */
        let mut header = NodeRules::default();
        for f in ["Report_Name", "Report_ID", "Release", "Institution_Name", "Created", "Created_By"] {
            header.fields.insert(f.into(), meta_req(FieldShape::Text));
        }
        let institution_ids = if r51 { INSTITUTION_ID_TYPES_R51 } else { INSTITUTION_ID_TYPES_R5 };
        header.fields.insert("Institution_ID".into(), meta_opt(ids(institution_ids)));
        header.fields.insert(
            "Report_Filters".into(),
            FieldRule::required(FieldKind::Filter, FieldShape::Nested),
        );
        header.fields.insert(
            "Report_Attributes".into(),
            FieldRule::optional(FieldKind::Filter, FieldShape::Nested),
        );
        header.fields.insert("Exceptions".into(), meta_opt(FieldShape::Structured));
        if r51 {
            header.fields.insert("Registry_Record".into(), meta_req(FieldShape::Text));
        } else {
            header.fields.insert("Customer_ID".into(), meta_opt(FieldShape::Text));
            header.fields.insert("Metric_Types".into(), meta_opt(FieldShape::Text));
        }
        header.identity = strings(&["Report_ID"]);
        self.nodes.insert((String::new(), release, NodeContext::Header), header);

        /* ---- attribute fields shared by items (R5) and blocks (R5.1) ---- */
        let mut attributes: BTreeMap<String, FieldRule> = BTreeMap::new();
        attributes.insert("Data_Type".into(), attr(data_types));
        attributes.insert("Access_Method".into(), attr(ACCESS_METHODS));
        let mut title_attributes = attributes.clone();
        title_attributes.insert("Access_Type".into(), attr(access_types));
        title_attributes.insert("YOP".into(), FieldRule::optional(FieldKind::Attribute, FieldShape::Yop));
        if !r51 {
            title_attributes.insert("Section_Type".into(), attr(SECTION_TYPES_R5));
        }
        let mut item_attributes = title_attributes.clone();
        item_attributes.remove("Section_Type");

        let performance = |required: bool| {
            if required {
                FieldRule::required(FieldKind::Metadata, FieldShape::Nested)
            } else {
                FieldRule::optional(FieldKind::Metadata, FieldShape::Nested)
            }
        };

        // Item metadata per master.
        let mut pr = NodeRules::default();
        pr.fields.insert("Platform".into(), meta_req(FieldShape::Text));
        pr.identity = strings(&["Platform"]);

        let mut dr = NodeRules::default();
        dr.fields.insert("Database".into(), meta_req(FieldShape::Text));
        dr.fields.insert("Publisher".into(), meta_req(FieldShape::Text));
        dr.fields.insert("Publisher_ID".into(), meta_opt(ids(publisher_ids)));
        dr.fields.insert("Platform".into(), meta_req(FieldShape::Text));
        dr.fields.insert("Item_ID".into(), meta_opt(ids(&["Proprietary"])));
        dr.identity = strings(&["Database"]);

        let mut tr = NodeRules::default();
        tr.fields.insert("Title".into(), meta_req(FieldShape::Text));
        tr.fields.insert("Item_ID".into(), meta_opt(ids(ITEM_ID_TYPES)));
        tr.fields.insert("Platform".into(), meta_req(FieldShape::Text));
        tr.fields.insert("Publisher".into(), meta_req(FieldShape::Text));
        tr.fields.insert("Publisher_ID".into(), meta_opt(ids(publisher_ids)));
        tr.identity = strings(&["Title", "Item_ID"]);

        let mut ir = NodeRules::default();
        ir.fields.insert("Item".into(), meta_req(FieldShape::Text));
        ir.fields.insert("Item_ID".into(), meta_opt(ids(ITEM_ID_TYPES)));
        ir.fields.insert("Platform".into(), meta_req(FieldShape::Text));
        ir.fields.insert("Publisher".into(), meta_req(FieldShape::Text));
        ir.fields.insert("Publisher_ID".into(), meta_opt(ids(publisher_ids)));
        ir.identity = strings(&["Item", "Item_ID"]);

        // Parent and component metadata (IR only).
        let mut parent = NodeRules::default();
        let mut component = NodeRules::default();
        if r51 {
            for rules in [&mut parent, &mut component] {
                rules.fields.insert("Item_ID".into(), meta_opt(ids(ITEM_ID_TYPES)));
                rules.fields.insert("Authors".into(), meta_opt(FieldShape::Structured));
                rules.fields.insert("Publication_Date".into(), meta_opt(FieldShape::Date));
                rules.fields.insert("Article_Version".into(), meta_opt(FieldShape::Enumerated(strings(ARTICLE_VERSIONS))));
            }
            parent.fields.insert("Title".into(), meta_opt(FieldShape::Text));
            parent.fields.insert("Data_Type".into(), meta_opt(FieldShape::Enumerated(strings(data_types))));
            parent.fields.insert("Items".into(), performance(true));
            parent.identity = strings(&["Title", "Item_ID"]);

            component.fields.insert("Item".into(), meta_req(FieldShape::Text));
            component.fields.insert("Data_Type".into(), meta_req(FieldShape::Enumerated(strings(data_types))));
            component.fields.insert("Performance".into(), performance(true));
            component.identity = strings(&["Item", "Item_ID"]);

            ir.fields.insert("Authors".into(), meta_opt(FieldShape::Structured));
            ir.fields.insert("Publication_Date".into(), meta_opt(FieldShape::Date));
            ir.fields.insert("Article_Version".into(), meta_opt(FieldShape::Enumerated(strings(ARTICLE_VERSIONS))));
        } else {
            for rules in [&mut parent, &mut component] {
                rules.fields.insert("Item_Name".into(), meta_req(FieldShape::Text));
                rules.fields.insert("Item_ID".into(), meta_opt(ids(ITEM_ID_TYPES)));
                rules.fields.insert("Item_Contributors".into(), meta_opt(FieldShape::Structured));
                rules.fields.insert("Item_Dates".into(), meta_opt(FieldShape::Structured));
                rules.fields.insert("Item_Attributes".into(), meta_opt(FieldShape::Structured));
                rules.fields.insert("Data_Type".into(), meta_req(FieldShape::Enumerated(strings(data_types))));
                rules.identity = strings(&["Item_Name", "Item_ID"]);
            }
            component.fields.insert("Performance".into(), performance(true));

            ir.fields.insert("Item_Contributors".into(), meta_opt(FieldShape::Structured));
            ir.fields.insert("Item_Dates".into(), meta_opt(FieldShape::Structured));
            ir.fields.insert("Item_Attributes".into(), meta_opt(FieldShape::Structured));
            ir.fields.insert("Item_Parent".into(), meta_opt(FieldShape::Nested));
            ir.fields.insert("Item_Component".into(), meta_opt(FieldShape::Nested));
        }

        for (master, mut item) in [("PR", pr), ("DR", dr), ("TR", tr), ("IR", ir)] {
            let attrs = match master {
                "TR" => &title_attributes,
                "IR" => &item_attributes,
                _ => &attributes,
            };
            if r51 {
                let mut block = NodeRules::default();
                block.fields.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
                block.fields.insert("Performance".into(), performance(master != "IR"));
                if master == "IR" {
                    block.fields.insert("Components".into(), performance(false));
                }
                item.fields.insert("Attribute_Performance".into(), performance(true));
                self.nodes.insert((master.to_string(), release, NodeContext::AttributeBlock), block);
            } else {
                item.fields.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
                item.fields.insert("Performance".into(), performance(master != "IR"));
            }
            self.nodes.insert((master.to_string(), release, NodeContext::Item), item);
        }
        self.nodes.insert(("IR".to_string(), release, NodeContext::Parent), parent);
        self.nodes.insert(("IR".to_string(), release, NodeContext::Component), component);
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl RuleTables for BuiltinRules {
    fn profile(&self, report_id: &str, release: Release) -> Option<&ReportProfile> {
        self.profiles.get(&(report_id.to_string(), release))
    }

    fn node_rules(&self, key: &RuleKey) -> Option<&NodeRules> {
        if key.context == NodeContext::Header {
            return self.nodes.get(&(String::new(), key.release, NodeContext::Header));
        }
        let master = &self.profile(&key.report_id, key.release)?.master;
        debug_assert!(MASTERS.contains(&master.as_str()));
        self.nodes.get(&(master.clone(), key.release, key.context))
    }

    fn unique_title_data_types(&self, release: Release) -> &[String] {
        self.unique_title.get(&release).map(Vec::as_slice).unwrap_or(&[])
    }

    fn database_data_types(&self, release: Release) -> &[String] {
        self.database.get(&release).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::rules::Serialization;

    /// Known Report_IDs for `release`, masters first.
    fn report_ids(rules: &BuiltinRules, release: Release) -> Vec<&str> {
        let mut ids: Vec<&ReportProfile> = rules.profiles.values().filter(|p| p.release == release).collect();
        ids.sort_by_key(|p| (!p.is_master(), p.report_id.clone()));
        ids.into_iter().map(|p| p.report_id.as_str()).collect()
    }

    fn key(id: &str, release: Release, context: NodeContext) -> RuleKey {
        RuleKey::new(id, release, Serialization::Json, context)
    }

    #[test]
    fn every_report_has_item_rules_in_both_releases() {
        let rules = BuiltinRules::new();
        for release in [Release::R5, Release::R51] {
            let ids = report_ids(&rules, release);
            assert_eq!(&ids[..4], &["DR", "IR", "PR", "TR"]);
            assert_eq!(ids.len(), 16);
            for id in ids {
                assert!(rules.node_rules(&key(id, release, NodeContext::Item)).is_some(), "{id}");
            }
        }
        assert!(rules.profile("XX", Release::R5).is_none());
        assert!(rules.node_rules(&key("", Release::R51, NodeContext::Header)).is_some());
    }

    #[test]
    fn r51_moves_attributes_into_blocks_and_drops_section_type() {
        let rules = BuiltinRules::new();
        let item = rules.node_rules(&key("TR", Release::R51, NodeContext::Item)).unwrap();
        assert!(item.get("Attribute_Performance").is_some() && item.get("Data_Type").is_none());
        let block = rules.node_rules(&key("TR_J1", Release::R51, NodeContext::AttributeBlock)).unwrap();
        assert!(block.get("Access_Type").is_some() && block.get("Section_Type").is_none());

        let r5 = rules.node_rules(&key("TR", Release::R5, NodeContext::Item)).unwrap();
        assert!(r5.get("Section_Type").is_some() && r5.get("Performance").is_some());
        assert_eq!(r5.identity, ["Title", "Item_ID"]);
    }

    #[test]
    fn applicability_lists_differ_by_release() {
        let rules = BuiltinRules::new();
        assert!(rules.is_unique_title_type(Release::R51, "Reference_Work"));
        assert!(!rules.is_unique_title_type(Release::R5, "Reference_Work"));
        assert!(rules.is_database_type(Release::R5, "Database"));
        assert!(!rules.is_database_type(Release::R51, "Database"));

        let j1 = rules.profile("TR_J1", Release::R5).unwrap();
        assert_eq!(j1.implied_value("Data_Type"), Some("Journal"));
        assert!(j1.permits(TotalItemRequests) && !j1.permits(UniqueTitleRequests));
        assert!(rules.profile("IR", Release::R5).unwrap().supports_components);
    }
}
