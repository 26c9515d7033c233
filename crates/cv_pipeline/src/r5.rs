//! crates/cv_pipeline/src/r5.rs
//! Release 5 nodes: Report_Item with optional Item_Parent and Item_Component.
//!
//! Attributes and usage live on the item itself. Parents repeat across items
//! and are interned by hash in the report (`R5Body::parents`); an item only
//! keeps the parent's hash as `Item_Parent = Ref(hash)`.

use serde_json::Value;
use tracing::debug;

use cv_core::performance::PerformanceTable;
use cv_core::rules::NodeContext;
use cv_core::value::FieldValue;
use cv_io::hasher::HashVariant;

use crate::collection::MergeCollection;
use crate::context::ParseCtx;
use crate::entity::{Entity, Mergeable, Node};
use crate::fields::{check_required, parse_fields, show};
use crate::fragment::Fragment;
use crate::performance::{parse_performance, report_conflicts};
use crate::PipelineError;

/* --------------------------------- Parent --------------------------------- */

#[derive(Debug)]
pub struct ItemParent {
    entity: Entity,
}

impl ItemParent {
    pub fn new(fragment: Fragment) -> Self {
        Self { entity: Entity::new("Item_Parent", fragment) }
    }
}

impl Node for ItemParent {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let rules = ctx.rules(NodeContext::Parent)?;
        parse_fields(&mut self.entity, rules, ctx);
        check_required(&mut self.entity, rules, ctx);
        Ok(())
    }
}

impl Mergeable for ItemParent {
    fn merge(&mut self, other: Self, _ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        self.entity.absorb(other.entity);
        Ok(false)
    }

    fn store_data(&mut self, _ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        Ok(())
    }
}

/* ------------------------------- Component -------------------------------- */

#[derive(Debug)]
pub struct ItemComponent {
    entity: Entity,
    performance: PerformanceTable,
}

impl ItemComponent {
    pub fn new(fragment: Fragment) -> Self {
        Self { entity: Entity::new("Item_Component", fragment), performance: PerformanceTable::new() }
    }

    pub fn performance(&self) -> &PerformanceTable {
        &self.performance
    }
}

impl Node for ItemComponent {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let rules = ctx.rules(NodeContext::Component)?;
        parse_fields(&mut self.entity, rules, ctx);
        let fragment = self.entity.fragment().clone();
        let data_type = self.entity.text("Data_Type").map(str::to_string);
        let parsed = parse_performance(&fragment, "Performance", data_type.as_deref(), ctx)?;
        absorb_parsed(&mut self.entity, &mut self.performance, parsed);
        check_required(&mut self.entity, rules, ctx);
        Ok(())
    }
}

impl Mergeable for ItemComponent {
    fn merge(&mut self, other: Self, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        let conflicts = self.performance.merge(other.performance);
        report_conflicts(&conflicts, ctx);
        self.entity.absorb(other.entity);
        if !conflicts.is_empty() {
            self.entity.mark_unusable();
        }
        Ok(!conflicts.is_empty())
    }

    fn store_data(&mut self, _ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        if self.performance.strip_zeros_and_check_empty() {
            self.entity.mark_unusable();
        }
        Ok(())
    }
}

/* ---------------------------------- Item ---------------------------------- */

#[derive(Debug)]
pub struct ReportItem {
    entity: Entity,
    performance: PerformanceTable,
    /// Parsed parent, handed to the report arena right after parsing.
    parent: Option<ItemParent>,
    components: MergeCollection<ItemComponent>,
}

impl ReportItem {
    pub fn new(fragment: Fragment) -> Self {
        Self {
            entity: Entity::new("Report_Item", fragment),
            performance: PerformanceTable::new(),
            parent: None,
            components: MergeCollection::new("Item_Component"),
        }
    }

    pub fn performance(&self) -> &PerformanceTable {
        &self.performance
    }

    pub fn components(&self) -> &MergeCollection<ItemComponent> {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut MergeCollection<ItemComponent> {
        &mut self.components
    }

    /// Hash of the interned parent, if any.
    pub fn parent_hash(&self) -> Option<&str> {
        self.entity.data.get("Item_Parent").and_then(FieldValue::as_ref_hash)
    }

    pub fn take_parent(&mut self) -> Option<ItemParent> {
        self.parent.take()
    }

    /// Re-evaluate usability after children were invalidated.
    pub fn refresh(&mut self) {
        if self.components.has_unusable() {
            self.entity.mark_invalid_children();
        }
        if self.performance.is_empty() && self.components.usable_count() == 0 {
            self.entity.mark_unusable();
        }
    }

    fn parse_parent(&mut self, fragment: &Fragment, value: &Value, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let pos = fragment.field_position("Item_Parent");
        if !ctx.report.include_parent_details {
            ctx.sink.error(
                "Unexpected element",
                format!("Item_Parent is only reported when parent details are included in {}", ctx.report.report_id),
                &pos,
                None,
            );
            self.entity.reject("Item_Parent", value.clone());
            return Ok(());
        }
        let Value::Object(object) = value else {
            ctx.sink.error("Wrong data type", "Item_Parent must be an object".into(), &pos, Some(show(value)));
            self.entity.reject("Item_Parent", value.clone());
            return Ok(());
        };
        let mut parent = ItemParent::new(fragment.child("Item_Parent", None, object.clone()));
        parent.ensure_parsed(ctx)?;
        if parent.is_usable() {
            let hash = parent.hash(HashVariant::Full);
            self.entity.data.insert("Item_Parent".into(), FieldValue::Ref(hash));
            self.parent = Some(parent);
        } else {
            self.entity.reject("Item_Parent", value.clone());
        }
        Ok(())
    }

    fn parse_components(&mut self, fragment: &Fragment, value: &Value, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let pos = fragment.field_position("Item_Component");
        if !ctx.report.include_component_details {
            ctx.sink.error(
                "Unexpected element",
                format!("Item_Component is only reported when component details are included in {}", ctx.report.report_id),
                &pos,
                None,
            );
            self.entity.reject("Item_Component", value.clone());
            return Ok(());
        }
        let Value::Array(list) = value else {
            ctx.sink.error("Wrong data type", "Item_Component must be a list".into(), &pos, Some(show(value)));
            self.entity.reject("Item_Component", value.clone());
            return Ok(());
        };
        for (i, element) in list.iter().enumerate() {
            match element {
                Value::Object(object) => {
                    let component = ItemComponent::new(fragment.child("Item_Component", Some(i), object.clone()));
                    self.components.insert(component, ctx)?;
                }
                other => {
                    let pos = fragment.element_position("Item_Component", i, "");
                    ctx.sink.error("Wrong data type", "Item_Component entries must be objects".into(), &pos, Some(show(other)));
                }
            }
        }
        Ok(())
    }
}

impl Node for ReportItem {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let rules = ctx.rules(NodeContext::Item)?;
        parse_fields(&mut self.entity, rules, ctx);
        let fragment = self.entity.fragment().clone();
        if let Some(v) = fragment.get("Item_Parent") {
            self.parse_parent(&fragment, v, ctx)?;
        }
        if let Some(v) = fragment.get("Item_Component") {
            self.parse_components(&fragment, v, ctx)?;
        }
        let data_type = ctx.report.data_type(&self.entity.data).map(str::to_string);
        let parsed = parse_performance(&fragment, "Performance", data_type.as_deref(), ctx)?;
        absorb_parsed(&mut self.entity, &mut self.performance, parsed);
        check_required(&mut self.entity, rules, ctx);
        Ok(())
    }
}

impl Mergeable for ReportItem {
    fn merge(&mut self, mut other: Self, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        let conflicts = self.performance.merge(std::mem::take(&mut other.performance));
        report_conflicts(&conflicts, ctx);
        let components = std::mem::replace(&mut other.components, MergeCollection::new("Item_Component"));
        let component_conflicts = self.components.absorb(components, ctx)?;
        self.entity.absorb(other.entity);
        if !conflicts.is_empty() {
            self.entity.mark_unusable();
        }
        Ok(!conflicts.is_empty() || component_conflicts)
    }

    fn store_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        self.components.store_data(ctx)?;
        self.performance.strip_zeros_and_check_empty();
        self.refresh();
        if !self.is_usable() {
            debug!(position = %self.entity.position(), "Report_Item without usable usage");
        }
        Ok(())
    }
}

/// Move a parse result into the node, carrying its flags.
pub(crate) fn absorb_parsed(
    entity: &mut Entity,
    table: &mut PerformanceTable,
    parsed: crate::performance::ParsedPerformance,
) {
    if parsed.fixed {
        entity.mark_fixed();
    }
    if parsed.duplicate {
        entity.mark_unusable();
    }
    *table = parsed.table;
}
