//! crates/cv_pipeline/src/r51.rs
//! Release 5.1 nodes.
//!
//! Tree shape:
//! - IR: `Report_Items` holds parents, each with `Items`.
//! - Other masters: `Report_Items` holds items directly.
//!
//! Usage is attached to `Attribute_Performance` blocks (one per attribute
//! combination), and for IR optionally to their `Components`.

use serde_json::Value;

use cv_core::performance::PerformanceTable;
use cv_core::rules::NodeContext;

use crate::collection::MergeCollection;
use crate::context::ParseCtx;
use crate::entity::{Entity, Mergeable, Node};
use crate::fields::{check_required, parse_fields, show};
use crate::fragment::Fragment;
use crate::performance::{parse_performance, report_conflicts};
use crate::r5::absorb_parsed;
use crate::PipelineError;

/// Parse every object of the list under `field` into `into`.
fn collect_children<E: Mergeable>(
    entity: &mut Entity,
    field: &'static str,
    into: &mut MergeCollection<E>,
    make: impl Fn(Fragment) -> E,
    ctx: &mut ParseCtx<'_>,
) -> Result<(), PipelineError> {
    let fragment = entity.fragment().clone();
    let Some(value) = fragment.get(field) else {
        return Ok(());
    };
    let Value::Array(list) = value else {
        let pos = fragment.field_position(field);
        ctx.sink.error("Wrong data type", format!("{field} must be a list"), &pos, Some(show(value)));
        entity.reject(field, value.clone());
        return Ok(());
    };
    for (i, element) in list.iter().enumerate() {
        match element {
            Value::Object(object) => into.insert(make(fragment.child(field, Some(i), object.clone())), ctx)?,
            other => {
                let pos = fragment.element_position(field, i, "");
                ctx.sink.error("Wrong data type", format!("{field} entries must be objects"), &pos, Some(show(other)));
            }
        }
    }
    Ok(())
}

/// Container rule: unusable without usable children, flagged when any
/// child was dropped.
fn settle_container<E: Node>(entity: &mut Entity, children: &MergeCollection<E>) {
    if children.has_unusable() {
        entity.mark_invalid_children();
    }
    if children.usable_count() == 0 {
        entity.mark_unusable();
    }
}

/* ------------------------------- Component -------------------------------- */

#[derive(Debug)]
pub struct ComponentBlock {
    entity: Entity,
    performance: PerformanceTable,
}

impl ComponentBlock {
    pub fn new(fragment: Fragment) -> Self {
        Self { entity: Entity::new("Component", fragment), performance: PerformanceTable::new() }
    }

    pub fn performance(&self) -> &PerformanceTable {
        &self.performance
    }
}

impl Node for ComponentBlock {
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

impl Mergeable for ComponentBlock {
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

/* ---------------------------- Attribute block ----------------------------- */

/// One `Attribute_Performance` entry.
#[derive(Debug)]
pub struct AttributeBlock {
    entity: Entity,
    performance: PerformanceTable,
    components: MergeCollection<ComponentBlock>,
}

impl AttributeBlock {
    pub fn new(fragment: Fragment) -> Self {
        Self {
            entity: Entity::new("Attribute_Performance", fragment),
            performance: PerformanceTable::new(),
            components: MergeCollection::new("Component"),
        }
    }

    pub fn performance(&self) -> &PerformanceTable {
        &self.performance
    }

    pub fn components(&self) -> &MergeCollection<ComponentBlock> {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut MergeCollection<ComponentBlock> {
        &mut self.components
    }

    pub fn refresh(&mut self) {
        if self.components.has_unusable() {
            self.entity.mark_invalid_children();
        }
        if self.performance.is_empty() && self.components.usable_count() == 0 {
            self.entity.mark_unusable();
        }
    }
}

impl Node for AttributeBlock {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let rules = ctx.rules(NodeContext::AttributeBlock)?;
        parse_fields(&mut self.entity, rules, ctx);
        let fragment = self.entity.fragment().clone();
        let data_type = ctx.report.data_type(&self.entity.data).map(str::to_string);
        let parsed = parse_performance(&fragment, "Performance", data_type.as_deref(), ctx)?;
        absorb_parsed(&mut self.entity, &mut self.performance, parsed);

        if let Some(value) = fragment.get("Components") {
            if ctx.report.include_component_details {
                collect_children(&mut self.entity, "Components", &mut self.components, ComponentBlock::new, ctx)?;
            } else {
                ctx.sink.error(
                    "Unexpected element",
                    format!("Components are only reported when component details are included in {}", ctx.report.report_id),
                    &fragment.field_position("Components"),
                    None,
                );
                self.entity.reject("Components", value.clone());
            }
        }
        check_required(&mut self.entity, rules, ctx);
        Ok(())
    }
}

impl Mergeable for AttributeBlock {
    fn merge(&mut self, mut other: Self, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        let conflicts = self.performance.merge(std::mem::take(&mut other.performance));
        report_conflicts(&conflicts, ctx);
        let components = std::mem::replace(&mut other.components, MergeCollection::new("Component"));
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
        Ok(())
    }
}

/* ---------------------------------- Item ---------------------------------- */

#[derive(Debug)]
pub struct ReportItem {
    entity: Entity,
    blocks: MergeCollection<AttributeBlock>,
}

impl ReportItem {
    pub fn new(fragment: Fragment) -> Self {
        Self { entity: Entity::new("Report_Item", fragment), blocks: MergeCollection::new("Attribute_Performance") }
    }

    pub fn blocks(&self) -> &MergeCollection<AttributeBlock> {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut MergeCollection<AttributeBlock> {
        &mut self.blocks
    }

    pub fn refresh(&mut self) {
        for block in self.blocks.entries_mut() {
            block.refresh();
        }
        settle_container(&mut self.entity, &self.blocks);
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
        collect_children(&mut self.entity, "Attribute_Performance", &mut self.blocks, AttributeBlock::new, ctx)?;
        check_required(&mut self.entity, rules, ctx);
        Ok(())
    }
}

impl Mergeable for ReportItem {
    fn merge(&mut self, mut other: Self, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        let blocks = std::mem::replace(&mut other.blocks, MergeCollection::new("Attribute_Performance"));
        let conflicted = self.blocks.absorb(blocks, ctx)?;
        self.entity.absorb(other.entity);
        Ok(conflicted)
    }

    fn store_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        self.blocks.store_data(ctx)?;
        settle_container(&mut self.entity, &self.blocks);
        Ok(())
    }
}

/* --------------------------------- Parent --------------------------------- */

/// IR top-level record: parent metadata (when details are included) and
/// the items published in it.
#[derive(Debug)]
pub struct ParentItem {
    entity: Entity,
    items: MergeCollection<ReportItem>,
}

impl ParentItem {
    pub fn new(fragment: Fragment) -> Self {
        Self { entity: Entity::new("Report_Item", fragment), items: MergeCollection::new("Items") }
    }

    pub fn items(&self) -> &MergeCollection<ReportItem> {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut MergeCollection<ReportItem> {
        &mut self.items
    }

    pub fn refresh(&mut self) {
        for item in self.items.entries_mut() {
            item.refresh();
        }
        settle_container(&mut self.entity, &self.items);
    }
}

impl Node for ParentItem {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    fn parse_body(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        let rules = ctx.rules(NodeContext::Parent)?;
        let fragment = self.entity.fragment().clone();
        if ctx.report.include_parent_details {
            parse_fields(&mut self.entity, rules, ctx);
        } else {
            for (name, value) in fragment.object().iter().filter(|(k, _)| k.as_str() != "Items") {
                ctx.sink.error(
                    "Parent details not expected",
                    format!("{name} is only reported when parent details are included in {}", ctx.report.report_id),
                    &fragment.field_position(name),
                    Some(show(value)),
                );
                self.entity.reject(name.as_str(), value.clone());
            }
        }

        if fragment.contains("Items") {
            collect_children(&mut self.entity, "Items", &mut self.items, ReportItem::new, ctx)?;
        } else {
            ctx.sink.error(
                "Required element missing",
                "Items is missing from Report_Item".into(),
                &fragment.position(),
                None,
            );
            self.entity.mark_unusable();
            self.entity.keep_raw();
        }

        if ctx.report.include_parent_details {
            check_required(&mut self.entity, rules, ctx);
        }
        Ok(())
    }
}

impl Mergeable for ParentItem {
    fn merge(&mut self, mut other: Self, ctx: &mut ParseCtx<'_>) -> Result<bool, PipelineError> {
        let items = std::mem::replace(&mut other.items, MergeCollection::new("Items"));
        let conflicted = self.items.absorb(items, ctx)?;
        self.entity.absorb(other.entity);
        Ok(conflicted)
    }

    fn store_data(&mut self, ctx: &mut ParseCtx<'_>) -> Result<(), PipelineError> {
        self.items.store_data(ctx)?;
        settle_container(&mut self.entity, &self.items);
        Ok(())
    }
}
