//! crates/cv_pipeline/src/relations.rs
//! Cross-node metric relations over the reconciled tree.
//!
//! Every leaf usage table (item or block, component) becomes one usage row.
//! The row keys are hashes of the merged ancestor metadata, so that rows
//! differing only in `Format` (and `Section_Type` for title metrics) are
//! summed before the relations are checked.

use tracing::{debug, warn};

use cv_algo::{check_grouped, UsageRow};
use cv_core::diagnostics::Position;
use cv_core::month::Month;
use cv_core::performance::PerformanceTable;
use cv_core::value::{FieldMap, FieldValue};
use cv_io::hasher::{canonical_hash, HashVariant};

use crate::context::ParseCtx;
use crate::entity::{Entity, Node};
use crate::report::ReportBody;

/// Handle of the node that owns a usage row, by index into its containers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Owner {
    R5Item(usize),
    R5Component { item: usize, component: usize },
    R51Block { parent: Option<usize>, item: usize, block: usize },
    R51Component { parent: Option<usize>, item: usize, block: usize, component: usize },
}

fn nest(mut base: FieldMap, name: &str, child: &FieldMap) -> FieldMap {
    base.insert(name.into(), FieldValue::Map(child.clone()));
    base
}

fn layer(mut base: FieldMap, child: &FieldMap) -> FieldMap {
    base.extend(child.iter().map(|(k, v)| (k.clone(), v.clone())));
    base
}

struct RowBuilder<'c, 'a> {
    ctx: &'c ParseCtx<'a>,
    rows: Vec<UsageRow<Owner>>,
}

/// A component is judged by its own `Data_Type`, falling back to its owner's.
fn component_data_type<'d>(component: &'d FieldMap, owner: Option<&'d str>) -> Option<&'d str> {
    component.get("Data_Type").and_then(FieldValue::as_text).or(owner)
}

impl RowBuilder<'_, '_> {
    fn push(&mut self, metadata: &FieldMap, data_type: Option<&str>, table: &PerformanceTable, owner: Owner) {
        if table.is_empty() {
            return;
        }
        self.rows.push(UsageRow {
            item_key: canonical_hash(metadata, HashVariant::WithoutFormat),
            title_key: canonical_hash(metadata, HashVariant::WithoutFormatAndSectionType),
            unique_title: self.ctx.is_unique_title(data_type),
            totals: table.aggregate_by_month(),
            owner,
        });
    }
}

fn usage_rows(body: &ReportBody, ctx: &ParseCtx<'_>) -> Vec<UsageRow<Owner>> {
    let mut b = RowBuilder { ctx, rows: Vec::new() };
    match body {
        ReportBody::R5 { items, .. } => {
            for (i, item) in items.entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
                let data = &item.entity().data;
                let data_type = ctx.report.data_type(data);
                b.push(data, data_type, item.performance(), Owner::R5Item(i));
                for (j, c) in item.components().entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
                    let meta = nest(data.clone(), "Item_Component", &c.entity().data);
                    let own = component_data_type(&c.entity().data, data_type);
                    b.push(&meta, own, c.performance(), Owner::R5Component { item: i, component: j });
                }
            }
        }
        ReportBody::R51Items(items) => {
            for (i, item) in items.entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
                r51_item_rows(&mut b, FieldMap::new(), None, i, item);
            }
        }
        ReportBody::R51Parents(parents) => {
            for (p, parent) in parents.entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
                let base = nest(FieldMap::new(), "Parent", &parent.entity().data);
                for (i, item) in parent.items().entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
                    r51_item_rows(&mut b, base.clone(), Some(p), i, item);
                }
            }
        }
    }
    b.rows
}

fn r51_item_rows(
    b: &mut RowBuilder<'_, '_>,
    base: FieldMap,
    parent: Option<usize>,
    item: usize,
    node: &crate::r51::ReportItem,
) {
    let ctx = b.ctx;
    let item_meta = layer(base, &node.entity().data);
    for (k, block) in node.blocks().entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
        let meta = layer(item_meta.clone(), &block.entity().data);
        let data_type = ctx.report.data_type(&meta);
        b.push(&meta, data_type, block.performance(), Owner::R51Block { parent, item, block: k });
        for (c, component) in block.components().entries().iter().enumerate().filter(|(_, e)| e.is_usable()) {
            let own = component_data_type(&component.entity().data, data_type);
            let nested = nest(meta.clone(), "Component", &component.entity().data);
            b.push(&nested, own, component.performance(), Owner::R51Component { parent, item, block: k, component: c });
        }
    }
}

/// Resolve an owner to its entity.
fn owner_entity(body: &ReportBody, owner: Owner) -> Option<&Entity> {
    match (body, owner) {
        (ReportBody::R5 { items, .. }, Owner::R5Item(i)) => items.entries().get(i).map(Node::entity),
        (ReportBody::R5 { items, .. }, Owner::R5Component { item, component }) => {
            items.entries().get(item)?.components().entries().get(component).map(Node::entity)
        }
        (ReportBody::R51Items(items), Owner::R51Block { item, block, .. }) => {
            items.entries().get(item)?.blocks().entries().get(block).map(Node::entity)
        }
        (ReportBody::R51Items(items), Owner::R51Component { item, block, component, .. }) => items
            .entries()
            .get(item)?
            .blocks()
            .entries()
            .get(block)?
            .components()
            .entries()
            .get(component)
            .map(Node::entity),
        (ReportBody::R51Parents(parents), Owner::R51Block { parent: Some(p), item, block }) => {
            parents.entries().get(p)?.items().entries().get(item)?.blocks().entries().get(block).map(Node::entity)
        }
        (ReportBody::R51Parents(parents), Owner::R51Component { parent: Some(p), item, block, component }) => parents
            .entries()
            .get(p)?
            .items()
            .entries()
            .get(item)?
            .blocks()
            .entries()
            .get(block)?
            .components()
            .entries()
            .get(component)
            .map(Node::entity),
        _ => None,
    }
}

fn mark_unusable(body: &mut ReportBody, owner: Owner) {
    let entity = match (body, owner) {
        (ReportBody::R5 { items, .. }, Owner::R5Item(i)) => items.entries_mut().get_mut(i).map(Node::entity_mut),
        (ReportBody::R5 { items, .. }, Owner::R5Component { item, component }) => items
            .entries_mut()
            .get_mut(item)
            .and_then(|i| i.components_mut().entries_mut().get_mut(component))
            .map(Node::entity_mut),
        (ReportBody::R51Items(items), Owner::R51Block { item, block, .. }) => items
            .entries_mut()
            .get_mut(item)
            .and_then(|i| i.blocks_mut().entries_mut().get_mut(block))
            .map(Node::entity_mut),
        (ReportBody::R51Items(items), Owner::R51Component { item, block, component, .. }) => items
            .entries_mut()
            .get_mut(item)
            .and_then(|i| i.blocks_mut().entries_mut().get_mut(block))
            .and_then(|b| b.components_mut().entries_mut().get_mut(component))
            .map(Node::entity_mut),
        (ReportBody::R51Parents(parents), Owner::R51Block { parent: Some(p), item, block }) => parents
            .entries_mut()
            .get_mut(p)
            .and_then(|p| p.items_mut().entries_mut().get_mut(item))
            .and_then(|i| i.blocks_mut().entries_mut().get_mut(block))
            .map(Node::entity_mut),
        (ReportBody::R51Parents(parents), Owner::R51Component { parent: Some(p), item, block, component }) => parents
            .entries_mut()
            .get_mut(p)
            .and_then(|p| p.items_mut().entries_mut().get_mut(item))
            .and_then(|i| i.blocks_mut().entries_mut().get_mut(block))
            .and_then(|b| b.components_mut().entries_mut().get_mut(component))
            .map(Node::entity_mut),
        _ => None,
    };
    if let Some(e) = entity {
        e.mark_unusable();
    }
}

fn violation_position(body: &ReportBody, owner: Owner, month: Month) -> Position {
    owner_entity(body, owner)
        .map(|e| e.fragment().month_position(month).unwrap_or_else(|| e.position()))
        .unwrap_or_else(|| Position::root().key("Report_Items"))
}

/// Check every relation, report each violation once as Critical and mark
/// the owners of the offending group unusable. Returns the violation count.
pub fn check_report(body: &mut ReportBody, ctx: &mut ParseCtx<'_>) -> usize {
    let rows = usage_rows(body, ctx);
    let report = ctx.report;
    let permits = |m| report.profile.permits(m);
    let found = check_grouped(&rows, &permits);
    debug!(rows = rows.len(), violations = found.len(), "metric relations checked");

    for g in &found {
        let Some(&first) = g.owners.first() else {
            continue;
        };
        let v = &g.violation;
        let position = violation_position(body, first, v.month);
        let message = if g.owners.len() > 1 {
            format!("{} in {} (usage of {} records combined)", v.summary(), v.month, g.owners.len())
        } else {
            format!("{} in {}", v.summary(), v.month)
        };
        ctx.sink.critical(&v.summary(), message, &position, Some(v.data()));
    }
    for g in &found {
        for &owner in &g.owners {
            mark_unusable(body, owner);
        }
    }
    if !found.is_empty() {
        warn!(violations = found.len(), "usage dropped for inconsistent metrics");
    }
    found.len()
}
