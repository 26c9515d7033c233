//! crates/cv_pipeline/src/performance.rs
//! Reading usage into a `PerformanceTable` and reporting merge conflicts.
//!
//! Accepted shapes:
//! - Release 5 JSON: `[{Period: {Begin_Date, End_Date}, Instance: [{Metric_Type, Count}]}]`
//! - Release 5.1 JSON and every tabular row: `{Metric_Type: {"YYYY-MM": Count}}`

use serde_json::{Map, Value};

use cv_core::diagnostics::Position;
use cv_core::metric::MetricType;
use cv_core::month::Month;
use cv_core::performance::{Conflict, PerformanceTable};
use cv_core::rules::Release;

use crate::context::ParseCtx;
use crate::fields::show;
use crate::fragment::Fragment;
use crate::PipelineError;

pub const ZERO_COUNT: &str = "Count must not be zero";
pub const IN_NODE_DUPLICATE: &str = "Multiple Counts for the same Metric_Type and month";
pub const CONFLICT_DIFFERENT: &str = "Multiple Counts for the same Metric_Type and month with different Counts";
pub const CONFLICT_IDENTICAL: &str = "Multiple Counts for the same Metric_Type and month with identical Counts";

#[derive(Debug, Default)]
pub struct ParsedPerformance {
    pub table: PerformanceTable,
    /// A value was corrected (metric capitalization, quoted count).
    pub fixed: bool,
    /// The same pair appeared twice inside this node.
    pub duplicate: bool,
}

/// Read the usage under `field` of `fragment`. `data_type` gates the
/// database search metrics.
pub fn parse_performance(
    fragment: &Fragment,
    field: &str,
    data_type: Option<&str>,
    ctx: &mut ParseCtx<'_>,
) -> Result<ParsedPerformance, PipelineError> {
    let mut out = ParsedPerformance::default();
    let Some(value) = fragment.get(field) else {
        return Ok(out);
    };
    let base = fragment.field_position(field);
    let tabular = fragment.is_tabular();

    match value {
        Value::Object(metrics) if tabular || ctx.release() == Release::R51 => {
            for (metric, months) in metrics {
                let metric_pos = if tabular { base.clone() } else { base.key(metric) };
                let Value::Object(months) = months else {
                    ctx.sink.error("Wrong data type", format!("usage of {metric} must map months to counts"), &metric_pos, None);
                    continue;
                };
                by_month(&mut out, fragment, metric, months, &metric_pos, data_type, ctx)?;
            }
        }
        Value::Array(periods) if !tabular && ctx.release() == Release::R5 => {
            for (i, period) in periods.iter().enumerate() {
                by_period(&mut out, period, &base.index(i), data_type, ctx)?;
            }
        }
        other => {
            let expected = match ctx.release() {
                Release::R5 => "a list of Period/Instance objects",
                Release::R51 => "an object keyed by Metric_Type",
            };
            ctx.sink.error("Wrong data type", format!("{field} must be {expected}"), &base, Some(show(other)));
        }
    }
    Ok(out)
}

fn by_month(
    out: &mut ParsedPerformance,
    fragment: &Fragment,
    metric: &str,
    months: &Map<String, Value>,
    metric_pos: &Position,
    data_type: Option<&str>,
    ctx: &mut ParseCtx<'_>,
) -> Result<(), PipelineError> {
    for (month_text, count) in months {
        let count_pos = metric_pos.key(month_text);
        let month: Month = match month_text.parse() {
            Ok(m) => m,
            Err(e) => {
                ctx.sink.error("Invalid month", e.to_string(), &count_pos, Some(month_text.clone()));
                continue;
            }
        };
        let count_pos = fragment.month_position(month).unwrap_or(count_pos);
        add_count(out, metric, month, count, metric_pos, count_pos, data_type, ctx)?;
    }
    Ok(())
}

fn by_period(
    out: &mut ParsedPerformance,
    period: &Value,
    pos: &Position,
    data_type: Option<&str>,
    ctx: &mut ParseCtx<'_>,
) -> Result<(), PipelineError> {
    let dates = period
        .get("Period")
        .and_then(|p| Some((p.get("Begin_Date")?.as_str()?, p.get("End_Date")?.as_str()?)));
    let Some((begin, end)) = dates else {
        ctx.sink.error("Invalid Period", "Period needs Begin_Date and End_Date".into(), &pos.key("Period"), None);
        return Ok(());
    };
    let month = match Month::from_period(begin, end) {
        Ok(m) => m,
        Err(e) => {
            ctx.sink.error("Invalid Period", e.to_string(), &pos.key("Period"), Some(format!("{begin}..{end}")));
            return Ok(());
        }
    };
    let Some(instances) = period.get("Instance").and_then(Value::as_array) else {
        ctx.sink.error("Required element missing", "Instance is missing from Performance".into(), pos, None);
        return Ok(());
    };
    for (j, instance) in instances.iter().enumerate() {
        let ipos = pos.key("Instance").index(j);
        let metric = instance.get("Metric_Type").and_then(Value::as_str);
        let (Some(metric), Some(count)) = (metric, instance.get("Count")) else {
            ctx.sink.error("Required element missing", "Instance needs Metric_Type and Count".into(), &ipos, Some(show(instance)));
            continue;
        };
        add_count(out, metric, month, count, &ipos.key("Metric_Type"), ipos.key("Count"), data_type, ctx)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn add_count(
    out: &mut ParsedPerformance,
    metric_text: &str,
    month: Month,
    count: &Value,
    metric_pos: &Position,
    count_pos: Position,
    data_type: Option<&str>,
    ctx: &mut ParseCtx<'_>,
) -> Result<(), PipelineError> {
    let metric = match metric_text.parse::<MetricType>() {
        Ok(m) => m,
        Err(_) => match MetricType::from_str_ignore_case(metric_text) {
            Some(m) => {
                ctx.sink.error("Wrong capitalization", format!("{metric_text} corrected to {m}"), metric_pos, None);
                out.fixed = true;
                m
            }
            None => {
                ctx.sink.error("Unknown Metric_Type", format!("{metric_text} is not a COUNTER Metric_Type"), metric_pos, None);
                return Ok(());
            }
        },
    };
    if !ctx.report.profile.permits(metric) {
        ctx.sink.error(
            "Metric_Type not permitted",
            format!("{metric} is not reported in {}", ctx.report.report_id),
            metric_pos,
            None,
        );
        return Ok(());
    }
    if metric.is_database_search() {
        if let Some(dt) = data_type.filter(|dt| !ctx.tables.is_database_type(ctx.release(), dt)) {
            ctx.sink.error(
                "Metric_Type not applicable",
                format!("{metric} is only reported for database Data_Types, not {dt}"),
                metric_pos,
                None,
            );
            return Ok(());
        }
    }

    let tabular = count_pos.is_tabular();
    let value = match count {
        Value::Number(n) => match n.as_u64() {
            Some(c) => c,
            None => {
                ctx.sink.error("Invalid Count", "Count must be a non-negative integer".into(), &count_pos, Some(n.to_string()));
                return Ok(());
            }
        },
        Value::String(s) if !tabular => match s.trim().parse::<u64>() {
            Ok(c) => {
                ctx.sink.error("Wrong data type", "Count must be a number, not a string".into(), &count_pos, Some(s.clone()));
                out.fixed = true;
                c
            }
            Err(_) => {
                ctx.sink.error("Invalid Count", "Count must be a non-negative integer".into(), &count_pos, Some(s.clone()));
                return Ok(());
            }
        },
        other => {
            ctx.sink.error("Invalid Count", "Count must be a non-negative integer".into(), &count_pos, Some(show(other)));
            return Ok(());
        }
    };

    // Zeros stay in the table until `store_data` so that overlaps are still seen.
    if value == 0 && !tabular {
        ctx.sink.error(ZERO_COUNT, format!("{metric} for {month} is 0; omit months without usage"), &count_pos, None);
    }
    if let Some(first) = out.table.count(metric, month) {
        ctx.sink.critical(
            IN_NODE_DUPLICATE,
            format!("{metric} for {month} given again (first at {})", first.position),
            &count_pos,
            Some(format!("{}, {value}", first.value)),
        );
        out.duplicate = true;
        return Ok(());
    }
    out.table.add(metric, month, value, count_pos)?;
    Ok(())
}

/// One Critical per overlapping pair of a merge.
pub fn report_conflicts(conflicts: &[Conflict], ctx: &mut ParseCtx<'_>) {
    for c in conflicts {
        let summary = if c.counts_differ() { CONFLICT_DIFFERENT } else { CONFLICT_IDENTICAL };
        ctx.sink.critical(
            summary,
            format!(
                "{} for {} is reported again (first at {})",
                c.metric, c.month, c.kept.position
            ),
            &c.discarded.position,
            Some(format!("{}, {}", c.kept.value, c.discarded.value)),
        );
    }
}

/// Release 5 output shape: month-ordered periods, canonical metric order.
pub fn periods_json(table: &PerformanceTable) -> Value {
    let mut periods = Vec::new();
    for month in table.months() {
        let instances: Vec<Value> = table
            .iter()
            .filter(|(_, m, _)| *m == month)
            .map(|(metric, _, c)| {
                let mut i = Map::new();
                i.insert("Metric_Type".into(), Value::String(metric.to_string()));
                i.insert("Count".into(), Value::from(c.value));
                Value::Object(i)
            })
            .collect();
        let mut period = Map::new();
        period.insert("Begin_Date".into(), Value::String(month.first_day().format("%Y-%m-%d").to_string()));
        period.insert("End_Date".into(), Value::String(month.last_day().format("%Y-%m-%d").to_string()));
        let mut entry = Map::new();
        entry.insert("Period".into(), Value::Object(period));
        entry.insert("Instance".into(), Value::Array(instances));
        periods.push(Value::Object(entry));
    }
    Value::Array(periods)
}

/// Release 5.1 output shape: `{Metric_Type: {"YYYY-MM": Count}}`.
pub fn metrics_json(table: &PerformanceTable) -> Value {
    let mut metrics = Map::new();
    for (metric, month, c) in table.iter() {
        let months = metrics.entry(metric.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(m) = months {
            m.insert(month.to_string(), Value::from(c.value));
        }
    }
    Value::Object(metrics)
}
