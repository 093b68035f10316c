//! SELECT SQL generation.

use tracing::debug;

use super::{Columns, render_layer};
use crate::error::{CompileError, CompileResult};
use crate::parser::rebase::inherited_orders;
use crate::plan::{AggregateClause, OrderClause, SelectPlan};
use crate::schema::Schema;
use crate::transpiler::visitors::Projection;
use crate::transpiler::visitors::predicate::aggregate_function;
use crate::transpiler::{ResultMap, Translator};

/// Top-level SELECT plus the result map of its columns.
pub fn build_query(tr: &mut Translator, plan: &SelectPlan) -> CompileResult<(String, ResultMap)> {
    let (sql, projection) = compose(tr, plan, false)?;
    let map = match projection {
        Some(p) => ResultMap {
            columns: p.names().map(str::to_string).collect(),
            navigations: p.navigations,
        },
        // Any and aggregates return a single unnamed value
        None => ResultMap::default(),
    };
    Ok((sql, map))
}

/// Generate SELECT SQL. A `nested` layer is rendered as a derived table and
/// drops an ORDER BY that does not serve its own pagination.
pub fn build_select(tr: &mut Translator, plan: &SelectPlan, nested: bool) -> CompileResult<String> {
    Ok(compose(tr, plan, nested)?.0)
}

fn compose(
    tr: &mut Translator,
    plan: &SelectPlan,
    nested: bool,
) -> CompileResult<(String, Option<Projection>)> {
    let (mut sql, projection) = if plan.any {
        (build_any(tr, plan)?, None)
    } else if let Some(agg) = &plan.aggregate {
        (build_aggregate(tr, plan, agg)?, None)
    } else {
        build_rows(tr, plan, nested)?
    };

    for branch in &plan.unions {
        let mut text = build_select(tr, branch, false)?;
        if branch.is_paginated() || !branch.orders.is_empty() {
            text = format!("SELECT * FROM ({}) t0", text);
        }
        sql.push_str(" UNION ALL ");
        sql.push_str(&text);
    }
    Ok((sql, projection))
}

fn build_rows(
    tr: &mut Translator,
    plan: &SelectPlan,
    nested: bool,
) -> CompileResult<(String, Option<Projection>)> {
    let orders = effective_orders(tr.schema, plan);
    let layer = render_layer(tr, plan, Columns::Rows(&plan.select), &orders)?;
    let g = tr.generator.as_ref();
    let (skip, take) = (plan.skip, plan.take);

    if skip > 0 && layer.orders.is_empty() {
        return Err(CompileError::MissingOrderByForPagination(format!(
            "Skip({})",
            skip
        )));
    }
    let distinct = if plan.distinct { "DISTINCT " } else { "" };
    let body = layer.body();

    // Unbounded skip: number the rows and filter past the offset
    if skip > 0 && take == 0 && (!g.offset_without_limit() || tr.config.row_number_paging) {
        let row_number = g.quote_identifier("Row_Number0");
        let inner = format!(
            "SELECT {}{}, ROW_NUMBER() OVER (ORDER BY {}) AS {}{}",
            distinct, layer.columns, layer.orders, row_number, body
        );
        let outer: Vec<String> = layer
            .projection
            .iter()
            .flat_map(|p| p.names())
            .map(|n| format!("t0.{}", g.quote_identifier(n)))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM ({}) t0 WHERE t0.{} > {}",
            outer.join(", "),
            inner,
            row_number,
            skip
        );
        if !nested {
            sql.push_str(&format!(" ORDER BY t0.{}", row_number));
        }
        return Ok((sql, layer.projection));
    }

    let top = if take > 0 && skip == 0 { g.top(take) } else { None };
    let mut sql = format!(
        "SELECT {}{}{}{}",
        distinct,
        top.as_deref().unwrap_or(""),
        layer.columns,
        body
    );
    if !layer.orders.is_empty() && (!nested || plan.is_paginated()) {
        sql.push_str(" ORDER BY ");
        sql.push_str(&layer.orders);
    }
    if top.is_none() && plan.is_paginated() {
        sql.push_str(&g.limit_offset(
            (take > 0).then_some(take),
            (skip > 0).then_some(skip),
        ));
    }
    Ok((sql, layer.projection))
}

/// Orders of this layer, or the inner layer's orders mapped onto the
/// derived columns when this layer has none of its own. A layer carrying
/// unions never inherits: ORDER BY cannot precede UNION ALL.
fn effective_orders(schema: &Schema, plan: &SelectPlan) -> Vec<OrderClause> {
    if !plan.orders.is_empty() || !plan.unions.is_empty() {
        return plan.orders.clone();
    }
    if plan.distinct || plan.group_by.is_some() {
        return Vec::new();
    }
    match inherited_orders(schema, plan) {
        Some(orders) => orders,
        None => {
            debug!("inner ordering is not projected, dropping it");
            Vec::new()
        }
    }
}

fn build_any(tr: &mut Translator, plan: &SelectPlan) -> CompileResult<String> {
    let layer = render_layer(tr, plan, Columns::Nothing, &[])?;
    Ok(tr.generator.any_query(layer.body().trim_start()))
}

fn build_aggregate(
    tr: &mut Translator,
    plan: &SelectPlan,
    agg: &AggregateClause,
) -> CompileResult<String> {
    if !(plan.distinct || plan.group_by.is_some() || plan.is_paginated()) {
        let layer = render_layer(tr, plan, Columns::Aggregate(agg), &[])?;
        return Ok(format!("SELECT {}{}", layer.columns, layer.body()));
    }

    // Aggregate over the finished rows of this layer
    let mut inner = plan.clone();
    inner.aggregate = None;
    let arg = match &agg.selector {
        Some(selector) => {
            inner.select = selector.clone();
            format!("t0.{}", tr.quote(selector.output_name()))
        }
        None => "1".to_string(),
    };
    let inner_sql = build_select(tr, &inner, true)?;
    Ok(format!(
        "SELECT {}({}) FROM ({}) t0",
        aggregate_function(agg.func),
        arg,
        inner_sql
    ))
}
