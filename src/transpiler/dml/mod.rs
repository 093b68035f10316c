//! Statement builders: one per plan kind.

pub mod delete;
pub mod insert;
pub mod select;
pub mod update;

use crate::ast::{EntityValue, Expr};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::plan::{AggregateClause, JoinTarget, OrderClause, SelectPlan};
use crate::schema::EntityDescriptor;
use crate::transpiler::Translator;
use crate::transpiler::visitors::predicate::aggregate;
use crate::transpiler::visitors::{
    Projection, VisitContext, visit_assignments, visit_group_by, visit_join, visit_order_by,
    visit_predicate, visit_select,
};

/// What a layer renders between its leading keyword and FROM.
#[derive(Clone, Copy)]
pub(crate) enum Columns<'p> {
    Rows(&'p Expr),
    Aggregate(&'p AggregateClause),
    /// SET list of a joined UPDATE
    Assignments(&'p EntityDescriptor, &'p Expr),
    Nothing,
}

/// Rendered clauses of one plan layer.
pub(crate) struct Layer {
    pub projection: Option<Projection>,
    pub columns: String,
    /// `[Table] t0` or `(subquery) t0`
    pub from: String,
    pub alias: String,
    /// Explicit joins followed by navigation joins
    pub joins: String,
    /// WHERE, GROUP BY and HAVING
    pub clauses: String,
    /// ORDER BY list, empty when unordered
    pub orders: String,
}

impl Layer {
    pub fn body(&self) -> String {
        format!(" FROM {}{}{}", self.from, self.joins, self.clauses)
    }
}

/// Render every clause of `plan` against one alias scope. Clauses are
/// visited in the order they appear in the statement text, derived tables
/// included, so parameters are numbered left to right.
pub(crate) fn render_layer(
    tr: &mut Translator,
    plan: &SelectPlan,
    columns: Columns,
    orders: &[OrderClause],
) -> CompileResult<Layer> {
    let config = tr.config;
    let mut ctx = tr.context(plan);
    let alias = ctx.source(0)?.alias;

    // MySQL writes the joins of an UPDATE ahead of its SET list
    let columns_first = match columns {
        Columns::Assignments(..) => ctx.generator.update_set_first(),
        _ => true,
    };
    let mut projection = None;
    let mut rendered = None;
    if columns_first {
        rendered = Some(visit_columns(&mut ctx, columns, &alias, &mut projection)?);
    }

    let source = match &plan.subquery {
        Some(inner) => derived_table(&mut ctx, config, inner)?,
        None => {
            let ty = plan
                .source
                .as_ref()
                .ok_or_else(|| CompileError::ambiguous("plan layer has no row source"))?;
            ctx.quote(&ctx.schema.entity(ty)?.table)
        }
    };
    let mut joins = String::new();
    for join in &plan.joins {
        let target = match &join.target {
            JoinTarget::Table(ty) => ctx.quote(&ctx.schema.entity(ty)?.table),
            JoinTarget::Subquery(inner) => derived_table(&mut ctx, config, inner)?,
        };
        joins.push_str(&visit_join(&mut ctx, join, &target)?);
    }
    let rendered = match rendered {
        Some(sql) => sql,
        None => visit_columns(&mut ctx, columns, &alias, &mut projection)?,
    };

    let mut clauses = String::new();
    if let Some(predicate) = &plan.predicate {
        clauses.push_str(" WHERE ");
        clauses.push_str(&visit_predicate(&mut ctx, predicate)?);
    }
    if let Some(key) = &plan.group_by {
        clauses.push_str(" GROUP BY ");
        clauses.push_str(&visit_group_by(&mut ctx, key)?);
    }
    if let Some(having) = &plan.having {
        clauses.push_str(" HAVING ");
        clauses.push_str(&visit_predicate(&mut ctx, having)?);
    }
    let orders = if orders.is_empty() {
        String::new()
    } else {
        visit_order_by(&mut ctx, orders)?
    };
    joins.push_str(&ctx.navigation_joins());

    Ok(Layer {
        projection,
        columns: rendered,
        from: format!("{} {}", source, alias),
        alias,
        joins,
        clauses,
        orders,
    })
}

fn visit_columns(
    ctx: &mut VisitContext,
    columns: Columns,
    alias: &str,
    projection: &mut Option<Projection>,
) -> CompileResult<String> {
    Ok(match columns {
        Columns::Rows(select) => {
            let plan = ctx.plan;
            let p = visit_select(ctx, select, &plan.includes)?;
            let sql = p.render(ctx);
            *projection = Some(p);
            sql
        }
        Columns::Aggregate(agg) => aggregate(ctx, agg.func, agg.selector.as_ref())?.sql,
        Columns::Assignments(entity, assignments) => {
            let qualify = ctx.generator.qualify_update_target().then_some(alias);
            visit_assignments(ctx, entity, assignments, qualify)?
        }
        Columns::Nothing => String::new(),
    })
}

/// `(SELECT ...)` of an inner plan, numbering its parameters after the ones
/// `ctx` has collected so far.
fn derived_table(
    ctx: &mut VisitContext,
    config: &CompilerConfig,
    inner: &SelectPlan,
) -> CompileResult<String> {
    let mut tr = Translator::new(ctx.schema, config);
    tr.params.index = ctx.params.index;
    let sql = select::build_select(&mut tr, inner, true)?;
    ctx.params.index = tr.params.index;
    ctx.params.params.append(&mut tr.params.params);
    Ok(format!("({})", sql))
}

/// Reject payload members the entity does not declare.
pub(crate) fn check_payload(entity: &EntityDescriptor, value: &EntityValue) -> CompileResult<()> {
    if value.ty != entity.ty {
        return Err(CompileError::operand(
            "entity",
            format!("expected {}, got {}", entity.ty, value.ty),
        ));
    }
    for (member, _) in &value.values {
        entity.column(member)?;
    }
    Ok(())
}

/// `[key] = value AND ...` over an entity instance's key members.
pub(crate) fn key_filter(
    tr: &mut Translator,
    entity: &EntityDescriptor,
    value: &EntityValue,
) -> CompileResult<String> {
    let keys: Vec<_> = entity.keys().collect();
    if keys.is_empty() {
        return Err(CompileError::MissingKey(entity.ty.to_string()));
    }
    let scope = SelectPlan::from_source(entity.ty.clone());
    let mut ctx = tr.context(&scope);
    let mut parts = Vec::with_capacity(keys.len());
    for (member, col) in keys {
        let v = value.get(member).ok_or_else(|| {
            CompileError::operand("entity", format!("missing key value '{}'", member))
        })?;
        parts.push(format!(
            "{} = {}",
            ctx.quote(&col.column),
            ctx.constant_typed(v, col.db_type, col.size)
        ));
    }
    Ok(parts.join(" AND "))
}
