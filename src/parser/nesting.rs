//! Nested-subquery synthesis for one-to-many navigation.
//!
//! A projector (or include list) that reaches a collection navigation would
//! multiply root rows under a flat join. The plan is split: the inner layer
//! keeps filters, joins, grouping, pagination and scalar columns; the outer
//! layer re-attaches navigations over the derived rows.

use tracing::debug;

use crate::ast::Expr;
use crate::error::{CompileError, CompileResult};
use crate::parser::rebase::Rebaser;
use crate::plan::{OrderClause, SelectPlan};
use crate::schema::{MemberKind, Schema, TypeToken};

/// What a bound expression denotes.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Scalar,
    /// A single entity (root, joined row or reference navigation)
    Entity(TypeToken),
    /// Collection navigation
    Collection(TypeToken),
    /// Object construction
    Object,
    /// Untyped row (anonymous derived rows, groupings)
    Row,
}

pub fn classify(schema: &Schema, plan: &SelectPlan, expr: &Expr) -> CompileResult<Shape> {
    Ok(match expr {
        Expr::Source(k) => match plan.source_type(*k) {
            Some(ty) => Shape::Entity(ty.clone()),
            None => Shape::Row,
        },
        Expr::Member { target, member } => match classify(schema, plan, target)? {
            Shape::Entity(ty) => {
                let entity = schema.entity(&ty)?;
                match entity.member(member).map(|m| &m.kind) {
                    Some(MemberKind::Column(_)) => Shape::Scalar,
                    Some(MemberKind::Navigation(nav)) if nav.many => {
                        Shape::Collection(nav.target.clone())
                    }
                    Some(MemberKind::Navigation(nav)) => Shape::Entity(nav.target.clone()),
                    // helper columns exported by an inner layer
                    None if plan.is_derived() && **target == Expr::Source(0) => Shape::Scalar,
                    None => return Err(CompileError::member(&ty, member.clone())),
                }
            }
            Shape::Collection(ty) => {
                return Err(CompileError::ambiguous(format!(
                    "'{}' is a member of a collection of {}",
                    member, ty
                )));
            }
            Shape::Scalar | Shape::Row | Shape::Object => Shape::Scalar,
        },
        Expr::New { .. } => Shape::Object,
        Expr::Grouping { .. } => Shape::Row,
        Expr::JoinGroup { .. } => {
            return Err(CompileError::ambiguous(
                "a group join result must be flattened with SelectMany",
            ));
        }
        _ => Shape::Scalar,
    })
}

fn binds_collection(schema: &Schema, plan: &SelectPlan, expr: &Expr) -> CompileResult<bool> {
    match expr {
        Expr::New { bindings, .. } => {
            for b in bindings {
                if binds_collection(schema, plan, &b.value)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        e => Ok(matches!(classify(schema, plan, e)?, Shape::Collection(_))),
    }
}

fn includes_collection(schema: &Schema, plan: &SelectPlan) -> CompileResult<bool> {
    let Some(root) = &plan.source else {
        return Ok(false);
    };
    for path in &plan.includes {
        let mut ty = root.clone();
        for hop in path {
            let Some(nav) = schema.entity(&ty)?.navigation(hop) else {
                return Err(CompileError::member(&ty, hop.clone()));
            };
            if nav.many {
                return Ok(true);
            }
            ty = nav.target.clone();
        }
    }
    Ok(false)
}

/// Split `plan` into an outer/inner pair when it projects one-to-many
/// navigation; returns it unchanged otherwise.
pub fn synthesize(schema: &Schema, plan: SelectPlan) -> CompileResult<SelectPlan> {
    if plan.any || plan.aggregate.is_some() {
        return Ok(plan);
    }
    if matches!(classify(schema, &plan, &plan.select)?, Shape::Collection(_)) {
        return Err(CompileError::ambiguous(
            "a collection navigation cannot be the whole projection; use SelectMany",
        ));
    }
    if !binds_collection(schema, &plan, &plan.select)? && !includes_collection(schema, &plan)? {
        return Ok(plan);
    }
    if !plan.unions.is_empty() {
        return Err(CompileError::ambiguous(
            "one-to-many navigation cannot be combined with Union",
        ));
    }
    debug!(
        source = ?plan.source,
        paginated = plan.is_paginated(),
        "one-to-many navigation: nesting root query"
    );
    split(schema, plan)
}

fn split(schema: &Schema, mut inner: SelectPlan) -> CompileResult<SelectPlan> {
    let includes = std::mem::take(&mut inner.includes);
    let select = std::mem::take(&mut inner.select);
    let orders = std::mem::take(&mut inner.orders);
    let root = inner.source.clone();
    let identity = select == Expr::Source(0);
    if !identity && !matches!(select, Expr::New { .. }) {
        return Err(CompileError::ambiguous(format!(
            "cannot nest projection {}",
            select
        )));
    }

    let mut rebaser = Rebaser::new(schema, root.clone(), identity);
    for path in &includes {
        let nav = path
            .iter()
            .fold(Expr::Source(0), |acc, hop| acc.member(hop.clone()));
        rebaser.rebase(&nav)?;
    }
    let outer_select = if identity {
        Expr::Source(0)
    } else {
        // required key columns first, so scalar names never take them
        require_navigation_keys(schema, &inner, &mut rebaser, &select)?;
        split_bindings(schema, &inner, &mut rebaser, &select)?
    };

    let mut outer_orders = Vec::with_capacity(orders.len());
    for order in &orders {
        outer_orders.push(OrderClause {
            expr: rebaser.export(order.expr.output_name(), &order.expr)?,
            descending: order.descending,
        });
    }
    // paginated rows keep their own ordering; the outer join needs it again
    if inner.is_paginated() {
        inner.orders = orders;
    }
    inner.select = if identity {
        Expr::Source(0)
    } else {
        Expr::New {
            ty: None,
            bindings: rebaser.into_columns(),
        }
    };

    Ok(SelectPlan {
        source: root,
        subquery: Some(Box::new(inner)),
        has_many: true,
        includes,
        orders: outer_orders,
        select: outer_select,
        ..SelectPlan::default()
    })
}

fn require_navigation_keys(
    schema: &Schema,
    inner: &SelectPlan,
    rebaser: &mut Rebaser<'_>,
    expr: &Expr,
) -> CompileResult<()> {
    let Expr::New { bindings, .. } = expr else {
        return Ok(());
    };
    for b in bindings {
        match classify(schema, inner, &b.value)? {
            Shape::Scalar | Shape::Row => {}
            Shape::Object => require_navigation_keys(schema, inner, rebaser, &b.value)?,
            Shape::Entity(_) | Shape::Collection(_) => {
                rebaser.rebase(&b.value)?;
            }
        }
    }
    Ok(())
}

fn split_bindings(
    schema: &Schema,
    inner: &SelectPlan,
    rebaser: &mut Rebaser<'_>,
    expr: &Expr,
) -> CompileResult<Expr> {
    let Expr::New { ty, bindings } = expr else {
        return rebaser.rebase(expr);
    };
    let mut out = Vec::with_capacity(bindings.len());
    for b in bindings {
        let value = match classify(schema, inner, &b.value)? {
            Shape::Scalar | Shape::Row => rebaser.export(&b.member, &b.value)?,
            Shape::Object => split_bindings(schema, inner, rebaser, &b.value)?,
            Shape::Entity(_) | Shape::Collection(_) => rebaser.rebase(&b.value)?,
        };
        out.push(crate::ast::Binding::new(b.member.clone(), value));
    }
    Ok(Expr::New {
        ty: ty.clone(),
        bindings: out,
    })
}
