//! Query parser: operator log to query plan.
//!
//! The log is scanned left to right into a plan layer. Once a layer has seen
//! `Take`, `Skip` (not followed by `Take`), `Distinct` or `AsSubquery`, the
//! next operator opens a new outer layer reading the finished one as a
//! derived table.

mod binder;
mod joins;
pub(crate) mod nesting;
pub(crate) mod rebase;

pub use binder::{bind, conjoin};

use tracing::debug;

use crate::ast::{Expr, Lambda, OpKind, Operand, Operator, OperatorLog};
use crate::error::{CompileError, CompileResult};
use crate::plan::{
    AggregateClause, DeletePayload, DeletePlan, InsertPayload, InsertPlan, OrderClause,
    QueryPlan, SelectPlan, UpdatePayload, UpdatePlan,
};
use crate::schema::{Schema, TypeToken};

use self::nesting::{Shape, classify};
use self::rebase::{derived_row, inherited_orders};

/// Parse an operator log into a query plan.
pub fn parse(schema: &Schema, log: &OperatorLog) -> CompileResult<QueryPlan> {
    log.validate()?;
    Parser {
        schema,
        ops: log.entries(),
    }
    .run()
}

/// Parse a nested log (join target, union branch) that must be a SELECT.
pub(crate) fn parse_select(schema: &Schema, log: &OperatorLog) -> CompileResult<SelectPlan> {
    match parse(schema, log)? {
        QueryPlan::Select(plan) => Ok(plan),
        _ => Err(CompileError::operand(
            "Query",
            "a nested query cannot insert, update or delete",
        )),
    }
}

struct Parser<'a> {
    schema: &'a Schema,
    ops: &'a [Operator],
}

/// Pending insert/update/delete intent of the last layer.
enum Dml {
    /// Target type; None payload means INSERT ... SELECT from the scope
    Insert(TypeToken, Option<InsertPayload>),
    Update(UpdatePayload),
    Delete(DeletePayload),
}

/// Parse state of one plan layer.
struct Layer {
    plan: SelectPlan,
    /// Row expression lambdas of this layer are bound to
    row: Expr,
    wheres: Vec<Expr>,
    havings: Vec<Expr>,
    grouped: bool,
    skip_set: bool,
    take_set: bool,
    /// Distinct or AsSubquery seen
    boundary: bool,
    terminal: Option<OpKind>,
    dml: Option<Dml>,
    /// Operators applied to this layer so far
    applied: usize,
}

impl Layer {
    fn new(plan: SelectPlan, row: Expr) -> Self {
        Self {
            plan,
            row,
            wheres: Vec::new(),
            havings: Vec::new(),
            grouped: false,
            skip_set: false,
            take_set: false,
            boundary: false,
            terminal: None,
            dml: None,
            applied: 0,
        }
    }

    fn root(ty: TypeToken) -> Self {
        Self::new(SelectPlan::from_source(ty), Expr::Source(0))
    }

    /// True when `kind` must start a new outer layer.
    fn must_close(&self, kind: OpKind) -> bool {
        if self.take_set || self.boundary || (self.skip_set && kind != OpKind::Take) {
            return true;
        }
        if !self.plan.unions.is_empty() && kind != OpKind::Union {
            return true;
        }
        self.grouped
            && matches!(
                kind,
                OpKind::Join
                    | OpKind::GroupJoin
                    | OpKind::GroupJoinRight
                    | OpKind::SelectMany
                    | OpKind::GroupBy
                    | OpKind::Count
                    | OpKind::Sum
                    | OpKind::Max
                    | OpKind::Min
                    | OpKind::Average
            )
    }

    /// Route a predicate to WHERE, or HAVING once grouped.
    fn restrict(&mut self, predicate: Expr) {
        if self.grouped {
            self.havings.push(predicate);
        } else {
            self.wheres.push(predicate);
        }
    }
}

fn lambda_at(op: &Operator, index: usize) -> CompileResult<&Lambda> {
    op.lambda(index)
        .ok_or_else(|| CompileError::operand(op.kind, format!("missing lambda #{}", index)))
}

impl<'a> Parser<'a> {
    fn run(&self) -> CompileResult<QueryPlan> {
        let (mut layer, mut i) = self.open_root()?;
        while let Some(op) = self.ops.get(i) {
            if let Some(terminal) = layer.terminal {
                return Err(CompileError::operand(
                    op.kind,
                    format!("nothing may follow {}", terminal),
                ));
            }
            if layer.must_close(op.kind) {
                layer = self.open_outer(layer, op.kind)?;
                continue;
            }
            self.apply(&mut layer, op)?;
            layer.applied += 1;
            i += 1;
        }
        self.finish(layer)
    }

    fn open_root(&self) -> CompileResult<(Layer, usize)> {
        let Some(first) = self.ops.first() else {
            return Err(CompileError::operand("Query", "empty operator log"));
        };
        let ty = match (first.kind, first.operands.first()) {
            (OpKind::GetSource, Some(Operand::Type(ty))) => {
                self.schema.entity(ty)?;
                return Ok((Layer::root(ty.clone()), 1));
            }
            (
                OpKind::Insert | OpKind::Update | OpKind::Delete,
                Some(Operand::Entity(entity)),
            ) => entity.ty.clone(),
            (OpKind::Insert, Some(Operand::Entities(list))) => match list.first() {
                Some(entity) => entity.ty.clone(),
                None => return Err(CompileError::operand(OpKind::Insert, "no rows to insert")),
            },
            (kind, _) => {
                return Err(CompileError::operand(
                    kind,
                    "a query must start with GetSource or an entity payload",
                ));
            }
        };
        self.schema.entity(&ty)?;
        Ok((Layer::root(ty), 0))
    }

    /// Seal `inner` and open a layer reading it as a derived table.
    fn open_outer(&self, inner: Layer, next: OpKind) -> CompileResult<Layer> {
        let mut inner = self.seal(inner);
        let includes = std::mem::take(&mut inner.includes);
        let (row, source) = derived_row(self.schema, &inner, 0)?;
        debug!(
            next = %next,
            distinct = inner.distinct,
            skip = inner.skip,
            take = inner.take,
            "operator after layer boundary: opening outer plan"
        );
        let plan = SelectPlan {
            source,
            subquery: Some(Box::new(inner)),
            includes,
            ..SelectPlan::default()
        };
        Ok(Layer::new(plan, row))
    }

    fn apply(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        match op.kind {
            OpKind::GetSource => Err(CompileError::operand(
                op.kind,
                "GetSource may only start a query",
            )),
            OpKind::Where => {
                let predicate = bind(lambda_at(op, 0)?, std::slice::from_ref(&layer.row))?;
                layer.restrict(predicate);
                Ok(())
            }
            OpKind::Select => {
                layer.row = bind(lambda_at(op, 0)?, std::slice::from_ref(&layer.row))?;
                Ok(())
            }
            OpKind::SelectMany => self.apply_select_many(layer, op),
            OpKind::Join | OpKind::GroupJoin | OpKind::GroupJoinRight => {
                self.apply_join(layer, op)
            }
            OpKind::GroupBy => {
                let key = bind(lambda_at(op, 0)?, std::slice::from_ref(&layer.row))?;
                let element = match op.lambda(1) {
                    Some(l) => bind(l, std::slice::from_ref(&layer.row))?,
                    None => layer.row.clone(),
                };
                layer.plan.group_by = Some(key.clone());
                layer.row = Expr::Grouping {
                    key: Box::new(key),
                    element: Box::new(element),
                };
                layer.grouped = true;
                Ok(())
            }
            OpKind::OrderBy | OpKind::OrderByDescending => {
                layer.plan.orders.clear();
                self.push_orders(layer, op, op.kind == OpKind::OrderByDescending)
            }
            OpKind::ThenBy | OpKind::ThenByDescending => {
                if layer.plan.orders.is_empty() {
                    return Err(CompileError::operand(
                        op.kind,
                        "ThenBy requires a preceding OrderBy",
                    ));
                }
                self.push_orders(layer, op, op.kind == OpKind::ThenByDescending)
            }
            OpKind::Skip => {
                let n = op.row_count().unwrap_or_default();
                if n > 0 && layer.plan.orders.is_empty() {
                    // a derived layer pages by the ordering of the rows it reads
                    if let Some(orders) = inherited_orders(self.schema, &layer.plan) {
                        layer.plan.orders = orders;
                    }
                }
                if n > 0 && layer.plan.orders.is_empty() {
                    return Err(CompileError::MissingOrderByForPagination(format!(
                        "Skip({})",
                        n
                    )));
                }
                layer.plan.skip = n;
                layer.skip_set = n > 0;
                Ok(())
            }
            OpKind::Take => {
                let n = op.row_count().unwrap_or_default();
                layer.plan.take = n;
                layer.take_set = n > 0;
                Ok(())
            }
            OpKind::Distinct => {
                layer.plan.distinct = true;
                layer.boundary = true;
                Ok(())
            }
            OpKind::AsSubquery => {
                layer.boundary = true;
                Ok(())
            }
            OpKind::Any => {
                self.optional_predicate(layer, op)?;
                layer.plan.any = true;
                layer.terminal = Some(op.kind);
                Ok(())
            }
            OpKind::First | OpKind::FirstOrDefault | OpKind::Single | OpKind::SingleOrDefault => {
                self.optional_predicate(layer, op)?;
                layer.plan.take = 1;
                layer.terminal = Some(op.kind);
                Ok(())
            }
            OpKind::Count | OpKind::Sum | OpKind::Max | OpKind::Min | OpKind::Average => {
                self.apply_aggregate(layer, op)
            }
            OpKind::Union => {
                let log = op
                    .query(0)
                    .ok_or_else(|| CompileError::operand(op.kind, "missing query"))?;
                let mut branch = parse_select(self.schema, log)?;
                if !branch.is_paginated() && !branch.orders.is_empty() {
                    debug!("dropping unpaginated order by of a union branch");
                    branch.orders.clear();
                }
                if !layer.plan.is_paginated() && !layer.plan.orders.is_empty() {
                    debug!("dropping unpaginated order by before union");
                    layer.plan.orders.clear();
                }
                layer.plan.unions.push(branch);
                Ok(())
            }
            OpKind::Include => self.apply_include(layer, op),
            OpKind::Insert | OpKind::Update | OpKind::Delete => self.apply_dml(layer, op),
        }
    }

    fn push_orders(&self, layer: &mut Layer, op: &Operator, descending: bool) -> CompileResult<()> {
        let key = bind(lambda_at(op, 0)?, std::slice::from_ref(&layer.row))?;
        match key {
            // composite key: one column per binding
            Expr::New { bindings, .. } => {
                layer
                    .plan
                    .orders
                    .extend(bindings.into_iter().map(|b| OrderClause {
                        expr: b.value,
                        descending,
                    }))
            }
            expr => layer.plan.orders.push(OrderClause { expr, descending }),
        }
        Ok(())
    }

    fn optional_predicate(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        if let Some(l) = op.lambda(0) {
            let predicate = bind(l, std::slice::from_ref(&layer.row))?;
            layer.restrict(predicate);
        }
        Ok(())
    }

    fn apply_aggregate(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        let func = op
            .kind
            .aggregate()
            .ok_or_else(|| CompileError::UnsupportedOperator(op.kind.to_string()))?;
        let selector = match (op.kind, op.lambda(0)) {
            (OpKind::Count, predicate) => {
                if let Some(l) = predicate {
                    let predicate = bind(l, std::slice::from_ref(&layer.row))?;
                    layer.restrict(predicate);
                }
                None
            }
            (_, Some(l)) => Some(bind(l, std::slice::from_ref(&layer.row))?),
            (_, None) => match classify(self.schema, &layer.plan, &layer.row)? {
                Shape::Scalar => Some(layer.row.clone()),
                _ => {
                    return Err(CompileError::operand(
                        op.kind,
                        "aggregate over whole rows needs a selector",
                    ));
                }
            },
        };
        layer.plan.aggregate = Some(AggregateClause { func, selector });
        layer.terminal = Some(op.kind);
        Ok(())
    }

    fn apply_include(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        let Some(root) = layer.plan.source.clone() else {
            return Err(CompileError::operand(op.kind, "Include needs an entity source"));
        };
        if layer.row != Expr::Source(0) {
            return Err(CompileError::operand(
                op.kind,
                "Include must precede any projection",
            ));
        }
        let path = bind(lambda_at(op, 0)?, &[Expr::Source(0)])?;
        let hops: Vec<String> = match path.member_path() {
            Some((0, hops)) if !hops.is_empty() => hops.into_iter().map(String::from).collect(),
            _ => {
                return Err(CompileError::operand(
                    op.kind,
                    format!("{} is not a navigation path", path),
                ));
            }
        };
        let mut ty = root;
        for hop in &hops {
            let entity = self.schema.entity(&ty)?;
            let nav = entity
                .navigation(hop)
                .ok_or_else(|| CompileError::member(&ty, hop.clone()))?;
            ty = nav.target.clone();
        }
        if !layer.plan.includes.contains(&hops) {
            layer.plan.includes.push(hops);
        }
        Ok(())
    }

    fn apply_dml(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        let Some(source) = layer.plan.source.clone().filter(|_| !layer.plan.is_derived()) else {
            return Err(CompileError::operand(
                op.kind,
                "cannot modify rows of a derived table",
            ));
        };
        let entity_payload = |ty: &TypeToken| -> CompileResult<()> {
            if layer.applied > 0 {
                return Err(CompileError::operand(
                    op.kind,
                    "an entity payload cannot follow other operators",
                ));
            }
            if *ty != source {
                return Err(CompileError::operand(
                    op.kind,
                    format!("payload of type {} on a {} source", ty, source),
                ));
            }
            Ok(())
        };
        let dml = match (op.kind, op.operands.first()) {
            (OpKind::Insert, Some(Operand::Entity(e))) => {
                entity_payload(&e.ty)?;
                Dml::Insert(source.clone(), Some(InsertPayload::Entity(e.clone())))
            }
            (OpKind::Insert, Some(Operand::Entities(list))) => {
                for e in list {
                    entity_payload(&e.ty)?;
                }
                Dml::Insert(source.clone(), Some(InsertPayload::Entities(list.clone())))
            }
            (OpKind::Insert, Some(Operand::Type(target))) => {
                self.schema.entity(target)?;
                if !matches!(layer.row, Expr::New { .. }) {
                    return Err(CompileError::operand(
                        op.kind,
                        "INSERT ... SELECT needs an object projection",
                    ));
                }
                Dml::Insert(target.clone(), None)
            }
            (OpKind::Update, Some(Operand::Entity(e))) => {
                entity_payload(&e.ty)?;
                Dml::Update(UpdatePayload::Entity(e.clone()))
            }
            (OpKind::Update, Some(Operand::Lambda(l))) => {
                if layer.row != Expr::Source(0) {
                    return Err(CompileError::operand(
                        op.kind,
                        "Update cannot follow a projection",
                    ));
                }
                let assignments = bind(l, &[Expr::Source(0)])?;
                if !matches!(assignments, Expr::New { .. }) {
                    return Err(CompileError::operand(
                        op.kind,
                        "assignments must be an object construction",
                    ));
                }
                Dml::Update(UpdatePayload::Assignments(assignments))
            }
            (OpKind::Delete, Some(Operand::Entity(e))) => {
                entity_payload(&e.ty)?;
                Dml::Delete(DeletePayload::Entity(e.clone()))
            }
            (OpKind::Delete, None) => Dml::Delete(DeletePayload::Predicate),
            (kind, _) => return Err(CompileError::operand(kind, "unexpected payload")),
        };
        layer.dml = Some(dml);
        layer.terminal = Some(op.kind);
        Ok(())
    }

    /// Freeze the accumulated clause state into a plan.
    fn seal(&self, layer: Layer) -> SelectPlan {
        let Layer {
            mut plan,
            row,
            wheres,
            havings,
            ..
        } = layer;
        plan.select = match row {
            Expr::Grouping { key, .. } => *key,
            row => row,
        };
        plan.predicate = conjoin(wheres);
        plan.having = conjoin(havings);
        if !plan.includes.is_empty() && !plan.is_identity_projection() {
            debug!(
                includes = plan.includes.len(),
                "projection replaces included navigation"
            );
            plan.includes.clear();
        }
        plan
    }

    fn finish(&self, mut layer: Layer) -> CompileResult<QueryPlan> {
        let dml = layer.dml.take();
        let scope = self.seal(layer);
        let Some(dml) = dml else {
            return Ok(QueryPlan::Select(nesting::synthesize(self.schema, scope)?));
        };
        let target = || {
            scope
                .source
                .clone()
                .ok_or_else(|| CompileError::operand("Query", "no target entity"))
        };
        Ok(match dml {
            Dml::Insert(target, payload) => QueryPlan::Insert(InsertPlan {
                target,
                payload: match payload {
                    Some(payload) => payload,
                    None => InsertPayload::Query(scope),
                },
            }),
            Dml::Update(payload) => QueryPlan::Update(UpdatePlan {
                target: target()?,
                payload,
                scope,
            }),
            Dml::Delete(payload) => QueryPlan::Delete(DeletePlan {
                target: target()?,
                payload,
                scope,
            }),
        })
    }
}
