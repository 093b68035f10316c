//! Join, GroupJoin and SelectMany.
//!
//! Every explicit join gets the next source id of its layer. A GroupJoin
//! binds its group as `JoinGroup { join, .. }`, so a later SelectMany over
//! that group (with or without `DefaultIfEmpty`) finds the join it
//! flattens by index rather than by parameter name.

use tracing::debug;

use super::nesting::{Shape, classify};
use super::rebase::derived_row;
use super::{Layer, Parser, bind, lambda_at, parse_select};
use crate::ast::{Expr, OpKind, Operator, OperatorLog, SourceId, Value};
use crate::error::{CompileError, CompileResult};
use crate::plan::{JoinClause, JoinKind, JoinTarget};
use crate::schema::TypeToken;

impl Parser<'_> {
    pub(super) fn apply_join(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        let log = op
            .query(0)
            .ok_or_else(|| CompileError::operand(op.kind, "missing inner query"))?;
        let index = layer.plan.joins.len();
        let source = index + 1;
        let (target, join_row, row_type) = self.join_target(log, source)?;

        let outer = bind(lambda_at(op, 1)?, std::slice::from_ref(&layer.row))?;
        let inner = bind(lambda_at(op, 2)?, std::slice::from_ref(&join_row))?;
        let (outer_keys, inner_keys) = pair_keys(op.kind, outer, inner)?;

        let kind = match op.kind {
            OpKind::Join => JoinKind::Inner,
            OpKind::GroupJoin => JoinKind::Left,
            _ => JoinKind::Right,
        };
        layer.plan.joins.push(JoinClause {
            kind,
            source,
            target,
            row_type,
            outer_keys,
            inner_keys,
        });

        let second = if op.kind == OpKind::Join {
            join_row
        } else {
            Expr::JoinGroup {
                join: index,
                element: Box::new(join_row),
            }
        };
        layer.row = bind(lambda_at(op, 3)?, &[layer.row.clone(), second])?;
        Ok(())
    }

    /// Table for a bare `GetSource<T>` log, derived table otherwise.
    fn join_target(
        &self,
        log: &OperatorLog,
        source: SourceId,
    ) -> CompileResult<(JoinTarget, Expr, Option<TypeToken>)> {
        if let Some(ty) = log.bare_source() {
            self.schema.entity(ty)?;
            return Ok((
                JoinTarget::Table(ty.clone()),
                Expr::Source(source),
                Some(ty.clone()),
            ));
        }
        let plan = parse_select(self.schema, log)?;
        let (row, row_type) = derived_row(self.schema, &plan, source)?;
        Ok((JoinTarget::Subquery(Box::new(plan)), row, row_type))
    }

    pub(super) fn apply_select_many(&self, layer: &mut Layer, op: &Operator) -> CompileResult<()> {
        let collection = bind(lambda_at(op, 0)?, std::slice::from_ref(&layer.row))?;
        let (collection, optional, right) = strip_default_if_empty(collection);

        let element = match collection {
            Expr::JoinGroup { join, element } => {
                let clause = layer.plan.joins.get_mut(join).ok_or_else(|| {
                    CompileError::ambiguous(format!("group join #{} is not in scope", join))
                })?;
                clause.kind = if right || clause.kind == JoinKind::Right {
                    JoinKind::Right
                } else if optional {
                    JoinKind::Left
                } else {
                    JoinKind::Inner
                };
                if right {
                    debug!(join, "group join retagged as right outer join");
                }
                *element
            }
            Expr::Query(log) => {
                let source = layer.plan.joins.len() + 1;
                let (target, row, row_type) = self.join_target(&log, source)?;
                layer.plan.joins.push(JoinClause {
                    kind: JoinKind::Cross,
                    source,
                    target,
                    row_type,
                    outer_keys: Vec::new(),
                    inner_keys: Vec::new(),
                });
                row
            }
            Expr::Member { target, member } => {
                let nav = (*target).clone().member(member.clone());
                match classify(self.schema, &layer.plan, &nav)? {
                    Shape::Collection(ty) => {
                        self.navigation_join(layer, *target, &member, ty, optional, right)?
                    }
                    _ => {
                        return Err(CompileError::UnsupportedOperator(format!(
                            "SelectMany over {}",
                            nav
                        )));
                    }
                }
            }
            other => {
                return Err(CompileError::UnsupportedOperator(format!(
                    "SelectMany over {}",
                    other
                )));
            }
        };

        layer.row = match op.lambda(1) {
            Some(result) => bind(result, &[layer.row.clone(), element])?,
            None => element,
        };
        Ok(())
    }

    /// Join a collection navigation through its foreign key.
    fn navigation_join(
        &self,
        layer: &mut Layer,
        owner: Expr,
        member: &str,
        target: TypeToken,
        optional: bool,
        right: bool,
    ) -> CompileResult<Expr> {
        let Shape::Entity(owner_ty) = classify(self.schema, &layer.plan, &owner)? else {
            return Err(CompileError::ambiguous(format!("{} is not an entity", owner)));
        };
        let nav = self
            .schema
            .entity(&owner_ty)?
            .navigation(member)
            .ok_or_else(|| CompileError::member(&owner_ty, member))?;
        let fk = nav
            .foreign_key
            .as_ref()
            .ok_or_else(|| CompileError::MissingForeignKey {
                entity: owner_ty.to_string(),
                member: member.to_string(),
            })?;
        self.schema.entity(&target)?;

        let source = layer.plan.joins.len() + 1;
        let kind = match (optional, right) {
            (_, true) => JoinKind::Right,
            (true, false) => JoinKind::Left,
            (false, false) => JoinKind::Inner,
        };
        layer.plan.joins.push(JoinClause {
            kind,
            source,
            target: JoinTarget::Table(target.clone()),
            row_type: Some(target),
            outer_keys: fk
                .owner_keys
                .iter()
                .map(|k| owner.clone().member(k.clone()))
                .collect(),
            inner_keys: fk
                .target_keys
                .iter()
                .map(|k| Expr::Source(source).member(k.clone()))
                .collect(),
        });
        Ok(Expr::Source(source))
    }
}

/// Pair key selectors positionally; composite keys are object constructions.
fn pair_keys(kind: OpKind, outer: Expr, inner: Expr) -> CompileResult<(Vec<Expr>, Vec<Expr>)> {
    match (outer, inner) {
        (Expr::New { bindings: o, .. }, Expr::New { bindings: i, .. }) => {
            if o.len() != i.len() {
                return Err(CompileError::operand(
                    kind,
                    format!("{} outer key(s) against {} inner key(s)", o.len(), i.len()),
                ));
            }
            Ok((
                o.into_iter().map(|b| b.value).collect(),
                i.into_iter().map(|b| b.value).collect(),
            ))
        }
        (Expr::New { .. }, _) | (_, Expr::New { .. }) => Err(CompileError::operand(
            kind,
            "composite and single keys cannot be mixed",
        )),
        (o, i) => Ok((vec![o], vec![i])),
    }
}

/// `x.DefaultIfEmpty()` marks an outer join; `DefaultIfEmpty(true)` a right one.
fn strip_default_if_empty(expr: Expr) -> (Expr, bool, bool) {
    match expr {
        Expr::Call {
            method,
            target: Some(target),
            args,
        } if method == "DefaultIfEmpty" => {
            let right = matches!(args.first(), Some(Expr::Constant(Value::Bool(true))));
            (*target, true, right)
        }
        Expr::Call {
            method,
            target: None,
            mut args,
        } if method == "DefaultIfEmpty" && !args.is_empty() => {
            let right = matches!(args.get(1), Some(Expr::Constant(Value::Bool(true))));
            (args.swap_remove(0), true, right)
        }
        other => (other, false, false),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::builders::*;
    use crate::ast::{Expr, Operator, OperatorLog};
    use crate::error::CompileError;
    use crate::parser::parse;
    use crate::plan::{JoinKind, JoinTarget, QueryPlan, SelectPlan};
    use crate::schema::{DbType, EntityDescriptor, ForeignKey, Schema};

    fn schema() -> Schema {
        Schema::new()
            .with(
                EntityDescriptor::builder("Client", "Bas_Client")
                    .column("Id", DbType::Int, |c| c.key())
                    .column("Name", DbType::NVarChar, |c| c)
                    .many("Accounts", "ClientAccount", None)
                    .build(),
            )
            .with(
                EntityDescriptor::builder("ClientAccount", "Bas_ClientAccount")
                    .column("Id", DbType::Int, |c| c.key())
                    .column("ClientId", DbType::Int, |c| c)
                    .column("Region", DbType::Int, |c| c)
                    .build(),
            )
    }

    fn select(log: OperatorLog) -> SelectPlan {
        match parse(&schema(), &log).unwrap() {
            QueryPlan::Select(plan) => plan,
            other => panic!("expected select, got {:?}", other),
        }
    }

    fn group_join() -> Operator {
        Operator::group_join(
            OperatorLog::from_source("ClientAccount"),
            lambda("c", p("c").get("Id")),
            lambda("a", p("a").get("ClientId")),
            lambda2("c", "g", new_object([("c", p("c")), ("g", p("g"))])),
        )
    }

    #[test]
    fn test_inner_join() {
        let plan = select(OperatorLog::from_source("Client").then(Operator::join(
            OperatorLog::from_source("ClientAccount"),
            lambda("c", p("c").get("Id")),
            lambda("a", p("a").get("ClientId")),
            lambda2("c", "a", new_object([("Name", p("c").get("Name")), ("AccountId", p("a").get("Id"))])),
        )));
        let join = &plan.joins[0];
        assert_eq!(join.kind, JoinKind::Inner);
        assert_eq!(join.source, 1);
        assert!(matches!(join.target, JoinTarget::Table(_)));
        assert_eq!(join.outer_keys, vec![Expr::Source(0).member("Id")]);
        assert_eq!(join.inner_keys, vec![Expr::Source(1).member("ClientId")]);
    }

    #[test]
    fn test_group_join_flattened_as_left_join() {
        let plan = select(
            OperatorLog::from_source("Client")
                .then(group_join())
                .then(Operator::select_many(
                    lambda("t", p("t").get("g").call("DefaultIfEmpty", [])),
                    Some(lambda2(
                        "t",
                        "a",
                        new_object([("Name", p("t").get("c").get("Name")), ("AccountId", p("a").get("Id"))]),
                    )),
                )),
        );
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].kind, JoinKind::Left);
    }

    #[test]
    fn test_default_if_empty_true_retags_right() {
        let plan = select(
            OperatorLog::from_source("Client")
                .then(group_join())
                .then(Operator::select_many(
                    lambda("t", p("t").get("g").call("DefaultIfEmpty", [lit(true)])),
                    Some(lambda2("t", "a", new_object([("AccountId", p("a").get("Id"))]))),
                )),
        );
        assert_eq!(plan.joins[0].kind, JoinKind::Right);
    }

    #[test]
    fn test_composite_keys() {
        let plan = select(OperatorLog::from_source("Client").then(Operator::join(
            OperatorLog::from_source("ClientAccount"),
            lambda("c", new_object([("A", p("c").get("Id")), ("B", p("c").get("Id"))])),
            lambda("a", new_object([("A", p("a").get("ClientId")), ("B", p("a").get("Region"))])),
            lambda2("c", "a", p("a")),
        )));
        assert_eq!(plan.joins[0].outer_keys.len(), 2);
        assert_eq!(plan.select, Expr::Source(1));

        let mixed = OperatorLog::from_source("Client").then(Operator::join(
            OperatorLog::from_source("ClientAccount"),
            lambda("c", new_object([("A", p("c").get("Id"))])),
            lambda("a", p("a").get("ClientId")),
            lambda2("c", "a", p("a")),
        ));
        assert!(matches!(
            parse(&schema(), &mixed),
            Err(CompileError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_cross_join() {
        let plan = select(OperatorLog::from_source("Client").then(Operator::select_many(
            lambda("c", OperatorLog::from_source("ClientAccount").into()),
            Some(lambda2("c", "a", new_object([("Name", p("c").get("Name")), ("AccountId", p("a").get("Id"))]))),
        )));
        assert_eq!(plan.joins[0].kind, JoinKind::Cross);
        assert!(plan.joins[0].outer_keys.is_empty());
    }

    #[test]
    fn test_navigation_without_foreign_key() {
        let log = OperatorLog::from_source("Client")
            .then(Operator::select_many(lambda("c", p("c").get("Accounts")), None));
        assert!(matches!(
            parse(&schema(), &log),
            Err(CompileError::MissingForeignKey { .. })
        ));
    }

    #[test]
    fn test_unflattened_group_rejected() {
        let log = OperatorLog::from_source("Client").then(group_join());
        assert!(matches!(
            parse(&schema(), &log),
            Err(CompileError::AmbiguousBinding(_))
        ));
    }
}
