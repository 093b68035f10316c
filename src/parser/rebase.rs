//! Moving expressions across a subquery boundary.
//!
//! An inner layer exports named columns; the outer layer reads them as
//! `Source(0).<name>`. Navigation chains from the inner root stay as
//! navigation chains in the outer layer as long as the inner layer exports
//! the foreign-key owner columns they start from.

use crate::ast::{Binding, Expr, SourceId};
use crate::error::{CompileError, CompileResult};
use crate::parser::nesting::{Shape, classify};
use crate::plan::{OrderClause, SelectPlan};
use crate::schema::{MemberKind, Schema, TypeToken};

/// Row expression and entity type of the rows a finished layer produces,
/// as seen from a layer reading it as source `id`.
pub fn derived_row(
    schema: &Schema,
    plan: &SelectPlan,
    id: SourceId,
) -> CompileResult<(Expr, Option<TypeToken>)> {
    match &plan.select {
        Expr::Source(k) => Ok((Expr::Source(id), plan.source_type(*k).cloned())),
        Expr::New { ty, bindings } => {
            let mut out = Vec::with_capacity(bindings.len());
            for b in bindings {
                if !matches!(classify(schema, plan, &b.value)?, Shape::Scalar) {
                    return Err(CompileError::ambiguous(format!(
                        "member '{}' is not a column and cannot be read through a subquery",
                        b.member
                    )));
                }
                out.push(Binding::new(
                    b.member.clone(),
                    Expr::Source(id).member(b.member.clone()),
                ));
            }
            Ok((
                Expr::New {
                    ty: ty.clone(),
                    bindings: out,
                },
                None,
            ))
        }
        scalar => Ok((Expr::Source(id).member(scalar.output_name()), None)),
    }
}

/// Expression of `select` that `expr` is exported under, as read by the
/// layer above (`Source(0).<name>`).
pub fn project_onto(select: &Expr, root: Option<&TypeToken>, schema: &Schema, expr: &Expr) -> Option<Expr> {
    match select {
        Expr::New { bindings, .. } => bindings
            .iter()
            .find(|b| &b.value == expr)
            .map(|b| Expr::Source(0).member(b.member.clone())),
        Expr::Source(0) => {
            let (0, path) = expr.member_path()? else {
                return None;
            };
            let entity = schema.get(root?)?;
            match path.as_slice() {
                [column] if entity.column(column).is_ok() => {
                    Some(Expr::Source(0).member(*column))
                }
                _ => None,
            }
        }
        other if other == expr => Some(Expr::Source(0).member(other.output_name())),
        _ => None,
    }
}

/// Orderings of the layer `plan` reads from, restated over its derived
/// columns. `None` when one of them is not exported.
pub fn inherited_orders(schema: &Schema, plan: &SelectPlan) -> Option<Vec<OrderClause>> {
    let inner = plan.subquery.as_deref()?;
    inner
        .orders
        .iter()
        .map(|o| {
            project_onto(&inner.select, inner.source.as_ref(), schema, &o.expr).map(|expr| {
                OrderClause {
                    expr,
                    descending: o.descending,
                }
            })
        })
        .collect()
}

/// Collects the columns an inner layer must export and rewrites expressions
/// over the inner sources into expressions over the derived row.
pub struct Rebaser<'a> {
    schema: &'a Schema,
    root: Option<TypeToken>,
    /// Inner projector is the identity: every root column is exported
    identity: bool,
    columns: Vec<Binding>,
}

impl<'a> Rebaser<'a> {
    pub fn new(schema: &'a Schema, root: Option<TypeToken>, identity: bool) -> Self {
        Self {
            schema,
            root,
            identity,
            columns: Vec::new(),
        }
    }

    /// Keep `expr` inside the inner layer under a fresh or shared name.
    pub fn export(&mut self, preferred: &str, expr: &Expr) -> CompileResult<Expr> {
        if self.identity {
            return self.rebase(expr);
        }
        if let Some(b) = self.columns.iter().find(|b| &b.value == expr) {
            return Ok(Expr::Source(0).member(b.member.clone()));
        }
        let name = self.unique_name(preferred);
        self.columns.push(Binding::new(name.clone(), expr.clone()));
        Ok(Expr::Source(0).member(name))
    }

    fn unique_name(&self, preferred: &str) -> String {
        let taken = |n: &str| self.columns.iter().any(|b| b.member == n);
        if !taken(preferred) {
            return preferred.to_string();
        }
        (1..)
            .map(|i| format!("{}{}", preferred, i))
            .find(|n| !taken(n))
            .unwrap_or_else(|| preferred.to_string())
    }

    /// Rewrite `expr` so it reads from the derived row.
    pub fn rebase(&mut self, expr: &Expr) -> CompileResult<Expr> {
        if let Some((id, path)) = expr.member_path() {
            if id != 0 {
                return Err(CompileError::ambiguous(format!(
                    "joined rows ({}) cannot be read through a subquery",
                    expr
                )));
            }
            return self.root_path(&path);
        }
        Ok(match expr {
            Expr::Aggregate { .. } | Expr::Grouping { .. } | Expr::JoinGroup { .. } => {
                return Err(CompileError::ambiguous(format!(
                    "aggregate {} cannot cross a subquery boundary",
                    expr
                )));
            }
            Expr::Member { target, member } => self.rebase(target)?.member(member.clone()),
            Expr::Binary { op, left, right } => {
                Expr::binary(*op, self.rebase(left)?, self.rebase(right)?)
            }
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(self.rebase(operand)?),
            },
            Expr::Call {
                method,
                target,
                args,
            } => Expr::Call {
                method: method.clone(),
                target: match target {
                    Some(t) => Some(Box::new(self.rebase(t)?)),
                    None => None,
                },
                args: args
                    .iter()
                    .map(|a| self.rebase(a))
                    .collect::<CompileResult<_>>()?,
            },
            Expr::New { ty, bindings } => Expr::New {
                ty: ty.clone(),
                bindings: bindings
                    .iter()
                    .map(|b| Ok(Binding::new(b.member.clone(), self.rebase(&b.value)?)))
                    .collect::<CompileResult<_>>()?,
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: Box::new(self.rebase(test)?),
                if_true: Box::new(self.rebase(if_true)?),
                if_false: Box::new(self.rebase(if_false)?),
            },
            other => other.clone(),
        })
    }

    /// `Source(0).a.b...` of the inner layer.
    fn root_path(&mut self, path: &[&str]) -> CompileResult<Expr> {
        let Some(first) = path.first() else {
            self.require_all()?;
            return Ok(Expr::Source(0));
        };
        let rest = |head: Expr| {
            path[1..]
                .iter()
                .fold(head, |acc, m| acc.member(*m))
        };
        let Some(ty) = self.root.clone() else {
            // untyped derived rows: columns by name
            self.require(first, Expr::Source(0).member(*first))?;
            return Ok(rest(Expr::Source(0).member(*first)));
        };
        let schema = self.schema;
        let entity = schema.entity(&ty)?;
        let member = entity
            .member(first)
            .ok_or_else(|| CompileError::member(&ty, *first))?;
        match &member.kind {
            MemberKind::Column(_) => {
                let name = member.name.clone();
                self.require(&name, Expr::Source(0).member(name.clone()))?;
                Ok(rest(Expr::Source(0).member(name)))
            }
            MemberKind::Navigation(nav) => {
                let fk = nav
                    .foreign_key
                    .as_ref()
                    .ok_or_else(|| CompileError::MissingForeignKey {
                        entity: ty.to_string(),
                        member: member.name.clone(),
                    })?;
                for key in &fk.owner_keys {
                    let key_member = entity
                        .member(key)
                        .map(|m| m.name.clone())
                        .ok_or_else(|| CompileError::member(&ty, key.clone()))?;
                    self.require(&key_member, Expr::Source(0).member(key_member.clone()))?;
                }
                Ok(rest(Expr::Source(0).member(member.name.clone())))
            }
        }
    }

    fn require_all(&mut self) -> CompileResult<()> {
        let Some(ty) = self.root.clone() else {
            return Err(CompileError::ambiguous(
                "whole rows of an anonymous projection cannot cross a subquery boundary",
            ));
        };
        let schema = self.schema;
        let names: Vec<String> = schema
            .entity(&ty)?
            .columns()
            .map(|(name, _)| name.to_string())
            .collect();
        for name in names {
            self.require(&name, Expr::Source(0).member(name.clone()))?;
        }
        Ok(())
    }

    /// The inner layer must export `value` exactly under `name`.
    fn require(&mut self, name: &str, value: Expr) -> CompileResult<()> {
        if self.identity {
            return Ok(());
        }
        match self.columns.iter().find(|b| b.member == name) {
            Some(b) if b.value == value => Ok(()),
            Some(_) => Err(CompileError::ambiguous(format!(
                "output column '{}' is bound to two different expressions",
                name
            ))),
            None => {
                self.columns.push(Binding::new(name, value));
                Ok(())
            }
        }
    }

    /// Exported inner columns, in first-use order.
    pub fn into_columns(self) -> Vec<Binding> {
        self.columns
    }
}
