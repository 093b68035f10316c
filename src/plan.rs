//! Query plan: the normalized, immutable output of the parser.

use serde::{Deserialize, Serialize};

use crate::ast::{AggregateFunc, EntityValue, Expr, SourceId};
use crate::schema::TypeToken;

/// Parsed query, ready for a dialect generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryPlan {
    Select(SelectPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}

impl QueryPlan {
    pub fn as_select(&self) -> Option<&SelectPlan> {
        match self {
            QueryPlan::Select(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// Right-hand side of an explicit join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinTarget {
    Table(TypeToken),
    Subquery(Box<SelectPlan>),
}

/// Explicit join of one plan layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub kind: JoinKind,
    /// Bound source id of the joined rows inside this layer
    pub source: SourceId,
    pub target: JoinTarget,
    /// Entity type of the joined rows, None for a scalar/anonymous subquery
    pub row_type: Option<TypeToken>,
    /// Key expressions, paired positionally; empty for CROSS JOIN
    pub outer_keys: Vec<Expr>,
    pub inner_keys: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderClause {
    pub expr: Expr,
    pub descending: bool,
}

/// Terminal aggregate (`Count`, `Sum`, ...) of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateClause {
    pub func: AggregateFunc,
    /// None for `COUNT(1)`
    pub selector: Option<Expr>,
}

/// One layer of a SELECT.
///
/// Either `source` names the root entity table, or `subquery` holds the
/// inner layer this one reads from (a derived table aliased `t0`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectPlan {
    /// Root entity type. For a derived layer this is the entity type of the
    /// inner rows when they are whole entities.
    pub source: Option<TypeToken>,
    pub subquery: Option<Box<SelectPlan>>,
    pub distinct: bool,
    pub any: bool,
    /// Outer layer of a one-to-many split
    pub has_many: bool,
    pub joins: Vec<JoinClause>,
    pub orders: Vec<OrderClause>,
    pub group_by: Option<Expr>,
    pub aggregate: Option<AggregateClause>,
    pub unions: Vec<SelectPlan>,
    /// Navigation paths eagerly loaded with the root rows
    pub includes: Vec<Vec<String>>,
    pub skip: usize,
    pub take: usize,
    /// Bound projector; `Source(0)` is the identity projector
    pub select: Expr,
    pub predicate: Option<Expr>,
    pub having: Option<Expr>,
}

impl SelectPlan {
    pub fn from_source(ty: TypeToken) -> Self {
        Self {
            source: Some(ty),
            select: Expr::Source(0),
            ..Self::default()
        }
    }

    pub fn is_derived(&self) -> bool {
        self.subquery.is_some()
    }

    pub fn is_paginated(&self) -> bool {
        self.skip > 0 || self.take > 0
    }

    pub fn is_identity_projection(&self) -> bool {
        self.select == Expr::Source(0)
    }

    /// Entity type of bound source `id`: the root for 0, a join otherwise.
    pub fn source_type(&self, id: SourceId) -> Option<&TypeToken> {
        if id == 0 {
            return self.source.as_ref();
        }
        self.joins
            .iter()
            .find(|j| j.source == id)
            .and_then(|j| j.row_type.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertPayload {
    Entity(EntityValue),
    Entities(Vec<EntityValue>),
    /// INSERT ... SELECT; the plan's projector is an object construction
    Query(SelectPlan),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertPlan {
    pub target: TypeToken,
    pub payload: InsertPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdatePayload {
    /// Update one row by key
    Entity(EntityValue),
    /// Bound assignment projector (`x => new T { A = x.A + 1 }`)
    Assignments(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub target: TypeToken,
    pub payload: UpdatePayload,
    /// Join/filter scope; its projector is unused
    pub scope: SelectPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeletePayload {
    Entity(EntityValue),
    /// Every row matching the scope
    Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub target: TypeToken,
    pub payload: DeletePayload,
    pub scope: SelectPlan,
}
