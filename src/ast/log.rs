use serde::{Deserialize, Serialize};

use crate::ast::{Expr, Lambda, OpKind, Value};
use crate::error::{CompileError, CompileResult};
use crate::schema::TypeToken;

/// An entity instance payload: member values keyed by member name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValue {
    pub ty: TypeToken,
    pub values: Vec<(String, Value)>,
}

impl EntityValue {
    pub fn new(ty: impl Into<TypeToken>) -> Self {
        Self {
            ty: ty.into(),
            values: Vec::new(),
        }
    }

    /// Set a member value (builder style).
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        let member = member.into();
        let value = value.into();
        match self.values.iter_mut().find(|(m, _)| *m == member) {
            Some(slot) => slot.1 = value,
            None => self.values.push((member, value)),
        }
        self
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(m, _)| m.eq_ignore_ascii_case(member))
            .map(|(_, v)| v)
    }
}

/// Operand of an operator entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Lambda(Lambda),
    Constant(Value),
    Type(TypeToken),
    Query(OperatorLog),
    Entity(EntityValue),
    Entities(Vec<EntityValue>),
}

impl Operand {
    fn describe(&self) -> &'static str {
        match self {
            Operand::Lambda(_) => "lambda",
            Operand::Constant(_) => "constant",
            Operand::Type(_) => "type",
            Operand::Query(_) => "query",
            Operand::Entity(_) => "entity",
            Operand::Entities(_) => "entities",
        }
    }
}

/// One entry of the operator log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub kind: OpKind,
    #[serde(default)]
    pub operands: Vec<Operand>,
}

/// Expected operand shape at one position.
#[derive(Clone, Copy)]
enum Slot {
    Lambda(usize),
    Int,
    Type,
    Query,
    OptLambda(usize),
    /// Entity, entity list or type (Insert)
    InsertPayload,
    /// Entity or one-parameter lambda (Update)
    UpdatePayload,
    /// Optional entity (Delete)
    OptEntity,
}

impl Operator {
    /// Build an entry from a tag name, validating operand shapes.
    pub fn named(tag: &str, operands: Vec<Operand>) -> CompileResult<Self> {
        Self::new(tag.parse()?, operands)
    }

    /// Build an entry, validating operand shapes.
    pub fn new(kind: OpKind, operands: Vec<Operand>) -> CompileResult<Self> {
        let op = Self { kind, operands };
        op.validate()?;
        Ok(op)
    }

    fn unchecked(kind: OpKind, operands: Vec<Operand>) -> Self {
        Self { kind, operands }
    }

    fn slots(&self) -> &'static [Slot] {
        match self.kind {
            OpKind::GetSource => &[Slot::Type],
            OpKind::Where
            | OpKind::Select
            | OpKind::OrderBy
            | OpKind::OrderByDescending
            | OpKind::ThenBy
            | OpKind::ThenByDescending
            | OpKind::Include => &[Slot::Lambda(1)],
            OpKind::SelectMany => &[Slot::Lambda(1), Slot::OptLambda(2)],
            OpKind::Join | OpKind::GroupJoin | OpKind::GroupJoinRight => {
                &[Slot::Query, Slot::Lambda(1), Slot::Lambda(1), Slot::Lambda(2)]
            }
            OpKind::GroupBy => &[Slot::Lambda(1), Slot::OptLambda(1)],
            OpKind::Skip | OpKind::Take => &[Slot::Int],
            OpKind::Distinct | OpKind::AsSubquery => &[],
            OpKind::Any
            | OpKind::First
            | OpKind::FirstOrDefault
            | OpKind::Single
            | OpKind::SingleOrDefault
            | OpKind::Count
            | OpKind::Sum
            | OpKind::Max
            | OpKind::Min
            | OpKind::Average => &[Slot::OptLambda(1)],
            OpKind::Union => &[Slot::Query],
            OpKind::Insert => &[Slot::InsertPayload],
            OpKind::Update => &[Slot::UpdatePayload],
            OpKind::Delete => &[Slot::OptEntity],
        }
    }

    /// Check that the operands match the arity and shape the tag expects.
    pub fn validate(&self) -> CompileResult<()> {
        let slots = self.slots();
        let required = slots
            .iter()
            .filter(|s| !matches!(s, Slot::OptLambda(_) | Slot::OptEntity))
            .count();
        if self.operands.len() < required || self.operands.len() > slots.len() {
            return Err(CompileError::operand(
                self.kind,
                format!(
                    "expected {} operand(s), found {}",
                    if required == slots.len() {
                        required.to_string()
                    } else {
                        format!("{}..{}", required, slots.len())
                    },
                    self.operands.len()
                ),
            ));
        }
        for (slot, operand) in slots.iter().zip(&self.operands) {
            let ok = match (slot, operand) {
                (Slot::Lambda(n) | Slot::OptLambda(n), Operand::Lambda(l)) => l.arity() == *n,
                (Slot::Int, Operand::Constant(Value::Int(n))) => *n >= 0,
                (Slot::Type, Operand::Type(_)) => true,
                (Slot::Query, Operand::Query(_)) => true,
                (Slot::InsertPayload, Operand::Entity(_) | Operand::Entities(_) | Operand::Type(_)) => {
                    true
                }
                (Slot::UpdatePayload, Operand::Entity(_)) => true,
                (Slot::UpdatePayload, Operand::Lambda(l)) => l.arity() == 1,
                (Slot::OptEntity, Operand::Entity(_)) => true,
                _ => false,
            };
            if !ok {
                return Err(CompileError::operand(
                    self.kind,
                    format!("unexpected {} operand", operand.describe()),
                ));
            }
        }
        Ok(())
    }

    pub fn lambda(&self, index: usize) -> Option<&Lambda> {
        match self.operands.get(index) {
            Some(Operand::Lambda(l)) => Some(l),
            _ => None,
        }
    }

    pub fn query(&self, index: usize) -> Option<&OperatorLog> {
        match self.operands.get(index) {
            Some(Operand::Query(q)) => Some(q),
            _ => None,
        }
    }

    /// Row count of a Skip/Take entry.
    pub fn row_count(&self) -> Option<usize> {
        match self.operands.first() {
            Some(Operand::Constant(Value::Int(n))) => usize::try_from(*n).ok(),
            _ => None,
        }
    }

    // Constructors, one per tag

    pub fn get_source(ty: impl Into<TypeToken>) -> Self {
        Self::unchecked(OpKind::GetSource, vec![Operand::Type(ty.into())])
    }

    pub fn filter(predicate: Lambda) -> Self {
        Self::unchecked(OpKind::Where, vec![Operand::Lambda(predicate)])
    }

    pub fn select(projector: Lambda) -> Self {
        Self::unchecked(OpKind::Select, vec![Operand::Lambda(projector)])
    }

    pub fn select_many(collection: Lambda, result: Option<Lambda>) -> Self {
        let mut operands = vec![Operand::Lambda(collection)];
        operands.extend(result.map(Operand::Lambda));
        Self::unchecked(OpKind::SelectMany, operands)
    }

    pub fn join(inner: OperatorLog, outer_key: Lambda, inner_key: Lambda, result: Lambda) -> Self {
        Self::join_like(OpKind::Join, inner, outer_key, inner_key, result)
    }

    pub fn group_join(
        inner: OperatorLog,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> Self {
        Self::join_like(OpKind::GroupJoin, inner, outer_key, inner_key, result)
    }

    fn join_like(
        kind: OpKind,
        inner: OperatorLog,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> Self {
        Self::unchecked(
            kind,
            vec![
                Operand::Query(inner),
                Operand::Lambda(outer_key),
                Operand::Lambda(inner_key),
                Operand::Lambda(result),
            ],
        )
    }

    pub fn group_by(key: Lambda, element: Option<Lambda>) -> Self {
        let mut operands = vec![Operand::Lambda(key)];
        operands.extend(element.map(Operand::Lambda));
        Self::unchecked(OpKind::GroupBy, operands)
    }

    pub fn order_by(key: Lambda) -> Self {
        Self::unchecked(OpKind::OrderBy, vec![Operand::Lambda(key)])
    }

    pub fn order_by_desc(key: Lambda) -> Self {
        Self::unchecked(OpKind::OrderByDescending, vec![Operand::Lambda(key)])
    }

    pub fn then_by(key: Lambda) -> Self {
        Self::unchecked(OpKind::ThenBy, vec![Operand::Lambda(key)])
    }

    pub fn then_by_desc(key: Lambda) -> Self {
        Self::unchecked(OpKind::ThenByDescending, vec![Operand::Lambda(key)])
    }

    pub fn skip(n: usize) -> Self {
        Self::unchecked(OpKind::Skip, vec![Operand::Constant(Value::Int(n as i64))])
    }

    pub fn take(n: usize) -> Self {
        Self::unchecked(OpKind::Take, vec![Operand::Constant(Value::Int(n as i64))])
    }

    pub fn distinct() -> Self {
        Self::unchecked(OpKind::Distinct, Vec::new())
    }

    pub fn as_subquery() -> Self {
        Self::unchecked(OpKind::AsSubquery, Vec::new())
    }

    /// Any / First / Single / Count / Sum / ... with an optional lambda.
    pub fn terminal(kind: OpKind, lambda: Option<Lambda>) -> Self {
        Self::unchecked(kind, lambda.map(Operand::Lambda).into_iter().collect())
    }

    pub fn any(predicate: Option<Lambda>) -> Self {
        Self::terminal(OpKind::Any, predicate)
    }

    pub fn first(predicate: Option<Lambda>) -> Self {
        Self::terminal(OpKind::First, predicate)
    }

    pub fn count(predicate: Option<Lambda>) -> Self {
        Self::terminal(OpKind::Count, predicate)
    }

    pub fn union(other: OperatorLog) -> Self {
        Self::unchecked(OpKind::Union, vec![Operand::Query(other)])
    }

    pub fn include(path: Lambda) -> Self {
        Self::unchecked(OpKind::Include, vec![Operand::Lambda(path)])
    }

    pub fn insert(entity: EntityValue) -> Self {
        Self::unchecked(OpKind::Insert, vec![Operand::Entity(entity)])
    }

    pub fn insert_many(entities: Vec<EntityValue>) -> Self {
        Self::unchecked(OpKind::Insert, vec![Operand::Entities(entities)])
    }

    /// INSERT INTO `target` SELECT ... from the preceding operators.
    pub fn insert_from(target: impl Into<TypeToken>) -> Self {
        Self::unchecked(OpKind::Insert, vec![Operand::Type(target.into())])
    }

    pub fn update(entity: EntityValue) -> Self {
        Self::unchecked(OpKind::Update, vec![Operand::Entity(entity)])
    }

    pub fn update_with(assignments: Lambda) -> Self {
        Self::unchecked(OpKind::Update, vec![Operand::Lambda(assignments)])
    }

    pub fn delete(entity: Option<EntityValue>) -> Self {
        Self::unchecked(OpKind::Delete, entity.map(Operand::Entity).into_iter().collect())
    }
}

/// Ordered, append-only sequence of operator entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorLog {
    entries: Vec<Operator>,
}

impl OperatorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log rooted at the given entity type.
    pub fn from_source(ty: impl Into<TypeToken>) -> Self {
        Self::new().then(Operator::get_source(ty))
    }

    /// Append an entry (builder style).
    pub fn then(mut self, op: Operator) -> Self {
        self.entries.push(op);
        self
    }

    pub fn push(&mut self, op: Operator) {
        self.entries.push(op);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Operator> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Operator] {
        &self.entries
    }

    /// Validate every entry.
    pub fn validate(&self) -> CompileResult<()> {
        self.entries.iter().try_for_each(Operator::validate)
    }

    /// Source type when the log is exactly `[GetSource<T>]`.
    pub fn bare_source(&self) -> Option<&TypeToken> {
        match self.entries.as_slice() {
            [op] if op.kind == OpKind::GetSource => match op.operands.first() {
                Some(Operand::Type(ty)) => Some(ty),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<OperatorLog> for Expr {
    fn from(log: OperatorLog) -> Self {
        Expr::Query(Box::new(log))
    }
}
