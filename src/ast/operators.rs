use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CompileError;

/// Operator tag of one operator-log entry (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Root table handle
    GetSource,
    Where,
    Select,
    /// Cross join, flattened group join, or collection-navigation join
    SelectMany,
    Join,
    GroupJoin,
    /// Group join promoted to RIGHT OUTER JOIN
    GroupJoinRight,
    GroupBy,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Skip,
    Take,
    Distinct,
    Any,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Count,
    Sum,
    Max,
    Min,
    Average,
    Union,
    Include,
    /// Explicit subquery boundary
    AsSubquery,
    Insert,
    Update,
    Delete,
}

impl OpKind {
    pub const ALL: [OpKind; 31] = [
        OpKind::GetSource,
        OpKind::Where,
        OpKind::Select,
        OpKind::SelectMany,
        OpKind::Join,
        OpKind::GroupJoin,
        OpKind::GroupJoinRight,
        OpKind::GroupBy,
        OpKind::OrderBy,
        OpKind::OrderByDescending,
        OpKind::ThenBy,
        OpKind::ThenByDescending,
        OpKind::Skip,
        OpKind::Take,
        OpKind::Distinct,
        OpKind::Any,
        OpKind::First,
        OpKind::FirstOrDefault,
        OpKind::Single,
        OpKind::SingleOrDefault,
        OpKind::Count,
        OpKind::Sum,
        OpKind::Max,
        OpKind::Min,
        OpKind::Average,
        OpKind::Union,
        OpKind::Include,
        OpKind::AsSubquery,
        OpKind::Insert,
        OpKind::Update,
        OpKind::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::GetSource => "GetSource",
            OpKind::Where => "Where",
            OpKind::Select => "Select",
            OpKind::SelectMany => "SelectMany",
            OpKind::Join => "Join",
            OpKind::GroupJoin => "GroupJoin",
            OpKind::GroupJoinRight => "GroupJoinRight",
            OpKind::GroupBy => "GroupBy",
            OpKind::OrderBy => "OrderBy",
            OpKind::OrderByDescending => "OrderByDescending",
            OpKind::ThenBy => "ThenBy",
            OpKind::ThenByDescending => "ThenByDescending",
            OpKind::Skip => "Skip",
            OpKind::Take => "Take",
            OpKind::Distinct => "Distinct",
            OpKind::Any => "Any",
            OpKind::First => "First",
            OpKind::FirstOrDefault => "FirstOrDefault",
            OpKind::Single => "Single",
            OpKind::SingleOrDefault => "SingleOrDefault",
            OpKind::Count => "Count",
            OpKind::Sum => "Sum",
            OpKind::Max => "Max",
            OpKind::Min => "Min",
            OpKind::Average => "Average",
            OpKind::Union => "Union",
            OpKind::Include => "Include",
            OpKind::AsSubquery => "AsSubquery",
            OpKind::Insert => "Insert",
            OpKind::Update => "Update",
            OpKind::Delete => "Delete",
        }
    }

    /// Aggregate function carried by a terminal aggregate operator.
    pub fn aggregate(&self) -> Option<AggregateFunc> {
        match self {
            OpKind::Count => Some(AggregateFunc::Count),
            OpKind::Sum => Some(AggregateFunc::Sum),
            OpKind::Max => Some(AggregateFunc::Max),
            OpKind::Min => Some(AggregateFunc::Min),
            OpKind::Average => Some(AggregateFunc::Average),
            _ => None,
        }
    }

    pub fn is_first(&self) -> bool {
        matches!(
            self,
            OpKind::First | OpKind::FirstOrDefault | OpKind::Single | OpKind::SingleOrDefault
        )
    }

    /// Operators that end the log: nothing may follow them in the same layer.
    pub fn is_terminal(&self) -> bool {
        self.aggregate().is_some()
            || self.is_first()
            || matches!(
                self,
                OpKind::Any | OpKind::Insert | OpKind::Update | OpKind::Delete
            )
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CompileError::UnsupportedOperator(s.to_string()))
    }
}

/// Binary operators of the expression model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// String concatenation
    Concat,
    /// Null coalescing (`a ?? b`)
    Coalesce,
}

impl BinaryOp {
    /// Binding strength, used to decide where parentheses are needed.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
            BinaryOp::Coalesce => 6,
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 3
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::Ne => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Le => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Ge => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Add | BinaryOp::Concat => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Rem => write!(f, "%"),
            BinaryOp::Coalesce => write!(f, "??"),
        }
    }
}

/// Unary operators of the expression model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Aggregate functions (terminal operators and grouping calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunc {
    Count,
    Sum,
    Max,
    Min,
    Average,
}

impl AggregateFunc {
    /// Resolve a grouping method name (`g.Sum(...)`).
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "Count" | "LongCount" => Some(AggregateFunc::Count),
            "Sum" => Some(AggregateFunc::Sum),
            "Max" => Some(AggregateFunc::Max),
            "Min" => Some(AggregateFunc::Min),
            "Average" => Some(AggregateFunc::Average),
            _ => None,
        }
    }
}

impl std::fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateFunc::Count => write!(f, "COUNT"),
            AggregateFunc::Sum => write!(f, "SUM"),
            AggregateFunc::Max => write!(f, "MAX"),
            AggregateFunc::Min => write!(f, "MIN"),
            AggregateFunc::Average => write!(f, "AVG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opkind_round_trip_names() {
        for kind in OpKind::ALL {
            assert_eq!(kind.name().parse::<OpKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let err = "Aggregate".parse::<OpKind>().unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperator(ref s) if s == "Aggregate"));
    }

    #[test]
    fn test_terminal_operators() {
        assert!(OpKind::Count.is_terminal());
        assert!(OpKind::FirstOrDefault.is_terminal());
        assert!(OpKind::Delete.is_terminal());
        assert!(!OpKind::Take.is_terminal());
        assert!(!OpKind::Distinct.is_terminal());
    }
}
