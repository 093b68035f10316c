use serde::{Deserialize, Serialize};

use crate::ast::{AggregateFunc, BinaryOp, OperatorLog, UnaryOp, Value};
use crate::schema::TypeToken;

/// Index of a row source inside one plan layer: 0 is the root, joins follow.
pub type SourceId = usize;

/// One `member = value` binding of an object-construction expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub member: String,
    pub value: Expr,
}

impl Binding {
    pub fn new(member: impl Into<String>, value: Expr) -> Self {
        Self {
            member: member.into(),
            value,
        }
    }
}

/// A lambda: parameter names plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Box<Expr>,
}

impl Lambda {
    pub fn new<S: Into<String>>(params: impl IntoIterator<Item = S>, body: Expr) -> Self {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body: Box::new(body),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// True for `x => x`.
    pub fn is_identity(&self) -> bool {
        matches!((self.params.as_slice(), self.body.as_ref()), ([p], Expr::Param(name)) if p == name)
    }
}

/// Expression node of the query model.
///
/// The front end builds the first group of variants. `Source`, `Grouping`,
/// `JoinGroup` and `Aggregate` are produced by the parser's binder when it
/// substitutes lambda parameters with the row they denote; visitors only
/// ever see bound expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Lambda parameter reference
    Param(String),
    /// Member access (`x.Name`, `x.Client.Name`)
    Member { target: Box<Expr>, member: String },
    Constant(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Method call; `target` is None for static calls
    Call {
        method: String,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    /// Object construction (typed DTO or anonymous tuple)
    New {
        ty: Option<TypeToken>,
        bindings: Vec<Binding>,
    },
    Lambda(Lambda),
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// Nested operator log (join target, cross join, union branch)
    Query(Box<OperatorLog>),
    /// Bound row source of the current plan layer
    Source(SourceId),
    /// Bound `IGrouping` parameter
    Grouping { key: Box<Expr>, element: Box<Expr> },
    /// Group produced by GroupJoin number `join`, whose elements are `element`
    JoinGroup { join: usize, element: Box<Expr> },
    /// Bound aggregate call
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn member(self, member: impl Into<String>) -> Expr {
        Expr::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, Expr::Constant(Value::Null))
    }

    /// Replace free parameters by name, respecting lambda shadowing.
    pub fn substitute(&self, env: &[(String, Expr)]) -> Expr {
        match self {
            Expr::Param(name) => env
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, e)| e.clone())
                .unwrap_or_else(|| self.clone()),
            Expr::Member { target, member } => Expr::Member {
                target: Box::new(target.substitute(env)),
                member: member.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.substitute(env)),
                right: Box::new(right.substitute(env)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.substitute(env)),
            },
            Expr::Call {
                method,
                target,
                args,
            } => Expr::Call {
                method: method.clone(),
                target: target.as_ref().map(|t| Box::new(t.substitute(env))),
                args: args.iter().map(|a| a.substitute(env)).collect(),
            },
            Expr::New { ty, bindings } => Expr::New {
                ty: ty.clone(),
                bindings: bindings
                    .iter()
                    .map(|b| Binding::new(b.member.clone(), b.value.substitute(env)))
                    .collect(),
            },
            Expr::Lambda(lambda) => {
                let inner: Vec<(String, Expr)> = env
                    .iter()
                    .filter(|(n, _)| !lambda.params.contains(n))
                    .cloned()
                    .collect();
                Expr::Lambda(Lambda {
                    params: lambda.params.clone(),
                    body: Box::new(lambda.body.substitute(&inner)),
                })
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: Box::new(test.substitute(env)),
                if_true: Box::new(if_true.substitute(env)),
                if_false: Box::new(if_false.substitute(env)),
            },
            Expr::Grouping { key, element } => Expr::Grouping {
                key: Box::new(key.substitute(env)),
                element: Box::new(element.substitute(env)),
            },
            Expr::JoinGroup { join, element } => Expr::JoinGroup {
                join: *join,
                element: Box::new(element.substitute(env)),
            },
            Expr::Aggregate { func, arg } => Expr::Aggregate {
                func: *func,
                arg: arg.as_ref().map(|a| Box::new(a.substitute(env))),
            },
            Expr::Constant(_) | Expr::Query(_) | Expr::Source(_) => self.clone(),
        }
    }

    /// Member chain from a bound source: `Source(0).Client.Name` gives
    /// `(0, ["Client", "Name"])`.
    pub fn member_path(&self) -> Option<(SourceId, Vec<&str>)> {
        match self {
            Expr::Source(id) => Some((*id, Vec::new())),
            Expr::Member { target, member } => {
                let (id, mut path) = target.member_path()?;
                path.push(member.as_str());
                Some((id, path))
            }
            _ => None,
        }
    }

    /// True when any sub-expression satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expr::Member { target, .. } => target.any(pred),
            Expr::Binary { left, right, .. } => left.any(pred) || right.any(pred),
            Expr::Unary { operand, .. } => operand.any(pred),
            Expr::Call { target, args, .. } => {
                target.as_ref().is_some_and(|t| t.any(pred)) || args.iter().any(|a| a.any(pred))
            }
            Expr::New { bindings, .. } => bindings.iter().any(|b| b.value.any(pred)),
            Expr::Lambda(lambda) => lambda.body.any(pred),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => test.any(pred) || if_true.any(pred) || if_false.any(pred),
            Expr::Grouping { key, element } => key.any(pred) || element.any(pred),
            Expr::JoinGroup { element, .. } => element.any(pred),
            Expr::Aggregate { arg, .. } => arg.as_ref().is_some_and(|a| a.any(pred)),
            Expr::Param(_) | Expr::Constant(_) | Expr::Query(_) | Expr::Source(_) => false,
        }
    }

    /// Default output name when an expression is projected on its own.
    pub fn output_name(&self) -> &str {
        match self {
            Expr::Member { member, .. } => member,
            _ => "Value",
        }
    }
}

/// The identity projector of a plan layer.
impl Default for Expr {
    fn default() -> Self {
        Expr::Source(0)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Param(name) => write!(f, "{}", name),
            Expr::Member { target, member } => write!(f, "{}.{}", target, member),
            Expr::Constant(v) => write!(f, "{}", v),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{}", operand),
                UnaryOp::Negate => write!(f, "-{}", operand),
            },
            Expr::Call {
                method,
                target,
                args,
            } => {
                if let Some(t) = target {
                    write!(f, "{}.", t)?;
                }
                write!(f, "{}(", method)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::New { ty, bindings } => {
                write!(f, "new ")?;
                if let Some(ty) = ty {
                    write!(f, "{} ", ty)?;
                }
                write!(f, "{{ ")?;
                for (i, b) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", b.member, b.value)?;
                }
                write!(f, " }}")
            }
            Expr::Lambda(lambda) => write!(f, "({}) => {}", lambda.params.join(", "), lambda.body),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", test, if_true, if_false),
            Expr::Query(log) => write!(f, "<query of {} operators>", log.len()),
            Expr::Source(id) => write!(f, "${}", id),
            Expr::Grouping { key, .. } => write!(f, "group({})", key),
            Expr::JoinGroup { join, .. } => write!(f, "join_group({})", join),
            Expr::Aggregate { func, arg } => match arg {
                Some(a) => write!(f, "{}({})", func, a),
                None => write!(f, "{}()", func),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> Expr {
        Expr::Param(name.to_string())
    }

    #[test]
    fn test_substitute_respects_shadowing() {
        // g.Sum(x => x.Qty) with x bound outside must keep the inner x
        let body = Expr::Call {
            method: "Sum".into(),
            target: Some(Box::new(param("g"))),
            args: vec![Expr::Lambda(Lambda::new(["x"], param("x").member("Qty")))],
        };
        let env = vec![
            ("x".to_string(), Expr::Source(3)),
            ("g".to_string(), Expr::Source(0)),
        ];
        let bound = body.substitute(&env);
        let Expr::Call { target, args, .. } = bound else {
            panic!("expected call");
        };
        assert_eq!(*target.unwrap(), Expr::Source(0));
        assert_eq!(
            args[0],
            Expr::Lambda(Lambda::new(["x"], param("x").member("Qty")))
        );
    }

    #[test]
    fn test_member_path() {
        let e = Expr::Source(0).member("Client").member("Name");
        assert_eq!(e.member_path(), Some((0, vec!["Client", "Name"])));
        assert_eq!(param("x").member("Id").member_path(), None);
    }

    #[test]
    fn test_identity_lambda() {
        assert!(Lambda::new(["x"], param("x")).is_identity());
        assert!(!Lambda::new(["x"], param("y")).is_identity());
    }
}
