//! Ergonomic builder functions for query-model expressions.
//!
//! # Example
//! ```ignore
//! use navql::ast::builders::*;
//!
//! // x => x.Id <= 10 && x.Name.StartsWith("a")
//! let pred = lambda("x", p("x").get("Id").le(10).and(p("x").get("Name").call("StartsWith", [lit("a")])));
//! ```

use crate::ast::{BinaryOp, Binding, Expr, Lambda, UnaryOp, Value};
use crate::schema::TypeToken;

/// Lambda parameter reference.
pub fn p(name: &str) -> Expr {
    Expr::Param(name.to_string())
}

/// Single-parameter lambda.
pub fn lambda(param: &str, body: Expr) -> Lambda {
    Lambda::new([param], body)
}

/// Two-parameter lambda (join result selectors, SelectMany results).
pub fn lambda2(a: &str, b: &str, body: Expr) -> Lambda {
    Lambda::new([a, b], body)
}

/// Constant.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Constant(value.into())
}

pub fn null() -> Expr {
    Expr::Constant(Value::Null)
}

/// Anonymous object construction.
pub fn new_object<S: Into<String>>(bindings: impl IntoIterator<Item = (S, Expr)>) -> Expr {
    Expr::New {
        ty: None,
        bindings: bindings
            .into_iter()
            .map(|(m, v)| Binding::new(m, v))
            .collect(),
    }
}

/// Typed object construction.
pub fn new_typed<S: Into<String>>(
    ty: impl Into<TypeToken>,
    bindings: impl IntoIterator<Item = (S, Expr)>,
) -> Expr {
    match new_object(bindings) {
        Expr::New { bindings, .. } => Expr::New {
            ty: Some(ty.into()),
            bindings,
        },
        other => other,
    }
}

/// Static method call (`string.IsNullOrEmpty(x)`, `DateTime.Now`).
pub fn call_static(method: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call {
        method: method.to_string(),
        target: None,
        args: args.into_iter().collect(),
    }
}

/// `cond ? a : b`
pub fn iif(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
    Expr::Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    }
}

/// Fluent operators on expressions.
pub trait ExprExt: Sized {
    fn get(self, member: &str) -> Expr;
    fn call(self, method: &str, args: impl IntoIterator<Item = Expr>) -> Expr;
    fn op(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr;
    fn not(self) -> Expr;

    fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Eq, rhs)
    }
    fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Ne, rhs)
    }
    fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Lt, rhs)
    }
    fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Le, rhs)
    }
    fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Gt, rhs)
    }
    fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Ge, rhs)
    }
    fn and(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::And, rhs)
    }
    fn or(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Or, rhs)
    }
    fn add(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Add, rhs)
    }
    fn coalesce(self, rhs: impl Into<Expr>) -> Expr {
        self.op(BinaryOp::Coalesce, rhs)
    }
}

impl ExprExt for Expr {
    fn get(self, member: &str) -> Expr {
        self.member(member)
    }

    fn call(self, method: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Call {
            method: method.to_string(),
            target: Some(Box::new(self)),
            args: args.into_iter().collect(),
        }
    }

    fn op(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(op, self, rhs.into())
    }

    fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Constant(v)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Constant(Value::Int(n as i64))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Constant(Value::Int(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Constant(Value::Bool(b))
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Constant(Value::String(s.to_string()))
    }
}

impl From<Lambda> for Expr {
    fn from(l: Lambda) -> Self {
        Expr::Lambda(l)
    }
}
