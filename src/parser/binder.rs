//! Lambda binding: substitute parameters with the rows they denote and
//! reduce the result so visitors only see bound expressions.

use crate::ast::{AggregateFunc, BinaryOp, Binding, Expr, Lambda, Value};
use crate::error::{CompileError, CompileResult};

/// Bind `lambda` to `args` (one row expression per parameter).
pub fn bind(lambda: &Lambda, args: &[Expr]) -> CompileResult<Expr> {
    if lambda.arity() != args.len() {
        return Err(CompileError::operand(
            "lambda",
            format!(
                "expected {} parameter(s), found {}",
                args.len(),
                lambda.arity()
            ),
        ));
    }
    let env: Vec<(String, Expr)> = lambda
        .params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect();
    reduce(lambda.body.substitute(&env))
}

/// Fold member access through object construction and grouping rows.
fn reduce(expr: Expr) -> CompileResult<Expr> {
    Ok(match expr {
        Expr::Param(name) => {
            return Err(CompileError::ambiguous(format!(
                "unbound parameter '{}'",
                name
            )));
        }
        Expr::Member { target, member } => match reduce(*target)? {
            Expr::New { ty, bindings } => bindings
                .into_iter()
                .find(|b| b.member == member)
                .map(|b| b.value)
                .ok_or_else(|| {
                    CompileError::member(
                        ty.map(|t| t.to_string())
                            .unwrap_or_else(|| "anonymous".to_string()),
                        member,
                    )
                })?,
            Expr::Grouping { key, .. } if member == "Key" => *key,
            target => target.member(member),
        },
        Expr::Call {
            method,
            target,
            args,
        } => {
            let target = target.map(|t| reduce(*t)).transpose()?;
            if let Some(Expr::Grouping { element, .. }) = &target {
                return group_aggregate(&method, element, &args);
            }
            Expr::Call {
                method,
                target: target.map(Box::new),
                args: args.into_iter().map(reduce).collect::<CompileResult<_>>()?,
            }
        }
        Expr::Binary { op, left, right } => {
            Expr::binary(op, reduce(*left)?, reduce(*right)?)
        }
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: Box::new(reduce(*operand)?),
        },
        Expr::New { ty, bindings } => Expr::New {
            ty,
            bindings: bindings
                .into_iter()
                .map(|b| Ok(Binding::new(b.member, reduce(b.value)?)))
                .collect::<CompileResult<_>>()?,
        },
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => Expr::Conditional {
            test: Box::new(reduce(*test)?),
            if_true: Box::new(reduce(*if_true)?),
            if_false: Box::new(reduce(*if_false)?),
        },
        Expr::Grouping { key, element } => Expr::Grouping {
            key: Box::new(reduce(*key)?),
            element: Box::new(reduce(*element)?),
        },
        Expr::JoinGroup { join, element } => Expr::JoinGroup {
            join,
            element: Box::new(reduce(*element)?),
        },
        Expr::Aggregate { func, arg } => Expr::Aggregate {
            func,
            arg: arg.map(|a| reduce(*a).map(Box::new)).transpose()?,
        },
        // nested lambdas keep their own parameters
        e @ (Expr::Lambda(_) | Expr::Constant(_) | Expr::Query(_) | Expr::Source(_)) => e,
    })
}

/// `g.Count()`, `g.Count(pred)`, `g.Sum(x => x.Qty)` on a grouping row.
fn group_aggregate(method: &str, element: &Expr, args: &[Expr]) -> CompileResult<Expr> {
    let func = AggregateFunc::from_method(method)
        .ok_or_else(|| CompileError::UnsupportedMethod(format!("IGrouping.{}", method)))?;
    let selector = match args {
        [] => None,
        [Expr::Lambda(l)] => Some(bind(l, std::slice::from_ref(element))?),
        _ => {
            return Err(CompileError::operand(
                method,
                "grouping aggregate takes at most one lambda",
            ));
        }
    };
    Ok(match (func, selector) {
        (AggregateFunc::Count, None) => Expr::Aggregate { func, arg: None },
        // COUNT with a predicate counts matching rows
        (AggregateFunc::Count, Some(pred)) => Expr::Aggregate {
            func: AggregateFunc::Sum,
            arg: Some(Box::new(Expr::Conditional {
                test: Box::new(pred),
                if_true: Box::new(Expr::Constant(Value::Int(1))),
                if_false: Box::new(Expr::Constant(Value::Int(0))),
            })),
        },
        (func, Some(sel)) => Expr::Aggregate {
            func,
            arg: Some(Box::new(sel)),
        },
        (func, None) => Expr::Aggregate {
            func,
            arg: Some(Box::new(element.clone())),
        },
    })
}

/// AND-combine predicates in order.
pub fn conjoin(preds: Vec<Expr>) -> Option<Expr> {
    preds
        .into_iter()
        .reduce(|acc, p| Expr::binary(BinaryOp::And, acc, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::*;

    #[test]
    fn test_bind_member_through_new() {
        // x => x.Name, with x bound to new { Name = $0.Name }
        let row = new_object([("Name", Expr::Source(0).member("DemoName"))]);
        let bound = bind(&lambda("x", p("x").get("Name")), &[row]).unwrap();
        assert_eq!(bound, Expr::Source(0).member("DemoName"));
    }

    #[test]
    fn test_bind_grouping() {
        let row = Expr::Grouping {
            key: Box::new(Expr::Source(0).member("ClientId")),
            element: Box::new(Expr::Source(0)),
        };
        let body = new_object([
            ("ClientId", p("g").get("Key")),
            ("Total", p("g").call("Sum", [lambda("x", p("x").get("Qty")).into()])),
            ("Rows", p("g").call("Count", [])),
        ]);
        let bound = bind(&lambda("g", body), &[row]).unwrap();
        assert_eq!(
            bound,
            new_object([
                ("ClientId", Expr::Source(0).member("ClientId")),
                (
                    "Total",
                    Expr::Aggregate {
                        func: AggregateFunc::Sum,
                        arg: Some(Box::new(Expr::Source(0).member("Qty"))),
                    }
                ),
                (
                    "Rows",
                    Expr::Aggregate {
                        func: AggregateFunc::Count,
                        arg: None,
                    }
                ),
            ])
        );
    }

    #[test]
    fn test_conditional_count() {
        let row = Expr::Grouping {
            key: Box::new(Expr::Source(0).member("ClientId")),
            element: Box::new(Expr::Source(0)),
        };
        let body = p("g").call("Count", [lambda("x", p("x").get("IsActive")).into()]);
        let bound = bind(&lambda("g", body), &[row]).unwrap();
        assert!(matches!(
            bound,
            Expr::Aggregate {
                func: AggregateFunc::Sum,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_binding_member() {
        let row = new_object([("Name", Expr::Source(0).member("Name"))]);
        let err = bind(&lambda("x", p("x").get("Code")), &[row]).unwrap_err();
        assert!(matches!(err, CompileError::UnknownMember { .. }));
    }

    #[test]
    fn test_arity_and_free_params() {
        let l = lambda2("a", "b", p("a"));
        assert!(matches!(
            bind(&l, &[Expr::Source(0)]),
            Err(CompileError::InvalidOperand { .. })
        ));
        let free = lambda("x", p("y").get("Id"));
        assert!(matches!(
            bind(&free, &[Expr::Source(0)]),
            Err(CompileError::AmbiguousBinding(_))
        ));
    }
}
