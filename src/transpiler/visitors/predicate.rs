//! Expression visitor: boolean tests for WHERE/HAVING and values for
//! everything else.

use super::context::{ATOM, Fragment, Resolved, TEST, VisitContext};
use super::methods;
use crate::ast::{AggregateFunc, BinaryOp, Expr, UnaryOp, Value};
use crate::error::{CompileError, CompileResult};
use crate::parser::nesting::{Shape, classify};
use crate::schema::DbType;

/// Render `expr` as a boolean condition.
pub fn visit_predicate(ctx: &mut VisitContext, expr: &Expr) -> CompileResult<String> {
    Ok(predicate(ctx, expr)?.sql)
}

/// Render `expr` as a scalar value.
pub fn visit_value(ctx: &mut VisitContext, expr: &Expr) -> CompileResult<String> {
    Ok(value(ctx, expr)?.sql)
}

pub(crate) fn predicate(ctx: &mut VisitContext, expr: &Expr) -> CompileResult<Fragment> {
    match expr {
        Expr::Binary { op, left, right } if op.is_logical() => {
            let p = op.precedence();
            let l = predicate(ctx, left)?.wrap(p, false);
            let r = predicate(ctx, right)?.wrap(p, false);
            let mut f = Fragment::test(format!("{} {} {}", l, op, r));
            f.prec = p;
            Ok(f)
        }
        Expr::Binary { op, left, right } if op.is_comparison() => comparison(ctx, *op, left, right),
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => match operand.as_ref() {
            Expr::Member { .. } | Expr::Constant(_) => {
                let v = value(ctx, operand)?;
                Ok(Fragment::test(format!(
                    "{} = {}",
                    v.wrap(TEST, true),
                    ctx.generator.bool_literal(false)
                )))
            }
            inner => {
                let p = predicate(ctx, inner)?;
                Ok(Fragment::test(format!("NOT ({})", p.sql)))
            }
        },
        Expr::Constant(Value::Bool(b)) => Ok(Fragment::test(if *b { "1 = 1" } else { "1 = 0" })),
        other => {
            let v = value(ctx, other)?;
            if v.boolean {
                return Ok(v);
            }
            Ok(Fragment::test(format!(
                "{} = {}",
                v.wrap(TEST, true),
                ctx.generator.bool_literal(true)
            )))
        }
    }
}

fn comparison(
    ctx: &mut VisitContext,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
) -> CompileResult<Fragment> {
    let (left, right) = if left.is_null_constant() {
        (right, left)
    } else {
        (left, right)
    };
    let l = value(ctx, left)?;
    if right.is_null_constant() {
        let sql = match op {
            BinaryOp::Eq => format!("{} IS NULL", l.wrap(TEST, true)),
            BinaryOp::Ne => format!("{} IS NOT NULL", l.wrap(TEST, true)),
            _ => format!("{} {} NULL", l.wrap(TEST, true), op),
        };
        return Ok(Fragment::test(sql));
    }
    // Constants compared with a column take the column's type
    let r = match (right, l.db_type) {
        (Expr::Constant(v), Some(db_type)) => Fragment::atom(ctx.constant_typed(v, db_type, None)),
        _ => value(ctx, right)?,
    };
    Ok(Fragment::test(format!(
        "{} {} {}",
        l.wrap(TEST, true),
        op,
        r.wrap(TEST, true)
    )))
}

fn is_string(f: &Fragment, e: &Expr) -> bool {
    matches!(e, Expr::Constant(Value::String(_))) || f.db_type.is_some_and(|t| t.is_string())
}

pub(crate) fn value(ctx: &mut VisitContext, expr: &Expr) -> CompileResult<Fragment> {
    match expr {
        Expr::Member { target, member } => member_value(ctx, target, member, expr),
        Expr::Constant(v) => Ok(Fragment::atom(ctx.constant(v))),
        Expr::Binary { op, .. } if op.is_logical() || op.is_comparison() => {
            let test = predicate(ctx, expr)?;
            Ok(Fragment::atom(format!("CASE WHEN {} THEN 1 ELSE 0 END", test.sql)))
        }
        Expr::Binary {
            op: BinaryOp::Coalesce,
            left,
            right,
        } => {
            let l = value(ctx, left)?;
            let r = value(ctx, right)?;
            Ok(Fragment::atom(format!(
                "{}({}, {})",
                ctx.generator.isnull_function(),
                l.sql,
                r.sql
            ))
            .typed(l.db_type))
        }
        Expr::Binary { op, left, right } => {
            let l = value(ctx, left)?;
            let r = value(ctx, right)?;
            let concat = *op == BinaryOp::Concat
                || (*op == BinaryOp::Add && (is_string(&l, left) || is_string(&r, right)));
            if concat {
                let parts = [l.wrap(BinaryOp::Add.precedence(), false), r.wrap(BinaryOp::Add.precedence(), true)];
                let sql = ctx.generator.string_concat(&[&parts[0], &parts[1]]);
                return Ok(Fragment::new(sql, BinaryOp::Add.precedence()).typed(Some(DbType::NVarChar)));
            }
            let p = op.precedence();
            Ok(Fragment::new(
                format!("{} {} {}", l.wrap(p, false), op, r.wrap(p, true)),
                p,
            )
            .typed(l.db_type.or(r.db_type)))
        }
        Expr::Unary {
            op: UnaryOp::Negate,
            operand,
        } => {
            let v = value(ctx, operand)?;
            Ok(Fragment::new(format!("-{}", v.wrap(ATOM, false)), ATOM - 1).typed(v.db_type))
        }
        Expr::Unary { op: UnaryOp::Not, .. } => {
            let test = predicate(ctx, expr)?;
            Ok(Fragment::atom(format!("CASE WHEN {} THEN 1 ELSE 0 END", test.sql)))
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            let t = predicate(ctx, test)?;
            let a = value(ctx, if_true)?;
            let b = value(ctx, if_false)?;
            Ok(Fragment::atom(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                t.sql, a.sql, b.sql
            ))
            .typed(a.db_type.or(b.db_type)))
        }
        Expr::Aggregate { func, arg } => aggregate(ctx, *func, arg.as_deref()),
        Expr::Call {
            method,
            target,
            args,
        } => methods::visit_call(ctx, method, target.as_deref(), args),
        Expr::Source(id) => Err(CompileError::ambiguous(format!(
            "row ${} cannot be used as a value",
            id
        ))),
        Expr::New { .. } => Err(CompileError::ambiguous(
            "object construction is only valid as a projection",
        )),
        Expr::Param(name) => Err(CompileError::ambiguous(format!(
            "unbound parameter '{}'",
            name
        ))),
        Expr::Lambda(_) | Expr::Query(_) | Expr::Grouping { .. } | Expr::JoinGroup { .. } => {
            Err(CompileError::ambiguous(format!(
                "'{}' cannot be used as a value",
                expr
            )))
        }
    }
}

pub(crate) fn aggregate_function(func: AggregateFunc) -> &'static str {
    match func {
        AggregateFunc::Count => "COUNT",
        AggregateFunc::Sum => "SUM",
        AggregateFunc::Max => "MAX",
        AggregateFunc::Min => "MIN",
        AggregateFunc::Average => "AVG",
    }
}

pub(crate) fn aggregate(
    ctx: &mut VisitContext,
    func: AggregateFunc,
    arg: Option<&Expr>,
) -> CompileResult<Fragment> {
    let name = aggregate_function(func);
    match arg {
        None if func == AggregateFunc::Count => Ok(Fragment::atom("COUNT(1)")),
        None => Err(CompileError::ambiguous(format!(
            "{} needs a selector",
            name
        ))),
        Some(arg) => {
            let v = value(ctx, arg)?;
            Ok(Fragment::atom(format!("{}({})", name, v.sql)).typed(v.db_type))
        }
    }
}

fn member_value(
    ctx: &mut VisitContext,
    target: &Expr,
    member: &str,
    expr: &Expr,
) -> CompileResult<Fragment> {
    if methods::is_property(member)
        && matches!(classify(ctx.schema, ctx.plan, target)?, Shape::Scalar)
    {
        return methods::visit_property(ctx, target, member);
    }
    let Some((id, hops)) = expr.member_path() else {
        return Err(CompileError::ambiguous(format!(
            "member '{}' of '{}' has no column",
            member, target
        )));
    };
    match ctx.resolve(id, &hops)? {
        Resolved::Column(sql, db_type) => Ok(Fragment::atom(sql).typed(db_type)),
        Resolved::Row(row, _) => Err(CompileError::ambiguous(format!(
            "entity '{}' cannot be used as a value",
            row.ty.map(|t| t.to_string()).unwrap_or(row.key)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::*;
    use crate::config::CompilerConfig;
    use crate::plan::SelectPlan;
    use crate::schema::{EntityDescriptor, ForeignKey, Schema};
    use crate::transpiler::Dialect;
    use crate::transpiler::params::ParamContext;

    fn schema() -> Schema {
        Schema::new()
            .with(
                EntityDescriptor::builder("Client", "Bas_Client")
                    .column("Id", DbType::Int, |c| c.key().identity())
                    .column("Name", DbType::NVarChar, |c| c.size(64))
                    .column("IsActive", DbType::Bit, |c| c)
                    .column("ServerId", DbType::Int, |c| c.nullable())
                    .reference("Server", "Server", Some(ForeignKey::new(["ServerId"], ["Id"])))
                    .build(),
            )
            .with(
                EntityDescriptor::builder("Server", "Sys_Server")
                    .column("Id", DbType::Int, |c| c.key())
                    .column("Host", DbType::VarChar, |c| c)
                    .build(),
            )
    }

    fn render(expr: Expr, config: CompilerConfig) -> (String, usize) {
        let schema = schema();
        let plan = SelectPlan::from_source("Client".into());
        let generator = config.dialect.generator();
        let mut params = ParamContext::new();
        let sql = {
            let mut ctx = VisitContext::new(&schema, &config, generator.as_ref(), &mut params, &plan);
            let mut sql = visit_predicate(&mut ctx, &expr).unwrap();
            sql.push_str(&ctx.navigation_joins());
            sql
        };
        (sql, params.params.len())
    }

    fn row() -> Expr {
        Expr::Source(0)
    }

    #[test]
    fn test_bool_member_and_negation() {
        let (sql, _) = render(row().member("IsActive"), CompilerConfig::default());
        assert_eq!(sql, "t0.[IsActive] = 1");
        let (sql, _) = render(row().member("IsActive").not(), CompilerConfig::default());
        assert_eq!(sql, "t0.[IsActive] = 0");
    }

    #[test]
    fn test_null_comparison() {
        let (sql, _) = render(row().member("ServerId").eq(null()), CompilerConfig::default());
        assert_eq!(sql, "t0.[ServerId] IS NULL");
        let (sql, _) = render(null().ne(row().member("ServerId")), CompilerConfig::default());
        assert_eq!(sql, "t0.[ServerId] IS NOT NULL");
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let e = row()
            .member("Id")
            .gt(lit(1))
            .or(row().member("Id").lt(lit(-1)))
            .and(row().member("IsActive"));
        let (sql, _) = render(e, CompilerConfig::default());
        assert_eq!(sql, "(t0.[Id] > 1 OR t0.[Id] < -1) AND t0.[IsActive] = 1");
    }

    #[test]
    fn test_navigation_adds_left_join() {
        let e = row().member("Server").member("Host").eq(lit("db1"));
        let (sql, _) = render(e, CompilerConfig::default());
        assert_eq!(
            sql,
            "t1.[Host] = N'db1' LEFT JOIN [Sys_Server] t1 ON t0.[ServerId] = t1.[Id]"
        );
    }

    #[test]
    fn test_parameterized_constants() {
        let config = CompilerConfig::builder().parameterized(true).build();
        let e = row().member("Name").eq(lit("x")).and(row().member("Id").le(lit(10)));
        let (sql, count) = render(e, config);
        assert_eq!(sql, "t0.[Name] = @p1 AND t0.[Id] <= @p2");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_string_concat_per_dialect() {
        let e = row().member("Name").add(lit("!")).eq(lit("a!"));
        let (sql, _) = render(e.clone(), CompilerConfig::default());
        assert_eq!(sql, "t0.[Name] + N'!' = N'a!'");
        let (sql, _) = render(e, CompilerConfig::for_dialect(Dialect::MySql));
        assert_eq!(sql, "CONCAT(t0.`Name`, '!') = 'a!'");
    }

    #[test]
    fn test_unknown_member() {
        let schema = schema();
        let config = CompilerConfig::default();
        let plan = SelectPlan::from_source("Client".into());
        let generator = config.dialect.generator();
        let mut params = ParamContext::new();
        let mut ctx = VisitContext::new(&schema, &config, generator.as_ref(), &mut params, &plan);
        let err = visit_value(&mut ctx, &row().member("Nope")).unwrap_err();
        assert!(matches!(err, CompileError::UnknownMember { .. }));
    }
}
