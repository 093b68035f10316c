//! Method calls and intrinsic properties mapped onto SQL functions.

use super::context::{ATOM, Fragment, VisitContext};
use super::predicate::value;
use crate::ast::{Expr, Value};
use crate::error::{CompileError, CompileResult};
use crate::schema::DbType;

const PROPERTIES: &[&str] = &[
    "Length", "Year", "Month", "Day", "Hour", "Minute", "Second", "Date",
];

/// True for members translated as scalar functions (`s.Length`, `d.Year`).
pub fn is_property(member: &str) -> bool {
    PROPERTIES.contains(&member)
}

pub fn visit_property(ctx: &mut VisitContext, target: &Expr, member: &str) -> CompileResult<Fragment> {
    let t = value(ctx, target)?.sql;
    let g = ctx.generator;
    let sql = match member {
        "Length" => format!("{}({})", g.length_function(), t),
        "Year" | "Month" | "Day" => format!("{}({})", member.to_uppercase(), t),
        "Hour" | "Minute" | "Second" => g.date_part(&member.to_uppercase(), &t),
        "Date" => return Ok(Fragment::atom(g.date_only(&t)).typed(Some(DbType::Date))),
        other => return Err(CompileError::UnsupportedMethod(other.to_string())),
    };
    Ok(Fragment::atom(sql).typed(Some(DbType::Int)))
}

/// Translate `target.method(args)` or a static call.
pub fn visit_call(
    ctx: &mut VisitContext,
    method: &str,
    target: Option<&Expr>,
    args: &[Expr],
) -> CompileResult<Fragment> {
    match (method, target, args) {
        ("Contains", Some(Expr::Constant(Value::List(items))), [item]) => in_list(ctx, items, item),
        ("Contains", None, [Expr::Constant(Value::List(items)), item]) => in_list(ctx, items, item),
        ("StartsWith", Some(t), [arg]) => like(ctx, t, arg, false, true),
        ("EndsWith", Some(t), [arg]) => like(ctx, t, arg, true, false),
        ("Contains", Some(t), [arg]) => like(ctx, t, arg, true, true),
        ("Equals", Some(t), [arg]) => {
            let t = value(ctx, t)?;
            if arg.is_null_constant() {
                return Ok(Fragment::test(format!("{} IS NULL", t.sql)));
            }
            let a = value(ctx, arg)?;
            Ok(Fragment::test(format!("{} = {}", t.sql, a.sql)))
        }
        ("Substring", Some(t), [start, rest @ ..]) if rest.len() <= 1 => {
            let t = value(ctx, t)?.sql;
            // zero-based in the query model, one-based in SQL
            let start = match start {
                Expr::Constant(Value::Int(n)) => (n + 1).to_string(),
                other => format!("{} + 1", value(ctx, other)?.wrap(4, false)),
            };
            let len = match rest.first() {
                Some(len) => Some(value(ctx, len)?.sql),
                None => None,
            };
            Ok(string(ctx.generator.substring(&t, &start, len.as_deref())))
        }
        ("Trim", Some(t), []) => {
            let t = value(ctx, t)?.sql;
            Ok(string(ctx.generator.trim(&t)))
        }
        ("TrimStart", Some(t), []) => unary(ctx, "LTRIM", t),
        ("TrimEnd", Some(t), []) => unary(ctx, "RTRIM", t),
        ("ToUpper", Some(t), []) => unary(ctx, "UPPER", t),
        ("ToLower", Some(t), []) => unary(ctx, "LOWER", t),
        ("Length", Some(t), []) => visit_property(ctx, t, "Length"),
        ("Replace", Some(t), [from, to]) => {
            let t = value(ctx, t)?.sql;
            let from = value(ctx, from)?.sql;
            let to = value(ctx, to)?.sql;
            Ok(string(format!("REPLACE({}, {}, {})", t, from, to)))
        }
        ("ToString", Some(t), []) => {
            let t = value(ctx, t)?.sql;
            Ok(string(ctx.generator.string_cast(&t)))
        }
        ("IsNullOrEmpty", None, [arg]) => {
            let a = value(ctx, arg)?.sql;
            let empty = ctx.string_literal("");
            let mut f = Fragment::test(format!("({} IS NULL OR {} = {})", a, a, empty));
            f.prec = ATOM;
            Ok(f)
        }
        ("Concat", None, parts) if !parts.is_empty() => {
            let mut rendered = Vec::with_capacity(parts.len());
            for p in parts {
                rendered.push(value(ctx, p)?.wrap(4, true));
            }
            let refs: Vec<&str> = rendered.iter().map(String::as_str).collect();
            let mut f = string(ctx.generator.string_concat(&refs));
            f.prec = 4;
            Ok(f)
        }
        ("Now", None, []) => Ok(Fragment::atom(ctx.generator.now(false)).typed(Some(DbType::DateTime))),
        ("UtcNow", None, []) => Ok(Fragment::atom(ctx.generator.now(true)).typed(Some(DbType::DateTime))),
        ("Abs", None, [x]) => {
            let v = value(ctx, x)?;
            Ok(Fragment::atom(format!("ABS({})", v.sql)).typed(v.db_type))
        }
        ("Round", None, [x, rest @ ..]) if rest.len() <= 1 => {
            let v = value(ctx, x)?;
            let digits = match rest.first() {
                Some(d) => Some(value(ctx, d)?.sql),
                None => None,
            };
            Ok(Fragment::atom(ctx.generator.round(&v.sql, digits.as_deref())).typed(v.db_type))
        }
        _ => Err(CompileError::UnsupportedMethod(format!(
            "{}/{}",
            method,
            args.len()
        ))),
    }
}

fn string(sql: String) -> Fragment {
    Fragment::atom(sql).typed(Some(DbType::NVarChar))
}

fn unary(ctx: &mut VisitContext, function: &str, target: &Expr) -> CompileResult<Fragment> {
    let t = value(ctx, target)?.sql;
    Ok(string(format!("{}({})", function, t)))
}

fn in_list(ctx: &mut VisitContext, items: &[Value], item: &Expr) -> CompileResult<Fragment> {
    if items.is_empty() {
        return Ok(Fragment::test("1 = 0"));
    }
    let v = value(ctx, item)?;
    let list = ctx.constant(&Value::List(items.to_vec()));
    Ok(Fragment::test(format!("{} IN {}", v.sql, list)))
}

/// `target LIKE pattern`, with `%` on the requested sides.
fn like(
    ctx: &mut VisitContext,
    target: &Expr,
    arg: &Expr,
    leading: bool,
    trailing: bool,
) -> CompileResult<Fragment> {
    let t = value(ctx, target)?;
    let pattern = match arg {
        Expr::Constant(Value::Null) => {
            return Err(CompileError::operand("LIKE", "pattern must not be null"));
        }
        Expr::Constant(Value::String(s)) => {
            let mut p = ctx.generator.like_escape(s);
            if leading {
                p.insert(0, '%');
            }
            if trailing {
                p.push('%');
            }
            ctx.constant(&Value::String(p))
        }
        other => {
            let a = value(ctx, other)?.wrap(4, true);
            let wildcard = ctx.string_literal("%");
            let mut parts: Vec<&str> = Vec::with_capacity(3);
            if leading {
                parts.push(&wildcard);
            }
            parts.push(&a);
            if trailing {
                parts.push(&wildcard);
            }
            ctx.generator.string_concat(&parts)
        }
    };
    Ok(Fragment::test(format!("{} LIKE {}", t.wrap(4, false), pattern)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::*;
    use crate::config::CompilerConfig;
    use crate::plan::SelectPlan;
    use crate::schema::{EntityDescriptor, Schema};
    use crate::transpiler::Dialect;
    use crate::transpiler::params::ParamContext;
    use crate::transpiler::visitors::predicate::visit_predicate;

    fn render_with(expr: Expr, config: &CompilerConfig) -> Result<String, CompileError> {
        let schema = Schema::new().with(
            EntityDescriptor::builder("Demo", "Sys_Demo")
                .column("Id", DbType::Int, |c| c.key())
                .column("Name", DbType::NVarChar, |c| c)
                .column("Created", DbType::DateTime, |c| c)
                .build(),
        );
        let plan = SelectPlan::from_source("Demo".into());
        let generator = config.dialect.generator();
        let mut params = ParamContext::new();
        let mut ctx = VisitContext::new(&schema, config, generator.as_ref(), &mut params, &plan);
        visit_predicate(&mut ctx, &expr)
    }

    fn render(expr: Expr) -> String {
        render_with(expr, &CompilerConfig::default()).unwrap()
    }

    fn name() -> Expr {
        Expr::Source(0).member("Name")
    }

    #[test]
    fn test_like_escapes_wildcards() {
        assert_eq!(
            render(name().call("StartsWith", [lit("50%_off")])),
            "t0.[Name] LIKE N'50[%][_]off%'"
        );
        assert_eq!(render(name().call("EndsWith", [lit("x")])), "t0.[Name] LIKE N'%x'");
        let mysql = CompilerConfig::for_dialect(Dialect::MySql);
        assert_eq!(
            render_with(name().call("Contains", [lit("a_b")]), &mysql).unwrap(),
            "t0.`Name` LIKE '%a\\\\_b%'"
        );
    }

    #[test]
    fn test_like_with_column_argument() {
        let e = name().call("StartsWith", [Expr::Source(0).member("Id").call("ToString", [])]);
        assert_eq!(
            render(e),
            "t0.[Name] LIKE CAST(t0.[Id] AS NVARCHAR(MAX)) + N'%'"
        );
    }

    #[test]
    fn test_list_contains() {
        let list = lit(Value::List(vec![Value::Int(1), Value::Int(2)]));
        let id = Expr::Source(0).member("Id");
        assert_eq!(render(list.call("Contains", [id.clone()])), "t0.[Id] IN (1, 2)");
        let empty = lit(Value::List(vec![]));
        assert_eq!(render(empty.call("Contains", [id])), "1 = 0");
    }

    #[test]
    fn test_substring_is_one_based() {
        let e = name().call("Substring", [lit(0), lit(3)]).eq(lit("abc"));
        assert_eq!(render(e), "SUBSTRING(t0.[Name], 1, 3) = N'abc'");
    }

    #[test]
    fn test_properties() {
        let e = Expr::Source(0).member("Created").member("Year").eq(lit(2024));
        assert_eq!(render(e), "YEAR(t0.[Created]) = 2024");
        let e = name().member("Length").gt(lit(3));
        assert_eq!(render(e), "LEN(t0.[Name]) > 3");
        let mysql = CompilerConfig::for_dialect(Dialect::MySql);
        let e = name().call("Trim", []).member("Length").gt(lit(3));
        assert_eq!(render_with(e, &mysql).unwrap(), "CHAR_LENGTH(TRIM(t0.`Name`)) > 3");
    }

    #[test]
    fn test_is_null_or_empty() {
        let e = call_static("IsNullOrEmpty", [name()]).not();
        assert_eq!(render(e), "NOT ((t0.[Name] IS NULL OR t0.[Name] = N''))");
    }

    #[test]
    fn test_unknown_method() {
        let err = render_with(name().call("PadLeft", [lit(3)]), &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedMethod(m) if m == "PadLeft/1"));
    }
}
