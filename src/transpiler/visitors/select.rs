//! Projection visitor: output columns plus navigation spans.

use super::context::{Resolved, RowRef, VisitContext};
use super::predicate::value;
use crate::ast::{Binding, Expr};
use crate::error::{CompileError, CompileResult};
use crate::parser::nesting::{Shape, classify};
use crate::transpiler::NavigationSpan;

/// Output columns of one SELECT.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Projection {
    /// `(sql, output name)` pairs in order
    pub columns: Vec<(String, String)>,
    pub navigations: Vec<NavigationSpan>,
}

impl Projection {
    /// Append a column, suffixing the name when it is already taken.
    pub fn push(&mut self, sql: String, preferred: &str) {
        let mut name = preferred.to_string();
        let mut n = 1;
        while self.columns.iter().any(|(_, c)| *c == name) {
            name = format!("{}{}", preferred, n);
            n += 1;
        }
        self.columns.push((sql, name));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, n)| n.as_str())
    }

    /// `sql AS [name], ...`
    pub fn render(&self, ctx: &VisitContext) -> String {
        self.columns
            .iter()
            .map(|(sql, name)| format!("{} AS {}", sql, ctx.quote(name)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn visit_select(
    ctx: &mut VisitContext,
    select: &Expr,
    includes: &[Vec<String>],
) -> CompileResult<Projection> {
    let mut out = Projection::default();
    match select {
        Expr::Source(id) => {
            let row = ctx.source(*id)?;
            row_columns(ctx, &row, &mut out)?;
            let mut seen: Vec<String> = Vec::new();
            for path in includes {
                for depth in 1..=path.len() {
                    let hops = &path[..depth];
                    let dotted = hops.join(".");
                    if seen.contains(&dotted) {
                        continue;
                    }
                    let expr = hops
                        .iter()
                        .fold(Expr::Source(*id), |e, hop| e.member(hop.clone()));
                    navigation_columns(ctx, &expr, &dotted, &mut out)?;
                    seen.push(dotted);
                }
            }
        }
        Expr::New { bindings, .. } => visit_bindings(ctx, "", bindings, &mut out)?,
        other => match classify(ctx.schema, ctx.plan, other)? {
            Shape::Entity(_) => navigation_columns(ctx, other, other.output_name(), &mut out)?,
            _ => {
                let v = value(ctx, other)?;
                out.push(v.sql, other.output_name());
            }
        },
    }
    Ok(out)
}

fn visit_bindings(
    ctx: &mut VisitContext,
    prefix: &str,
    bindings: &[Binding],
    out: &mut Projection,
) -> CompileResult<()> {
    for b in bindings {
        let path = format!("{}{}", prefix, b.member);
        if let Expr::New { bindings, .. } = &b.value {
            let start = out.columns.len();
            visit_bindings(ctx, &format!("{}.", path), bindings, out)?;
            out.navigations.push(NavigationSpan {
                path,
                start,
                span: out.columns.len() - start,
            });
            continue;
        }
        match classify(ctx.schema, ctx.plan, &b.value)? {
            Shape::Entity(_) | Shape::Collection(_) => {
                navigation_columns(ctx, &b.value, &path, out)?;
            }
            Shape::Object | Shape::Scalar | Shape::Row => {
                let v = value(ctx, &b.value)?;
                out.push(v.sql, &b.member);
            }
        }
    }
    Ok(())
}

/// Existence column plus every column of the entity behind `expr`.
fn navigation_columns(
    ctx: &mut VisitContext,
    expr: &Expr,
    path: &str,
    out: &mut Projection,
) -> CompileResult<()> {
    let Some((id, hops)) = expr.member_path() else {
        return Err(CompileError::ambiguous(format!(
            "'{}' is not a member path",
            expr
        )));
    };
    let Resolved::Row(row, _) = ctx.resolve(id, &hops)? else {
        return Err(CompileError::ambiguous(format!("'{}' is not an entity", expr)));
    };
    let start = out.columns.len();
    if let Some(key) = &row.existence {
        let name = hops.last().copied().unwrap_or(path);
        out.push(
            format!("CASE WHEN {k} IS NULL THEN NULL ELSE {k} END", k = key),
            name,
        );
    }
    row_columns(ctx, &row, out)?;
    out.navigations.push(NavigationSpan {
        path: path.to_string(),
        start,
        span: out.columns.len() - start,
    });
    Ok(())
}

fn row_columns(ctx: &VisitContext, row: &RowRef, out: &mut Projection) -> CompileResult<()> {
    let Some(ty) = &row.ty else {
        return Err(CompileError::ambiguous(
            "an anonymous row has no column list; project its members",
        ));
    };
    let entity = ctx.schema.entity(ty)?;
    for (member, col) in entity.columns() {
        let name = if row.derived { member } else { col.column.as_str() };
        out.push(format!("{}.{}", row.alias, ctx.quote(name)), member);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::*;
    use crate::config::CompilerConfig;
    use crate::plan::SelectPlan;
    use crate::schema::{DbType, EntityDescriptor, ForeignKey, Schema};
    use crate::transpiler::params::ParamContext;

    fn schema() -> Schema {
        Schema::new()
            .with(
                EntityDescriptor::builder("Client", "Bas_Client")
                    .column("Id", DbType::Int, |c| c.key())
                    .column("Name", DbType::NVarChar, |c| c)
                    .column("ServerId", DbType::Int, |c| c.nullable())
                    .column("Scratch", DbType::NVarChar, |c| c.excluded())
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

    fn project(plan: &SelectPlan) -> (String, Projection) {
        let schema = schema();
        let config = CompilerConfig::default();
        let generator = config.dialect.generator();
        let mut params = ParamContext::new();
        let mut ctx = VisitContext::new(&schema, &config, generator.as_ref(), &mut params, plan);
        let projection = visit_select(&mut ctx, &plan.select, &plan.includes).unwrap();
        (
            format!("{}{}", projection.render(&ctx), ctx.navigation_joins()),
            projection,
        )
    }

    #[test]
    fn test_identity_skips_excluded_columns() {
        let plan = SelectPlan::from_source("Client".into());
        let (sql, _) = project(&plan);
        assert_eq!(
            sql,
            "t0.[Id] AS [Id], t0.[Name] AS [Name], t0.[ServerId] AS [ServerId]"
        );
    }

    #[test]
    fn test_reference_navigation_binding() {
        let mut plan = SelectPlan::from_source("Client".into());
        plan.select = new_object([
            ("Name", Expr::Source(0).member("Name")),
            ("Server", Expr::Source(0).member("Server")),
        ]);
        let (sql, projection) = project(&plan);
        assert_eq!(
            sql,
            "t0.[Name] AS [Name], \
             CASE WHEN t1.[Id] IS NULL THEN NULL ELSE t1.[Id] END AS [Server], \
             t1.[Id] AS [Id], t1.[Host] AS [Host] \
             LEFT JOIN [Sys_Server] t1 ON t0.[ServerId] = t1.[Id]"
        );
        assert_eq!(
            projection.navigations,
            vec![NavigationSpan {
                path: "Server".into(),
                start: 1,
                span: 3
            }]
        );
    }

    #[test]
    fn test_duplicate_names_are_suffixed() {
        let mut plan = SelectPlan::from_source("Client".into());
        plan.select = new_object([
            ("Id", Expr::Source(0).member("Id")),
            ("Host", Expr::Source(0).member("Server").member("Host")),
            ("Server", Expr::Source(0).member("Server")),
        ]);
        let (_, projection) = project(&plan);
        let names: Vec<&str> = projection.names().collect();
        assert_eq!(names, ["Id", "Host", "Server", "Id1", "Host1"]);
    }

    #[test]
    fn test_include_projects_navigation() {
        let mut plan = SelectPlan::from_source("Client".into());
        plan.includes = vec![vec!["Server".to_string()]];
        let (_, projection) = project(&plan);
        assert_eq!(projection.columns.len(), 6);
        assert_eq!(projection.navigations[0].start, 3);
    }
}
