use super::context::VisitContext;
use super::predicate::visit_value;
use crate::ast::Expr;
use crate::error::CompileResult;

/// GROUP BY list for a grouping key; an object key groups by each member.
pub fn visit_group_by(ctx: &mut VisitContext, key: &Expr) -> CompileResult<String> {
    let mut parts = Vec::new();
    match key {
        Expr::New { bindings, .. } => {
            for b in bindings {
                parts.push(visit_value(ctx, &b.value)?);
            }
        }
        other => parts.push(visit_value(ctx, other)?),
    }
    Ok(parts.join(", "))
}
