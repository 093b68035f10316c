use super::context::VisitContext;
use super::predicate::visit_value;
use crate::ast::Expr;
use crate::error::{CompileError, CompileResult};
use crate::schema::EntityDescriptor;

/// SET list of an assignment projector (`new T { A = x.A + 1 }`).
/// Targets are qualified with `alias` when the dialect wants it.
pub fn visit_assignments(
    ctx: &mut VisitContext,
    target: &EntityDescriptor,
    assignments: &Expr,
    alias: Option<&str>,
) -> CompileResult<String> {
    let Expr::New { bindings, .. } = assignments else {
        return Err(CompileError::operand(
            "Update",
            "assignments must be an object construction",
        ));
    };
    if bindings.is_empty() {
        return Err(CompileError::operand("Update", "nothing to update"));
    }
    let mut set = Vec::with_capacity(bindings.len());
    for b in bindings {
        let col = target.column(&b.member)?;
        if !col.is_writable() {
            return Err(CompileError::operand(
                "Update",
                format!("column '{}' is not writable", b.member),
            ));
        }
        let column = ctx.quote(&col.column);
        let lhs = match alias {
            Some(a) => format!("{}.{}", a, column),
            None => column,
        };
        let rhs = match &b.value {
            Expr::Constant(v) => ctx.constant_typed(v, col.db_type, col.size),
            other => visit_value(ctx, other)?,
        };
        set.push(format!("{} = {}", lhs, rhs));
    }
    Ok(set.join(", "))
}
