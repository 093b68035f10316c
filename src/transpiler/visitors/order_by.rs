use super::context::VisitContext;
use super::predicate::visit_value;
use crate::error::CompileResult;
use crate::plan::OrderClause;

/// `expr [DESC], ...`
pub fn visit_order_by(ctx: &mut VisitContext, orders: &[OrderClause]) -> CompileResult<String> {
    let mut parts = Vec::with_capacity(orders.len());
    for o in orders {
        let expr = visit_value(ctx, &o.expr)?;
        parts.push(if o.descending {
            format!("{} DESC", expr)
        } else {
            expr
        });
    }
    Ok(parts.join(", "))
}
