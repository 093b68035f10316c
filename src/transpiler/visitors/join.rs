use super::context::VisitContext;
use super::predicate::value;
use crate::error::CompileResult;
use crate::plan::{JoinClause, JoinKind};

/// ` KIND JOIN target tN ON outer = inner AND ...` for an explicit join.
/// `target` is the rendered table name or parenthesized subquery.
pub fn visit_join(ctx: &mut VisitContext, join: &JoinClause, target: &str) -> CompileResult<String> {
    let alias = ctx.source(join.source)?.alias;
    let mut sql = format!(" {} {} {}", join.kind.keyword(), target, alias);
    if join.kind == JoinKind::Cross {
        return Ok(sql);
    }
    let mut pairs = Vec::with_capacity(join.outer_keys.len());
    for (outer, inner) in join.outer_keys.iter().zip(&join.inner_keys) {
        let l = value(ctx, outer)?;
        let r = value(ctx, inner)?;
        pairs.push(format!("{} = {}", l.wrap(4, false), r.wrap(4, false)));
    }
    sql.push_str(" ON ");
    sql.push_str(&pairs.join(" AND "));
    Ok(sql)
}
