//! UPDATE SQL generation.

use super::{Columns, check_payload, key_filter, render_layer};
use crate::ast::EntityValue;
use crate::error::{CompileError, CompileResult};
use crate::plan::{SelectPlan, UpdatePayload, UpdatePlan};
use crate::schema::EntityDescriptor;
use crate::transpiler::Translator;

/// Generate UPDATE SQL.
pub fn build_update(tr: &mut Translator, plan: &UpdatePlan) -> CompileResult<String> {
    let schema = tr.schema;
    let entity = schema.entity(&plan.target)?;
    match &plan.payload {
        UpdatePayload::Entity(value) => update_by_key(tr, entity, value),
        UpdatePayload::Assignments(assignments) => {
            let layer = render_layer(
                tr,
                &plan.scope,
                Columns::Assignments(entity, assignments),
                &[],
            )?;
            Ok(tr.generator.update_statement(
                &tr.quote(&entity.table),
                &layer.alias,
                &layer.columns,
                &layer.joins,
                &layer.clauses,
            ))
        }
    }
}

/// `UPDATE [T] SET ... WHERE [key] = ...`: only members present in the
/// payload are written.
fn update_by_key(
    tr: &mut Translator,
    entity: &EntityDescriptor,
    value: &EntityValue,
) -> CompileResult<String> {
    check_payload(entity, value)?;
    let scope = SelectPlan::from_source(entity.ty.clone());
    let mut set = Vec::new();
    {
        let mut ctx = tr.context(&scope);
        for (member, col) in entity.columns() {
            if col.key || !col.is_writable() {
                continue;
            }
            if let Some(v) = value.get(member) {
                set.push(format!(
                    "{} = {}",
                    ctx.quote(&col.column),
                    ctx.constant_typed(v, col.db_type, col.size)
                ));
            }
        }
    }
    if set.is_empty() {
        return Err(CompileError::operand("Update", "nothing to update"));
    }
    let filter = key_filter(tr, entity, value)?;
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        tr.quote(&entity.table),
        set.join(", "),
        filter
    ))
}
