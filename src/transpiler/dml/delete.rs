//! DELETE SQL generation.

use super::{Columns, check_payload, key_filter, render_layer};
use crate::error::CompileResult;
use crate::plan::{DeletePayload, DeletePlan};
use crate::transpiler::Translator;

/// Generate DELETE SQL.
pub fn build_delete(tr: &mut Translator, plan: &DeletePlan) -> CompileResult<String> {
    let schema = tr.schema;
    let entity = schema.entity(&plan.target)?;
    match &plan.payload {
        DeletePayload::Entity(value) => {
            check_payload(entity, value)?;
            let filter = key_filter(tr, entity, value)?;
            Ok(format!(
                "DELETE FROM {} WHERE {}",
                tr.quote(&entity.table),
                filter
            ))
        }
        DeletePayload::Predicate => {
            let layer = render_layer(tr, &plan.scope, Columns::Nothing, &[])?;
            Ok(format!("DELETE {}{}", layer.alias, layer.body()))
        }
    }
}
