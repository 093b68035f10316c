//! INSERT SQL generation.

use tracing::debug;

use super::check_payload;
use super::select::build_select;
use crate::ast::{EntityValue, Expr};
use crate::error::{CompileError, CompileResult};
use crate::plan::{InsertPayload, InsertPlan, SelectPlan};
use crate::schema::{ColumnDescriptor, EntityDescriptor};
use crate::transpiler::Translator;

/// Generate INSERT SQL.
pub fn build_insert(tr: &mut Translator, plan: &InsertPlan) -> CompileResult<String> {
    let schema = tr.schema;
    let entity = schema.entity(&plan.target)?;
    match &plan.payload {
        InsertPayload::Entity(value) => insert_rows(tr, entity, std::slice::from_ref(value)),
        InsertPayload::Entities(values) => insert_rows(tr, entity, values),
        InsertPayload::Query(scope) => insert_select(tr, entity, scope),
    }
}

fn insert_rows(
    tr: &mut Translator,
    entity: &EntityDescriptor,
    rows: &[EntityValue],
) -> CompileResult<String> {
    if rows.is_empty() {
        return Err(CompileError::operand("Insert", "no rows to insert"));
    }
    for row in rows {
        check_payload(entity, row)?;
    }
    // identity, excluded and row-version columns are database-generated
    let writable: Vec<(&str, &ColumnDescriptor)> =
        entity.columns().filter(|(_, c)| c.is_writable()).collect();
    if writable.is_empty() {
        return Err(CompileError::operand(
            "Insert",
            format!("{} has no writable columns", entity.ty),
        ));
    }
    let table = tr.quote(&entity.table);
    let columns: Vec<String> = writable.iter().map(|(_, c)| tr.quote(&c.column)).collect();
    let columns = columns.join(", ");

    let scope = SelectPlan::from_source(entity.ty.clone());
    let batch_size = tr.config.insert_batch_size.max(1);
    let mut statements = Vec::new();
    for batch in rows.chunks(batch_size) {
        let mut ctx = tr.context(&scope);
        let mut tuples = Vec::with_capacity(batch.len());
        for row in batch {
            let values: Vec<String> = writable
                .iter()
                .map(|(member, col)| match row.get(member) {
                    Some(v) => ctx.constant_typed(v, col.db_type, col.size),
                    None => "DEFAULT".to_string(),
                })
                .collect();
            tuples.push(format!("({})", values.join(", ")));
        }
        statements.push(format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns,
            tuples.join(", ")
        ));
    }
    debug!(table = %entity.table, rows = rows.len(), statements = statements.len(), "insert batched");

    let mut sql = statements.join("; ");
    if let Some((member, _)) = entity.identity() {
        sql.push_str(&format!(
            "; SELECT {} AS {}",
            tr.generator.last_identity(),
            tr.quote(member)
        ));
    }
    Ok(sql)
}

/// `INSERT INTO [T] ([a], [b]) SELECT ...` from an object-construction projector.
fn insert_select(
    tr: &mut Translator,
    entity: &EntityDescriptor,
    scope: &SelectPlan,
) -> CompileResult<String> {
    let Expr::New { bindings, .. } = &scope.select else {
        return Err(CompileError::operand(
            "Insert",
            "INSERT ... SELECT needs an object-construction projector",
        ));
    };
    let mut columns = Vec::with_capacity(bindings.len());
    for b in bindings {
        let col = entity.column(&b.member)?;
        if !col.is_writable() {
            return Err(CompileError::operand(
                "Insert",
                format!("column '{}' is not writable", b.member),
            ));
        }
        columns.push(tr.quote(&col.column));
    }
    let select = build_select(tr, scope, false)?;
    Ok(format!(
        "INSERT INTO {} ({}) {}",
        tr.quote(&entity.table),
        columns.join(", "),
        select
    ))
}
