//! Constants: inline literals or named parameters.

use super::command::Parameter;
use super::traits::SqlGenerator;
use crate::ast::Value;
use crate::schema::DbType;

/// Context for parameterized query building.
#[derive(Debug, Default)]
pub struct ParamContext {
    /// Current parameter index (1-based placeholders)
    pub index: usize,
    /// Collected parameters in placeholder order
    pub params: Vec<Parameter>,
}

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value and return the placeholder for it.
    pub fn add_param(
        &mut self,
        value: Value,
        db_type: DbType,
        size: Option<u32>,
        generator: &dyn SqlGenerator,
    ) -> String {
        self.index += 1;
        let name = generator.placeholder(self.index);
        self.params.push(Parameter {
            name: name.clone(),
            value,
            db_type,
            size,
        });
        name
    }
}

/// Render `value` as an inline SQL literal.
pub fn literal(value: &Value, generator: &dyn SqlGenerator, unicode: bool) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => generator.bool_literal(*b),
        Value::Int(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::String(s) => generator.string_literal(s, unicode),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
        Value::Guid(u) => format!("'{}'", u),
        Value::List(items) => format!(
            "({})",
            items
                .iter()
                .map(|v| literal(v, generator, unicode))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
