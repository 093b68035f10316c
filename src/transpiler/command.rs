//! Compiled command handed to the execution collaborator.

use serde::{Deserialize, Serialize};

use crate::ast::Value;
use crate::schema::DbType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
}

/// One named parameter of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Placeholder as it appears in the SQL text (`@p1`)
    pub name: String,
    pub value: Value,
    pub db_type: DbType,
    pub size: Option<u32>,
}

/// Columns of a navigation path inside a result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationSpan {
    /// Dotted member path from the row root (`Client.CloudServer`)
    pub path: String,
    /// Offset of the first column (the existence column when there is one)
    pub start: usize,
    pub span: usize,
}

/// Materializer contract for a SELECT.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultMap {
    /// Output column names in order
    pub columns: Vec<String>,
    pub navigations: Vec<NavigationSpan>,
}

impl ResultMap {
    pub fn navigation(&self, path: &str) -> Option<&NavigationSpan> {
        self.navigations.iter().find(|n| n.path == path)
    }
}

/// SQL text plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub sql: String,
    pub params: Vec<Parameter>,
    pub kind: CommandKind,
    /// Present for SELECT commands
    pub result_map: Option<ResultMap>,
}

impl Command {
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: CommandKind::Text,
            result_map: None,
        }
    }

    /// Call a stored procedure by name.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::StoredProcedure,
            ..Self::text(name)
        }
    }

    /// Add a parameter (builder style).
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.params.push(Parameter {
            name: name.into(),
            db_type: DbType::infer(&value),
            value,
            size: None,
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_command() {
        let cmd = Command::procedure("usp_Archive").with_param("@days", 30);
        assert_eq!(cmd.kind, CommandKind::StoredProcedure);
        assert_eq!(cmd.sql, "usp_Archive");
        assert_eq!(cmd.param("@days").map(|p| p.db_type), Some(DbType::Int));
    }
}
