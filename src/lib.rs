//! # navql
//!
//! Navigation-aware query compiler.
//!
//! Turns an operator log (the recorded chain of query operators a caller
//! built) into parameterized SQL for SQL Server and MySQL. Navigation
//! members become LEFT JOINs, one-to-many projections become nested
//! subqueries, and every command carries the result map its rows are read
//! with.
//!
//! ## Quick Example
//!
//! ```rust
//! use navql::prelude::*;
//!
//! let schema = Schema::parse(
//!     "entity Demo => Sys_Demo ( Id int key identity, Name nvarchar(32) )",
//! ).unwrap();
//!
//! // GetSource<Demo>().Where(x => x.Id <= 10)
//! let log = OperatorLog::from_source("Demo")
//!     .then(Operator::filter(lambda("x", p("x").get("Id").le(10))));
//!
//! let cmd = Compiler::new(&schema, CompilerConfig::default()).compile(&log).unwrap();
//! assert_eq!(
//!     cmd.sql,
//!     "SELECT t0.[Id] AS [Id], t0.[Name] AS [Name] FROM [Sys_Demo] t0 WHERE t0.[Id] <= 10"
//! );
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod parser;
pub mod plan;
pub mod schema;
pub mod transpiler;

use crate::ast::OperatorLog;
use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::plan::QueryPlan;
use crate::schema::Schema;
use crate::transpiler::Command;

pub mod prelude {
    pub use crate::Compiler;
    pub use crate::ast::builders::*;
    pub use crate::ast::*;
    pub use crate::config::CompilerConfig;
    pub use crate::error::*;
    pub use crate::plan::QueryPlan;
    pub use crate::schema::{DbType, EntityDescriptor, ForeignKey, Schema, TypeToken};
    pub use crate::transpiler::{Command, Dialect, ResultMap, ToSql};
}

/// Parse an operator log into a query plan.
pub fn parse(schema: &Schema, log: &OperatorLog) -> CompileResult<QueryPlan> {
    parser::parse(schema, log)
}

/// Translate a query plan into a command.
pub fn translate(schema: &Schema, plan: &QueryPlan, config: &CompilerConfig) -> CompileResult<Command> {
    transpiler::translate(schema, plan, config)
}

/// Compiler bound to one schema and configuration.
///
/// Stateless between calls; a compiled command depends only on the log,
/// the schema and the configuration.
pub struct Compiler<'a> {
    schema: &'a Schema,
    config: CompilerConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(schema: &'a Schema, config: CompilerConfig) -> Self {
        Self { schema, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Parse and translate `log`.
    pub fn compile(&self, log: &OperatorLog) -> CompileResult<Command> {
        let plan = parse(self.schema, log)?;
        translate(self.schema, &plan, &self.config)
    }
}
