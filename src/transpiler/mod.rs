//! SQL transpiler for query plans.
//!
//! Converts parsed [`QueryPlan`]s into executable commands: SQL text in the
//! configured dialect plus ordered parameters and, for SELECTs, the result
//! map the materializer reads rows with.

pub mod alias;
pub mod command;
pub mod dialect;
pub mod dml;
pub mod params;
pub mod sql;
pub mod traits;
pub mod visitors;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::plan::{QueryPlan, SelectPlan};
use crate::schema::Schema;

pub use command::{Command, CommandKind, NavigationSpan, Parameter, ResultMap};
pub use dialect::Dialect;
pub use params::ParamContext;
pub use traits::SqlGenerator;
use visitors::VisitContext;

/// Per-command translation state: the dialect generator and the parameters
/// collected so far.
pub struct Translator<'a> {
    pub schema: &'a Schema,
    pub config: &'a CompilerConfig,
    pub generator: Box<dyn SqlGenerator>,
    pub params: ParamContext,
}

impl<'a> Translator<'a> {
    pub fn new(schema: &'a Schema, config: &'a CompilerConfig) -> Self {
        Self {
            schema,
            config,
            generator: config.dialect.generator(),
            params: ParamContext::new(),
        }
    }

    /// Fresh alias scope over one plan layer.
    pub fn context<'b>(&'b mut self, plan: &'b SelectPlan) -> VisitContext<'b> {
        VisitContext::new(
            self.schema,
            self.config,
            self.generator.as_ref(),
            &mut self.params,
            plan,
        )
    }

    pub fn quote(&self, name: &str) -> String {
        self.generator.quote_identifier(name)
    }
}

/// Translate a plan into a command for `config.dialect`.
pub fn translate(schema: &Schema, plan: &QueryPlan, config: &CompilerConfig) -> CompileResult<Command> {
    let mut tr = Translator::new(schema, config);
    let (sql, result_map) = match plan {
        QueryPlan::Select(p) => {
            let (sql, map) = dml::select::build_query(&mut tr, p)?;
            (sql, Some(map))
        }
        QueryPlan::Insert(p) => (dml::insert::build_insert(&mut tr, p)?, None),
        QueryPlan::Update(p) => (dml::update::build_update(&mut tr, p)?, None),
        QueryPlan::Delete(p) => (dml::delete::build_delete(&mut tr, p)?, None),
    };
    debug!(
        dialect = %config.dialect,
        params = tr.params.params.len(),
        sql = %sql,
        "translated command"
    );
    Ok(Command {
        sql,
        params: tr.params.params,
        kind: CommandKind::Text,
        result_map,
    })
}

/// Trait for converting plans to SQL.
pub trait ToSql {
    /// Convert to SQL using the default dialect.
    fn to_sql(&self, schema: &Schema) -> CompileResult<String> {
        self.to_sql_with_dialect(schema, Dialect::default())
    }
    /// Convert to SQL with a specific dialect; constants are inlined.
    fn to_sql_with_dialect(&self, schema: &Schema, dialect: Dialect) -> CompileResult<String>;
}

impl ToSql for QueryPlan {
    fn to_sql_with_dialect(&self, schema: &Schema, dialect: Dialect) -> CompileResult<String> {
        let config = CompilerConfig::for_dialect(dialect);
        Ok(translate(schema, self, &config)?.sql)
    }
}
