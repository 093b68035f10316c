//! Transpiler tests split into modules:
//!
//! ```text
//! mod core;      // SELECT, INSERT, UPDATE, DELETE shapes
//! mod dialects;  // SQL Server vs MySQL rendering
//! mod features;  // navigation, joins, grouping, nesting, unions
//! ```

mod core;

use crate::Compiler;
use crate::ast::OperatorLog;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::schema::Schema;
use crate::transpiler::{Command, Dialect};

const SCHEMA: &str = r#"
-- shared fixture
entity Demo => Sys_Demo (
    Id int key identity,
    Name nvarchar(32),
    ClientId int nullable,
    Client ref Client fk(ClientId => Id)
)

entity Client => Bas_Client (
    Id int key identity,
    Name nvarchar(64),
    Code varchar(16) column(ClientCode),
    IsActive bit,
    CloudServerId int nullable,
    CloudServer ref CloudServer fk(CloudServerId => Id),
    Accounts many ClientAccount fk(Id => ClientId)
)

entity ClientAccount => Bas_ClientAccount (
    Id int key identity,
    ClientId int,
    Balance decimal
)

entity CloudServer => Sys_CloudServer (
    Id int key,
    CloudServerName nvarchar(64),
    Region ref Region
)

entity Region (
    Id int key,
    Name nvarchar(32)
)

entity Log => Sys_Log (
    Message nvarchar(max),
    Level int
)

entity Document => Doc_Document (
    Id int key,
    Title nvarchar(128),
    Version timestamp rowversion,
    Scratch nvarchar ignore
)
"#;

const DEMO: &str = "t0.[Id] AS [Id], t0.[Name] AS [Name], t0.[ClientId] AS [ClientId]";

const CLIENT: &str = "t0.[Id] AS [Id], t0.[Name] AS [Name], t0.[ClientCode] AS [Code], \
                      t0.[IsActive] AS [IsActive], t0.[CloudServerId] AS [CloudServerId]";

/// Client columns read back from a derived table.
const CLIENT_DERIVED: &str = "t0.[Id] AS [Id], t0.[Name] AS [Name], t0.[Code] AS [Code], \
                              t0.[IsActive] AS [IsActive], t0.[CloudServerId] AS [CloudServerId]";

fn schema() -> Schema {
    Schema::parse(SCHEMA).unwrap()
}

fn try_compile(log: &OperatorLog, config: CompilerConfig) -> Result<Command, CompileError> {
    let schema = schema();
    Compiler::new(&schema, config).compile(log)
}

fn compile(log: &OperatorLog, config: CompilerConfig) -> Command {
    try_compile(log, config).unwrap()
}

/// SQL Server text with inline constants.
fn mssql(log: &OperatorLog) -> String {
    compile(log, CompilerConfig::default()).sql
}

fn mysql(log: &OperatorLog) -> String {
    compile(log, CompilerConfig::for_dialect(Dialect::MySql)).sql
}

fn error(log: &OperatorLog) -> CompileError {
    try_compile(log, CompilerConfig::default()).unwrap_err()
}
