//! End-to-end compilation against the schema and config fixtures.

use std::path::Path;

use navql::prelude::*;
use pretty_assertions::assert_eq;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn schema() -> Schema {
    init_tracing();
    Schema::from_file(&fixture("schema.nav")).expect("schema fixture should parse")
}

fn active_clients() -> OperatorLog {
    OperatorLog::from_source("Client")
        .then(Operator::filter(lambda("c", p("c").get("IsActive"))))
        .then(Operator::order_by(lambda("c", p("c").get("Name"))))
}

#[test]
fn test_schema_fixture() {
    let schema = schema();
    let client = schema.entity(&TypeToken::new("Client")).unwrap();
    assert_eq!(client.table, "Bas_Client");
    assert_eq!(client.keys().count(), 1);
    assert!(client.navigation("Accounts").is_some_and(|n| n.many));
}

#[test]
fn test_default_config_sqlserver() {
    let schema = schema();
    let cmd = Compiler::new(&schema, CompilerConfig::default())
        .compile(&active_clients().then(Operator::take(3)))
        .unwrap();
    assert_eq!(
        cmd.sql,
        "SELECT TOP(3) t0.[Id] AS [Id], t0.[Name] AS [Name], t0.[IsActive] AS [IsActive], \
         t0.[CloudServerId] AS [CloudServerId] FROM [Bas_Client] t0 \
         WHERE t0.[IsActive] = 1 ORDER BY t0.[Name]"
    );
    assert!(cmd.params.is_empty());
}

#[test]
fn test_toml_config_mysql() {
    let schema = schema();
    let config = CompilerConfig::from_file(&fixture("mysql.toml")).unwrap();
    assert_eq!(config.dialect, Dialect::MySql);

    let log = active_clients().then(Operator::filter(lambda(
        "c",
        p("c").get("CloudServer").get("CloudServerName").eq("eu-1"),
    )));
    let cmd = Compiler::new(&schema, config).compile(&log).unwrap();
    assert_eq!(
        cmd.sql,
        "SELECT t0.`Id` AS `Id`, t0.`Name` AS `Name`, t0.`IsActive` AS `IsActive`, \
         t0.`CloudServerId` AS `CloudServerId` FROM `Bas_Client` t0 \
         LEFT JOIN `Sys_CloudServer` t1 ON t0.`CloudServerId` = t1.`Id` \
         WHERE t0.`IsActive` = 1 AND t1.`CloudServerName` = ?p1 ORDER BY t0.`Name`"
    );
    assert_eq!(cmd.params.len(), 1);
    assert_eq!(cmd.params[0].value, Value::from("eu-1"));
    assert_eq!(cmd.params[0].db_type, DbType::NVarChar);
}

#[test]
fn test_tagged_operator_log() {
    let schema = schema();
    let log = OperatorLog::new()
        .then(Operator::named("GetSource", vec![Operand::Type("ClientAccount".into())]).unwrap())
        .then(
            Operator::named(
                "Where",
                vec![Operand::Lambda(lambda("a", p("a").get("Balance").gt(100)))],
            )
            .unwrap(),
        )
        .then(Operator::named("Count", vec![]).unwrap());
    let cmd = Compiler::new(&schema, CompilerConfig::default()).compile(&log).unwrap();
    assert_eq!(
        cmd.sql,
        "SELECT COUNT(1) FROM [Bas_ClientAccount] t0 WHERE t0.[Balance] > 100"
    );

    let err = Operator::named("Aggregate", vec![]).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperator(tag) if tag == "Aggregate"));
}

#[test]
fn test_log_survives_json() {
    let schema = schema();
    let log = active_clients()
        .then(Operator::include(lambda("c", p("c").get("Accounts"))));
    let json = serde_json::to_string(&log).unwrap();
    let restored: OperatorLog = serde_json::from_str(&json).unwrap();

    let compiler = Compiler::new(&schema, CompilerConfig::default());
    let a = compiler.compile(&log).unwrap();
    let b = compiler.compile(&restored).unwrap();
    assert_eq!(a, b);

    let map = a.result_map.unwrap();
    let accounts = map.navigation("Accounts").unwrap();
    assert_eq!(accounts.start, 4);
    assert_eq!(&map.columns[accounts.start..], ["Accounts", "Id1", "ClientId", "Balance"]);
}

#[test]
fn test_unknown_entity() {
    let schema = schema();
    let err = Compiler::new(&schema, CompilerConfig::default())
        .compile(&OperatorLog::from_source("Invoice"))
        .unwrap_err();
    assert!(matches!(err, CompileError::UnknownEntity(ty) if ty == "Invoice"));
}
