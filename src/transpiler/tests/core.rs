//! Statement shapes against the default dialect.

use super::*;
use crate::ast::builders::*;
use crate::ast::{EntityValue, Operator, Value};
use crate::schema::DbType;
use crate::transpiler::ResultMap;

#[test]
fn test_where_then_select() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::filter(lambda("x", p("x").get("Id").le(10))))
        .then(Operator::select(lambda(
            "x",
            new_typed("Demo", [("Id", p("x").get("Id")), ("Name", p("x").get("Name"))]),
        )));
    assert_eq!(
        mssql(&log),
        "SELECT t0.[Id] AS [Id], t0.[Name] AS [Name] FROM [Sys_Demo] t0 WHERE t0.[Id] <= 10"
    );
}

#[test]
fn test_identity_select() {
    let cmd = compile(&OperatorLog::from_source("Demo"), CompilerConfig::default());
    assert_eq!(cmd.sql, format!("SELECT {} FROM [Sys_Demo] t0", DEMO));
    let map = cmd.result_map.unwrap();
    assert_eq!(map.columns, ["Id", "Name", "ClientId"]);
    assert!(map.navigations.is_empty());
}

#[test]
fn test_renamed_and_ignored_columns() {
    assert_eq!(
        mssql(&OperatorLog::from_source("Client")),
        format!("SELECT {} FROM [Bas_Client] t0", CLIENT)
    );
    assert_eq!(
        mssql(&OperatorLog::from_source("Document")),
        "SELECT t0.[Id] AS [Id], t0.[Title] AS [Title], t0.[Version] AS [Version] \
         FROM [Doc_Document] t0"
    );
}

#[test]
fn test_order_skip_take() {
    let log = OperatorLog::from_source("Client")
        .then(Operator::order_by(lambda("c", p("c").get("Id"))))
        .then(Operator::skip(10))
        .then(Operator::take(20));
    assert_eq!(
        mssql(&log),
        format!(
            "SELECT {} FROM [Bas_Client] t0 ORDER BY t0.[Id] OFFSET 10 ROWS FETCH NEXT 20 ROWS ONLY",
            CLIENT
        )
    );
}

#[test]
fn test_skip_after_take_pages_by_inner_order() {
    let log = OperatorLog::from_source("Client")
        .then(Operator::order_by(lambda("c", p("c").get("Id"))))
        .then(Operator::take(20))
        .then(Operator::skip(10));
    assert_eq!(
        mssql(&log),
        format!(
            "SELECT {} FROM (SELECT TOP(20) {} FROM [Bas_Client] t0 ORDER BY t0.[Id]) t0 \
             ORDER BY t0.[Id] OFFSET 10 ROWS",
            CLIENT_DERIVED, CLIENT
        )
    );
}

#[test]
fn test_take_uses_top() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::order_by_desc(lambda("x", p("x").get("Name"))))
        .then(Operator::then_by(lambda("x", p("x").get("Id"))))
        .then(Operator::take(5));
    assert_eq!(
        mssql(&log),
        format!(
            "SELECT TOP(5) {} FROM [Sys_Demo] t0 ORDER BY t0.[Name] DESC, t0.[Id]",
            DEMO
        )
    );
}

#[test]
fn test_take_zero_is_unbounded() {
    let log = OperatorLog::from_source("Demo").then(Operator::take(0));
    assert_eq!(mssql(&log), format!("SELECT {} FROM [Sys_Demo] t0", DEMO));
}

#[test]
fn test_first_with_predicate() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::first(Some(lambda("x", p("x").get("Name").eq("a")))));
    assert_eq!(
        mssql(&log),
        format!("SELECT TOP(1) {} FROM [Sys_Demo] t0 WHERE t0.[Name] = N'a'", DEMO)
    );
}

#[test]
fn test_filter_after_take_reads_derived_rows() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::order_by(lambda("x", p("x").get("Id"))))
        .then(Operator::take(10))
        .then(Operator::filter(lambda("x", p("x").get("Name").ne(Value::Null))));
    assert_eq!(
        mssql(&log),
        format!(
            "SELECT {} FROM (SELECT TOP(10) {} FROM [Sys_Demo] t0 ORDER BY t0.[Id]) t0 \
             WHERE t0.[Name] IS NOT NULL ORDER BY t0.[Id]",
            DEMO, DEMO
        )
    );
}

#[test]
fn test_count() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::filter(lambda("x", p("x").get("Id").gt(3))))
        .then(Operator::count(None));
    let cmd = compile(&log, CompilerConfig::default());
    assert_eq!(cmd.sql, "SELECT COUNT(1) FROM [Sys_Demo] t0 WHERE t0.[Id] > 3");
    assert_eq!(cmd.result_map, Some(ResultMap::default()));
}

#[test]
fn test_count_over_distinct_rows() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::select(lambda("x", p("x").get("Name"))))
        .then(Operator::distinct())
        .then(Operator::count(None));
    assert_eq!(
        mssql(&log),
        "SELECT COUNT(1) FROM (SELECT DISTINCT t0.[Name] AS [Name] FROM [Sys_Demo] t0) t0"
    );
}

#[test]
fn test_any() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::any(Some(lambda("x", p("x").get("Id").eq(1)))));
    assert_eq!(
        mssql(&log),
        "IF EXISTS(SELECT TOP(1) 1 FROM [Sys_Demo] t0 WHERE t0.[Id] = 1) SELECT 1 ELSE SELECT 0"
    );
}

#[test]
fn test_parameterized_constants() {
    let log = OperatorLog::from_source("Demo").then(Operator::filter(lambda(
        "x",
        p("x").get("Name").eq("a").and(p("x").get("Id").gt(2)),
    )));
    let config = CompilerConfig::builder().parameterized(true).build();
    let cmd = compile(&log, config);
    assert_eq!(
        cmd.sql,
        format!(
            "SELECT {} FROM [Sys_Demo] t0 WHERE t0.[Name] = @p1 AND t0.[Id] > @p2",
            DEMO
        )
    );
    let params: Vec<(&str, &Value, DbType)> = cmd
        .params
        .iter()
        .map(|p| (p.name.as_str(), &p.value, p.db_type))
        .collect();
    assert_eq!(
        params,
        [
            ("@p1", &Value::from("a"), DbType::NVarChar),
            ("@p2", &Value::Int(2), DbType::Int),
        ]
    );
}

#[test]
fn test_parameters_follow_text_order() {
    let active = OperatorLog::from_source("Client")
        .then(Operator::filter(lambda("c", p("c").get("Name").eq("a"))));
    let log = OperatorLog::from_source("Demo")
        .then(Operator::filter(lambda("d", p("d").get("Id").gt(2))))
        .then(Operator::join(
            active,
            lambda("d", p("d").get("ClientId")),
            lambda("c", p("c").get("Id")),
            lambda2(
                "d",
                "c",
                new_object([("Tag", lit("x")), ("Client", p("c").get("Name"))]),
            ),
        ));
    let cmd = compile(&log, CompilerConfig::builder().parameterized(true).build());
    let values: Vec<&Value> = cmd.params.iter().map(|p| &p.value).collect();
    assert_eq!(values, [&Value::from("x"), &Value::from("a"), &Value::Int(2)]);
    let at = |name: &str| cmd.sql.find(name).unwrap();
    assert!(at("@p1") < at("@p2") && at("@p2") < at("@p3"));
}

#[test]
fn test_skip_without_order() {
    let log = OperatorLog::from_source("Demo").then(Operator::skip(5));
    assert!(matches!(error(&log), CompileError::MissingOrderByForPagination(_)));
}

#[test]
fn test_insert_entity_returns_identity() {
    let log = OperatorLog::new().then(Operator::insert(
        EntityValue::new("Demo").with("Name", "a").with("ClientId", 3),
    ));
    let cmd = compile(&log, CompilerConfig::default());
    assert_eq!(
        cmd.sql,
        "INSERT INTO [Sys_Demo] ([Name], [ClientId]) VALUES (N'a', 3); \
         SELECT SCOPE_IDENTITY() AS [Id]"
    );
    assert!(cmd.result_map.is_none());
}

#[test]
fn test_bulk_insert_batches() {
    let rows = vec![
        EntityValue::new("Log").with("Message", "a").with("Level", 1),
        EntityValue::new("Log").with("Message", "b"),
        EntityValue::new("Log").with("Message", "c").with("Level", 3),
    ];
    let log = OperatorLog::new().then(Operator::insert_many(rows));
    let config = CompilerConfig::builder().insert_batch_size(2).build();
    assert_eq!(
        compile(&log, config).sql,
        "INSERT INTO [Sys_Log] ([Message], [Level]) VALUES (N'a', 1), (N'b', DEFAULT); \
         INSERT INTO [Sys_Log] ([Message], [Level]) VALUES (N'c', 3)"
    );
}

#[test]
fn test_insert_skips_generated_columns() {
    let log = OperatorLog::new().then(Operator::insert(
        EntityValue::new("Document").with("Id", 1).with("Title", "t"),
    ));
    assert_eq!(
        mssql(&log),
        "INSERT INTO [Doc_Document] ([Id], [Title]) VALUES (1, N't')"
    );
}

#[test]
fn test_insert_from_query() {
    let log = OperatorLog::from_source("Client")
        .then(Operator::filter(lambda("c", p("c").get("IsActive"))))
        .then(Operator::select(lambda(
            "c",
            new_typed("Log", [("Message", p("c").get("Name")), ("Level", lit(1))]),
        )))
        .then(Operator::insert_from("Log"));
    assert_eq!(
        mssql(&log),
        "INSERT INTO [Sys_Log] ([Message], [Level]) \
         SELECT t0.[Name] AS [Message], 1 AS [Level] FROM [Bas_Client] t0 WHERE t0.[IsActive] = 1"
    );
}

#[test]
fn test_update_entity() {
    let log = OperatorLog::new().then(Operator::update(
        EntityValue::new("Demo").with("Id", 5).with("Name", "b"),
    ));
    assert_eq!(mssql(&log), "UPDATE [Sys_Demo] SET [Name] = N'b' WHERE [Id] = 5");
}

#[test]
fn test_update_parameters_follow_statement_order() {
    let log = OperatorLog::new().then(Operator::update(
        EntityValue::new("Demo").with("Id", 5).with("Name", "b"),
    ));
    let cmd = compile(&log, CompilerConfig::builder().parameterized(true).build());
    assert_eq!(cmd.sql, "UPDATE [Sys_Demo] SET [Name] = @p1 WHERE [Id] = @p2");
    assert_eq!(cmd.params[0].value, Value::from("b"));
    assert_eq!(cmd.params[0].size, Some(32));
    assert_eq!(cmd.params[1].value, Value::Int(5));
}

#[test]
fn test_update_without_key() {
    let log = OperatorLog::new().then(Operator::update(EntityValue::new("Log").with("Message", "x")));
    assert!(matches!(error(&log), CompileError::MissingKey(ty) if ty == "Log"));
}

#[test]
fn test_update_with_assignments() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::filter(lambda("x", p("x").get("Id").eq(1))))
        .then(Operator::update_with(lambda(
            "x",
            new_typed("Demo", [("Name", p("x").get("Name").add("!"))]),
        )));
    assert_eq!(
        mssql(&log),
        "UPDATE t0 SET [Name] = t0.[Name] + N'!' FROM [Sys_Demo] t0 WHERE t0.[Id] = 1"
    );
}

#[test]
fn test_update_rejects_identity_assignment() {
    let log = OperatorLog::from_source("Demo").then(Operator::update_with(lambda(
        "x",
        new_typed("Demo", [("Id", lit(3))]),
    )));
    assert!(matches!(error(&log), CompileError::InvalidOperand { .. }));
}

#[test]
fn test_delete_entity() {
    let log = OperatorLog::new().then(Operator::delete(Some(EntityValue::new("Demo").with("Id", 7))));
    assert_eq!(mssql(&log), "DELETE FROM [Sys_Demo] WHERE [Id] = 7");
}

#[test]
fn test_delete_by_predicate() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::filter(lambda("x", p("x").get("Name").eq("z"))))
        .then(Operator::delete(None));
    assert_eq!(
        mssql(&log),
        "DELETE t0 FROM [Sys_Demo] t0 WHERE t0.[Name] = N'z'"
    );
}

#[test]
fn test_unknown_member() {
    let log = OperatorLog::from_source("Demo")
        .then(Operator::filter(lambda("x", p("x").get("Nope").eq(1))));
    assert!(matches!(
        error(&log),
        CompileError::UnknownMember { entity, member } if entity == "Demo" && member == "Nope"
    ));
}
