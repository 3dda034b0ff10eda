//! 端到端场景: JSON 文档和构建器链依次经过
//! 编译器、SQL 后端和内存后端。

use std::fs;
use std::path::PathBuf;

use query_dispatcher::ast::{Query, QueryType, Row};
use query_dispatcher::backend::{Backend, Connection, Execution, SqlBackend};
use query_dispatcher::config::EngineConfig;
use query_dispatcher::error::DbError;
use query_dispatcher::memory::MemoryBackend;
use query_dispatcher::parser::parse_str;
use query_dispatcher::sql_compiler::{CompiledStatement, SqlCompiler};
use serde_json::{json, Value};

fn rows(values: Value) -> Vec<Row> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

fn fixtures() -> MemoryBackend {
    MemoryBackend::new()
        .with_table(
            "users",
            rows(json!([
                {"id": 1, "name": "Chris", "age": 23},
                {"id": 2, "name": "Swag", "age": 31},
                {"id": 3, "name": "Anna", "age": 19}
            ])),
        )
        .with_table(
            "posts",
            rows(json!([
                {"post_id": 10, "user_id": 1, "title": "Hello", "published": true},
                {"post_id": 11, "user_id": 1, "title": "Again", "published": false},
                {"post_id": 12, "user_id": 2, "title": "Swagger", "published": true}
            ])),
        )
}

fn data(result: &query_dispatcher::QueryResult) -> Value {
    Value::Array(result.data.iter().cloned().map(Value::Object).collect())
}

fn mysql(query: &Query) -> CompiledStatement {
    SqlCompiler::mysql().compile(query).unwrap().unwrap()
}

#[derive(Default)]
struct RecordingConnection {
    statements: Vec<(String, Vec<Value>)>,
}

impl Connection for RecordingConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Execution, DbError> {
        self.statements.push((sql.to_string(), params.to_vec()));
        Ok(Execution {
            affected: 1,
            ..Default::default()
        })
    }
}

#[test]
fn select_document_compiles_and_interprets() {
    let query = parse_str(
        r#"{"resource": "users", "where": {"age >=": 23, "name like": "%s%"}, "order": "id", "limit": 5}"#,
    )
    .unwrap();

    let statement = mysql(&query);
    assert_eq!(
        statement.sql,
        "SELECT * FROM `users` WHERE `age` >= ? AND `name` LIKE ? ORDER BY `id` ASC LIMIT 5"
    );
    assert_eq!(statement.params, vec![json!(23), json!("%s%")]);

    let result = fixtures().execute(query);
    assert_eq!(
        data(&result),
        json!([
            {"id": 1, "name": "Chris", "age": 23},
            {"id": 2, "name": "Swag", "age": 31}
        ])
    );
}

#[test]
fn update_scenario_through_the_builder() {
    let mut sql = SqlBackend::new(RecordingConnection::default(), SqlCompiler::mysql());
    let result = sql
        .query("users")
        .update(json!({"age": 24}))
        .where_("age >=", 23)
        .where_("name like", "%swag%")
        .execute();
    assert_eq!(result.affected, 1);
    assert_eq!(
        sql.connection().statements,
        vec![(
            "UPDATE `users` SET `age` = ? WHERE `age` >= ? AND `name` LIKE ?".to_string(),
            vec![json!(24), json!(23), json!("%swag%")]
        )]
    );

    let mut memory = fixtures();
    let result = memory
        .query("users")
        .update(json!({"age": 24}))
        .where_("age >=", 23)
        .where_("name like", "%swag%")
        .execute();
    assert_eq!(result.affected, 1);
    assert_eq!(memory.table("users").unwrap()[1]["age"], json!(24));
}

#[test]
fn joined_read_document() {
    let query = parse_str(
        r#"{
            "resource": "users",
            "fields": ["users.name", "posts.title AS post"],
            "joins": [{"resource": "posts", "on": "users.id = posts.user_id", "where": {"posts.published": true}}],
            "order": "title"
        }"#,
    )
    .unwrap();

    assert_eq!(
        mysql(&query).sql,
        "SELECT `users`.`name`, `posts`.`title` AS `post` FROM `users` INNER JOIN `posts` ON `users`.`id` = `posts`.`user_id` AND `posts`.`published` = TRUE ORDER BY `title` ASC"
    );

    let result = fixtures().execute(query);
    assert_eq!(
        data(&result),
        json!([
            {"name": "Chris", "post": "Hello"},
            {"name": "Swag", "post": "Swagger"}
        ])
    );
    assert_eq!(result.fields, vec!["name", "post"]);
}

#[test]
fn correlated_projected_subquery_document() {
    let query = parse_str(
        r#"{
            "resource": "users",
            "fields": ["name", {"alias": "posts", "query": {
                "resource": "posts",
                "fields": ["COUNT(*)"],
                "where": {"posts.user_id": {"$column": "users.id"}}
            }}]
        }"#,
    )
    .unwrap();

    let statement = mysql(&query);
    assert_eq!(
        statement.sql,
        "SELECT `name`, (SELECT COUNT(*) FROM `posts` WHERE `posts`.`user_id` = `users`.`id`) AS `posts` FROM `users`"
    );
    assert!(statement.params.is_empty());

    let result = fixtures().execute(query);
    assert_eq!(
        data(&result),
        json!([
            {"name": "Chris", "posts": 2},
            {"name": "Swag", "posts": 1},
            {"name": "Anna", "posts": 0}
        ])
    );
}

#[test]
fn create_document_in_both_backends() {
    let query = parse_str(r#"{"type": "create", "resource": "users", "data": {"name": "Dora", "age": 50}}"#)
        .unwrap();
    assert_eq!(query.query_type, QueryType::Create);

    let statement = mysql(&query);
    assert_eq!(statement.sql, "INSERT INTO `users` (`name`, `age`) VALUES (?, ?)");
    assert_eq!(statement.params, vec![json!("Dora"), json!(50)]);

    let mut memory = fixtures();
    let result = memory.execute(query);
    assert_eq!(result.affected, 1);
    assert_eq!(result.insert_id, Some(json!(4)));
    assert_eq!(memory.count("users", Default::default()), Ok(4));
}

#[test]
fn same_document_in_every_dialect() {
    let query = parse_str(
        r#"{"resource": "users", "fields": ["name"], "where": {"active": true}, "order": {"name": "desc"}, "limit": 5, "offset": 10}"#,
    )
    .unwrap();

    let compiled = |compiler: SqlCompiler| compiler.compile(&query).unwrap().unwrap().sql;
    assert_eq!(
        compiled(SqlCompiler::mysql()),
        "SELECT `name` FROM `users` WHERE `active` = TRUE ORDER BY `name` DESC LIMIT 5 OFFSET 10"
    );
    assert_eq!(
        compiled(SqlCompiler::sqlite()),
        "SELECT \"name\" FROM \"users\" WHERE \"active\" = 1 ORDER BY \"name\" DESC LIMIT 5 OFFSET 10"
    );
    assert_eq!(
        compiled(SqlCompiler::sqlserver()),
        "SELECT [name] FROM [users] WHERE [active] = 1 ORDER BY [name] DESC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
    );
}

#[test]
fn parse_errors_point_at_the_offending_value() {
    let err = parse_str(r#"{"resource": "users", "where": {"id": [[1]]}}"#).unwrap_err();
    assert_eq!(err.path, "$.where.id.0");

    let err = parse_str(r#"{"resource": "users", "limit": -1}"#).unwrap_err();
    assert_eq!(err.path, "$.limit");

    let err = parse_str(
        r#"{"resource": "users", "where": {"id": {"resource": "posts", "fields": ["id", "user_id"]}}}"#,
    )
    .unwrap_err();
    assert_eq!(err.path, "$.where.id");
}

fn temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("query_dispatcher_scenario_{}_{name}", std::process::id()));
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn configured_engine_compiles_and_serves_fixtures() {
    let fixtures = temp_file(
        "fixtures.json",
        r#"{"users": [{"id": 1, "name": "Chris"}, {"id": 2, "name": "Swag"}]}"#,
    );
    let config = temp_file(
        "config.json",
        &json!({
            "dialect": "sqlserver",
            "table_mapping": {"users": "tbl_users"},
            "fixtures": fixtures
        })
        .to_string(),
    );

    let config = EngineConfig::from_json_file(&config).unwrap();
    let query = parse_str(r#"{"resource": "users", "where": {"name": "swag"}, "limit": 1}"#).unwrap();

    let statement = config
        .compiler()
        .compile(&config.table_mapping.apply(query.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(statement.sql, "SELECT TOP 1 * FROM [tbl_users] WHERE [name] = ?");
    assert_eq!(statement.inline(), "SELECT TOP 1 * FROM [tbl_users] WHERE [name] = 'swag'");

    let mut memory = config.memory_backend().unwrap();
    let result = memory.execute(query);
    assert_eq!(data(&result), json!([{"id": 2, "name": "Swag"}]));
}
