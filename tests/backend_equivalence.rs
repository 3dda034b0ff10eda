//! 同一组过滤映射分别交给两个后端执行: 内存后端选出的行
//! 必须与编译出的 WHERE 子句选出的行完全一致。

use query_dispatcher::ast::{Filter, FilterValue, Query, Row};
use query_dispatcher::backend::{Backend, Connection, Execution, SqlBackend};
use query_dispatcher::error::DbError;
use query_dispatcher::memory::MemoryBackend;
use query_dispatcher::sql_compiler::SqlCompiler;
use serde_json::{json, Value};

fn users() -> Vec<Row> {
    json!([
        {"id": 1, "name": "Chris", "age": 23, "city": "Berlin"},
        {"id": 2, "name": "Swag", "age": 31, "city": "Paris"},
        {"id": 3, "name": "Anna", "age": 19, "city": null},
        {"id": 4, "name": "chris", "age": 40, "city": "berlin"}
    ])
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect()
}

fn memory() -> MemoryBackend {
    MemoryBackend::new().with_table("users", users())
}

/// 记录每条语句, 不返回任何行
#[derive(Default)]
struct RecordingConnection {
    statements: Vec<(String, Vec<Value>)>,
}

impl Connection for RecordingConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Execution, DbError> {
        self.statements.push((sql.to_string(), params.to_vec()));
        Ok(Execution::default())
    }
}

fn sql_backend() -> SqlBackend<RecordingConnection> {
    SqlBackend::new(RecordingConnection::default(), SqlCompiler::mysql())
}

fn ids(rows: &[Row]) -> Vec<u64> {
    rows.iter().map(|row| row["id"].as_u64().unwrap()).collect()
}

struct Case {
    filter: Filter,
    where_clause: &'static str,
    params: Vec<Value>,
    ids: Vec<u64>,
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            filter: Filter::new().with("name", "chris"),
            where_clause: "`name` = ?",
            params: vec![json!("chris")],
            ids: vec![1, 4],
        },
        Case {
            filter: Filter::new().with("name !=", "Swag"),
            where_clause: "`name` != ?",
            params: vec![json!("Swag")],
            ids: vec![1, 3, 4],
        },
        Case {
            filter: Filter::new().with("age in", vec![19, 40]),
            where_clause: "`age` IN (?, ?)",
            params: vec![json!(19), json!(40)],
            ids: vec![3, 4],
        },
        Case {
            filter: Filter::new().with("age", vec![19, 40]),
            where_clause: "`age` IN (?, ?)",
            params: vec![json!(19), json!(40)],
            ids: vec![3, 4],
        },
        Case {
            filter: Filter::new().with("age not in", vec![19, 40]),
            where_clause: "`age` NOT IN (?, ?)",
            params: vec![json!(19), json!(40)],
            ids: vec![1, 2],
        },
        Case {
            filter: Filter::new().with("city like", "%ERL%"),
            where_clause: "`city` LIKE ?",
            params: vec![json!("%ERL%")],
            ids: vec![1, 4],
        },
        Case {
            filter: Filter::new().with("city not like", "b%"),
            where_clause: "`city` NOT LIKE ?",
            params: vec![json!("b%")],
            ids: vec![2],
        },
        Case {
            filter: Filter::new().with("city", FilterValue::Null),
            where_clause: "`city` IS NULL",
            params: vec![],
            ids: vec![3],
        },
        Case {
            filter: Filter::new().with("city not in", json!(["Paris", null])),
            where_clause: "`city` NOT IN (?, NULL)",
            params: vec![json!("Paris")],
            ids: vec![],
        },
        Case {
            filter: Filter::new().with("name in", Vec::<Value>::new()),
            where_clause: "1 = 0",
            params: vec![],
            ids: vec![],
        },
        Case {
            filter: Filter::new()
                .with("name like", "%a%")
                .with("or", Filter::new().with("age <", 20).with("city", "paris")),
            where_clause: "`name` LIKE ? AND (`age` < ? OR `city` = ?)",
            params: vec![json!("%a%"), json!(20), json!("paris")],
            ids: vec![2, 3],
        },
    ]
}

#[test]
fn filters_select_the_same_rows_in_both_backends() {
    for case in cases() {
        let mut memory = memory();
        let result = memory.read("users", case.filter.clone());
        assert!(result.is_ok(), "{:?}: {:?}", case.filter, result.error);
        assert_eq!(ids(&result.data), case.ids, "memory rows for {:?}", case.filter);

        let mut sql = sql_backend();
        sql.read("users", case.filter.clone());
        let (text, params) = &sql.connection().statements[0];
        assert_eq!(
            text,
            &format!("SELECT * FROM `users` WHERE {}", case.where_clause),
            "sql for {:?}",
            case.filter
        );
        assert_eq!(params, &case.params);
    }
}

#[test]
fn safety_refusal_is_identical() {
    let refused = [
        Query::new("users").delete(),
        Query::new("*").where_("id", 1).delete(),
        Query::new("users").update(json!({"age": 1})),
        Query::new("*").where_("id", 1).update(json!({"age": 1})),
    ];

    for query in refused {
        let mut memory = memory();
        let mut sql = sql_backend();

        let in_memory = memory.execute(query.clone());
        let in_sql = sql.execute(query.clone());

        assert_eq!(in_memory, in_sql, "{query:?}");
        assert_eq!(in_memory.affected, 0);
        assert_eq!(memory.table("users").unwrap(), users().as_slice());
        assert!(sql.connection().statements.is_empty());
    }
}

#[test]
fn mutations_affect_the_rows_the_statement_targets() {
    let mut memory = memory();
    let result = memory.update("users", Filter::new().with("name", "CHRIS"), json!({"city": "Rome"}));
    assert_eq!(result.affected, 2);
    assert_eq!(
        memory.count("users", Filter::new().with("city", "rome")),
        Ok(2)
    );

    let mut sql = sql_backend();
    sql.update("users", Filter::new().with("name", "CHRIS"), json!({"city": "Rome"}));
    assert_eq!(
        sql.connection().statements[0],
        (
            "UPDATE `users` SET `city` = ? WHERE `name` = ?".to_string(),
            vec![json!("Rome"), json!("CHRIS")]
        )
    );

    let result = memory.delete("users", Filter::new().with("city", "rome"));
    assert_eq!(result.affected, 2);
    assert_eq!(ids(memory.table("users").unwrap()), vec![2, 3]);
}

#[test]
fn joined_reads_keep_same_named_columns_apart() {
    let posts: Vec<Row> = json!([
        {"id": 10, "user_id": 1, "title": "Hello"},
        {"id": 11, "user_id": 2, "title": "Swagger"}
    ])
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect();

    let query = Query::new("users")
        .fields(["users.name", "posts.title"])
        .join("posts", |j| j.on("users.id = posts.user_id").where_("users.age >", 20))
        .where_("users.id", 2);

    let mut sql = sql_backend();
    sql.execute(query.clone());
    assert_eq!(
        sql.connection().statements[0],
        (
            "SELECT `users`.`name`, `posts`.`title` FROM `users` INNER JOIN `posts` ON `users`.`id` = `posts`.`user_id` AND `users`.`age` > ? WHERE `users`.`id` = ?".to_string(),
            vec![json!(20), json!(2)]
        )
    );

    let mut memory = memory().with_table("posts", posts);
    let result = memory.execute(query);
    assert_eq!(
        Value::Array(result.data.into_iter().map(Value::Object).collect()),
        json!([{"name": "Swag", "title": "Swagger"}])
    );
}
