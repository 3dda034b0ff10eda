use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::hint::black_box;

use query_dispatcher::ast::{Filter, Query, Row, Subquery};
use query_dispatcher::filterer::Filterer;
use query_dispatcher::lexer::Lexer;
use query_dispatcher::parser::parse_str;
use query_dispatcher::sorter::sort;
use query_dispatcher::sql_compiler::SqlCompiler;

fn queries() -> Vec<(&'static str, Query)> {
    let posts = Subquery::new(Query::new("posts").fields(["user_id"]).where_("published", true))
        .expect("single-field subquery");

    vec![
        ("simple", Query::new("users").where_("id", 1)),
        (
            "medium",
            Query::new("users")
                .where_("age >=", 23)
                .where_("name like", "%test%")
                .where_("status in", vec!["active", "pending", "review"])
                .order("id desc")
                .limit(20),
        ),
        (
            "complex",
            Query::new("users")
                .fields(["users.id", "users.name", "orders.total"])
                .left_join("orders", |j| j.on("users.id = orders.user_id"))
                .where_("id in", posts)
                .filter(
                    "or",
                    Filter::new()
                        .with("age <", 18)
                        .with("age >", 65)
                        .with("role", "admin"),
                )
                .where_("deleted_at", Value::Null)
                .order("name asc")
                .order("id desc")
                .limit(10)
                .offset(30),
        ),
    ]
}

fn rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            let row = json!({
                "id": i,
                "name": format!("user{}", count - i),
                "age": 18 + (i * 7) % 60,
                "status": if i % 3 == 0 { "active" } else { "pending" },
            });
            row.as_object().cloned().unwrap_or_default()
        })
        .collect()
}

// 每个查询在每种方言下的编译性能
fn benchmark_sql_compiler(c: &mut Criterion) {
    let compilers = [
        ("mysql", SqlCompiler::mysql()),
        ("sqlserver", SqlCompiler::sqlserver()),
        ("sqlite", SqlCompiler::sqlite()),
    ];

    let mut group = c.benchmark_group("sql_compiler_performance");
    for (name, query) in queries() {
        for (dialect, compiler) in &compilers {
            group.bench_with_input(BenchmarkId::new(*dialect, name), &query, |b, query| {
                b.iter(|| match compiler.compile(black_box(query)) {
                    Ok(statement) => black_box(statement),
                    Err(err) => panic!("compile failed: {err}"),
                })
            });
        }
    }
    group.finish();
}

fn benchmark_join_lexer(c: &mut Criterion) {
    let conditions = [
        ("simple", "users.id = posts.user_id"),
        ("literal", "posts.status != 'draft'"),
        ("null", "posts.deleted_at IS NOT NULL"),
    ];

    let mut group = c.benchmark_group("join_lexer_performance");
    for (name, raw) in conditions {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &raw, |b, &raw| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(raw)).collect();
                black_box(tokens)
            })
        });
    }
    group.finish();
}

fn benchmark_filterer(c: &mut Criterion) {
    let filter = Filter::new()
        .with("age >=", 30)
        .with("status in", vec!["active", "review"])
        .with("name like", "user1%");

    let mut group = c.benchmark_group("filterer_performance");
    for size in [100, 1_000, 10_000] {
        let data = rows(size);
        group.bench_with_input(BenchmarkId::new("filter", size), &data, |b, data| {
            b.iter(|| match Filterer::new().filter(data.clone(), black_box(&filter)) {
                Ok(rows) => black_box(rows),
                Err(err) => panic!("filter failed: {err}"),
            })
        });
    }
    group.finish();
}

fn benchmark_sorter(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorter_performance");
    for size in [100, 1_000, 10_000] {
        let data = rows(size);
        group.bench_with_input(BenchmarkId::new("natural_sort", size), &data, |b, data| {
            b.iter(|| black_box(sort(data.clone(), vec!["status", "name"])))
        });
    }
    group.finish();
}

// JSON 文档 -> Query -> SQL 的完整流程
fn benchmark_end_to_end(c: &mut Criterion) {
    let documents = [
        ("simple", r#"{"type": "read", "resource": "users", "where": {"id": 1}}"#),
        (
            "complex",
            r#"{"type": "read", "resource": "users", "fields": ["id", "name"],
                "where": {"age >=": 23, "or": {"role": "admin", "status in": ["a", "b"]}},
                "order": "name desc", "limit": 5}"#,
        ),
    ];

    let compiler = SqlCompiler::mysql();
    let mut group = c.benchmark_group("end_to_end_performance");
    for (name, document) in documents {
        group.bench_with_input(BenchmarkId::new("full_pipeline", name), &document, |b, &document| {
            b.iter(|| {
                let query = parse_str(black_box(document)).expect("document should parse");
                let statement = compiler.compile(&query).expect("query should compile");
                black_box(statement)
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_sql_compiler,
    benchmark_join_lexer,
    benchmark_filterer,
    benchmark_sorter,
    benchmark_end_to_end
);
criterion_main!(benches);
