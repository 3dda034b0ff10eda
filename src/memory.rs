//! 进程内后端, 每个资源保存为一个行向量
//!
//! 读操作走解释器, 写操作走过滤器, 因此测试可以用它替换
//! SQL 后端并观察到相同的结果。

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ast::{Query, QueryType, Row};
use crate::backend::Backend;
use crate::error::QueryError;
use crate::filterer::{Filterer, RowSource};
use crate::interpreter::interpret;
use crate::result::QueryResult;

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<Row>,
    /// 下一个自动分配的 `id`
    next_id: u64,
}

impl Table {
    fn new(rows: Vec<Row>) -> Self {
        let next_id = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_u64))
            .max()
            .map_or(1, |max| max.saturating_add(1));
        Self { rows, next_id }
    }

    /// 追加一行, 没有 `id` 时自动分配, 返回该行的 id
    fn push(&mut self, row: Row) -> Value {
        if let Some(id) = row.get("id").filter(|id| !id.is_null()).cloned() {
            if let Some(n) = id.as_u64() {
                self.next_id = self.next_id.max(n.saturating_add(1));
            }
            self.rows.push(row);
            return id;
        }

        let id = Value::from(self.next_id);
        self.next_id += 1;

        let mut stored = Row::new();
        stored.insert("id".to_string(), id.clone());
        for (key, value) in row {
            if key != "id" {
                stored.insert(key, value);
            }
        }
        self.rows.push(stored);
        id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: IndexMap<String, Table>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, resource: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_table(resource, rows);
        self
    }

    /// 添加或替换一个资源
    pub fn insert_table(&mut self, resource: impl Into<String>, rows: Vec<Row>) {
        self.tables.insert(resource.into(), Table::new(rows));
    }

    pub fn table(&self, resource: &str) -> Option<&[Row]> {
        self.tables.get(resource).map(|table| table.rows.as_slice())
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    fn existing_rows(&self, resource: &str) -> Result<Vec<Row>, QueryError> {
        self.table(resource)
            .map(<[Row]>::to_vec)
            .ok_or_else(|| QueryError::UnknownResource(resource.to_string()))
    }

    fn replace_rows(&mut self, resource: &str, rows: Vec<Row>) {
        if let Some(table) = self.tables.get_mut(resource) {
            table.rows = rows;
        }
    }

    fn run(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        match query.query_type {
            QueryType::Read => Ok(QueryResult::rows(interpret(query, &*self)?)),
            QueryType::Create => self.insert_rows(query),
            QueryType::Update | QueryType::Delete if query.is_guarded_noop() => {
                warn!(
                    resource = %query.resource,
                    kind = ?query.query_type,
                    "refusing to run statement without conditions"
                );
                Ok(QueryResult::affected(0))
            }
            QueryType::Update => self.update_rows(query),
            QueryType::Delete => self.delete_rows(query),
        }
    }

    fn insert_rows(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        let rows = match &query.source {
            Some(source) => {
                let selected = interpret(source, &*self)?;
                if query.fields.is_empty() {
                    selected
                } else {
                    // 目标列按位置取查询结果的值
                    selected
                        .into_iter()
                        .map(|row| {
                            query
                                .fields
                                .iter()
                                .map(|field| field.output_name().to_string())
                                .zip(row.into_iter().map(|(_, value)| value))
                                .collect()
                        })
                        .collect()
                }
            }
            None if query.data.is_empty() => {
                return Err(QueryError::EmptyPayload(query.resource.clone()));
            }
            None => vec![query.data.clone()],
        };

        let table = self
            .tables
            .entry(query.resource.clone())
            .or_insert_with(|| Table::new(Vec::new()));
        let affected = rows.len() as u64;
        let mut insert_id = None;
        for row in rows {
            insert_id = Some(table.push(row));
        }
        debug!(resource = %query.resource, affected, "inserted rows");
        Ok(QueryResult::affected(affected).with_insert_id(insert_id))
    }

    fn update_rows(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        if query.data.is_empty() {
            return Err(QueryError::EmptyPayload(query.resource.clone()));
        }
        let rows = self.existing_rows(&query.resource)?;

        let mut affected = 0u64;
        let updated = Filterer::with_source(&*self).map(
            rows,
            &query.filter,
            |row| {
                for (key, value) in &query.data {
                    row.insert(key.clone(), value.clone());
                }
                affected += 1;
            },
            row_limit(query),
        )?;

        self.replace_rows(&query.resource, updated);
        Ok(QueryResult::affected(affected))
    }

    fn delete_rows(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        let rows = self.existing_rows(&query.resource)?;
        let before = rows.len();

        let kept = Filterer::with_source(&*self).reject(rows, &query.filter, row_limit(query))?;

        let affected = (before - kept.len()) as u64;
        self.replace_rows(&query.resource, kept);
        Ok(QueryResult::affected(affected))
    }
}

fn row_limit(query: &Query) -> Option<usize> {
    query
        .effective_limit()
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

impl RowSource for MemoryBackend {
    fn rows(&self, resource: &str) -> Option<&[Row]> {
        self.table(resource)
    }
}

impl Backend for MemoryBackend {
    fn execute(&mut self, query: Query) -> QueryResult {
        self.run(&query).unwrap_or_else(|err| {
            debug!(resource = %query.resource, error = %err, "query failed");
            QueryResult::failed(err)
        })
    }
}
