//! 存储后端: 通用的 [`Backend`] 接口及其 SQL 实现

use serde_json::Value;
use tracing::{debug, warn};

use crate::ast::{Filter, IntoRow, Query, QueryType, Row};
use crate::builder::QueryBuilder;
use crate::config::TableMapping;
use crate::error::{DbError, QueryError};
use crate::result::QueryResult;
use crate::sql_compiler::{CompiledStatement, SqlCompiler};

/// 在某种存储上执行查询
///
/// 实现者通过 [`QueryResult::error`] 报告所有失败。
/// 提供的包装方法对所有实现行为一致。
pub trait Backend {
    fn execute(&mut self, query: Query) -> QueryResult;

    /// 在本后端上开始一个针对 `resource` 的链式查询
    fn query(&mut self, resource: &str) -> QueryBuilder<'_, Self> {
        QueryBuilder::new(self, resource)
    }

    fn read(&mut self, resource: &str, filter: Filter) -> QueryResult {
        self.execute(Query::new(resource).filter_map(filter))
    }

    /// `resource` 中匹配 `filter` 的行数
    fn count(&mut self, resource: &str, filter: Filter) -> Result<u64, DbError> {
        let result = self.execute(
            Query::new(resource)
                .field("COUNT(*) AS count")
                .filter_map(filter),
        );
        if let Some(err) = result.error {
            return Err(err);
        }
        Ok(result
            .first()
            .and_then(|row| row.get("count"))
            .and_then(count_value)
            .unwrap_or(0))
    }

    fn create(&mut self, resource: &str, data: impl IntoRow) -> QueryResult {
        self.execute(Query::new(resource).create(data))
    }

    fn update(&mut self, resource: &str, filter: Filter, data: impl IntoRow) -> QueryResult {
        self.execute(Query::new(resource).filter_map(filter).update(data))
    }

    fn delete(&mut self, resource: &str, filter: Filter) -> QueryResult {
        self.execute(Query::new(resource).filter_map(filter).delete())
    }
}

/// 驱动返回的计数可能是数字, 也可能是数字字符串
fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 连接执行完一条语句后报告的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub rows: Vec<Row>,
    pub affected: u64,
    pub insert_id: Option<Value>,
}

/// 执行参数化 SQL 的数据库连接
pub trait Connection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Execution, DbError>;
}

/// 把查询编译为 SQL 并在 [`Connection`] 上执行的后端
pub struct SqlBackend<C> {
    connection: C,
    compiler: SqlCompiler,
    tables: TableMapping,
}

impl<C: Connection> SqlBackend<C> {
    pub fn new(connection: C, compiler: SqlCompiler) -> Self {
        Self {
            connection,
            compiler,
            tables: TableMapping::default(),
        }
    }

    pub fn with_table_mapping(mut self, tables: TableMapping) -> Self {
        self.tables = tables;
        self
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// 应用表名映射后编译 `query`, 不执行
    pub fn compile(&self, query: Query) -> Result<Option<CompiledStatement>, QueryError> {
        self.compiler.compile(&self.tables.apply(query))
    }
}

impl<C: Connection> Backend for SqlBackend<C> {
    fn execute(&mut self, query: Query) -> QueryResult {
        let query_type = query.query_type;
        let statement = match self.compile(query) {
            Ok(Some(statement)) => statement,
            Ok(None) => return QueryResult::affected(0),
            Err(err) => return QueryResult::failed(err),
        };

        debug!(sql = %statement.sql, "executing statement");
        match self.connection.execute(&statement.sql, &statement.params) {
            Ok(execution) => match query_type {
                QueryType::Read => QueryResult::rows(execution.rows),
                QueryType::Create | QueryType::Update | QueryType::Delete => {
                    QueryResult::affected(execution.affected).with_insert_id(execution.insert_id)
                }
            },
            Err(err) => {
                warn!(sql = %statement.sql, error = %err, "statement failed");
                QueryResult::failed(err)
            }
        }
    }
}
