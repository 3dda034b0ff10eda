//! 绑定到后端的链式查询构建器

use crate::ast::{Direction, Field, Filter, FilterValue, IntoRow, JoinBuilder, Query, Row};
use crate::backend::Backend;
use crate::result::QueryResult;

/// 构建中的 [`Query`], 并且知道由哪个后端执行
///
/// 所有修改方法都转发给查询; [`QueryBuilder::execute`] 把
/// 构建完成的查询交给后端。
pub struct QueryBuilder<'b, B: Backend + ?Sized> {
    backend: &'b mut B,
    query: Query,
}

impl<'b, B: Backend + ?Sized> QueryBuilder<'b, B> {
    pub fn new(backend: &'b mut B, resource: impl Into<String>) -> Self {
        Self::from_query(backend, Query::new(resource))
    }

    /// 绑定一个已有的查询, 例如模板的克隆
    pub fn from_query(backend: &'b mut B, query: Query) -> Self {
        Self { backend, query }
    }

    fn map(mut self, f: impl FnOnce(Query) -> Query) -> Self {
        self.query = f(self.query);
        self
    }

    pub fn fields<I, F>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.map(|q| q.fields(fields))
    }

    pub fn field(self, field: impl Into<Field>) -> Self {
        self.map(|q| q.field(field))
    }

    pub fn filter(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.map(|q| q.filter(key, value))
    }

    pub fn where_(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.map(|q| q.where_(key, value))
    }

    pub fn or_where(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.map(|q| q.or_where(key, value))
    }

    pub fn filter_map(self, filter: Filter) -> Self {
        self.map(|q| q.filter_map(filter))
    }

    pub fn order(self, spec: &str) -> Self {
        self.map(|q| q.order(spec))
    }

    pub fn order_by(self, field: impl Into<String>, direction: Direction) -> Self {
        self.map(|q| q.order_by(field, direction))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.map(|q| q.limit(limit))
    }

    pub fn offset(self, offset: u64) -> Self {
        self.map(|q| q.offset(offset))
    }

    pub fn distinct(self, distinct: bool) -> Self {
        self.map(|q| q.distinct(distinct))
    }

    pub fn join<F>(self, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        self.map(|q| q.join(resource, build))
    }

    pub fn left_join<F>(self, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        self.map(|q| q.left_join(resource, build))
    }

    pub fn right_join<F>(self, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        self.map(|q| q.right_join(resource, build))
    }

    pub fn create(self, data: impl IntoRow) -> Self {
        self.map(|q| q.create(data))
    }

    pub fn create_from(self, source: Query) -> Self {
        self.map(|q| q.create_from(source))
    }

    pub fn update(self, data: impl IntoRow) -> Self {
        self.map(|q| q.update(data))
    }

    pub fn delete(self) -> Self {
        self.map(Query::delete)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }

    pub fn execute(self) -> QueryResult {
        self.backend.execute(self.query)
    }

    /// [`QueryBuilder::execute`] 的别名
    pub fn run(self) -> QueryResult {
        self.execute()
    }

    /// 以 limit 1 执行并返回第一行 (如果有)
    pub fn first(self) -> Option<Row> {
        self.limit(1).execute().data.into_iter().next()
    }
}
