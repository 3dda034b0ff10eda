//! 与存储后端无关的查询模型
//!
//! 一个 [`Query`] 描述一次 CRUD 操作。它通过链式调用构建, 只交给 SQL 编译器
//! 或内存解释器其中之一执行一次; 需要作为模板反复执行时先克隆。
//!

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryError;

/// 一条记录: 字段名到值的有序映射
pub type Row = Map<String, Value>;

/// 查询执行的 CRUD 操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Create,
    #[default]
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// 投影列表中的一项
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// 列名、带表名限定的列 (`posts.id`)、`*`, 或 `COUNT(*)` 这样的原始表达式
    Name(String),
    Aliased { name: String, alias: String },
    /// 由标量子查询计算出的列
    Subquery { query: Box<Subquery>, alias: String },
}

impl Field {
    /// 解析 `"name"` 或 `"name AS alias"` (`AS` 不区分大小写)
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();
        match lower.rfind(" as ") {
            Some(pos) => {
                let name = raw[..pos].trim();
                let alias = raw[pos + 4..].trim();
                if name.is_empty() || alias.is_empty() {
                    Field::Name(raw.to_string())
                } else {
                    Field::Aliased {
                        name: name.to_string(),
                        alias: alias.to_string(),
                    }
                }
            }
            None => Field::Name(raw.to_string()),
        }
    }

    pub fn subquery(query: Subquery, alias: impl Into<String>) -> Self {
        Field::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    /// 该字段在结果行中使用的列名
    pub fn output_name(&self) -> &str {
        match self {
            Field::Name(name) if is_expression(name) => name,
            Field::Name(name) => unqualified(name),
            Field::Aliased { alias, .. } | Field::Subquery { alias, .. } => alias,
        }
    }

    /// 是否展开为所有列 (`*` 或 `table.*`)
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Field::Name(name) if name == "*" || name.ends_with(".*"))
    }
}

impl From<&str> for Field {
    fn from(raw: &str) -> Self {
        Field::parse(raw)
    }
}

impl From<String> for Field {
    fn from(raw: String) -> Self {
        Field::parse(&raw)
    }
}

/// 字段名是原始 SQL 表达式 (`COUNT(*)`) 而非列引用
pub fn is_expression(name: &str) -> bool {
    name.contains('(') || name.contains(char::is_whitespace)
}

/// 去掉表名限定: `posts.user_id` 变为 `user_id`
pub fn unqualified(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// 已校验恰好投影一个字段的查询, 可用作过滤值
/// 或计算列
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery(Query);

impl Subquery {
    pub fn new(query: Query) -> Result<Self, QueryError> {
        let single = match query.fields.as_slice() {
            [field] => !field.is_wildcard(),
            _ => false,
        };
        if !single {
            return Err(QueryError::SubqueryArity {
                resource: query.resource.clone(),
                fields: query.fields.len(),
            });
        }
        Ok(Subquery(query))
    }

    pub fn query(&self) -> &Query {
        &self.0
    }

    /// 可变访问, 用于保留投影的改写, 例如表名映射
    pub(crate) fn query_mut(&mut self) -> &mut Query {
        &mut self.0
    }

    pub fn into_query(self) -> Query {
        self.0
    }

    /// 唯一的投影字段
    pub fn column(&self) -> &Field {
        &self.0.fields[0]
    }
}

impl TryFrom<Query> for Subquery {
    type Error = QueryError;

    fn try_from(query: Query) -> Result<Self, Self::Error> {
        Subquery::new(query)
    }
}

/// 过滤条目的值部分
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Value),
    Null,
    /// 一组值; 成员本身可以为 null
    List(Vec<Value>),
    Subquery(Box<Subquery>),
    /// 嵌套的过滤映射。位于保留键 `or` 下时各条目以 OR 连接,
    /// 其它键下以 AND 连接
    Group(Filter),
    /// 对另一列的引用, 按名称比较, 永不参数化
    Column(String),
}

impl FilterValue {
    pub fn column(name: impl Into<String>) -> Self {
        FilterValue::Column(name.into())
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FilterValue::Null,
            Value::Array(items) => FilterValue::List(items),
            other => FilterValue::Scalar(other),
        }
    }
}

macro_rules! scalar_filter_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    FilterValue::Scalar(Value::from(value))
                }
            }
        )*
    };
}

scalar_filter_value!(&str, String, i32, i64, u32, u64, f64, bool);

impl<T: Into<Value>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FilterValue::Null)
    }
}

impl From<Subquery> for FilterValue {
    fn from(sub: Subquery) -> Self {
        FilterValue::Subquery(Box::new(sub))
    }
}

impl From<Filter> for FilterValue {
    fn from(filter: Filter) -> Self {
        FilterValue::Group(filter)
    }
}

/// 析取分组的保留键
pub const OR_KEY: &str = "or";

/// 过滤键到值的有序映射。插入已存在的键会原地替换其值
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    entries: IndexMap<String, FilterValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// [`Filter::insert`] 的链式形式
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 向 `or` 分组添加条目, 首次使用时创建该分组
    pub fn insert_or(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        let slot = self
            .entries
            .entry(OR_KEY.to_string())
            .or_insert_with(|| FilterValue::Group(Filter::new()));
        match slot {
            FilterValue::Group(group) => group.insert(key, value),
            other => {
                let mut group = Filter::new();
                group.insert(key, value);
                *other = FilterValue::Group(group);
            }
        }
    }

    /// 追加 `other` 的全部条目, 已存在的键被替换
    pub fn extend(&mut self, other: Filter) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 过滤条件是否真正有约束。空的嵌套分组不算
    pub fn has_conditions(&self) -> bool {
        self.entries.values().any(|value| match value {
            FilterValue::Group(group) => group.has_conditions(),
            _ => true,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FilterValue)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filter = Filter::new();
        for (key, value) in iter {
            filter.insert(key, value);
        }
        filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub resource: String,
    pub alias: Option<String>,
    /// 原始的 `left op right` 条件; 只含标识符, 永不参数化
    pub conditions: Vec<String>,
    /// ON 子句的参数化条件; 可以引用连接的任意一侧
    pub filter: Filter,
}

impl Join {
    /// 关联资源的引用名: 有别名用别名, 否则用资源名
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.resource)
    }
}

/// 传给 [`Query::join`] 闭包的构建器
#[derive(Debug, Clone)]
pub struct JoinBuilder {
    join: Join,
}

impl JoinBuilder {
    /// 接受 `"posts"`、`"posts p"` 或 `"posts AS p"`
    pub fn new(join_type: JoinType, resource: &str) -> Self {
        let parts: Vec<&str> = resource.split_whitespace().collect();
        let (resource, alias) = match parts.as_slice() {
            [name, kw, alias] if kw.eq_ignore_ascii_case("as") => (*name, Some(alias.to_string())),
            [name, alias] => (*name, Some(alias.to_string())),
            _ => (resource.trim(), None),
        };
        Self {
            join: Join {
                join_type,
                resource: resource.to_string(),
                alias,
                conditions: Vec::new(),
                filter: Filter::new(),
            },
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.join.alias = Some(alias.into());
        self
    }

    pub fn on(mut self, condition: impl Into<String>) -> Self {
        self.join.conditions.push(condition.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.join.filter.insert(key, value);
        self
    }

    pub fn where_(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter(key, value)
    }

    pub fn finish(self) -> Join {
        self.join
    }
}

/// 指代所有集合的资源名; 永远不能作为 update 或 delete 的目标
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub resource: String,
    pub query_type: QueryType,
    pub fields: Vec<Field>,
    pub filter: Filter,
    pub order: Vec<(String, Direction)>,
    /// `None` 和 `Some(0)` 都表示 "不限制"
    pub limit: Option<u64>,
    pub offset: u64,
    pub distinct: bool,
    pub data: Row,
    pub joins: Vec<Join>,
    /// `INSERT ... SELECT` 的数据来源
    pub source: Option<Box<Query>>,
}

impl Query {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// 替换投影列表
    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// 向投影列表追加一项
    pub fn field(mut self, field: impl Into<Field>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter.insert(key, value);
        self
    }

    pub fn where_(self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter(key, value)
    }

    /// 向析取的 `or` 分组添加条件
    pub fn or_where(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter.insert_or(key, value);
        self
    }

    /// 合并整个过滤映射, 与实体层传入属性时的做法一致
    pub fn filter_map(mut self, filter: Filter) -> Self {
        self.filter.extend(filter);
        self
    }

    /// 按 `"field"` 或 `"field desc"` 排序。未知方向视为升序
    pub fn order(self, spec: &str) -> Self {
        let (field, direction) = crate::lexer::split_key(spec);
        let direction = Direction::parse(direction).unwrap_or_default();
        self.order_by(field, direction)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn join<F>(self, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        self.add_join(JoinType::Inner, resource, build)
    }

    pub fn left_join<F>(self, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        self.add_join(JoinType::Left, resource, build)
    }

    pub fn right_join<F>(self, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        self.add_join(JoinType::Right, resource, build)
    }

    fn add_join<F>(mut self, join_type: JoinType, resource: &str, build: F) -> Self
    where
        F: FnOnce(JoinBuilder) -> JoinBuilder,
    {
        let join = build(JoinBuilder::new(join_type, resource)).finish();
        self.joins.push(join);
        self
    }

    pub fn push_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn create(mut self, data: impl IntoRow) -> Self {
        self.query_type = QueryType::Create;
        self.data = data.into_row();
        self
    }

    /// 用 `source` 的结果创建行 (`INSERT ... SELECT`)
    /// 本查询的字段指定目标列
    pub fn create_from(mut self, source: Query) -> Self {
        self.query_type = QueryType::Create;
        self.source = Some(Box::new(source));
        self
    }

    pub fn update(mut self, data: impl IntoRow) -> Self {
        self.query_type = QueryType::Update;
        self.data = data.into_row();
        self
    }

    pub fn delete(mut self) -> Self {
        self.query_type = QueryType::Delete;
        self
    }

    /// 作为窗口大小的 limit: `Some(0)` 折叠为 `None`
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit.filter(|&n| n > 0)
    }

    /// update 和 delete 只针对具体资源且过滤条件非空时执行
    pub fn is_guarded_noop(&self) -> bool {
        matches!(self.query_type, QueryType::Update | QueryType::Delete)
            && (self.resource == WILDCARD || !self.filter.has_conditions())
    }
}

/// 转换为写入的行数据
pub trait IntoRow {
    fn into_row(self) -> Row;
}

impl IntoRow for Row {
    fn into_row(self) -> Row {
        self
    }
}

/// 对象转换为其映射; 其它值变为空数据
impl IntoRow for Value {
    fn into_row(self) -> Row {
        match self {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> IntoRow for Vec<(K, V)> {
    fn into_row(self) -> Row {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}
