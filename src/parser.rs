//! JSON 查询文档的解析器
//!
//! ## 文档结构
//!
//! ```text
//! {
//!   "resource": "users",                      必填
//!   "type":     "read" | "create" | "update" | "delete"
//!   "fields":   ["name", "age AS years", {"alias": "posts", "query": {...}}]
//!   "where":    {"age >=": 23, "or": {"name": "chris", "name like": "%swag%"}}
//!   "order":    "id desc" | ["name", {"age": "desc"}]
//!   "limit":    5,
//!   "offset":   10,
//!   "distinct": true,
//!   "data":     {"name": "chris"},
//!   "joins":    [{"type": "left", "resource": "posts", "alias": "p",
//!                 "on": "users.id = p.user_id", "where": {...}}],
//!   "source":   {...}                          INSERT ... SELECT 的来源
//! }
//! ```
//!
//! ## 过滤值
//!
//! ```text
//! null / bool / number / string  → 标量 (null 变为 IS NULL)
//! [..]                           → 列表
//! {"$column": "users.id"}        → 列引用
//! {"resource": ..}               → 子查询 (恰好一个字段)
//! {..}                           → 嵌套分组 (在 "or" 键下以 OR 连接)
//! ```
//!
//! 错误携带出错值的 JSON 路径, 例如 `$.where.or.age >`。

use serde_json::{Map, Value};

use crate::ast::{
    Direction, Field, Filter, FilterValue, Join, JoinBuilder, JoinType, Query, QueryType, Subquery,
};
use crate::error::ParseError;
use crate::sorter::OrderSpec;

/// 列引用对象形式的键
pub const COLUMN_KEY: &str = "$column";

const QUERY_KEYS: &[&str] = &[
    "resource", "type", "fields", "where", "order", "limit", "offset", "distinct", "data", "joins",
    "source",
];

/// 解析查询文档
pub fn parse_query(document: &Value) -> Result<Query, ParseError> {
    Parser::new().query(document)
}

/// 从 JSON 文本解析查询文档
pub fn parse_str(input: &str) -> Result<Query, ParseError> {
    let document: Value =
        serde_json::from_str(input).map_err(|err| ParseError::new(err.to_string(), "$"))?;
    parse_query(&document)
}

struct Parser {
    /// 正在解析的值的路径, 用于错误信息
    path: Vec<String>,
}

impl Parser {
    fn new() -> Self {
        Self {
            path: vec!["$".to_string()],
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.path.join("."))
    }

    fn error_at(&mut self, segment: impl Into<String>, message: impl Into<String>) -> ParseError {
        self.path.push(segment.into());
        let err = self.error(message);
        self.path.pop();
        err
    }

    /// 在当前路径后追加 `segment` 再执行 `parse`
    fn nested<T>(
        &mut self,
        segment: impl Into<String>,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.path.push(segment.into());
        let result = parse(self);
        self.path.pop();
        result
    }

    fn object<'v>(&self, value: &'v Value) -> Result<&'v Map<String, Value>, ParseError> {
        value.as_object().ok_or_else(|| self.error("expected an object"))
    }

    fn string<'v>(&self, value: &'v Value) -> Result<&'v str, ParseError> {
        value.as_str().ok_or_else(|| self.error("expected a string"))
    }

    fn query(&mut self, document: &Value) -> Result<Query, ParseError> {
        let object = self.object(document)?;
        if let Some(key) = object.keys().find(|key| !QUERY_KEYS.contains(&key.as_str())) {
            return Err(self.error(format!("unknown key `{key}`")));
        }

        let resource = match object.get("resource") {
            Some(value) => self.nested("resource", |p| p.string(value).map(str::to_string))?,
            None => return Err(self.error("missing `resource`")),
        };
        let mut query = Query::new(resource);

        for (key, value) in object {
            match key.as_str() {
                "type" => query.query_type = self.nested("type", |p| p.query_type(value))?,
                "fields" => query.fields = self.nested("fields", |p| p.fields(value))?,
                "where" => query.filter = self.nested("where", |p| p.filter(value))?,
                "order" => query.order = self.nested("order", |p| p.order(value))?,
                "limit" => query.limit = Some(self.nested("limit", |p| p.count(value))?),
                "offset" => query.offset = self.nested("offset", |p| p.count(value))?,
                "distinct" => {
                    query.distinct = self.nested("distinct", |p| {
                        value.as_bool().ok_or_else(|| p.error("expected a boolean"))
                    })?
                }
                "data" => query.data = self.nested("data", |p| p.object(value).cloned())?,
                "joins" => query.joins = self.nested("joins", |p| p.joins(value))?,
                "source" => {
                    let source = self.nested("source", |p| p.query(value))?;
                    query.source = Some(Box::new(source));
                }
                _ => {}
            }
        }

        if query.source.is_some() && query.query_type != QueryType::Create {
            return Err(self.error("`source` is only valid for create"));
        }
        Ok(query)
    }

    fn query_type(&self, value: &Value) -> Result<QueryType, ParseError> {
        serde_json::from_value(value.clone())
            .map_err(|_| self.error("expected one of read, create, update, delete"))
    }

    fn count(&self, value: &Value) -> Result<u64, ParseError> {
        value
            .as_u64()
            .ok_or_else(|| self.error("expected a non-negative integer"))
    }

    fn fields(&mut self, value: &Value) -> Result<Vec<Field>, ParseError> {
        match value {
            Value::String(name) => Ok(vec![Field::parse(name)]),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.nested(i.to_string(), |p| p.field(item)))
                .collect(),
            _ => Err(self.error("expected a field name or an array of fields")),
        }
    }

    fn field(&mut self, value: &Value) -> Result<Field, ParseError> {
        match value {
            Value::String(name) => Ok(Field::parse(name)),
            Value::Object(object) => {
                let alias = match object.get("alias") {
                    Some(alias) => self.nested("alias", |p| p.string(alias).map(str::to_string))?,
                    None => return Err(self.error("computed field needs an `alias`")),
                };
                let sub = match object.get("query") {
                    Some(query) => self.nested("query", |p| p.subquery(query))?,
                    None => return Err(self.error("computed field needs a `query`")),
                };
                Ok(Field::subquery(sub, alias))
            }
            _ => Err(self.error("expected a field name or a computed field")),
        }
    }

    fn subquery(&mut self, value: &Value) -> Result<Subquery, ParseError> {
        let query = self.query(value)?;
        Subquery::new(query).map_err(|err| self.error(err.to_string()))
    }

    fn filter(&mut self, value: &Value) -> Result<Filter, ParseError> {
        let object = self.object(value)?;
        let mut filter = Filter::new();
        for (key, value) in object {
            let parsed = self.nested(key.as_str(), |p| p.filter_value(value))?;
            filter.insert(key.as_str(), parsed);
        }
        Ok(filter)
    }

    fn filter_value(&mut self, value: &Value) -> Result<FilterValue, ParseError> {
        match value {
            Value::Array(items) => {
                if let Some(i) = items.iter().position(|item| item.is_array() || item.is_object()) {
                    return Err(self.error_at(i.to_string(), "list members must be scalars"));
                }
                Ok(FilterValue::List(items.clone()))
            }
            Value::Object(object) if object.contains_key(COLUMN_KEY) => {
                let name = self.nested(COLUMN_KEY, |p| p.string(&object[COLUMN_KEY]).map(str::to_string))?;
                Ok(FilterValue::Column(name))
            }
            Value::Object(object) if object.contains_key("resource") => {
                Ok(FilterValue::Subquery(Box::new(self.subquery(value)?)))
            }
            Value::Object(_) => Ok(FilterValue::Group(self.filter(value)?)),
            scalar => Ok(FilterValue::from(scalar.clone())),
        }
    }

    fn order(&self, value: &Value) -> Result<Vec<(String, Direction)>, ParseError> {
        match value {
            Value::String(_) | Value::Array(_) | Value::Object(_) => {
                Ok(OrderSpec::from_json(value).into_inner())
            }
            _ => Err(self.error("expected a field name, an array or an object")),
        }
    }

    fn joins(&mut self, value: &Value) -> Result<Vec<Join>, ParseError> {
        let Value::Array(items) = value else {
            return Err(self.error("expected an array of joins"));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.nested(i.to_string(), |p| p.join(item)))
            .collect()
    }

    fn join(&mut self, value: &Value) -> Result<Join, ParseError> {
        let object = self.object(value)?;

        let join_type = match object.get("type") {
            Some(ty) => self.nested("type", |p| {
                serde_json::from_value::<JoinType>(ty.clone())
                    .map_err(|_| p.error("expected one of inner, left, right"))
            })?,
            None => JoinType::default(),
        };
        let resource = match object.get("resource") {
            Some(resource) => self.nested("resource", |p| p.string(resource).map(str::to_string))?,
            None => return Err(self.error("join needs a `resource`")),
        };

        let mut builder = JoinBuilder::new(join_type, &resource);
        if let Some(alias) = object.get("alias") {
            builder = builder.alias(self.nested("alias", |p| p.string(alias).map(str::to_string))?);
        }
        match object.get("on") {
            Some(Value::String(condition)) => builder = builder.on(condition.as_str()),
            Some(Value::Array(conditions)) => {
                for (i, condition) in conditions.iter().enumerate() {
                    let condition = self.nested(format!("on.{i}"), |p| p.string(condition).map(str::to_string))?;
                    builder = builder.on(condition);
                }
            }
            Some(_) => return Err(self.error_at("on", "expected a condition or an array of conditions")),
            None => {}
        }

        let mut join = builder.finish();
        if let Some(filter) = object.get("where") {
            join.filter = self.nested("where", |p| p.filter(filter))?;
        }
        Ok(join)
    }
}
