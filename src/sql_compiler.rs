//! SQL 编译器: 把 [`Query`] 转换为特定方言的 SQL 文本
//! 以及有序的位置参数列表
//!
//! 文本和参数由同一个从左到右的写入器生成: `?` 追加到文本的同时,
//! 其值也追加到参数列表, 因此两者不会错位,
//! 子查询也不例外。

use sea_query::Values;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ast::{is_expression, Direction, Field, Filter, FilterValue, Join, Query, QueryType, WILDCARD};
use crate::dialect::{MySql, Placement, SqlDialect, SqlServer, Sqlite, StatementKind, Window};
use crate::error::QueryError;
use crate::lexer::{is_or_key, resolve_key, Lexer};
use crate::token::{Operator, TokenKind};

/// SQL 文本, 每个 `?` 占位符对应一个参数, 按文本顺序排列
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledStatement {
    /// 引号内的标识符和字面量之外的 `?` 占位符个数
    pub fn placeholders(&self) -> usize {
        placeholder_positions(&self.sql).len()
    }

    /// 转换为 sea-query 的值, 供绑定这种类型的驱动使用
    pub fn values(&self) -> Values {
        Values(self.params.iter().map(to_sea_value).collect())
    }

    /// 把所有参数就地渲染后的语句。仅用于日志
    pub fn inline(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut last = 0;
        for (pos, param) in placeholder_positions(&self.sql).into_iter().zip(&self.params) {
            out.push_str(&self.sql[last..pos]);
            out.push_str(&render_literal(param));
            last = pos + 1;
        }
        out.push_str(&self.sql[last..]);
        out
    }
}

fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut closing: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match closing {
            Some(end) if c == end => closing = None,
            Some(_) => {}
            None => match c {
                '`' | '"' | '\'' => closing = Some(c),
                '[' => closing = Some(']'),
                '?' => positions.push(i),
                _ => {}
            },
        }
    }
    positions
}

fn to_sea_value(value: &Value) -> sea_query::Value {
    match value {
        Value::Null => sea_query::Value::String(None),
        Value::Bool(b) => sea_query::Value::Bool(Some(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                sea_query::Value::BigInt(Some(i))
            } else if let Some(u) = n.as_u64() {
                sea_query::Value::BigUnsigned(Some(u))
            } else {
                sea_query::Value::Double(n.as_f64())
            }
        }
        Value::String(s) => sea_query::Value::String(Some(Box::new(s.clone()))),
        // 嵌套的数据以 JSON 文本存储
        other => sea_query::Value::String(Some(Box::new(other.to_string()))),
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn is_condition_keyword(word: &str) -> bool {
    ["and", "or", "not", "is", "null", "true", "false"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

/// 针对一种 SQL 方言编译查询
#[derive(Debug)]
pub struct SqlCompiler {
    dialect: Box<dyn SqlDialect>,
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::mysql()
    }
}

impl SqlCompiler {
    pub fn new(dialect: impl SqlDialect + 'static) -> Self {
        Self::from_boxed(Box::new(dialect))
    }

    pub fn from_boxed(dialect: Box<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    pub fn mysql() -> Self {
        Self::new(MySql)
    }

    pub fn sqlserver() -> Self {
        Self::new(SqlServer)
    }

    pub fn sqlite() -> Self {
        Self::new(Sqlite)
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// 编译 `query`
    ///
    /// update 或 delete 的目标是通配资源或没有任何条件时
    /// 返回 `Ok(None)`: 永远不会生成这样的语句。
    pub fn compile(&self, query: &Query) -> Result<Option<CompiledStatement>, QueryError> {
        let mut writer = SqlWriter::new(self.dialect.as_ref());
        match query.query_type {
            QueryType::Read => writer.select(query)?,
            QueryType::Create => writer.insert(query)?,
            QueryType::Update | QueryType::Delete if query.is_guarded_noop() => {
                warn!(
                    resource = %query.resource,
                    kind = ?query.query_type,
                    "refusing to compile statement without conditions"
                );
                return Ok(None);
            }
            QueryType::Update => writer.update(query)?,
            QueryType::Delete => writer.delete(query)?,
        }

        let statement = writer.finish();
        debug!(
            dialect = self.dialect.name(),
            sql = %statement.sql,
            params = statement.params.len(),
            "compiled statement"
        );
        Ok(Some(statement))
    }
}

struct SqlWriter<'d> {
    dialect: &'d dyn SqlDialect,
    sql: String,
    params: Vec<Value>,
}

impl<'d> SqlWriter<'d> {
    fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn finish(self) -> CompiledStatement {
        CompiledStatement {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn param(&mut self, value: &Value) {
        self.sql.push('?');
        self.params.push(value.clone());
    }

    /// 过滤操作数: null 和布尔值内联, 其它值绑定为参数
    fn operand(&mut self, value: &Value) {
        match value {
            Value::Null => self.push("NULL"),
            Value::Bool(b) => self.push(self.dialect.boolean_literal(*b)),
            other => self.param(other),
        }
    }

    /// insert 或 update 的数据值: 只有 null 内联
    fn payload(&mut self, value: &Value) {
        match value {
            Value::Null => self.push("NULL"),
            other => self.param(other),
        }
    }

    /// 引用点号路径的每一段; 原始表达式原样输出
    fn quote_path(&self, name: &str) -> String {
        if is_expression(name) {
            return name.to_string();
        }
        name.split('.')
            .map(|segment| {
                if segment == WILDCARD {
                    segment.to_string()
                } else {
                    self.dialect.quote_identifier(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.quote_path(name);
        self.push(&quoted);
    }

    fn alias(&mut self, alias: &str) {
        let quoted = self.dialect.quote_identifier(alias);
        self.push(" AS ");
        self.push(&quoted);
    }

    fn select(&mut self, query: &Query) -> Result<(), QueryError> {
        let window = Window::new(query.limit, query.offset);
        let placement = self.dialect.statement_order(StatementKind::Select, window);
        let limit = self
            .dialect
            .limit_clause(StatementKind::Select, window, !query.order.is_empty());

        self.push("SELECT ");
        if query.distinct {
            self.push("DISTINCT ");
        }
        if let (Placement::AfterVerb, Some(clause)) = (placement, &limit) {
            self.push(clause);
            self.push(" ");
        }
        self.fields(&query.fields)?;
        self.push(" FROM ");
        self.ident(&query.resource);
        self.joins(&query.joins)?;
        self.where_clause(&query.filter)?;
        self.order_by(&query.order);
        if let (Placement::End, Some(clause)) = (placement, &limit) {
            self.push(" ");
            self.push(clause);
        }
        Ok(())
    }

    fn fields(&mut self, fields: &[Field]) -> Result<(), QueryError> {
        if fields.is_empty() {
            self.push(WILDCARD);
            return Ok(());
        }
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match field {
                Field::Name(name) => self.ident(name),
                Field::Aliased { name, alias } => {
                    self.ident(name);
                    self.alias(alias);
                }
                Field::Subquery { query, alias } => {
                    self.push("(");
                    self.select(query.query())?;
                    self.push(")");
                    self.alias(alias);
                }
            }
        }
        Ok(())
    }

    fn joins(&mut self, joins: &[Join]) -> Result<(), QueryError> {
        for join in joins {
            self.push(" ");
            self.push(join.join_type.as_sql());
            self.push(" ");
            self.ident(&join.resource);
            if let Some(alias) = &join.alias {
                self.alias(alias);
            }
            self.push(" ON ");

            let mut written = false;
            for raw in &join.conditions {
                if written {
                    self.push(" AND ");
                }
                self.raw_condition(raw)?;
                written = true;
            }
            if join.filter.has_conditions() {
                if written {
                    self.push(" AND ");
                }
                self.conditions(&join.filter, false)?;
                written = true;
            }
            if !written {
                self.push("1 = 1");
            }
        }
        Ok(())
    }

    /// 重新输出原始的 `left op right` 条件, 并为标识符加引号
    ///
    /// 只接受标识符、字面量、比较运算符以及关键字
    /// `AND OR NOT IS NULL TRUE FALSE`, 因此原始条件永远不会
    /// 引入没有参数的占位符。
    fn raw_condition(&mut self, raw: &str) -> Result<(), QueryError> {
        let parts = Lexer::new(raw)
            .map(|token| match token.kind {
                TokenKind::Identifier(name) => Ok(self.quote_path(name)),
                TokenKind::String(text) => Ok(quote_literal(text)),
                TokenKind::Number(n) => Ok(n.to_string()),
                TokenKind::Operator(op) => Ok(op.as_sql().to_string()),
                TokenKind::Other(word) if is_condition_keyword(word) => Ok(word.to_ascii_uppercase()),
                TokenKind::Other(_) => Err(QueryError::InvalidJoinCondition(raw.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.push(&parts.join(" "));
        Ok(())
    }

    fn where_clause(&mut self, filter: &Filter) -> Result<(), QueryError> {
        if filter.has_conditions() {
            self.push(" WHERE ");
            self.conditions(filter, false)?;
        }
        Ok(())
    }

    /// 写出 `filter` 的各条目, 以 AND 连接, `disjunctive` 时以 OR 连接。
    /// 调用方保证过滤条件至少有一个条件
    fn conditions(&mut self, filter: &Filter, disjunctive: bool) -> Result<(), QueryError> {
        let glue = if disjunctive { " OR " } else { " AND " };
        let mut written = false;
        for (key, value) in filter.iter() {
            if let FilterValue::Group(group) = value {
                if !group.has_conditions() {
                    continue;
                }
            }
            if written {
                self.push(glue);
            }
            self.condition(key, value, disjunctive)?;
            written = true;
        }
        Ok(())
    }

    fn comparison(&mut self, field: &str, op: Operator) {
        self.ident(field);
        self.push(" ");
        self.push(op.as_sql());
        self.push(" ");
    }

    fn condition(&mut self, key: &str, value: &FilterValue, disjunctive: bool) -> Result<(), QueryError> {
        let (field, op) = resolve_key(key, value);
        match value {
            FilterValue::Group(group) => {
                self.push("(");
                self.conditions(group, is_or_key(key))?;
                self.push(")");
            }
            FilterValue::Null => {
                self.comparison(field, op);
                self.push(if op.takes_list() { "(NULL)" } else { "NULL" });
            }
            FilterValue::Scalar(expected) => {
                self.comparison(field, op);
                if op.takes_list() {
                    self.push("(");
                    self.operand(expected);
                    self.push(")");
                } else {
                    self.operand(expected);
                }
            }
            FilterValue::Column(name) => {
                self.comparison(field, op);
                let quoted = self.quote_path(name);
                if op.takes_list() {
                    self.push(&format!("({quoted})"));
                } else {
                    self.push(&quoted);
                }
            }
            FilterValue::List(items) => self.list(field, op, items, disjunctive),
            FilterValue::Subquery(sub) => {
                self.comparison(field, op);
                self.push("(");
                self.select(sub.query())?;
                self.push(")");
            }
        }
        Ok(())
    }

    fn list(&mut self, field: &str, op: Operator, items: &[Value], disjunctive: bool) {
        if op.takes_list() {
            if items.is_empty() {
                self.push(if op == Operator::In { "1 = 0" } else { "1 = 1" });
                return;
            }
            self.comparison(field, op);
            self.push("(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.operand(item);
            }
            self.push(")");
            return;
        }

        // 逐元素展开, 与过滤器的求值方式一致
        if items.is_empty() {
            self.push(if disjunctive { "1 = 0" } else { "1 = 1" });
            return;
        }
        let glue = if disjunctive { " OR " } else { " AND " };
        self.push("(");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(glue);
            }
            self.comparison(field, op);
            self.operand(item);
        }
        self.push(")");
    }

    fn order_by(&mut self, order: &[(String, Direction)]) {
        if order.is_empty() {
            return;
        }
        self.push(" ORDER BY ");
        for (i, (field, direction)) in order.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(field);
            self.push(" ");
            self.push(direction.as_sql());
        }
    }

    fn insert(&mut self, query: &Query) -> Result<(), QueryError> {
        self.push("INSERT INTO ");
        self.ident(&query.resource);

        if let Some(source) = &query.source {
            if !query.fields.is_empty() {
                self.push(" (");
                for (i, field) in query.fields.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.ident(field.output_name());
                }
                self.push(")");
            }
            self.push(" ");
            return self.select(source);
        }

        if query.data.is_empty() {
            return Err(QueryError::EmptyPayload(query.resource.clone()));
        }
        self.push(" (");
        for (i, column) in query.data.keys().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column);
        }
        self.push(") VALUES (");
        for (i, value) in query.data.values().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.payload(value);
        }
        self.push(")");
        Ok(())
    }

    /// update 或 delete 的 limit; offset 对它们不适用
    fn write_limit(&self, kind: StatementKind, query: &Query) -> (Placement, Option<String>) {
        let window = Window::new(query.limit, 0);
        (
            self.dialect.statement_order(kind, window),
            self.dialect.limit_clause(kind, window, false),
        )
    }

    fn update(&mut self, query: &Query) -> Result<(), QueryError> {
        if query.data.is_empty() {
            return Err(QueryError::EmptyPayload(query.resource.clone()));
        }
        let (placement, limit) = self.write_limit(StatementKind::Update, query);

        self.push("UPDATE ");
        if let (Placement::AfterVerb, Some(clause)) = (placement, &limit) {
            self.push(clause);
            self.push(" ");
        }
        self.ident(&query.resource);
        self.push(" SET ");
        for (i, (column, value)) in query.data.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column);
            self.push(" = ");
            self.payload(value);
        }
        self.where_clause(&query.filter)?;
        if let (Placement::End, Some(clause)) = (placement, &limit) {
            self.push(" ");
            self.push(clause);
        }
        Ok(())
    }

    fn delete(&mut self, query: &Query) -> Result<(), QueryError> {
        let (placement, limit) = self.write_limit(StatementKind::Delete, query);

        self.push("DELETE ");
        if let (Placement::AfterVerb, Some(clause)) = (placement, &limit) {
            self.push(clause);
            self.push(" ");
        }
        self.push("FROM ");
        self.ident(&query.resource);
        self.where_clause(&query.filter)?;
        if let (Placement::End, Some(clause)) = (placement, &limit) {
            self.push(" ");
            self.push(clause);
        }
        Ok(())
    }
}
