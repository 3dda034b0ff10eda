//! 直接在内存行上解释执行读查询
//!
//! 求值顺序遵循 SQL 子句顺序: 连接、过滤、投影、排序、
//! 去重, 最后是 offset/limit 窗口。排序既能看到投影后的
//! 别名, 也能看到原始列。

use std::collections::HashSet;

use serde_json::Value;

use crate::ast::{is_expression, Field, Filter, FilterValue, Join, JoinType, Query, Row, Subquery};
use crate::error::QueryError;
use crate::filterer::{compare_one, lookup, Filterer, RowSource};
use crate::lexer::{JoinCondition, Operand};
use crate::sorter::{self, OrderSpec};

/// 以读查询的方式在 `source` 上执行 `query` 并返回结果行
pub fn interpret(query: &Query, source: &dyn RowSource) -> Result<Vec<Row>, QueryError> {
    let base = source
        .rows(&query.resource)
        .ok_or_else(|| QueryError::UnknownResource(query.resource.clone()))?;

    let mut scope = Scope::default();
    let mut rows = base.to_vec();
    if !query.joins.is_empty() {
        scope.add(&query.resource);
        rows = rows
            .iter()
            .map(|row| scope.qualify(row, &[query.resource.as_str()]))
            .collect();
        for join in &query.joins {
            scope.add(&join.resource);
            scope.add(join.reference());
            rows = apply_join(rows, join, &scope, source)?;
        }
    }

    let rows = Filterer::with_source(source).filter(rows, &query.filter)?;
    let mut rows = project_ordered(rows, query, &scope, source)?;

    if query.distinct {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(Value::Object(row.clone()).to_string()));
    }

    Ok(window(rows, query.offset, query.effective_limit()))
}

/// 应用 offset/limit 窗口
pub fn window(rows: Vec<Row>, offset: u64, limit: Option<u64>) -> Vec<Row> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = limit
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

/// 针对一条外层行解析单列子查询, 返回该列的值
pub fn column_values(
    sub: &Subquery,
    outer: &Row,
    source: &dyn RowSource,
) -> Result<Vec<Value>, QueryError> {
    let bound = correlate(sub.query(), outer);
    let rows = interpret(&bound, source)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null))
        .collect())
}

fn qualifier(name: &str) -> Option<&str> {
    name.rfind('.').map(|pos| &name[..pos])
}

/// 参与连接读取的资源和别名
///
/// 连接中的每一行都为每个来源列保存两份: 一份用不带限定的列名,
/// 另一份对其资源的每个引用名保存为 `reference.column`。
/// 带限定的副本让不同表的同名列互不覆盖,
/// 且永远不会出现在输出中。
#[derive(Debug, Default)]
struct Scope {
    references: HashSet<String>,
}

impl Scope {
    fn add(&mut self, reference: &str) {
        self.references.insert(reference.to_string());
    }

    fn qualify(&self, row: &Row, references: &[&str]) -> Row {
        let mut out = row.clone();
        for reference in references {
            for (key, value) in row {
                out.insert(format!("{reference}.{key}"), value.clone());
            }
        }
        out
    }

    fn is_qualified_copy(&self, key: &str) -> bool {
        qualifier(key).is_some_and(|q| self.references.contains(q))
    }

    /// 去掉带限定副本后的行
    fn output(&self, row: &Row) -> Row {
        row.iter()
            .filter(|(key, _)| !self.is_qualified_copy(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// `reference.*` 的各列, 使用不带限定的列名
    fn columns_of(&self, row: &Row, reference: &str) -> Row {
        if !self.references.contains(reference) {
            return self.output(row);
        }
        let prefix = format!("{reference}.");
        row.iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|column| (column.to_string(), value.clone()))
            })
            .collect()
    }
}

/// 把指向 `query` 外部的列引用绑定为外层行的值
///
/// 限定名是查询自身资源或其某个连接时, 该引用是本地的;
/// 不带限定的引用总是本地的。
fn correlate(query: &Query, outer: &Row) -> Query {
    let mut local: HashSet<&str> = HashSet::new();
    local.insert(query.resource.as_str());
    for join in &query.joins {
        local.insert(join.resource.as_str());
        local.insert(join.reference());
    }

    let mut bound = query.clone();
    bind_filter(&mut bound.filter, &local, outer);
    for join in &mut bound.joins {
        bind_filter(&mut join.filter, &local, outer);
    }
    bound
}

fn bind_filter(filter: &mut Filter, local: &HashSet<&str>, outer: &Row) {
    for (_, value) in filter.iter_mut() {
        match value {
            FilterValue::Group(group) => bind_filter(group, local, outer),
            FilterValue::Column(name) => {
                if let Some(q) = qualifier(name) {
                    if !local.contains(q) {
                        // 标量 null 保持 `= NULL` 语义, 不会变成 IS NULL
                        *value = FilterValue::Scalar(lookup(outer, name).clone());
                    }
                }
            }
            _ => {}
        }
    }
}

fn apply_join(
    left_rows: Vec<Row>,
    join: &Join,
    scope: &Scope,
    source: &dyn RowSource,
) -> Result<Vec<Row>, QueryError> {
    let references: Vec<&str> = if join.reference() == join.resource {
        vec![join.resource.as_str()]
    } else {
        vec![join.resource.as_str(), join.reference()]
    };
    let right_rows: Vec<Row> = source
        .rows(&join.resource)
        .ok_or_else(|| QueryError::UnknownResource(join.resource.clone()))?
        .iter()
        .map(|row| scope.qualify(row, &references))
        .collect();
    let conditions = join
        .conditions
        .iter()
        .map(|raw| JoinCondition::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let filterer = Filterer::with_source(source);

    // 参数化过滤条件属于 ON 子句, 可以读取任意一侧
    let pair = |left: &Row, right: &Row| -> Result<Option<Row>, QueryError> {
        for cond in &conditions {
            let l = operand_value(&cond.left, left, right, join);
            let r = operand_value(&cond.right, left, right, join);
            if !compare_one(cond.op, &l, &r)? {
                return Ok(None);
            }
        }
        let row = merge(left, right);
        Ok(filterer.matches(&row, &join.filter, false)?.then_some(row))
    };

    let mut joined = Vec::new();
    match join.join_type {
        JoinType::Inner | JoinType::Left => {
            let right_nulls = null_row(right_rows.first());
            for left in &left_rows {
                let mut matched = false;
                for right in &right_rows {
                    if let Some(row) = pair(left, right)? {
                        joined.push(row);
                        matched = true;
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    joined.push(merge(left, &right_nulls));
                }
            }
        }
        JoinType::Right => {
            let left_nulls = null_row(left_rows.first());
            for right in &right_rows {
                let mut matched = false;
                for left in &left_rows {
                    if let Some(row) = pair(left, right)? {
                        joined.push(row);
                        matched = true;
                    }
                }
                if !matched {
                    joined.push(merge(&left_nulls, right));
                }
            }
        }
    }
    Ok(joined)
}

/// 解析连接操作数。以关联资源或其别名限定的列从右行读取;
/// 其它列先从左行读取, 不带限定的名称
/// 在左行缺失时退回到右行。
fn operand_value(operand: &Operand, left: &Row, right: &Row, join: &Join) -> Value {
    match operand {
        Operand::Literal(value) => value.clone(),
        Operand::Column(name) => match qualifier(name) {
            Some(q) if q == join.reference() || q == join.resource => lookup(right, name).clone(),
            Some(_) => lookup(left, name).clone(),
            None => match left.get(name.as_str()) {
                Some(value) => value.clone(),
                None => lookup(right, name).clone(),
            },
        },
    }
}

/// 右侧不带限定的列覆盖左侧同名的列,
/// 与 SQL 连接按关联数组取行的行为一致。
/// 两侧带限定的副本都会保留。
fn merge(left: &Row, right: &Row) -> Row {
    let mut row = left.clone();
    for (key, value) in right {
        row.insert(key.clone(), value.clone());
    }
    row
}

fn null_row(template: Option<&Row>) -> Row {
    template
        .map(|row| row.keys().map(|k| (k.clone(), Value::Null)).collect())
        .unwrap_or_default()
}

enum Aggregate<'a> {
    CountAll,
    Count(&'a str),
}

fn parse_aggregate(name: &str) -> Option<Aggregate<'_>> {
    let trimmed = name.trim();
    let open = trimmed.find('(')?;
    if !trimmed[..open].trim().eq_ignore_ascii_case("count") || !trimmed.ends_with(')') {
        return None;
    }
    match trimmed[open + 1..trimmed.len() - 1].trim() {
        "*" => Some(Aggregate::CountAll),
        column => Some(Aggregate::Count(column)),
    }
}

fn aggregate_of(field: &Field) -> Option<Aggregate<'_>> {
    match field {
        Field::Name(name) | Field::Aliased { name, .. } => parse_aggregate(name),
        Field::Subquery { .. } => None,
    }
}

fn alias_of(field: &Field) -> Option<&str> {
    match field {
        Field::Aliased { alias, .. } | Field::Subquery { alias, .. } => Some(alias),
        Field::Name(_) => None,
    }
}

/// 投影并排序。排序字段是输出别名时按投影后的值排序,
/// 否则按原始列排序。
fn project_ordered(
    rows: Vec<Row>,
    query: &Query,
    scope: &Scope,
    source: &dyn RowSource,
) -> Result<Vec<Row>, QueryError> {
    let order = OrderSpec::from(query.order.as_slice());

    if query.fields.iter().any(|f| aggregate_of(f).is_some()) {
        let rows = sorter::sort(rows, order);
        return Ok(vec![project_aggregate(&rows, &query.fields, scope, source)?]);
    }

    let aliases: Vec<&str> = query
        .fields
        .iter()
        .filter_map(alias_of)
        .filter(|alias| order.iter().any(|(field, _)| field.as_str() == *alias))
        .collect();

    let keyed = rows
        .into_iter()
        .map(|row| {
            let projected = project_row(&row, &query.fields, scope, source)?;
            let mut key = row;
            for alias in &aliases {
                let value = projected.get(*alias).cloned().unwrap_or(Value::Null);
                key.insert((*alias).to_string(), value);
            }
            Ok((key, projected))
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(sorter::sort_by_keys(keyed, &order))
}

fn project_row(row: &Row, fields: &[Field], scope: &Scope, source: &dyn RowSource) -> Result<Row, QueryError> {
    if fields.is_empty() {
        return Ok(scope.output(row));
    }

    let mut out = Row::new();
    for field in fields {
        match field {
            Field::Name(name) if name == "*" => out.extend(scope.output(row)),
            Field::Name(name) if name.ends_with(".*") => {
                out.extend(scope.columns_of(row, &name[..name.len() - 2]));
            }
            Field::Name(name) | Field::Aliased { name, .. } => {
                if is_expression(name) {
                    return Err(QueryError::UnsupportedExpression(name.clone()));
                }
                out.insert(field.output_name().to_string(), lookup(row, name).clone());
            }
            Field::Subquery { query, alias } => {
                let value = column_values(query, row, source)?
                    .into_iter()
                    .next()
                    .unwrap_or(Value::Null);
                out.insert(alias.clone(), value);
            }
        }
    }
    Ok(out)
}

/// 把所有行折叠为一行: 聚合在全部行上计算,
/// 普通列取第一行的值。
fn project_aggregate(
    rows: &[Row],
    fields: &[Field],
    scope: &Scope,
    source: &dyn RowSource,
) -> Result<Row, QueryError> {
    let empty = Row::new();
    let first = rows.first().unwrap_or(&empty);
    let mut out = Row::new();

    for field in fields {
        match aggregate_of(field) {
            Some(Aggregate::CountAll) => {
                out.insert(field.output_name().to_string(), Value::from(rows.len()));
            }
            Some(Aggregate::Count(column)) => {
                let count = rows.iter().filter(|row| !lookup(row, column).is_null()).count();
                out.insert(field.output_name().to_string(), Value::from(count));
            }
            None => {
                let projected = project_row(first, std::slice::from_ref(field), scope, source)?;
                out.extend(projected);
            }
        }
    }
    Ok(out)
}
