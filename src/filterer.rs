//! 过滤语法的内存求值
//!
//! 过滤器按与 SQL 编译器相同的键解析规则遍历 [`Filter`]。
//! null 操作数遵循 SQL 语义: 除 `is`/`is not` 外,
//! 任何涉及 null 的比较都不为真; 列表中含 null 时
//! `not in` 永远不匹配。

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::{unqualified, Filter, FilterValue, Row, Subquery};
use crate::compare::{compare_values, identical, like_regex, loose_eq, to_text, values_equal};
use crate::error::QueryError;
use crate::lexer::{is_or_key, resolve_key};
use crate::token::Operator;

/// 提供资源的行, 用于解析子查询和连接
pub trait RowSource {
    fn rows(&self, resource: &str) -> Option<&[Row]>;
}

impl RowSource for HashMap<String, Vec<Row>> {
    fn rows(&self, resource: &str) -> Option<&[Row]> {
        self.get(resource).map(Vec::as_slice)
    }
}

impl RowSource for IndexMap<String, Vec<Row>> {
    fn rows(&self, resource: &str) -> Option<&[Row]> {
        self.get(resource).map(Vec::as_slice)
    }
}

static NULL: Value = Value::Null;

/// 从行中读取字段。先按原名精确查找, 带限定的名称 (`posts.title`)
/// 找不到时退回到不带限定的列名; 缺失的字段读作 null
pub fn lookup<'r>(row: &'r Row, field: &str) -> &'r Value {
    if let Some(value) = row.get(field) {
        return value;
    }
    let bare = unqualified(field);
    if bare != field {
        if let Some(value) = row.get(bare) {
            return value;
        }
    }
    &NULL
}

/// 针对行求值过滤条件
#[derive(Clone, Copy, Default)]
pub struct Filterer<'s> {
    source: Option<&'s dyn RowSource>,
}

impl<'s> Filterer<'s> {
    /// 没有行来源的过滤器; 子查询值会以 [`QueryError::NoRowSource`] 失败
    pub fn new() -> Self {
        Self { source: None }
    }

    pub fn with_source(source: &'s dyn RowSource) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// `row` 是否满足 `filter`。各条目以 AND 连接, `disjunctive` 时以 OR 连接;
    /// 遇到第一个能决定结果的条目即停止求值
    pub fn matches(&self, row: &Row, filter: &Filter, disjunctive: bool) -> Result<bool, QueryError> {
        let mut evaluated = false;

        for (key, value) in filter.iter() {
            let result = match value {
                FilterValue::Group(group) => {
                    if !group.has_conditions() {
                        continue;
                    }
                    self.matches(row, group, is_or_key(key))?
                }
                _ => self.matches_entry(row, key, value, disjunctive)?,
            };
            evaluated = true;

            if disjunctive && result {
                return Ok(true);
            }
            if !disjunctive && !result {
                return Ok(false);
            }
        }

        Ok(!disjunctive || !evaluated)
    }

    fn matches_entry(
        &self,
        row: &Row,
        key: &str,
        value: &FilterValue,
        disjunctive: bool,
    ) -> Result<bool, QueryError> {
        let (field, op) = resolve_key(key, value);
        let actual = lookup(row, field);

        match value {
            FilterValue::Null => compare_one(op, actual, &Value::Null),
            FilterValue::Scalar(expected) => compare_one(op, actual, expected),
            FilterValue::Column(name) => compare_one(op, actual, lookup(row, name)),
            FilterValue::List(items) => compare_many(op, actual, items, disjunctive),
            FilterValue::Subquery(sub) => {
                let items = self.resolve_subquery(sub, row)?;
                if op.takes_list() {
                    compare_many(op, actual, &items, disjunctive)
                } else {
                    // 标量子查询: 取第一个值, 没有结果时为 null
                    compare_one(op, actual, items.first().unwrap_or(&NULL))
                }
            }
            FilterValue::Group(group) => self.matches(row, group, is_or_key(key)),
        }
    }

    fn resolve_subquery(&self, sub: &Subquery, outer: &Row) -> Result<Vec<Value>, QueryError> {
        let source = self
            .source
            .ok_or_else(|| QueryError::NoRowSource(sub.query().resource.clone()))?;
        crate::interpreter::column_values(sub, outer, source)
    }

    /// 匹配行的下标, 升序, 最多 `limit` 个
    pub fn matching_indices(
        &self,
        rows: &[Row],
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<usize>, QueryError> {
        let mut hits = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if limit.is_some_and(|n| hits.len() >= n) {
                break;
            }
            if self.matches(row, filter, false)? {
                hits.push(index);
            }
        }
        Ok(hits)
    }

    /// 按原顺序保留匹配的行
    pub fn filter(&self, rows: Vec<Row>, filter: &Filter) -> Result<Vec<Row>, QueryError> {
        let hits = self.matching_indices(&rows, filter, None)?;
        Ok(keep_indexed(rows, |index| hits.binary_search(&index).is_ok()))
    }

    /// 删除最多 `limit` 个匹配行 (`None` 时全部删除),
    /// 其余行保持相对顺序
    pub fn reject(
        &self,
        rows: Vec<Row>,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, QueryError> {
        let hits = self.matching_indices(&rows, filter, limit)?;
        Ok(keep_indexed(rows, |index| hits.binary_search(&index).is_err()))
    }

    /// 对最多 `limit` 个匹配行原地应用 `transform`
    pub fn map<F>(
        &self,
        mut rows: Vec<Row>,
        filter: &Filter,
        mut transform: F,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, QueryError>
    where
        F: FnMut(&mut Row),
    {
        for index in self.matching_indices(&rows, filter, limit)? {
            transform(&mut rows[index]);
        }
        Ok(rows)
    }
}

fn keep_indexed<P>(rows: Vec<Row>, keep: P) -> Vec<Row>
where
    P: Fn(usize) -> bool,
{
    rows.into_iter()
        .enumerate()
        .filter(|(index, _)| keep(*index))
        .map(|(_, row)| row)
        .collect()
}

/// 比较一个实际值与一个期望值
pub fn compare_one(op: Operator, actual: &Value, expected: &Value) -> Result<bool, QueryError> {
    let both_present = !actual.is_null() && !expected.is_null();
    let ordering = || compare_values(actual, expected);

    let result = match op {
        Operator::Eq | Operator::In => loose_eq(actual, expected),
        Operator::NotEq | Operator::NotIn => both_present && !loose_eq(actual, expected),
        Operator::Ne => both_present && !values_equal(actual, expected),
        Operator::Gt => ordering().is_some_and(|o| o.is_gt()),
        Operator::Lt => ordering().is_some_and(|o| o.is_lt()),
        Operator::Gte => ordering().is_some_and(|o| o.is_ge()),
        Operator::Lte => ordering().is_some_and(|o| o.is_le()),
        Operator::Is => identical(actual, expected),
        Operator::IsNot => !identical(actual, expected),
        Operator::Like | Operator::NotLike => {
            if !both_present {
                return Ok(false);
            }
            let found = like_regex(&to_text(expected))?.is_match(&to_text(actual));
            found == (op == Operator::Like)
        }
    };
    Ok(result)
}

/// 与列表比较。`in`/`not in` 检查成员关系; 其它运算符
/// 逐元素应用, 并以 AND 归约, `disjunctive` 时以 OR
/// 归约。
pub fn compare_many(
    op: Operator,
    actual: &Value,
    items: &[Value],
    disjunctive: bool,
) -> Result<bool, QueryError> {
    if op.takes_list() {
        if items.is_empty() {
            // 与 SQL 中空列表渲染为 `1 = 0` / `1 = 1` 保持一致
            return Ok(op == Operator::NotIn);
        }
        if actual.is_null() {
            return Ok(false);
        }
        let found = items.iter().any(|item| loose_eq(actual, item));
        return Ok(match op {
            Operator::In => found,
            _ => !found && !items.iter().any(Value::is_null),
        });
    }

    for item in items {
        let result = compare_one(op, actual, item)?;
        if disjunctive && result {
            return Ok(true);
        }
        if !disjunctive && !result {
            return Ok(false);
        }
    }
    Ok(!disjunctive)
}
