//! 内存行的稳定、多键自然排序

use std::cmp::Ordering;

use serde_json::Value;

use crate::ast::{Direction, Row};
use crate::compare::{natural_cmp, to_text};
use crate::filterer::lookup;

/// 规范化后的排序规格: 按优先级排列的字段及其方向
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderSpec(Vec<(String, Direction)>);

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, direction: Direction) {
        self.0.push((field.into(), direction));
    }

    /// 规范化 JSON 规格: 单个名称 (可写作 `"name desc"`), 或混合
    /// 普通名称 (升序) 与 `{name: direction}` 对象的数组
    pub fn from_json(spec: &Value) -> Self {
        let mut order = OrderSpec::new();
        match spec {
            Value::String(name) => order.push_named(name),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(name) => order.push_named(name),
                        Value::Object(pairs) => {
                            for (field, direction) in pairs {
                                let direction = direction
                                    .as_str()
                                    .and_then(Direction::parse)
                                    .unwrap_or_default();
                                order.push(field.clone(), direction);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Value::Object(pairs) => {
                for (field, direction) in pairs {
                    let direction = direction.as_str().and_then(Direction::parse).unwrap_or_default();
                    order.push(field.clone(), direction);
                }
            }
            _ => {}
        }
        order
    }

    fn push_named(&mut self, spec: &str) {
        let (field, direction) = crate::lexer::split_key(spec);
        if !field.is_empty() {
            self.push(field, Direction::parse(direction).unwrap_or_default());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Direction)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<(String, Direction)> {
        self.0
    }
}

impl From<&str> for OrderSpec {
    fn from(field: &str) -> Self {
        let mut order = OrderSpec::new();
        order.push_named(field);
        order
    }
}

impl From<Vec<(String, Direction)>> for OrderSpec {
    fn from(pairs: Vec<(String, Direction)>) -> Self {
        OrderSpec(pairs)
    }
}

impl From<&[(String, Direction)]> for OrderSpec {
    fn from(pairs: &[(String, Direction)]) -> Self {
        OrderSpec(pairs.to_vec())
    }
}

impl From<Vec<&str>> for OrderSpec {
    fn from(fields: Vec<&str>) -> Self {
        let mut order = OrderSpec::new();
        for field in fields {
            order.push_named(field);
        }
        order
    }
}

/// 按文本形式的自然、不区分大小写顺序比较两个字段值,
/// 与类型无关, 因此混合类型的列也是全序
fn compare_field(a: &Value, b: &Value) -> Ordering {
    natural_cmp(&to_text(a), &to_text(b))
}

/// 逐字段比较两行; 第一个不相等的字段决定结果
pub fn compare_rows(a: &Row, b: &Row, order: &OrderSpec) -> Ordering {
    for (field, direction) in order.iter() {
        let ord = compare_field(lookup(a, field), lookup(b, field));
        let ord = match direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// 按 `order` 排序行。所有字段都相等的行保持原有的
/// 相对顺序, 升序和降序都如此
pub fn sort(rows: Vec<Row>, order: impl Into<OrderSpec>) -> Vec<Row> {
    let order = order.into();
    if order.is_empty() {
        return rows;
    }

    let mut indexed: Vec<(usize, Row)> = rows.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| compare_rows(a, b, &order).then(ia.cmp(ib)));
    indexed.into_iter().map(|(_, row)| row).collect()
}

/// 按与每项配对的键行排序。相等的项保持输入顺序
pub fn sort_by_keys<T>(items: Vec<(Row, T)>, order: &OrderSpec) -> Vec<T> {
    let mut indexed: Vec<(usize, (Row, T))> = items.into_iter().enumerate().collect();
    if !order.is_empty() {
        indexed.sort_by(|(ia, (a, _)), (ib, (b, _))| compare_rows(a, b, order).then(ia.cmp(ib)));
    }
    indexed.into_iter().map(|(_, (_, item))| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Value) -> Vec<Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn column(rows: &[Row], field: &str) -> Vec<Value> {
        rows.iter().map(|r| r[field].clone()).collect()
    }

    #[test]
    fn test_sort_is_stable() {
        let input = rows(json!([
            {"n": 4, "l": "a"},
            {"n": 4, "l": "d"},
            {"n": 1, "l": "c"}
        ]));
        let sorted = sort(input, "n");
        assert_eq!(column(&sorted, "l"), vec![json!("c"), json!("a"), json!("d")]);
    }

    #[test]
    fn test_sort_descending_keeps_ties_in_original_order() {
        let input = rows(json!([
            {"n": 4, "l": "a"},
            {"n": 1, "l": "c"},
            {"n": 4, "l": "d"}
        ]));
        let sorted = sort(input, "n desc");
        assert_eq!(column(&sorted, "l"), vec![json!("a"), json!("d"), json!("c")]);
    }

    #[test]
    fn test_sort_natural_case_insensitive() {
        let input = rows(json!([
            {"name": "file10"},
            {"name": "File2"},
            {"name": "file1"}
        ]));
        let sorted = sort(input, "name");
        assert_eq!(
            column(&sorted, "name"),
            vec![json!("file1"), json!("File2"), json!("file10")]
        );
    }

    #[test]
    fn test_sort_multiple_keys() {
        let input = rows(json!([
            {"group": "b", "rank": 2},
            {"group": "a", "rank": 1},
            {"group": "b", "rank": 1},
            {"group": "a", "rank": 3}
        ]));
        let spec = OrderSpec::from_json(&json!(["group", {"rank": "desc"}]));
        let sorted = sort(input, spec);
        assert_eq!(column(&sorted, "rank"), vec![json!(3), json!(1), json!(2), json!(1)]);
    }

    #[test]
    fn test_order_spec_normalization() {
        let spec = OrderSpec::from_json(&json!(["a", {"b": "DESC"}, {"c": "sideways"}]));
        assert_eq!(
            spec,
            OrderSpec::from(vec![
                ("a".to_string(), Direction::Asc),
                ("b".to_string(), Direction::Desc),
                ("c".to_string(), Direction::Asc),
            ])
        );
        assert_eq!(
            OrderSpec::from_json(&json!("id desc")),
            OrderSpec::from(vec![("id".to_string(), Direction::Desc)])
        );
    }

    #[test]
    fn test_mixed_numbers_and_strings_use_one_order() {
        let input: Vec<Row> = (0..30)
            .map(|i| {
                let n = match i % 3 {
                    0 => json!(1.25),
                    1 => json!(1.5),
                    _ => json!("1.10"),
                };
                json!({"n": n}).as_object().unwrap().clone()
            })
            .collect();
        let sorted = sort(input, "n");
        let values = column(&sorted, "n");
        assert_eq!(values[..10], vec![json!(1.5); 10][..]);
        assert_eq!(values[10..20], vec![json!("1.10"); 10][..]);
        assert_eq!(values[20..], vec![json!(1.25); 10][..]);
    }

    #[test]
    fn test_missing_fields_sort_first() {
        let input = rows(json!([{"n": "b"}, {"m": 1}, {"n": "a"}]));
        let sorted = sort(input, "n");
        assert!(sorted[0].get("n").is_none());
        assert_eq!(sorted[1]["n"], json!("a"));
    }
}
