//! 内存过滤器与排序器共用的值语义
//!
//! `=`/`!=` 下的相等是宽松的: 字符串不区分大小写比较,
//! 数字字符串与数字相等, 与不区分大小写的 SQL 排序规则
//! 行为一致。

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::QueryError;

/// `like` 模式编译后大小的上限
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// `=`、`!=`、`in` 和 `not in` 使用的宽松相等。null 永不相等
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
        (Value::Number(_) | Value::Bool(_), _) | (_, Value::Number(_) | Value::Bool(_)) => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => left == right,
    }
}

/// `is`/`is not` 使用的同一性比较: 类型和表示都必须相同,
/// 所以 `1` 不是 `1.0`, `"1"` 也不是 `1`
pub fn identical(left: &Value, right: &Value) -> bool {
    left == right
}

/// `<>` 使用的区分大小写的值相等; 数字按大小比较
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// `>`、`<`、`>=` 和 `<=` 使用的排序比较
///
/// 任一侧为 null 或两值不可比较时返回 `None`,
/// 此时所有排序比较均为 false。
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => match (as_number(left), as_number(right)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(a.cmp(b)),
        },
        _ => match (as_number(left), as_number(right)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

/// 值的文本形式, 用于模式匹配和自然排序
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}

/// 把 `like` 模式 (`%` 任意串, `_` 任意单个字符) 编译为
/// 不区分大小写、首尾锚定的正则
pub fn like_regex(pattern: &str) -> Result<Regex, QueryError> {
    let mut regex_pattern = String::with_capacity(pattern.len() + 2);
    regex_pattern.push('^');
    for c in pattern.chars() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            c => regex_pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    regex_pattern.push('$');

    RegexBuilder::new(&regex_pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|_| QueryError::InvalidPattern(pattern.to_string()))
}

/// 不区分大小写的自然字符串比较, 等价于 `strnatcasecmp`
///
/// 连续数字按数值比较, 忽略前导空白,
/// 以 0 开头的数字串按小数部分逐位比较。
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.chars().flat_map(char::to_lowercase).collect();
    let b: Vec<char> = b.chars().flat_map(char::to_lowercase).collect();
    let (mut i, mut j) = (0, 0);

    loop {
        while i < a.len() && a[i].is_whitespace() {
            i += 1;
        }
        while j < b.len() && b[j].is_whitespace() {
            j += 1;
        }

        match (a.get(i), b.get(j)) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let end_a = digit_run_end(&a, i);
                let end_b = digit_run_end(&b, j);
                let (run_a, run_b) = (&a[i..end_a], &b[j..end_b]);
                let ord = if run_a[0] == '0' || run_b[0] == '0' {
                    compare_left(run_a, run_b)
                } else {
                    compare_right(run_a, run_b)
                };
                if ord != Ordering::Equal {
                    return ord;
                }
                i = end_a;
                j = end_b;
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(cb);
                }
                i += 1;
                j += 1;
            }
        }
    }
}

fn digit_run_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    end
}

/// 小数部分: 第一个不同的数字决定顺序, 前缀排在前面
fn compare_left(a: &[char], b: &[char]) -> Ordering {
    for (ca, cb) in a.iter().zip(b.iter()) {
        if ca != cb {
            return ca.cmp(cb);
        }
    }
    a.len().cmp(&b.len())
}

/// 无前导 0 的整数串: 更长的数字串更大
fn compare_right(a: &[char], b: &[char]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!("Chris"), &json!("chris")));
        assert!(loose_eq(&json!(23), &json!(23.0)));
        assert!(loose_eq(&json!("23"), &json!(23)));
        assert!(loose_eq(&json!(true), &json!(1)));
        assert!(!loose_eq(&json!("chris"), &json!("chri")));
        assert!(!loose_eq(&Value::Null, &Value::Null));
        assert!(!loose_eq(&json!("abc"), &json!(0)));
    }

    #[test]
    fn test_values_equal_is_case_sensitive() {
        assert!(values_equal(&json!("Chris"), &json!("Chris")));
        assert!(!values_equal(&json!("Chris"), &json!("chris")));
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_identical_keeps_number_representation() {
        assert!(identical(&json!(1), &json!(1)));
        assert!(identical(&Value::Null, &Value::Null));
        assert!(!identical(&json!(1), &json!(1.0)));
        assert!(!identical(&json!("Chris"), &json!("chris")));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("B"), &json!("a")), Some(Ordering::Less));
        assert_eq!(compare_values(&Value::Null, &json!(1)), None);
        assert_eq!(compare_values(&json!("abc"), &json!(1)), None);
    }

    #[test]
    fn test_like_regex() {
        let re = like_regex("%test%").unwrap();
        assert!(re.is_match("a TEST case"));
        assert!(!re.is_match("tes"));

        let re = like_regex("a_c").unwrap();
        assert!(re.is_match("abc"));
        assert!(!re.is_match("ac"));

        let re = like_regex("1.5%").unwrap();
        assert!(re.is_match("1.50"));
        assert!(!re.is_match("1x50"));
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("img2", "img10"), Ordering::Less);
        assert_eq!(natural_cmp("IMG10", "img2"), Ordering::Greater);
        assert_eq!(natural_cmp("Apple", "apple"), Ordering::Equal);
        assert_eq!(natural_cmp("  a", "a"), Ordering::Equal);
        assert_eq!(natural_cmp("x01", "x1"), Ordering::Less);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
    }
}
