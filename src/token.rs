//! 过滤小语言的运算符, 以及原始连接条件的词法单元

use crate::ast::FilterValue;

/// 比较运算符, 写在过滤键的字段名之后
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,      // =
    NotEq,   // !=
    Gt,      // >
    Lt,      // <
    Ne,      // <>
    Gte,     // >=
    Lte,     // <=
    In,      // in
    NotIn,   // not in
    Is,      // is
    IsNot,   // is not
    Like,    // like
    NotLike, // not like
}

impl Operator {
    /// 解析原始运算符, 不区分大小写, 内部空白合并
    /// 不在支持集合内的返回 `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();

        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            "!=" => Operator::NotEq,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            "<>" => Operator::Ne,
            ">=" => Operator::Gte,
            "<=" => Operator::Lte,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "is" => Operator::Is,
            "is not" => Operator::IsNot,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            _ => return None,
        };
        Some(op)
    }

    /// 根据被比较值的形态改写 `=`/`!=`
    ///
    /// `Null` 把它们变为 `IS`/`IS NOT`; 列表和子查询把它们
    /// 变为 `IN`/`NOT IN`。其它运算符原样返回。
    pub fn normalize(self, value: &FilterValue) -> Self {
        match (self, value) {
            (Operator::Eq, FilterValue::Null) => Operator::Is,
            (Operator::NotEq, FilterValue::Null) => Operator::IsNot,
            (Operator::Eq, FilterValue::List(_) | FilterValue::Subquery(_)) => Operator::In,
            (Operator::NotEq, FilterValue::List(_) | FilterValue::Subquery(_)) => Operator::NotIn,
            (op, _) => op,
        }
    }

    /// 运算符是否与整个集合而非单个值比较
    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ne => "<>",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// 原始连接条件的词法单元, 例如 `users.id = posts.user_id`
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// 可能带限定的列引用, `posts.user_id`
    Identifier(&'a str),
    /// 单引号字符串字面量, 不含引号
    String(&'a str),
    Number(&'a str),
    Operator(Operator),
    /// 条件语法无法识别的内容, 原样保留
    Other(&'a str),
}

/// 表示源文本中的一个区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// 起始字节偏移
    pub start: usize,
    /// 结束字节偏移
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
