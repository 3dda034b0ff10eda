//! 过滤键拆分, 以及原始连接条件的词法分析器
//!
//! 两个后端都通过 [`resolve_key`] 解析, 因此一个过滤条目无论最终写入
//! SQL 文本还是在内存行上求值, 都表示同一个 `(field, operator)` 对。
//!

use serde_json::Value;

use crate::ast::{FilterValue, OR_KEY};
use crate::error::QueryError;
use crate::token::{Operator, Span, Token, TokenKind};

/// 在第一个空白处把过滤键拆分为 `(field, raw_operator)`
pub fn split_key(key: &str) -> (&str, &str) {
    let key = key.trim();
    match key.find(char::is_whitespace) {
        Some(pos) => (&key[..pos], key[pos..].trim()),
        None => (key, ""),
    }
}

/// 键是否表示析取分组
pub fn is_or_key(key: &str) -> bool {
    key.trim().eq_ignore_ascii_case(OR_KEY)
}

/// 拆分为字段和运算符的过滤键, 尚未按值做规范化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterKey<'a> {
    pub field: &'a str,
    pub operator: Operator,
}

impl<'a> FilterKey<'a> {
    /// 解析 `"field"` 或 `"field operator"`。未知运算符退回为 `=`
    pub fn parse(key: &'a str) -> Self {
        let (field, raw) = split_key(key);
        Self {
            field,
            operator: Operator::parse(raw).unwrap_or(Operator::Eq),
        }
    }
}

/// 结合值把原始键解析为规范化的 `(field, operator)` 对
pub fn resolve_key<'a>(key: &'a str, value: &FilterValue) -> (&'a str, Operator) {
    let parsed = FilterKey::parse(key);
    (parsed.field, parsed.operator.normalize(value))
}

/// 原始连接条件的词法分析器, 例如 `users.id = posts.user_id`
pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    fn read_number(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        self.token(TokenKind::Number(&self.input[start..self.position]), start)
    }

    /// 读取单引号包围的字符串字面量。开始的引号已经被调用者消费
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '\'' {
                break;
            }
            self.bump();
        }
        let content_end = self.position;
        self.bump();

        self.token(TokenKind::String(&self.input[content_start..content_end]), start)
    }

    /// 标识符可以带限定 (`posts.user_id`), 也可以是表通配符 (`posts.*`)
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '*' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        let kind = match literal.to_ascii_lowercase().as_str() {
            "null" | "true" | "false" | "is" | "not" | "and" | "or" => TokenKind::Other(literal),
            _ => TokenKind::Identifier(literal),
        };
        self.token(kind, start)
    }

    fn read_operator(&mut self, first: char, start: usize) -> Token<'a> {
        let op = match (first, self.peek()) {
            ('<', Some('=')) => Some(Operator::Lte),
            ('<', Some('>')) => Some(Operator::Ne),
            ('>', Some('=')) => Some(Operator::Gte),
            ('!', Some('=')) => Some(Operator::NotEq),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            return self.token(TokenKind::Operator(op), start);
        }

        let kind = match first {
            '=' => TokenKind::Operator(Operator::Eq),
            '<' => TokenKind::Operator(Operator::Lt),
            '>' => TokenKind::Operator(Operator::Gt),
            _ => TokenKind::Other(&self.input[start..self.position]),
        };
        self.token(kind, start)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let token = match c {
            '\'' => self.read_string(start),
            '=' | '<' | '>' | '!' => self.read_operator(c, start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Other(&self.input[start..self.position]), start),
        };
        Some(token)
    }
}

/// 连接条件的一侧
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Value),
}

/// 化简为 `left op right` 的连接条件, 供内存连接求值
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub left: Operand,
    pub op: Operator,
    pub right: Operand,
}

impl JoinCondition {
    /// 解析 `a op b`、`a IS NULL` 或 `a IS NOT NULL`
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let tokens: Vec<_> = Lexer::new(raw).collect();
        let invalid = || QueryError::InvalidJoinCondition(raw.to_string());

        match tokens.as_slice() {
            [left, Token { kind: TokenKind::Operator(op), .. }, right] => Ok(Self {
                left: operand(left).ok_or_else(invalid)?,
                op: *op,
                right: operand(right).ok_or_else(invalid)?,
            }),
            [left, is, rest @ ..] if is_word(is, "is") => {
                let op = match rest {
                    [null] if is_word(null, "null") => Operator::Is,
                    [not, null] if is_word(not, "not") && is_word(null, "null") => Operator::IsNot,
                    _ => return Err(invalid()),
                };
                Ok(Self {
                    left: operand(left).ok_or_else(invalid)?,
                    op,
                    right: Operand::Literal(Value::Null),
                })
            }
            _ => Err(invalid()),
        }
    }
}

fn is_word(token: &Token<'_>, word: &str) -> bool {
    matches!(token.kind, TokenKind::Other(w) if w.eq_ignore_ascii_case(word))
}

fn operand(token: &Token<'_>) -> Option<Operand> {
    match token.kind {
        TokenKind::Identifier(name) => Some(Operand::Column(name.to_string())),
        TokenKind::String(s) => Some(Operand::Literal(Value::String(s.to_string()))),
        TokenKind::Number(n) => serde_json::from_str::<Value>(n).ok().map(Operand::Literal),
        TokenKind::Other(w) if w.eq_ignore_ascii_case("null") => Some(Operand::Literal(Value::Null)),
        TokenKind::Other(w) if w.eq_ignore_ascii_case("true") => Some(Operand::Literal(Value::Bool(true))),
        TokenKind::Other(w) if w.eq_ignore_ascii_case("false") => {
            Some(Operand::Literal(Value::Bool(false)))
        }
        _ => None,
    }
}
