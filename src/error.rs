//! 查询模型、SQL 编译器和内存解释器共用的错误类型

use serde::Serialize;
use thiserror::Error;

/// 构建、编译或解释查询时产生的失败
///
/// 这些是查询本身的编程错误, 会立即返回。
/// 后端存储的失败则以 [`DbError`]
/// 的形式报告在查询结果上。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("subquery on `{resource}` must project exactly one field, found {fields}")]
    SubqueryArity { resource: String, fields: usize },

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("subquery on `{0}` cannot be resolved without a row source")]
    NoRowSource(String),

    #[error("invalid join condition: {0}")]
    InvalidJoinCondition(String),

    #[error("invalid like pattern: {0}")]
    InvalidPattern(String),

    #[error("no data to write to `{0}`")]
    EmptyPayload(String),

    #[error("expression not supported in memory: {0}")]
    UnsupportedExpression(String),
}

/// 后端报告的执行期失败
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("[{code}] {message}")]
pub struct DbError {
    pub code: String,
    pub message: String,
}

impl DbError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<QueryError> for DbError {
    fn from(err: QueryError) -> Self {
        DbError::new("QUERY", err.to_string())
    }
}

/// JSON 查询文档解析器产生的错误
#[derive(Error, Debug, Clone, PartialEq)]
#[error("parse error at `{path}`: {message}")]
pub struct ParseError {
    pub message: String,
    pub path: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
        }
    }
}

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file does not exist: {0}")]
    Missing(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid fixtures in {path}: {message}")]
    Fixtures { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = QueryError::SubqueryArity {
            resource: "posts".to_string(),
            fields: 2,
        };
        assert_eq!(
            err.to_string(),
            "subquery on `posts` must project exactly one field, found 2"
        );

        let err = QueryError::UnknownResource("users".to_string());
        assert_eq!(err.to_string(), "unknown resource: users");
    }

    #[test]
    fn test_db_error_from_query_error() {
        let err: DbError = QueryError::EmptyPayload("users".to_string()).into();
        assert_eq!(err.code, "QUERY");
        assert_eq!(err.to_string(), "[QUERY] no data to write to `users`");
    }
}
