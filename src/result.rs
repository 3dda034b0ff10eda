//! 所有后端统一返回的结果

use serde::Serialize;
use serde_json::Value;

use crate::ast::Row;
use crate::error::DbError;

/// 执行一次查询的结果
///
/// 执行失败通过 `error` 报告, 既不 panic 也不返回 `Err`,
/// 调用方对所有后端都以同样方式检查 `error`。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub data: Vec<Row>,
    pub count: usize,
    pub affected: u64,
    #[serde(rename = "insertId")]
    pub insert_id: Option<Value>,
    /// 返回列的名称
    pub fields: Vec<String>,
    pub error: Option<DbError>,
}

impl QueryResult {
    /// 携带行的结果; `count` 和 `fields` 由行推导
    pub fn rows(data: Vec<Row>) -> Self {
        let fields = data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            count: data.len(),
            data,
            fields,
            ..Default::default()
        }
    }

    pub fn affected(affected: u64) -> Self {
        Self {
            affected,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<DbError>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_insert_id(mut self, insert_id: Option<Value>) -> Self {
        self.insert_id = insert_id;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn first(&self) -> Option<&Row> {
        self.data.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use serde_json::json;

    #[test]
    fn test_rows_derives_count_and_fields() {
        let row = json!({"id": 1, "name": "chris"}).as_object().unwrap().clone();
        let result = QueryResult::rows(vec![row.clone(), row]);
        assert_eq!(result.count, 2);
        assert_eq!(result.fields, vec!["id".to_string(), "name".to_string()]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_failed_result() {
        let result = QueryResult::failed(QueryError::UnknownResource("ghosts".to_string()));
        assert!(!result.is_ok());
        assert_eq!(result.error.unwrap().code, "QUERY");
        assert_eq!(result.count, 0);
    }

    #[test]
    fn test_serializes_insert_id_in_camel_case() {
        let result = QueryResult::affected(1).with_insert_id(Some(json!(7)));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["insertId"], json!(7));
        assert_eq!(value["affected"], json!(1));
    }
}
