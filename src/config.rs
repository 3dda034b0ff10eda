//! 引擎配置: 方言、表名映射和固定数据, 从 JSON 文件加载

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{Field, Filter, FilterValue, Query, Row};
use crate::dialect::DialectKind;
use crate::error::ConfigError;
use crate::memory::MemoryBackend;
use crate::sql_compiler::SqlCompiler;

/// 逻辑资源名到物理表名的映射
///
/// 只改写表名; 带限定的列引用保留原限定名,
/// 因此应使用连接别名或物理表名。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableMapping {
    mappings: HashMap<String, String>,
}

impl TableMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: impl Into<String>, table: impl Into<String>) -> Self {
        self.mappings.insert(resource.into(), table.into());
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// `resource` 对应的物理表; 未映射的资源保持原名
    pub fn table_name<'a>(&'a self, resource: &'a str) -> &'a str {
        self.mappings.get(resource).map(String::as_str).unwrap_or(resource)
    }

    pub fn mappings(&self) -> &HashMap<String, String> {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// 改写查询涉及的所有资源: 自身、连接、
    /// 子查询以及插入来源。
    pub fn apply(&self, mut query: Query) -> Query {
        if !self.is_empty() {
            self.rename(&mut query);
        }
        query
    }

    fn rename(&self, query: &mut Query) {
        query.resource = self.table_name(&query.resource).to_string();
        for join in &mut query.joins {
            join.resource = self.table_name(&join.resource).to_string();
            self.rename_filter(&mut join.filter);
        }
        for field in &mut query.fields {
            if let Field::Subquery { query: sub, .. } = field {
                self.rename(sub.query_mut());
            }
        }
        self.rename_filter(&mut query.filter);
        if let Some(source) = &mut query.source {
            self.rename(source);
        }
    }

    fn rename_filter(&self, filter: &mut Filter) {
        for (_, value) in filter.iter_mut() {
            match value {
                FilterValue::Subquery(sub) => self.rename(sub.query_mut()),
                FilterValue::Group(group) => self.rename_filter(group),
                _ => {}
            }
        }
    }
}

/// 查询分发器的顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dialect: DialectKind,
    pub table_mapping: TableMapping,
    /// `resource -> [rows]` 格式的 JSON 文件, 加载到内存后端
    pub fixtures: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    pub fn compiler(&self) -> SqlCompiler {
        SqlCompiler::from_boxed(self.dialect.dialect())
    }

    /// 以内存后端形式返回配置的固定数据; 未配置文件时为空
    pub fn memory_backend(&self) -> Result<MemoryBackend, ConfigError> {
        match &self.fixtures {
            Some(path) => load_fixtures(path),
            None => Ok(MemoryBackend::new()),
        }
    }
}

/// 加载固定数据文件: 每个资源映射到一个行对象数组的 JSON 对象
pub fn load_fixtures<P: AsRef<Path>>(path: P) -> Result<MemoryBackend, ConfigError> {
    let path = path.as_ref();
    let document: Value = read_json(path)?;
    let invalid = |message: String| ConfigError::Fixtures {
        path: path.display().to_string(),
        message,
    };

    let Value::Object(tables) = document else {
        return Err(invalid("expected an object of resource -> rows".to_string()));
    };

    let mut backend = MemoryBackend::new();
    for (resource, rows) in tables {
        let Value::Array(items) = rows else {
            return Err(invalid(format!("`{resource}` is not an array")));
        };
        let rows = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(row) => Ok(row),
                _ => Err(invalid(format!("`{resource}[{i}]` is not an object"))),
            })
            .collect::<Result<Vec<Row>, _>>()?;
        backend.insert_table(resource, rows);
    }
    Ok(backend)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.display().to_string()));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}
