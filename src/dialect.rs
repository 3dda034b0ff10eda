//! SQL 方言策略: 标识符引用方式和 limit/offset 语法

use serde::{Deserialize, Serialize};

/// limit 子句所属的语句类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Update,
    Delete,
}

/// 方言放置 limit 子句的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 紧跟语句动词之后: `SELECT TOP 5 ...`、`DELETE TOP (5) FROM ...`
    AfterVerb,
    /// 放在最后: `... ORDER BY id ASC LIMIT 5`
    End,
}

/// limit/offset 窗口。limit 为 `None` 表示不限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Window {
    pub fn new(limit: Option<u64>, offset: u64) -> Self {
        Self {
            limit: limit.filter(|&n| n > 0),
            offset,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none() && self.offset == 0
    }
}

/// 各数据库产品之间不同的能力
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// 引用单个标识符片段 (表名或列名, 不含点号路径)
    fn quote_identifier(&self, ident: &str) -> String;

    /// 该窗口下 `kind` 语句的 limit 子句位置
    fn statement_order(&self, kind: StatementKind, window: Window) -> Placement;

    /// 窗口需要时返回 limit/offset 子句。`ordered` 表示
    /// 语句是否已有 `ORDER BY`
    fn limit_clause(&self, kind: StatementKind, window: Window, ordered: bool) -> Option<String>;

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }
}

/// MySQL / MariaDB: 反引号引用, 末尾 `LIMIT`
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

/// MySQL 接受的最大行数, 用于表达只有 offset 没有 limit 的情况
const MYSQL_MAX_ROWS: u64 = u64::MAX;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn statement_order(&self, _kind: StatementKind, _window: Window) -> Placement {
        Placement::End
    }

    fn limit_clause(&self, kind: StatementKind, window: Window, _ordered: bool) -> Option<String> {
        match (kind, window.limit, window.offset) {
            (StatementKind::Select, Some(limit), 0) => Some(format!("LIMIT {limit}")),
            (StatementKind::Select, Some(limit), offset) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (StatementKind::Select, None, 0) => None,
            (StatementKind::Select, None, offset) => Some(format!("LIMIT {MYSQL_MAX_ROWS} OFFSET {offset}")),
            (_, Some(limit), _) => Some(format!("LIMIT {limit}")),
            (_, None, _) => None,
        }
    }
}

/// SQLite: 双引号引用, 末尾 `LIMIT`, 只有 offset 时用 `LIMIT -1`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn statement_order(&self, _kind: StatementKind, _window: Window) -> Placement {
        Placement::End
    }

    fn limit_clause(&self, kind: StatementKind, window: Window, _ordered: bool) -> Option<String> {
        match (kind, window.limit, window.offset) {
            (StatementKind::Select, Some(limit), 0) => Some(format!("LIMIT {limit}")),
            (StatementKind::Select, Some(limit), offset) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (StatementKind::Select, None, 0) => None,
            (StatementKind::Select, None, offset) => Some(format!("LIMIT -1 OFFSET {offset}")),
            (_, Some(limit), _) => Some(format!("LIMIT {limit}")),
            (_, None, _) => None,
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }
}

/// SQL Server: 方括号引用, 动词后跟 `TOP n`;
/// 设置了 offset 时用 `OFFSET ... FETCH`, 它要求有 `ORDER BY`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl SqlDialect for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn statement_order(&self, kind: StatementKind, window: Window) -> Placement {
        match kind {
            StatementKind::Select if window.offset > 0 => Placement::End,
            _ => Placement::AfterVerb,
        }
    }

    fn limit_clause(&self, kind: StatementKind, window: Window, ordered: bool) -> Option<String> {
        match kind {
            StatementKind::Select if window.offset > 0 => {
                let mut clause = String::new();
                if !ordered {
                    clause.push_str("ORDER BY (SELECT NULL) ");
                }
                clause.push_str(&format!("OFFSET {} ROWS", window.offset));
                if let Some(limit) = window.limit {
                    clause.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
                Some(clause)
            }
            StatementKind::Select => window.limit.map(|limit| format!("TOP {limit}")),
            StatementKind::Update | StatementKind::Delete => {
                window.limit.map(|limit| format!("TOP ({limit})"))
            }
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }
}

/// 配置使用的方言选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Mysql,
    Sqlite,
    Sqlserver,
}

impl DialectKind {
    pub fn dialect(self) -> Box<dyn SqlDialect> {
        match self {
            DialectKind::Mysql => Box::new(MySql),
            DialectKind::Sqlite => Box::new(Sqlite),
            DialectKind::Sqlserver => Box::new(SqlServer),
        }
    }
}
