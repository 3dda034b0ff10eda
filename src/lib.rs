//! 与存储无关的查询模型, 带两个可互换的后端: 生成参数化、
//! 特定方言 SQL 的编译器, 以及在进程内的行上执行同一查询的
//! 内存解释器。
//!
//! ```
//! use query_dispatcher::{Query, SqlCompiler};
//!
//! let query = Query::new("users")
//!     .where_("age >=", 23)
//!     .where_("name like", "%test%")
//!     .order("id")
//!     .limit(5);
//!
//! let statement = SqlCompiler::mysql().compile(&query).unwrap().unwrap();
//! assert_eq!(
//!     statement.sql,
//!     "SELECT * FROM `users` WHERE `age` >= ? AND `name` LIKE ? ORDER BY `id` ASC LIMIT 5"
//! );
//! assert_eq!(statement.params.len(), 2);
//! ```

pub mod ast;
pub mod backend;
pub mod builder;
pub mod compare;
pub mod config;
pub mod dialect;
pub mod error;
pub mod filterer;
pub mod interpreter;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod result;
pub mod sorter;
pub mod sql_compiler;
pub mod token;

pub use ast::{Direction, Field, Filter, FilterValue, Join, JoinType, Query, QueryType, Row, Subquery};
pub use backend::{Backend, Connection, Execution, SqlBackend};
pub use builder::QueryBuilder;
pub use error::{DbError, QueryError};
pub use filterer::{Filterer, RowSource};
pub use memory::MemoryBackend;
pub use result::QueryResult;
pub use sorter::{sort, OrderSpec};
pub use sql_compiler::{CompiledStatement, SqlCompiler};
