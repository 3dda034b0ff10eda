use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use query_dispatcher::backend::Backend;
use query_dispatcher::config::EngineConfig;
use query_dispatcher::memory::MemoryBackend;
use query_dispatcher::parser::parse_str;
use query_dispatcher::sql_compiler::SqlCompiler;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 加载命令行指定的配置文件, 未指定时使用默认配置
fn load_config() -> Result<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            EngineConfig::from_json_file(&path).with_context(|| format!("loading config {path}"))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    init_tracing();

    let config = load_config()?;
    let compiler = config.compiler();
    let mut memory = config.memory_backend().context("loading fixtures")?;
    info!(
        dialect = compiler.dialect().name(),
        resources = memory.resources().count(),
        "query dispatcher ready"
    );

    println!("--- Query Dispatcher ---");
    println!("dialect: {}", compiler.dialect().name());
    for (resource, table) in config.table_mapping.mappings() {
        println!("  {resource} -> {table}");
    }
    println!("enter a JSON query document, `:tables` to list fixtures, `:quit` to exit\n");

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("query> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                match line {
                    ":quit" | ":q" => break,
                    ":tables" => print_tables(&memory),
                    _ => run(line, &config, &compiler, &mut memory),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn print_tables(memory: &MemoryBackend) {
    for resource in memory.resources() {
        let rows = memory.table(resource).map_or(0, |rows| rows.len());
        println!("  {resource} ({rows} rows)");
    }
}

/// 先打印编译出的语句, 再打印在内存中执行查询的结果
fn run(line: &str, config: &EngineConfig, compiler: &SqlCompiler, memory: &mut MemoryBackend) {
    let query = match parse_str(line) {
        Ok(query) => query,
        Err(err) => {
            println!("✗ {err}");
            return;
        }
    };

    match compiler.compile(&config.table_mapping.apply(query.clone())) {
        Ok(Some(statement)) => {
            println!("[sql]    {}", statement.sql);
            println!("[params] {}", Value::Array(statement.params));
        }
        Ok(None) => println!("[sql]    refused: update/delete without conditions"),
        Err(err) => println!("✗ {err}"),
    }

    let result = memory.execute(query);
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("[memory] {json}"),
        Err(err) => println!("✗ {err}"),
    }
}
