use anyhow::{anyhow, Context, Result};
use fetch_rls::config::{Fixture, InterceptorConfig};
use fetch_rls::engine::RecordSet;
use fetch_rls::memory::{MemoryEngine, MemoryStore};
use fetch_rls::parser::parse;
use fetch_rls::repository::HiddenFilterRepository;
use fetch_rls::sql_compiler::SqlCompiler;
use fetch_rls::{Disposition, EntityReference, ExecutionContext, Interceptor, Operation, StructuredQuery};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const FIXTURE_PATH: &str = "rls_fixture.json";
const CONFIG_PATH: &str = "rls_config.json";
const PROMPT: &str = "rls> ";

/// 加载拦截器配置，失败时使用默认配置
fn load_config() -> InterceptorConfig {
    match InterceptorConfig::from_json_file(CONFIG_PATH) {
        Ok(config) => {
            println!("✅ 成功从JSON配置文件加载拦截器配置: {}", CONFIG_PATH);
            println!("✅ 加载了 {} 个表映射配置", config.table_mapping.len());
            for (entity, table) in &config.table_mapping {
                println!("  {} -> {}", entity, table);
            }
            config
        }
        Err(e) => {
            println!("⚠️ 无法加载JSON配置文件 ({}), 使用默认配置", e);
            InterceptorConfig::default()
        }
    }
}

/// 加载保存视图和内存记录，失败时从空数据开始
fn load_fixture() -> Fixture {
    match Fixture::from_json_file(FIXTURE_PATH) {
        Ok(fixture) => {
            println!(
                "✅ 加载了 {} 个保存视图, {} 个实体的记录",
                fixture.views.len(),
                fixture.records.len()
            );
            fixture
        }
        Err(e) => {
            println!("⚠️ 无法加载数据文件 ({}), 使用空数据", e);
            Fixture::default()
        }
    }
}

struct Console {
    interceptor: Interceptor<MemoryStore, MemoryEngine>,
    compiler: SqlCompiler,
    user_id: Uuid,
}

impl Console {
    fn ctx(&self, entity: &str) -> ExecutionContext {
        ExecutionContext::new(self.user_id, entity)
    }

    /// Returns false when the console should exit.
    fn handle(&self, line: &str) -> Result<bool> {
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "rewrite" => {
                let (entity, fetch) = split_arg(rest)?;
                let query = self.rewrite(entity, fetch)?;
                println!("{}", query);
            }
            "sql" => {
                let tree = parse(rest)?;
                let entity = tree
                    .root_entity()?
                    .attribute("name")
                    .ok_or_else(|| anyhow!("root entity has no name"))?
                    .to_string();
                let query = self.rewrite(&entity, rest)?;
                let result = self.compiler.compile_text(&query)?;
                println!("{}", result.sql);
            }
            "fetch" => {
                let (entity, fetch) = split_arg(rest)?;
                let result = self
                    .interceptor
                    .retrieve_multiple(&self.ctx(entity), StructuredQuery::fetch(fetch))?;
                print_records(&result)?;
            }
            "get" => {
                let (entity, id) = split_arg(rest)?;
                let id = Uuid::parse_str(id).with_context(|| format!("无效的记录ID: {}", id))?;
                let result = self
                    .interceptor
                    .retrieve(&self.ctx(entity), &EntityReference::new(entity, id))?;
                print_records(&result)?;
            }
            "views" => {
                let repository = HiddenFilterRepository::new(self.interceptor.store(), self.interceptor.config());
                let definitions = repository.find_hidden_filters(&self.ctx(rest), rest)?;
                println!("{} 个隐藏过滤器:", definitions.len());
                for definition in definitions {
                    println!("• {}", definition.name);
                    println!("  {}", definition.payload);
                }
            }
            "help" => print_help(),
            "quit" | "exit" => return Ok(false),
            "" => {}
            other => println!("未知命令: {} (输入 help 查看帮助)", other),
        }
        Ok(true)
    }

    fn rewrite(&self, entity: &str, fetch: &str) -> Result<String> {
        let mut operation = Operation::RetrieveMultiple(StructuredQuery::fetch(fetch));
        match self.interceptor.intercept(&self.ctx(entity), &mut operation)? {
            Disposition::Unmodified => println!("(未改写)"),
            Disposition::Rewritten(summary) => println!(
                "(应用了 {} 个隐藏过滤器: {} 个filter, {} 个link-entity)",
                summary.definitions, summary.filters, summary.links
            ),
        }
        match operation {
            Operation::RetrieveMultiple(StructuredQuery::Fetch(fetch)) => Ok(fetch.query),
            _ => Err(anyhow!("operation is not a fetch query")),
        }
    }
}

fn split_arg(rest: &str) -> Result<(&str, &str)> {
    rest.split_once(char::is_whitespace)
        .map(|(first, second)| (first, second.trim()))
        .ok_or_else(|| anyhow!("缺少参数 (输入 help 查看帮助)"))
}

fn print_records(result: &RecordSet) -> Result<()> {
    println!("{} 条 {} 记录", result.len(), result.entity_name);
    for record in &result.records {
        println!("  {}", serde_json::to_string(record)?);
    }
    Ok(())
}

fn print_help() {
    println!("命令:");
    println!("  rewrite <entity> <fetch-xml>  显示追加隐藏过滤器后的查询");
    println!("  sql <fetch-xml>               显示改写后查询对应的SQL");
    println!("  fetch <entity> <fetch-xml>    执行查询");
    println!("  get <entity> <id>             按ID读取单条记录");
    println!("  views <entity>                列出实体的隐藏过滤器");
    println!("  help                          显示帮助");
    println!("  quit                          退出");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("--- Fetch RLS: 隐藏过滤器控制台 ---");
    println!("\n[配置信息]:");
    let config = load_config();
    let (store, engine) = load_fixture().into_memory();

    let console = Console {
        compiler: SqlCompiler::from_config(&config),
        interceptor: Interceptor::new(store, engine, config),
        user_id: Uuid::nil(),
    };
    println!("\n输入 help 查看帮助, quit 退出\n");

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                match console.handle(line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("✗ {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) => println!("输入 quit 或 Ctrl-D 退出"),
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
