use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fetch_rls::config::InterceptorConfig;
use fetch_rls::memory::{MemoryEngine, MemoryStore};
use fetch_rls::parser::parse;
use fetch_rls::sql_compiler::SqlCompiler;
use fetch_rls::store::{QueryType, SavedView, StateCode};
use fetch_rls::writer::serialize;
use fetch_rls::{ExecutionContext, Interceptor, Operation, StructuredQuery};
use std::collections::HashMap;
use std::hint::black_box;
use uuid::Uuid;

const QUERIES: [(&str, &str); 3] = [
    ("simple", "<fetch><entity name='account'><filter><condition attribute='revenue' operator='gt' value='1000'/></filter></entity></fetch>"),
    ("medium", "<fetch top='50'><entity name='account'><attribute name='name'/><attribute name='revenue'/><filter type='or'><condition attribute='name' operator='like' value='Con%'/><condition attribute='revenue' operator='ge' value='5000'/></filter><filter><condition attribute='statuscode' operator='in'><value>1</value><value>2</value></condition></filter></entity></fetch>"),
    ("complex", "<fetch><entity name='account'><filter><condition attribute='revenue' operator='gt' value='1000'/></filter><link-entity name='contact' from='contactid' to='primarycontactid' alias='pc'><filter><condition attribute='statecode' operator='eq' value='0'/></filter><link-entity name='systemuser' from='systemuserid' to='ownerid' link-type='outer'/></link-entity></entity></fetch>"),
];

// 生成指定数量的隐藏过滤器
fn hidden_views(count: usize) -> Vec<SavedView> {
    (0..count)
        .map(|i| SavedView {
            name: format!("Hidden filter {} /type=hidden", i),
            returned_type_code: "account".to_string(),
            fetch_xml: format!(
                "<fetch><entity name='account'><filter><condition attribute='region' operator='ne' value='r{}'/></filter></entity></fetch>",
                i
            ),
            query_type: QueryType::Public,
            state_code: StateCode::Active,
        })
        .collect()
}

// 基准测试：解析与序列化性能
fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_performance");

    for (name, fetch) in QUERIES {
        group.bench_with_input(BenchmarkId::new("parse", name), &fetch, |b, &fetch| {
            b.iter(|| black_box(parse(black_box(fetch)).expect("解析应该成功")))
        });

        let tree = parse(fetch).expect("解析应该成功");
        group.bench_with_input(BenchmarkId::new("serialize", name), &tree, |b, tree| {
            b.iter(|| black_box(serialize(black_box(tree))))
        });
    }

    group.finish();
}

// 基准测试：按隐藏过滤器数量改写
fn benchmark_rewrite(c: &mut Criterion) {
    let ctx = ExecutionContext::new(Uuid::nil(), "account");
    let mut group = c.benchmark_group("rewrite_performance");

    for count in [0usize, 1, 5, 25] {
        let interceptor = Interceptor::new(
            MemoryStore::new(hidden_views(count)),
            MemoryEngine::default(),
            InterceptorConfig::default(),
        );
        group.bench_with_input(BenchmarkId::new("intercept", count), &count, |b, _| {
            b.iter(|| {
                let mut operation = Operation::RetrieveMultiple(StructuredQuery::fetch(QUERIES[2].1));
                let disposition = interceptor.intercept(&ctx, &mut operation).expect("改写应该成功");
                black_box((disposition, operation))
            })
        });
    }

    group.finish();
}

// 基准测试：改写后查询的SQL编译
fn benchmark_sql_compiler(c: &mut Criterion) {
    let mut compiler = SqlCompiler::new();
    let mut table_mapping = HashMap::new();
    table_mapping.insert("account".to_string(), "accounts".to_string());
    table_mapping.insert("contact".to_string(), "contacts".to_string());
    compiler.set_table_mapping(table_mapping);

    let mut group = c.benchmark_group("sql_compiler_performance");

    for (name, fetch) in QUERIES {
        let tree = parse(fetch).expect("解析应该成功");
        group.bench_with_input(BenchmarkId::new("compile", name), &tree, |b, tree| {
            b.iter(|| black_box(compiler.compile(black_box(tree)).expect("编译应该成功")))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_parse, benchmark_rewrite, benchmark_sql_compiler);
criterion_main!(benches);
