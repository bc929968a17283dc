//! Benchmarks for grammar compilation and the matching engine
//!
//! Three representative workloads:
//! 1. Compile - textual PEG to IR
//! 2. Match/find - the engine over a medium input
//! 3. Replace/split - the scanning string operations
//!
//! Run with: cargo bench --bench matching

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pegmatch::parse_peg;

const ASSIGN_GRAMMAR: &str = "{\\ident} '=' {\\d+}";

const RULE_GRAMMAR: &str = "S <- Pair (';' Pair)*
                            Pair <- Key '=' Value
                            Key <- \\ident
                            Value <- \\d+";

fn sample_input() -> String {
    let mut s = String::new();
    for i in 0..200 {
        if i > 0 {
            s.push(';');
        }
        s.push_str(&format!("key_{}={}", i, i * 37));
    }
    s
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_assign_grammar", |b| {
        b.iter(|| parse_peg(black_box(ASSIGN_GRAMMAR)).expect("compiles"))
    });
    c.bench_function("compile_rule_grammar", |b| {
        b.iter(|| parse_peg(black_box(RULE_GRAMMAR)).expect("compiles"))
    });
}

fn bench_match(c: &mut Criterion) {
    let pat = parse_peg(RULE_GRAMMAR).expect("compiles");
    let input = sample_input();
    c.bench_function("match_key_value_list", |b| {
        b.iter(|| pat.match_len(black_box(&input), 0))
    });

    let needle = parse_peg("'key_199'").expect("compiles");
    c.bench_function("find_near_end", |b| {
        b.iter(|| needle.find(black_box(&input), 0))
    });
}

fn bench_string_ops(c: &mut Criterion) {
    let pair = parse_peg(ASSIGN_GRAMMAR).expect("compiles");
    let digits = parse_peg("\\d+").expect("compiles");
    let input = sample_input();

    c.bench_function("replace_pairs", |b| {
        b.iter(|| pair.replace(black_box(&input), "$2:$1"))
    });
    c.bench_function("split_on_numbers", |b| {
        b.iter(|| digits.split(black_box(&input)).count())
    });
}

criterion_group!(benches, bench_compile, bench_match, bench_string_ops);
criterion_main!(benches);
