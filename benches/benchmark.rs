use std::hint::black_box;

use casefile::compile::compile;
use casefile::parse::parse;
use casefile::regexp::{Matcher, regexp};
use criterion::{Criterion, criterion_group, criterion_main};

const QUERIES: [(&str, &str); 4] = [
    ("bare", "Jane"),
    ("vague", "user:Jane Doe & {gender}=Female"),
    ("column", "user[first_name;notes]{last_name}:Doe | {side}=1"),
    ("chain", "case{name}='Case 7' & user{last_name}=Doe"),
];

pub fn criterion_benchmark(c: &mut Criterion) {
    for (name, input) in QUERIES {
        c.bench_function(&format!("parse {name}"), |b| b.iter(|| parse(black_box(input))));
        c.bench_function(&format!("compile {name}"), |b| b.iter(|| compile(black_box(input))));
    }

    let values: Vec<String> = (0..1000).map(|n| format!("Person {n} of Janssen & Co")).collect();
    c.bench_function("regexp 1k uncached", |b| {
        b.iter(|| {
            values
                .iter()
                .filter(|v| regexp(black_box(".*janssen.*"), Some(v.as_str())))
                .count()
        })
    });
    let matcher = Matcher::compile(".*janssen.*");
    c.bench_function("regexp 1k cached", |b| {
        b.iter(|| values.iter().filter(|v| matcher.is_match(black_box(v))).count())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
