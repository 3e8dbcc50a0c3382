//! 🏎️ How fast do lines turn into records, and how much does a bad line cost?
//!
//! Run with: cargo bench --bench record_parser_bench

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use futures::{TryStreamExt, stream};
use tokio::runtime::Runtime;

use tport::{InvalidLinePolicy, RecordParser};

fn lines(count: usize, every_nth_is_garbage: Option<usize>) -> Vec<String> {
    (0..count)
        .map(|i| match every_nth_is_garbage {
            Some(n) if i % n == 0 => format!("garbage line {}", i),
            _ => format!(
                "{{\"id\":\"tag:search.twitter.com,2005:{}\",\"text\":\"benchmark tweet number {}\",\"lang\":\"en\",\"retweets\":{}}}",
                i, i, i % 97
            ),
        })
        .collect()
}

fn bench_records(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("record_parser");

    for (label, garbage) in [("clean", None), ("one_in_ten_bad", Some(10))] {
        let input = lines(10_000, garbage);
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("records", label), &input, |b, input| {
            b.to_async(&runtime).iter(|| async {
                let parser = RecordParser::new(InvalidLinePolicy::Silent);
                let source = stream::iter(input.iter().cloned().map(Ok));
                let records: Vec<_> = parser.records(source).try_collect().await.unwrap();
                black_box(records.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_records);
criterion_main!(benches);
