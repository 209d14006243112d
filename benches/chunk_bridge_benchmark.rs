//! Chunk bridge benchmarks

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use s3_adaptor::error::ErrorScope;
use s3_adaptor::stream::{ChunkReader, StreamSource};
use std::convert::Infallible;

const TOTAL: usize = 4 * 1024 * 1024;
const CHUNK: usize = 64 * 1024;

fn source() -> StreamSource<futures::stream::Iter<std::vec::IntoIter<Result<Bytes, Infallible>>>> {
    let data = Bytes::from(vec![0u8; TOTAL]);
    let chunks: Vec<Result<Bytes, Infallible>> = (0..TOTAL)
        .step_by(CHUNK)
        .map(|start| Ok(data.slice(start..start + CHUNK)))
        .collect();
    StreamSource::new(futures::stream::iter(chunks))
}

fn benchmark_read_sizes(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("bridge_read_sizes");
    group.throughput(Throughput::Bytes(TOTAL as u64));

    for read_size in [512usize, 4096, 8192, 64 * 1024].iter() {
        group.bench_with_input(format!("{}_bytes", read_size), read_size, |b, &read_size| {
            b.to_async(&runtime).iter(|| async move {
                let mut reader = ChunkReader::new(source(), ErrorScope::default());
                let mut total = 0;
                loop {
                    let outcome = reader.read(read_size).await.unwrap();
                    if outcome.ended {
                        break;
                    }
                    total += outcome.bytes.len();
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

fn benchmark_read_to_end(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("bridge_read_to_end");
    group.throughput(Throughput::Bytes(TOTAL as u64));

    group.bench_function("buffer_4mb", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut reader = ChunkReader::new(source(), ErrorScope::default());
            black_box(reader.read_to_end(8192).await.unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_read_sizes, benchmark_read_to_end);
criterion_main!(benches);
