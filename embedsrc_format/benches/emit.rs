//! Emitter hot-path benchmarks.
//!
//! Measures the per-byte cost of the specialised emitters against a memory
//! sink, which is the exact configuration the zero-copy engines run.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use embedsrc_format::{emit_chunk, emit_separated, MemorySink, BYTES_PER_CHUNK, MAX_CHUNK_LEN};

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");

    group.throughput(Throughput::Bytes(BYTES_PER_CHUNK as u64));
    group.bench_function("chunk", |b| {
        let values: [u8; BYTES_PER_CHUNK] = [0, 9, 10, 99, 100, 200, 254, 255];
        let mut buf = [0u8; MAX_CHUNK_LEN];
        b.iter(|| {
            let mut sink = MemorySink::new(&mut buf);
            emit_chunk(&mut sink, black_box(&values));
            black_box(sink.written())
        })
    });

    group.throughput(Throughput::Bytes(BYTES_PER_CHUNK as u64));
    group.bench_function("separated_singles", |b| {
        let values: [u8; BYTES_PER_CHUNK] = [0, 9, 10, 99, 100, 200, 254, 255];
        let mut buf = [0u8; MAX_CHUNK_LEN];
        b.iter(|| {
            let mut sink = MemorySink::new(&mut buf);
            for &v in black_box(&values).iter() {
                emit_separated(&mut sink, v);
            }
            black_box(sink.written())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_emit);
criterion_main!(benches);
