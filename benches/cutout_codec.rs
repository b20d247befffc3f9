//! Cutout codec benchmarks
//!
//! Encode/decode throughput of a 512x512x16 block:
//! - LZ4 vs ZSTD
//! - uint8 vs uint16 samples, with and without byte shuffle
//!
//! Run with: cargo bench --bench cutout_codec

use bosscore::cutout::{Compression, CutoutCodec};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

const VOXELS: usize = 512 * 512 * 16;

/// Sparse-ish image data: mostly background with noisy foreground
fn sample_volume(width: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut raw = vec![0u8; VOXELS * width];
    for sample in raw.chunks_exact_mut(width) {
        if rng.gen_bool(0.3) {
            sample[0] = rng.gen();
        }
    }
    raw
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("cutout_encode");
    group.sample_size(20);

    for width in [1usize, 2] {
        let raw = sample_volume(width);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        for compression in [Compression::Lz4, Compression::Zstd] {
            for shuffle in [false, true] {
                let codec = CutoutCodec::new(compression).with_shuffle(shuffle);
                let id = format!("{}/u{}/shuffle={shuffle}", compression.as_str(), width * 8);
                group.bench_with_input(BenchmarkId::new("encode", id), &raw, |b, raw| {
                    b.iter(|| codec.encode(black_box(raw), width).unwrap());
                });
            }
        }
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("cutout_decode");
    group.sample_size(20);

    for width in [1usize, 2] {
        let raw = sample_volume(width);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        for compression in [Compression::Lz4, Compression::Zstd] {
            let codec = CutoutCodec::new(compression);
            let block = codec.encode(&raw, width).unwrap();
            let id = format!("{}/u{}", compression.as_str(), width * 8);
            group.bench_with_input(BenchmarkId::new("decode", id), &block, |b, block| {
                b.iter(|| codec.decode(black_box(block), width).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_zero_block(c: &mut Criterion) {
    let codec = CutoutCodec::default();
    c.bench_function("cutout_zero_block_u8", |b| {
        b.iter(|| codec.zeros(black_box(VOXELS), 1).unwrap());
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_zero_block);
criterion_main!(benches);
