//! nalmux 性能基准测试.
//!
//! 覆盖 Annex B 分割与完整封装两条路径.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalmux::codec::{AnnexBSegmenter, CodecKind};
use nalmux::format::MemorySink;
use nalmux::{RemuxOptions, remux_annex_b};

/// 构造 `pictures` 帧的 H.264 码流, 每 30 帧一个 IDR
fn make_avc_stream(pictures: usize, slice_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(pictures * (slice_len + 4) + 32);
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E, 0xAB, 0xCD]);
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80]);
    for i in 0..pictures {
        let header = if i % 30 == 0 { 0x65 } else { 0x41 };
        data.extend_from_slice(&[0x00, 0x00, 0x01, header, 0x88]);
        // 不含 0x00 的伪切片数据
        data.extend((0..slice_len).map(|j| (j % 251) as u8 + 1));
    }
    data
}

fn bench_segment(c: &mut Criterion) {
    let stream = make_avc_stream(300, 4096);
    let mut group = c.benchmark_group("segment");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("annexb_300x4k", |b| {
        b.iter(|| AnnexBSegmenter::new(black_box(&stream)).count());
    });
    group.finish();
}

fn bench_remux(c: &mut Criterion) {
    let stream = make_avc_stream(300, 4096);
    let mut group = c.benchmark_group("remux");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    for (name, sequential, fragmented) in [
        ("monolithic", false, false),
        ("sequential", true, false),
        ("fragmented", false, true),
    ] {
        let opts = RemuxOptions {
            sequential,
            fragmented,
            ..RemuxOptions::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut sink = MemorySink::new();
                remux_annex_b(black_box(&stream), &mut sink, CodecKind::Avc, &opts).unwrap();
                sink.into_data().len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_segment, bench_remux);
criterion_main!(benches);
