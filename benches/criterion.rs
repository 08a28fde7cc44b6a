use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::Standard;
use rnn_sentiment::{
    autodiff::Tape,
    model::{Classifier, LayerSpec, ModelConfig, RecurrentKind},
    sequence::{pad_sequences, Side},
    tensor::Tensor,
};

fn matmul(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(12345u64);
    let mut group = c.benchmark_group("matmul");
    for size in [4, 8, 16, 32, 64, 96, 128] {
        let t1 = Tensor::rand([size, size], &mut rng, &Standard);
        let t2 = Tensor::rand([size, size], &mut rng, &Standard);
        group.bench_with_input(BenchmarkId::new("cpu", size), &size, |b, _| {
            b.iter(|| black_box(t1.matmul(&t2)))
        });
    }
    group.finish();
}

fn forward_backward(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(12345u64);
    let mut group = c.benchmark_group("forward_backward");
    group.sample_size(10);
    for kind in [RecurrentKind::Simple, RecurrentKind::Lstm] {
        for len in [50, 200] {
            let config = ModelConfig::stacked(10_000, len, 32, LayerSpec::new(kind, 32), 1);
            let model = Classifier::build(&config, &mut rng).unwrap();
            let row = |i: u32| -> Vec<u32> {
                (0..len as u32).map(|t| 1 + (i * 31 + t) % 9_999).collect()
            };
            let sequences: Vec<Vec<u32>> = (0..32).map(row).collect();
            let batch = pad_sequences(&sequences, len, Side::Pre, Side::Pre).unwrap();
            let targets = Tensor::from_fn([32, 1], |i, _| (i % 2) as f32);
            let name = format!("{kind:?}").to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, len), &len, |b, _| {
                b.iter(|| {
                    let tape = Tape::default();
                    let bound = model.bind(&tape);
                    let loss = bound
                        .forward(&batch, &[])
                        .unwrap()
                        .bce_with_logits(&targets)
                        .unwrap();
                    black_box(bound.gradients(loss))
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, matmul, forward_backward);
criterion_main!(benches);
