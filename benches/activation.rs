//! Activation-matrix benchmarks.
//!
//! Measures the transform that maps frame rows to rule indicators and linear
//! terms, sequentially and across the rayon pool.
//!
//! ```bash
//! cargo bench --bench activation
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use rulefit::model::{ModelType, RuleFitParams};
use rulefit::testing::regression_frame;
use rulefit::utils::Parallelism;
use rulefit::RuleFitModel;

fn bench_transform(c: &mut Criterion) {
    let params = RuleFitParams::builder()
        .response_column("y")
        .model_type(ModelType::RulesAndLinear)
        .min_rule_length(2)
        .max_rule_length(4)
        .rule_generation_ntrees(20)
        .build()
        .expect("valid params");
    let model = RuleFitModel::train(&regression_frame(2_000, 1), params).expect("training succeeds");

    let mut group = c.benchmark_group("activation/transform");
    for rows in [1_000usize, 10_000, 50_000] {
        let frame = regression_frame(rows, 2);
        let x = frame
            .feature_matrix(model.schema(), &Default::default())
            .expect("schema matches");
        group.throughput(Throughput::Elements(rows as u64));

        for (label, parallelism) in [("sequential", Parallelism::Sequential), ("parallel", Parallelism::Parallel)] {
            group.bench_with_input(BenchmarkId::new(label, rows), &x, |b, x| {
                b.iter(|| {
                    black_box(model.layout().transform(model.ensemble(), black_box(x.view()), parallelism))
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
