use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;

use rovis_3d::{
    landmark::LandmarkId,
    metrics::{mean_squared_distance, PointPair3d},
    pose::Pose3d,
};

fn bench_mean_squared_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_squared_distance");
    let mut rng = StdRng::seed_from_u64(0);
    let pose = Pose3d::from_ypr(0.1, 0.2, 0.3, 0.4, 0.5, 0.6);

    for num_pairs in [100, 1000, 10000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_pairs as u64));

        let pairs = (0..*num_pairs)
            .map(|i| PointPair3d {
                this_id: LandmarkId(i),
                other_id: LandmarkId(i),
                this: [rng.random(), rng.random(), rng.random()],
                other: [rng.random(), rng.random(), rng.random()],
            })
            .collect::<Vec<_>>();

        group.bench_with_input(
            BenchmarkId::new("pairs", num_pairs),
            &pairs,
            |b, p| b.iter(|| mean_squared_distance(black_box(p), black_box(&pose))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_mean_squared_distance);
criterion_main!(benches);
