use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nda::{all_reduce, scatter, Array, ArrayLike, LocalWorld, ReduceOp, SliceArg};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;

fn random_matrix(size: usize, seed: u64) -> Array<f64, 2> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array::from_fn([size, size], |_| rng.gen::<f64>())
}

fn bench_assign_transposed(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign_transposed");
    for size in [100usize, 500] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let a = random_matrix(size, 0);
        let at = a.view().transpose();

        group.bench_with_input(BenchmarkId::new("to_array", size), &size, |b, _| {
            b.iter(|| at.to_array());
        });

        let mut out = Array::<f64, 2>::zeros([size, size]);
        group.bench_with_input(BenchmarkId::new("assign", size), &size, |b, _| {
            b.iter(|| out.assign(&at).unwrap());
        });
    }
    group.finish();
}

fn bench_strided_slice(c: &mut Criterion) {
    let mut group = c.benchmark_group("strided_slice");
    let a = random_matrix(512, 1);
    let every_other = a
        .view()
        .slice::<2>(&[SliceArg::range(0, 512, 2), SliceArg::range(1, 512, 2)])
        .unwrap();
    group.throughput(Throughput::Elements(every_other.len() as u64));
    group.bench_function("to_vec", |b| b.iter(|| every_other.to_vec()));
    group.finish();
}

fn bench_collectives(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_world");
    group.measurement_time(Duration::from_secs(5));
    let a = random_matrix(256, 2);
    for ranks in [2usize, 4] {
        group.bench_with_input(BenchmarkId::new("scatter", ranks), &ranks, |b, &ranks| {
            b.iter(|| LocalWorld::run(ranks, |comm| scatter(&a, comm, 0).map(|p| p.len())));
        });
        group.bench_with_input(BenchmarkId::new("all_reduce_sum", ranks), &ranks, |b, &ranks| {
            b.iter(|| {
                LocalWorld::run(ranks, |comm| all_reduce(&a, comm, ReduceOp::Sum).map(|r| r.len()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assign_transposed, bench_strided_slice, bench_collectives);
criterion_main!(benches);
