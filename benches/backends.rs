//! Benchmarks for the fit backends.
//!
//! Each backend fits the same noisy two-peak scan; a second group measures a
//! global fit over several datasets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use scanfit::backends::{BackendRegistry, BoundedBackend};
use scanfit::config::FitOptions;
use scanfit::dataset::Dataset;
use scanfit::fit::Fitter;
use scanfit::global::GlobalFit;
use scanfit::model::parse_model;

const TWO_PEAKS: &str = "Gauss('p1', pos=-1, ampl=3, fwhm=1) \
    + Lorentz('p2', pos=1.5, ampl=2, width=0.8) + Background('b', bkgd=0)";

fn gaussian(x: f64, pos: f64, ampl: f64, fwhm: f64) -> f64 {
    ampl * (-4.0 * 2f64.ln() * (x - pos).powi(2) / (fwhm * fwhm)).exp()
}

fn lorentzian(x: f64, pos: f64, ampl: f64, fwhm: f64) -> f64 {
    ampl / (1.0 + 4.0 * (x - pos).powi(2) / (fwhm * fwhm))
}

/// Two overlapping peaks on a flat background, with seeded noise
fn scan(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let x = Array1::<f64>::linspace(-5.0, 5.0, n);
    let y = x.mapv(|x| {
        gaussian(x, -1.2, 4.0, 1.3) + lorentzian(x, 1.8, 2.5, 0.6) + 0.4 + noise.sample(&mut rng)
    });
    Dataset::new(x, y, Array1::from_elem(n, 0.05)).unwrap()
}

fn bench_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_peaks");
    let registry = BackendRegistry::default();

    for n in [100, 1000] {
        let data = scan(n, 42);
        for name in registry.names() {
            let fitter = Fitter::with_backend_name(name).unwrap();
            group.bench_with_input(BenchmarkId::new(name, n), &data, |b, data| {
                b.iter(|| {
                    let mut model = parse_model(TWO_PEAKS).unwrap();
                    let _ = fitter.fit(model.as_mut(), black_box(data));
                })
            });
        }
    }

    group.finish();
}

fn bench_parallel_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_jacobian");
    let data = scan(5000, 7);

    for parallel in [false, true] {
        let fitter = Fitter::with_backend_name("bounded")
            .unwrap()
            .with_options(FitOptions::new().with("parallel", parallel));
        group.bench_with_input(BenchmarkId::new("bounded", parallel), &data, |b, data| {
            b.iter(|| {
                let mut model = parse_model(TWO_PEAKS).unwrap();
                let _ = fitter.fit(model.as_mut(), black_box(data));
            })
        });
    }

    group.finish();
}

fn bench_global(c: &mut Criterion) {
    let mut group = c.benchmark_group("global_fit");
    group.sample_size(20);

    for count in [2, 8] {
        let datasets: Vec<Dataset> = (0..count).map(|i| scan(200, i as u64)).collect();
        let model = parse_model(
            "Gauss('p1', pos=overall(-1), ampl=3, fwhm=1) \
             + Lorentz('p2', pos=overall(1.5), ampl=2, width=0.8) + Background('b', bkgd=0)",
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("datasets", count), &datasets, |b, datasets| {
            b.iter(|| {
                let mut global = GlobalFit::new(model.as_ref(), datasets.clone()).unwrap();
                let _ = global.fit(&BoundedBackend, &FitOptions::new());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_backends, bench_parallel_jacobian, bench_global);
criterion_main!(benches);
