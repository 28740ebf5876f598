use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use layerwise::layer::{ConvolutionLayer, Layer};
use layerwise::numeric::{convolve, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tensor of `dims` filled with uniform values in [-1, 1).
fn random_tensor(rng: &mut StdRng, dims: &[usize]) -> Tensor {
    let len = dims.iter().product();
    let values = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_vec(values, dims).expect("dims match the value count")
}

fn bench_convolve_2d(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let filter = random_tensor(&mut rng, &[5, 5]);

    for size in [16usize, 32, 64].iter() {
        let input = random_tensor(&mut rng, &[*size, *size]);
        let mut output = Tensor::zeros(&[*size, *size]).expect("non-empty dims");
        c.bench_with_input(BenchmarkId::new("convolve_2d", size), size, |b, _| {
            b.iter(|| {
                output.fill(0.0);
                convolve(black_box(&input), black_box(&filter), &mut output, false, 1)
                    .expect("shapes agree");
            });
        });
    }
}

fn bench_convolution_layer(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut layer =
        ConvolutionLayer::new(&[28, 28], &[5, 5, 8], &[28, 28, 8]).expect("valid layer dims");
    layer.initialize(&mut rng);
    let input: Vec<f64> = (0..28 * 28).map(|_| rng.gen_range(0.0..1.0)).collect();

    c.bench_function("convolution_layer_activate", |b| {
        b.iter(|| {
            let out = layer.activate(black_box(&input)).expect("input fits");
            black_box(out[0]);
        });
    });

    layer.activate(&input).expect("input fits");
    let blame: Vec<f64> = (0..layer.outputs()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    layer.set_blame(blame.into()).expect("blame fits");
    c.bench_function("convolution_layer_update_gradient", |b| {
        b.iter(|| layer.update_gradient(black_box(&input)).expect("input fits"));
    });
}

criterion_group!(benches, bench_convolve_2d, bench_convolution_layer);
criterion_main!(benches);
