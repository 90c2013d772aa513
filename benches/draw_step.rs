use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use drawnet::layers::{Init, Layer};
use drawnet::math::Matrix;
use drawnet::models::{Draw, DrawConfig};
use drawnet::rng::rng_from_seed;

fn bench_draw(c: &mut Criterion) {
    let cfg = DrawConfig {
        x_dim: 784,
        enc_dim: 200,
        dec_dim: 200,
        z_dim: 50,
        n_iter: 5,
    };
    let mut rng = rng_from_seed(0);
    let mut model = Draw::new(cfg, Init::default(), &mut rng).unwrap();
    let data: Vec<f32> = (0..16 * 784)
        .map(|_| if rng.gen::<f32>() < 0.2 { 1.0 } else { 0.0 })
        .collect();
    let x = Matrix::from_vec(16, 784, data);

    c.bench_function("draw_forward", |bencher| {
        bencher.iter(|| black_box(model.evaluate(black_box(&x), &mut rng)));
    });

    c.bench_function("draw_forward_backward", |bencher| {
        bencher.iter(|| {
            let out = model.forward_train(black_box(&x), &mut rng);
            let terms = model.loss(&x, &out);
            model.zero_grad();
            model.backward(&x);
            black_box(terms);
        });
    });
}

criterion_group!(benches, bench_draw);
criterion_main!(benches);
