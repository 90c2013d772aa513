use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use image::{GrayImage, Luma};

use drawnet::data::MNIST_SIDE;
use drawnet::math::Matrix;
use drawnet::rng::rng_from_seed;
use drawnet::weights::{load_checkpoint, model_from_checkpoint};

/// Draw samples from a trained model, one grid row per recurrent step.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Checkpoint written by train_draw
    checkpoint: PathBuf,

    /// Number of samples (grid columns)
    #[arg(long, default_value_t = 8)]
    samples: usize,

    /// Output PNG
    #[arg(long, default_value = "samples.png")]
    out: PathBuf,

    /// Recurrent steps to run; defaults to the trained step count
    #[arg(long)]
    steps: Option<usize>,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

const PAD: u32 = 1;

/// Tile `frames[step]` (each `samples x side*side`) into a grid.
fn render_grid(frames: &[Matrix], side: usize) -> GrayImage {
    let cols = frames.first().map_or(0, |f| f.rows) as u32;
    let rows = frames.len() as u32;
    let cell = side as u32 + PAD;
    let mut img = GrayImage::from_pixel(cols * cell + PAD, rows * cell + PAD, Luma([0]));
    for (r, frame) in frames.iter().enumerate() {
        for c in 0..frame.rows {
            for (i, &v) in frame.row(c).iter().enumerate() {
                let x = c as u32 * cell + PAD + (i % side) as u32;
                let y = r as u32 * cell + PAD + (i / side) as u32;
                let level = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                img.put_pixel(x, y, Luma([level]));
            }
        }
    }
    img
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let ckpt = load_checkpoint(&args.checkpoint)
        .with_context(|| format!("loading checkpoint {}", args.checkpoint.display()))?;
    let model = model_from_checkpoint(&ckpt)?;
    let steps = args.steps.unwrap_or(model.config().n_iter);
    anyhow::ensure!(
        model.config().x_dim == MNIST_SIDE * MNIST_SIDE,
        "checkpoint was not trained on {MNIST_SIDE}x{MNIST_SIDE} images"
    );

    let mut rng = rng_from_seed(args.seed);
    let frames = model.generate(args.samples, steps, &mut rng);
    render_grid(&frames, MNIST_SIDE)
        .save(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;
    log::info!(
        "wrote {} samples over {} steps to {}",
        args.samples,
        steps,
        args.out.display()
    );
    Ok(())
}
