use anyhow::Context;
use clap::Parser;
use env_logger::Env;

use drawnet::cli::TrainArgs;
use drawnet::data::{DatasetKind, Split};
use drawnet::layers::Init;
use drawnet::logging::{plot_channels, Callback, MetricsLogger};
use drawnet::models::Draw;
use drawnet::rng::{resume_seed, rng_from_seed};
use drawnet::train::{
    Checkpointer, PlotLogger, Printing, Progress, Timing, TrainSettings, Trainer,
};
use drawnet::util::logging::format_experiment_banner;
use drawnet::weights::load_checkpoint;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = TrainArgs::parse();

    let (config, resume) = match &args.resume {
        Some(path) => {
            let ckpt = load_checkpoint(path)
                .with_context(|| format!("loading checkpoint {}", path.display()))?;
            // Flags still override what the checkpoint was trained with.
            let config = args.apply(ckpt.config.clone());
            config.validate().context("invalid configuration")?;
            (config, Some(ckpt))
        }
        None => (args.resolve().context("invalid configuration")?, None),
    };

    println!("{}", format_experiment_banner(&config));

    let dataset = DatasetKind::Mnist;
    let train = dataset
        .load(Split::Train, &config.data_dir)
        .with_context(|| format!("loading MNIST from {}", config.data_dir.display()))?;
    let test = if config.monitor_test {
        Some(dataset.load(Split::Test, &config.data_dir)?)
    } else {
        None
    };
    log::info!(
        "loaded {} training images{}",
        train.len(),
        test.as_ref()
            .map(|t| format!(" and {} test images", t.len()))
            .unwrap_or_default()
    );

    anyhow::ensure!(
        train.iter().all(|x| x.len() == dataset.x_dim()),
        "training images must have {} pixels",
        dataset.x_dim()
    );

    let epochs_done = resume.as_ref().map_or(0, |ckpt| ckpt.epochs_done);
    let mut rng = rng_from_seed(resume_seed(config.seed, epochs_done));
    let mut model = Draw::new(config.model_config(), Init::default(), &mut rng)?;
    log::info!("model has {} parameters", model.num_parameters());

    let optimizer = config.optimizer.build(config.learning_rate);
    let schedule = config.lr_schedule.build(config.learning_rate);
    let settings = TrainSettings {
        epochs: config.epochs,
        batch_size: config.batch_size,
        shuffle: config.shuffle,
    };
    let mut trainer = Trainer::new(model, optimizer, schedule, settings, rng);

    let mut checkpointer = Checkpointer::new(config.checkpoint_path(), config.clone());
    if let Some(ckpt) = &resume {
        trainer.resume(ckpt).context("restoring checkpoint")?;
        checkpointer = checkpointer.with_history(ckpt.history.clone());
        log::info!(
            "resuming {} after {} epochs ({} iterations)",
            ckpt.name,
            ckpt.epochs_done,
            ckpt.iterations_done
        );
    }

    let plot_logger = MetricsLogger::new(config.plot_dir(), &plot_channels(config.n_iter))
        .context("creating plot directory")?;
    let mut callbacks: Vec<Box<dyn Callback>> = vec![
        Box::new(Timing::default()),
        Box::new(Progress::default()),
        Box::new(Printing),
        Box::new(PlotLogger::new(plot_logger)),
        Box::new(checkpointer),
    ];

    let history = trainer.run(&train, test.as_deref(), &mut callbacks)?;
    if let Some(last) = history.last() {
        if let Some(v) = last.get("train_nll_bound") {
            log::info!("final train_nll_bound {v:.4}");
        }
    }
    Ok(())
}
