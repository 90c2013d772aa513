//! Callbacks wired into [`Trainer::run`](super::Trainer::run) by the
//! training binary.

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::config::TrainConfig;
use crate::error::Result;
use crate::logging::{Callback, EpochContext, MetricRecord, MetricsLogger};
use crate::math;
use crate::util::logging::{
    format_duration, format_epoch_summary, log_checkpoint_saved, log_total_ops,
};
use crate::weights::{export_parameters, save_checkpoint, Checkpoint};

/// Logs wall-clock time per epoch and for the whole run.
#[derive(Default)]
pub struct Timing {
    train_start: Option<Instant>,
    epoch_start: Option<Instant>,
}

impl Callback for Timing {
    fn on_train_begin(&mut self, _start_epoch: usize) -> Result<()> {
        math::reset_matrix_ops();
        self.train_start = Some(Instant::now());
        Ok(())
    }

    fn on_epoch_begin(&mut self, _epoch: usize, _num_batches: usize) {
        self.epoch_start = Some(Instant::now());
    }

    fn on_epoch_end(&mut self, ctx: &mut EpochContext<'_>) -> Result<()> {
        if let Some(start) = self.epoch_start {
            log::info!(
                "epoch {} took {}",
                ctx.record.epoch,
                format_duration(start.elapsed())
            );
        }
        Ok(())
    }

    fn on_train_end(&mut self) {
        if let Some(start) = self.train_start {
            log::info!("training took {}", format_duration(start.elapsed()));
        }
        log_total_ops(math::matrix_ops_count());
    }
}

/// One progress bar per epoch, advanced per batch.
#[derive(Default)]
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Callback for Progress {
    fn on_epoch_begin(&mut self, epoch: usize, num_batches: usize) {
        let pb = ProgressBar::new(num_batches as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_prefix(format!("epoch {epoch}"));
        self.bar = Some(pb);
    }

    fn on_batch_end(&mut self, _iteration: usize, nll_bound: f32) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("nll_bound {nll_bound:.4}"));
            pb.inc(1);
        }
    }

    fn on_epoch_end(&mut self, _ctx: &mut EpochContext<'_>) -> Result<()> {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
        Ok(())
    }
}

/// Logs a summary line and every monitored channel after each epoch.
pub struct Printing;

impl Callback for Printing {
    fn on_epoch_end(&mut self, ctx: &mut EpochContext<'_>) -> Result<()> {
        log::info!("{}", format_epoch_summary(ctx.record));
        for (name, value) in &ctx.record.values {
            log::info!("\t{name}: {value}");
        }
        Ok(())
    }
}

/// Appends each epoch's record to the run's metrics files.
pub struct PlotLogger {
    logger: MetricsLogger,
}

impl PlotLogger {
    pub fn new(logger: MetricsLogger) -> Self {
        Self { logger }
    }
}

impl Callback for PlotLogger {
    fn on_train_begin(&mut self, _start_epoch: usize) -> Result<()> {
        log::info!("writing plot data to {}", self.logger.dir().display());
        Ok(())
    }

    fn on_epoch_end(&mut self, ctx: &mut EpochContext<'_>) -> Result<()> {
        self.logger.log(ctx.record)
    }
}

/// Saves the model, optimizer state and history after every epoch.
pub struct Checkpointer {
    path: PathBuf,
    config: TrainConfig,
    history: Vec<MetricRecord>,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>, config: TrainConfig) -> Self {
        Self {
            path: path.into(),
            config,
            history: Vec::new(),
        }
    }

    /// Keep the records of an earlier run so the saved history stays whole.
    pub fn with_history(mut self, history: Vec<MetricRecord>) -> Self {
        self.history = history;
        self
    }
}

impl Callback for Checkpointer {
    fn on_epoch_end(&mut self, ctx: &mut EpochContext<'_>) -> Result<()> {
        self.history.push(ctx.record.clone());
        let ckpt = Checkpoint {
            name: self.config.experiment_name(),
            config: self.config.clone(),
            epochs_done: ctx.epochs_done,
            iterations_done: ctx.record.iterations,
            parameters: export_parameters(ctx.model),
            optimizer: ctx.optimizer.state(),
            history: self.history.clone(),
        };
        save_checkpoint(&self.path, &ckpt)?;
        log_checkpoint_saved(ctx.epochs_done, ctx.record.get("train_nll_bound"));
        Ok(())
    }
}
