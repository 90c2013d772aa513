use std::time::Duration;

use crate::config::TrainConfig;
use crate::logging::MetricRecord;

/// Banner printed before training, labels right-aligned on the colon.
pub fn format_experiment_banner(cfg: &TrainConfig) -> String {
    format!(
        "\nRunning experiment {}\n\
         {:>22}: {:5.3}\n\
         {:>22}: {}\n\
         {:>22}: {}\n\
         {:>22}: {}\n",
        cfg.experiment_name(),
        "learning rate",
        cfg.learning_rate,
        "encoder dimension",
        cfg.enc_dim,
        "z dimension",
        cfg.z_dim,
        "decoder dimension",
        cfg.dec_dim,
    )
}

/// Format a message reporting the total number of matrix operations.
pub fn format_total_ops(count: usize) -> String {
    format!("Total matrix ops: {}", count)
}

/// Log the total number of matrix operations at info level.
pub fn log_total_ops(count: usize) {
    log::info!("{}", format_total_ops(count));
}

/// Format a checkpoint saved message.
pub fn format_checkpoint_saved(epochs_done: usize, nll_bound: Option<f32>) -> String {
    match nll_bound {
        Some(v) => format!(
            "Checkpoint saved after epoch {}: train_nll_bound {:.4}",
            epochs_done, v
        ),
        None => format!("Checkpoint saved after epoch {}", epochs_done),
    }
}

pub fn log_checkpoint_saved(epochs_done: usize, nll_bound: Option<f32>) {
    log::info!("{}", format_checkpoint_saved(epochs_done, nll_bound));
}

/// `epoch 3 (1800 iterations) lr 0.0010 train_nll_bound 101.2345`
pub fn format_epoch_summary(record: &MetricRecord) -> String {
    let mut line = format!(
        "epoch {} ({} iterations) lr {:.4}",
        record.epoch, record.iterations, record.lr
    );
    for key in ["train_nll_bound", "test_nll_bound"] {
        if let Some(v) = record.get(key) {
            line.push_str(&format!(" {key} {v:.4}"));
        }
    }
    line
}

/// Seconds with millisecond precision, e.g. `12.345s`.
pub fn format_duration(d: Duration) -> String {
    format!("{:.3}s", d.as_secs_f64())
}
