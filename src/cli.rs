use std::path::PathBuf;

use clap::Parser;

use crate::config::TrainConfig;
use crate::error::Result;
use crate::optim::OptimizerKind;

/// Train a DRAW recurrent variational autoencoder on binarized MNIST.
///
/// Flags override values read from `--config`, which override the defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about)]
pub struct TrainArgs {
    /// Name for this experiment
    #[arg(long)]
    pub name: Option<String>,

    /// Number of training epochs to do [default: 25]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Size of each mini-batch [default: 100]
    #[arg(long = "batch-size", visible_alias = "bs")]
    pub batch_size: Option<usize>,

    /// Learning rate [default: 0.001]
    #[arg(long = "learning-rate", visible_alias = "lr")]
    pub learning_rate: Option<f32>,

    /// Number of recurrent iterations [default: 5]
    #[arg(long)]
    pub niter: Option<usize>,

    /// Encoder RNN state dimension [default: 200]
    #[arg(long = "enc-dim")]
    pub enc_dim: Option<usize>,

    /// Decoder RNN state dimension [default: 200]
    #[arg(long = "dec-dim")]
    pub dec_dim: Option<usize>,

    /// Z-vector dimension [default: 50]
    #[arg(long = "z-dim")]
    pub z_dim: Option<usize>,

    /// Step rule [default: adam]
    #[arg(long, value_enum)]
    pub optimizer: Option<OptimizerKind>,

    /// TOML or JSON file with base settings
    #[arg(long, env = "DRAW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Random seed [default: 0]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory holding the MNIST idx files [default: data]
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Directory for the checkpoint and plot data [default: .]
    #[arg(long = "out-dir")]
    pub out_dir: Option<PathBuf>,

    /// Also monitor the test split after every epoch
    #[arg(long = "monitor-test")]
    pub monitor_test: bool,

    /// Shuffle the training set every epoch
    #[arg(long)]
    pub shuffle: bool,

    /// Continue training from a checkpoint
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

impl TrainArgs {
    /// Resolve the final configuration: defaults, then `--config`, then flags.
    pub fn resolve(&self) -> Result<TrainConfig> {
        let base = match &self.config {
            Some(path) => TrainConfig::from_path(path)?,
            None => TrainConfig::default(),
        };
        let cfg = self.apply(base);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay every flag that was given onto `cfg`.
    pub fn apply(&self, mut cfg: TrainConfig) -> TrainConfig {
        if let Some(name) = &self.name {
            cfg.name = Some(name.clone());
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.niter {
            cfg.n_iter = v;
        }
        if let Some(v) = self.enc_dim {
            cfg.enc_dim = v;
        }
        if let Some(v) = self.dec_dim {
            cfg.dec_dim = v;
        }
        if let Some(v) = self.z_dim {
            cfg.z_dim = v;
        }
        if let Some(v) = self.optimizer {
            cfg.optimizer = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = &self.data_dir {
            cfg.data_dir = v.clone();
        }
        if let Some(v) = &self.out_dir {
            cfg.out_dir = v.clone();
        }
        cfg.monitor_test |= self.monitor_test;
        cfg.shuffle |= self.shuffle;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TrainArgs {
        TrainArgs::try_parse_from(std::iter::once("train_draw").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn no_flags_keeps_defaults() {
        let cfg = parse(&[]).apply(TrainConfig::default());
        assert_eq!(cfg, TrainConfig::default());
    }

    #[test]
    fn short_aliases_are_accepted() {
        let cfg = parse(&["--bs", "32", "--lr", "0.01", "--niter", "8"]).apply(TrainConfig::default());
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.learning_rate, 0.01);
        assert_eq!(cfg.n_iter, 8);

        let cfg = parse(&["--batch-size", "64", "--learning-rate", "0.002"]).apply(TrainConfig::default());
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.learning_rate, 0.002);
    }

    #[test]
    fn dims_and_name_flags() {
        let cfg = parse(&[
            "--enc-dim", "100", "--dec-dim", "120", "--z-dim", "20", "--name", "exp",
        ])
        .apply(TrainConfig::default());
        assert_eq!((cfg.enc_dim, cfg.dec_dim, cfg.z_dim), (100, 120, 20));
        assert_eq!(cfg.experiment_name(), "exp");
    }

    #[test]
    fn optimizer_flag_parses_value_enum() {
        let cfg = parse(&["--optimizer", "rmsprop"]).apply(TrainConfig::default());
        assert_eq!(cfg.optimizer, OptimizerKind::RmsProp);
        assert!(TrainArgs::try_parse_from(["train_draw", "--optimizer", "lbfgs"]).is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let base = TrainConfig {
            epochs: 3,
            batch_size: 10,
            ..TrainConfig::default()
        };
        let cfg = parse(&["--epochs", "7"]).apply(base);
        assert_eq!(cfg.epochs, 7);
        assert_eq!(cfg.batch_size, 10);
    }
}
