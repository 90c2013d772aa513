use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::MNIST_X_DIM;
use crate::error::{DrawError, Result};
use crate::models::DrawConfig;
use crate::optim::{LrScheduleConfig, OptimizerKind};

/// Training configuration loaded from a TOML or JSON file and/or the command
/// line. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Experiment name; derived from the model dimensions when absent.
    pub name: Option<String>,
    /// Number of training epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Recurrent steps per image.
    pub n_iter: usize,
    pub enc_dim: usize,
    pub dec_dim: usize,
    pub z_dim: usize,
    pub optimizer: OptimizerKind,
    pub lr_schedule: LrScheduleConfig,
    pub seed: u64,
    pub shuffle: bool,
    /// Also evaluate the monitors on the test split after every epoch.
    pub monitor_test: bool,
    pub data_dir: PathBuf,
    /// Directory receiving the checkpoint and the plot data.
    pub out_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            name: None,
            epochs: 25,
            batch_size: 100,
            learning_rate: 1e-3,
            n_iter: 5,
            enc_dim: 200,
            dec_dim: 200,
            z_dim: 50,
            optimizer: OptimizerKind::Adam,
            lr_schedule: LrScheduleConfig::Constant,
            seed: 0,
            shuffle: false,
            monitor_test: false,
            data_dir: PathBuf::from("data"),
            out_dir: PathBuf::from("."),
        }
    }
}

impl TrainConfig {
    /// Load configuration from the given path. Supports TOML or JSON based on
    /// the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DrawError::Config("batch_size must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(DrawError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if matches!(self.name.as_deref(), Some("")) {
            return Err(DrawError::Config("name must not be empty".into()));
        }
        self.model_config().validate()
    }

    pub fn experiment_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "mnist-enc{}-dec{}-z{}",
                self.enc_dim, self.dec_dim, self.z_dim
            ),
        }
    }

    pub fn model_config(&self) -> DrawConfig {
        DrawConfig {
            x_dim: MNIST_X_DIM,
            enc_dim: self.enc_dim,
            dec_dim: self.dec_dim,
            z_dim: self.z_dim,
            n_iter: self.n_iter,
        }
    }

    /// `<out_dir>/<name>.pkl`
    pub fn checkpoint_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.pkl", self.experiment_name()))
    }

    /// `<out_dir>/<name>/`
    pub fn plot_dir(&self) -> PathBuf {
        self.out_dir.join(self.experiment_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.epochs, 25);
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.learning_rate, 1e-3);
        assert_eq!(cfg.n_iter, 5);
        assert_eq!((cfg.enc_dim, cfg.dec_dim, cfg.z_dim), (200, 200, 50));
        assert_eq!(cfg.optimizer, OptimizerKind::Adam);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn name_is_derived_from_dims() {
        let mut cfg = TrainConfig {
            enc_dim: 256,
            dec_dim: 128,
            z_dim: 10,
            ..TrainConfig::default()
        };
        assert_eq!(cfg.experiment_name(), "mnist-enc256-dec128-z10");
        cfg.name = Some("run1".into());
        assert_eq!(cfg.experiment_name(), "run1");
        assert_eq!(cfg.checkpoint_path(), PathBuf::from("./run1.pkl"));
        assert_eq!(cfg.plot_dir(), PathBuf::from("./run1"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let zero_batch = TrainConfig {
            batch_size: 0,
            ..TrainConfig::default()
        };
        assert!(matches!(zero_batch.validate(), Err(DrawError::Config(_))));

        let bad_lr = TrainConfig {
            learning_rate: 0.0,
            ..TrainConfig::default()
        };
        assert!(bad_lr.validate().is_err());

        let no_steps = TrainConfig {
            n_iter: 0,
            ..TrainConfig::default()
        };
        assert!(no_steps.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: TrainConfig = toml::from_str(
            r#"
            epochs = 3
            optimizer = "rmsprop"

            [lr_schedule]
            kind = "step"
            step_size = 2
            gamma = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.optimizer, OptimizerKind::RmsProp);
        assert_eq!(
            cfg.lr_schedule,
            LrScheduleConfig::Step {
                step_size: 2,
                gamma: 0.5
            }
        );
        assert_eq!(cfg.batch_size, 100);
    }
}
