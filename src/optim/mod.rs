pub mod adam;
pub mod lr_scheduler;
pub mod momentum;
pub mod rmsprop;

pub use adam::Adam;
pub use lr_scheduler::{ConstantLr, CosineLr, LearningRateSchedule, LrScheduleConfig, StepLr};
pub use momentum::Momentum;
pub use rmsprop::RmsProp;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DrawError, Result};
use crate::layers::Linear;
use crate::math::Matrix;

/// Common interface for optimizers operating on linear layers.
///
/// Each [`Linear`] contributes two slots, its weights and its bias, and the
/// optimizer keeps per-slot buffers in the order the parameters are passed.
/// Callers must therefore pass parameters in a stable order.
pub trait Optimizer {
    /// Update the provided parameters in-place from their accumulated
    /// gradients.
    fn step(&mut self, params: &mut [&mut Linear]);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);

    /// Snapshot of the step count and per-slot buffers for checkpointing.
    fn state(&self) -> OptimizerState;

    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}

/// Step rules selectable from the command line.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    #[value(name = "rmsprop")]
    RmsProp,
    Momentum,
}

impl OptimizerKind {
    pub fn build(self, lr: f32) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::with_lr(lr)),
            OptimizerKind::RmsProp => Box::new(RmsProp::with_lr(lr)),
            OptimizerKind::Momentum => Box::new(Momentum::with_lr(lr)),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::RmsProp => "rmsprop",
            OptimizerKind::Momentum => "momentum",
        };
        f.write_str(name)
    }
}

impl FromStr for OptimizerKind {
    type Err = DrawError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "rmsprop" | "rms-prop" => Ok(OptimizerKind::RmsProp),
            "momentum" => Ok(OptimizerKind::Momentum),
            other => Err(DrawError::Config(format!("unknown optimizer {other}"))),
        }
    }
}

/// Serializable optimizer state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub kind: OptimizerKind,
    pub step: usize,
    /// `buffers[slot][k]`: the k-th buffer of a slot (e.g. Adam's m and v).
    pub buffers: Vec<Vec<Vec<f32>>>,
}

/// Per-slot buffers, created lazily on the first step.
#[derive(Clone, Debug, Default)]
pub(crate) struct SlotBuffers {
    per_slot: usize,
    slots: Vec<Vec<Vec<f32>>>,
}

impl SlotBuffers {
    pub(crate) fn new(per_slot: usize) -> Self {
        Self {
            per_slot,
            slots: Vec::new(),
        }
    }

    /// Visit every `(value, grad)` slot of `params` along with its buffers.
    pub(crate) fn for_each(
        &mut self,
        params: &mut [&mut Linear],
        mut f: impl FnMut(&mut Matrix, &Matrix, &mut [Vec<f32>]),
    ) {
        let mut idx = 0;
        for p in params.iter_mut() {
            for (value, grad) in p.slots_mut() {
                if self.slots.len() <= idx {
                    self.slots.push(vec![vec![0.0; value.data.len()]; self.per_slot]);
                }
                let bufs = &mut self.slots[idx];
                if bufs.iter().any(|b| b.len() != value.data.len()) {
                    *bufs = vec![vec![0.0; value.data.len()]; self.per_slot];
                }
                f(value, grad, bufs);
                idx += 1;
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Vec<Vec<f32>>> {
        self.slots.clone()
    }

    pub(crate) fn restore(&mut self, buffers: Vec<Vec<Vec<f32>>>) -> Result<()> {
        if buffers.iter().any(|slot| slot.len() != self.per_slot) {
            return Err(DrawError::Config(format!(
                "optimizer state must hold {} buffers per slot",
                self.per_slot
            )));
        }
        self.slots = buffers;
        Ok(())
    }
}

pub(crate) fn check_kind(expected: OptimizerKind, state: &OptimizerState) -> Result<()> {
    if state.kind != expected {
        return Err(DrawError::Config(format!(
            "checkpoint optimizer is {}, configured optimizer is {}",
            state.kind, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Init;
    use crate::rng::rng_from_seed;

    fn layer_with_grad() -> Linear {
        let mut rng = rng_from_seed(0);
        let init = Init {
            weights_std: 0.1,
            bias: 0.0,
        };
        let mut lin = Linear::new(2, 2, init, &mut rng);
        let x = Matrix::from_vec(1, 2, vec![1.0, -2.0]);
        let g = Matrix::from_vec(1, 2, vec![0.5, -0.25]);
        lin.backward(&x, &g);
        lin
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("rmsprop".parse::<OptimizerKind>().unwrap(), OptimizerKind::RmsProp);
        assert_eq!("momentum".parse::<OptimizerKind>().unwrap(), OptimizerKind::Momentum);
        assert!("sgd2".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn every_kind_descends() {
        for kind in [OptimizerKind::Adam, OptimizerKind::RmsProp, OptimizerKind::Momentum] {
            let mut lin = layer_with_grad();
            let before = lin.clone();
            let mut opt = kind.build(0.01);
            opt.step(&mut [&mut lin]);
            for ((after, prev), g) in lin.w.data.iter().zip(&before.w.data).zip(&before.grad_w().data) {
                if *g != 0.0 {
                    assert!((after - prev) * g < 0.0, "{kind} moved along the gradient");
                }
            }
        }
    }

    #[test]
    fn state_round_trips_and_checks_kind() {
        let mut lin = layer_with_grad();
        let mut adam = OptimizerKind::Adam.build(0.01);
        adam.step(&mut [&mut lin]);
        let state = adam.state();
        assert_eq!(state.step, 1);
        assert_eq!(state.buffers.len(), 2);

        let mut fresh = OptimizerKind::Adam.build(0.01);
        fresh.load_state(state.clone()).unwrap();
        assert_eq!(fresh.state(), state);

        let mut other = OptimizerKind::Momentum.build(0.01);
        assert!(other.load_state(state).is_err());
    }
}
