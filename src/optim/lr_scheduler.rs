use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Learning rate as a function of the completed epoch count.
pub trait LearningRateSchedule {
    fn next_lr(&self, step: usize) -> f32;
}

pub struct ConstantLr {
    lr: f32,
}

impl ConstantLr {
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }
}

impl LearningRateSchedule for ConstantLr {
    fn next_lr(&self, _step: usize) -> f32 {
        self.lr
    }
}

pub struct StepLr {
    base_lr: f32,
    step_size: usize,
    gamma: f32,
}

impl StepLr {
    pub fn new(base_lr: f32, step_size: usize, gamma: f32) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }
}

impl LearningRateSchedule for StepLr {
    fn next_lr(&self, step: usize) -> f32 {
        let exp = (step / self.step_size) as f32;
        self.base_lr * self.gamma.powf(exp)
    }
}

pub struct CosineLr {
    base_lr: f32,
    max_steps: usize,
}

impl CosineLr {
    pub fn new(base_lr: f32, max_steps: usize) -> Self {
        Self {
            base_lr,
            max_steps: max_steps.max(1),
        }
    }
}

impl LearningRateSchedule for CosineLr {
    fn next_lr(&self, step: usize) -> f32 {
        let t = step.min(self.max_steps) as f32 / self.max_steps as f32;
        0.5 * self.base_lr * (1.0 + (PI * t).cos())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LrScheduleConfig {
    #[default]
    Constant,
    Step { step_size: usize, gamma: f32 },
    Cosine { max_steps: usize },
}

impl LrScheduleConfig {
    pub fn build(self, base_lr: f32) -> Box<dyn LearningRateSchedule> {
        match self {
            LrScheduleConfig::Constant => Box::new(ConstantLr::new(base_lr)),
            LrScheduleConfig::Step { step_size, gamma } => {
                Box::new(StepLr::new(base_lr, step_size, gamma))
            }
            LrScheduleConfig::Cosine { max_steps } => Box::new(CosineLr::new(base_lr, max_steps)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_schedule_decays_every_interval() {
        let s = LrScheduleConfig::Step {
            step_size: 2,
            gamma: 0.5,
        }
        .build(1.0);
        assert_eq!(s.next_lr(0), 1.0);
        assert_eq!(s.next_lr(1), 1.0);
        assert_eq!(s.next_lr(2), 0.5);
        assert_eq!(s.next_lr(5), 0.25);
    }

    #[test]
    fn cosine_reaches_zero_at_end() {
        let s = CosineLr::new(1e-3, 10);
        assert!((s.next_lr(0) - 1e-3).abs() < 1e-9);
        assert!(s.next_lr(10).abs() < 1e-9);
        assert!(s.next_lr(20).abs() < 1e-9);
    }
}
