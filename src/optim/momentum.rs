use super::{check_kind, Optimizer, OptimizerKind, OptimizerState, SlotBuffers};
use crate::error::Result;
use crate::layers::Linear;

/// Heavy-ball momentum: `v = momentum * v + lr * g`, `p -= v`.
pub struct Momentum {
    pub lr: f32,
    pub momentum: f32,
    t: usize,
    velocity: SlotBuffers,
}

impl Momentum {
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            t: 0,
            velocity: SlotBuffers::new(1),
        }
    }

    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, 0.95)
    }

    pub fn step(&mut self, params: &mut [&mut Linear]) {
        self.t += 1;
        let (lr, mu) = (self.lr, self.momentum);
        self.velocity.for_each(params, |value, grad, bufs| {
            let [v] = bufs else { return };
            for i in 0..value.data.len() {
                v[i] = mu * v[i] + lr * grad.data[i];
                value.data[i] -= v[i];
            }
        });
    }
}

impl Optimizer for Momentum {
    fn step(&mut self, params: &mut [&mut Linear]) {
        Momentum::step(self, params);
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            kind: OptimizerKind::Momentum,
            step: self.t,
            buffers: self.velocity.snapshot(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        check_kind(OptimizerKind::Momentum, &state)?;
        self.velocity.restore(state.buffers)?;
        self.t = state.step;
        Ok(())
    }
}
