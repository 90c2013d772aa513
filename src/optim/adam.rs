use super::{check_kind, Optimizer, OptimizerKind, OptimizerState, SlotBuffers};
use crate::error::Result;
use crate::layers::Linear;

pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub weight_decay: f32,
    t: usize,
    moments: SlotBuffers,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32, eps: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            t: 0,
            moments: SlotBuffers::new(2),
        }
    }

    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.0)
    }

    pub fn step(&mut self, params: &mut [&mut Linear]) {
        self.t += 1;
        let (lr, beta1, beta2, eps, wd) = (self.lr, self.beta1, self.beta2, self.eps, self.weight_decay);
        let bias1 = 1.0 - beta1.powi(self.t as i32);
        let bias2 = 1.0 - beta2.powi(self.t as i32);
        self.moments.for_each(params, |value, grad, bufs| {
            let [m, v] = bufs else { return };
            for i in 0..value.data.len() {
                let g = grad.data[i] + wd * value.data[i];
                m[i] = beta1 * m[i] + (1.0 - beta1) * g;
                v[i] = beta2 * v[i] + (1.0 - beta2) * g * g;
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                value.data[i] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        });
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Linear]) {
        Adam::step(self, params);
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            kind: OptimizerKind::Adam,
            step: self.t,
            buffers: self.moments.snapshot(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        check_kind(OptimizerKind::Adam, &state)?;
        self.moments.restore(state.buffers)?;
        self.t = state.step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Init;
    use crate::math::Matrix;
    use crate::rng::rng_from_seed;

    #[test]
    fn first_step_moves_by_lr_times_sign() {
        let mut rng = rng_from_seed(9);
        let mut lin = Linear::new(2, 1, Init::default(), &mut rng);
        let x = Matrix::from_vec(1, 2, vec![3.0, -0.5]);
        let g = Matrix::from_vec(1, 1, vec![1.0]);
        lin.backward(&x, &g);
        let before = lin.w.clone();
        let mut adam = Adam::with_lr(0.01);
        adam.step(&mut [&mut lin]);
        assert!((lin.w.data[0] - (before.data[0] - 0.01)).abs() < 1e-5);
        assert!((lin.w.data[1] - (before.data[1] + 0.01)).abs() < 1e-5);
        assert!((lin.b.data[0] + 0.01).abs() < 1e-5);
    }
}
