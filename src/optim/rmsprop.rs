use super::{check_kind, Optimizer, OptimizerKind, OptimizerState, SlotBuffers};
use crate::error::Result;
use crate::layers::Linear;

/// RMSProp with a floor on the normaliser: the step is
/// `lr * g / max(sqrt(ms), 1 / max_scaling)`.
pub struct RmsProp {
    pub lr: f32,
    pub decay_rate: f32,
    pub max_scaling: f32,
    t: usize,
    mean_square: SlotBuffers,
}

impl RmsProp {
    pub fn new(lr: f32, decay_rate: f32, max_scaling: f32) -> Self {
        Self {
            lr,
            decay_rate,
            max_scaling,
            t: 0,
            mean_square: SlotBuffers::new(1),
        }
    }

    pub fn with_lr(lr: f32) -> Self {
        Self::new(lr, 0.9, 1e5)
    }

    pub fn step(&mut self, params: &mut [&mut Linear]) {
        self.t += 1;
        let (lr, decay) = (self.lr, self.decay_rate);
        let floor = 1.0 / self.max_scaling;
        self.mean_square.for_each(params, |value, grad, bufs| {
            let [ms] = bufs else { return };
            for i in 0..value.data.len() {
                let g = grad.data[i];
                ms[i] = decay * ms[i] + (1.0 - decay) * g * g;
                value.data[i] -= lr * g / ms[i].sqrt().max(floor);
            }
        });
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, params: &mut [&mut Linear]) {
        RmsProp::step(self, params);
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            kind: OptimizerKind::RmsProp,
            step: self.t,
            buffers: self.mean_square.snapshot(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        check_kind(OptimizerKind::RmsProp, &state)?;
        self.mean_square.restore(state.buffers)?;
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

    fn layer_with_grad(g: f32) -> Linear {
        let mut rng = rng_from_seed(2);
        let mut lin = Linear::new(1, 1, Init::default(), &mut rng);
        let x = Matrix::from_vec(1, 1, vec![1.0]);
        lin.backward(&x, &Matrix::from_vec(1, 1, vec![g]));
        lin
    }

    #[test]
    fn first_step_normalises_by_running_mean_square() {
        let g = 0.5f32;
        let mut lin = layer_with_grad(g);
        let start = lin.w.data[0];
        let mut opt = RmsProp::new(0.01, 0.9, 1e5);
        opt.step(&mut [&mut lin]);
        let expected = 0.01 * g / ((1.0 - 0.9) * g * g).sqrt();
        assert!((start - lin.w.data[0] - expected).abs() < 1e-6);
        // the bias sees the same gradient
        assert!((-lin.b.data[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn tiny_mean_square_is_floored_by_max_scaling() {
        let g = 1e-7f32;
        let mut lin = layer_with_grad(g);
        let start = lin.w.data[0];
        let mut opt = RmsProp::new(0.01, 0.9, 1e5);
        opt.step(&mut [&mut lin]);
        // sqrt(0.1 * g^2) is about 3e-8, below 1 / max_scaling.
        let expected = 0.01 * g * 1e5;
        let step = start - lin.w.data[0];
        assert!((step - expected).abs() < 1e-3 * expected, "step {step}");
    }

    #[test]
    fn state_round_trips_mean_square() {
        let mut lin = layer_with_grad(0.5);
        let mut opt = RmsProp::with_lr(0.01);
        opt.step(&mut [&mut lin]);
        let mut restored = RmsProp::with_lr(0.01);
        restored.load_state(opt.state()).unwrap();
        assert_eq!(restored.state().buffers, opt.state().buffers);
        assert_eq!(restored.state().step, 1);
    }
}
