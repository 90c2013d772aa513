use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DrawError, Result};
use crate::layers::{sigmoid, Init, Layer, Linear, QSampler, Reader, Recurrent, Sample, Writer};
use crate::math::{self, Matrix};

/// Model dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawConfig {
    pub x_dim: usize,
    pub enc_dim: usize,
    pub dec_dim: usize,
    pub z_dim: usize,
    /// Number of recurrent steps per image.
    pub n_iter: usize,
}

impl DrawConfig {
    pub fn read_dim(&self) -> usize {
        2 * self.x_dim
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("x_dim", self.x_dim),
            ("enc_dim", self.enc_dim),
            ("dec_dim", self.dec_dim),
            ("z_dim", self.z_dim),
            ("n_iter", self.n_iter),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(DrawError::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

/// Everything the backward pass needs from one step.
struct StepCache {
    sig_c_prev: Matrix,
    enc_in: Matrix,
    h_enc_prev: Matrix,
    h_enc: Matrix,
    sample: Sample,
    h_dec_prev: Matrix,
    h_dec: Matrix,
}

/// Result of an unrolled forward pass.
#[derive(Clone, Debug)]
pub struct DrawOutput {
    /// Pre-sigmoid canvases `c_1..c_T`.
    pub canvases: Vec<Matrix>,
    /// `kl_terms[t][b]`: KL of example `b` at step `t`.
    pub kl_terms: Vec<Vec<f32>>,
}

impl DrawOutput {
    pub fn final_canvas(&self) -> &Matrix {
        // n_iter >= 1 is checked on construction
        &self.canvases[self.canvases.len() - 1]
    }
}

/// Scalar loss and per-step monitors for one batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossTerms {
    /// Variational bound on the negative log-likelihood; the training cost.
    pub nll_bound: f32,
    /// Reconstruction cross-entropy of the final canvas.
    pub recons_term: f32,
    /// Batch mean KL at each step.
    pub kl_terms: Vec<f32>,
    /// Reconstruction cross-entropy of each intermediate canvas.
    pub recons_terms: Vec<f32>,
}

impl LossTerms {
    /// Monitor channels in display order: `nll_bound`, then `kl_term_t` and
    /// `recons_term_t` for each step.
    pub fn monitors(&self) -> Vec<(String, f32)> {
        let mut out = vec![("nll_bound".to_string(), self.nll_bound)];
        for (t, (kl, rec)) in self.kl_terms.iter().zip(&self.recons_terms).enumerate() {
            out.push((kl_channel(t), *kl));
            out.push((recons_channel(t), *rec));
        }
        out
    }
}

pub fn kl_channel(t: usize) -> String {
    format!("kl_term_{t}")
}

pub fn recons_channel(t: usize) -> String {
    format!("recons_term_{t}")
}

/// DRAW without attention: a recurrent encoder reads the image and the
/// current error image, a recurrent decoder writes additive updates to a
/// canvas.
pub struct Draw {
    cfg: DrawConfig,
    pub reader: Reader,
    pub writer: Writer,
    pub encoder: Recurrent,
    pub decoder: Recurrent,
    pub q_sampler: QSampler,
    cache: Vec<StepCache>,
    last_canvas: Option<Matrix>,
}

impl Draw {
    pub fn new<R: Rng + ?Sized>(cfg: DrawConfig, init: Init, rng: &mut R) -> Result<Self> {
        cfg.validate()?;
        let reader = Reader::new(cfg.x_dim);
        let writer = Writer::new(cfg.dec_dim, cfg.x_dim, init, rng);
        let encoder = Recurrent::new(
            "RNN_enc",
            reader.read_dim() + cfg.dec_dim,
            cfg.enc_dim,
            init,
            rng,
        );
        let decoder = Recurrent::new("RNN_dec", cfg.z_dim, cfg.dec_dim, init, rng);
        let q_sampler = QSampler::new(cfg.enc_dim, cfg.z_dim, init, rng);
        Ok(Self {
            cfg,
            reader,
            writer,
            encoder,
            decoder,
            q_sampler,
            cache: Vec::new(),
            last_canvas: None,
        })
    }

    pub fn config(&self) -> &DrawConfig {
        &self.cfg
    }

    fn unroll<R: Rng + ?Sized>(&self, x: &Matrix, rng: &mut R) -> (Vec<StepCache>, DrawOutput) {
        assert_eq!(x.cols, self.cfg.x_dim, "input width does not match x_dim");
        let batch = x.rows;
        let mut c = Matrix::zeros(batch, self.cfg.x_dim);
        let mut h_enc = Matrix::zeros(batch, self.cfg.enc_dim);
        let mut h_dec = Matrix::zeros(batch, self.cfg.dec_dim);

        let mut steps = Vec::with_capacity(self.cfg.n_iter);
        let mut canvases = Vec::with_capacity(self.cfg.n_iter);
        let mut kl_terms = Vec::with_capacity(self.cfg.n_iter);
        for _ in 0..self.cfg.n_iter {
            let sig_c_prev = sigmoid::apply(&c);
            let x_hat = x.sub(&sig_c_prev);
            let r = self.reader.apply(x, &x_hat);
            let enc_in = Matrix::concat_cols(&r, &h_dec);
            let h_enc_next = self.encoder.forward(&enc_in, &h_enc);
            let sample = self.q_sampler.apply(&h_enc_next, rng);
            let h_dec_next = self.decoder.forward(&sample.z, &h_dec);
            c = c.add(&self.writer.apply(&h_dec_next));

            kl_terms.push(math::gaussian_kl(&sample.mean, &sample.log_sigma));
            canvases.push(c.clone());
            steps.push(StepCache {
                sig_c_prev,
                enc_in,
                h_enc_prev: std::mem::replace(&mut h_enc, h_enc_next.clone()),
                h_enc: h_enc_next,
                sample,
                h_dec_prev: std::mem::replace(&mut h_dec, h_dec_next.clone()),
                h_dec: h_dec_next,
            });
        }
        (steps, DrawOutput { canvases, kl_terms })
    }

    /// Training forward pass; keeps the step caches for [`Draw::backward`].
    pub fn forward_train<R: Rng + ?Sized>(&mut self, x: &Matrix, rng: &mut R) -> DrawOutput {
        let (steps, out) = self.unroll(x, rng);
        self.cache = steps;
        self.last_canvas = Some(out.final_canvas().clone());
        out
    }

    /// Loss terms for a forward pass over `x`.
    pub fn loss(&self, x: &Matrix, out: &DrawOutput) -> LossTerms {
        let (recons_term, _) = math::binary_cross_entropy_with_logits(x, out.final_canvas());
        let batch = x.rows.max(1) as f32;
        let kl_per_example: f32 = out
            .kl_terms
            .iter()
            .map(|step| step.iter().sum::<f32>())
            .sum::<f32>()
            / batch;
        let kl_terms = out
            .kl_terms
            .iter()
            .map(|step| step.iter().sum::<f32>() / batch)
            .collect();
        let recons_terms = out
            .canvases
            .iter()
            .map(|c| math::binary_cross_entropy_with_logits(x, c).0)
            .collect();
        LossTerms {
            nll_bound: recons_term + kl_per_example,
            recons_term,
            kl_terms,
            recons_terms,
        }
    }

    /// Loss terms without keeping any state for a backward pass.
    pub fn evaluate<R: Rng + ?Sized>(&self, x: &Matrix, rng: &mut R) -> LossTerms {
        let (_, out) = self.unroll(x, rng);
        self.loss(x, &out)
    }

    /// Back-propagate `nll_bound` through the last [`Draw::forward_train`]
    /// unroll, accumulating gradients into every parameter.
    pub fn backward(&mut self, x: &Matrix) {
        let Some(canvas) = self.last_canvas.take() else {
            panic!("backward called without a preceding forward_train");
        };
        let steps = std::mem::take(&mut self.cache);
        let batch = x.rows.max(1) as f32;
        let read_dim = self.reader.read_dim();

        let (_, mut dc) = math::binary_cross_entropy_with_logits(x, &canvas);
        let mut dh_enc = Matrix::zeros(x.rows, self.cfg.enc_dim);
        let mut dh_dec = Matrix::zeros(x.rows, self.cfg.dec_dim);

        for s in steps.iter().rev() {
            // c_t = c_{t-1} + write(h_dec_t)
            dh_dec.add_assign(&self.writer.backward(&s.h_dec, &dc));

            let (dz, dh_dec_prev) = self
                .decoder
                .backward(&s.sample.z, &s.h_dec_prev, &s.h_dec, &dh_dec);

            // KL gradients for the N(0, I) prior.
            let d_mean_kl = s.sample.mean.scale(1.0 / batch);
            let d_log_sigma_kl = s.sample.sigma.map(|v| (v * v - 1.0) / batch);
            dh_enc.add_assign(&self.q_sampler.backward(
                &s.h_enc,
                &s.sample,
                &dz,
                &d_mean_kl,
                &d_log_sigma_kl,
            ));

            let (d_enc_in, dh_enc_prev) =
                self.encoder
                    .backward(&s.enc_in, &s.h_enc_prev, &s.h_enc, &dh_enc);
            let (d_r, dh_dec_from_enc) = d_enc_in.split_cols(read_dim);

            // x_hat = x - sigmoid(c_{t-1})
            let mut dc_from_read = self.reader.backward(&d_r).scale(-1.0);
            sigmoid::backward(&mut dc_from_read, &s.sig_c_prev);
            dc = dc.add(&dc_from_read);

            dh_dec = dh_dec_prev.add(&dh_dec_from_enc);
            dh_enc = dh_enc_prev;
        }
    }

    /// Final `sigmoid` canvas for `x`.
    pub fn reconstruct<R: Rng + ?Sized>(&self, x: &Matrix, rng: &mut R) -> Matrix {
        let (_, out) = self.unroll(x, rng);
        sigmoid::apply(out.final_canvas())
    }

    /// Decoder-only sampling from the prior. Returns the `sigmoid` canvas
    /// after each of `steps` steps, each `n x x_dim`.
    pub fn generate<R: Rng + ?Sized>(&self, n: usize, steps: usize, rng: &mut R) -> Vec<Matrix> {
        let mut c = Matrix::zeros(n, self.cfg.x_dim);
        let mut h_dec = Matrix::zeros(n, self.cfg.dec_dim);
        let mut frames = Vec::with_capacity(steps);
        for _ in 0..steps {
            let z = self.q_sampler.sample_prior(n, rng);
            h_dec = self.decoder.forward(&z, &h_dec);
            c = c.add(&self.writer.apply(&h_dec));
            frames.push(sigmoid::apply(&c));
        }
        frames
    }

    /// Every trainable layer paired with a stable name.
    pub fn named_parameters(&mut self) -> Vec<(&'static str, &mut Linear)> {
        vec![
            ("writer", &mut self.writer.linear),
            ("encoder.input", &mut self.encoder.input),
            ("encoder.hidden", &mut self.encoder.hidden),
            ("decoder.input", &mut self.decoder.input),
            ("decoder.hidden", &mut self.decoder.hidden),
            ("q.mean", &mut self.q_sampler.mean),
            ("q.log_sigma", &mut self.q_sampler.log_sigma),
        ]
    }

    pub fn num_parameters(&mut self) -> usize {
        self.parameters()
            .iter()
            .map(|p| p.w.data.len() + p.b.data.len())
            .sum()
    }
}

impl Layer for Draw {
    fn parameters(&mut self) -> Vec<&mut Linear> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }
}
