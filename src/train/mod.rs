pub mod extensions;

pub use extensions::{Checkpointer, PlotLogger, Printing, Progress, Timing};

use rand::rngs::StdRng;

use crate::data::DataLoader;
use crate::error::{DrawError, Result};
use crate::layers::Layer;
use crate::logging::{Callback, EpochContext, MetricRecord};
use crate::math::Matrix;
use crate::models::{Draw, LossTerms};
use crate::optim::{LearningRateSchedule, Optimizer};
use crate::weights::{restore_parameters, Checkpoint};

/// Loop settings that are not part of the model.
#[derive(Clone, Debug)]
pub struct TrainSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
}

/// Batch-size weighted running mean of [`LossTerms`].
#[derive(Clone, Debug, Default)]
pub struct MonitorAggregate {
    sum: Option<LossTerms>,
    weight: f32,
}

impl MonitorAggregate {
    pub fn add(&mut self, terms: &LossTerms, rows: usize) {
        let w = rows as f32;
        match &mut self.sum {
            None => {
                self.sum = Some(LossTerms {
                    nll_bound: terms.nll_bound * w,
                    recons_term: terms.recons_term * w,
                    kl_terms: terms.kl_terms.iter().map(|v| v * w).collect(),
                    recons_terms: terms.recons_terms.iter().map(|v| v * w).collect(),
                })
            }
            Some(sum) => {
                sum.nll_bound += terms.nll_bound * w;
                sum.recons_term += terms.recons_term * w;
                for (s, v) in sum.kl_terms.iter_mut().zip(&terms.kl_terms) {
                    *s += v * w;
                }
                for (s, v) in sum.recons_terms.iter_mut().zip(&terms.recons_terms) {
                    *s += v * w;
                }
            }
        }
        self.weight += w;
    }

    pub fn mean(&self) -> Option<LossTerms> {
        let sum = self.sum.as_ref()?;
        let w = self.weight;
        Some(LossTerms {
            nll_bound: sum.nll_bound / w,
            recons_term: sum.recons_term / w,
            kl_terms: sum.kl_terms.iter().map(|v| v / w).collect(),
            recons_terms: sum.recons_terms.iter().map(|v| v / w).collect(),
        })
    }
}

/// Drives epochs of forward, backward and optimizer steps over in-memory data.
pub struct Trainer {
    model: Draw,
    optimizer: Box<dyn Optimizer>,
    schedule: Box<dyn LearningRateSchedule>,
    settings: TrainSettings,
    rng: StdRng,
    epochs_done: usize,
    iterations: usize,
}

impl Trainer {
    pub fn new(
        model: Draw,
        optimizer: Box<dyn Optimizer>,
        schedule: Box<dyn LearningRateSchedule>,
        settings: TrainSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            model,
            optimizer,
            schedule,
            settings,
            rng,
            epochs_done: 0,
            iterations: 0,
        }
    }

    /// Continue from a checkpoint: parameters, optimizer state and counters.
    pub fn resume(&mut self, ckpt: &Checkpoint) -> Result<()> {
        restore_parameters(&mut self.model, &ckpt.parameters)?;
        self.optimizer.load_state(ckpt.optimizer.clone())?;
        self.epochs_done = ckpt.epochs_done;
        self.iterations = ckpt.iterations_done;
        Ok(())
    }

    pub fn model(&self) -> &Draw {
        &self.model
    }

    pub fn epochs_done(&self) -> usize {
        self.epochs_done
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// One parameter update on `x`; returns the batch loss terms.
    pub fn train_batch(&mut self, x: &Matrix) -> LossTerms {
        let out = self.model.forward_train(x, &mut self.rng);
        let terms = self.model.loss(x, &out);
        self.model.zero_grad();
        self.model.backward(x);
        let mut params = self.model.parameters();
        self.optimizer.step(&mut params);
        self.iterations += 1;
        terms
    }

    /// Monitors over `data` without updating parameters.
    pub fn evaluate(&mut self, data: &[Vec<f32>]) -> Option<LossTerms> {
        let mut agg = MonitorAggregate::default();
        for x in DataLoader::new(data, self.settings.batch_size) {
            agg.add(&self.model.evaluate(&x, &mut self.rng), x.rows);
        }
        agg.mean()
    }

    /// Train until the epoch budget is spent.
    pub fn run(
        &mut self,
        train: &[Vec<f32>],
        test: Option<&[Vec<f32>]>,
        callbacks: &mut [Box<dyn Callback>],
    ) -> Result<Vec<MetricRecord>> {
        if train.is_empty() {
            return Err(DrawError::Dataset("training set is empty".into()));
        }
        for cb in callbacks.iter_mut() {
            cb.on_train_begin(self.epochs_done)?;
        }
        let mut history = Vec::new();
        while self.epochs_done < self.settings.epochs {
            let epoch = self.epochs_done;
            let lr = self.schedule.next_lr(epoch);
            self.optimizer.set_learning_rate(lr);

            let loader = DataLoader::new(train, self.settings.batch_size);
            let loader = if self.settings.shuffle {
                loader.shuffled(&mut self.rng)
            } else {
                loader
            };
            let num_batches = loader.num_batches();
            for cb in callbacks.iter_mut() {
                cb.on_epoch_begin(epoch, num_batches);
            }

            let mut agg = MonitorAggregate::default();
            for x in loader {
                let terms = self.train_batch(&x);
                if !terms.nll_bound.is_finite() {
                    for cb in callbacks.iter_mut() {
                        cb.on_train_end();
                    }
                    return Err(DrawError::Diverged {
                        epoch,
                        iteration: self.iterations,
                    });
                }
                for cb in callbacks.iter_mut() {
                    cb.on_batch_end(self.iterations, terms.nll_bound);
                }
                agg.add(&terms, x.rows);
            }
            self.epochs_done += 1;

            let mut values = Vec::new();
            if let Some(mean) = agg.mean() {
                values.extend(prefixed("train", &mean));
            }
            if let Some(test) = test {
                if let Some(mean) = self.evaluate(test) {
                    values.extend(prefixed("test", &mean));
                }
            }
            let record = MetricRecord {
                epoch,
                iterations: self.iterations,
                lr,
                values,
            };
            let mut ctx = EpochContext {
                record: &record,
                epochs_done: self.epochs_done,
                model: &mut self.model,
                optimizer: self.optimizer.as_ref(),
            };
            for cb in callbacks.iter_mut() {
                cb.on_epoch_end(&mut ctx)?;
            }
            history.push(record);
        }
        for cb in callbacks.iter_mut() {
            cb.on_train_end();
        }
        Ok(history)
    }
}

fn prefixed(prefix: &str, terms: &LossTerms) -> Vec<(String, f32)> {
    terms
        .monitors()
        .into_iter()
        .map(|(name, v)| (format!("{prefix}_{name}"), v))
        .collect()
}
