use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::draw::{kl_channel, recons_channel};
use crate::models::Draw;
use crate::optim::Optimizer;

/// Monitor values aggregated over one epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub epoch: usize,
    /// Parameter updates done so far.
    pub iterations: usize,
    pub lr: f32,
    /// Prefixed channel values (`train_nll_bound`, `test_kl_term_0`, ...).
    pub values: Vec<(String, f32)>,
}

impl MetricRecord {
    pub fn get(&self, channel: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, v)| *v)
    }

    fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("epoch".into(), self.epoch.into());
        map.insert("iterations".into(), self.iterations.into());
        map.insert("lr".into(), f64::from(self.lr).into());
        for (name, value) in &self.values {
            map.insert(name.clone(), f64::from(*value).into());
        }
        serde_json::Value::Object(map)
    }
}

/// Channel groups drawn together: the bound, the per-step KL terms and the
/// per-step reconstruction terms.
pub fn plot_channels(n_iter: usize) -> Vec<Vec<String>> {
    vec![
        vec!["train_nll_bound".to_string()],
        (0..n_iter).map(|t| format!("train_{}", kl_channel(t))).collect(),
        (0..n_iter)
            .map(|t| format!("train_{}", recons_channel(t)))
            .collect(),
    ]
}

/// Appends epoch records under a run directory as `metrics.jsonl` and
/// `metrics.csv`, next to the channel layout in `channels.json`.
///
/// A `metrics.csv` whose header does not match the records being logged (a
/// resumed run that changed `n_iter` or test monitoring) is moved aside to
/// `metrics.<k>.csv` and a fresh file is started.
pub struct MetricsLogger {
    dir: PathBuf,
    json: File,
    csv: Option<Writer<File>>,
    csv_header: Option<Vec<String>>,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>, channels: &[Vec<String>]) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join("channels.json"),
            serde_json::to_string_pretty(channels)?,
        )?;
        let json = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.jsonl"))?;
        let csv_path = dir.join("metrics.csv");
        let has_rows = csv_path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let csv_header = if has_rows {
            let mut reader = csv::Reader::from_path(&csv_path)?;
            Some(reader.headers()?.iter().map(str::to_string).collect())
        } else {
            None
        };
        Ok(MetricsLogger {
            dir,
            json,
            csv: None,
            csv_header,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn csv_path(&self) -> PathBuf {
        self.dir.join("metrics.csv")
    }

    /// Move the current `metrics.csv` to the first free `metrics.<k>.csv`.
    fn rotate_csv(&mut self) -> Result<PathBuf> {
        self.csv = None;
        let mut k = 1;
        let target = loop {
            let candidate = self.dir.join(format!("metrics.{k}.csv"));
            if !candidate.exists() {
                break candidate;
            }
            k += 1;
        };
        std::fs::rename(self.csv_path(), &target)?;
        self.csv_header = None;
        Ok(target)
    }

    fn csv_writer(&mut self, header: &[String]) -> Result<&mut Writer<File>> {
        if self
            .csv_header
            .as_deref()
            .is_some_and(|existing| existing != header)
        {
            let moved = self.rotate_csv()?;
            log::warn!(
                "metrics.csv columns changed; previous rows moved to {}",
                moved.display()
            );
        }
        let writer = match self.csv.take() {
            Some(writer) => writer,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.csv_path())?;
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(file);
                if self.csv_header.is_none() {
                    writer.write_record(header)?;
                    self.csv_header = Some(header.to_vec());
                }
                writer
            }
        };
        Ok(self.csv.insert(writer))
    }

    pub fn log(&mut self, record: &MetricRecord) -> Result<()> {
        writeln!(self.json, "{}", serde_json::to_string(&record.to_json())?)?;
        let mut header = vec!["epoch".to_string(), "iterations".into(), "lr".into()];
        header.extend(record.values.iter().map(|(name, _)| name.clone()));
        let mut row = vec![
            record.epoch.to_string(),
            record.iterations.to_string(),
            record.lr.to_string(),
        ];
        row.extend(record.values.iter().map(|(_, v)| v.to_string()));
        let csv = self.csv_writer(&header)?;
        csv.write_record(&row)?;
        csv.flush()?;
        Ok(())
    }
}

/// State handed to callbacks once an epoch has been aggregated.
pub struct EpochContext<'a> {
    pub record: &'a MetricRecord,
    pub epochs_done: usize,
    pub model: &'a mut Draw,
    pub optimizer: &'a dyn Optimizer,
}

/// Trait for hooking into various stages of the training loop.
pub trait Callback {
    /// Called once before training starts.
    fn on_train_begin(&mut self, _start_epoch: usize) -> Result<()> {
        Ok(())
    }

    /// Called at the beginning of each epoch.
    fn on_epoch_begin(&mut self, _epoch: usize, _num_batches: usize) {}

    /// Called after each parameter update with that batch's bound.
    fn on_batch_end(&mut self, _iteration: usize, _nll_bound: f32) {}

    /// Called after each epoch with the aggregated monitors.
    fn on_epoch_end(&mut self, _ctx: &mut EpochContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once after training ends.
    fn on_train_end(&mut self) {}
}
