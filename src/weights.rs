use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::{DrawError, Result};
use crate::layers::Init;
use crate::logging::MetricRecord;
use crate::math::Matrix;
use crate::models::Draw;
use crate::optim::OptimizerState;
use crate::rng::rng_from_seed;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterJson {
    pub name: String,
    pub w: Vec<Vec<f32>>,
    pub b: Vec<f32>,
}

/// Everything needed to resume a run or sample from a trained model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub config: TrainConfig,
    pub epochs_done: usize,
    pub iterations_done: usize,
    pub parameters: Vec<ParameterJson>,
    pub optimizer: OptimizerState,
    pub history: Vec<MetricRecord>,
}

/// Convert a [`Matrix`] into a 2-D `Vec` for serialisation.
pub fn matrix_to_vec2(m: &Matrix) -> Vec<Vec<f32>> {
    (0..m.rows)
        .map(|r| (0..m.cols).map(|c| m.get(r, c)).collect())
        .collect()
}

/// Convert a 2-D `Vec` into a [`Matrix`].
pub fn vec2_to_matrix(rows: &[Vec<f32>]) -> Matrix {
    if rows.is_empty() || rows[0].is_empty() {
        return Matrix::zeros(0, 0);
    }
    let r = rows.len();
    let c = rows[0].len();
    let mut mat = Matrix::zeros(r, c);
    for (i, row) in rows.iter().enumerate() {
        for (j, &val) in row.iter().enumerate().take(c) {
            mat.set(i, j, val);
        }
    }
    mat
}

pub fn export_parameters(model: &mut Draw) -> Vec<ParameterJson> {
    model
        .named_parameters()
        .into_iter()
        .map(|(name, p)| ParameterJson {
            name: name.to_string(),
            w: matrix_to_vec2(&p.w),
            b: p.b.data.clone(),
        })
        .collect()
}

/// Copy saved parameters into `model`. Every named parameter must be present
/// with the model's shape.
pub fn restore_parameters(model: &mut Draw, saved: &[ParameterJson]) -> Result<()> {
    for (name, p) in model.named_parameters() {
        let entry = saved
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DrawError::Config(format!("checkpoint lacks parameter {name}")))?;
        let w = vec2_to_matrix(&entry.w);
        let ragged = entry.w.iter().any(|row| row.len() != w.cols);
        if ragged || w.shape() != p.w.shape() {
            return Err(DrawError::Shape {
                name: format!("{name}.w"),
                expected: p.w.shape(),
                found: (entry.w.len(), entry.w.first().map_or(0, Vec::len)),
            });
        }
        if entry.b.len() != p.b.cols {
            return Err(DrawError::Shape {
                name: format!("{name}.b"),
                expected: p.b.shape(),
                found: (1, entry.b.len()),
            });
        }
        p.w = w;
        p.b = Matrix::from_vec(1, entry.b.len(), entry.b.clone());
    }
    Ok(())
}

/// Save a checkpoint to `path` using JSON serialisation.
pub fn save_checkpoint(path: impl AsRef<Path>, state: &Checkpoint) -> Result<()> {
    let path = path.as_ref();
    let txt = serde_json::to_string(state)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    // Write then rename so an interrupted save keeps the previous checkpoint.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, txt)?;
    fs::rename(&tmp, path)?;
    log::info!("saved checkpoint to {}", path.display());
    Ok(())
}

/// Load a checkpoint from `path` that was saved with [`save_checkpoint`].
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let txt = fs::read_to_string(path)?;
    let state = serde_json::from_str(&txt)?;
    log::info!("loaded checkpoint from {}", path.display());
    Ok(state)
}

/// Rebuild the model described by a checkpoint.
pub fn model_from_checkpoint(ckpt: &Checkpoint) -> Result<Draw> {
    let mut rng = rng_from_seed(ckpt.config.seed);
    let mut model = Draw::new(ckpt.config.model_config(), Init::default(), &mut rng)?;
    restore_parameters(&mut model, &ckpt.parameters)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_round_trip() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(vec2_to_matrix(&matrix_to_vec2(&m)), m);
        assert_eq!(vec2_to_matrix(&[]).shape(), (0, 0));
    }
}
