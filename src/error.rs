use thiserror::Error;

/// Errors raised while configuring, training or persisting a model.
#[derive(Debug, Error)]
pub enum DrawError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("parameter {name}: expected shape {expected:?}, found {found:?}")]
    Shape {
        name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training diverged at epoch {epoch}, iteration {iteration}")]
    Diverged { epoch: usize, iteration: usize },
}

pub type Result<T> = std::result::Result<T, DrawError>;
