pub mod draw;

pub use draw::{Draw, DrawConfig, DrawOutput, LossTerms};
