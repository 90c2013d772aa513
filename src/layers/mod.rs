pub mod layer;
pub mod linear;
pub mod read_write;
pub mod rnn;
pub mod sampler;
pub mod sigmoid;
pub mod tanh;

pub use layer::Layer;
pub use linear::{Init, Linear};
pub use read_write::{Reader, Writer};
pub use rnn::Recurrent;
pub use sampler::{QSampler, Sample};
