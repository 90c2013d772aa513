use super::linear::Linear;

/// Common interface for the trainable building blocks.
pub trait Layer {
    /// Zero any accumulated gradients.
    fn zero_grad(&mut self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    /// Retrieve mutable references to parameters for optimisation/state
    /// serialisation.
    fn parameters(&mut self) -> Vec<&mut Linear>;
}

impl Layer for Linear {
    fn parameters(&mut self) -> Vec<&mut Linear> {
        Linear::parameters(self)
    }
}
