use crate::math::{self, Matrix};

/// Sigmoid of every element, leaving the input untouched.
pub fn apply(m: &Matrix) -> Matrix {
    m.map(math::sigmoid)
}

/// Multiply gradient with derivative of sigmoid using activated values.
pub fn backward(grad: &mut Matrix, activated: &Matrix) {
    for (g, &h) in grad.data.iter_mut().zip(activated.data.iter()) {
        *g *= h * (1.0 - h);
    }
}
