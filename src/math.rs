use std::sync::atomic::{AtomicUsize, Ordering};

static MATRIX_OPS: AtomicUsize = AtomicUsize::new(0);

pub fn reset_matrix_ops() {
    MATRIX_OPS.store(0, Ordering::SeqCst);
}

pub fn matrix_ops_count() -> usize {
    MATRIX_OPS.load(Ordering::SeqCst)
}

pub(crate) fn inc_ops() {
    MATRIX_OPS.fetch_add(1, Ordering::Relaxed);
}

/// Dense row-major `f32` matrix. Activations are stored as `batch x width`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(r: usize, c: usize) -> Self {
        Matrix {
            rows: r,
            cols: c,
            data: vec![0.0; r * c],
        }
    }

    pub fn from_vec(r: usize, c: usize, v: Vec<f32>) -> Self {
        assert_eq!(v.len(), r * c);
        Matrix {
            rows: r,
            cols: c,
            data: v,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.cols + c] = v;
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
        inc_ops();
        assert_eq!(a.cols, b.rows);
        let mut out = vec![0.0; a.rows * b.cols];
        for i in 0..a.rows {
            let a_row = &a.data[i * a.cols..(i + 1) * a.cols];
            let out_row = &mut out[i * b.cols..(i + 1) * b.cols];
            for (k, &a_val) in a_row.iter().enumerate() {
                if a_val == 0.0 {
                    continue;
                }
                let b_row = &b.data[k * b.cols..(k + 1) * b.cols];
                for (o, &b_val) in out_row.iter_mut().zip(b_row) {
                    *o += a_val * b_val;
                }
            }
        }
        Matrix::from_vec(a.rows, b.cols, out)
    }

    /// `a^T b` without materialising the transpose.
    pub fn matmul_tn(a: &Matrix, b: &Matrix) -> Matrix {
        inc_ops();
        assert_eq!(a.rows, b.rows);
        let mut out = vec![0.0; a.cols * b.cols];
        for r in 0..a.rows {
            let a_row = a.row(r);
            let b_row = b.row(r);
            for (i, &a_val) in a_row.iter().enumerate() {
                if a_val == 0.0 {
                    continue;
                }
                let out_row = &mut out[i * b.cols..(i + 1) * b.cols];
                for (o, &b_val) in out_row.iter_mut().zip(b_row) {
                    *o += a_val * b_val;
                }
            }
        }
        Matrix::from_vec(a.cols, b.cols, out)
    }

    /// `a b^T` without materialising the transpose.
    pub fn matmul_nt(a: &Matrix, b: &Matrix) -> Matrix {
        inc_ops();
        assert_eq!(a.cols, b.cols);
        let mut out = vec![0.0; a.rows * b.rows];
        for i in 0..a.rows {
            let a_row = a.row(i);
            for j in 0..b.rows {
                out[i * b.rows + j] = a_row.iter().zip(b.row(j)).map(|(x, y)| x * y).sum();
            }
        }
        Matrix::from_vec(a.rows, b.rows, out)
    }

    pub fn add(&self, other: &Matrix) -> Matrix {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Matrix) -> Matrix {
        self.zip_with(other, |a, b| a - b)
    }

    /// Elementwise product.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn add_assign(&mut self, other: &Matrix) {
        inc_ops();
        assert_eq!(self.shape(), other.shape());
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    pub fn zip_with(&self, other: &Matrix, f: impl Fn(f32, f32) -> f32) -> Matrix {
        inc_ops();
        assert_eq!(self.rows, other.rows);
        assert_eq!(self.cols, other.cols);
        let v = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Matrix::from_vec(self.rows, self.cols, v)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Matrix {
        inc_ops();
        Matrix::from_vec(self.rows, self.cols, self.data.iter().map(|&v| f(v)).collect())
    }

    pub fn scale(&self, s: f32) -> Matrix {
        self.map(|v| v * s)
    }

    /// Broadcast a `1 x cols` row over every row of `self`.
    pub fn add_row(&self, row: &Matrix) -> Matrix {
        inc_ops();
        assert_eq!(row.rows, 1);
        assert_eq!(row.cols, self.cols);
        let mut out = self.clone();
        for chunk in out.data.chunks_mut(self.cols) {
            for (o, &b) in chunk.iter_mut().zip(&row.data) {
                *o += b;
            }
        }
        out
    }

    /// Column sums as a `1 x cols` row.
    pub fn sum_rows(&self) -> Matrix {
        inc_ops();
        let mut out = vec![0.0; self.cols];
        for chunk in self.data.chunks(self.cols.max(1)) {
            for (o, &v) in out.iter_mut().zip(chunk) {
                *o += v;
            }
        }
        Matrix::from_vec(1, self.cols, out)
    }

    pub fn concat_cols(a: &Matrix, b: &Matrix) -> Matrix {
        inc_ops();
        assert_eq!(a.rows, b.rows);
        let cols = a.cols + b.cols;
        let mut data = Vec::with_capacity(a.rows * cols);
        for r in 0..a.rows {
            data.extend_from_slice(a.row(r));
            data.extend_from_slice(b.row(r));
        }
        Matrix::from_vec(a.rows, cols, data)
    }

    /// Split into the first `at` columns and the remainder.
    pub fn split_cols(&self, at: usize) -> (Matrix, Matrix) {
        inc_ops();
        assert!(at <= self.cols);
        let right_cols = self.cols - at;
        let mut left = Vec::with_capacity(self.rows * at);
        let mut right = Vec::with_capacity(self.rows * right_cols);
        for r in 0..self.rows {
            let row = self.row(r);
            left.extend_from_slice(&row[..at]);
            right.extend_from_slice(&row[at..]);
        }
        (
            Matrix::from_vec(self.rows, at, left),
            Matrix::from_vec(self.rows, right_cols, right),
        )
    }

    pub fn transpose(&self) -> Matrix {
        inc_ops();
        let mut v = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                v[j * self.rows + i] = self.get(i, j);
            }
        }
        Matrix::from_vec(self.cols, self.rows, v)
    }
}

pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// `ln(1 + e^v)` evaluated without overflow.
pub fn softplus(v: f32) -> f32 {
    if v > 0.0 {
        v + (-v).exp().ln_1p()
    } else {
        v.exp().ln_1p()
    }
}

/// Binary cross-entropy between targets `x` and `sigmoid(logits)`.
///
/// Returns the per-example cross-entropy summed over columns, averaged over the
/// batch, together with its gradient with respect to `logits`. Working on the
/// logits avoids `ln(0)` when the sigmoid saturates.
pub fn binary_cross_entropy_with_logits(x: &Matrix, logits: &Matrix) -> (f32, Matrix) {
    assert_eq!(x.shape(), logits.shape());
    let batch = x.rows.max(1) as f32;
    let mut loss = 0.0f32;
    let mut grad = Matrix::zeros(x.rows, x.cols);
    for ((g, &t), &l) in grad.data.iter_mut().zip(&x.data).zip(&logits.data) {
        loss += softplus(l) - t * l;
        *g = (sigmoid(l) - t) / batch;
    }
    (loss / batch, grad)
}

/// Per-example KL divergence of `N(mu, exp(log_sigma)^2)` from `N(0, I)`,
/// summed over latent units.
pub fn gaussian_kl(mu: &Matrix, log_sigma: &Matrix) -> Vec<f32> {
    assert_eq!(mu.shape(), log_sigma.shape());
    (0..mu.rows)
        .map(|r| {
            mu.row(r)
                .iter()
                .zip(log_sigma.row(r))
                .map(|(&m, &ls)| -ls + 0.5 * ((2.0 * ls).exp() + m * m) - 0.5)
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_variants_agree() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::from_vec(2, 2, vec![1.0, 0.5, -1.0, 2.0]);
        let tn = Matrix::matmul_tn(&a, &b);
        assert_eq!(tn, Matrix::matmul(&a.transpose(), &b));

        let c = Matrix::from_vec(4, 3, (0..12).map(|v| v as f32).collect());
        let nt = Matrix::matmul_nt(&a, &c);
        assert_eq!(nt, Matrix::matmul(&a, &c.transpose()));
    }

    #[test]
    fn concat_then_split_restores_halves() {
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::from_vec(2, 1, vec![9.0, 8.0]);
        let c = Matrix::concat_cols(&a, &b);
        assert_eq!(c.data, vec![1.0, 2.0, 9.0, 3.0, 4.0, 8.0]);
        let (l, r) = c.split_cols(2);
        assert_eq!(l, a);
        assert_eq!(r, b);
    }

    #[test]
    fn add_row_and_sum_rows() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let bias = Matrix::from_vec(1, 2, vec![10.0, 20.0]);
        assert_eq!(m.add_row(&bias).data, vec![11.0, 22.0, 13.0, 24.0]);
        assert_eq!(m.sum_rows().data, vec![4.0, 6.0]);
    }

    #[test]
    fn softplus_is_stable() {
        assert!((softplus(0.0) - 2f32.ln()).abs() < 1e-6);
        assert!((softplus(100.0) - 100.0).abs() < 1e-4);
        assert!(softplus(-100.0) >= 0.0);
        assert!(softplus(-100.0) < 1e-30);
    }

    #[test]
    fn kl_is_zero_at_prior() {
        let mu = Matrix::zeros(3, 4);
        let ls = Matrix::zeros(3, 4);
        for kl in gaussian_kl(&mu, &ls) {
            assert_eq!(kl, 0.0);
        }
    }

    #[test]
    fn kl_matches_closed_form() {
        let mu = Matrix::from_vec(1, 2, vec![1.0, -0.5]);
        let ls = Matrix::from_vec(1, 2, vec![0.3, -0.2]);
        let expected: f32 = [(1.0f32, 0.3f32), (-0.5, -0.2)]
            .iter()
            .map(|&(m, ls)| {
                let var = (2.0 * ls).exp();
                0.5 * (var + m * m - 1.0 - (var).ln())
            })
            .sum();
        let kl = gaussian_kl(&mu, &ls);
        assert!((kl[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn bce_gradient_matches_finite_differences() {
        let x = Matrix::from_vec(2, 3, vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let logits = Matrix::from_vec(2, 3, vec![0.2, -1.0, 2.0, 0.5, -0.3, 0.0]);
        let (_, grad) = binary_cross_entropy_with_logits(&x, &logits);
        let h = 1e-2;
        for i in 0..logits.data.len() {
            let mut plus = logits.clone();
            plus.data[i] += h;
            let mut minus = logits.clone();
            minus.data[i] -= h;
            let (lp, _) = binary_cross_entropy_with_logits(&x, &plus);
            let (lm, _) = binary_cross_entropy_with_logits(&x, &minus);
            let numeric = (lp - lm) / (2.0 * h);
            assert!((numeric - grad.data[i]).abs() < 1e-3, "index {i}");
        }
    }

    #[test]
    fn bce_matches_probability_form() {
        let x = Matrix::from_vec(1, 2, vec![1.0, 0.0]);
        let logits = Matrix::from_vec(1, 2, vec![0.4, -0.7]);
        let (loss, _) = binary_cross_entropy_with_logits(&x, &logits);
        let p0 = sigmoid(0.4);
        let p1 = sigmoid(-0.7);
        let expected = -(p0.ln()) - (1.0 - p1).ln();
        assert!((loss - expected).abs() < 1e-5);
    }
}
