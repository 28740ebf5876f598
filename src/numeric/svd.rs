//! Singular value decomposition (Golub–Kahan–Reinsch) and the Moore-Penrose pseudoinverse.
//!
//! The decomposition runs as three explicit phases over a `Decomposition` working state:
//!
//! 1. Householder reduction of the input to upper bidiagonal form,
//! 2. accumulation of the right-hand and then the left-hand transforms,
//! 3. implicit-shift QR diagonalization, one singular value at a time from the bottom up.
//!
//! Singular values are finally sorted in descending order, carrying the matching columns of
//! `U` and rows of `Vᵀ` along with them.

use crate::error::{Error, Result};
use crate::numeric::matrix::Matrix;
use crate::numeric::vector::Vector;
use log::{trace, warn};

/// Singular values at or below this magnitude are treated as zero by the pseudoinverse.
pub const PSEUDO_INVERSE_THRESHOLD: f64 = 1e-9;

/// Configuration of the iterative diagonalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SvdOptions {
    /// QR sweeps allowed per singular value.
    pub max_iterations: usize,
    /// Fail with [`Error::NonConvergence`] instead of returning a best-effort result.
    pub strict: bool,
}

impl Default for SvdOptions {
    fn default() -> Self {
        Self {
            max_iterations: 80,
            strict: false,
        }
    }
}

impl SvdOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Thin SVD `A = U · diag(σ) · Vᵀ` of an `m × n` matrix with `m >= n`.
#[derive(Clone, Debug)]
pub struct Svd {
    /// `m × n`, orthonormal columns.
    pub u: Matrix,
    /// `n` non-negative singular values, descending.
    pub singular_values: Vector,
    /// `n × n`; row `i` is the right singular vector paired with `singular_values[i]`.
    pub vt: Matrix,
    /// `false` when a singular value hit the iteration cap in non-strict mode.
    pub converged: bool,
}

impl Svd {
    /// Multiplies the factors back together.
    pub fn reconstruct(&self) -> Matrix {
        let (m, n) = (self.u.rows(), self.vt.rows());
        let mut out = Matrix::new(m, n);
        for i in 0..m {
            for j in 0..n {
                out[(i, j)] = (0..n)
                    .map(|k| self.u[(i, k)] * self.singular_values[k] * self.vt[(k, j)])
                    .sum();
            }
        }
        out
    }
}

impl Matrix {
    /// Computes the thin singular value decomposition of a matrix with at least as many rows
    /// as columns.
    ///
    /// # Errors
    /// * [`Error::ShapeMismatch`] if `rows < cols`.
    /// * [`Error::InvalidParameter`] if `options.max_iterations` is zero.
    /// * [`Error::NonConvergence`] in strict mode when a singular value fails to converge.
    pub fn svd(&self, options: SvdOptions) -> Result<Svd> {
        if self.rows() < self.cols() {
            return Err(Error::shape(
                "svd",
                format!("rows >= cols ({})", self.cols()),
                self.rows(),
            ));
        }
        if options.max_iterations == 0 {
            return Err(Error::InvalidParameter(
                "svd needs at least one iteration per singular value".to_string(),
            ));
        }
        let mut work = Decomposition::new(self);
        work.bidiagonalize();
        work.accumulate_right();
        work.accumulate_left();
        let converged = work.diagonalize(options)?;
        work.sort_descending();
        fix_nans(&mut work.u);
        fix_nans(&mut work.v);
        Ok(Svd {
            u: work.u,
            singular_values: Vector::from(work.sigma),
            vt: work.v,
            converged,
        })
    }

    /// Moore-Penrose pseudoinverse with the default (non-strict, 80 iteration) SVD.
    ///
    /// # Example
    /// ```rust
    /// use layerwise::numeric::Matrix;
    ///
    /// let a = Matrix::deserialize(&[2.0, 0.0, 0.0, 4.0], 2, 2).unwrap();
    /// let inv = a.pseudo_inverse().unwrap();
    /// assert!((inv[(0, 0)] - 0.5).abs() < 1e-12);
    /// assert!((inv[(1, 1)] - 0.25).abs() < 1e-12);
    /// ```
    pub fn pseudo_inverse(&self) -> Result<Matrix> {
        self.pseudo_inverse_with(SvdOptions::default())
    }

    /// Moore-Penrose pseudoinverse: `V · Σ⁺ · Uᵀ`, where `Σ⁺` reciprocates singular values
    /// above [`PSEUDO_INVERSE_THRESHOLD`] and zeroes the rest.
    ///
    /// Wide matrices are handled through their transpose, since `A⁺ = ((Aᵀ)⁺)ᵀ`.
    pub fn pseudo_inverse_with(&self, options: SvdOptions) -> Result<Matrix> {
        if self.rows() < self.cols() {
            return Ok(self.transpose().pseudo_inverse_with(options)?.transpose());
        }
        let svd = self.svd(options)?;
        let (m, n) = (self.rows(), self.cols());
        let inverted: Vec<f64> = svd
            .singular_values
            .iter()
            .map(|&s| {
                if s.abs() > PSEUDO_INVERSE_THRESHOLD {
                    safe_divide(1.0, s)
                } else {
                    0.0
                }
            })
            .collect();
        let mut out = Matrix::new(n, m);
        for i in 0..n {
            for j in 0..m {
                out[(i, j)] = (0..n)
                    .map(|k| svd.vt[(k, i)] * inverted[k] * svd.u[(j, k)])
                    .sum();
            }
        }
        Ok(out)
    }
}

/// Where the bidiagonal matrix splits above singular value `k`.
enum Split {
    /// `e[l]` is negligible: the block `l..=k` is already decoupled.
    Decoupled(usize),
    /// `σ[l-1]` is negligible: `e[l]` must be cancelled by rotations before iterating.
    NeedsCancellation(usize),
}

/// Working state of one decomposition.
struct Decomposition {
    m: usize,
    n: usize,
    /// Starts as a copy of the input, ends as the left singular vectors.
    u: Matrix,
    /// Ends as `Vᵀ`.
    v: Matrix,
    /// Diagonal of the bidiagonal form, then the singular values.
    sigma: Vec<f64>,
    /// Superdiagonal of the bidiagonal form; `e[0]` is always zero.
    e: Vec<f64>,
    /// Running norm estimate used by the negligibility tests.
    norm: f64,
}

impl Decomposition {
    fn new(a: &Matrix) -> Self {
        let (m, n) = (a.rows(), a.cols());
        Self {
            m,
            n,
            u: a.clone(),
            v: Matrix::new(n, n),
            sigma: vec![0.0; n],
            e: vec![0.0; n],
            norm: 0.0,
        }
    }

    fn negligible(&self, value: f64) -> bool {
        value.abs() + self.norm == self.norm
    }

    /// Phase 1: Householder reduction to bidiagonal form.
    fn bidiagonalize(&mut self) {
        let (m, n) = (self.m, self.n);
        let mut g = 0.0;
        let mut scale = 0.0;
        for i in 0..n {
            self.e[i] = scale * g;
            let l = i + 1;

            // Left-hand reduction (column i).
            g = 0.0;
            let mut s = 0.0;
            scale = (i..m).map(|k| self.u[(k, i)].abs()).sum();
            if scale != 0.0 {
                for k in i..m {
                    let t = safe_divide(self.u[(k, i)], scale);
                    self.u[(k, i)] = t;
                    s += t * t;
                }
                let f = self.u[(i, i)];
                g = -take_sign(s.sqrt(), f);
                let h = f * g - s;
                self.u[(i, i)] = f - g;
                if i != n - 1 {
                    for j in l..n {
                        let dot: f64 = (i..m).map(|k| self.u[(k, i)] * self.u[(k, j)]).sum();
                        let f = safe_divide(dot, h);
                        for k in i..m {
                            let t = self.u[(k, i)];
                            self.u[(k, j)] += f * t;
                        }
                    }
                }
                for k in i..m {
                    self.u[(k, i)] *= scale;
                }
            }
            self.sigma[i] = scale * g;

            // Right-hand reduction (row i).
            g = 0.0;
            s = 0.0;
            scale = 0.0;
            if i != n - 1 {
                scale = (l..n).map(|k| self.u[(i, k)].abs()).sum();
                if scale != 0.0 {
                    for k in l..n {
                        let t = safe_divide(self.u[(i, k)], scale);
                        self.u[(i, k)] = t;
                        s += t * t;
                    }
                    let f = self.u[(i, l)];
                    g = -take_sign(s.sqrt(), f);
                    let h = f * g - s;
                    self.u[(i, l)] = f - g;
                    for k in l..n {
                        self.e[k] = safe_divide(self.u[(i, k)], h);
                    }
                    if i != m - 1 {
                        for j in l..m {
                            let dot: f64 = (l..n).map(|k| self.u[(j, k)] * self.u[(i, k)]).sum();
                            for k in l..n {
                                let t = self.e[k];
                                self.u[(j, k)] += dot * t;
                            }
                        }
                    }
                    for k in l..n {
                        self.u[(i, k)] *= scale;
                    }
                }
            }
            self.norm = self.norm.max(self.sigma[i].abs() + self.e[i].abs());
        }
    }

    /// Phase 2a: build `Vᵀ` from the stored right-hand Householder vectors.
    fn accumulate_right(&mut self) {
        let n = self.n;
        for i in (0..n).rev() {
            if i < n - 1 {
                let l = i + 1;
                let g = self.e[l];
                if g != 0.0 {
                    for j in l..n {
                        // Two divisions to avoid underflow.
                        self.v[(i, j)] = safe_divide(safe_divide(self.u[(i, j)], self.u[(i, l)]), g);
                    }
                    for j in l..n {
                        let dot: f64 = (l..n).map(|k| self.u[(i, k)] * self.v[(j, k)]).sum();
                        for k in l..n {
                            let t = self.v[(i, k)];
                            self.v[(j, k)] += dot * t;
                        }
                    }
                }
                for j in l..n {
                    self.v[(i, j)] = 0.0;
                    self.v[(j, i)] = 0.0;
                }
            }
            self.v[(i, i)] = 1.0;
        }
    }

    /// Phase 2b: build `U` in place from the stored left-hand Householder vectors.
    fn accumulate_left(&mut self) {
        let (m, n) = (self.m, self.n);
        for i in (0..n).rev() {
            let l = i + 1;
            for j in l..n {
                self.u[(i, j)] = 0.0;
            }
            let g = self.sigma[i];
            if g != 0.0 {
                let g = safe_divide(1.0, g);
                if i != n - 1 {
                    for j in l..n {
                        let dot: f64 = (l..m).map(|k| self.u[(k, i)] * self.u[(k, j)]).sum();
                        let f = safe_divide(dot, self.u[(i, i)]) * g;
                        for k in i..m {
                            let t = self.u[(k, i)];
                            self.u[(k, j)] += f * t;
                        }
                    }
                }
                for j in i..m {
                    self.u[(j, i)] *= g;
                }
            } else {
                for j in i..m {
                    self.u[(j, i)] = 0.0;
                }
            }
            self.u[(i, i)] += 1.0;
        }
    }

    /// Phase 3: diagonalize the bidiagonal form.
    ///
    /// Returns `false` if some singular value hit the iteration cap in non-strict mode.
    fn diagonalize(&mut self, options: SvdOptions) -> Result<bool> {
        let mut converged = true;
        for k in (0..self.n).rev() {
            let mut iteration = 1;
            loop {
                let l = match self.find_split(k) {
                    Split::Decoupled(l) => l,
                    Split::NeedsCancellation(l) => {
                        self.cancel(l, k);
                        l
                    }
                };

                if l == k {
                    if self.sigma[k] < 0.0 {
                        self.sigma[k] = -self.sigma[k];
                        for j in 0..self.n {
                            self.v[(k, j)] = -self.v[(k, j)];
                        }
                    }
                    trace!("singular value {} converged after {} iterations", k, iteration);
                    break;
                }

                let exhausted = iteration >= options.max_iterations;
                if exhausted && options.strict {
                    return Err(Error::NonConvergence {
                        iterations: options.max_iterations,
                        index: k,
                    });
                }

                self.shift_and_sweep(l, k);

                if exhausted {
                    warn!(
                        "svd: singular value {} did not converge within {} iterations, keeping best effort",
                        k, options.max_iterations
                    );
                    converged = false;
                    break;
                }
                iteration += 1;
            }
        }
        Ok(converged)
    }

    fn find_split(&self, k: usize) -> Split {
        let mut l = k;
        loop {
            if l == 0 || self.negligible(self.e[l]) {
                return Split::Decoupled(l);
            }
            if self.negligible(self.sigma[l - 1]) {
                return Split::NeedsCancellation(l);
            }
            l -= 1;
        }
    }

    /// Zeroes `e[l..=k]` against the negligible `σ[l-1]` with Givens rotations on `U`.
    fn cancel(&mut self, l: usize, k: usize) {
        let q = l - 1;
        let mut c = 0.0;
        let mut s = 1.0;
        for i in l..=k {
            let f = s * self.e[i];
            self.e[i] *= c;
            if self.negligible(f) {
                break;
            }
            let g = self.sigma[i];
            let h = pythag(f, g);
            self.sigma[i] = h;
            let h = safe_divide(1.0, h);
            c = g * h;
            s = -f * h;
            self.rotate_u(q, i, c, s);
        }
    }

    /// One implicit QR sweep over `l..=k` with the shift taken from the bottom 2×2 minor.
    fn shift_and_sweep(&mut self, l: usize, k: usize) {
        let q = k - 1;
        let mut x = self.sigma[l];
        let z = self.sigma[k];
        let mut y = self.sigma[q];
        let mut g = self.e[q];
        let mut h = self.e[k];
        let mut f = safe_divide((y - z) * (y + z) + (g - h) * (g + h), 2.0 * h * y);
        g = pythag(f, 1.0);
        f = safe_divide((x - z) * (x + z) + h * (safe_divide(y, f + take_sign(g, f)) - h), x);

        let mut c = 1.0;
        let mut s = 1.0;
        for j in l..=q {
            let i = j + 1;
            g = self.e[i];
            y = self.sigma[i];
            h = s * g;
            g *= c;
            let mut z = pythag(f, h);
            self.e[j] = z;
            c = safe_divide(f, z);
            s = safe_divide(h, z);
            f = x * c + g * s;
            g = g * c - x * s;
            h = y * s;
            y *= c;
            self.rotate_v(j, i, c, s);
            z = pythag(f, h);
            self.sigma[j] = z;
            if z != 0.0 {
                let inv = safe_divide(1.0, z);
                c = f * inv;
                s = h * inv;
            }
            f = c * g + s * y;
            x = c * y - s * g;
            self.rotate_u(j, i, c, s);
        }
        self.e[l] = 0.0;
        self.e[k] = f;
        self.sigma[k] = x;
    }

    fn rotate_u(&mut self, a: usize, b: usize, c: f64, s: f64) {
        for p in 0..self.m {
            let y = self.u[(p, a)];
            let z = self.u[(p, b)];
            self.u[(p, a)] = y * c + z * s;
            self.u[(p, b)] = z * c - y * s;
        }
    }

    fn rotate_v(&mut self, a: usize, b: usize, c: f64, s: f64) {
        for p in 0..self.n {
            let x = self.v[(a, p)];
            let z = self.v[(b, p)];
            self.v[(a, p)] = x * c + z * s;
            self.v[(b, p)] = z * c - x * s;
        }
    }

    /// Insertion sort of the singular values, largest first.
    fn sort_descending(&mut self) {
        for i in 1..self.n {
            let mut j = i;
            while j > 0 && self.sigma[j - 1] < self.sigma[j] {
                self.u.swap_columns(j - 1, j);
                self.v.swap_rows(j - 1, j);
                self.sigma.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

fn pythag(a: f64, b: f64) -> f64 {
    let at = a.abs();
    let bt = b.abs();
    if at > bt {
        let ct = bt / at;
        at * (1.0 + ct * ct).sqrt()
    } else if bt > 0.0 {
        let ct = at / bt;
        bt * (1.0 + ct * ct).sqrt()
    } else {
        0.0
    }
}

/// `n / d`, except that `0 / 0` is `0`.
fn safe_divide(n: f64, d: f64) -> f64 {
    if d == 0.0 && n == 0.0 {
        0.0
    } else {
        n / d
    }
}

/// `|a|` carrying the sign of `b`.
fn take_sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

fn fix_nans(m: &mut Matrix) {
    for r in 0..m.rows() {
        for c in 0..m.cols() {
            if m[(r, c)].is_nan() {
                m[(r, c)] = if r == c { 1.0 } else { 0.0 };
            }
        }
    }
}
