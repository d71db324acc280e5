//! Native backend using nalgebra.
//!
//! It supports:
//! - LU based inversion and complex linear solves
//! - Real Schur decomposition for general eigenvalues, with eigenvectors
//!   recovered by shifted inverse iteration; repeated eigenvalues are
//!   deflated against the vectors already found for them
//! - Cholesky-transformed SymmetricEigen for generalized eigenvalue problems

use super::traits::*;
use nalgebra::linalg::{Cholesky, Schur, SymmetricEigen};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

const EIGEN_MAX_ITERATIONS: usize = 10_000;
const INVERSE_ITERATIONS: usize = 3;
const INVERSE_ITERATION_SHIFT: f64 = 1e-10;
/// Eigenvalues closer than this (relative to max(1, |λ|)) form one cluster
const CLUSTER_TOLERANCE: f64 = 1e-6;
/// Largest accepted residual |A x - λ x| relative to max(1, ‖A‖)
const EIGEN_RESIDUAL_TOLERANCE: f64 = 1e-6;
const START_VECTOR_MIN_NORM: f64 = 1e-3;

/// Native backend using nalgebra for all numerical operations.
///
/// Dense only; the systems handled here are a handful of lumped masses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

fn check_square(matrix: &DMatrix<f64>, what: &str) -> Result<usize, BackendError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(BackendError(format!(
            "{} must be square, got {}x{}",
            what,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    Ok(matrix.nrows())
}

/// Recover the eigenvector belonging to `lambda` from `(A - shift*I) x = x_prev`.
///
/// `deflate` holds unit vectors already found for the same (repeated)
/// eigenvalue; every iterate is projected off them so that a cluster of
/// equal eigenvalues yields independent vectors.
fn inverse_iteration(
    a: &DMatrix<Complex64>,
    lambda: Complex64,
    deflate: &[DVector<Complex64>],
) -> Result<DVector<Complex64>, BackendError> {
    let n = a.nrows();
    let scale = lambda.norm().max(1.0) * INVERSE_ITERATION_SHIFT;
    let shift = lambda + Complex64::new(scale, scale);

    let mut shifted = a.clone();
    for i in 0..n {
        shifted[(i, i)] -= shift;
    }
    let lu = shifted.lu();

    let mut x = start_vector(n, deflate)?;
    for _ in 0..INVERSE_ITERATIONS {
        x = lu
            .solve(&x)
            .ok_or_else(|| BackendError(format!("Inverse iteration failed for eigenvalue {lambda}")))?;
        project_out(&mut x, deflate);
        let norm = x.norm();
        if !norm.is_finite() || norm == 0.0 {
            return Err(BackendError(format!(
                "Inverse iteration diverged for eigenvalue {lambda}"
            )));
        }
        x = x.map(|c| c / norm);
    }

    // Fix the arbitrary complex phase: largest component becomes real positive.
    let pivot = x
        .iter()
        .copied()
        .max_by(|a, b| a.norm().total_cmp(&b.norm()))
        .unwrap_or(Complex64::new(1.0, 0.0));
    if pivot.norm() > 0.0 {
        let phase = pivot.conj() / pivot.norm();
        x = x.map(|c| c * phase);
    }
    Ok(x)
}

/// x -= Σ v (vᴴ x) over the unit vectors in `basis`.
fn project_out(x: &mut DVector<Complex64>, basis: &[DVector<Complex64>]) {
    for v in basis {
        let coeff = v.dotc(&*x);
        x.axpy(-coeff, v, Complex64::new(1.0, 0.0));
    }
}

/// Uniform start vector, or the first unit vector not spanned by `deflate`.
fn start_vector(
    n: usize,
    deflate: &[DVector<Complex64>],
) -> Result<DVector<Complex64>, BackendError> {
    let uniform = DVector::from_element(n, Complex64::new(1.0 / (n as f64).sqrt(), 0.0));
    let candidates = std::iter::once(uniform).chain((0..n).map(|k| {
        let mut e = DVector::zeros(n);
        e[k] = Complex64::new(1.0, 0.0);
        e
    }));
    for mut x in candidates {
        project_out(&mut x, deflate);
        let norm = x.norm();
        if norm > START_VECTOR_MIN_NORM {
            return Ok(x.map(|c| c / norm));
        }
    }
    Err("No start vector outside the deflation space".into())
}

/// Gram-Schmidt orthonormal basis of `vectors`, dependent ones dropped.
fn orthonormalize(vectors: &[DVector<Complex64>]) -> Vec<DVector<Complex64>> {
    let mut basis: Vec<DVector<Complex64>> = Vec::with_capacity(vectors.len());
    for v in vectors {
        let mut x = v.clone();
        project_out(&mut x, &basis);
        let norm = x.norm();
        if norm > START_VECTOR_MIN_NORM {
            basis.push(x.map(|c| c / norm));
        }
    }
    basis
}

fn eigen_residual(a: &DMatrix<Complex64>, lambda: Complex64, x: &DVector<Complex64>) -> f64 {
    (a * x - x.map(|c| c * lambda)).norm()
}

impl LinearAlgebra for NativeBackend {
    fn invert(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, BackendError> {
        let n = check_square(matrix, "Matrix")?;
        if n == 0 {
            return Ok(DMatrix::zeros(0, 0));
        }

        let inverse = matrix
            .clone()
            .try_inverse()
            .ok_or(BackendError("Matrix is singular in LU decomposition".into()))?;

        if inverse.iter().any(|v| !v.is_finite()) {
            return Err("Matrix inverse contains non-finite entries".into());
        }
        Ok(inverse)
    }

    fn solve_complex(
        &self,
        a: DMatrix<Complex64>,
        b: &DVector<Complex64>,
    ) -> Result<DVector<Complex64>, BackendError> {
        if a.nrows() != a.ncols() || a.nrows() != b.len() {
            return Err(BackendError(format!(
                "Complex system dimension mismatch: {}x{} with rhs of length {}",
                a.nrows(),
                a.ncols(),
                b.len()
            )));
        }

        let x = a
            .lu()
            .solve(b)
            .ok_or(BackendError("Singular complex matrix in LU decomposition".into()))?;

        if x.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
            return Err("Complex solve produced non-finite entries".into());
        }
        Ok(x)
    }

    fn eigen(&self, matrix: &DMatrix<f64>) -> Result<EigenResult, BackendError> {
        let n = check_square(matrix, "Matrix")?;
        if n == 0 {
            return Ok(EigenResult {
                eigenvalues: Vec::new(),
                eigenvectors: DMatrix::zeros(0, 0),
            });
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err("Matrix contains non-finite entries".into());
        }

        let schur = Schur::try_new(matrix.clone(), f64::EPSILON, EIGEN_MAX_ITERATIONS)
            .ok_or(BackendError("Schur decomposition did not converge".into()))?;
        let eigenvalues: Vec<Complex64> = schur.complex_eigenvalues().iter().copied().collect();

        let a_complex = matrix.map(|v| Complex64::new(v, 0.0));
        let residual_limit = EIGEN_RESIDUAL_TOLERANCE * matrix.norm().max(1.0);
        let mut found: Vec<DVector<Complex64>> = Vec::with_capacity(n);
        for (i, &lambda) in eigenvalues.iter().enumerate() {
            let cluster: Vec<DVector<Complex64>> = eigenvalues[..i]
                .iter()
                .zip(found.iter())
                .filter(|(mu, _)| (lambda - **mu).norm() <= CLUSTER_TOLERANCE * lambda.norm().max(1.0))
                .map(|(_, v)| v.clone())
                .collect();

            // A defective eigenvalue has fewer eigenvectors than its
            // multiplicity; the deflated iterate is then not an eigenvector
            // and the undeflated one is repeated instead.
            let v = match inverse_iteration(&a_complex, lambda, &orthonormalize(&cluster)) {
                Ok(v) if eigen_residual(&a_complex, lambda, &v) <= residual_limit => v,
                _ => inverse_iteration(&a_complex, lambda, &[])?,
            };
            found.push(v);
        }

        let mut eigenvectors = DMatrix::<Complex64>::zeros(n, n);
        for (i, v) in found.iter().enumerate() {
            eigenvectors.set_column(i, v);
        }

        Ok(EigenResult {
            eigenvalues,
            eigenvectors,
        })
    }

    fn generalized_symmetric_eigen(
        &self,
        stiffness: &DMatrix<f64>,
        mass: &DMatrix<f64>,
    ) -> Result<GeneralizedEigenResult, BackendError> {
        let n = check_square(stiffness, "Stiffness matrix")?;
        if check_square(mass, "Mass matrix")? != n {
            return Err("K and M must have same dimensions".into());
        }
        if n == 0 {
            return Ok(GeneralizedEigenResult {
                eigenvalues: Vec::new(),
                eigenvectors: DMatrix::zeros(0, 0),
            });
        }

        // Cholesky decomposition: M = L * L^T
        let chol_m = Cholesky::new(mass.clone())
            .ok_or(BackendError("Mass matrix not positive definite".into()))?;
        let l_inv = chol_m
            .l()
            .try_inverse()
            .ok_or(BackendError("Failed to invert Cholesky factor L".into()))?;
        let l_inv_t = l_inv.transpose();

        // K* = L^-1 * K * L^-T, symmetrized against round-off
        let k_star = &l_inv * stiffness * &l_inv_t;
        let k_star = (&k_star + k_star.transpose()) * 0.5;

        let eigen = SymmetricEigen::try_new(k_star, f64::EPSILON, EIGEN_MAX_ITERATIONS)
            .ok_or(BackendError("Symmetric eigen solve did not converge".into()))?;

        // phi = L^-T * psi
        let mut pairs: Vec<(f64, DVector<f64>)> = (0..n)
            .map(|i| {
                let psi: DVector<f64> = eigen.eigenvectors.column(i).into_owned();
                (eigen.eigenvalues[i], &l_inv_t * psi)
            })
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let eigenvalues = pairs.iter().map(|(lambda, _)| *lambda).collect();
        let mut eigenvectors = DMatrix::zeros(n, n);
        for (mode, (_, phi)) in pairs.iter().enumerate() {
            eigenvectors.set_column(mode, phi);
        }

        Ok(GeneralizedEigenResult {
            eigenvalues,
            eigenvectors,
        })
    }

    fn name(&self) -> &str {
        "native-nalgebra"
    }
}
