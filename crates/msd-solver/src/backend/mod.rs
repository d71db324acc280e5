//! Numerical backend abstraction layer.
//!
//! Every matrix decomposition used by the simulator (inversion, complex
//! solves, eigen decompositions) goes through the [`LinearAlgebra`] trait.
//! Plain arithmetic (multiply, add, transpose, identity) is done directly on
//! `nalgebra` matrices; block assembly helpers live here.
//!
//! # Architecture
//!
//! ```text
//! MechanicalSystem (M, C, K as DMatrix)
//!         │
//!         ▼
//! StateSpaceModel / FrequencyAnalyzer / MultiMassChain
//!         │
//!         ▼
//! Backend Trait Layer (LinearAlgebra)
//!         │
//!         ▼
//!   NativeBackend (nalgebra)
//! ```

pub mod native;
pub mod traits;

use nalgebra::DMatrix;

pub use native::NativeBackend;
pub use traits::*;

/// Returns the default backend.
pub fn default_backend() -> Box<dyn LinearAlgebra> {
    Box::new(NativeBackend)
}

/// Assemble `[[tl, tr], [bl, br]]` from four blocks.
///
/// Row counts of `tl`/`tr` and `bl`/`br`, and column counts of `tl`/`bl`
/// and `tr`/`br`, must agree.
pub fn block_2x2(
    tl: &DMatrix<f64>,
    tr: &DMatrix<f64>,
    bl: &DMatrix<f64>,
    br: &DMatrix<f64>,
) -> Result<DMatrix<f64>, BackendError> {
    let top = hconcat(tl, tr)?;
    let bottom = hconcat(bl, br)?;
    vconcat(&top, &bottom)
}

/// Concatenate two matrices side by side.
pub fn hconcat(left: &DMatrix<f64>, right: &DMatrix<f64>) -> Result<DMatrix<f64>, BackendError> {
    if left.nrows() != right.nrows() {
        return Err(BackendError(format!(
            "Cannot concatenate horizontally: {} rows vs {} rows",
            left.nrows(),
            right.nrows()
        )));
    }
    let mut out = DMatrix::zeros(left.nrows(), left.ncols() + right.ncols());
    out.view_mut((0, 0), left.shape()).copy_from(left);
    out.view_mut((0, left.ncols()), right.shape()).copy_from(right);
    Ok(out)
}

/// Stack two matrices vertically.
pub fn vconcat(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> Result<DMatrix<f64>, BackendError> {
    if top.ncols() != bottom.ncols() {
        return Err(BackendError(format!(
            "Cannot concatenate vertically: {} columns vs {} columns",
            top.ncols(),
            bottom.ncols()
        )));
    }
    let mut out = DMatrix::zeros(top.nrows() + bottom.nrows(), top.ncols());
    out.view_mut((0, 0), top.shape()).copy_from(top);
    out.view_mut((top.nrows(), 0), bottom.shape()).copy_from(bottom);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_2x2_places_blocks() {
        let tl = DMatrix::from_element(1, 1, 1.0);
        let tr = DMatrix::from_element(1, 2, 2.0);
        let bl = DMatrix::from_element(2, 1, 3.0);
        let br = DMatrix::from_element(2, 2, 4.0);

        let m = block_2x2(&tl, &tr, &bl, &br).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 2)], 2.0);
        assert_eq!(m[(2, 0)], 3.0);
        assert_eq!(m[(1, 1)], 4.0);
    }

    #[test]
    fn concat_rejects_mismatched_shapes() {
        let a = DMatrix::<f64>::zeros(2, 2);
        let b = DMatrix::<f64>::zeros(3, 2);
        assert!(hconcat(&a, &b).is_err());
        assert!(vconcat(&a, &DMatrix::zeros(2, 3)).is_err());
    }

    #[test]
    fn default_backend_is_native() {
        assert_eq!(default_backend().name(), "native-nalgebra");
    }
}
