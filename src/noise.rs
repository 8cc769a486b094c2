use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::{
    cross::{CrossSpectrumSet, TracerPair},
    error::{ensure_len, SimError, SimResult},
};

const OFF_DIAGONAL: f64 = 0.5;
const DIAGONAL_SCATTER: f64 = 0.1;

/// Random tri-diagonal covariance over `ndim` multipoles.
///
/// Diagonal entries scatter around one, neighbours correlate with
/// alternating sign at half the geometric mean of their variances.
pub fn noise_covariance(ndim: usize, rng: &mut dyn RngCore) -> DMatrix<f64> {
    let mut cov = DMatrix::zeros(ndim, ndim);
    for i in 0..ndim {
        let n: f64 = StandardNormal.sample(&mut *rng);
        cov[(i, i)] = 1.0 + DIAGONAL_SCATTER * n;
    }
    for i in 0..ndim.saturating_sub(1) {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let c = sign * OFF_DIAGONAL * (cov[(i, i)] * cov[(i + 1, i + 1)]).sqrt();
        cov[(i, i + 1)] = c;
        cov[(i + 1, i)] = c;
    }
    cov
}

/// Adds one draw of `N(0, Σ)` to every spectrum of every family, with a
/// single covariance `Σ` shared across all of them.
pub fn add_noise(set: &CrossSpectrumSet, rng: &mut dyn RngCore) -> SimResult<CrossSpectrumSet> {
    let ndim = set.lmax + 1;
    let cov = noise_covariance(ndim, rng);
    let chol = cov.cholesky().ok_or_else(|| {
        SimError::InvalidParameter("noise covariance is not positive definite".to_string())
    })?;
    let l = chol.l();

    let mut noisy = set.clone();
    for pair in TracerPair::ALL {
        for spectrum in noisy.family_mut(pair) {
            ensure_len("noisy spectrum length", ndim, spectrum.cl.len())?;
            let eps = DVector::from_fn(ndim, |_, _| -> f64 { StandardNormal.sample(&mut *rng) });
            let draw = &l * eps;
            spectrum.cl.iter_mut().zip(draw.iter()).for_each(|(c, d)| *c += d);
        }
    }
    debug!("added correlated noise to {} spectra", 3 * set.hi_hi.len());
    Ok(noisy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross::PairSpectrum;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn covariance_is_tridiagonal_and_positive_definite() {
        let mut rng = StdRng::seed_from_u64(42);
        let cov = noise_covariance(6, &mut rng);
        for i in 0..6usize {
            for j in 0..6 {
                if i.abs_diff(j) > 1 {
                    assert_eq!(cov[(i, j)], 0.0);
                }
            }
            assert!((cov[(i, i)] - 1.0).abs() < 0.6);
        }
        assert_relative_eq!(cov[(0, 1)], 0.5 * (cov[(0, 0)] * cov[(1, 1)]).sqrt());
        assert_relative_eq!(cov[(1, 2)], -0.5 * (cov[(1, 1)] * cov[(2, 2)]).sqrt());
        assert_eq!(cov, cov.transpose());
        assert!(cov.cholesky().is_some());
    }

    #[test]
    fn noise_keeps_layout_and_is_seeded() {
        let spectrum = |i, j| PairSpectrum { i, j, cl: vec![1.0; 4] };
        let set = CrossSpectrumSet {
            n_shells: 1,
            lmax: 3,
            hi_hi: vec![spectrum(0, 0)],
            galaxy_galaxy: vec![spectrum(0, 0)],
            hi_galaxy: vec![spectrum(0, 0)],
        };
        let a = add_noise(&set, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = add_noise(&set, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hi_hi[0].cl.len(), 4);
        assert_eq!((a.hi_galaxy[0].i, a.hi_galaxy[0].j), (0, 0));
        assert_ne!(a.hi_hi[0].cl, set.hi_hi[0].cl);
        assert_ne!(a.hi_hi[0].cl, a.galaxy_galaxy[0].cl);
    }
}
