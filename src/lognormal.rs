//! Lognormal matter fields: Gaussian-spectrum solver and correlated sampler.
//!
//! A lognormal field with shift `λ` is `δ = λ (exp(g - σ²/2) - 1)` for a
//! zero-mean Gaussian field `g` of variance `σ²`. Two-point functions map as
//! `ξ_g = ln(1 + ξ_δ / (λ_i λ_j))`.

use std::{
    collections::VecDeque,
    f64::consts::{FRAC_1_SQRT_2, PI},
};

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use num::complex::Complex;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::{
    error::{ensure_len, BoxError, SimError},
    healpix::nside2npix,
    shells::RadialWindow,
    sht::{alm2map, Alm},
    spectra::{DiscretizedSpectra, GaussianSpectra, PowerSpectrumMatrix},
    utils::{gauss_legendre, legendre_table},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub shift: f64,
}

impl FieldDescriptor {
    pub fn lognormal(shift: f64) -> Self {
        FieldDescriptor { shift }
    }
}

pub fn lognormal_fields(shells: &[RadialWindow], shift: f64) -> Vec<FieldDescriptor> {
    shells.iter().map(|_| FieldDescriptor::lognormal(shift)).collect()
}

/// Matter overdensity of one shell, HEALPix RING order.
#[derive(Clone, Debug, PartialEq)]
pub struct MatterField {
    pub shell: usize,
    pub nside: usize,
    pub delta: Vec<f64>,
}

impl MatterField {
    pub fn mean(&self) -> f64 {
        self.delta.iter().sum::<f64>() / self.delta.len() as f64
    }

    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        self.delta.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / self.delta.len() as f64
    }
}

pub trait GaussianSpectrumSolver: Send + Sync {
    fn solve_gaussian_spectra(
        &self,
        fields: &[FieldDescriptor],
        cls: &DiscretizedSpectra,
    ) -> Result<GaussianSpectra, BoxError>;
}

pub trait FieldGenerator: Send + Sync {
    fn generate_fields(
        &self,
        fields: &[FieldDescriptor],
        gls: &GaussianSpectra,
        nside: usize,
        ncorr: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<MatterField>, BoxError>;
}

/// Transforms through the two-point function on Gauss-Legendre nodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct LognormalSolver;

impl GaussianSpectrumSolver for LognormalSolver {
    fn solve_gaussian_spectra(
        &self,
        fields: &[FieldDescriptor],
        cls: &DiscretizedSpectra,
    ) -> Result<GaussianSpectra, BoxError> {
        ensure_len("field descriptors", cls.matrix.n_shells(), fields.len())?;
        if let Some(f) = fields.iter().find(|f| !(f.shift > 0.0)) {
            return Err(SimError::InvalidParameter(format!(
                "lognormal shift must be positive, got {}",
                f.shift
            ))
            .into());
        }
        let lmax = cls.matrix.lmax();
        let nodes = 2 * (lmax + 1);
        let (x, w) = gauss_legendre(nodes);
        let p = legendre_table(lmax, &x);
        let mut matrix = PowerSpectrumMatrix::new(cls.matrix.n_shells(), lmax);

        for ((i, j), cl) in cls.matrix.iter() {
            let lam = fields[i].shift * fields[j].shift;
            let mut xi_g = Vec::with_capacity(nodes);
            for k in 0..nodes {
                let xi: f64 = (0..=lmax)
                    .map(|l| (2 * l + 1) as f64 / (4.0 * PI) * cl[l] * p[(l, k)])
                    .sum();
                let arg = 1.0 + xi / lam;
                if arg <= 0.0 {
                    return Err(SimError::InvalidParameter(format!(
                        "correlation of shells ({}, {}) is below -λ², no lognormal solution",
                        i, j
                    ))
                    .into());
                }
                xi_g.push(arg.ln());
            }
            let mut gl: Vec<f64> = (0..=lmax)
                .map(|l| {
                    2.0 * PI
                        * (0..nodes)
                            .map(|k| w[k] * xi_g[k] * p[(l, k)])
                            .sum::<f64>()
                })
                .collect();
            if i == j {
                let negative = gl.iter().filter(|&&g| g < 0.0).count();
                if negative > 0 {
                    warn!(
                        "clipped {} negative gaussian spectrum values in shell {}",
                        negative, i
                    );
                    gl.iter_mut().for_each(|g| *g = g.max(0.0));
                }
            }
            matrix.insert(i, j, gl)?;
        }
        Ok(GaussianSpectra {
            matrix,
            ncorr: cls.ncorr,
        })
    }
}

/// Draws harmonic coefficients shell by shell, each conditioned on the
/// previous `ncorr` shells, from a single random stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct LognormalGenerator;

fn standard_normal(rng: &mut dyn RngCore) -> f64 {
    StandardNormal.sample(rng)
}

impl FieldGenerator for LognormalGenerator {
    fn generate_fields(
        &self,
        fields: &[FieldDescriptor],
        gls: &GaussianSpectra,
        nside: usize,
        ncorr: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<MatterField>, BoxError> {
        let n = gls.matrix.n_shells();
        ensure_len("field descriptors", n, fields.len())?;
        let lmax = gls.matrix.lmax();
        let gl = |a: usize, b: usize, l: usize| gls.matrix.get(a, b).map_or(0.0, |c| c[l]);

        let mut history: VecDeque<Alm> = VecDeque::with_capacity(ncorr + 1);
        let mut matter = Vec::with_capacity(n);
        for i in 0..n {
            if !gls.matrix.contains(i, i) {
                return Err(SimError::shape("gaussian auto spectra", n, i).into());
            }
            let k = history.len();
            let prev: Vec<usize> = (i - k..i).collect();
            let mut alm = Alm::zeros(lmax);

            for l in 0..=lmax {
                let cii = gl(i, i, l);
                if cii <= 0.0 {
                    continue;
                }
                let (coef, var) = if k == 0 {
                    (DVector::<f64>::zeros(0), cii)
                } else {
                    let sigma = DMatrix::from_fn(k, k, |a, b| gl(prev[a], prev[b], l));
                    let cross = DVector::from_fn(k, |a, _| gl(i, prev[a], l));
                    let pinv = sigma
                        .pseudo_inverse(1E-12 * cii)
                        .map_err(|e| SimError::InvalidParameter(e.to_string()))?;
                    let coef = &pinv * &cross;
                    let var = (cii - cross.dot(&coef)).max(0.0);
                    (coef, var)
                };
                let sd = var.sqrt();
                for m in 0..=l {
                    let mean = history
                        .iter()
                        .zip(coef.iter())
                        .map(|(h, &c)| h.get(l, m) * c)
                        .sum::<Complex<f64>>();
                    let noise = if m == 0 {
                        Complex::new(standard_normal(rng), 0.0)
                    } else {
                        Complex::new(standard_normal(rng), standard_normal(rng)) * FRAC_1_SQRT_2
                    };
                    alm.set(l, m, mean + noise * sd);
                }
            }

            let variance: f64 = (0..=lmax)
                .map(|l| (2 * l + 1) as f64 / (4.0 * PI) * gl(i, i, l))
                .sum();
            let shift = fields[i].shift;
            let delta: Vec<f64> = alm2map(&alm, nside)
                .into_iter()
                .map(|g| shift * ((g - variance / 2.0).exp() - 1.0))
                .collect();
            ensure_len("matter field pixels", nside2npix(nside), delta.len())?;
            let field = MatterField {
                shell: i,
                nside,
                delta,
            };
            debug!(
                "shell {}: gaussian variance {:.4e}, lognormal variance {:.4e}",
                i,
                variance,
                field.variance()
            );
            matter.push(field);

            history.push_back(alm);
            if history.len() > ncorr {
                history.pop_front();
            }
        }
        Ok(matter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{discretize::discretized_cls, healpix::DiscPixelWindow};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn toy_spectra(n: usize, lmax: usize, ncorr: usize) -> DiscretizedSpectra {
        let mut m = PowerSpectrumMatrix::new(n, lmax);
        for i in 0..n {
            for j in 0..=i {
                let rho = if i == j { 1.0 } else { 0.5_f64.powi((i - j) as i32) };
                let cl = (0..=lmax)
                    .map(|l| if l == 0 { 0.0 } else { rho * 1E-3 / (l as f64 + 1.0) })
                    .collect();
                m.insert(i, j, cl).unwrap();
            }
        }
        discretized_cls(&m, 8, lmax, ncorr, &DiscPixelWindow).unwrap()
    }

    #[test]
    fn small_spectra_are_nearly_unchanged() {
        let cls = toy_spectra(2, 12, 1);
        let fields = vec![FieldDescriptor::lognormal(1.0); 2];
        let gls = LognormalSolver.solve_gaussian_spectra(&fields, &cls).unwrap();
        assert_eq!(gls.matrix.len(), cls.matrix.len());
        let g = gls.matrix.get(0, 0).unwrap();
        let c = cls.matrix.get(0, 0).unwrap();
        for l in 2..=12 {
            // ln(1 + ξ) ≈ ξ for |ξ| << 1
            assert_relative_eq!(g[l], c[l], max_relative = 5E-2);
        }
    }

    #[test]
    fn solver_rejects_descriptor_count_mismatch() {
        let cls = toy_spectra(3, 8, 1);
        let fields = vec![FieldDescriptor::lognormal(1.0); 2];
        assert!(LognormalSolver.solve_gaussian_spectra(&fields, &cls).is_err());
    }

    #[test]
    fn generated_fields_are_lognormal_and_reproducible() {
        let nside = 8;
        let cls = toy_spectra(3, 16, 2);
        let fields = vec![FieldDescriptor::lognormal(1.0); 3];
        let gls = LognormalSolver.solve_gaussian_spectra(&fields, &cls).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let a = LognormalGenerator
            .generate_fields(&fields, &gls, nside, 2, &mut rng)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let b = LognormalGenerator
            .generate_fields(&fields, &gls, nside, 2, &mut rng)
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        for (i, f) in a.iter().enumerate() {
            assert_eq!(f.shell, i);
            assert_eq!(f.delta.len(), nside2npix(nside));
            assert!(f.delta.iter().all(|&d| d > -1.0));
        }

        let mut rng = StdRng::seed_from_u64(8);
        let c = LognormalGenerator
            .generate_fields(&fields, &gls, nside, 2, &mut rng)
            .unwrap();
        assert_ne!(a[0].delta, c[0].delta);
    }

    #[test]
    fn missing_auto_spectrum_is_an_error() {
        let cls = toy_spectra(2, 8, 1);
        let mut matrix = PowerSpectrumMatrix::new(2, 8);
        for (k, cl) in cls.matrix.iter().filter(|&(k, _)| k != (1, 1)) {
            matrix.insert(k.0, k.1, cl.to_vec()).unwrap();
        }
        let gls = GaussianSpectra { matrix, ncorr: 1 };
        let fields = vec![FieldDescriptor::lognormal(1.0); 2];
        let err = LognormalGenerator
            .generate_fields(&fields, &gls, 4, 1, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(err.to_string().contains("gaussian auto spectra"));
    }

    #[test]
    fn later_shells_do_not_change_earlier_fields() {
        let nside = 4;
        let fields3 = vec![FieldDescriptor::lognormal(1.0); 3];
        let gls3 = LognormalSolver
            .solve_gaussian_spectra(&fields3, &toy_spectra(3, 8, 1))
            .unwrap();
        let fields2 = vec![FieldDescriptor::lognormal(1.0); 2];
        let gls2 = LognormalSolver
            .solve_gaussian_spectra(&fields2, &toy_spectra(2, 8, 1))
            .unwrap();
        let a = LognormalGenerator
            .generate_fields(&fields3, &gls3, nside, 1, &mut StdRng::seed_from_u64(3))
            .unwrap();
        let b = LognormalGenerator
            .generate_fields(&fields2, &gls2, nside, 1, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a[..2], b[..]);
    }
}
