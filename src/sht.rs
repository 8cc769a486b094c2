//! Spherical-harmonic transforms on HEALPix RING maps.
//!
//! Synthesis and analysis go ring by ring: an orthonormal associated Legendre
//! recursion in `l` for every `m`, and one FFT per ring for the azimuth.
//! Analysis is plain pixel quadrature without iterative refinement.

use std::f64::consts::PI;

use ndarray::Array2;
use num::{complex::Complex, Zero};

use crate::{
    error::{SimError, SimResult},
    fft::RingFft,
    healpix::{nside2npix, npix2nside, pix_area, rings},
};

/// Harmonic coefficients `a_lm` of a real field, `0 <= m <= l <= lmax`.
#[derive(Clone, Debug, PartialEq)]
pub struct Alm {
    lmax: usize,
    // indexed [[m, l]]
    coeffs: Array2<Complex<f64>>,
}

impl Alm {
    pub fn zeros(lmax: usize) -> Self {
        Alm {
            lmax,
            coeffs: Array2::zeros((lmax + 1, lmax + 1)),
        }
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn get(&self, l: usize, m: usize) -> Complex<f64> {
        assert!(m <= l && l <= self.lmax);
        self.coeffs[(m, l)]
    }

    pub fn set(&mut self, l: usize, m: usize, value: Complex<f64>) {
        assert!(m <= l && l <= self.lmax);
        self.coeffs[(m, l)] = value;
    }
}

/// Precomputed recursion coefficients for the orthonormal `lambda_lm(cos theta)`.
struct LegendrePlan {
    lmax: usize,
    a: Array2<f64>,
    b: Array2<f64>,
}

impl LegendrePlan {
    fn new(lmax: usize) -> Self {
        let mut a = Array2::zeros((lmax + 1, lmax + 1));
        let mut b = Array2::zeros((lmax + 1, lmax + 1));
        for m in 0..=lmax {
            let mf = m as f64;
            for l in m + 1..=lmax {
                let lf = l as f64;
                a[(m, l)] = ((4.0 * lf * lf - 1.0) / (lf * lf - mf * mf)).sqrt();
                b[(m, l)] =
                    (((lf - 1.0).powi(2) - mf * mf) / (4.0 * (lf - 1.0).powi(2) - 1.0)).sqrt();
            }
        }
        LegendrePlan { lmax, a, b }
    }

    fn fill(&self, z: f64, out: &mut Array2<f64>) {
        let s = (1.0 - z * z).max(0.0).sqrt();
        let mut pmm = (1.0 / (4.0 * PI)).sqrt();
        for m in 0..=self.lmax {
            if m > 0 {
                pmm *= -((2 * m + 1) as f64 / (2 * m) as f64).sqrt() * s;
            }
            out[(m, m)] = pmm;
            let mut p2 = 0.0;
            let mut p1 = pmm;
            for l in m + 1..=self.lmax {
                let p = self.a[(m, l)] * (z * p1 - self.b[(m, l)] * p2);
                out[(m, l)] = p;
                p2 = p1;
                p1 = p;
            }
        }
    }
}

pub fn map2alm(map: &[f64], lmax: usize) -> SimResult<Alm> {
    let nside = npix2nside(map.len());
    if nside == 0 || nside2npix(nside) != map.len() {
        return Err(SimError::shape("healpix map", nside2npix(nside.max(1)), map.len()));
    }
    let plan = LegendrePlan::new(lmax);
    let mut lambda = Array2::<f64>::zeros((lmax + 1, lmax + 1));
    let mut alm = Alm::zeros(lmax);
    let mut ring_fft = RingFft::<f64>::new();
    let omega = pix_area(nside);

    for ring in rings(nside) {
        let mut input: Vec<Complex<f64>> = map[ring.first_pix..ring.first_pix + ring.nphi]
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .collect();
        let mut spectrum = vec![Complex::zero(); ring.nphi];
        ring_fft.fft(&mut input, &mut spectrum);
        plan.fill(ring.z, &mut lambda);
        for m in 0..=lmax {
            let fm = spectrum[m % ring.nphi] * Complex::from_polar(omega, -(m as f64) * ring.phi0);
            for l in m..=lmax {
                alm.coeffs[(m, l)] += fm * lambda[(m, l)];
            }
        }
    }
    Ok(alm)
}

pub fn alm2map(alm: &Alm, nside: usize) -> Vec<f64> {
    let lmax = alm.lmax;
    let plan = LegendrePlan::new(lmax);
    let mut lambda = Array2::<f64>::zeros((lmax + 1, lmax + 1));
    let mut map = vec![0.0; nside2npix(nside)];
    let mut ring_fft = RingFft::<f64>::new();

    for ring in rings(nside) {
        plan.fill(ring.z, &mut lambda);
        let nphi = ring.nphi;
        let mut coeffs = vec![Complex::<f64>::zero(); nphi];
        for m in 0..=lmax {
            let bm = (m..=lmax)
                .map(|l| alm.coeffs[(m, l)] * lambda[(m, l)])
                .sum::<Complex<f64>>()
                * Complex::from_polar(1.0, m as f64 * ring.phi0);
            let k = m % nphi;
            if m == 0 {
                coeffs[k] += bm.re;
            } else {
                coeffs[k] += bm;
                coeffs[(nphi - k) % nphi] += bm.conj();
            }
        }
        let mut values = vec![Complex::zero(); nphi];
        ring_fft.ifft(&mut coeffs, &mut values);
        map[ring.first_pix..ring.first_pix + nphi]
            .iter_mut()
            .zip(values.iter())
            .for_each(|(p, v)| *p = v.re);
    }
    map
}

/// Cross power `C_l` of two coefficient sets, `l = 0..=min(lmax_a, lmax_b)`.
pub fn alm2cl(a: &Alm, b: &Alm) -> Vec<f64> {
    let lmax = a.lmax.min(b.lmax);
    (0..=lmax)
        .map(|l| {
            let mut s = (a.coeffs[(0, l)] * b.coeffs[(0, l)].conj()).re;
            for m in 1..=l {
                s += 2.0 * (a.coeffs[(m, l)] * b.coeffs[(m, l)].conj()).re;
            }
            s / (2 * l + 1) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn monopole_map_has_only_a00() {
        let nside = 8;
        let map = vec![1.0; nside2npix(nside)];
        let alm = map2alm(&map, 6).unwrap();
        assert_abs_diff_eq!(alm.get(0, 0).re, (4.0 * PI).sqrt(), epsilon = 1E-10);
        // pixel quadrature leaks a little power into even l
        for l in 1..=6 {
            for m in 0..=l {
                assert!(alm.get(l, m).norm() < 5E-2, "l={} m={}", l, m);
            }
            if l % 2 == 1 {
                assert!(alm.get(l, 0).norm() < 1E-10);
            }
        }
    }

    #[test]
    fn dipole_synthesis_follows_cos_theta() {
        let nside = 4;
        let mut alm = Alm::zeros(2);
        alm.set(1, 0, Complex::new(1.0, 0.0));
        let map = alm2map(&alm, nside);
        let norm = (3.0 / (4.0 * PI)).sqrt();
        for ring in rings(nside) {
            for ipix in ring.first_pix..ring.first_pix + ring.nphi {
                assert_abs_diff_eq!(map[ipix], norm * ring.z, epsilon = 1E-12);
            }
        }
    }

    #[test]
    fn synthesis_then_analysis_recovers_low_modes() {
        let nside = 16;
        let mut alm = Alm::zeros(8);
        alm.set(2, 0, Complex::new(1.0, 0.0));
        alm.set(3, 1, Complex::new(0.5, 0.2));
        alm.set(5, 4, Complex::new(-0.3, 0.7));
        let map = alm2map(&alm, nside);
        let back = map2alm(&map, 8).unwrap();
        for l in 0..=8 {
            for m in 0..=l {
                let d = back.get(l, m) - alm.get(l, m);
                assert!(d.norm() < 2E-2, "l={} m={} err={}", l, m, d.norm());
            }
        }
    }

    #[test]
    fn auto_spectrum_of_single_mode() {
        let mut alm = Alm::zeros(4);
        alm.set(2, 1, Complex::new(3.0, 4.0));
        let cl = alm2cl(&alm, &alm);
        assert_eq!(cl.len(), 5);
        assert_abs_diff_eq!(cl[2], 2.0 * 25.0 / 5.0, epsilon = 1E-12);
        assert_eq!(cl[3], 0.0);
    }

    #[test]
    fn wrong_map_length_is_rejected() {
        assert!(matches!(
            map2alm(&[0.0; 13], 4),
            Err(SimError::ShapeMismatch { .. })
        ));
    }
}
