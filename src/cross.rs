use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ensure_len, BoxError, SimError, SimResult},
    sht::{alm2cl, map2alm},
    tracers::TracerField,
};

pub trait CrossSpectrumEstimator: Send + Sync {
    fn cross_power(&self, a: &[f64], b: &[f64], lmax: usize) -> Result<Vec<f64>, BoxError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HealpixEstimator;

impl CrossSpectrumEstimator for HealpixEstimator {
    fn cross_power(&self, a: &[f64], b: &[f64], lmax: usize) -> Result<Vec<f64>, BoxError> {
        ensure_len("map pixels", a.len(), b.len())?;
        let alm_a = map2alm(a, lmax)?;
        if std::ptr::eq(a, b) {
            return Ok(alm2cl(&alm_a, &alm_a));
        }
        let alm_b = map2alm(b, lmax)?;
        Ok(alm2cl(&alm_a, &alm_b))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracerPair {
    HiHi,
    GalaxyGalaxy,
    HiGalaxy,
}

impl TracerPair {
    pub const ALL: [TracerPair; 3] = [
        TracerPair::HiHi,
        TracerPair::GalaxyGalaxy,
        TracerPair::HiGalaxy,
    ];
}

#[derive(Clone, Debug, PartialEq)]
pub struct PairSpectrum {
    pub i: usize,
    pub j: usize,
    pub cl: Vec<f64>,
}

/// Three families of spectra, each over every `(i, j)` with `j <= i`,
/// ordered by `i` then `j`.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossSpectrumSet {
    pub n_shells: usize,
    pub lmax: usize,
    pub hi_hi: Vec<PairSpectrum>,
    pub galaxy_galaxy: Vec<PairSpectrum>,
    pub hi_galaxy: Vec<PairSpectrum>,
}

pub fn pair_index(i: usize, j: usize) -> usize {
    i * (i + 1) / 2 + j
}

pub fn shell_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n).flat_map(|i| (0..=i).map(move |j| (i, j))).collect()
}

impl CrossSpectrumSet {
    pub fn family(&self, pair: TracerPair) -> &[PairSpectrum] {
        match pair {
            TracerPair::HiHi => &self.hi_hi,
            TracerPair::GalaxyGalaxy => &self.galaxy_galaxy,
            TracerPair::HiGalaxy => &self.hi_galaxy,
        }
    }

    pub fn family_mut(&mut self, pair: TracerPair) -> &mut [PairSpectrum] {
        match pair {
            TracerPair::HiHi => &mut self.hi_hi,
            TracerPair::GalaxyGalaxy => &mut self.galaxy_galaxy,
            TracerPair::HiGalaxy => &mut self.hi_galaxy,
        }
    }

    /// Spectrum of shell `i` of the first tracer with shell `j` of the second.
    ///
    /// `HiHi` and `GalaxyGalaxy` are symmetric in `(i, j)`; `HiGalaxy` is
    /// defined only for `j <= i`.
    pub fn get(&self, pair: TracerPair, i: usize, j: usize) -> Option<&[f64]> {
        let (i, j) = match pair {
            TracerPair::HiGalaxy if j > i => return None,
            TracerPair::HiGalaxy => (i, j),
            _ => (i.max(j), i.min(j)),
        };
        if i >= self.n_shells {
            return None;
        }
        self.family(pair)
            .get(pair_index(i, j))
            .map(|p| p.cl.as_slice())
    }
}

fn check_fields(what: &'static str, fields: &[TracerField], nside: usize) -> SimResult<()> {
    for f in fields {
        ensure_len(what, nside, f.nside)?;
        ensure_len(what, 12 * nside * nside, f.values.len())?;
    }
    Ok(())
}

/// Computes HI×HI, galaxy×galaxy and HI×galaxy spectra for every shell pair.
///
/// Pairs are evaluated in parallel; a raised `cancel` flag stops new pairs
/// from starting and the call returns [`SimError::Cancelled`].
pub fn cross_spectra(
    galaxy: &[TracerField],
    hi: &[TracerField],
    lmax: usize,
    estimator: &dyn CrossSpectrumEstimator,
    cancel: Option<&AtomicBool>,
) -> SimResult<CrossSpectrumSet> {
    let n = hi.len();
    ensure_len("galaxy fields", n, galaxy.len())?;
    if let Some(first) = hi.first() {
        check_fields("hi field resolution", hi, first.nside)?;
        check_fields("galaxy field resolution", galaxy, first.nside)?;
    }

    let pairs = shell_pairs(n);
    info!("computing cross spectra for {} shell pairs (lmax={})", pairs.len(), lmax);

    let estimate = |a: &[f64], b: &[f64]| -> SimResult<Vec<f64>> {
        let cl = estimator
            .cross_power(a, b, lmax)
            .map_err(|e| SimError::collaborator("cross spectrum estimator", e))?;
        ensure_len("cross spectrum length", lmax + 1, cl.len())?;
        Ok(cl)
    };

    let rows: Vec<[PairSpectrum; 3]> = pairs
        .par_iter()
        .map(|&(i, j)| {
            if cancel.map_or(false, |c| c.load(Ordering::Relaxed)) {
                return Err(SimError::Cancelled);
            }
            let hh = estimate(&hi[i].values, &hi[j].values)?;
            let gg = estimate(&galaxy[i].values, &galaxy[j].values)?;
            let hg = estimate(&hi[i].values, &galaxy[j].values)?;
            debug!("cross spectra for pair ({}, {}) done", i, j);
            Ok([
                PairSpectrum { i, j, cl: hh },
                PairSpectrum { i, j, cl: gg },
                PairSpectrum { i, j, cl: hg },
            ])
        })
        .collect::<SimResult<_>>()?;

    let mut set = CrossSpectrumSet {
        n_shells: n,
        lmax,
        hi_hi: Vec::with_capacity(rows.len()),
        galaxy_galaxy: Vec::with_capacity(rows.len()),
        hi_galaxy: Vec::with_capacity(rows.len()),
    };
    for [hh, gg, hg] in rows {
        set.hi_hi.push(hh);
        set.galaxy_galaxy.push(gg);
        set.hi_galaxy.push(hg);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracers::Tracer;
    use approx::assert_relative_eq;

    struct MeanProduct;

    impl CrossSpectrumEstimator for MeanProduct {
        fn cross_power(&self, a: &[f64], b: &[f64], lmax: usize) -> Result<Vec<f64>, BoxError> {
            let p = a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / a.len() as f64;
            Ok(vec![p; lmax + 1])
        }
    }

    struct Failing;

    impl CrossSpectrumEstimator for Failing {
        fn cross_power(&self, _: &[f64], _: &[f64], _: usize) -> Result<Vec<f64>, BoxError> {
            Err("estimator offline".into())
        }
    }

    fn fields(tracer: Tracer, n: usize, nside: usize) -> Vec<TracerField> {
        let offset = if tracer == Tracer::Hi { 1.0 } else { 2.0 };
        (0..n)
            .map(|shell| TracerField {
                tracer,
                shell,
                nside,
                values: vec![shell as f64 + offset; 12 * nside * nside],
            })
            .collect()
    }

    #[test]
    fn covers_every_lower_triangular_pair_in_order() {
        let n = 5;
        let set = cross_spectra(
            &fields(Tracer::Galaxy, n, 1),
            &fields(Tracer::Hi, n, 1),
            4,
            &MeanProduct,
            None,
        )
        .unwrap();
        let pairs = shell_pairs(n);
        assert_eq!(pairs.len(), n * (n + 1) / 2);
        for pair in TracerPair::ALL {
            let family = set.family(pair);
            assert_eq!(family.len(), pairs.len());
            for (p, &(i, j)) in family.iter().zip(&pairs) {
                assert_eq!((p.i, p.j), (i, j));
                assert_eq!(p.cl.len(), 5);
            }
        }
        // hi_i = i + 1, gal_j = j + 2
        assert_relative_eq!(set.get(TracerPair::HiGalaxy, 3, 1).unwrap()[0], 4.0 * 3.0);
        assert_relative_eq!(set.get(TracerPair::HiHi, 1, 3).unwrap()[2], 2.0 * 4.0);
        assert_eq!(set.get(TracerPair::HiGalaxy, 1, 3), None);
        assert_eq!(set.get(TracerPair::GalaxyGalaxy, 5, 0), None);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let err = cross_spectra(
            &fields(Tracer::Galaxy, 2, 1),
            &fields(Tracer::Hi, 3, 1),
            2,
            &MeanProduct,
            None,
        );
        assert!(matches!(err, Err(SimError::ShapeMismatch { .. })));

        let err = cross_spectra(
            &fields(Tracer::Galaxy, 2, 2),
            &fields(Tracer::Hi, 2, 1),
            2,
            &MeanProduct,
            None,
        );
        assert!(matches!(err, Err(SimError::ShapeMismatch { .. })));
    }

    #[test]
    fn cancellation_and_estimator_failures_surface() {
        let flag = AtomicBool::new(true);
        let err = cross_spectra(
            &fields(Tracer::Galaxy, 3, 1),
            &fields(Tracer::Hi, 3, 1),
            2,
            &MeanProduct,
            Some(&flag),
        );
        assert!(matches!(err, Err(SimError::Cancelled)));

        let err = cross_spectra(
            &fields(Tracer::Galaxy, 2, 1),
            &fields(Tracer::Hi, 2, 1),
            2,
            &Failing,
            None,
        );
        assert!(matches!(err, Err(SimError::Collaborator { .. })));
    }

    #[test]
    fn healpix_estimator_returns_lmax_plus_one() {
        let nside = 4;
        let map: Vec<f64> = (0..12 * nside * nside).map(|p| (p % 7) as f64 - 3.0).collect();
        let cl = HealpixEstimator.cross_power(&map, &map, 6).unwrap();
        assert_eq!(cl.len(), 7);
        assert!(cl.iter().all(|&c| c >= 0.0));
        assert!(HealpixEstimator.cross_power(&map, &map[1..], 6).is_err());
    }
}
