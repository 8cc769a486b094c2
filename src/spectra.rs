use std::collections::BTreeMap;

use crate::{
    cosmology::Cosmology,
    error::{BoxError, SimError, SimResult},
    shells::RadialWindow,
};

/// Spectra keyed by unordered shell pair, each of length `lmax + 1`.
///
/// Pairs are stored as `(i, j)` with `j <= i`; lookups accept either order.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerSpectrumMatrix {
    n_shells: usize,
    lmax: usize,
    entries: BTreeMap<(usize, usize), Vec<f64>>,
}

fn key(i: usize, j: usize) -> (usize, usize) {
    (i.max(j), i.min(j))
}

impl PowerSpectrumMatrix {
    pub fn new(n_shells: usize, lmax: usize) -> Self {
        PowerSpectrumMatrix {
            n_shells,
            lmax,
            entries: BTreeMap::new(),
        }
    }

    pub fn n_shells(&self) -> usize {
        self.n_shells
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, i: usize, j: usize, cl: Vec<f64>) -> SimResult<()> {
        if i >= self.n_shells || j >= self.n_shells {
            return Err(SimError::shape("shell index", self.n_shells, i.max(j) + 1));
        }
        if cl.len() != self.lmax + 1 {
            return Err(SimError::shape("spectrum length", self.lmax + 1, cl.len()));
        }
        self.entries.insert(key(i, j), cl);
        Ok(())
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&[f64]> {
        self.entries.get(&key(i, j)).map(|v| v.as_slice())
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.entries.contains_key(&key(i, j))
    }

    /// Entries in increasing `i`, then increasing `j <= i`.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &[f64])> {
        self.entries.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    /// Largest `|i - j|` present, `None` when empty.
    pub fn max_separation(&self) -> Option<usize> {
        self.entries.keys().map(|&(i, j)| i - j).max()
    }
}

/// Spectra after pixel-window, multipole and correlation-depth truncation.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscretizedSpectra {
    pub matrix: PowerSpectrumMatrix,
    pub nside: usize,
    pub ncorr: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GaussianSpectra {
    pub matrix: PowerSpectrumMatrix,
    pub ncorr: usize,
}

pub trait SpectrumProvider: Send + Sync {
    fn compute_power_spectra(
        &self,
        cosmo: &Cosmology,
        lmax: usize,
        shells: &[RadialWindow],
    ) -> Result<PowerSpectrumMatrix, BoxError>;
}
