//! Angular matter spectra in the Limber approximation.
//!
//! `C_l^{ij} = ∫ dz n_i(z) n_j(z) H(z)/c / χ(z)² P((l + 1/2)/χ(z), z)`
//! with each window kernel normalised to unit integral.

use log::debug;

use crate::{
    cosmology::Cosmology,
    error::BoxError,
    shells::RadialWindow,
    spectra::{PowerSpectrumMatrix, SpectrumProvider},
    utils::trapz,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct LimberSpectra;

struct Kernel<'a> {
    shell: &'a RadialWindow,
    norm: f64,
    chi: Vec<f64>,
    e: Vec<f64>,
}

impl<'a> Kernel<'a> {
    fn new(cosmo: &Cosmology, shell: &'a RadialWindow) -> Self {
        Kernel {
            shell,
            norm: shell.integral(),
            chi: shell.za().iter().map(|&z| cosmo.comoving_distance(z)).collect(),
            e: shell.za().iter().map(|&z| cosmo.e(z)).collect(),
        }
    }
}

impl SpectrumProvider for LimberSpectra {
    fn compute_power_spectra(
        &self,
        cosmo: &Cosmology,
        lmax: usize,
        shells: &[RadialWindow],
    ) -> Result<PowerSpectrumMatrix, BoxError> {
        cosmo.validate()?;
        let power = cosmo.linear_power();
        let dh = cosmo.hubble_distance();
        let kernels: Vec<Kernel> = shells.iter().map(|s| Kernel::new(cosmo, s)).collect();
        let mut matrix = PowerSpectrumMatrix::new(shells.len(), lmax);

        for (i, ki) in kernels.iter().enumerate() {
            for (j, kj) in kernels[..=i].iter().enumerate() {
                let overlap =
                    ki.shell.lower() < kj.shell.upper() && kj.shell.lower() < ki.shell.upper();
                let mut cl = vec![0.0; lmax + 1];
                if overlap {
                    let za = ki.shell.za();
                    // n_i n_j H/c / χ², independent of l
                    let geometry: Vec<f64> = za
                        .iter()
                        .enumerate()
                        .map(|(k, &z)| {
                            let chi = ki.chi[k];
                            if chi < 1E-6 {
                                return 0.0;
                            }
                            let ni = ki.shell.wa()[k] / ki.norm;
                            let nj = kj.shell.weight_at(z) / kj.norm;
                            ni * nj * ki.e[k] / (dh * chi * chi)
                        })
                        .collect();
                    for (l, c) in cl.iter_mut().enumerate().skip(1) {
                        let integrand: Vec<f64> = za
                            .iter()
                            .enumerate()
                            .map(|(k, &z)| {
                                if geometry[k] == 0.0 {
                                    0.0
                                } else {
                                    geometry[k] * power.at((l as f64 + 0.5) / ki.chi[k], z)
                                }
                            })
                            .collect();
                        *c = trapz(&integrand, za);
                    }
                }
                debug!("limber spectrum ({}, {}) computed, overlap={}", i, j, overlap);
                matrix.insert(i, j, cl)?;
            }
        }
        Ok(matrix)
    }
}
