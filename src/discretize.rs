use log::info;

use crate::{
    error::{SimError, SimResult},
    healpix::PixelWindow,
    spectra::{DiscretizedSpectra, PowerSpectrumMatrix},
};

/// Applies the squared pixel window, truncates to `lmax` and drops every shell
/// pair further apart than `ncorr`.
///
/// Dropped pairs are absent from the result, not zero-filled.
pub fn discretized_cls(
    raw: &PowerSpectrumMatrix,
    nside: usize,
    lmax: usize,
    ncorr: usize,
    pixel_window: &dyn PixelWindow,
) -> SimResult<DiscretizedSpectra> {
    if raw.lmax() < lmax {
        return Err(SimError::shape("raw spectrum length", lmax + 1, raw.lmax() + 1));
    }
    let pw2: Vec<f64> = (0..=lmax)
        .map(|l| pixel_window.pixel_window(nside, l).powi(2))
        .collect();
    let mut matrix = PowerSpectrumMatrix::new(raw.n_shells(), lmax);
    for ((i, j), cl) in raw.iter().filter(|((i, j), _)| i - j <= ncorr) {
        let cl = cl[..=lmax]
            .iter()
            .zip(pw2.iter())
            .map(|(&c, &w)| c * w)
            .collect();
        matrix.insert(i, j, cl)?;
    }
    info!(
        "discretized {} of {} spectra (nside={}, lmax={}, ncorr={})",
        matrix.len(),
        raw.len(),
        nside,
        lmax,
        ncorr
    );
    Ok(DiscretizedSpectra {
        matrix,
        nside,
        ncorr,
    })
}
