use crate::{
    error::{ensure_len, SimError, SimResult},
    shells::RadialWindow,
    utils::{interp, trapz},
};

/// Expected galaxy count in each shell, `∫ dN/dz(z) w_i(z) dz`.
///
/// Each window is scaled to unit peak, so a tiling of top-hat windows
/// partitions the total count. `dndz` is linearly interpolated onto the
/// window samples and taken as zero outside `z`.
pub fn partition(z: &[f64], dndz: &[f64], shells: &[RadialWindow]) -> SimResult<Vec<f64>> {
    ensure_len("galaxy distribution samples", z.len(), dndz.len())?;
    if z.len() < 2 || z.windows(2).any(|p| p[1] <= p[0]) {
        return Err(SimError::InvalidRange(
            "galaxy distribution redshifts must be strictly increasing".to_string(),
        ));
    }
    Ok(shells
        .iter()
        .map(|shell| {
            let peak = shell.wa().iter().cloned().fold(0.0, f64::max);
            if peak <= 0.0 {
                return 0.0;
            }
            let integrand: Vec<f64> = shell
                .za()
                .iter()
                .zip(shell.wa())
                .map(|(&zi, &w)| interp(zi, z, dndz) * w / peak)
                .collect();
            trapz(&integrand, shell.za())
        })
        .collect())
}
