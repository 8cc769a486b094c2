use serde::{Deserialize, Serialize};

use crate::{
    cosmology::Cosmology,
    error::{SimError, SimResult},
    utils::{interp, linspace, trapz},
};

/// One redshift bin: kernel samples `wa` at redshifts `za`.
#[derive(Clone, Debug, PartialEq)]
pub struct RadialWindow {
    za: Vec<f64>,
    wa: Vec<f64>,
    zeff: f64,
}

impl RadialWindow {
    /// Builds a window and computes `zeff` as the kernel-weighted mean redshift.
    pub fn new(za: Vec<f64>, wa: Vec<f64>) -> SimResult<Self> {
        if za.len() < 2 || za.len() != wa.len() {
            return Err(SimError::shape("window samples", za.len().max(2), wa.len()));
        }
        if za.windows(2).any(|p| p[1] <= p[0]) {
            return Err(SimError::InvalidRange(
                "window redshifts must be strictly increasing".to_string(),
            ));
        }
        let norm = trapz(&wa, &za);
        if !(norm.is_finite() && norm > 0.0) {
            return Err(SimError::InvalidRange(
                "window kernel must have positive integral".to_string(),
            ));
        }
        let zw: Vec<f64> = za.iter().zip(wa.iter()).map(|(&z, &w)| z * w).collect();
        let zeff = trapz(&zw, &za) / norm;
        Ok(RadialWindow { za, wa, zeff })
    }

    pub fn za(&self) -> &[f64] {
        &self.za
    }

    pub fn wa(&self) -> &[f64] {
        &self.wa
    }

    pub fn zeff(&self) -> f64 {
        self.zeff
    }

    pub fn lower(&self) -> f64 {
        self.za[0]
    }

    pub fn upper(&self) -> f64 {
        self.za[self.za.len() - 1]
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower() + self.upper())
    }

    /// Kernel value at `z`, zero outside the window.
    pub fn weight_at(&self, z: f64) -> f64 {
        interp(z, &self.za, &self.wa)
    }

    pub fn integral(&self) -> f64 {
        trapz(&self.wa, &self.za)
    }
}

/// How boundaries of the shells are laid out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellGrid {
    /// Equal steps in redshift.
    Redshift { zmin: f64, zmax: f64, dz: f64 },
    /// Equal steps of `dx` Mpc in comoving distance.
    ComovingDistance { zmin: f64, zmax: f64, dx: f64 },
    Boundaries(Vec<f64>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowShape {
    /// Flat, non-overlapping windows between consecutive boundaries.
    #[default]
    Tophat,
    /// Triangular windows over consecutive triples, overlapping their neighbours.
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowWeight {
    #[default]
    Uniform,
    ComovingVolume,
}

fn check_range(zmin: f64, zmax: f64, step: f64) -> SimResult<()> {
    if !(zmin.is_finite() && zmax.is_finite()) || zmax <= zmin {
        return Err(SimError::InvalidRange(format!(
            "zmax ({}) must exceed zmin ({})",
            zmax, zmin
        )));
    }
    if zmin < 0.0 {
        return Err(SimError::InvalidRange(format!(
            "zmin must be non-negative, got {}",
            zmin
        )));
    }
    if !(step.is_finite() && step > 0.0) {
        return Err(SimError::InvalidRange(format!(
            "step must be positive, got {}",
            step
        )));
    }
    Ok(())
}

fn check_boundaries(bounds: &[f64], min_len: usize) -> SimResult<()> {
    if bounds.len() < min_len {
        return Err(SimError::InvalidRange(format!(
            "need at least {} boundaries, got {}",
            min_len,
            bounds.len()
        )));
    }
    if bounds.iter().any(|z| !z.is_finite() || *z < 0.0) || bounds.windows(2).any(|p| p[1] <= p[0])
    {
        return Err(SimError::InvalidRange(
            "boundaries must be finite, non-negative and strictly increasing".to_string(),
        ));
    }
    Ok(())
}

pub fn redshift_grid(zmin: f64, zmax: f64, dz: f64) -> SimResult<Vec<f64>> {
    check_range(zmin, zmax, dz)?;
    // 1.2 / 0.4 is 2.9999999999999996 in binary
    let n = (((zmax - zmin) / dz) - 1E-9).ceil().max(1.0) as usize;
    Ok(linspace(zmin, zmax, n + 1))
}

/// Boundaries every `dx` Mpc of comoving distance, ending exactly at `zmax`.
pub fn distance_grid(cosmo: &Cosmology, zmin: f64, zmax: f64, dx: f64) -> SimResult<Vec<f64>> {
    check_range(zmin, zmax, dx)?;
    let xmin = cosmo.comoving_distance(zmin);
    let xmax = cosmo.comoving_distance(zmax);
    let mut grid = vec![zmin];
    let mut x = xmin + dx;
    while x < xmax - 1E-9 {
        grid.push(cosmo.redshift_at_distance(x));
        x += dx;
    }
    grid.push(zmax);
    Ok(grid)
}

fn sample(lower: f64, upper: f64, dz: f64) -> Vec<f64> {
    let n = ((upper - lower) / dz).ceil().max(1.0) as usize;
    linspace(lower, upper, n + 1)
}

fn apply_weight(za: &[f64], wa: &mut [f64], weight: Option<&dyn Fn(f64) -> f64>) {
    if let Some(f) = weight {
        wa.iter_mut().zip(za.iter()).for_each(|(w, &z)| *w *= f(z));
    }
}

pub fn tophat_windows(
    bounds: &[f64],
    dz: f64,
    weight: Option<&dyn Fn(f64) -> f64>,
) -> SimResult<Vec<RadialWindow>> {
    check_boundaries(bounds, 2)?;
    if !(dz.is_finite() && dz > 0.0) {
        return Err(SimError::InvalidRange(format!("sampling dz must be positive, got {}", dz)));
    }
    bounds
        .windows(2)
        .map(|b| {
            let za = sample(b[0], b[1], dz);
            let mut wa = vec![1.0; za.len()];
            apply_weight(&za, &mut wa, weight);
            RadialWindow::new(za, wa)
        })
        .collect()
}

pub fn linear_windows(
    grid: &[f64],
    dz: f64,
    weight: Option<&dyn Fn(f64) -> f64>,
) -> SimResult<Vec<RadialWindow>> {
    check_boundaries(grid, 3)?;
    if !(dz.is_finite() && dz > 0.0) {
        return Err(SimError::InvalidRange(format!("sampling dz must be positive, got {}", dz)));
    }
    grid.windows(3)
        .map(|g| {
            let (zlo, zmid, zhi) = (g[0], g[1], g[2]);
            let mut za = sample(zlo, zmid, dz);
            za.pop();
            za.extend(sample(zmid, zhi, dz));
            let mut wa: Vec<f64> = za
                .iter()
                .map(|&z| interp(z, &[zlo, zmid, zhi], &[0.0, 1.0, 0.0]))
                .collect();
            apply_weight(&za, &mut wa, weight);
            RadialWindow::new(za, wa)
        })
        .collect()
}

/// Boundary (or node) values for a grid policy.
pub fn grid_boundaries(grid: &ShellGrid, cosmo: &Cosmology) -> SimResult<Vec<f64>> {
    match grid {
        ShellGrid::Redshift { zmin, zmax, dz } => redshift_grid(*zmin, *zmax, *dz),
        ShellGrid::ComovingDistance { zmin, zmax, dx } => distance_grid(cosmo, *zmin, *zmax, *dx),
        ShellGrid::Boundaries(b) => {
            check_boundaries(b, 2)?;
            Ok(b.clone())
        }
    }
}

pub fn build_shells(
    grid: &ShellGrid,
    shape: WindowShape,
    weight: WindowWeight,
    sampling_dz: f64,
    cosmo: &Cosmology,
) -> SimResult<Vec<RadialWindow>> {
    let bounds = grid_boundaries(grid, cosmo)?;
    let volume = |z: f64| cosmo.comoving_volume_weight(z);
    let weight_fn: Option<&dyn Fn(f64) -> f64> = match weight {
        WindowWeight::Uniform => None,
        WindowWeight::ComovingVolume => Some(&volume),
    };
    match shape {
        WindowShape::Tophat => tophat_windows(&bounds, sampling_dz, weight_fn),
        WindowShape::Linear => linear_windows(&bounds, sampling_dz, weight_fn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn cosmo() -> Cosmology {
        Cosmology::new(0.7, 0.05, 0.25).unwrap()
    }

    #[test]
    fn redshift_grid_handles_inexact_division() {
        let g = redshift_grid(0.0, 1.2, 0.4).unwrap();
        assert_eq!(g.len(), 4);
        assert_eq!(g[0], 0.0);
        assert_eq!(g[3], 1.2);
        let g = redshift_grid(0.0, 1.0, 0.3).unwrap();
        assert_eq!(g.len(), 5);
        assert_eq!(*g.last().unwrap(), 1.0);
    }

    #[test]
    fn tophat_shells_tile_the_range() {
        let bounds = redshift_grid(0.1, 1.1, 0.25).unwrap();
        let shells = tophat_windows(&bounds, 1E-3, None).unwrap();
        assert_eq!(shells.len(), 4);
        assert_eq!(shells[0].lower(), 0.1);
        assert_eq!(shells[3].upper(), 1.1);
        for pair in shells.windows(2) {
            assert_eq!(pair[0].upper(), pair[1].lower());
            assert!(pair[1].lower() > pair[0].lower());
        }
        let width: f64 = shells.iter().map(|s| s.upper() - s.lower()).sum();
        assert_abs_diff_eq!(width, 1.0, epsilon = 1E-12);
    }

    #[test]
    fn uniform_tophat_zeff_is_midpoint() {
        let shells = tophat_windows(&[0.0, 0.4, 0.8], 1E-3, None).unwrap();
        for s in &shells {
            assert_abs_diff_eq!(s.zeff(), s.midpoint(), epsilon = 1E-12);
        }
    }

    #[test]
    fn weighted_kernel_moves_zeff_off_midpoint() {
        let c = cosmo();
        let shells = build_shells(
            &ShellGrid::Redshift { zmin: 0.0, zmax: 1.2, dz: 0.4 },
            WindowShape::Tophat,
            WindowWeight::ComovingVolume,
            1E-3,
            &c,
        )
        .unwrap();
        // volume grows with z over this range, pulling zeff upward
        for s in &shells {
            assert!(s.zeff() > s.midpoint() + 1E-3, "zeff {} mid {}", s.zeff(), s.midpoint());
            assert!(s.zeff() < s.upper());
        }
    }

    #[test]
    fn linear_windows_overlap_and_peak_inside() {
        let shells = linear_windows(&[0.0, 0.2, 0.5, 0.9], 1E-3, None).unwrap();
        assert_eq!(shells.len(), 2);
        assert_eq!(shells[0].upper(), 0.5);
        assert_eq!(shells[1].lower(), 0.2);
        assert_abs_diff_eq!(shells[0].weight_at(0.2), 1.0, epsilon = 1E-12);
        // asymmetric triangle: mean sits off both midpoint and peak
        assert_relative_eq!(shells[0].zeff(), (0.0 + 0.2 + 0.5) / 3.0, max_relative = 1E-4);
        assert!((shells[0].zeff() - shells[0].midpoint()).abs() > 1E-2);
    }

    #[test]
    fn distance_grid_ends_on_zmax() {
        let c = cosmo();
        let g = distance_grid(&c, 0.0, 1.0, 200.0).unwrap();
        assert_eq!(g[0], 0.0);
        assert_eq!(*g.last().unwrap(), 1.0);
        assert!(g.windows(2).all(|p| p[1] > p[0]));
        assert_relative_eq!(c.comoving_distance(g[1]), 200.0, max_relative = 1E-9);
        // 3303.8 Mpc / 200 Mpc -> 16 full steps plus a remainder
        assert_eq!(g.len(), 18);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(redshift_grid(1.0, 1.0, 0.1), Err(SimError::InvalidRange(_))));
        assert!(matches!(redshift_grid(0.0, 1.0, 0.0), Err(SimError::InvalidRange(_))));
        assert!(matches!(redshift_grid(0.0, 1.0, -0.1), Err(SimError::InvalidRange(_))));
        assert!(matches!(
            distance_grid(&cosmo(), 1.0, 0.5, 100.0),
            Err(SimError::InvalidRange(_))
        ));
        assert!(matches!(
            tophat_windows(&[0.0, 0.5, 0.4], 1E-3, None),
            Err(SimError::InvalidRange(_))
        ));
        assert!(matches!(
            linear_windows(&[0.0, 0.5], 1E-3, None),
            Err(SimError::InvalidRange(_))
        ));
    }
}
