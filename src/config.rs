use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_CORRELATION_DEPTH, DEFAULT_LOGNORMAL_SHIFT, DEFAULT_SAMPLING_DZ, DEFAULT_SEED,
    },
    cosmology::Cosmology,
    error::{SimError, SimResult},
    healpix::{is_valid_nside, MAX_NSIDE},
    shells::{grid_boundaries, ShellGrid, WindowShape, WindowWeight},
    tracers::OverdensityClamp,
};

fn default_sampling_dz() -> f64 {
    DEFAULT_SAMPLING_DZ
}

fn default_correlation_depth() -> usize {
    DEFAULT_CORRELATION_DEPTH
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_shift() -> f64 {
    DEFAULT_LOGNORMAL_SHIFT
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    pub grid: ShellGrid,
    #[serde(default)]
    pub window: WindowShape,
    #[serde(default)]
    pub weight: WindowWeight,
    #[serde(default = "default_sampling_dz")]
    pub sampling_dz: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub cosmology: Cosmology,
    pub nside: usize,
    pub lmax: usize,
    pub shells: ShellConfig,
    #[serde(default = "default_correlation_depth")]
    pub correlation_depth: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_shift")]
    pub lognormal_shift: f64,
    #[serde(default)]
    pub clamp: OverdensityClamp,
}

impl SimulationConfig {
    /// Redshift-grid configuration with top-hat windows and default sampling.
    pub fn redshift_bins(
        cosmology: Cosmology,
        nside: usize,
        lmax: usize,
        zmin: f64,
        zmax: f64,
        dz: f64,
    ) -> Self {
        SimulationConfig {
            cosmology,
            nside,
            lmax,
            shells: ShellConfig {
                grid: ShellGrid::Redshift { zmin, zmax, dz },
                window: WindowShape::default(),
                weight: WindowWeight::default(),
                sampling_dz: DEFAULT_SAMPLING_DZ,
            },
            correlation_depth: DEFAULT_CORRELATION_DEPTH,
            seed: DEFAULT_SEED,
            lognormal_shift: DEFAULT_LOGNORMAL_SHIFT,
            clamp: OverdensityClamp::default(),
        }
    }

    pub fn from_yaml_reader<R: Read>(reader: R) -> SimResult<Self> {
        let cfg: SimulationConfig = serde_yaml::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let file = File::open(path)?;
        Self::from_yaml_reader(file)
    }

    pub fn to_yaml_writer<W: Write>(&self, writer: W) -> SimResult<()> {
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> SimResult<()> {
        self.cosmology.validate()?;
        if !is_valid_nside(self.nside) {
            return Err(SimError::InvalidParameter(format!(
                "nside must be a power of two no larger than {}, got {}",
                MAX_NSIDE, self.nside
            )));
        }
        if self.lmax < 1 || self.lmax > 3 * self.nside - 1 {
            return Err(SimError::InvalidParameter(format!(
                "lmax must lie in [1, {}], got {}",
                3 * self.nside - 1,
                self.lmax
            )));
        }
        if !(self.lognormal_shift.is_finite() && self.lognormal_shift > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "lognormal shift must be positive, got {}",
                self.lognormal_shift
            )));
        }
        if !(self.shells.sampling_dz.is_finite() && self.shells.sampling_dz > 0.0) {
            return Err(SimError::InvalidRange(format!(
                "sampling dz must be positive, got {}",
                self.shells.sampling_dz
            )));
        }
        grid_boundaries(&self.shells.grid, &self.cosmology)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
cosmology: { h: 0.7, omega_b: 0.05, omega_c: 0.25 }
nside: 128
lmax: 128
shells:
  grid: { redshift: { zmin: 0.0, zmax: 1.2, dz: 0.4 } }
  window: tophat
  weight: comoving_volume
";

    #[test]
    fn parses_with_defaults() {
        let cfg = SimulationConfig::from_yaml_reader(YAML.as_bytes()).unwrap();
        assert_eq!(cfg.nside, 128);
        assert_eq!(cfg.correlation_depth, 3);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.lognormal_shift, 1.0);
        assert_eq!(cfg.clamp, OverdensityClamp::None);
        assert_eq!(cfg.shells.weight, WindowWeight::ComovingVolume);
        assert_eq!(cfg.shells.sampling_dz, 1E-3);
        assert_eq!(cfg.cosmology.sigma8, 0.8);
    }

    #[test]
    fn round_trips_through_yaml() {
        let mut cfg = SimulationConfig::redshift_bins(
            Cosmology::new(0.7, 0.05, 0.25).unwrap(),
            16,
            32,
            0.0,
            1.0,
            0.5,
        );
        cfg.shells.grid = ShellGrid::Boundaries(vec![0.1, 0.4, 0.9]);
        cfg.clamp = OverdensityClamp::Physical;
        let mut buf = Vec::new();
        cfg.to_yaml_writer(&mut buf).unwrap();
        let back = SimulationConfig::from_yaml_reader(buf.as_slice()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn rejects_invalid_settings() {
        let base = SimulationConfig::redshift_bins(
            Cosmology::new(0.7, 0.05, 0.25).unwrap(),
            16,
            32,
            0.0,
            1.2,
            0.4,
        );
        assert!(base.validate().is_ok());

        let mut cfg = base.clone();
        cfg.nside = 12;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidParameter(_))));

        let mut cfg = base.clone();
        cfg.nside = 1 << 63;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidParameter(_))));

        let mut cfg = base.clone();
        cfg.nside = MAX_NSIDE << 1;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidParameter(_))));

        let mut cfg = base.clone();
        cfg.lmax = 48;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidParameter(_))));

        let mut cfg = base.clone();
        cfg.cosmology.h = -1.0;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidParameter(_))));

        let mut cfg = base.clone();
        cfg.shells.grid = ShellGrid::Redshift { zmin: 1.0, zmax: 0.5, dz: 0.1 };
        assert!(matches!(cfg.validate(), Err(SimError::InvalidRange(_))));

        let mut cfg = base;
        cfg.shells.grid = ShellGrid::Boundaries(vec![0.3]);
        assert!(matches!(cfg.validate(), Err(SimError::InvalidRange(_))));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = SimulationConfig::from_yaml_reader("nside: [1, 2".as_bytes());
        assert!(matches!(err, Err(SimError::Config(_))));
    }
}
