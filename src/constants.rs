/// Speed of light in km/s, so that `SPEED_OF_LIGHT_KM_S / H0` is in Mpc.
pub const SPEED_OF_LIGHT_KM_S: f64 = 2.99792458E5;

pub const DEFAULT_CORRELATION_DEPTH: usize = 3;

pub const DEFAULT_SEED: u64 = 42;

/// Redshift spacing used to sample window kernels.
pub const DEFAULT_SAMPLING_DZ: f64 = 1E-3;

pub const DEFAULT_SIGMA8: f64 = 0.8;

pub const DEFAULT_SPECTRAL_INDEX: f64 = 0.965;

/// Shift `λ` of the lognormal matter fields; `δ ≥ -λ`.
pub const DEFAULT_LOGNORMAL_SHIFT: f64 = 1.0;
