//! Flat ΛCDM background and an analytic linear matter power spectrum.
//!
//! Distances are in Mpc and wavenumbers in 1/Mpc. The power spectrum uses the
//! BBKS transfer function with the Sugiyama shape parameter, normalised to
//! `sigma8`, and the Carroll, Press & Turner growth factor.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_SIGMA8, DEFAULT_SPECTRAL_INDEX, SPEED_OF_LIGHT_KM_S},
    error::{SimError, SimResult},
    utils::simpson,
};

fn default_sigma8() -> f64 {
    DEFAULT_SIGMA8
}

fn default_n_s() -> f64 {
    DEFAULT_SPECTRAL_INDEX
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    pub h: f64,
    pub omega_b: f64,
    pub omega_c: f64,
    #[serde(default = "default_sigma8")]
    pub sigma8: f64,
    #[serde(default = "default_n_s")]
    pub n_s: f64,
}

impl Cosmology {
    pub fn new(h: f64, omega_b: f64, omega_c: f64) -> SimResult<Self> {
        let cosmo = Cosmology {
            h,
            omega_b,
            omega_c,
            sigma8: DEFAULT_SIGMA8,
            n_s: DEFAULT_SPECTRAL_INDEX,
        };
        cosmo.validate()?;
        Ok(cosmo)
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.h.is_finite() && self.h > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "hubble parameter h must be positive, got {}",
                self.h
            )));
        }
        for (name, v) in [("omega_b", self.omega_b), ("omega_c", self.omega_c)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(SimError::InvalidParameter(format!(
                    "{} must be non-negative, got {}",
                    name, v
                )));
            }
        }
        if self.omega_m() <= 0.0 {
            return Err(SimError::InvalidParameter(
                "total matter density must be positive".to_string(),
            ));
        }
        if !(self.sigma8.is_finite() && self.sigma8 > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "sigma8 must be positive, got {}",
                self.sigma8
            )));
        }
        if !self.n_s.is_finite() {
            return Err(SimError::InvalidParameter("n_s must be finite".to_string()));
        }
        Ok(())
    }

    /// Hubble constant in km/s/Mpc.
    pub fn h0(&self) -> f64 {
        100.0 * self.h
    }

    pub fn ombh2(&self) -> f64 {
        self.omega_b * self.h * self.h
    }

    pub fn omch2(&self) -> f64 {
        self.omega_c * self.h * self.h
    }

    pub fn omega_m(&self) -> f64 {
        self.omega_b + self.omega_c
    }

    pub fn omega_lambda(&self) -> f64 {
        1.0 - self.omega_m()
    }

    /// `H(z) / H0`.
    pub fn e(&self, z: f64) -> f64 {
        (self.omega_m() * (1.0 + z).powi(3) + self.omega_lambda()).sqrt()
    }

    /// `c / H0` in Mpc.
    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT_KM_S / self.h0()
    }

    pub fn comoving_distance(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let n = ((z * 512.0).ceil() as usize).max(16);
        self.hubble_distance() * simpson(|zp| 1.0 / self.e(zp), 0.0, z, n)
    }

    /// Inverse of [`Cosmology::comoving_distance`] by bisection.
    pub fn redshift_at_distance(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        let mut hi = 1.0;
        while self.comoving_distance(hi) < x {
            hi *= 2.0;
        }
        let mut lo = 0.0;
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if self.comoving_distance(mid) < x {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < 1E-12 {
                break;
            }
        }
        0.5 * (lo + hi)
    }

    /// Comoving volume element `dV/dz dOmega` up to the constant `c / H0`.
    pub fn comoving_volume_weight(&self, z: f64) -> f64 {
        self.comoving_distance(z).powi(2) / self.e(z)
    }

    fn growth_g(&self, z: f64) -> f64 {
        let e2 = self.e(z).powi(2);
        let om = self.omega_m() * (1.0 + z).powi(3) / e2;
        let ol = self.omega_lambda() / e2;
        2.5 * om / (om.powf(4.0 / 7.0) - ol + (1.0 + om / 2.0) * (1.0 + ol / 70.0))
    }

    /// Linear growth factor, `D(0) = 1`.
    pub fn growth_factor(&self, z: f64) -> f64 {
        self.growth_g(z) / ((1.0 + z) * self.growth_g(0.0))
    }

    fn shape_parameter(&self) -> f64 {
        let om = self.omega_m();
        om * self.h * (-self.omega_b * (1.0 + (2.0 * self.h).sqrt() / om)).exp()
    }

    /// BBKS transfer function, `k` in 1/Mpc.
    pub fn transfer(&self, k: f64) -> f64 {
        if k <= 0.0 {
            return 1.0;
        }
        let q = k / (self.shape_parameter() * self.h);
        let x = 2.34 * q;
        (1.0 + x).ln() / x
            * (1.0 + 3.89 * q + (16.1 * q).powi(2) + (5.46 * q).powi(3) + (6.71 * q).powi(4))
                .powf(-0.25)
    }

    /// Linear power spectrum normalised to `sigma8` at `z = 0`.
    pub fn linear_power(&self) -> LinearPower {
        let unit = LinearPower {
            cosmo: *self,
            amplitude: 1.0,
        };
        let s = unit.sigma_r(8.0 / self.h);
        LinearPower {
            cosmo: *self,
            amplitude: (self.sigma8 / s).powi(2),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LinearPower {
    cosmo: Cosmology,
    amplitude: f64,
}

impl LinearPower {
    /// `P(k, z)` in Mpc³ for `k` in 1/Mpc.
    pub fn at(&self, k: f64, z: f64) -> f64 {
        if k <= 0.0 {
            return 0.0;
        }
        let d = self.cosmo.growth_factor(z);
        self.amplitude * k.powf(self.cosmo.n_s) * self.cosmo.transfer(k).powi(2) * d * d
    }

    /// RMS of the linear field in spheres of radius `r` Mpc today.
    pub fn sigma_r(&self, r: f64) -> f64 {
        let integrand = |lnk: f64| {
            let k = lnk.exp();
            let x = k * r;
            let w = if x < 1E-3 {
                1.0 - x * x / 10.0
            } else {
                3.0 * (x.sin() - x * x.cos()) / x.powi(3)
            };
            k.powi(3) * self.at(k, 0.0) * w * w
        };
        (simpson(integrand, (1E-5_f64).ln(), (1E2_f64).ln(), 4000) / (2.0 * PI * PI)).sqrt()
    }
}
