use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ensure_len, SimResult},
    lognormal::MatterField,
    shells::RadialWindow,
};

pub fn galaxy_bias(z: f64) -> f64 {
    0.7 * (1.0 + z)
}

pub fn hi_bias(z: f64) -> f64 {
    0.667 + 0.178 * z + 0.050 * z * z
}

/// Mean HI brightness temperature in mK.
pub fn hi_mean_temperature(z: f64) -> f64 {
    0.0559 + 0.2324 * z - 0.0241 * z * z
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tracer {
    Galaxy,
    Hi,
}

/// Lower bound applied to biased overdensities.
///
/// `None` keeps the linear bias output as is, which can fall below `-1`.
/// `Physical` limits the tracer overdensity to `-1`, so galaxy contrasts and
/// HI temperatures stay non-negative in density.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverdensityClamp {
    #[default]
    None,
    Physical,
}

impl OverdensityClamp {
    fn apply(self, delta: f64) -> f64 {
        match self {
            OverdensityClamp::None => delta,
            OverdensityClamp::Physical => delta.max(-1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TracerField {
    pub tracer: Tracer,
    pub shell: usize,
    pub nside: usize,
    pub values: Vec<f64>,
}

pub fn galaxy_overdensity(shell: &RadialWindow, delta_m: &[f64]) -> Vec<f64> {
    let b = galaxy_bias(shell.zeff());
    delta_m.iter().map(|&d| b * d).collect()
}

pub fn hi_temperature(shell: &RadialWindow, delta_m: &[f64]) -> Vec<f64> {
    let z = shell.zeff();
    let (b, t) = (hi_bias(z), hi_mean_temperature(z));
    delta_m.iter().map(|&d| t * (1.0 + b * d)).collect()
}

fn map_shells<F>(
    tracer: Tracer,
    shells: &[RadialWindow],
    matter: &[MatterField],
    f: F,
) -> SimResult<Vec<TracerField>>
where
    F: Fn(&RadialWindow, &[f64]) -> Vec<f64>,
{
    ensure_len("matter fields", shells.len(), matter.len())?;
    Ok(shells
        .iter()
        .zip(matter)
        .enumerate()
        .map(|(i, (shell, m))| {
            debug!("{:?} tracer for shell {} at zeff={:.4}", tracer, i, shell.zeff());
            TracerField {
                tracer,
                shell: i,
                nside: m.nside,
                values: f(shell, &m.delta),
            }
        })
        .collect())
}

pub fn matter_to_galaxies(
    shells: &[RadialWindow],
    matter: &[MatterField],
    clamp: OverdensityClamp,
) -> SimResult<Vec<TracerField>> {
    map_shells(Tracer::Galaxy, shells, matter, |shell, delta| {
        let mut values = galaxy_overdensity(shell, delta);
        if clamp != OverdensityClamp::None {
            values.iter_mut().for_each(|v| *v = clamp.apply(*v));
        }
        values
    })
}

pub fn matter_to_hi(
    shells: &[RadialWindow],
    matter: &[MatterField],
    clamp: OverdensityClamp,
) -> SimResult<Vec<TracerField>> {
    map_shells(Tracer::Hi, shells, matter, |shell, delta| {
        if clamp == OverdensityClamp::None {
            return hi_temperature(shell, delta);
        }
        let z = shell.zeff();
        let (b, t) = (hi_bias(z), hi_mean_temperature(z));
        delta.iter().map(|&d| t * (1.0 + clamp.apply(b * d))).collect()
    })
}
