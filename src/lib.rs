//! Shell-wise lognormal matter fields, galaxy and HI tracers, and their
//! pairwise angular spectra on HEALPix maps.

pub mod config;
pub mod constants;
pub mod cosmology;
pub mod cross;
pub mod discretize;
pub mod error;
pub mod fft;
pub mod galaxies;
pub mod healpix;
pub mod limber;
pub mod lognormal;
pub mod noise;
pub mod pipeline;
pub mod shells;
pub mod sht;
pub mod spectra;
pub mod tracers;
pub mod utils;

pub use crate::{
    config::{ShellConfig, SimulationConfig},
    cosmology::Cosmology,
    cross::{cross_spectra, CrossSpectrumEstimator, CrossSpectrumSet, PairSpectrum, TracerPair},
    discretize::discretized_cls,
    error::{BoxError, SimError, SimResult},
    lognormal::{FieldDescriptor, FieldGenerator, GaussianSpectrumSolver, MatterField},
    pipeline::{run, run_seeded, Collaborators, Pipeline, PipelineError, SimulationOutput, Stage},
    shells::{RadialWindow, ShellGrid, WindowShape, WindowWeight},
    spectra::{DiscretizedSpectra, GaussianSpectra, PowerSpectrumMatrix, SpectrumProvider},
    tracers::{
        galaxy_bias, galaxy_overdensity, hi_bias, hi_mean_temperature, hi_temperature,
        OverdensityClamp, Tracer, TracerField,
    },
};
