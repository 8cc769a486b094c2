//! Typestate driver for a full simulation run.
//!
//! ```text
//! Configured -> ShellsBuilt -> SpectraComputed -> SpectraDiscretized
//!            -> FieldsGenerated -> TracersDerived -> CrossSpectraComputed
//! ```
//!
//! Each transition consumes the pipeline and returns it in the next state, so
//! stages cannot be skipped or repeated. The random generator is owned by the
//! pipeline and used only while generating fields.

use std::{
    fmt,
    sync::{atomic::AtomicBool, Arc},
};

use log::info;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use thiserror::Error;

use crate::{
    config::SimulationConfig,
    cross::{
        cross_spectra, CrossSpectrumEstimator, CrossSpectrumSet, HealpixEstimator, TracerPair,
    },
    discretize::discretized_cls,
    error::{ensure_len, SimError, SimResult},
    healpix::{nside2npix, DiscPixelWindow, PixelWindow},
    limber::LimberSpectra,
    lognormal::{
        lognormal_fields, FieldGenerator, GaussianSpectrumSolver, LognormalGenerator,
        LognormalSolver, MatterField,
    },
    shells::{build_shells, RadialWindow},
    spectra::{DiscretizedSpectra, GaussianSpectra, PowerSpectrumMatrix, SpectrumProvider},
    tracers::{matter_to_galaxies, matter_to_hi, TracerField},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Configured,
    ShellsBuilt,
    SpectraComputed,
    SpectraDiscretized,
    FieldsGenerated,
    TracersDerived,
    CrossSpectraComputed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configured => "configured",
            Stage::ShellsBuilt => "shells built",
            Stage::SpectraComputed => "spectra computed",
            Stage::SpectraDiscretized => "spectra discretized",
            Stage::FieldsGenerated => "fields generated",
            Stage::TracersDerived => "tracers derived",
            Stage::CrossSpectraComputed => "cross spectra computed",
        };
        f.write_str(name)
    }
}

/// A failure tagged with the stage the pipeline was moving into.
#[derive(Error, Debug)]
#[error("pipeline failed entering stage '{stage}': {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: SimError,
}

fn at(stage: Stage) -> impl FnOnce(SimError) -> PipelineError {
    move |source| PipelineError { stage, source }
}

/// Implementations behind every external seam of the pipeline.
pub struct Collaborators {
    pub spectra: Box<dyn SpectrumProvider>,
    pub pixel_window: Box<dyn PixelWindow>,
    pub solver: Box<dyn GaussianSpectrumSolver>,
    pub generator: Box<dyn FieldGenerator>,
    pub estimator: Box<dyn CrossSpectrumEstimator>,
}

impl Collaborators {
    /// Limber spectra, lognormal sampling and HEALPix transforms.
    pub fn healpix() -> Self {
        Collaborators {
            spectra: Box::new(LimberSpectra),
            pixel_window: Box::new(DiscPixelWindow),
            solver: Box::new(LognormalSolver),
            generator: Box::new(LognormalGenerator),
            estimator: Box::new(HealpixEstimator),
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::healpix()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationOutput {
    pub shells: Vec<RadialWindow>,
    pub matter: Vec<MatterField>,
    pub galaxy: Vec<TracerField>,
    pub hi: Vec<TracerField>,
    pub cross: CrossSpectrumSet,
}

pub struct Configured;

pub struct ShellsBuilt {
    pub shells: Vec<RadialWindow>,
}

pub struct SpectraComputed {
    pub shells: Vec<RadialWindow>,
    pub raw: PowerSpectrumMatrix,
}

pub struct SpectraDiscretized {
    pub shells: Vec<RadialWindow>,
    pub cls: DiscretizedSpectra,
}

pub struct FieldsGenerated {
    pub shells: Vec<RadialWindow>,
    pub matter: Vec<MatterField>,
}

pub struct TracersDerived {
    pub shells: Vec<RadialWindow>,
    pub matter: Vec<MatterField>,
    pub galaxy: Vec<TracerField>,
    pub hi: Vec<TracerField>,
}

pub struct CrossSpectraComputed {
    pub output: SimulationOutput,
}

struct Context<R> {
    config: SimulationConfig,
    collaborators: Collaborators,
    rng: R,
    cancel: Option<Arc<AtomicBool>>,
}

pub struct Pipeline<S, R: RngCore> {
    ctx: Context<R>,
    state: S,
}

impl<S, R: RngCore> Pipeline<S, R> {
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.ctx.config
    }
}

impl<R: RngCore> Pipeline<Configured, R> {
    pub fn new(
        config: SimulationConfig,
        collaborators: Collaborators,
        rng: R,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(at(Stage::Configured))?;
        Ok(Pipeline {
            ctx: Context {
                config,
                collaborators,
                rng,
                cancel: None,
            },
            state: Configured,
        })
    }

    /// Flag polled by the cross-spectrum stage before each shell pair.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.ctx.cancel = Some(flag);
        self
    }

    pub fn build_shells(self) -> Result<Pipeline<ShellsBuilt, R>, PipelineError> {
        let Pipeline { ctx, .. } = self;
        let cfg = &ctx.config.shells;
        let shells = build_shells(
            &cfg.grid,
            cfg.window,
            cfg.weight,
            cfg.sampling_dz,
            &ctx.config.cosmology,
        )
        .map_err(at(Stage::ShellsBuilt))?;
        for (i, s) in shells.iter().enumerate() {
            log::debug!(
                "shell {}: [{:.4}, {:.4}] zeff={:.4}",
                i,
                s.lower(),
                s.upper(),
                s.zeff()
            );
        }
        info!("built {} shells", shells.len());
        Ok(Pipeline {
            ctx,
            state: ShellsBuilt { shells },
        })
    }
}

fn check_raw(shells: &[RadialWindow], raw: &PowerSpectrumMatrix) -> SimResult<()> {
    let n = shells.len();
    ensure_len("raw spectra shell count", n, raw.n_shells())?;
    let autos = (0..n).filter(|&i| raw.contains(i, i)).count();
    ensure_len("raw auto spectra", n, autos)
}

/// Every pair within `ncorr` of the diagonal, and nothing further out.
fn check_discretized(cls: &DiscretizedSpectra, ncorr: usize) -> SimResult<()> {
    let n = cls.matrix.n_shells();
    if let Some(sep) = cls.matrix.max_separation() {
        if sep > ncorr {
            return Err(SimError::shape("discretized pair separation", ncorr, sep));
        }
    }
    let expected: usize = (0..n).map(|i| i.min(ncorr) + 1).sum();
    ensure_len("discretized spectrum pairs", expected, cls.matrix.len())
}

fn check_gaussian(cls: &DiscretizedSpectra, gls: &GaussianSpectra) -> SimResult<()> {
    ensure_len("gaussian spectra shell count", cls.matrix.n_shells(), gls.matrix.n_shells())?;
    ensure_len("gaussian spectrum length", cls.matrix.lmax() + 1, gls.matrix.lmax() + 1)?;
    ensure_len("gaussian spectrum pairs", cls.matrix.len(), gls.matrix.len())?;
    let missing = cls
        .matrix
        .iter()
        .filter(|&((i, j), _)| !gls.matrix.contains(i, j))
        .count();
    ensure_len("gaussian spectrum pairs matching", 0, missing)
}

impl<R: RngCore> Pipeline<ShellsBuilt, R> {
    pub fn compute_spectra(self) -> Result<Pipeline<SpectraComputed, R>, PipelineError> {
        let Pipeline { ctx, state } = self;
        let stage = Stage::SpectraComputed;
        let raw = ctx
            .collaborators
            .spectra
            .compute_power_spectra(&ctx.config.cosmology, ctx.config.lmax, &state.shells)
            .map_err(|e| SimError::collaborator("spectrum provider", e))
            .map_err(at(stage))?;
        check_raw(&state.shells, &raw).map_err(at(stage))?;
        info!("computed {} raw spectra up to lmax={}", raw.len(), raw.lmax());
        Ok(Pipeline {
            ctx,
            state: SpectraComputed {
                shells: state.shells,
                raw,
            },
        })
    }
}

impl<R: RngCore> Pipeline<SpectraComputed, R> {
    pub fn discretize(self) -> Result<Pipeline<SpectraDiscretized, R>, PipelineError> {
        let Pipeline { ctx, state } = self;
        let stage = Stage::SpectraDiscretized;
        let cfg = &ctx.config;
        let cls = discretized_cls(
            &state.raw,
            cfg.nside,
            cfg.lmax,
            cfg.correlation_depth,
            ctx.collaborators.pixel_window.as_ref(),
        )
        .map_err(at(stage))?;
        check_discretized(&cls, cfg.correlation_depth).map_err(at(stage))?;
        Ok(Pipeline {
            ctx,
            state: SpectraDiscretized {
                shells: state.shells,
                cls,
            },
        })
    }
}

impl<R: RngCore> Pipeline<SpectraDiscretized, R> {
    pub fn generate_fields(self) -> Result<Pipeline<FieldsGenerated, R>, PipelineError> {
        let Pipeline { mut ctx, state } = self;
        let stage = Stage::FieldsGenerated;
        let (nside, ncorr) = (ctx.config.nside, ctx.config.correlation_depth);
        let fields = lognormal_fields(&state.shells, ctx.config.lognormal_shift);

        let gls = ctx
            .collaborators
            .solver
            .solve_gaussian_spectra(&fields, &state.cls)
            .map_err(|e| SimError::collaborator("gaussian spectrum solver", e))
            .map_err(at(stage))?;
        check_gaussian(&state.cls, &gls).map_err(at(stage))?;
        let matter = ctx
            .collaborators
            .generator
            .generate_fields(&fields, &gls, nside, ncorr, &mut ctx.rng)
            .map_err(|e| SimError::collaborator("field generator", e))
            .map_err(at(stage))?;

        check_matter(&state.shells, &matter, nside).map_err(at(stage))?;
        info!("generated {} matter fields at nside={}", matter.len(), nside);
        Ok(Pipeline {
            ctx,
            state: FieldsGenerated {
                shells: state.shells,
                matter,
            },
        })
    }
}

fn check_matter(shells: &[RadialWindow], matter: &[MatterField], nside: usize) -> SimResult<()> {
    ensure_len("matter field count", shells.len(), matter.len())?;
    for m in matter {
        ensure_len("matter field pixels", nside2npix(nside), m.delta.len())?;
    }
    Ok(())
}

impl<R: RngCore> Pipeline<FieldsGenerated, R> {
    pub fn derive_tracers(self) -> Result<Pipeline<TracersDerived, R>, PipelineError> {
        let Pipeline { ctx, state } = self;
        let stage = Stage::TracersDerived;
        let clamp = ctx.config.clamp;
        let galaxy = matter_to_galaxies(&state.shells, &state.matter, clamp).map_err(at(stage))?;
        let hi = matter_to_hi(&state.shells, &state.matter, clamp).map_err(at(stage))?;
        ensure_len("galaxy field count", state.shells.len(), galaxy.len()).map_err(at(stage))?;
        ensure_len("hi field count", state.shells.len(), hi.len()).map_err(at(stage))?;
        info!("derived {} galaxy and {} hi fields", galaxy.len(), hi.len());
        Ok(Pipeline {
            ctx,
            state: TracersDerived {
                shells: state.shells,
                matter: state.matter,
                galaxy,
                hi,
            },
        })
    }
}

impl<R: RngCore> Pipeline<TracersDerived, R> {
    pub fn compute_cross_spectra(self) -> Result<Pipeline<CrossSpectraComputed, R>, PipelineError> {
        let Pipeline { ctx, state } = self;
        let stage = Stage::CrossSpectraComputed;
        let cross = cross_spectra(
            &state.galaxy,
            &state.hi,
            ctx.config.lmax,
            ctx.collaborators.estimator.as_ref(),
            ctx.cancel.as_deref(),
        )
        .map_err(at(stage))?;
        let n = state.shells.len();
        for pair in TracerPair::ALL {
            ensure_len("cross spectrum pairs", n * (n + 1) / 2, cross.family(pair).len())
                .map_err(at(stage))?;
        }
        info!("computed cross spectra for {} shells", n);
        Ok(Pipeline {
            ctx,
            state: CrossSpectraComputed {
                output: SimulationOutput {
                    shells: state.shells,
                    matter: state.matter,
                    galaxy: state.galaxy,
                    hi: state.hi,
                    cross,
                },
            },
        })
    }
}

impl<R: RngCore> Pipeline<CrossSpectraComputed, R> {
    pub fn output(&self) -> &SimulationOutput {
        &self.state.output
    }

    pub fn into_output(self) -> SimulationOutput {
        self.state.output
    }
}

/// Runs every stage in order.
pub fn run<R: RngCore>(
    config: SimulationConfig,
    collaborators: Collaborators,
    rng: R,
) -> Result<SimulationOutput, PipelineError> {
    Ok(Pipeline::new(config, collaborators, rng)?
        .build_shells()?
        .compute_spectra()?
        .discretize()?
        .generate_fields()?
        .derive_tracers()?
        .compute_cross_spectra()?
        .into_output())
}

/// Runs with the built-in collaborators and a generator seeded from the config.
pub fn run_seeded(config: SimulationConfig) -> Result<SimulationOutput, PipelineError> {
    let rng = StdRng::seed_from_u64(config.seed);
    run(config, Collaborators::healpix(), rng)
}
