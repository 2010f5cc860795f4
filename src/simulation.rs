use anyhow::{Context, Result};
use glam::{UVec2, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backend::{Backend, Display};
use crate::config::{grid_size, SimulationConfig};
use crate::pointer::PointerInput;
use crate::solver::{self, FluidFields};
use crate::splat::{self, Splat};

/// Owns a backend, the fields allocated on it and the pointer state, and
/// advances all of them one animation frame at a time.
pub struct Simulation<B: Backend> {
    backend: B,
    config: SimulationConfig,
    // only `None` while dropping
    fields: Option<FluidFields<B::Field>>,
    surface: UVec2,
    input: PointerInput,
    last_frame_ms: Option<f64>,
    frames: u64,
    failed_resizes: u32,
}

impl<B: Backend> Simulation<B> {
    pub fn new(backend: B, config: SimulationConfig) -> Result<Self> {
        Self::with_rng(backend, config, StdRng::from_entropy())
    }

    /// Like [`Simulation::new`] with a caller supplied color source.
    pub fn with_rng(mut backend: B, config: SimulationConfig, rng: StdRng) -> Result<Self> {
        config.validate().context("invalid simulation config")?;
        let surface = backend.surface_size();
        let fields = allocate(&mut backend, &config, surface)?;
        let mut input = PointerInput::new(&config, rng);
        input.set_surface_size(surface);
        log::info!(
            "fluid initialized: surface {surface}, velocity grid {}, dye grid {}, {:?}",
            fields.velocity.size(),
            fields.dye.size(),
            backend.texture_support(),
        );
        Ok(Self {
            backend,
            config,
            fields: Some(fields),
            surface,
            input,
            last_frame_ms: None,
            frames: 0,
            failed_resizes: 0,
        })
    }

    /// Runs one animation frame at host timestamp `now_ms`.
    ///
    /// A failed resize keeps the current fields and is retried next frame.
    pub fn frame(&mut self, now_ms: f64) {
        match self.resize() {
            Ok(_) => self.failed_resizes = 0,
            Err(err) => {
                if self.failed_resizes == 0 {
                    log::warn!("staying at {} until resizing succeeds: {err:#}", self.surface);
                }
                self.failed_resizes = self.failed_resizes.saturating_add(1);
            }
        }
        let dt = self.timestep(now_ms);
        self.input.update_colors(dt);
        self.apply_inputs();
        self.step(dt);
        self.render();
        self.frames += 1;
    }

    /// Seconds since the previous frame, zero on the first one, capped at
    /// the configured maximum.
    fn timestep(&mut self, now_ms: f64) -> f32 {
        let elapsed = self
            .last_frame_ms
            .map_or(0.0, |last| ((now_ms - last) / 1000.0) as f32);
        self.last_frame_ms = Some(now_ms);
        elapsed.max(0.0).min(self.config.max_dt)
    }

    /// Reallocates every field when the drawable size changed. Returns
    /// whether it did. The old fields survive a failed reallocation.
    pub fn resize(&mut self) -> Result<bool> {
        let surface = self.backend.surface_size();
        if surface == self.surface {
            return Ok(false);
        }
        let fields = allocate(&mut self.backend, &self.config, surface)
            .with_context(|| format!("resizing to {surface}"))?;
        if let Some(old) = self.fields.replace(fields) {
            old.release(&mut self.backend);
        }
        self.surface = surface;
        self.input.set_surface_size(surface);
        log::debug!("surface resized to {surface}");
        Ok(true)
    }

    fn apply_inputs(&mut self) {
        let aspect = self.aspect();
        let radius = self.config.splat_radius;
        let splats = self.input.take_splats();
        if let Some(fields) = self.fields.as_mut() {
            for request in &splats {
                splat::apply(&mut self.backend, fields, request, radius, aspect);
            }
        }
    }

    /// Injects an impulse at `point` in normalized surface coordinates.
    pub fn splat(&mut self, point: Vec2, force: Vec2, color: Vec3) {
        let aspect = self.aspect();
        let request = Splat { point, force, color };
        if let Some(fields) = self.fields.as_mut() {
            splat::apply(&mut self.backend, fields, &request, self.config.splat_radius, aspect);
        }
    }

    /// Advances the fluid by `dt` seconds without touching pointers or
    /// the surface.
    pub fn step(&mut self, dt: f32) {
        if let Some(fields) = self.fields.as_mut() {
            solver::step(&mut self.backend, fields, dt, &self.config);
        }
    }

    pub fn render(&mut self) {
        let display = Display {
            shading: self.config.shading,
            back_color: self.config.back_color,
            transparent: self.config.transparent,
        };
        if let Some(fields) = self.fields.as_ref() {
            self.backend.present(&fields.dye.read, &display);
        }
    }

    #[must_use]
    pub fn aspect(&self) -> f32 {
        let size = self.surface.max(UVec2::ONE).as_vec2();
        size.x / size.y
    }

    #[must_use]
    pub fn surface_size(&self) -> UVec2 {
        self.surface
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn fields(&self) -> Option<&FluidFields<B::Field>> {
        self.fields.as_ref()
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[must_use]
    pub fn input(&self) -> &PointerInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut PointerInput {
        &mut self.input
    }
}

impl<B: Backend> Drop for Simulation<B> {
    fn drop(&mut self) {
        if let Some(fields) = self.fields.take() {
            fields.release(&mut self.backend);
        }
    }
}

fn allocate<B: Backend>(backend: &mut B, config: &SimulationConfig, surface: UVec2) -> Result<FluidFields<B::Field>> {
    let sim_size = grid_size(config.sim_resolution, surface);
    let dye_size = grid_size(config.dye_resolution, surface);
    FluidFields::allocate(backend, sim_size, dye_size)
}
