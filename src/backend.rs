use anyhow::Result;
use glam::{UVec2, Vec2, Vec3};

use crate::field::{FieldFormat, GridField, TextureSupport};

/// One full-grid operator. Every pass writes exactly one target field and
/// reads only the fields it borrows here, so a pass can never sample the
/// texture it renders into.
pub enum Pass<'a, F> {
    /// Semi-Lagrangian transport of `source` along `velocity`.
    Advection {
        velocity: &'a F,
        source: &'a F,
        dt: f32,
        dissipation: f32,
    },
    Curl {
        velocity: &'a F,
    },
    /// Vorticity confinement force fed back into the velocity.
    Vorticity {
        velocity: &'a F,
        curl: &'a F,
        strength: f32,
        dt: f32,
    },
    Divergence {
        velocity: &'a F,
    },
    /// Scales the previous solution before it warm starts the next solve.
    Clear {
        source: &'a F,
        value: f32,
    },
    /// One Jacobi relaxation step of the pressure Poisson equation.
    Pressure {
        pressure: &'a F,
        divergence: &'a F,
    },
    GradientSubtract {
        pressure: &'a F,
        velocity: &'a F,
    },
    /// Additive impulse with compact smoothstep falloff.
    Splat {
        source: &'a F,
        point: Vec2,
        value: Vec3,
        radius: f32,
        aspect: f32,
    },
}

impl<F> Pass<'_, F> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advection { .. } => "advection",
            Self::Curl { .. } => "curl",
            Self::Vorticity { .. } => "vorticity",
            Self::Divergence { .. } => "divergence",
            Self::Clear { .. } => "clear",
            Self::Pressure { .. } => "pressure",
            Self::GradientSubtract { .. } => "gradient subtract",
            Self::Splat { .. } => "splat",
        }
    }
}

/// Parameters of the final composite to the visible surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Display {
    pub shading: bool,
    pub back_color: Vec3,
    pub transparent: bool,
}

/// Executes passes over fields it allocates.
pub trait Backend {
    type Field: GridField;

    fn texture_support(&self) -> TextureSupport;

    /// Current drawable size in device pixels.
    fn surface_size(&mut self) -> UVec2;

    fn create_field(&mut self, size: UVec2, format: FieldFormat) -> Result<Self::Field>;

    fn release_field(&mut self, field: Self::Field);

    fn run(&mut self, pass: Pass<'_, Self::Field>, target: &mut Self::Field);

    /// Draws the dye field to the visible surface.
    fn present(&mut self, dye: &Self::Field, display: &Display);
}
