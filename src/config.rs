use anyhow::{ensure, Result};
use glam::{uvec2, vec3, UVec2, Vec3};

pub const DEFAULT_SIM_RESOLUTION: u32 = 128;
pub const DEFAULT_DYE_RESOLUTION: u32 = 1024;
pub const DEFAULT_DENSITY_DISSIPATION: f32 = 0.98;
pub const DEFAULT_VELOCITY_DISSIPATION: f32 = 0.98;
pub const DEFAULT_PRESSURE: f32 = 0.8;
pub const DEFAULT_PRESSURE_ITERATIONS: usize = 20;
pub const DEFAULT_CURL: f32 = 30.0;
pub const DEFAULT_SPLAT_RADIUS: f32 = 0.25;
pub const DEFAULT_SPLAT_FORCE: f32 = 6000.0;
pub const DEFAULT_COLOR_UPDATE_SPEED: f32 = 10.0;
pub const DEFAULT_MAX_DT: f32 = 1.0 / 60.0;

/// How pointers pick their dye color.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorMode {
    Rainbow,
    Single(Vec3),
    Custom(Vec<Vec3>),
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    pub pressure: f32,
    pub pressure_iterations: usize,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub color_mode: ColorMode,
    pub color_update_speed: f32,
    pub back_color: Vec3,
    pub transparent: bool,
    pub max_dt: f32,
    pub hover_trail: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_resolution: DEFAULT_SIM_RESOLUTION,
            dye_resolution: DEFAULT_DYE_RESOLUTION,
            density_dissipation: DEFAULT_DENSITY_DISSIPATION,
            velocity_dissipation: DEFAULT_VELOCITY_DISSIPATION,
            pressure: DEFAULT_PRESSURE,
            pressure_iterations: DEFAULT_PRESSURE_ITERATIONS,
            curl: DEFAULT_CURL,
            splat_radius: DEFAULT_SPLAT_RADIUS,
            splat_force: DEFAULT_SPLAT_FORCE,
            shading: true,
            color_mode: ColorMode::Rainbow,
            color_update_speed: DEFAULT_COLOR_UPDATE_SPEED,
            back_color: vec3(0.0, 0.0, 0.0),
            transparent: false,
            max_dt: DEFAULT_MAX_DT,
            hover_trail: false,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sim_resolution > 0, "simulation resolution must be positive");
        ensure!(self.dye_resolution > 0, "dye resolution must be positive");
        for (name, value) in [
            ("density dissipation", self.density_dissipation),
            ("velocity dissipation", self.velocity_dissipation),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must lie in [0, 1], got {value}"
            );
        }
        for (name, value) in [
            ("pressure", self.pressure),
            ("curl", self.curl),
            ("splat radius", self.splat_radius),
            ("splat force", self.splat_force),
            ("color update speed", self.color_update_speed),
            ("max dt", self.max_dt),
        ] {
            ensure!(value.is_finite(), "{name} must be finite, got {value}");
        }
        ensure!(self.splat_radius > 0.0, "splat radius must be positive");
        ensure!(self.max_dt > 0.0, "max dt must be positive");
        ensure!(
            self.back_color.is_finite(),
            "background color must be finite"
        );
        Ok(())
    }
}

/// Grid size for `resolution` cells along the short side of a surface.
#[must_use]
pub fn grid_size(resolution: u32, surface: UVec2) -> UVec2 {
    let surface = surface.max(UVec2::ONE).as_vec2();
    let mut aspect = surface.x / surface.y;
    if aspect < 1.0 {
        aspect = 1.0 / aspect;
    }
    let min = resolution.max(1);
    let max = f32::round(resolution as f32 * aspect).max(1.0) as u32;
    if surface.x > surface.y {
        uvec2(max, min)
    } else {
        uvec2(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_dissipation_outside_unit_interval() {
        let config = SimulationConfig {
            velocity_dissipation: 1.5,
            ..SimulationConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("velocity dissipation"));
    }

    #[test]
    fn rejects_zero_resolution() {
        let config = SimulationConfig {
            sim_resolution: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn grid_follows_surface_orientation() {
        assert_eq!(grid_size(128, uvec2(1920, 1080)), uvec2(228, 128));
        assert_eq!(grid_size(128, uvec2(1080, 1920)), uvec2(128, 228));
        assert_eq!(grid_size(64, uvec2(256, 256)), uvec2(64, 64));
    }

    #[test]
    fn degenerate_surface_still_yields_cells() {
        assert_eq!(grid_size(32, UVec2::ZERO), uvec2(32, 32));
    }
}
