use anyhow::{anyhow, Context, Result};
use glam::UVec2;

use crate::backend::{Backend, Pass};
use crate::config::SimulationConfig;
use crate::field::{DoubleField, FieldFormat, GridField};

/// Velocity components are clamped to this after vorticity confinement.
pub const VELOCITY_LIMIT: f32 = 1000.0;

/// Multiplicative decay applied by one advection pass.
#[must_use]
pub fn advection_decay(dt: f32, dissipation: f32) -> f32 {
    (1.0 - dissipation * dt).clamp(0.0, 1.0)
}

pub struct FluidFields<F> {
    pub dye: DoubleField<F>,
    pub velocity: DoubleField<F>,
    pub divergence: F,
    pub curl: F,
    pub pressure: DoubleField<F>,
}

#[derive(Clone, Copy)]
enum Grid {
    Dye,
    Sim,
}

const LAYOUT: [(Grid, FieldFormat); 8] = [
    (Grid::Dye, FieldFormat::Rgba),
    (Grid::Dye, FieldFormat::Rgba),
    (Grid::Sim, FieldFormat::Rg),
    (Grid::Sim, FieldFormat::Rg),
    (Grid::Sim, FieldFormat::R),
    (Grid::Sim, FieldFormat::R),
    (Grid::Sim, FieldFormat::R),
    (Grid::Sim, FieldFormat::R),
];

impl<F: GridField> FluidFields<F> {
    /// Allocates every field. On failure the fields created so far are
    /// released again before the error is returned.
    pub fn allocate<B>(backend: &mut B, sim_size: UVec2, dye_size: UVec2) -> Result<Self>
    where
        B: Backend<Field = F>,
    {
        let mut created = Vec::with_capacity(LAYOUT.len());
        for (grid, format) in LAYOUT {
            let size = match grid {
                Grid::Dye => dye_size,
                Grid::Sim => sim_size,
            };
            match backend.create_field(size, format) {
                Ok(field) => created.push(field),
                Err(err) => {
                    for field in created {
                        backend.release_field(field);
                    }
                    return Err(err).with_context(|| format!("allocating {format:?} field of {size}"));
                }
            }
        }
        let [dye_a, dye_b, velocity_a, velocity_b, divergence, curl, pressure_a, pressure_b]: [F; 8] =
            created
                .try_into()
                .map_err(|_| anyhow!("field layout mismatch"))?;
        Ok(Self {
            dye: DoubleField::new(dye_a, dye_b),
            velocity: DoubleField::new(velocity_a, velocity_b),
            divergence,
            curl,
            pressure: DoubleField::new(pressure_a, pressure_b),
        })
    }

    pub fn release<B>(self, backend: &mut B)
    where
        B: Backend<Field = F>,
    {
        let (dye_a, dye_b) = self.dye.into_inner();
        let (velocity_a, velocity_b) = self.velocity.into_inner();
        let (pressure_a, pressure_b) = self.pressure.into_inner();
        for field in [
            dye_a,
            dye_b,
            velocity_a,
            velocity_b,
            self.divergence,
            self.curl,
            pressure_a,
            pressure_b,
        ] {
            backend.release_field(field);
        }
    }
}

/// Transports velocity along itself, then dye along the new velocity.
pub fn advect<B: Backend>(backend: &mut B, fields: &mut FluidFields<B::Field>, dt: f32, config: &SimulationConfig) {
    backend.run(
        Pass::Advection {
            velocity: &fields.velocity.read,
            source: &fields.velocity.read,
            dt,
            dissipation: config.velocity_dissipation,
        },
        &mut fields.velocity.write,
    );
    fields.velocity.swap();

    backend.run(
        Pass::Advection {
            velocity: &fields.velocity.read,
            source: &fields.dye.read,
            dt,
            dissipation: config.density_dissipation,
        },
        &mut fields.dye.write,
    );
    fields.dye.swap();
}

/// Computes the curl field and, for a positive strength, feeds the
/// confinement force back into the velocity.
pub fn confine_vorticity<B: Backend>(backend: &mut B, fields: &mut FluidFields<B::Field>, dt: f32, strength: f32) {
    backend.run(
        Pass::Curl {
            velocity: &fields.velocity.read,
        },
        &mut fields.curl,
    );
    if strength <= 0.0 {
        return;
    }
    backend.run(
        Pass::Vorticity {
            velocity: &fields.velocity.read,
            curl: &fields.curl,
            strength,
            dt,
        },
        &mut fields.velocity.write,
    );
    fields.velocity.swap();
}

/// Projects the velocity onto its divergence-free part.
pub fn project<B: Backend>(
    backend: &mut B,
    fields: &mut FluidFields<B::Field>,
    pressure_factor: f32,
    iterations: usize,
) {
    backend.run(
        Pass::Divergence {
            velocity: &fields.velocity.read,
        },
        &mut fields.divergence,
    );

    backend.run(
        Pass::Clear {
            source: &fields.pressure.read,
            value: pressure_factor,
        },
        &mut fields.pressure.write,
    );
    fields.pressure.swap();

    for _ in 0..iterations {
        backend.run(
            Pass::Pressure {
                pressure: &fields.pressure.read,
                divergence: &fields.divergence,
            },
            &mut fields.pressure.write,
        );
        fields.pressure.swap();
    }

    backend.run(
        Pass::GradientSubtract {
            pressure: &fields.pressure.read,
            velocity: &fields.velocity.read,
        },
        &mut fields.velocity.write,
    );
    fields.velocity.swap();
}

/// One solver frame: advect, then make the result incompressible again.
pub fn step<B: Backend>(backend: &mut B, fields: &mut FluidFields<B::Field>, dt: f32, config: &SimulationConfig) {
    advect(backend, fields, dt, config);
    confine_vorticity(backend, fields, dt, config.curl);
    project(backend, fields, config.pressure, config.pressure_iterations);
}

#[cfg(test)]
mod tests {
    use glam::{uvec2, Vec4};

    use super::*;
    use crate::cpu::{CpuBackend, CpuField};

    const N: u32 = 24;

    fn radial_fields(backend: &mut CpuBackend) -> FluidFields<CpuField> {
        let size = uvec2(N, N);
        let mut fields = FluidFields::allocate(backend, size, size).unwrap();
        // outward flow of one texel per second per texel from the center
        fields.velocity.read.fill(|uv| {
            let r = (uv - 0.5) * N as f32;
            Vec4::new(r.x, r.y, 0.0, 0.0)
        });
        fields
    }

    fn interior_divergence(backend: &mut CpuBackend, fields: &mut FluidFields<CpuField>) -> f32 {
        backend.run(
            Pass::Divergence {
                velocity: &fields.velocity.read,
            },
            &mut fields.divergence,
        );
        let mut sum = 0.0;
        for j in 1..N as i32 - 1 {
            for i in 1..N as i32 - 1 {
                sum += fields.divergence.texel(i, j).x.powi(2);
            }
        }
        sum.sqrt()
    }

    fn residual_after(iterations: usize) -> f32 {
        let mut backend = CpuBackend::new(uvec2(N, N));
        let mut fields = radial_fields(&mut backend);
        project(&mut backend, &mut fields, 0.0, iterations);
        interior_divergence(&mut backend, &mut fields)
    }

    #[test]
    fn radial_field_has_known_divergence() {
        let mut backend = CpuBackend::new(uvec2(N, N));
        let mut fields = radial_fields(&mut backend);
        interior_divergence(&mut backend, &mut fields);
        assert!((fields.divergence.texel(10, 12).x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn more_jacobi_iterations_never_increase_residual() {
        let untouched = {
            let mut backend = CpuBackend::new(uvec2(N, N));
            let mut fields = radial_fields(&mut backend);
            interior_divergence(&mut backend, &mut fields)
        };
        let twenty = residual_after(20);
        let forty = residual_after(40);
        assert!(twenty < untouched, "{twenty} >= {untouched}");
        assert!(forty <= twenty, "{forty} > {twenty}");
    }

    #[test]
    fn decay_factor_stays_in_unit_interval() {
        assert_eq!(advection_decay(0.0, 0.98), 1.0);
        assert!((advection_decay(0.5, 0.5) - 0.75).abs() < 1e-6);
        assert_eq!(advection_decay(10.0, 1.0), 0.0);
    }

    #[test]
    fn zero_curl_strength_leaves_velocity_in_place() {
        let mut backend = CpuBackend::new(uvec2(N, N));
        let mut fields = radial_fields(&mut backend);
        let before = fields.velocity.read.texels().to_vec();
        confine_vorticity(&mut backend, &mut fields, 0.1, 0.0);
        assert_eq!(fields.velocity.read.texels(), before.as_slice());
        // radial flow is irrotational
        assert!(fields.curl.max_abs() < 1e-3);
    }
}
