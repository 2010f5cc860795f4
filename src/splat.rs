use glam::{Vec2, Vec3};

use crate::backend::{Backend, Pass};
use crate::solver::FluidFields;

/// A localized impulse: `force` goes into velocity, `color` into dye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Splat {
    /// Normalized surface coordinates, origin bottom-left.
    pub point: Vec2,
    pub force: Vec2,
    pub color: Vec3,
}

/// Wide surfaces stretch x distances by the aspect ratio, so the radius is
/// widened with them.
#[must_use]
pub fn corrected_radius(radius: f32, aspect: f32) -> f32 {
    if aspect > 1.0 {
        radius * aspect
    } else {
        radius
    }
}

pub fn apply<B: Backend>(backend: &mut B, fields: &mut FluidFields<B::Field>, splat: &Splat, radius: f32, aspect: f32) {
    let radius = corrected_radius(radius, aspect);
    backend.run(
        Pass::Splat {
            source: &fields.velocity.read,
            point: splat.point,
            value: splat.force.extend(0.0),
            radius,
            aspect,
        },
        &mut fields.velocity.write,
    );
    fields.velocity.swap();

    backend.run(
        Pass::Splat {
            source: &fields.dye.read,
            point: splat.point,
            value: splat.color,
            radius,
            aspect,
        },
        &mut fields.dye.write,
    );
    fields.dye.swap();
}
