//! Host-memory backend.
//!
//! Evaluates every pass the way the fragment shaders in `webgl::shaders` do:
//! texel-centered coordinates, clamp-to-edge addressing and the sampler the
//! detected [`TextureSupport`] allows. Texels hold decoded values, rounded the
//! way the storage would round them. Presents into an RGBA8 render buffer.

use anyhow::{ensure, Result};
use glam::{vec2, vec3, UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};
use rayon::prelude::*;

use crate::backend::{Backend, Display, Pass};
use crate::field::{quantize_packed, FieldFormat, Filtering, GridField, TexelStorage, TextureSupport};
use crate::solver::{advection_decay, VELOCITY_LIMIT};

pub struct CpuField {
    size: UVec2,
    format: FieldFormat,
    storage: TexelStorage,
    packed: bool,
    filtering: Filtering,
    texels: Vec<Vec4>,
}

impl GridField for CpuField {
    fn size(&self) -> UVec2 {
        self.size
    }
}

#[allow(clippy::cast_possible_wrap)]
impl CpuField {
    fn new(size: UVec2, format: FieldFormat, support: TextureSupport) -> Self {
        Self {
            size,
            format,
            storage: support.storage,
            packed: support.packs(format),
            filtering: support.filtering,
            texels: vec![Vec4::ZERO; (size.x * size.y) as usize],
        }
    }

    #[must_use]
    pub fn format(&self) -> FieldFormat {
        self.format
    }

    #[must_use]
    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Texel at integer coordinates, origin bottom-left, clamped to the edge.
    #[must_use]
    pub fn texel(&self, i: i32, j: i32) -> Vec4 {
        let i = i.clamp(0, self.size.x as i32 - 1) as usize;
        let j = j.clamp(0, self.size.y as i32 - 1) as usize;
        self.texels[j * self.size.x as usize + i]
    }

    /// Samples with the field's hardware filtering mode.
    #[must_use]
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        match self.filtering {
            Filtering::Linear => self.sample_linear(uv),
            Filtering::Nearest => self.sample_nearest(uv),
        }
    }

    fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        let st = (uv * self.size.as_vec2()).floor();
        self.texel(st.x as i32, st.y as i32)
    }

    fn sample_linear(&self, uv: Vec2) -> Vec4 {
        let st = uv * self.size.as_vec2() - 0.5;
        let base = st.floor();
        let f = st - base;
        let (i, j) = (base.x as i32, base.y as i32);
        let bottom = self.texel(i, j).lerp(self.texel(i + 1, j), f.x);
        let top = self.texel(i, j + 1).lerp(self.texel(i + 1, j + 1), f.x);
        bottom.lerp(top, f.y)
    }

    /// Four nearest fetches blended by hand, as the advection shader does
    /// when the sampler cannot filter.
    #[must_use]
    pub fn bilerp(&self, uv: Vec2) -> Vec4 {
        let texel = self.texel_size();
        let st = uv / texel - 0.5;
        let iuv = st.floor();
        let fuv = st - iuv;
        let a = self.sample_nearest((iuv + vec2(0.5, 0.5)) * texel);
        let b = self.sample_nearest((iuv + vec2(1.5, 0.5)) * texel);
        let c = self.sample_nearest((iuv + vec2(0.5, 1.5)) * texel);
        let d = self.sample_nearest((iuv + vec2(1.5, 1.5)) * texel);
        a.lerp(b, fuv.x).lerp(c.lerp(d, fuv.x), fuv.y)
    }

    /// Largest absolute channel value across the field.
    #[must_use]
    pub fn max_abs(&self) -> f32 {
        self.texels
            .iter()
            .map(|t| t.abs().max_element())
            .fold(0.0, f32::max)
    }

    /// Evaluates `kernel` at every texel center in parallel.
    pub fn fill<K>(&mut self, kernel: K)
    where
        K: Fn(Vec2) -> Vec4 + Sync,
    {
        let width = self.size.x as usize;
        let texel = self.texel_size();
        let channels = self.format.channels();
        let storage = self.storage;
        let packed = self.packed;
        self.texels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(j, row)| {
                for (i, out) in row.iter_mut().enumerate() {
                    let uv = (vec2(i as f32, j as f32) + 0.5) * texel;
                    *out = store(kernel(uv), channels, storage, packed);
                }
            });
    }
}

fn store(value: Vec4, channels: usize, storage: TexelStorage, packed: bool) -> Vec4 {
    let mut out = value.to_array();
    out[channels..].fill(0.0);
    if storage == TexelStorage::UnsignedByte {
        for c in &mut out[..channels] {
            *c = if packed {
                quantize_packed(*c)
            } else {
                (c.clamp(0.0, 1.0) * 255.0).round() / 255.0
            };
        }
    }
    Vec4::from_array(out)
}

pub struct CpuBackend {
    support: TextureSupport,
    surface: UVec2,
    frame_size: UVec2,
    render_buffer: Vec<u8>,
    frames_presented: usize,
    live_fields: usize,
    field_limit: Option<usize>,
}

impl CpuBackend {
    #[must_use]
    pub fn new(surface: UVec2) -> Self {
        Self::with_support(surface, TextureSupport::full())
    }

    #[must_use]
    pub fn with_support(surface: UVec2, support: TextureSupport) -> Self {
        Self {
            support,
            surface,
            frame_size: UVec2::ZERO,
            render_buffer: Vec::new(),
            frames_presented: 0,
            live_fields: 0,
            field_limit: None,
        }
    }

    /// Caps how many fields may be alive at once, like a device running
    /// out of texture memory.
    pub fn set_field_limit(&mut self, limit: Option<usize>) {
        self.field_limit = limit;
    }

    #[must_use]
    pub fn live_fields(&self) -> usize {
        self.live_fields
    }

    /// Simulates the host resizing the drawable.
    pub fn set_surface_size(&mut self, size: UVec2) {
        self.surface = size;
    }

    /// Size of the last presented frame.
    #[must_use]
    pub fn frame_size(&self) -> UVec2 {
        self.frame_size
    }

    /// RGBA8 pixels of the last presented frame, top row first.
    #[must_use]
    pub fn render_buffer(&self) -> &[u8] {
        &self.render_buffer
    }

    #[must_use]
    pub fn frames_presented(&self) -> usize {
        self.frames_presented
    }
}

impl Backend for CpuBackend {
    type Field = CpuField;

    fn texture_support(&self) -> TextureSupport {
        self.support
    }

    fn surface_size(&mut self) -> UVec2 {
        self.surface
    }

    fn create_field(&mut self, size: UVec2, format: FieldFormat) -> Result<CpuField> {
        ensure!(
            size.x > 0 && size.y > 0,
            "cannot allocate an empty {size} field"
        );
        if let Some(limit) = self.field_limit {
            ensure!(
                self.live_fields < limit,
                "out of field memory, {limit} fields already alive"
            );
        }
        self.live_fields += 1;
        Ok(CpuField::new(size, format, self.support))
    }

    fn release_field(&mut self, field: CpuField) {
        self.live_fields = self.live_fields.saturating_sub(1);
        drop(field);
    }

    #[allow(clippy::too_many_lines)]
    fn run(&mut self, pass: Pass<'_, CpuField>, target: &mut CpuField) {
        let manual = self.support.manual_filtering();
        let texel = target.texel_size();
        let dx = vec2(texel.x, 0.0);
        let dy = vec2(0.0, texel.y);

        match pass {
            Pass::Advection {
                velocity,
                source,
                dt,
                dissipation,
            } => {
                let velocity_texel = velocity.texel_size();
                let decay = advection_decay(dt, dissipation);
                target.fill(|uv| {
                    let v = if manual {
                        velocity.bilerp(uv)
                    } else {
                        velocity.sample(uv)
                    };
                    let coord = uv - dt * v.xy() * velocity_texel;
                    let result = if manual {
                        source.bilerp(coord)
                    } else {
                        source.sample(coord)
                    };
                    result * decay
                });
            }
            Pass::Curl { velocity } => target.fill(|uv| {
                let l = velocity.sample(uv - dx).y;
                let r = velocity.sample(uv + dx).y;
                let t = velocity.sample(uv + dy).x;
                let b = velocity.sample(uv - dy).x;
                Vec4::new(0.5 * ((t - b) - (r - l)), 0.0, 0.0, 1.0)
            }),
            Pass::Vorticity {
                velocity,
                curl,
                strength,
                dt,
            } => target.fill(|uv| {
                let l = curl.sample(uv - dx).x;
                let r = curl.sample(uv + dx).x;
                let t = curl.sample(uv + dy).x;
                let b = curl.sample(uv - dy).x;
                let c = curl.sample(uv).x;
                let mut force = 0.5 * vec2(t.abs() - b.abs(), r.abs() - l.abs());
                force /= force.length() + 0.0001;
                force *= strength * c;
                force.x = -force.x;
                let v = (velocity.sample(uv).xy() + force * dt)
                    .clamp(Vec2::splat(-VELOCITY_LIMIT), Vec2::splat(VELOCITY_LIMIT));
                Vec4::new(v.x, v.y, 0.0, 1.0)
            }),
            Pass::Divergence { velocity } => target.fill(|uv| {
                let c = velocity.sample(uv).xy();
                let mut l = velocity.sample(uv - dx).x;
                let mut r = velocity.sample(uv + dx).x;
                let mut t = velocity.sample(uv + dy).y;
                let mut b = velocity.sample(uv - dy).y;
                if uv.x - dx.x < 0.0 {
                    l = -c.x;
                }
                if uv.x + dx.x > 1.0 {
                    r = -c.x;
                }
                if uv.y + dy.y > 1.0 {
                    t = -c.y;
                }
                if uv.y - dy.y < 0.0 {
                    b = -c.y;
                }
                Vec4::new(0.5 * (r - l + t - b), 0.0, 0.0, 1.0)
            }),
            Pass::Clear { source, value } => target.fill(|uv| value * source.sample(uv)),
            Pass::Pressure {
                pressure,
                divergence,
            } => target.fill(|uv| {
                let l = pressure.sample(uv - dx).x;
                let r = pressure.sample(uv + dx).x;
                let t = pressure.sample(uv + dy).x;
                let b = pressure.sample(uv - dy).x;
                let div = divergence.sample(uv).x;
                Vec4::new((l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0)
            }),
            Pass::GradientSubtract { pressure, velocity } => target.fill(|uv| {
                let l = pressure.sample(uv - dx).x;
                let r = pressure.sample(uv + dx).x;
                let t = pressure.sample(uv + dy).x;
                let b = pressure.sample(uv - dy).x;
                let v = velocity.sample(uv).xy() - 0.5 * vec2(r - l, t - b);
                Vec4::new(v.x, v.y, 0.0, 1.0)
            }),
            Pass::Splat {
                source,
                point,
                value,
                radius,
                aspect,
            } => target.fill(|uv| {
                let mut p = uv - point;
                p.x *= aspect;
                let falloff = 1.0 - smoothstep(0.0, radius, p.length());
                source.sample(uv) + (falloff * value).extend(0.0)
            }),
        }
    }

    fn present(&mut self, dye: &CpuField, display: &Display) {
        let size = self.surface.max(UVec2::ONE);
        let texel = Vec2::ONE / size.as_vec2();
        let (width, height) = (size.x as usize, size.y as usize);
        self.render_buffer.resize(width * height * 4, 0);
        self.render_buffer
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(row, pixels)| {
                // buffer rows run top to bottom, texture rows bottom to top
                let v = 1.0 - (row as f32 + 0.5) * texel.y;
                for (x, pixel) in pixels.chunks_exact_mut(4).enumerate() {
                    let uv = vec2((x as f32 + 0.5) * texel.x, v);
                    let rgba = shade(dye, uv, texel, display);
                    for (out, c) in pixel.iter_mut().zip(rgba.to_array()) {
                        *out = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                }
            });
        self.frame_size = size;
        self.frames_presented += 1;
    }
}

fn shade(dye: &CpuField, uv: Vec2, texel: Vec2, display: &Display) -> Vec4 {
    let mut c = dye.sample(uv).xyz();
    if display.shading {
        let lc = dye.sample(uv - vec2(texel.x, 0.0)).xyz();
        let rc = dye.sample(uv + vec2(texel.x, 0.0)).xyz();
        let tc = dye.sample(uv + vec2(0.0, texel.y)).xyz();
        let bc = dye.sample(uv - vec2(0.0, texel.y)).xyz();
        let dx = rc.length() - lc.length();
        let dy = tc.length() - bc.length();
        let n = vec3(dx, dy, texel.length()).normalize();
        let diffuse = (n.dot(Vec3::Z) + 0.7).clamp(0.7, 1.0);
        c *= diffuse;
    }
    let a = c.max_element();
    if display.transparent {
        c.extend(a)
    } else {
        (c + display.back_color * (1.0 - a)).extend(1.0)
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
