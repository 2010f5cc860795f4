//! WebGL2 backend: every pass is a full-screen triangle into a field's
//! framebuffer.

mod program;
pub mod shaders;
mod target;

use anyhow::{anyhow, Context, Result};
use glam::{uvec2, UVec2};
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, WebGl2RenderingContext as GL, WebGlShader, WebGlVertexArrayObject};

use crate::backend::{Backend, Display, Pass};
use crate::field::{FieldFormat, GridField, TexelStorage, TextureSupport};
use program::{
    compile_shader, AdvectionUniforms, ClearUniforms, DisplayUniforms, GradientUniforms, Material,
    PressureUniforms, SplatUniforms, StencilUniforms, VorticityUniforms,
};
use shaders::{BYTE_STORAGE, MANUAL_FILTERING, SHADING};
pub(crate) use target::js_error;
pub use target::GlField;
use target::FormatTable;

struct Programs {
    advection: Material<AdvectionUniforms>,
    curl: Material<StencilUniforms>,
    vorticity: Material<VorticityUniforms>,
    divergence: Material<StencilUniforms>,
    clear: Material<ClearUniforms>,
    pressure: Material<PressureUniforms>,
    gradient_subtract: Material<GradientUniforms>,
    splat: Material<SplatUniforms>,
    display: Material<DisplayUniforms>,
    shaded_display: Material<DisplayUniforms>,
}

impl Programs {
    fn new(gl: &GL, base: &WebGlShader, blit: &WebGlShader, support: TextureSupport) -> Result<Self> {
        let mut keywords = Vec::new();
        if support.storage == TexelStorage::UnsignedByte {
            keywords.push(BYTE_STORAGE);
        }
        let mut advection_keywords = keywords.clone();
        if support.manual_filtering() {
            advection_keywords.push(MANUAL_FILTERING);
        }
        let mut shaded_keywords = keywords.clone();
        shaded_keywords.push(SHADING);
        let keywords = keywords.as_slice();
        Ok(Self {
            advection: Material::new(
                gl,
                "advection",
                blit,
                shaders::ADVECTION,
                &advection_keywords,
                AdvectionUniforms::locate,
            )?,
            curl: Material::new(gl, "curl", base, shaders::CURL, keywords, StencilUniforms::locate)?,
            vorticity: Material::new(gl, "vorticity", base, shaders::VORTICITY, keywords, VorticityUniforms::locate)?,
            divergence: Material::new(gl, "divergence", base, shaders::DIVERGENCE, keywords, StencilUniforms::locate)?,
            clear: Material::new(gl, "clear", blit, shaders::CLEAR, keywords, ClearUniforms::locate)?,
            pressure: Material::new(gl, "pressure", base, shaders::PRESSURE, keywords, PressureUniforms::locate)?,
            gradient_subtract: Material::new(
                gl,
                "gradient subtract",
                base,
                shaders::GRADIENT_SUBTRACT,
                keywords,
                GradientUniforms::locate,
            )?,
            splat: Material::new(gl, "splat", blit, shaders::SPLAT, keywords, SplatUniforms::locate)?,
            display: Material::new(gl, "display", blit, shaders::DISPLAY, keywords, DisplayUniforms::locate)?,
            shaded_display: Material::new(
                gl,
                "shaded display",
                base,
                shaders::DISPLAY,
                &shaded_keywords,
                DisplayUniforms::locate,
            )?,
        })
    }

    fn delete(&self, gl: &GL) {
        self.advection.delete(gl);
        self.curl.delete(gl);
        self.vorticity.delete(gl);
        self.divergence.delete(gl);
        self.clear.delete(gl);
        self.pressure.delete(gl);
        self.gradient_subtract.delete(gl);
        self.splat.delete(gl);
        self.display.delete(gl);
        self.shaded_display.delete(gl);
    }
}

pub struct WebGlBackend {
    gl: GL,
    canvas: HtmlCanvasElement,
    support: TextureSupport,
    formats: FormatTable,
    vao: WebGlVertexArrayObject,
    programs: Programs,
}

impl WebGlBackend {
    /// Creates a WebGL2 context on `canvas` and compiles every program.
    pub fn new(canvas: &HtmlCanvasElement) -> Result<Self> {
        let options = js_sys::Object::new();
        for (key, value) in [
            ("alpha", true),
            ("depth", false),
            ("stencil", false),
            ("antialias", false),
            ("preserveDrawingBuffer", false),
        ] {
            js_sys::Reflect::set(&options, &key.into(), &value.into()).map_err(js_error)?;
        }
        let gl = canvas
            .get_context_with_context_options("webgl2", &options)
            .map_err(js_error)?
            .context("WebGL2 is not available")?
            .dyn_into::<GL>()
            .map_err(|_| anyhow!("context is not a WebGL2 context"))?;

        let (support, formats) = target::detect(&gl);

        let base = compile_shader(&gl, GL::VERTEX_SHADER, &shaders::source(shaders::BASE_VERTEX, &[]))
            .context("base vertex shader")?;
        let blit = compile_shader(&gl, GL::VERTEX_SHADER, &shaders::source(shaders::BLIT_VERTEX, &[]))
            .context("blit vertex shader")?;
        let programs = Programs::new(&gl, &base, &blit, support);
        gl.delete_shader(Some(&base));
        gl.delete_shader(Some(&blit));
        let programs = programs?;

        // positions come from gl_VertexID, the triangle needs no buffers
        let vao = gl.create_vertex_array().context("failed to create vertex array")?;
        gl.bind_vertex_array(Some(&vao));
        gl.disable(GL::BLEND);

        log::debug!("WebGL2 backend ready: {support:?}");
        Ok(Self {
            gl,
            canvas: canvas.clone(),
            support,
            formats,
            vao,
            programs,
        })
    }

    fn draw(&self, target: &GlField) {
        target.bind_target(&self.gl);
        self.gl.draw_arrays(GL::TRIANGLES, 0, 3);
    }
}

impl Backend for WebGlBackend {
    type Field = GlField;

    fn texture_support(&self) -> TextureSupport {
        self.support
    }

    /// Matches the drawing buffer to the canvas' CSS size times the device
    /// pixel ratio.
    fn surface_size(&mut self) -> UVec2 {
        let ratio = web_sys::window().map_or(1.0, |w| w.device_pixel_ratio());
        let width = (f64::from(self.canvas.client_width()) * ratio).floor().max(1.0) as u32;
        let height = (f64::from(self.canvas.client_height()) * ratio).floor().max(1.0) as u32;
        if self.canvas.width() != width || self.canvas.height() != height {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
        }
        uvec2(width, height)
    }

    fn create_field(&mut self, size: UVec2, format: FieldFormat) -> Result<GlField> {
        GlField::new(
            &self.gl,
            size,
            self.formats.get(format),
            self.support.filtering,
            self.support.packs(format),
        )
    }

    fn release_field(&mut self, field: GlField) {
        field.delete(&self.gl);
    }

    #[allow(clippy::too_many_lines)]
    fn run(&mut self, pass: Pass<'_, GlField>, target: &mut GlField) {
        log::trace!("{} pass into {}", pass.name(), target.size());
        let gl = &self.gl;
        let programs = &self.programs;
        let texel = target.texel_size();

        match pass {
            Pass::Advection {
                velocity,
                source,
                dt,
                dissipation,
            } => {
                let u = programs.advection.bind(gl);
                let velocity_texel = velocity.texel_size();
                gl.uniform2f(Some(&u.texel_size), velocity_texel.x, velocity_texel.y);
                if let Some(location) = &u.dye_texel_size {
                    let source_texel = source.texel_size();
                    gl.uniform2f(Some(location), source_texel.x, source_texel.y);
                }
                gl.uniform1i(Some(&u.velocity), velocity.attach(gl, 0));
                gl.uniform1i(Some(&u.source), source.attach(gl, 1));
                gl.uniform1f(Some(&u.dt), dt);
                gl.uniform1f(Some(&u.dissipation), dissipation);
                if let Some(location) = &u.source_packed {
                    gl.uniform1i(Some(location), i32::from(source.packed()));
                }
            }
            Pass::Curl { velocity } => {
                let u = programs.curl.bind(gl);
                gl.uniform2f(Some(&u.texel_size), texel.x, texel.y);
                gl.uniform1i(Some(&u.velocity), velocity.attach(gl, 0));
            }
            Pass::Vorticity {
                velocity,
                curl,
                strength,
                dt,
            } => {
                let u = programs.vorticity.bind(gl);
                gl.uniform2f(Some(&u.texel_size), texel.x, texel.y);
                gl.uniform1i(Some(&u.velocity), velocity.attach(gl, 0));
                gl.uniform1i(Some(&u.curl), curl.attach(gl, 1));
                gl.uniform1f(Some(&u.strength), strength);
                gl.uniform1f(Some(&u.dt), dt);
            }
            Pass::Divergence { velocity } => {
                let u = programs.divergence.bind(gl);
                gl.uniform2f(Some(&u.texel_size), texel.x, texel.y);
                gl.uniform1i(Some(&u.velocity), velocity.attach(gl, 0));
            }
            Pass::Clear { source, value } => {
                let u = programs.clear.bind(gl);
                gl.uniform1i(Some(&u.source), source.attach(gl, 0));
                gl.uniform1f(Some(&u.value), value);
            }
            Pass::Pressure {
                pressure,
                divergence,
            } => {
                let u = programs.pressure.bind(gl);
                gl.uniform2f(Some(&u.texel_size), texel.x, texel.y);
                gl.uniform1i(Some(&u.divergence), divergence.attach(gl, 0));
                gl.uniform1i(Some(&u.pressure), pressure.attach(gl, 1));
            }
            Pass::GradientSubtract { pressure, velocity } => {
                let u = programs.gradient_subtract.bind(gl);
                gl.uniform2f(Some(&u.texel_size), texel.x, texel.y);
                gl.uniform1i(Some(&u.pressure), pressure.attach(gl, 0));
                gl.uniform1i(Some(&u.velocity), velocity.attach(gl, 1));
            }
            Pass::Splat {
                source,
                point,
                value,
                radius,
                aspect,
            } => {
                let u = programs.splat.bind(gl);
                gl.uniform1i(Some(&u.source), source.attach(gl, 0));
                gl.uniform1f(Some(&u.aspect_ratio), aspect);
                gl.uniform2f(Some(&u.point), point.x, point.y);
                gl.uniform3f(Some(&u.color), value.x, value.y, value.z);
                gl.uniform1f(Some(&u.radius), radius);
                if let Some(location) = &u.source_packed {
                    gl.uniform1i(Some(location), i32::from(source.packed()));
                }
            }
        }
        self.draw(target);
    }

    #[allow(clippy::cast_possible_wrap)]
    fn present(&mut self, dye: &GlField, display: &Display) {
        let gl = &self.gl;
        let (width, height) = (self.canvas.width(), self.canvas.height());
        gl.bind_framebuffer(GL::FRAMEBUFFER, None);
        gl.viewport(0, 0, width as i32, height as i32);
        if display.transparent {
            gl.clear_color(0.0, 0.0, 0.0, 0.0);
        } else {
            let c = display.back_color;
            gl.clear_color(c.x, c.y, c.z, 1.0);
        }
        gl.clear(GL::COLOR_BUFFER_BIT);

        let material = if display.shading {
            &self.programs.shaded_display
        } else {
            &self.programs.display
        };
        let u = material.bind(gl);
        gl.uniform1i(Some(&u.dye), dye.attach(gl, 0));
        if let Some(location) = &u.texel_size {
            gl.uniform2f(Some(location), 1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
        }
        gl.blend_func(GL::ONE, GL::ONE_MINUS_SRC_ALPHA);
        gl.enable(GL::BLEND);
        gl.draw_arrays(GL::TRIANGLES, 0, 3);
        gl.disable(GL::BLEND);
    }
}

impl Drop for WebGlBackend {
    fn drop(&mut self) {
        self.programs.delete(&self.gl);
        self.gl.delete_vertex_array(Some(&self.vao));
    }
}
