use anyhow::{anyhow, Context, Result};
use glam::UVec2;
use wasm_bindgen::JsValue;
use web_sys::{WebGl2RenderingContext as GL, WebGlFramebuffer, WebGlTexture};

use crate::field::{FieldFormat, Filtering, GridField, TexelStorage, TextureSupport};

pub(crate) fn js_error(err: JsValue) -> anyhow::Error {
    anyhow!("{err:?}")
}

/// Internal format, format and component type for `texImage2D`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TexelFormat {
    pub internal_format: u32,
    pub format: u32,
    pub kind: u32,
}

impl TexelFormat {
    const fn half_float(format: FieldFormat) -> Self {
        let (internal_format, format) = match format {
            FieldFormat::R => (GL::R16F, GL::RED),
            FieldFormat::Rg => (GL::RG16F, GL::RG),
            FieldFormat::Rgba => (GL::RGBA16F, GL::RGBA),
        };
        Self {
            internal_format,
            format,
            kind: GL::HALF_FLOAT,
        }
    }

    const BYTE: Self = Self {
        internal_format: GL::RGBA8,
        format: GL::RGBA,
        kind: GL::UNSIGNED_BYTE,
    };
}

/// Storage actually used for each logical field format.
#[derive(Clone, Copy, Debug)]
pub struct FormatTable {
    r: TexelFormat,
    rg: TexelFormat,
    rgba: TexelFormat,
}

impl FormatTable {
    #[must_use]
    pub fn get(&self, format: FieldFormat) -> TexelFormat {
        match format {
            FieldFormat::R => self.r,
            FieldFormat::Rg => self.rg,
            FieldFormat::Rgba => self.rgba,
        }
    }

    const fn bytes() -> Self {
        Self {
            r: TexelFormat::BYTE,
            rg: TexelFormat::BYTE,
            rgba: TexelFormat::BYTE,
        }
    }
}

/// Probes float render target support once per context.
pub fn detect(gl: &GL) -> (TextureSupport, FormatTable) {
    let color_buffer_float = has_extension(gl, "EXT_color_buffer_float");
    let float_linear = has_extension(gl, "OES_texture_float_linear");

    if color_buffer_float {
        let widened = [FieldFormat::R, FieldFormat::Rg, FieldFormat::Rgba].map(|f| renderable(gl, f));
        if let [Some(r), Some(rg), Some(rgba)] = widened {
            let filtering = if float_linear {
                Filtering::Linear
            } else {
                log::info!("float textures cannot be filtered, advection will interpolate by hand");
                Filtering::Nearest
            };
            let support = TextureSupport {
                storage: TexelStorage::HalfFloat,
                filtering,
            };
            return (support, FormatTable { r, rg, rgba });
        }
    }

    log::warn!("half float render targets unavailable, falling back to 8 bit fields");
    (TextureSupport::byte_fallback(), FormatTable::bytes())
}

fn has_extension(gl: &GL, name: &str) -> bool {
    matches!(gl.get_extension(name), Ok(Some(_)))
}

/// First format, starting at `format` and widening, that can be rendered to.
fn renderable(gl: &GL, format: FieldFormat) -> Option<TexelFormat> {
    let mut candidate = Some(format);
    while let Some(format) = candidate {
        let texel = TexelFormat::half_float(format);
        if completes_framebuffer(gl, texel) {
            return Some(texel);
        }
        candidate = format.widen();
    }
    None
}

fn completes_framebuffer(gl: &GL, texel: TexelFormat) -> bool {
    let Ok(field) = GlField::new(gl, UVec2::splat(4), texel, Filtering::Nearest, false) else {
        return false;
    };
    let complete = gl.check_framebuffer_status(GL::FRAMEBUFFER) == GL::FRAMEBUFFER_COMPLETE;
    field.delete(gl);
    complete
}

/// A texture and the framebuffer that renders into it.
pub struct GlField {
    texture: WebGlTexture,
    framebuffer: WebGlFramebuffer,
    size: UVec2,
    packed: bool,
}

impl GridField for GlField {
    fn size(&self) -> UVec2 {
        self.size
    }
}

#[allow(clippy::cast_possible_wrap)]
impl GlField {
    /// Allocates and clears the texture to zero, in packed form when
    /// `packed`. Leaves its framebuffer bound.
    pub fn new(gl: &GL, size: UVec2, texel: TexelFormat, filtering: Filtering, packed: bool) -> Result<Self> {
        let filter = match filtering {
            Filtering::Linear => GL::LINEAR,
            Filtering::Nearest => GL::NEAREST,
        } as i32;

        gl.active_texture(GL::TEXTURE0);
        let texture = gl.create_texture().context("failed to create texture")?;
        gl.bind_texture(GL::TEXTURE_2D, Some(&texture));
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_MIN_FILTER, filter);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_MAG_FILTER, filter);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_WRAP_S, GL::CLAMP_TO_EDGE as i32);
        gl.tex_parameteri(GL::TEXTURE_2D, GL::TEXTURE_WRAP_T, GL::CLAMP_TO_EDGE as i32);
        let upload = gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            GL::TEXTURE_2D,
            0,
            texel.internal_format as i32,
            size.x as i32,
            size.y as i32,
            0,
            texel.format,
            texel.kind,
            None,
        );
        if let Err(err) = upload {
            gl.delete_texture(Some(&texture));
            return Err(js_error(err)).context("texture upload failed");
        }

        let Some(framebuffer) = gl.create_framebuffer() else {
            gl.delete_texture(Some(&texture));
            return Err(anyhow!("failed to create framebuffer"));
        };
        gl.bind_framebuffer(GL::FRAMEBUFFER, Some(&framebuffer));
        gl.framebuffer_texture_2d(GL::FRAMEBUFFER, GL::COLOR_ATTACHMENT0, GL::TEXTURE_2D, Some(&texture), 0);
        gl.viewport(0, 0, size.x as i32, size.y as i32);
        if packed {
            // bytes 0x80 0x00 per component
            let zero = 128.0 / 255.0;
            gl.clear_color(zero, 0.0, zero, 0.0);
        } else {
            gl.clear_color(0.0, 0.0, 0.0, 0.0);
        }
        gl.clear(GL::COLOR_BUFFER_BIT);

        Ok(Self {
            texture,
            framebuffer,
            size,
            packed,
        })
    }

    /// Whether texels hold packed signed components.
    #[must_use]
    pub fn packed(&self) -> bool {
        self.packed
    }

    /// Binds the texture to `unit` and returns the sampler value for it.
    pub fn attach(&self, gl: &GL, unit: u32) -> i32 {
        gl.active_texture(GL::TEXTURE0 + unit);
        gl.bind_texture(GL::TEXTURE_2D, Some(&self.texture));
        unit as i32
    }

    /// Makes this field the render target with a matching viewport.
    pub fn bind_target(&self, gl: &GL) {
        gl.bind_framebuffer(GL::FRAMEBUFFER, Some(&self.framebuffer));
        gl.viewport(0, 0, self.size.x as i32, self.size.y as i32);
    }

    pub fn delete(self, gl: &GL) {
        gl.delete_framebuffer(Some(&self.framebuffer));
        gl.delete_texture(Some(&self.texture));
    }
}
