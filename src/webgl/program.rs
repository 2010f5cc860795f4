use anyhow::{anyhow, bail, Context, Result};
use web_sys::{WebGl2RenderingContext as GL, WebGlProgram, WebGlShader, WebGlUniformLocation};

use super::shaders;

pub fn compile_shader(gl: &GL, kind: u32, source: &str) -> Result<WebGlShader> {
    let shader = gl.create_shader(kind).context("failed to create shader object")?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    if gl
        .get_shader_parameter(&shader, GL::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(shader)
    } else {
        let log = gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| "unknown error".into());
        gl.delete_shader(Some(&shader));
        bail!("shader compilation failed: {log}")
    }
}

pub fn link_program(gl: &GL, vertex: &WebGlShader, fragment: &WebGlShader) -> Result<WebGlProgram> {
    let program = gl.create_program().context("failed to create program object")?;
    gl.attach_shader(&program, vertex);
    gl.attach_shader(&program, fragment);
    gl.link_program(&program);

    if gl
        .get_program_parameter(&program, GL::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(program)
    } else {
        let log = gl
            .get_program_info_log(&program)
            .unwrap_or_else(|| "unknown error".into());
        gl.delete_program(Some(&program));
        bail!("program linking failed: {log}")
    }
}

/// Looks up uniforms of one linked program.
pub struct Locator<'a> {
    gl: &'a GL,
    program: &'a WebGlProgram,
    name: &'a str,
}

impl Locator<'_> {
    pub fn get(&self, uniform: &str) -> Result<WebGlUniformLocation> {
        self.optional(uniform)
            .ok_or_else(|| anyhow!("{} program has no active uniform `{uniform}`", self.name))
    }

    /// For uniforms compiled out by a keyword.
    pub fn optional(&self, uniform: &str) -> Option<WebGlUniformLocation> {
        self.gl.get_uniform_location(self.program, uniform)
    }
}

/// A linked program together with its uniform locations.
pub struct Material<U> {
    program: WebGlProgram,
    pub uniforms: U,
}

impl<U> Material<U> {
    pub fn new(
        gl: &GL,
        name: &str,
        vertex: &WebGlShader,
        fragment: &str,
        keywords: &[&str],
        locate: impl FnOnce(&Locator) -> Result<U>,
    ) -> Result<Self> {
        let fragment = compile_shader(gl, GL::FRAGMENT_SHADER, &shaders::fragment(fragment, keywords))
            .with_context(|| format!("{name} fragment shader"))?;
        let program = link_program(gl, vertex, &fragment);
        // the program keeps what it needs once linked
        gl.delete_shader(Some(&fragment));
        let program = program.with_context(|| format!("{name} program"))?;
        let locator = Locator {
            gl,
            program: &program,
            name,
        };
        match locate(&locator) {
            Ok(uniforms) => Ok(Self { program, uniforms }),
            Err(err) => {
                gl.delete_program(Some(&program));
                Err(err)
            }
        }
    }

    pub fn bind(&self, gl: &GL) -> &U {
        gl.use_program(Some(&self.program));
        &self.uniforms
    }

    pub fn delete(&self, gl: &GL) {
        gl.delete_program(Some(&self.program));
    }
}

pub struct AdvectionUniforms {
    pub velocity: WebGlUniformLocation,
    pub source: WebGlUniformLocation,
    pub texel_size: WebGlUniformLocation,
    pub dye_texel_size: Option<WebGlUniformLocation>,
    pub dt: WebGlUniformLocation,
    pub dissipation: WebGlUniformLocation,
    pub source_packed: Option<WebGlUniformLocation>,
}

impl AdvectionUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            velocity: l.get("velocity")?,
            source: l.get("source")?,
            texel_size: l.get("texel_size")?,
            dye_texel_size: l.optional("dye_texel_size"),
            dt: l.get("dt")?,
            dissipation: l.get("dissipation")?,
            source_packed: l.optional("source_packed"),
        })
    }
}

/// Passes that read velocity through the neighbor stencil only.
pub struct StencilUniforms {
    pub texel_size: WebGlUniformLocation,
    pub velocity: WebGlUniformLocation,
}

impl StencilUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            texel_size: l.get("texel_size")?,
            velocity: l.get("velocity")?,
        })
    }
}

pub struct VorticityUniforms {
    pub texel_size: WebGlUniformLocation,
    pub velocity: WebGlUniformLocation,
    pub curl: WebGlUniformLocation,
    pub strength: WebGlUniformLocation,
    pub dt: WebGlUniformLocation,
}

impl VorticityUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            texel_size: l.get("texel_size")?,
            velocity: l.get("velocity")?,
            curl: l.get("curl")?,
            strength: l.get("strength")?,
            dt: l.get("dt")?,
        })
    }
}

pub struct ClearUniforms {
    pub source: WebGlUniformLocation,
    pub value: WebGlUniformLocation,
}

impl ClearUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            source: l.get("source")?,
            value: l.get("value")?,
        })
    }
}

pub struct PressureUniforms {
    pub texel_size: WebGlUniformLocation,
    pub pressure: WebGlUniformLocation,
    pub divergence: WebGlUniformLocation,
}

impl PressureUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            texel_size: l.get("texel_size")?,
            pressure: l.get("pressure")?,
            divergence: l.get("divergence")?,
        })
    }
}

pub struct GradientUniforms {
    pub texel_size: WebGlUniformLocation,
    pub pressure: WebGlUniformLocation,
    pub velocity: WebGlUniformLocation,
}

impl GradientUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            texel_size: l.get("texel_size")?,
            pressure: l.get("pressure")?,
            velocity: l.get("velocity")?,
        })
    }
}

pub struct SplatUniforms {
    pub source: WebGlUniformLocation,
    pub aspect_ratio: WebGlUniformLocation,
    pub color: WebGlUniformLocation,
    pub point: WebGlUniformLocation,
    pub radius: WebGlUniformLocation,
    pub source_packed: Option<WebGlUniformLocation>,
}

impl SplatUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            source: l.get("source")?,
            aspect_ratio: l.get("aspect_ratio")?,
            color: l.get("color")?,
            point: l.get("point")?,
            radius: l.get("radius")?,
            source_packed: l.optional("source_packed"),
        })
    }
}

pub struct DisplayUniforms {
    pub dye: WebGlUniformLocation,
    pub texel_size: Option<WebGlUniformLocation>,
}

impl DisplayUniforms {
    pub fn locate(l: &Locator) -> Result<Self> {
        Ok(Self {
            dye: l.get("dye")?,
            texel_size: l.optional("texel_size"),
        })
    }
}
