//! GLSL ES 3.00 sources. Bodies carry no `#version` line so that keyword
//! defines can be inserted ahead of them by [`source`].

use crate::field::PACKED_RANGE;

pub const SHADING: &str = "SHADING";
pub const MANUAL_FILTERING: &str = "MANUAL_FILTERING";
pub const BYTE_STORAGE: &str = "BYTE_STORAGE";

#[must_use]
pub fn source(body: &str, keywords: &[&str]) -> String {
    let mut out = header(keywords);
    out.push_str(body);
    out
}

/// Like [`source`], with [`CODEC`] between the keywords and the body.
#[must_use]
pub fn fragment(body: &str, keywords: &[&str]) -> String {
    let mut out = header(keywords);
    out.push_str(&format!("#define SIGNED_RANGE {PACKED_RANGE:.1}\n"));
    out.push_str(CODEC);
    out.push_str(body);
    out
}

fn header(keywords: &[&str]) -> String {
    let mut out = String::from("#version 300 es\n");
    for keyword in keywords {
        out.push_str("#define ");
        out.push_str(keyword);
        out.push('\n');
    }
    out
}

/// Reads and writes of field texels. Under `BYTE_STORAGE` signed fields hold
/// two components, each as 16 bit fixed point in a pair of bytes, truncated
/// toward zero. Unpacked fields pass through unchanged.
pub const CODEC: &str = r#"
precision highp float;

#ifdef BYTE_STORAGE
vec2 pack_component(float value) {
    float scaled = clamp(value / SIGNED_RANGE, -1.0, 1.0) * 32767.0;
    float q = sign(scaled) * floor(abs(scaled) + 0.001) + 32768.0;
    float high = floor(q / 256.0);
    return vec2(high, q - high * 256.0) / 255.0;
}

float unpack_component(vec2 bytes) {
    vec2 b = floor(bytes * 255.0 + 0.5);
    return (b.x * 256.0 + b.y - 32768.0) / 32767.0 * SIGNED_RANGE;
}

vec4 decode(vec4 texel, bool packed) {
    return packed ? vec4(unpack_component(texel.rg), unpack_component(texel.ba), 0.0, 0.0) : texel;
}

vec4 encode(vec4 value, bool packed) {
    return packed ? vec4(pack_component(value.x), pack_component(value.y)) : value;
}
#else
vec4 decode(vec4 texel, bool packed) {
    return texel;
}

vec4 encode(vec4 value, bool packed) {
    return value;
}
#endif
"#;

/// Full-screen triangle with the four neighbor coordinates precomputed.
pub const BASE_VERTEX: &str = r#"
precision highp float;

uniform vec2 texel_size;

out vec2 v_uv;
out vec2 v_l;
out vec2 v_r;
out vec2 v_t;
out vec2 v_b;

void main() {
    vec2 position = vec2(float((gl_VertexID & 1) << 2) - 1.0, float((gl_VertexID & 2) << 1) - 1.0);
    v_uv = position * 0.5 + 0.5;
    v_l = v_uv - vec2(texel_size.x, 0.0);
    v_r = v_uv + vec2(texel_size.x, 0.0);
    v_t = v_uv + vec2(0.0, texel_size.y);
    v_b = v_uv - vec2(0.0, texel_size.y);
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

/// Full-screen triangle for passes that only read their own texel.
pub const BLIT_VERTEX: &str = r#"
precision highp float;

out vec2 v_uv;

void main() {
    vec2 position = vec2(float((gl_VertexID & 1) << 2) - 1.0, float((gl_VertexID & 2) << 1) - 1.0);
    v_uv = position * 0.5 + 0.5;
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

pub const ADVECTION: &str = r#"
precision highp float;
precision highp sampler2D;

in vec2 v_uv;
out vec4 frag_color;

uniform sampler2D velocity;
uniform sampler2D source;
uniform vec2 texel_size;
uniform vec2 dye_texel_size;
uniform float dt;
uniform float dissipation;
uniform bool source_packed;

// taps are decoded before blending, packed bytes do not interpolate
vec4 bilerp(sampler2D sam, vec2 uv, vec2 tsize, bool packed) {
    vec2 st = uv / tsize - 0.5;
    vec2 iuv = floor(st);
    vec2 fuv = fract(st);
    vec4 a = decode(texture(sam, (iuv + vec2(0.5, 0.5)) * tsize), packed);
    vec4 b = decode(texture(sam, (iuv + vec2(1.5, 0.5)) * tsize), packed);
    vec4 c = decode(texture(sam, (iuv + vec2(0.5, 1.5)) * tsize), packed);
    vec4 d = decode(texture(sam, (iuv + vec2(1.5, 1.5)) * tsize), packed);
    return mix(mix(a, b, fuv.x), mix(c, d, fuv.x), fuv.y);
}

void main() {
#ifdef MANUAL_FILTERING
    vec2 coord = v_uv - dt * bilerp(velocity, v_uv, texel_size, true).xy * texel_size;
    vec4 result = bilerp(source, coord, dye_texel_size, source_packed);
#else
    vec2 coord = v_uv - dt * decode(texture(velocity, v_uv), true).xy * texel_size;
    vec4 result = decode(texture(source, coord), source_packed);
#endif
    float decay = clamp(1.0 - dissipation * dt, 0.0, 1.0);
    frag_color = encode(result * decay, source_packed);
}
"#;

pub const CURL: &str = r#"
precision mediump float;
precision mediump sampler2D;

in highp vec2 v_uv;
in highp vec2 v_l;
in highp vec2 v_r;
in highp vec2 v_t;
in highp vec2 v_b;
out vec4 frag_color;

uniform sampler2D velocity;

void main() {
    float l = decode(texture(velocity, v_l), true).y;
    float r = decode(texture(velocity, v_r), true).y;
    float t = decode(texture(velocity, v_t), true).x;
    float b = decode(texture(velocity, v_b), true).x;
    float vorticity = (t - b) - (r - l);
    frag_color = encode(vec4(0.5 * vorticity, 0.0, 0.0, 1.0), true);
}
"#;

pub const VORTICITY: &str = r#"
precision highp float;
precision highp sampler2D;

in vec2 v_uv;
in vec2 v_l;
in vec2 v_r;
in vec2 v_t;
in vec2 v_b;
out vec4 frag_color;

uniform sampler2D velocity;
uniform sampler2D curl;
uniform float strength;
uniform float dt;

void main() {
    float l = decode(texture(curl, v_l), true).x;
    float r = decode(texture(curl, v_r), true).x;
    float t = decode(texture(curl, v_t), true).x;
    float b = decode(texture(curl, v_b), true).x;
    float c = decode(texture(curl, v_uv), true).x;

    vec2 force = 0.5 * vec2(abs(t) - abs(b), abs(r) - abs(l));
    force /= length(force) + 0.0001;
    force *= strength * c;
    force.x *= -1.0;

    vec2 v = decode(texture(velocity, v_uv), true).xy + force * dt;
    v = clamp(v, -1000.0, 1000.0);
    frag_color = encode(vec4(v, 0.0, 1.0), true);
}
"#;

pub const DIVERGENCE: &str = r#"
precision mediump float;
precision mediump sampler2D;

in highp vec2 v_uv;
in highp vec2 v_l;
in highp vec2 v_r;
in highp vec2 v_t;
in highp vec2 v_b;
out vec4 frag_color;

uniform sampler2D velocity;

void main() {
    float l = decode(texture(velocity, v_l), true).x;
    float r = decode(texture(velocity, v_r), true).x;
    float t = decode(texture(velocity, v_t), true).y;
    float b = decode(texture(velocity, v_b), true).y;

    vec2 c = decode(texture(velocity, v_uv), true).xy;
    if (v_l.x < 0.0) { l = -c.x; }
    if (v_r.x > 1.0) { r = -c.x; }
    if (v_t.y > 1.0) { t = -c.y; }
    if (v_b.y < 0.0) { b = -c.y; }

    frag_color = encode(vec4(0.5 * (r - l + t - b), 0.0, 0.0, 1.0), true);
}
"#;

pub const CLEAR: &str = r#"
precision mediump float;
precision mediump sampler2D;

in highp vec2 v_uv;
out vec4 frag_color;

// only ever scales pressure
uniform sampler2D source;
uniform float value;

void main() {
    frag_color = encode(value * decode(texture(source, v_uv), true), true);
}
"#;

pub const PRESSURE: &str = r#"
precision mediump float;
precision mediump sampler2D;

in highp vec2 v_uv;
in highp vec2 v_l;
in highp vec2 v_r;
in highp vec2 v_t;
in highp vec2 v_b;
out vec4 frag_color;

uniform sampler2D pressure;
uniform sampler2D divergence;

void main() {
    float l = decode(texture(pressure, v_l), true).x;
    float r = decode(texture(pressure, v_r), true).x;
    float t = decode(texture(pressure, v_t), true).x;
    float b = decode(texture(pressure, v_b), true).x;
    float div = decode(texture(divergence, v_uv), true).x;
    frag_color = encode(vec4((l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0), true);
}
"#;

pub const GRADIENT_SUBTRACT: &str = r#"
precision mediump float;
precision mediump sampler2D;

in highp vec2 v_uv;
in highp vec2 v_l;
in highp vec2 v_r;
in highp vec2 v_t;
in highp vec2 v_b;
out vec4 frag_color;

uniform sampler2D pressure;
uniform sampler2D velocity;

void main() {
    float l = decode(texture(pressure, v_l), true).x;
    float r = decode(texture(pressure, v_r), true).x;
    float t = decode(texture(pressure, v_t), true).x;
    float b = decode(texture(pressure, v_b), true).x;
    vec2 v = decode(texture(velocity, v_uv), true).xy;
    v -= 0.5 * vec2(r - l, t - b);
    frag_color = encode(vec4(v, 0.0, 1.0), true);
}
"#;

pub const SPLAT: &str = r#"
precision highp float;
precision highp sampler2D;

in vec2 v_uv;
out vec4 frag_color;

uniform sampler2D source;
uniform float aspect_ratio;
uniform vec3 color;
uniform vec2 point;
uniform float radius;
uniform bool source_packed;

void main() {
    vec2 p = v_uv - point;
    p.x *= aspect_ratio;
    float falloff = 1.0 - smoothstep(0.0, radius, length(p));
    vec4 base = decode(texture(source, v_uv), source_packed);
    frag_color = encode(base + vec4(falloff * color, 0.0), source_packed);
}
"#;

/// Composites dye over the background. With `SHADING` the base vertex
/// shader must be used so that neighbor coordinates exist.
pub const DISPLAY: &str = r#"
precision highp float;
precision highp sampler2D;

in vec2 v_uv;
#ifdef SHADING
in vec2 v_l;
in vec2 v_r;
in vec2 v_t;
in vec2 v_b;
uniform vec2 texel_size;
#endif
out vec4 frag_color;

uniform sampler2D dye;

void main() {
    vec3 c = texture(dye, v_uv).rgb;
#ifdef SHADING
    vec3 lc = texture(dye, v_l).rgb;
    vec3 rc = texture(dye, v_r).rgb;
    vec3 tc = texture(dye, v_t).rgb;
    vec3 bc = texture(dye, v_b).rgb;

    float dx = length(rc) - length(lc);
    float dy = length(tc) - length(bc);

    vec3 n = normalize(vec3(dx, dy, length(texel_size)));
    vec3 l = vec3(0.0, 0.0, 1.0);

    float diffuse = clamp(dot(n, l) + 0.7, 0.7, 1.0);
    c *= diffuse;
#endif
    float a = max(c.r, max(c.g, c.b));
    frag_color = vec4(c, a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_line_precedes_keywords() {
        let out = source(DISPLAY, &[SHADING]);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("#version 300 es"));
        assert_eq!(lines.next(), Some("#define SHADING"));
        assert!(out.ends_with(DISPLAY));
    }

    #[test]
    fn keywordless_source_is_versioned_body() {
        assert_eq!(source(CLEAR, &[]), format!("#version 300 es\n{CLEAR}"));
    }

    #[test]
    fn fragments_get_the_codec_after_keywords() {
        let out = fragment(PRESSURE, &[BYTE_STORAGE]);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("#version 300 es"));
        assert_eq!(lines.next(), Some("#define BYTE_STORAGE"));
        assert_eq!(lines.next(), Some("#define SIGNED_RANGE 4096.0"));
        assert!(out.contains(CODEC));
        assert!(out.ends_with(PRESSURE));
    }

    #[test]
    fn every_field_write_goes_through_the_codec() {
        for body in [ADVECTION, CURL, VORTICITY, DIVERGENCE, CLEAR, PRESSURE, GRADIENT_SUBTRACT, SPLAT] {
            assert!(body.contains("frag_color = encode("), "{body}");
            assert!(!body.contains("= texture("), "{body}");
        }
    }
}
