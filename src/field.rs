use glam::{UVec2, Vec2};

/// Largest magnitude a signed field keeps on 8 bit storage.
pub const PACKED_RANGE: f32 = 4096.0;
/// Fixed point steps on either side of zero, two bytes per component.
pub const PACKED_STEPS: f32 = 32767.0;

/// Number of channels a field carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldFormat {
    /// Scalar fields: divergence, curl, pressure.
    R,
    /// Velocity.
    Rg,
    /// Dye.
    Rgba,
}

impl FieldFormat {
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::R => 1,
            Self::Rg => 2,
            Self::Rgba => 4,
        }
    }

    /// Next wider format, used when a narrow format is not renderable.
    #[must_use]
    pub fn widen(self) -> Option<Self> {
        match self {
            Self::R => Some(Self::Rg),
            Self::Rg => Some(Self::Rgba),
            Self::Rgba => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexelStorage {
    HalfFloat,
    UnsignedByte,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filtering {
    Linear,
    Nearest,
}

/// What the device can store and sample, detected once per backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSupport {
    pub storage: TexelStorage,
    pub filtering: Filtering,
}

impl TextureSupport {
    #[must_use]
    pub const fn full() -> Self {
        Self {
            storage: TexelStorage::HalfFloat,
            filtering: Filtering::Linear,
        }
    }

    /// Reduced precision path for devices without renderable float textures.
    #[must_use]
    pub const fn byte_fallback() -> Self {
        Self {
            storage: TexelStorage::UnsignedByte,
            filtering: Filtering::Nearest,
        }
    }

    /// Advection interpolates by hand when the sampler cannot.
    #[must_use]
    pub fn manual_filtering(self) -> bool {
        self.filtering == Filtering::Nearest
    }

    /// Whether fields of `format` store signed components as 16 bit fixed
    /// point split over two 8 bit channels. Dye is the only RGBA field and
    /// the only unsigned one, it keeps one raw byte per channel.
    #[must_use]
    pub fn packs(self, format: FieldFormat) -> bool {
        self.storage == TexelStorage::UnsignedByte && format != FieldFormat::Rgba
    }
}

/// The value a packed component reads back after being written: clamped to
/// `±PACKED_RANGE` and truncated toward zero so decaying flow comes to rest.
#[must_use]
pub fn quantize_packed(value: f32) -> f32 {
    let scaled = (value / PACKED_RANGE).clamp(-1.0, 1.0) * PACKED_STEPS;
    // slack keeps values already on the lattice where they are
    let steps = (scaled.abs() + 1e-3).floor().copysign(scaled);
    steps / PACKED_STEPS * PACKED_RANGE
}

/// A 2D sampled field living on a backend.
pub trait GridField {
    fn size(&self) -> UVec2;

    fn texel_size(&self) -> Vec2 {
        Vec2::ONE / self.size().as_vec2()
    }
}

/// Read/write pair of identically shaped fields.
///
/// Passes read `read` and render into `write`; `swap` then makes the result
/// current. Slots are only ever borrowed for the duration of one pass.
#[derive(Debug)]
pub struct DoubleField<F> {
    pub read: F,
    pub write: F,
}

impl<F> DoubleField<F> {
    pub fn new(read: F, write: F) -> Self {
        Self { read, write }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn into_inner(self) -> (F, F) {
        (self.read, self.write)
    }
}

impl<F: GridField> DoubleField<F> {
    pub fn size(&self) -> UVec2 {
        self.read.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_twice_restores_slots() {
        let mut pair = DoubleField::new("first", "second");
        pair.swap();
        assert_eq!((pair.read, pair.write), ("second", "first"));
        pair.swap();
        assert_eq!((pair.read, pair.write), ("first", "second"));
    }

    #[test]
    fn widening_ends_at_rgba() {
        assert_eq!(FieldFormat::R.widen(), Some(FieldFormat::Rg));
        assert_eq!(FieldFormat::Rg.widen(), Some(FieldFormat::Rgba));
        assert_eq!(FieldFormat::Rgba.widen(), None);
        assert_eq!(FieldFormat::Rgba.channels(), 4);
    }

    #[test]
    fn fallback_requires_manual_filtering() {
        assert!(TextureSupport::byte_fallback().manual_filtering());
        assert!(!TextureSupport::full().manual_filtering());
    }

    #[test]
    fn only_signed_fields_pack_on_byte_storage() {
        let bytes = TextureSupport::byte_fallback();
        assert!(bytes.packs(FieldFormat::R));
        assert!(bytes.packs(FieldFormat::Rg));
        assert!(!bytes.packs(FieldFormat::Rgba));
        assert!(!TextureSupport::full().packs(FieldFormat::Rg));
    }

    #[test]
    fn packed_values_keep_sign_and_truncate_toward_zero() {
        let step = PACKED_RANGE / PACKED_STEPS;
        assert_eq!(quantize_packed(0.0), 0.0);
        assert!((quantize_packed(-87.5) + 87.5).abs() < step);
        assert!(quantize_packed(-87.5) >= -87.5);
        assert!(quantize_packed(87.5) <= 87.5);
        assert_eq!(quantize_packed(0.9 * step), 0.0);
        assert_eq!(quantize_packed(-0.9 * step), 0.0);
        assert_eq!(quantize_packed(1e6), PACKED_RANGE);
        assert_eq!(quantize_packed(-1e6), -PACKED_RANGE);
        // a stored value survives being written again
        for v in [3.0, -41.25, 999.0] {
            let once = quantize_packed(v);
            assert_eq!(quantize_packed(once), once);
        }
    }
}
