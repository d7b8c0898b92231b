//! Packing parameters carried by the section-5 data representation.
//!
//! Every representation reconstructs a cell value from an unsigned integer
//! `v` as `(R + v·2^E) · 10^(-D)`. The parser folds `R`, `E` and `D` into a
//! [`PackingScale`] so the decoders only multiply and add.

/// Precomputed linear reconstruction `value = v * scale + offset` where
/// `scale = 2^E · 10^(-D)` and `offset = R · 10^(-D)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingScale {
    pub scale: f64,
    pub offset: f64,
}

impl PackingScale {
    pub fn new(reference: f32, binary_exp: i16, decimal_exp: i16) -> Self {
        let dec = (-(decimal_exp as f64) * std::f64::consts::LN_10).exp();
        Self {
            scale: dec * 2.0f64.powi(binary_exp as i32),
            offset: reference as f64 * dec,
        }
    }

    /// Identity scaling (used by tests and degenerate descriptors).
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }

    #[inline]
    pub fn apply(&self, v: f64) -> f32 {
        (v * self.scale + self.offset) as f32
    }
}

/// Template 5.0 — simple packing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePackingParams {
    pub scale: PackingScale,
    /// Bits per packed cell value; 0 encodes a constant field.
    pub nbits: u8,
    /// Type of original field values (0 = IEEE float, 1 = integer).
    pub field_value_type: u8,
}

/// Template 5.2 — complex packing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexPackingParams {
    pub simple: SimplePackingParams,
    pub group_split_method: u8,
    /// 0 = none, 1 = primary, 2 = primary + secondary.
    pub missing_value_mgmt: u8,
    pub primary_missing: u32,
    pub secondary_missing: u32,
    pub ngroups: u32,
    pub ref_group_width: u8,
    pub nbits_group_width: u8,
    pub ref_group_length: u32,
    pub incr_group_length: u8,
    pub last_group_length: u32,
    pub nbits_group_length: u8,
}

impl ComplexPackingParams {
    /// General group splitting is the only method implemented.
    pub fn is_general_group_split(&self) -> bool {
        self.group_split_method == 1
    }

    pub fn has_primary_missing(&self) -> bool {
        matches!(self.missing_value_mgmt, 1 | 2)
    }

    pub fn has_secondary_missing(&self) -> bool {
        self.missing_value_mgmt == 2
    }

    /// Raw sentinel for a primary missing value after the group reference is
    /// added: all ones at the reference width.
    pub fn primary_missing_raw(&self) -> u32 {
        if self.has_primary_missing() {
            width_mask(self.simple.nbits as u32)
        } else {
            0
        }
    }

    /// Raw sentinel for a secondary missing value: all ones minus one.
    pub fn secondary_missing_raw(&self) -> u32 {
        if self.has_secondary_missing() {
            width_mask(self.simple.nbits as u32).wrapping_sub(1)
        } else {
            0
        }
    }

    /// Substitute value emitted for primary-missing cells. The descriptor
    /// stores the raw octets; they are an IEEE float when the field value
    /// type says so, an integer otherwise (zero-extended before the cast).
    pub fn primary_missing_value(&self) -> f32 {
        if self.simple.field_value_type == 0 {
            f32::from_bits(self.primary_missing)
        } else {
            self.primary_missing as f32
        }
    }

    pub fn secondary_missing_value(&self) -> f32 {
        if self.simple.field_value_type == 0 {
            f32::from_bits(self.secondary_missing)
        } else {
            self.secondary_missing as f32
        }
    }
}

/// Template 5.3 — complex packing with spatial differencing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialDiffParams {
    pub complex: ComplexPackingParams,
    /// Differencing order, 1 or 2.
    pub order: u8,
    /// Octet width of the initial values and the signed minimum.
    pub extra_descriptor_octets: u8,
}

/// Template 5.40 — JPEG-2000 codestream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jpeg2000Params {
    pub scale: PackingScale,
}

/// All-ones mask for a bit width, saturating at 32 bits.
pub(crate) fn width_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Tagged parameter set for the four supported representations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PackingParams {
    Simple(SimplePackingParams),
    Complex(ComplexPackingParams),
    ComplexSpatialDiff(SpatialDiffParams),
    Jpeg2000(Jpeg2000Params),
}

impl PackingParams {
    /// Data representation template number.
    pub fn template_number(&self) -> u16 {
        match self {
            PackingParams::Simple(_) => 0,
            PackingParams::Complex(_) => 2,
            PackingParams::ComplexSpatialDiff(_) => 3,
            PackingParams::Jpeg2000(_) => 40,
        }
    }
}
