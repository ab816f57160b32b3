// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Runtime pixel format catalog.
//!
//! Every texture carries a [`FormatId`]. The catalog maps each id to a static [`FormatInfo`]
//! describing how the texels are laid out in host memory:
//!
//! - bytes per texel (or per block, for block-compressed formats)
//! - block dimensions
//! - channel bit masks, used by the legacy bitmap bridge and by color keying
//! - capability flags (legacy view support, render-target support, ...)
//! - a height scale for planar formats whose storage is taller than the image
//! - the supported multisample counts
//! - the format substituted when a source color key has to be emulated with alpha
//!
//! The catalog is pure lookup. Decisions that depend on the device, such as which conversion to
//! run before an upload, live in [`conversion`].
//!
//! # Examples
//!
//! ```
//! use texture_coherency::pixel_formats::{FormatFlags, FormatId};
//!
//! let info = FormatId::B8G8R8X8Unorm.info();
//! assert_eq!(info.byte_count, 4);
//! assert!(info.flags.contains(FormatFlags::GETDC));
//! assert_eq!(info.color_key_substitute, Some(FormatId::B8G8R8A8Unorm));
//! ```
/*
Quick note on type design.  The crate used to model formats as zero-sized types so that texture
writes could be typechecked.  Here the format of a texture can change at runtime (backing store
replacement, color-key substitution), so a plain id plus a lookup table is the honest model.
 */
pub mod conversion;
pub mod png_support;

use bitflags::bitflags;

pub use half::f16;

bitflags! {
    /// Capability flags of a format.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FormatFlags: u32 {
        /// The format can back a legacy bitmap view.
        const GETDC = 1 << 0;
        /// Texels are stored in fixed-size blocks.
        const COMPRESSED = 1 << 1;
        /// Channels are floating point.
        const FLOAT = 1 << 2;
        /// The device can sample a gamma-encoded variant of the format.
        const SRGB_READ = 1 << 3;
        /// The format can be rendered to.
        const RENDERTARGET = 1 << 4;
        /// Storage height differs from image height, see [`FormatInfo::height_scale`].
        const HEIGHT_SCALE = 1 << 5;
        /// The format can be sampled with linear filtering.
        const FILTERING = 1 << 6;
    }
}

/// Identifies a pixel format.
///
/// Channel order in the name is from least significant bit to most significant bit of the
/// texel, so `B8G8R8A8Unorm` stores blue in the first byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FormatId {
    Unknown,
    B8G8R8A8Unorm,
    B8G8R8X8Unorm,
    R8G8B8A8Unorm,
    R8G8B8X8Unorm,
    B8G8R8Unorm,
    B5G6R5Unorm,
    B5G5R5X1Unorm,
    B5G5R5A1Unorm,
    B4G4R4A4Unorm,
    B4G4R4X4Unorm,
    B2G3R3Unorm,
    A8Unorm,
    /// Palettized 8-bit.
    P8Uint,
    R10G10B10A2Unorm,
    B10G10R10A2Unorm,
    R16G16B16A16Unorm,
    R16Float,
    R32Float,
    R16G16B16A16Float,
    R32G32B32A32Float,
    Dxt1,
    Dxt2,
    Dxt3,
    Dxt4,
    Dxt5,
    /// Planar YUV 4:2:0; the chroma planes live below the luma plane.
    Yv12,
}

/// Bit position of one channel inside a texel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ChannelMask {
    pub bits: u8,
    pub shift: u8,
}

impl ChannelMask {
    pub const NONE: ChannelMask = ChannelMask { bits: 0, shift: 0 };

    const fn new(bits: u8, shift: u8) -> Self {
        ChannelMask { bits, shift }
    }

    /// The mask of the channel within a texel read as a little-endian integer.
    pub const fn mask(&self) -> u64 {
        if self.bits == 0 {
            0
        } else {
            ((1u64 << self.bits) - 1) << self.shift
        }
    }

    pub(crate) fn extract(&self, texel: u64) -> u64 {
        (texel & self.mask()) >> self.shift
    }

    /// Converts a normalized value to this channel's integer representation, positioned.
    pub(crate) fn pack_unorm(&self, value: f32) -> u64 {
        if self.bits == 0 {
            return 0;
        }
        let max = ((1u64 << self.bits) - 1) as f32;
        let v = (value.clamp(0.0, 1.0) * max).round() as u64;
        v << self.shift
    }
}

/// Ratio applied to the image height to get the storage height.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeightScale {
    pub numerator: u32,
    pub denominator: u32,
}

impl HeightScale {
    pub const ONE: HeightScale = HeightScale {
        numerator: 1,
        denominator: 1,
    };

    /// Saturates at `u32::MAX`.
    pub fn apply(&self, height: u32) -> u32 {
        let scaled = u64::from(height) * u64::from(self.numerator) / u64::from(self.denominator);
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }
}

/// Static description of a format.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatInfo {
    pub id: FormatId,
    /// Bytes per texel, or bytes per block for compressed formats.
    pub byte_count: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub red: ChannelMask,
    pub green: ChannelMask,
    pub blue: ChannelMask,
    pub alpha: ChannelMask,
    pub flags: FormatFlags,
    pub height_scale: HeightScale,
    /// Bit `n - 1` is set when `n` samples per pixel are supported.
    pub multisample_types: u32,
    /// Format used in place of this one when a source color key is emulated with alpha.
    pub color_key_substitute: Option<FormatId>,
}

const NO_MULTISAMPLE: u32 = 0;
const RT_MULTISAMPLE: u32 = 0x8a;

const fn color(
    id: FormatId,
    byte_count: u32,
    masks: [ChannelMask; 4],
    flags: FormatFlags,
    multisample_types: u32,
    color_key_substitute: Option<FormatId>,
) -> FormatInfo {
    FormatInfo {
        id,
        byte_count,
        block_width: 1,
        block_height: 1,
        red: masks[0],
        green: masks[1],
        blue: masks[2],
        alpha: masks[3],
        flags,
        height_scale: HeightScale::ONE,
        multisample_types,
        color_key_substitute,
    }
}

const fn block(id: FormatId, byte_count: u32) -> FormatInfo {
    FormatInfo {
        id,
        byte_count,
        block_width: 4,
        block_height: 4,
        red: ChannelMask::NONE,
        green: ChannelMask::NONE,
        blue: ChannelMask::NONE,
        alpha: ChannelMask::NONE,
        flags: FormatFlags::COMPRESSED
            .union(FormatFlags::SRGB_READ)
            .union(FormatFlags::FILTERING),
        height_scale: HeightScale::ONE,
        multisample_types: NO_MULTISAMPLE,
        color_key_substitute: None,
    }
}

const fn m(bits: u8, shift: u8) -> ChannelMask {
    ChannelMask::new(bits, shift)
}

const N: ChannelMask = ChannelMask::NONE;

const GDI: FormatFlags = FormatFlags::GETDC.union(FormatFlags::FILTERING);
const GDI_RT: FormatFlags = GDI.union(FormatFlags::RENDERTARGET);
const GDI_RT_SRGB: FormatFlags = GDI_RT.union(FormatFlags::SRGB_READ);
const FLOAT_RT: FormatFlags = FormatFlags::FLOAT
    .union(FormatFlags::RENDERTARGET)
    .union(FormatFlags::FILTERING);

const UNKNOWN: FormatInfo = color(
    FormatId::Unknown,
    0,
    [N, N, N, N],
    FormatFlags::empty(),
    NO_MULTISAMPLE,
    None,
);
const B8G8R8A8_UNORM: FormatInfo = color(
    FormatId::B8G8R8A8Unorm,
    4,
    [m(8, 16), m(8, 8), m(8, 0), m(8, 24)],
    GDI_RT_SRGB,
    RT_MULTISAMPLE,
    Some(FormatId::B8G8R8A8Unorm),
);
const B8G8R8X8_UNORM: FormatInfo = color(
    FormatId::B8G8R8X8Unorm,
    4,
    [m(8, 16), m(8, 8), m(8, 0), N],
    GDI_RT_SRGB,
    RT_MULTISAMPLE,
    Some(FormatId::B8G8R8A8Unorm),
);
const R8G8B8A8_UNORM: FormatInfo = color(
    FormatId::R8G8B8A8Unorm,
    4,
    [m(8, 0), m(8, 8), m(8, 16), m(8, 24)],
    GDI_RT_SRGB,
    RT_MULTISAMPLE,
    None,
);
const R8G8B8X8_UNORM: FormatInfo = color(
    FormatId::R8G8B8X8Unorm,
    4,
    [m(8, 0), m(8, 8), m(8, 16), N],
    GDI_RT_SRGB,
    RT_MULTISAMPLE,
    None,
);
const B8G8R8_UNORM: FormatInfo = color(
    FormatId::B8G8R8Unorm,
    3,
    [m(8, 16), m(8, 8), m(8, 0), N],
    GDI,
    NO_MULTISAMPLE,
    Some(FormatId::B8G8R8A8Unorm),
);
const B5G6R5_UNORM: FormatInfo = color(
    FormatId::B5G6R5Unorm,
    2,
    [m(5, 11), m(6, 5), m(5, 0), N],
    GDI_RT,
    RT_MULTISAMPLE,
    Some(FormatId::B5G5R5A1Unorm),
);
const B5G5R5X1_UNORM: FormatInfo = color(
    FormatId::B5G5R5X1Unorm,
    2,
    [m(5, 10), m(5, 5), m(5, 0), N],
    GDI_RT,
    RT_MULTISAMPLE,
    Some(FormatId::B5G5R5A1Unorm),
);
const B5G5R5A1_UNORM: FormatInfo = color(
    FormatId::B5G5R5A1Unorm,
    2,
    [m(5, 10), m(5, 5), m(5, 0), m(1, 15)],
    GDI_RT,
    RT_MULTISAMPLE,
    None,
);
const B4G4R4A4_UNORM: FormatInfo = color(
    FormatId::B4G4R4A4Unorm,
    2,
    [m(4, 8), m(4, 4), m(4, 0), m(4, 12)],
    GDI,
    NO_MULTISAMPLE,
    None,
);
const B4G4R4X4_UNORM: FormatInfo = color(
    FormatId::B4G4R4X4Unorm,
    2,
    [m(4, 8), m(4, 4), m(4, 0), N],
    GDI,
    NO_MULTISAMPLE,
    Some(FormatId::B4G4R4A4Unorm),
);
const B2G3R3_UNORM: FormatInfo = color(
    FormatId::B2G3R3Unorm,
    1,
    [m(3, 5), m(3, 2), m(2, 0), N],
    GDI,
    NO_MULTISAMPLE,
    None,
);
const A8_UNORM: FormatInfo = color(
    FormatId::A8Unorm,
    1,
    [N, N, N, m(8, 0)],
    FormatFlags::FILTERING,
    NO_MULTISAMPLE,
    None,
);
const P8_UINT: FormatInfo = color(
    FormatId::P8Uint,
    1,
    [N, N, N, N],
    FormatFlags::GETDC,
    NO_MULTISAMPLE,
    None,
);
const R10G10B10A2_UNORM: FormatInfo = color(
    FormatId::R10G10B10A2Unorm,
    4,
    [m(10, 0), m(10, 10), m(10, 20), m(2, 30)],
    GDI_RT,
    RT_MULTISAMPLE,
    None,
);
const B10G10R10A2_UNORM: FormatInfo = color(
    FormatId::B10G10R10A2Unorm,
    4,
    [m(10, 20), m(10, 10), m(10, 0), m(2, 30)],
    GDI_RT,
    RT_MULTISAMPLE,
    None,
);
const R16G16B16A16_UNORM: FormatInfo = color(
    FormatId::R16G16B16A16Unorm,
    8,
    [m(16, 0), m(16, 16), m(16, 32), m(16, 48)],
    GDI_RT,
    NO_MULTISAMPLE,
    None,
);
const R16_FLOAT: FormatInfo = color(
    FormatId::R16Float,
    2,
    [m(16, 0), N, N, N],
    FLOAT_RT,
    NO_MULTISAMPLE,
    None,
);
const R32_FLOAT: FormatInfo = color(
    FormatId::R32Float,
    4,
    [m(32, 0), N, N, N],
    FLOAT_RT,
    NO_MULTISAMPLE,
    None,
);
const R16G16B16A16_FLOAT: FormatInfo = color(
    FormatId::R16G16B16A16Float,
    8,
    [m(16, 0), m(16, 16), m(16, 32), m(16, 48)],
    FLOAT_RT,
    NO_MULTISAMPLE,
    None,
);
/// Channels are wider than the 64-bit texels masks describe, so none are given.
const R32G32B32A32_FLOAT: FormatInfo = color(
    FormatId::R32G32B32A32Float,
    16,
    [N, N, N, N],
    FormatFlags::FLOAT.union(FormatFlags::RENDERTARGET),
    NO_MULTISAMPLE,
    None,
);
const DXT1: FormatInfo = block(FormatId::Dxt1, 8);
const DXT2: FormatInfo = block(FormatId::Dxt2, 16);
const DXT3: FormatInfo = block(FormatId::Dxt3, 16);
const DXT4: FormatInfo = block(FormatId::Dxt4, 16);
const DXT5: FormatInfo = block(FormatId::Dxt5, 16);
const YV12: FormatInfo = FormatInfo {
    id: FormatId::Yv12,
    byte_count: 1,
    block_width: 1,
    block_height: 1,
    red: N,
    green: N,
    blue: N,
    alpha: N,
    flags: FormatFlags::HEIGHT_SCALE,
    height_scale: HeightScale {
        numerator: 3,
        denominator: 2,
    },
    multisample_types: NO_MULTISAMPLE,
    color_key_substitute: None,
};

impl FormatId {
    /// Looks up the static description of this format.
    pub fn info(self) -> &'static FormatInfo {
        match self {
            FormatId::Unknown => &UNKNOWN,
            FormatId::B8G8R8A8Unorm => &B8G8R8A8_UNORM,
            FormatId::B8G8R8X8Unorm => &B8G8R8X8_UNORM,
            FormatId::R8G8B8A8Unorm => &R8G8B8A8_UNORM,
            FormatId::R8G8B8X8Unorm => &R8G8B8X8_UNORM,
            FormatId::B8G8R8Unorm => &B8G8R8_UNORM,
            FormatId::B5G6R5Unorm => &B5G6R5_UNORM,
            FormatId::B5G5R5X1Unorm => &B5G5R5X1_UNORM,
            FormatId::B5G5R5A1Unorm => &B5G5R5A1_UNORM,
            FormatId::B4G4R4A4Unorm => &B4G4R4A4_UNORM,
            FormatId::B4G4R4X4Unorm => &B4G4R4X4_UNORM,
            FormatId::B2G3R3Unorm => &B2G3R3_UNORM,
            FormatId::A8Unorm => &A8_UNORM,
            FormatId::P8Uint => &P8_UINT,
            FormatId::R10G10B10A2Unorm => &R10G10B10A2_UNORM,
            FormatId::B10G10R10A2Unorm => &B10G10R10A2_UNORM,
            FormatId::R16G16B16A16Unorm => &R16G16B16A16_UNORM,
            FormatId::R16Float => &R16_FLOAT,
            FormatId::R32Float => &R32_FLOAT,
            FormatId::R16G16B16A16Float => &R16G16B16A16_FLOAT,
            FormatId::R32G32B32A32Float => &R32G32B32A32_FLOAT,
            FormatId::Dxt1 => &DXT1,
            FormatId::Dxt2 => &DXT2,
            FormatId::Dxt3 => &DXT3,
            FormatId::Dxt4 => &DXT4,
            FormatId::Dxt5 => &DXT5,
            FormatId::Yv12 => &YV12,
        }
    }

    /// True for the S3TC block formats.
    pub fn is_dxtn(self) -> bool {
        matches!(
            self,
            FormatId::Dxt1 | FormatId::Dxt2 | FormatId::Dxt3 | FormatId::Dxt4 | FormatId::Dxt5
        )
    }
}

impl FormatInfo {
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(FormatFlags::COMPRESSED)
    }

    /// Bytes in one tightly packed row of `width` texels.
    ///
    /// Saturates at `u32::MAX`, which no caller pitch or buffer can satisfy.
    pub fn row_bytes(&self, width: u32) -> u32 {
        width
            .div_ceil(self.block_width)
            .saturating_mul(self.byte_count)
    }

    /// Number of rows of storage for an image `height` texels tall.
    ///
    /// This counts block rows for compressed formats and includes the height scale.
    pub fn row_count(&self, height: u32) -> u32 {
        let height = if self.flags.contains(FormatFlags::HEIGHT_SCALE) {
            self.height_scale.apply(height)
        } else {
            height
        };
        height.div_ceil(self.block_height)
    }

    /// Row and slice pitch of a `width` × `height` image, rows aligned to `alignment` bytes.
    ///
    /// Compressed formats ignore the alignment; their rows are whole block rows. `None` when
    /// either pitch does not fit in 32 bits.
    pub fn calculate_pitch(&self, alignment: u32, width: u32, height: u32) -> Option<(u32, u32)> {
        let row_bytes = width
            .div_ceil(self.block_width)
            .checked_mul(self.byte_count)?;
        let row_pitch = if self.is_compressed() {
            row_bytes
        } else {
            let alignment = alignment.max(1);
            row_bytes.div_ceil(alignment).checked_mul(alignment)?
        };
        Some((row_pitch, row_pitch.checked_mul(self.row_count(height))?))
    }

    /// Whether the format supports the given multisample type and quality level.
    pub fn supports_multisample(&self, multisample: crate::texture::MultisampleType, quality: u32) -> bool {
        use crate::texture::MultisampleType;
        match multisample {
            MultisampleType::None => quality == 0,
            MultisampleType::NonMaskable => quality < self.multisample_types.count_ones(),
            MultisampleType::Samples(count) => {
                count >= 1
                    && count <= 32
                    && self.multisample_types & (1 << (count - 1)) != 0
                    && quality == 0
            }
        }
    }

    /// Reads one texel at the start of `bytes` as a little-endian integer, at most 64 bits.
    pub(crate) fn read_texel(&self, bytes: &[u8]) -> u64 {
        let mut value = 0u64;
        for (i, b) in bytes.iter().take(self.byte_count.min(8) as usize).enumerate() {
            value |= (*b as u64) << (8 * i);
        }
        value
    }

    /// Writes one texel at the start of `bytes` as a little-endian integer.
    pub(crate) fn write_texel(&self, bytes: &mut [u8], value: u64) {
        for (i, b) in bytes.iter_mut().take(self.byte_count.min(8) as usize).enumerate() {
            *b = (value >> (8 * i)) as u8;
        }
    }

    /// The color bits of a texel, which is what color keys are compared against.
    pub(crate) fn color_bits(&self, texel: u64) -> u32 {
        (texel & (self.red.mask() | self.green.mask() | self.blue.mask())) as u32
    }

    /// Encodes a color as one texel of this format.
    ///
    /// Returns `None` for formats that have no direct color encoding (compressed, planar,
    /// palettized).
    pub fn encode_color(&self, color: &Float4) -> Option<Vec<u8>> {
        let mut out = vec![0u8; self.byte_count as usize];
        match self.id {
            FormatId::R32Float => out.copy_from_slice(&color.r.to_le_bytes()),
            FormatId::R16Float => out.copy_from_slice(&f16::from_f32(color.r).to_le_bytes()),
            FormatId::R16G16B16A16Float => {
                for (i, c) in [color.r, color.g, color.b, color.a].iter().enumerate() {
                    out[i * 2..i * 2 + 2].copy_from_slice(&f16::from_f32(*c).to_le_bytes());
                }
            }
            FormatId::R32G32B32A32Float => {
                for (i, c) in [color.r, color.g, color.b, color.a].iter().enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&c.to_le_bytes());
                }
            }
            _ => {
                if self.is_compressed()
                    || self.flags.contains(FormatFlags::HEIGHT_SCALE)
                    || self.id == FormatId::P8Uint
                    || self.byte_count == 0
                {
                    return None;
                }
                let texel = self.red.pack_unorm(color.r)
                    | self.green.pack_unorm(color.g)
                    | self.blue.pack_unorm(color.b)
                    | self.alpha.pack_unorm(color.a);
                self.write_texel(&mut out, texel);
            }
        }
        Some(out)
    }
}

/// Four-channel 8-bit normalized color.
///
/// # Examples
///
/// ```
/// use texture_coherency::pixel_formats::{Float4, Unorm4};
///
/// let float_color = Float4 { r: 1.0, g: 0.5, b: 0.0, a: 1.0 };
/// let unorm_color = Unorm4::from_floats(float_color);
/// assert_eq!(unorm_color.g, 128);
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Unorm4 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Unorm4 {
    /// Convert from normalized float values (0.0-1.0) to 8-bit values (0-255).
    ///
    /// Values are clamped to the valid range and rounded to nearest integer.
    pub fn from_floats(float4: Float4) -> Self {
        Unorm4 {
            r: (float4.r * 255.0).round().clamp(0.0, 255.0) as u8,
            g: (float4.g * 255.0).round().clamp(0.0, 255.0) as u8,
            b: (float4.b * 255.0).round().clamp(0.0, 255.0) as u8,
            a: (float4.a * 255.0).round().clamp(0.0, 255.0) as u8,
        }
    }
}

/// Four-channel floating point color.
///
/// Used for fill colors and sampler border colors. Values are linear.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Float4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Float4 {
    pub const TRANSPARENT_BLACK: Float4 = Float4 {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<Unorm4> for Float4 {
    fn from(c: Unorm4) -> Self {
        Float4 {
            r: c.r as f32 / 255.0,
            g: c.g as f32 / 255.0,
            b: c.b as f32 / 255.0,
            a: c.a as f32 / 255.0,
        }
    }
}
