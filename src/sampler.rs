// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Sampler descriptions.
//!
//! A [`SamplerDesc`] is what a draw wants; each native texture object keeps a shadow copy of
//! the state last sent to the driver so that only differences are sent.

/// How coordinates outside [0, 1] are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    None,
    Point,
    Linear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Complete sampling state of a texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub border_color: [f32; 4],
    pub mag_filter: FilterType,
    pub min_filter: FilterType,
    pub mip_filter: FilterType,
    pub lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub max_anisotropy: u32,
    pub compare: bool,
    pub comparison_func: CompareFunction,
    pub srgb_decode: bool,
}

impl SamplerDesc {
    /// The state a freshly created native texture starts in.
    pub fn driver_defaults(srgb_decode: bool) -> Self {
        SamplerDesc {
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            border_color: [0.0; 4],
            mag_filter: FilterType::Linear,
            min_filter: FilterType::Point,
            mip_filter: FilterType::Linear,
            lod_bias: 0.0,
            min_lod: -1000.0,
            max_lod: 1000.0,
            max_anisotropy: 1,
            compare: false,
            comparison_func: CompareFunction::LessEqual,
            srgb_decode,
        }
    }
}

impl Default for SamplerDesc {
    /// Point sampling with wrapping, no mipmaps.
    fn default() -> Self {
        SamplerDesc {
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            border_color: [0.0; 4],
            mag_filter: FilterType::Point,
            min_filter: FilterType::Point,
            mip_filter: FilterType::None,
            lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: 1000.0,
            max_anisotropy: 1,
            compare: false,
            comparison_func: CompareFunction::LessEqual,
            srgb_decode: false,
        }
    }
}
