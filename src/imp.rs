// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The native driver seam.
//!
//! The coherency engine never talks to a graphics API directly. Everything that touches native
//! texture objects goes through [`Driver`], which is modeled after a bind-to-edit API: textures
//! are named by opaque handles, images are allocated one mip level and layer at a time, and
//! sampler state is set one parameter at a time.
//!
//! Two drivers ship with the crate: [`soft::SoftDriver`], which keeps native textures in host
//! memory and counts every call, and `wgpu::WgpuDriver` behind the `backend_wgpu` feature.
use crate::coordinates::TexelBox;
use crate::device::Capabilities;
use crate::pixel_formats::FormatId;
use crate::sampler::{AddressMode, CompareFunction, FilterType};

pub mod soft;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

/// Opaque name of a native texture object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeTexture(pub u64);

/// What kind of native texture object to create.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2d,
    /// Non-power-of-two 2D texture addressed with unnormalized coordinates.
    Rectangle,
    /// Six 2D faces, addressed as layers 0..6.
    CubeMap,
    Texture3d,
}

/// One image inside a native texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageIndex {
    pub level: u32,
    pub layer: u32,
}

/// How the texels of an allocated image are interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
    Linear,
    /// Gamma-corrected; sampling decodes to linear.
    Gamma,
    /// Linear, laid out for rendering into.
    RenderTarget,
}

/// Storage of one image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StorageDesc {
    pub format: FormatId,
    pub encoding: Encoding,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Host-side texels handed to or filled in by a driver.
///
/// `bytes` starts at the first texel of the region; rows are `row_pitch` apart and slices are
/// `slice_pitch` apart.
#[derive(Debug, Copy, Clone)]
pub struct PixelData<'a> {
    pub bytes: &'a [u8],
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

/// A sampling parameter set on a native texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TexParameter {
    WrapU(AddressMode),
    WrapV(AddressMode),
    WrapW(AddressMode),
    BorderColor([f32; 4]),
    MagFilter(FilterType),
    /// Minification and mip filters are one native parameter.
    MinFilter { min: FilterType, mip: FilterType },
    MaxAnisotropy(u32),
    SrgbDecode(bool),
    CompareMode(bool),
    CompareFunction(CompareFunction),
    MinLod(f32),
    MaxLod(f32),
    BaseLevel(u32),
    MaxLevel(u32),
    GenerateMipmap(bool),
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("driver out of memory")]
    OutOfMemory,
    #[error("driver has no storage for {0:?}")]
    UnsupportedFormat(FormatId),
    #[error("no native texture {0:?}")]
    NoSuchTexture(NativeTexture),
    #[error("image {0:?} was never allocated")]
    NoSuchImage(ImageIndex),
    #[error("region out of bounds")]
    OutOfBounds,
    #[error("{0}")]
    Backend(String),
}

/// Native texture operations.
///
/// Drivers are only called while the device context lease is held, so implementations need no
/// internal locking.
pub trait Driver: Send {
    /// Capabilities of the underlying device.
    fn capabilities(&self) -> Capabilities;

    /// For downcasting to the concrete driver, e.g. to inspect a [`soft::SoftDriver`].
    fn as_any(&self) -> &dyn std::any::Any;

    fn create_texture(&mut self, target: TextureTarget) -> Result<NativeTexture, DriverError>;

    /// Deletes a native texture. Unknown names are ignored.
    fn delete_texture(&mut self, texture: NativeTexture);

    fn bind_texture(&mut self, target: TextureTarget, texture: NativeTexture);

    fn set_parameter(&mut self, texture: NativeTexture, parameter: TexParameter);

    /// Sets the texture LOD bias of the current texture unit.
    fn set_lod_bias(&mut self, bias: f32);

    /// (Re)allocates one image. Contents are undefined afterwards.
    fn allocate_image(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        storage: &StorageDesc,
    ) -> Result<(), DriverError>;

    /// Copies host texels into `region` of an image.
    fn upload(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        region: &TexelBox,
        data: PixelData<'_>,
    ) -> Result<(), DriverError>;

    /// Copies `region` of an image into `out`, laid out with the given pitches.
    fn download(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        region: &TexelBox,
        out: &mut [u8],
        row_pitch: u32,
        slice_pitch: u32,
    ) -> Result<(), DriverError>;
}
