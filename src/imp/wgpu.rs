// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A driver backed by wgpu.
//!
//! wgpu textures cannot be reallocated in place, so every image of a native texture is its own
//! single-level, single-layer `wgpu::Texture`. Sampler parameters are recorded per native texture;
//! [`WgpuDriver::sampler_descriptor`] turns them into a descriptor for whoever draws.
use crate::coordinates::TexelBox;
use crate::device::Capabilities;
use crate::imp::{
    Driver, DriverError, Encoding, ImageIndex, NativeTexture, PixelData, StorageDesc,
    TexParameter, TextureTarget,
};
use crate::pixel_formats::FormatId;
use crate::sampler::{AddressMode, CompareFunction, FilterType};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;

#[derive(Debug)]
struct WgpuImage {
    storage: StorageDesc,
    texture: wgpu::Texture,
}

#[derive(Debug)]
struct WgpuTexture {
    target: TextureTarget,
    images: BTreeMap<ImageIndex, WgpuImage>,
    parameters: Vec<TexParameter>,
}

/// Native format of a storage description, if wgpu has one.
pub fn wgpu_format(format: FormatId, encoding: Encoding) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as T;
    let gamma = encoding == Encoding::Gamma;
    Some(match format {
        FormatId::B8G8R8A8Unorm | FormatId::B8G8R8X8Unorm if gamma => T::Bgra8UnormSrgb,
        FormatId::B8G8R8A8Unorm | FormatId::B8G8R8X8Unorm => T::Bgra8Unorm,
        FormatId::R8G8B8A8Unorm | FormatId::R8G8B8X8Unorm if gamma => T::Rgba8UnormSrgb,
        FormatId::R8G8B8A8Unorm | FormatId::R8G8B8X8Unorm => T::Rgba8Unorm,
        FormatId::A8Unorm => T::R8Unorm,
        FormatId::R10G10B10A2Unorm => T::Rgb10a2Unorm,
        FormatId::R16G16B16A16Unorm => T::Rgba16Unorm,
        FormatId::R16Float => T::R16Float,
        FormatId::R32Float => T::R32Float,
        FormatId::R16G16B16A16Float => T::Rgba16Float,
        FormatId::R32G32B32A32Float => T::Rgba32Float,
        FormatId::Dxt1 if gamma => T::Bc1RgbaUnormSrgb,
        FormatId::Dxt1 => T::Bc1RgbaUnorm,
        FormatId::Dxt2 | FormatId::Dxt3 if gamma => T::Bc2RgbaUnormSrgb,
        FormatId::Dxt2 | FormatId::Dxt3 => T::Bc2RgbaUnorm,
        FormatId::Dxt4 | FormatId::Dxt5 if gamma => T::Bc3RgbaUnormSrgb,
        FormatId::Dxt4 | FormatId::Dxt5 => T::Bc3RgbaUnorm,
        _ => return None,
    })
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Mirror | AddressMode::MirrorOnce => wgpu::AddressMode::MirrorRepeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Border => wgpu::AddressMode::ClampToBorder,
    }
}

fn filter_mode(filter: FilterType) -> wgpu::FilterMode {
    match filter {
        FilterType::Linear | FilterType::Anisotropic => wgpu::FilterMode::Linear,
        FilterType::None | FilterType::Point => wgpu::FilterMode::Nearest,
    }
}

fn compare_function(function: CompareFunction) -> wgpu::CompareFunction {
    match function {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

/// wgpu driver.
#[derive(Debug)]
pub struct WgpuDriver {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Capabilities,
    textures: HashMap<NativeTexture, WgpuTexture>,
    next_name: u64,
    lod_bias: f32,
}

impl WgpuDriver {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let limits = device.limits();
        let features = device.features();
        let caps = Capabilities {
            non_power_of_two: true,
            texture_rectangle: false,
            normalized_texrect: false,
            mipmap_generation: false,
            anisotropic_filtering: true,
            //decoding follows the view format, not the sampler
            srgb_decode: false,
            texture_3d: true,
            dxtn: features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC),
            dxtn_3d: features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC_SLICED_3D),
            half_float_textures: true,
            lod_bias: false,
            max_texture_size: limits.max_texture_dimension_2d,
            max_3d_texture_size: limits.max_texture_dimension_3d,
        };
        logwise::info_sync!(
            "wgpu driver with caps {caps}",
            caps = logwise::privacy::LogIt(&caps)
        );
        WgpuDriver {
            device,
            queue,
            caps,
            textures: HashMap::new(),
            next_name: 1,
            lod_bias: 0.0,
        }
    }

    fn image(&self, texture: NativeTexture, image: ImageIndex) -> Result<&WgpuImage, DriverError> {
        self.textures
            .get(&texture)
            .ok_or(DriverError::NoSuchTexture(texture))?
            .images
            .get(&image)
            .ok_or(DriverError::NoSuchImage(image))
    }

    /// The wgpu texture holding one image, for drawing with.
    pub fn texture(&self, texture: NativeTexture, image: ImageIndex) -> Option<&wgpu::Texture> {
        self.image(texture, image).ok().map(|i| &i.texture)
    }

    /// Sampler state recorded for a native texture.
    pub fn sampler_descriptor(&self, texture: NativeTexture) -> wgpu::SamplerDescriptor<'static> {
        let mut descriptor = wgpu::SamplerDescriptor {
            label: Some("texture_coherency sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            ..Default::default()
        };
        let Some(t) = self.textures.get(&texture) else {
            return descriptor;
        };
        let mut compare = (false, wgpu::CompareFunction::LessEqual);
        for parameter in &t.parameters {
            match *parameter {
                TexParameter::WrapU(m) => descriptor.address_mode_u = address_mode(m),
                TexParameter::WrapV(m) => descriptor.address_mode_v = address_mode(m),
                TexParameter::WrapW(m) => descriptor.address_mode_w = address_mode(m),
                TexParameter::MagFilter(f) => descriptor.mag_filter = filter_mode(f),
                TexParameter::MinFilter { min, mip } => {
                    descriptor.min_filter = filter_mode(min);
                    descriptor.mipmap_filter = filter_mode(mip);
                }
                TexParameter::MaxAnisotropy(a) => {
                    descriptor.anisotropy_clamp = a.clamp(1, 16) as u16;
                }
                TexParameter::CompareMode(enabled) => compare.0 = enabled,
                TexParameter::CompareFunction(f) => compare.1 = compare_function(f),
                TexParameter::MinLod(l) => descriptor.lod_min_clamp = l.max(0.0),
                TexParameter::MaxLod(l) => descriptor.lod_max_clamp = l.clamp(0.0, 32.0),
                _ => {}
            }
        }
        descriptor.compare = compare.0.then_some(compare.1);
        //wgpu requires linear filtering everywhere once anisotropy is enabled
        if descriptor.anisotropy_clamp > 1
            && (descriptor.mag_filter != wgpu::FilterMode::Linear
                || descriptor.min_filter != wgpu::FilterMode::Linear
                || descriptor.mipmap_filter != wgpu::FilterMode::Linear)
        {
            descriptor.anisotropy_clamp = 1;
        }
        descriptor
    }

    pub fn lod_bias(&self) -> f32 {
        self.lod_bias
    }
}

fn origin(region: &TexelBox, storage: &StorageDesc) -> (wgpu::Origin3d, wgpu::Extent3d) {
    let info = storage.format.info();
    let depth = region.depth();
    (
        wgpu::Origin3d {
            x: region.left,
            y: region.top,
            z: region.front,
        },
        wgpu::Extent3d {
            //copies of block formats cover whole blocks
            width: region.width().div_ceil(info.block_width) * info.block_width,
            height: region.height().div_ceil(info.block_height) * info.block_height,
            depth_or_array_layers: depth,
        },
    )
}

impl Driver for WgpuDriver {
    fn capabilities(&self) -> Capabilities {
        self.caps.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn create_texture(&mut self, target: TextureTarget) -> Result<NativeTexture, DriverError> {
        if target == TextureTarget::Rectangle {
            return Err(DriverError::Backend("rectangle textures".to_string()));
        }
        let name = NativeTexture(self.next_name);
        self.next_name += 1;
        self.textures.insert(
            name,
            WgpuTexture {
                target,
                images: BTreeMap::new(),
                parameters: Vec::new(),
            },
        );
        Ok(name)
    }

    fn delete_texture(&mut self, texture: NativeTexture) {
        if let Some(t) = self.textures.remove(&texture) {
            for image in t.images.into_values() {
                image.texture.destroy();
            }
        }
    }

    fn bind_texture(&mut self, _target: TextureTarget, _texture: NativeTexture) {}

    fn set_parameter(&mut self, texture: NativeTexture, parameter: TexParameter) {
        if let Some(t) = self.textures.get_mut(&texture) {
            t.parameters.push(parameter);
        }
    }

    fn set_lod_bias(&mut self, bias: f32) {
        self.lod_bias = bias;
    }

    fn allocate_image(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        storage: &StorageDesc,
    ) -> Result<(), DriverError> {
        let format = wgpu_format(storage.format, storage.encoding)
            .ok_or(DriverError::UnsupportedFormat(storage.format))?;
        let t = self
            .textures
            .get_mut(&texture)
            .ok_or(DriverError::NoSuchTexture(texture))?;
        let dimension = match t.target {
            TextureTarget::Texture3d => wgpu::TextureDimension::D3,
            _ => wgpu::TextureDimension::D2,
        };
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if storage.encoding == Encoding::RenderTarget {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let info = storage.format.info();
        let wgpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture_coherency image"),
            size: wgpu::Extent3d {
                width: storage.width.div_ceil(info.block_width) * info.block_width,
                height: storage.height.div_ceil(info.block_height) * info.block_height,
                depth_or_array_layers: storage.depth,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format,
            usage,
            view_formats: &[],
        });
        if let Some(old) = t.images.insert(
            image,
            WgpuImage {
                storage: *storage,
                texture: wgpu_texture,
            },
        ) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn upload(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        region: &TexelBox,
        data: PixelData<'_>,
    ) -> Result<(), DriverError> {
        let target = self.image(texture, image)?;
        if !region.fits_within(target.storage.width, target.storage.height, target.storage.depth) {
            return Err(DriverError::OutOfBounds);
        }
        let (origin, extent) = origin(region, &target.storage);
        let rows_per_image = if data.row_pitch == 0 {
            None
        } else {
            Some(data.slice_pitch / data.row_pitch)
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin,
                aspect: wgpu::TextureAspect::All,
            },
            data.bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.row_pitch),
                rows_per_image,
            },
            extent,
        );
        Ok(())
    }

    fn download(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        region: &TexelBox,
        out: &mut [u8],
        row_pitch: u32,
        slice_pitch: u32,
    ) -> Result<(), DriverError> {
        let source = self.image(texture, image)?;
        if !region.fits_within(source.storage.width, source.storage.height, source.storage.depth) {
            return Err(DriverError::OutOfBounds);
        }
        let info = source.storage.format.info();
        let (origin, extent) = origin(region, &source.storage);
        let row_bytes = info.row_bytes(region.width());
        let rows = info.row_count(region.height());
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let size = padded_row as u64 * rows as u64 * region.depth() as u64;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture_coherency readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture_coherency readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(rows),
                },
            },
            extent,
        );
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        buffer.map_async(wgpu::MapMode::Read, .., move |result| {
            //the receiver outlives the poll below
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        rx.recv()
            .map_err(|e| DriverError::Backend(e.to_string()))?
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        {
            let mapped = buffer.slice(..).get_mapped_range();
            for z in 0..region.depth() as usize {
                for y in 0..rows as usize {
                    let src = (z * rows as usize + y) * padded_row as usize;
                    let dst = z * slice_pitch as usize + y * row_pitch as usize;
                    out.get_mut(dst..dst + row_bytes as usize)
                        .ok_or(DriverError::OutOfBounds)?
                        .copy_from_slice(&mapped[src..src + row_bytes as usize]);
                }
            }
        }
        buffer.unmap();
        Ok(())
    }
}
