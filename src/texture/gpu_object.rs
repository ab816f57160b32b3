// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Native texture objects and their sampler shadow state.
//!
//! A texture owns up to two native objects: the linear one, and the gamma one when the device
//! cannot switch decoding per sampler. Each remembers the sampler state last sent to the driver.
use super::locations::{self, Location};
use super::{ColorKeyFlags, TextureFlags, TextureState, Usage};
use crate::device::{Diagnostic, Lease};
use crate::error::Error;
use crate::imp::{Encoding, ImageIndex, NativeTexture, StorageDesc, TexParameter, TextureTarget};
use crate::pixel_formats::FormatFlags;
use crate::pixel_formats::conversion::{color_key_conversion, device_conversion};
use crate::sampler::{AddressMode, FilterType, SamplerDesc};

#[derive(Debug, Clone)]
pub(crate) struct GpuTexture {
    pub(crate) name: Option<NativeTexture>,
    /// State last sent to the driver.
    pub(crate) sampler: SamplerDesc,
    /// Base mip level last sent; `u32::MAX` forces a resend.
    pub(crate) base_level: u32,
}

impl Default for GpuTexture {
    fn default() -> Self {
        GpuTexture {
            name: None,
            sampler: SamplerDesc::driver_defaults(false),
            base_level: 0,
        }
    }
}

/// Binds the linear or gamma object, creating and configuring it on first use.
pub(crate) fn bind(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    srgb: bool,
) -> Result<NativeTexture, Error> {
    let srgb = srgb && lease.needs_separate_srgb();
    texture.flags.set(TextureFlags::IS_SRGB, srgb);
    let variant = usize::from(srgb);
    let target = texture.target;
    if let Some(name) = texture.gpu[variant].name {
        lease.driver.bind_texture(target, name);
        return Ok(name);
    }
    let name = lease.driver.create_texture(target)?;
    logwise::trace_sync!(
        "Created native texture {name} for {id}",
        name = logwise::privacy::LogIt(&name),
        id = logwise::privacy::LogIt(&texture.id)
    );
    let decode = lease.caps.srgb_decode || srgb;
    texture.gpu[variant] = GpuTexture {
        name: Some(name),
        sampler: SamplerDesc::driver_defaults(decode),
        base_level: 0,
    };
    texture.set_dirty();
    lease.driver.bind_texture(target, name);

    if texture.usage.contains(Usage::AUTOGENMIPMAP) {
        lease
            .driver
            .set_parameter(name, TexParameter::GenerateMipmap(true));
    }
    if target != TextureTarget::Rectangle {
        lease
            .driver
            .set_parameter(name, TexParameter::MaxLevel(texture.level_count - 1));
    }
    if target == TextureTarget::CubeMap {
        //wrapping across faces is meaningless; the shadow keeps the driver default
        for parameter in [
            TexParameter::WrapU(AddressMode::Clamp),
            TexParameter::WrapV(AddressMode::Clamp),
            TexParameter::WrapW(AddressMode::Clamp),
        ] {
            lease.driver.set_parameter(name, parameter);
        }
    }
    if texture.flags.contains(TextureFlags::COND_NP2) {
        for parameter in [
            TexParameter::WrapU(AddressMode::Clamp),
            TexParameter::WrapV(AddressMode::Clamp),
            TexParameter::MagFilter(FilterType::Point),
            TexParameter::MinFilter {
                min: FilterType::Point,
                mip: FilterType::None,
            },
        ] {
            lease.driver.set_parameter(name, parameter);
        }
        let shadow = &mut texture.gpu[variant].sampler;
        shadow.address_u = AddressMode::Clamp;
        shadow.address_v = AddressMode::Clamp;
        shadow.mag_filter = FilterType::Point;
        shadow.min_filter = FilterType::Point;
        shadow.mip_filter = FilterType::None;
    }
    Ok(name)
}

/// Allocates native storage for every sub-resource of one variant, once.
pub(crate) fn prepare(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    srgb: bool,
) -> Result<(), Error> {
    let srgb = srgb && lease.needs_separate_srgb();
    if !lease.config.shader_color_key
        && texture.color_key.applied_active != texture.color_key.has_src_blt()
    {
        force_reload(texture);
        if texture.color_key.flags.contains(ColorKeyFlags::SRC_BLT) {
            texture.color_key.applied_active = true;
        }
    }
    let allocated = TextureFlags::allocated(srgb);
    if texture.flags.contains(allocated) {
        return Ok(());
    }
    let ops = texture.ops;
    ops.prepare_texture(texture, lease, srgb)?;
    texture.flags.insert(allocated);
    Ok(())
}

/// Chooses the storage format, binds, and allocates every image.
///
/// Color-key substitution only applies when `color_keyed` is set.
pub(crate) fn allocate(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    srgb: bool,
    color_keyed: bool,
) -> Result<(), Error> {
    let conversion = device_conversion(texture.format, lease.caps).or_else(|| {
        (color_keyed && texture.color_key.applied_active)
            .then(|| color_key_conversion(texture.format))
            .flatten()
    });
    if let Some(conversion) = conversion {
        logwise::trace_sync!(
            "Texture {id} stored as {dst}",
            id = logwise::privacy::LogIt(&texture.id),
            dst = logwise::privacy::LogIt(&conversion.dst)
        );
        texture.flags.insert(TextureFlags::CONVERTED);
    }
    texture.conversion = conversion;
    let name = bind(texture, lease, srgb)?;
    let info = texture.format.info();
    let encoding = if srgb {
        if info.flags.contains(FormatFlags::SRGB_READ) {
            Encoding::Gamma
        } else {
            if lease.diagnostics.first_time(Diagnostic::MissingGammaFormat) {
                logwise::warn_sync!(
                    "Format {format} has no gamma variant, allocating linear storage",
                    format = logwise::privacy::LogIt(&texture.format)
                );
            }
            Encoding::Linear
        }
    } else if texture.usage.contains(Usage::RENDERTARGET) {
        Encoding::RenderTarget
    } else {
        Encoding::Linear
    };
    let format = conversion.map_or(texture.format, |c| c.dst);
    let variant = usize::from(srgb);
    for sub in texture.sub_resources.iter_mut() {
        let (width, height, depth) = sub.storage_size();
        let height = if info.flags.contains(FormatFlags::HEIGHT_SCALE) {
            info.height_scale.apply(height)
        } else {
            height
        };
        lease.driver.allocate_image(
            name,
            ImageIndex {
                level: sub.level,
                layer: sub.layer,
            },
            &StorageDesc {
                format,
                encoding,
                width,
                height,
                depth,
            },
        )?;
        sub.dirty[variant].mark_whole();
    }
    logwise::info_sync!(
        "Allocated native storage for texture {id}, {count} images",
        id = logwise::privacy::LogIt(&texture.id),
        count = texture.sub_resource_count()
    );
    Ok(())
}

/// Sends the sampler state that differs from the shadow of the variant bound last.
pub(crate) fn apply_sampler(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    desc: &SamplerDesc,
) -> Result<(), Error> {
    let variant = usize::from(texture.flags.contains(TextureFlags::IS_SRGB));
    let lod = texture.lod;
    let gpu = &mut texture.gpu[variant];
    let Some(name) = gpu.name else {
        return Err(Error::InvalidArgument("texture has not been bound"));
    };
    let driver = &mut *lease.driver;
    let shadow = &mut gpu.sampler;

    if desc.address_u != shadow.address_u {
        driver.set_parameter(name, TexParameter::WrapU(desc.address_u));
        shadow.address_u = desc.address_u;
    }
    if desc.address_v != shadow.address_v {
        driver.set_parameter(name, TexParameter::WrapV(desc.address_v));
        shadow.address_v = desc.address_v;
    }
    if desc.address_w != shadow.address_w {
        driver.set_parameter(name, TexParameter::WrapW(desc.address_w));
        shadow.address_w = desc.address_w;
    }
    if desc.border_color != shadow.border_color {
        driver.set_parameter(name, TexParameter::BorderColor(desc.border_color));
        shadow.border_color = desc.border_color;
    }
    if desc.mag_filter != shadow.mag_filter {
        driver.set_parameter(name, TexParameter::MagFilter(desc.mag_filter));
        shadow.mag_filter = desc.mag_filter;
    }
    if desc.min_filter != shadow.min_filter || desc.mip_filter != shadow.mip_filter {
        driver.set_parameter(
            name,
            TexParameter::MinFilter {
                min: desc.min_filter,
                mip: desc.mip_filter,
            },
        );
        shadow.min_filter = desc.min_filter;
        shadow.mip_filter = desc.mip_filter;
    }
    if desc.max_anisotropy != shadow.max_anisotropy {
        if lease.caps.anisotropic_filtering {
            driver.set_parameter(name, TexParameter::MaxAnisotropy(desc.max_anisotropy));
        } else if lease.diagnostics.first_time(Diagnostic::AnisotropyUnsupported) {
            logwise::warn_sync!("Anisotropic filtering not supported");
        }
        shadow.max_anisotropy = desc.max_anisotropy;
    }
    if desc.srgb_decode != shadow.srgb_decode
        && lease.config.srgb_read_write_control
        && lease.caps.srgb_decode
    {
        driver.set_parameter(name, TexParameter::SrgbDecode(desc.srgb_decode));
        shadow.srgb_decode = desc.srgb_decode;
    }
    if desc.compare != shadow.compare {
        driver.set_parameter(name, TexParameter::CompareMode(desc.compare));
        shadow.compare = desc.compare;
    }
    if desc.comparison_func != shadow.comparison_func {
        driver.set_parameter(name, TexParameter::CompareFunction(desc.comparison_func));
        shadow.comparison_func = desc.comparison_func;
    }
    if lease.caps.lod_bias {
        driver.set_lod_bias(desc.lod_bias);
        shadow.lod_bias = desc.lod_bias;
    }
    if gpu.base_level != lod {
        driver.set_parameter(name, TexParameter::BaseLevel(lod));
        gpu.base_level = lod;
    }
    Ok(())
}

/// Forgets native storage: the next prepare reallocates, and native copies are stale.
pub(crate) fn force_reload(texture: &mut TextureState) {
    logwise::trace_sync!(
        "Forcing reload of texture {id}",
        id = logwise::privacy::LogIt(&texture.id)
    );
    texture.flags.remove(
        TextureFlags::RGB_ALLOCATED | TextureFlags::SRGB_ALLOCATED | TextureFlags::CONVERTED,
    );
    texture.color_key.applied_active = false;
    texture.conversion = None;
    for index in 0..texture.sub_resource_count() {
        if texture.sub_resources[index as usize]
            .locations
            .intersects(Location::GPU)
        {
            locations::invalidate(texture, index, Location::GPU);
        } else {
            for dirty in &mut texture.sub_resources[index as usize].dirty {
                dirty.mark_whole();
            }
        }
    }
    texture.set_dirty();
}

/// Moves everything to its map binding and releases the native objects.
pub(crate) fn unload(texture: &mut TextureState, lease: &mut Lease<'_>) -> Result<(), Error> {
    logwise::info_sync!(
        "Unloading texture {id}",
        id = logwise::privacy::LogIt(&texture.id)
    );
    for index in 0..texture.sub_resource_count() {
        let map_binding = texture.sub_resources[index as usize].map_binding;
        locations::ensure(texture, lease, index, map_binding)?;
    }
    force_reload(texture);
    delete_native(texture, lease);
    texture.set_dirty();
    Ok(())
}

/// Deletes both native objects. Never fails.
pub(crate) fn delete_native(texture: &mut TextureState, lease: &mut Lease<'_>) {
    for gpu in &mut texture.gpu {
        if let Some(name) = gpu.name.take() {
            lease.driver.delete_texture(name);
        }
        *gpu = GpuTexture::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shadow_is_driver_default() {
        let gpu = GpuTexture::default();
        assert_eq!(gpu.name, None);
        assert_eq!(gpu.sampler.mag_filter, FilterType::Linear);
        assert_eq!(gpu.sampler.min_filter, FilterType::Point);
        assert_eq!(gpu.sampler.min_lod, -1000.0);
    }
}
