// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! 3D textures, whose sub-resources are volumes.
//!
//! Volumes start out discarded: no location holds data until the first write or load, and
//! host memory is allocated only then.
use super::adaptation::{self, IDENTITY};
use super::gpu_object;
use super::locations::{self, Location};
use super::sub_resource::{self, Backing, SubResource};
use super::{
    ColorKeyState, CreateFlags, DrawBinding, ResourceType, SubResourceData, TextureDesc,
    TextureFlags, TextureId, TextureOps, TextureState, Usage,
};
use crate::coordinates::TexelBox;
use crate::device::Lease;
use crate::error::Error;
use crate::imp::TextureTarget;
use crate::sampler::FilterType;

pub(crate) struct VolumeOps;

pub(crate) static VOLUME_OPS: VolumeOps = VolumeOps;

impl TextureOps for VolumeOps {
    fn load_sub_resource(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        index: u32,
        srgb: bool,
    ) -> Result<(), Error> {
        locations::ensure(texture, lease, index, Location::texture(srgb))
    }

    fn add_dirty_region(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        index: u32,
        region: Option<&TexelBox>,
    ) -> Result<(), Error> {
        locations::ensure(texture, lease, index, Location::SYSMEM)?;
        locations::invalidate_region(texture, index, !Location::SYSMEM, region);
        Ok(())
    }

    fn cleanup_sub_resource(&self, texture: &mut TextureState, _lease: &mut Lease<'_>, index: u32) {
        texture.sub_resources[index as usize].sysmem = None;
    }

    fn upload_data(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        index: u32,
        data: &SubResourceData<'_>,
    ) -> Result<(), Error> {
        sub_resource::upload_initial(texture, lease, index, data)
    }

    fn prepare_texture(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        srgb: bool,
    ) -> Result<(), Error> {
        gpu_object::allocate(texture, lease, srgb, false)
    }
}

pub(crate) fn create_state(
    id: TextureId,
    desc: &TextureDesc,
    level_count: u32,
    _flags: CreateFlags,
    lease: &mut Lease<'_>,
) -> Result<TextureState, Error> {
    if !lease.caps.texture_3d {
        logwise::warn_sync!("Volume texture requested on a device without 3D textures");
        return Err(Error::Unsupported("3D textures"));
    }
    if desc
        .usage
        .intersects(Usage::OVERLAY | Usage::OWNDC | Usage::LEGACY_CUBEMAP)
    {
        logwise::warn_sync!(
            "Usage {usage} does not apply to volumes",
            usage = logwise::privacy::LogIt(&desc.usage)
        );
        return Err(Error::InvalidArgument("usage not valid for volumes"));
    }
    let max = lease.caps.max_3d_texture_size;
    if desc.width > max || desc.height > max || desc.depth > max {
        logwise::warn_sync!(
            "Volume of {w}x{h}x{d} exceeds the device maximum {max}",
            w = desc.width,
            h = desc.height,
            d = desc.depth,
            max = max
        );
        return Err(Error::InvalidArgument("volume larger than the device maximum"));
    }
    adaptation::check_volume(desc.width, desc.height, desc.depth, desc.pool, lease.caps)?;

    let sub_resources = (0..level_count)
        .map(|level| {
            SubResource::new(
                id,
                level,
                level,
                0,
                (
                    (desc.width >> level).max(1),
                    (desc.height >> level).max(1),
                    (desc.depth >> level).max(1),
                ),
                Backing::Volume,
                Location::DISCARDED,
            )
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();
    Ok(TextureState {
        id,
        ops: &VOLUME_OPS,
        resource_type: ResourceType::Texture3d,
        format: desc.format,
        usage: desc.usage,
        pool: desc.pool,
        multisample_type: desc.multisample_type,
        multisample_quality: desc.multisample_quality,
        width: desc.width,
        height: desc.height,
        depth: desc.depth,
        level_count,
        layer_count: 1,
        flags: TextureFlags::NORMALIZED_COORDS | TextureFlags::POW2_MAT_IDENT,
        target: TextureTarget::Texture3d,
        pow2_matrix: IDENTITY,
        gpu: Default::default(),
        conversion: None,
        color_key: ColorKeyState::default(),
        lod: 0,
        filter_type: FilterType::Linear,
        alignment: lease.config.surface_alignment,
        row_pitch: 0,
        user_memory: None,
        draw_binding: DrawBinding::Texture,
        sub_resources,
    })
}
