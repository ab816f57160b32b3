// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! 2D textures and cube maps, whose sub-resources are surfaces.
use super::adaptation::{self, Request};
use super::gpu_object;
use super::legacy_view;
use super::locations::{self, Location};
use super::overlay::OverlayState;
use super::sub_resource::{self, Backing, SubResource};
use super::{
    BackingStore, ColorKeyState, CreateFlags, DrawBinding, ResourceType, SubResourceData,
    TextureDesc, TextureFlags, TextureId, TextureOps, TextureState, Usage,
};
use crate::coordinates::TexelBox;
use crate::device::Lease;
use crate::error::Error;
use crate::pixel_formats::{FormatFlags, FormatId};
use crate::sampler::FilterType;

pub(crate) struct SurfaceOps;

pub(crate) static SURFACE_OPS: SurfaceOps = SurfaceOps;

impl TextureOps for SurfaceOps {
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
        let map_binding = texture.sub_resources[index as usize].map_binding;
        locations::ensure(texture, lease, index, map_binding)?;
        locations::invalidate_region(texture, index, !map_binding, region);
        Ok(())
    }

    fn cleanup_sub_resource(&self, texture: &mut TextureState, _lease: &mut Lease<'_>, index: u32) {
        legacy_view::destroy_bitmap(texture, index);
        let sub = &mut texture.sub_resources[index as usize];
        sub.legacy_view = None;
        sub.sysmem = None;
        sub.overlay = None;
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
        gpu_object::allocate(texture, lease, srgb, true)
    }
}

fn backing(width: u32, height: u32, level: u32, padded: bool) -> Backing {
    let (w, h) = if padded {
        (width.next_power_of_two(), height.next_power_of_two())
    } else {
        (width, height)
    };
    Backing::Surface {
        pow2_width: (w >> level).max(1),
        pow2_height: (h >> level).max(1),
    }
}

/// Builds the arena entry of a 2D texture. Host memory is allocated and current; nothing
/// native exists yet.
pub(crate) fn create_state(
    id: TextureId,
    desc: &TextureDesc,
    level_count: u32,
    flags: CreateFlags,
    lease: &mut Lease<'_>,
) -> Result<TextureState, Error> {
    let info = desc.format.info();
    let cube = desc.usage.contains(Usage::LEGACY_CUBEMAP);
    if desc.depth != 1 {
        return Err(Error::InvalidArgument("2D textures have a depth of 1"));
    }
    if cube && desc.width != desc.height {
        logwise::warn_sync!(
            "Cube map faces of {w}x{h} are not square",
            w = desc.width,
            h = desc.height
        );
        return Err(Error::InvalidArgument("cube map faces must be square"));
    }
    let max = lease.caps.max_texture_size;
    if desc.width > max || desc.height > max {
        logwise::warn_sync!(
            "Texture of {w}x{h} exceeds the device maximum {max}",
            w = desc.width,
            h = desc.height,
            max = max
        );
        return Err(Error::InvalidArgument("texture larger than the device maximum"));
    }
    if desc.usage.contains(Usage::OWNDC) && !info.flags.contains(FormatFlags::GETDC) {
        logwise::warn_sync!(
            "Own-DC texture of format {format}, which has no legacy bitmap layout",
            format = logwise::privacy::LogIt(&desc.format)
        );
        return Err(Error::InvalidArgument("format has no legacy bitmap layout"));
    }
    let plan = adaptation::plan_2d(
        &Request {
            width: desc.width,
            height: desc.height,
            level_count,
            cube,
            compressed: info.is_compressed(),
            autogen_mipmap: desc.usage.contains(Usage::AUTOGENMIPMAP),
            pool: desc.pool,
        },
        lease.caps,
        lease.diagnostics,
    )?;
    let layer_count = if cube { 6 } else { 1 };
    let mut sub_resources = Vec::with_capacity((level_count * layer_count) as usize);
    for layer in 0..layer_count {
        for level in 0..level_count {
            let size = (
                (desc.width >> level).max(1),
                (desc.height >> level).max(1),
                1,
            );
            let mut sub = SubResource::new(
                id,
                layer * level_count + level,
                level,
                layer,
                size,
                backing(desc.width, desc.height, level, plan.padded),
                Location::SYSMEM,
            );
            if desc.usage.contains(Usage::OVERLAY) {
                sub.overlay = Some(OverlayState::default());
            }
            sub_resources.push(sub);
        }
    }
    let mut state = TextureState {
        id,
        ops: &SURFACE_OPS,
        resource_type: ResourceType::Texture2d,
        format: desc.format,
        usage: desc.usage,
        pool: desc.pool,
        multisample_type: desc.multisample_type,
        multisample_quality: desc.multisample_quality,
        width: desc.width,
        height: desc.height,
        depth: 1,
        level_count,
        layer_count,
        flags: plan.flags,
        target: plan.target,
        pow2_matrix: plan.matrix,
        gpu: Default::default(),
        conversion: None,
        color_key: ColorKeyState::default(),
        lod: 0,
        filter_type: FilterType::Linear,
        alignment: lease.config.surface_alignment,
        row_pitch: 0,
        user_memory: None,
        draw_binding: DrawBinding::Texture,
        sub_resources: sub_resources.into_boxed_slice(),
    };
    let own_dc = desc.usage.contains(Usage::OWNDC) && !flags.contains(CreateFlags::PIN_SYSMEM);
    for index in 0..state.sub_resource_count() {
        if own_dc {
            legacy_view::create_bitmap(&mut state, lease, index)?;
            state.sub_resources[index as usize].map_binding = Location::DIB;
            locations::validate(&mut state, index, Location::DIB);
            locations::invalidate(&mut state, index, Location::SYSMEM);
        } else {
            locations::prepare_location(&mut state, lease, index, Location::SYSMEM)?;
        }
    }
    logwise::trace_sync!(
        "Planned surfaces of {id}: target {target}, padded {padded}",
        id = logwise::privacy::LogIt(&id),
        target = logwise::privacy::LogIt(&plan.target),
        padded = plan.padded
    );
    Ok(state)
}

/// Gives a single-surface texture new dimensions, format and host storage.
///
/// Previous contents are lost. Everything is checked before anything changes.
pub(crate) fn replace_backing_store(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    store: BackingStore,
) -> Result<(), Error> {
    if texture.resource_type != ResourceType::Texture2d || texture.sub_resource_count() != 1 {
        logwise::warn_sync!(
            "Backing store replaced on texture {id} with {count} sub-resources",
            id = logwise::privacy::LogIt(&texture.id),
            count = texture.sub_resource_count()
        );
        return Err(Error::InvalidArgument(
            "backing store replacement needs a single 2D sub-resource",
        ));
    }
    let info = store.format.info();
    if store.format == FormatId::Unknown || store.width == 0 || store.height == 0 {
        return Err(Error::InvalidArgument("invalid backing store description"));
    }
    let max = lease.caps.max_texture_size;
    if store.width > max || store.height > max {
        logwise::warn_sync!(
            "Backing store of {w}x{h} exceeds the device maximum {max}",
            w = store.width,
            h = store.height,
            max = max
        );
        return Err(Error::InvalidArgument("backing store larger than the device maximum"));
    }
    if store.pitch != 0
        && (info.is_compressed()
            || store.pitch % info.byte_count != 0
            || store.pitch < info.row_bytes(store.width))
    {
        logwise::warn_sync!(
            "Pitch {pitch} does not fit format {format}",
            pitch = store.pitch,
            format = logwise::privacy::LogIt(&store.format)
        );
        return Err(Error::InvalidArgument("pitch does not fit the format"));
    }
    let sub = &texture.sub_resources[0];
    if sub.legacy_view.is_some() {
        logwise::warn_sync!("Backing store replaced while a legacy view is outstanding");
        return Err(Error::LegacyViewInUse);
    }
    if sub.map_count != 0 {
        logwise::warn_sync!("Backing store replaced while mapped");
        return Err(Error::InvalidArgument("sub-resource is mapped"));
    }
    if !info.supports_multisample(store.multisample_type, store.multisample_quality) {
        return Err(Error::Unsupported("multisample type"));
    }
    if texture.usage.contains(Usage::OWNDC) && !info.flags.contains(FormatFlags::GETDC) {
        return Err(Error::InvalidArgument("format has no legacy bitmap layout"));
    }
    let alignment = if store.memory.is_some() || store.pitch != 0 {
        1
    } else {
        texture.alignment
    };
    let (pitch, _) = info
        .calculate_pitch(alignment, store.width, store.height)
        .ok_or(Error::InvalidArgument("backing store too large for host memory"))?;
    let pitch = if store.pitch != 0 { store.pitch } else { pitch };
    if pitch.checked_mul(info.row_count(store.height)).is_none() {
        return Err(Error::InvalidArgument("pitch too large for host memory"));
    }
    if let Some(memory) = &store.memory {
        let needed = pitch as usize * info.row_count(store.height) as usize;
        if memory.len() < needed {
            logwise::warn_sync!(
                "User memory of {len} bytes, needs {needed}",
                len = memory.len(),
                needed = needed
            );
            return Err(Error::InvalidArgument("user memory too small"));
        }
    }
    let plan = adaptation::plan_2d(
        &Request {
            width: store.width,
            height: store.height,
            level_count: 1,
            cube: false,
            compressed: info.is_compressed(),
            autogen_mipmap: texture.usage.contains(Usage::AUTOGENMIPMAP),
            pool: texture.pool,
        },
        lease.caps,
        lease.diagnostics,
    )?;

    logwise::info_sync!(
        "Replacing backing store of {id} with {w}x{h} {format}",
        id = logwise::privacy::LogIt(&texture.id),
        w = store.width,
        h = store.height,
        format = logwise::privacy::LogIt(&store.format)
    );
    gpu_object::force_reload(texture);
    gpu_object::delete_native(texture, lease);
    let had_bitmap = legacy_view::destroy_bitmap(texture, 0);

    texture.format = store.format;
    texture.multisample_type = store.multisample_type;
    texture.multisample_quality = store.multisample_quality;
    texture.width = store.width;
    texture.height = store.height;
    texture.row_pitch = if store.memory.is_some() || store.pitch != 0 {
        pitch
    } else {
        0
    };
    texture.flags.remove(
        TextureFlags::NORMALIZED_COORDS | TextureFlags::POW2_MAT_IDENT | TextureFlags::COND_NP2,
    );
    texture.flags.insert(plan.flags);
    texture.target = plan.target;
    texture.pow2_matrix = plan.matrix;
    texture.user_memory = store.memory;
    let sub = &mut texture.sub_resources[0];
    sub.width = store.width;
    sub.height = store.height;
    sub.backing = backing(store.width, store.height, 0, plan.padded);
    sub.sysmem = None;

    let valid = if texture.user_memory.is_some() {
        Location::USER_MEMORY
    } else {
        locations::prepare_location(texture, lease, 0, Location::SYSMEM)?;
        Location::SYSMEM
    };
    texture.sub_resources[0].map_binding = valid;
    locations::validate(texture, 0, valid);
    locations::invalidate(texture, 0, !valid);

    if had_bitmap || texture.usage.contains(Usage::OWNDC) {
        legacy_view::create_bitmap(texture, lease, 0)?;
        if texture.usage.contains(Usage::OWNDC) && valid == Location::SYSMEM {
            locations::ensure(texture, lease, 0, Location::DIB)?;
            texture.sub_resources[0].map_binding = Location::DIB;
        }
    }
    Ok(())
}
