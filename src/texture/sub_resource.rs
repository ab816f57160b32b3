// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Sub-resources: one mip level of one layer.
use super::dirty_tracking::DirtyRegions;
use super::legacy_view::{LegacyBitmap, LegacyViewHandle};
use super::locations::{self, Location};
use super::overlay::OverlayState;
use super::{MultisampleType, Pool, SubResourceData, Texture, TextureId, TextureState, Usage};
use crate::coordinates::TexelBox;
use crate::device::{Context, Lease};
use crate::error::Error;
use crate::pixel_formats::conversion::image_len;
use crate::pixel_formats::{FormatFlags, FormatId, FormatInfo};
use bitflags::bitflags;

/// Geometry of the native storage behind a sub-resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Backing {
    /// A 2D image, possibly padded to powers of two on the device.
    Surface { pow2_width: u32, pow2_height: u32 },
    Volume,
}

#[derive(Debug)]
pub(crate) struct SubResource {
    /// Owning texture; not a strong reference.
    pub(crate) texture: TextureId,
    pub(crate) index: u32,
    pub(crate) level: u32,
    pub(crate) layer: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) backing: Backing,
    pub(crate) locations: Location,
    /// Dirty regions of the linear and gamma native copies.
    pub(crate) dirty: [DirtyRegions; 2],
    pub(crate) sysmem: Option<Vec<u8>>,
    pub(crate) bitmap: Option<LegacyBitmap>,
    /// The outstanding legacy view, if any.
    pub(crate) legacy_view: Option<LegacyViewHandle>,
    /// Authoritative host location.
    pub(crate) map_binding: Location,
    pub(crate) map_count: u32,
    pub(crate) overlay: Option<OverlayState>,
}

impl SubResource {
    pub(crate) fn new(
        texture: TextureId,
        index: u32,
        level: u32,
        layer: u32,
        size: (u32, u32, u32),
        backing: Backing,
        locations: Location,
    ) -> Self {
        SubResource {
            texture,
            index,
            level,
            layer,
            width: size.0,
            height: size.1,
            depth: size.2,
            backing,
            locations,
            dirty: [DirtyRegions::whole(), DirtyRegions::whole()],
            sysmem: None,
            bitmap: None,
            legacy_view: None,
            map_binding: Location::SYSMEM,
            map_count: 0,
            overlay: None,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// Size of the native image allocated for this sub-resource, before any height scale.
    pub(crate) fn storage_size(&self) -> (u32, u32, u32) {
        match self.backing {
            Backing::Surface {
                pow2_width,
                pow2_height,
            } => (pow2_width, pow2_height, 1),
            Backing::Volume => self.size(),
        }
    }

    /// The box covering the logical contents inside the native image.
    ///
    /// Planar formats store extra rows below the image, which the box includes.
    pub(crate) fn storage_box(&self, info: &FormatInfo) -> TexelBox {
        let height = if info.flags.contains(FormatFlags::HEIGHT_SCALE) {
            info.height_scale.apply(self.height)
        } else {
            self.height
        };
        TexelBox::whole(self.width, height, self.depth)
    }
}

impl TextureState {
    /// Bytes of host memory one sub-resource needs.
    pub(crate) fn host_len(&self, index: u32) -> usize {
        let sub = &self.sub_resources[index as usize];
        let (_, slice_pitch) = self.pitch(sub.level);
        slice_pitch as usize * sub.depth as usize
    }

    /// Runs `f` over the bytes of a host location.
    pub(crate) fn with_cpu<R>(
        &self,
        index: u32,
        location: Location,
        f: impl FnOnce(&[u8]) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let sub = &self.sub_resources[index as usize];
        match location {
            Location::SYSMEM => f(sub.sysmem.as_deref().ok_or_else(|| missing(index, location))?),
            Location::USER_MEMORY => {
                let memory = self
                    .user_memory
                    .as_ref()
                    .ok_or_else(|| missing(index, location))?;
                f(&memory.lock())
            }
            Location::DIB => f(&sub
                .bitmap
                .as_ref()
                .ok_or_else(|| missing(index, location))?
                .bits),
            _ => Err(missing(index, location)),
        }
    }

    pub(crate) fn with_cpu_mut<R>(
        &mut self,
        index: u32,
        location: Location,
        f: impl FnOnce(&mut [u8]) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let sub = &mut self.sub_resources[index as usize];
        match location {
            Location::SYSMEM => f(sub
                .sysmem
                .as_deref_mut()
                .ok_or_else(|| missing(index, location))?),
            Location::USER_MEMORY => {
                let memory = self
                    .user_memory
                    .as_ref()
                    .ok_or_else(|| missing(index, location))?;
                f(&mut memory.lock())
            }
            Location::DIB => f(&mut sub
                .bitmap
                .as_mut()
                .ok_or_else(|| missing(index, location))?
                .bits),
            _ => Err(missing(index, location)),
        }
    }

    /// Checks a box against mip `level`, including block alignment for compressed formats.
    pub(crate) fn check_box(&self, index: u32, region: &TexelBox) -> Result<(), Error> {
        let sub = &self.sub_resources[index as usize];
        let info = self.format.info();
        if region.is_empty() || !region.fits_within(sub.width, sub.height, sub.depth) {
            logwise::warn_sync!(
                "Region {region} outside sub-resource {index}",
                region = logwise::privacy::LogIt(region),
                index = index
            );
            return Err(Error::InvalidArgument("region outside sub-resource"));
        }
        if info.is_compressed()
            && !region.is_block_aligned(info.block_width, info.block_height, sub.width, sub.height)
        {
            return Err(Error::InvalidArgument("region not block aligned"));
        }
        if info.flags.contains(FormatFlags::HEIGHT_SCALE)
            && *region != TexelBox::whole(sub.width, sub.height, sub.depth)
        {
            return Err(Error::InvalidArgument("planar formats only take whole updates"));
        }
        Ok(())
    }
}

fn missing(index: u32, location: Location) -> Error {
    logwise::error_sync!(
        "Sub-resource {index} has no storage for {location}",
        index = index,
        location = logwise::privacy::LogIt(&location)
    );
    Error::NoValidLocation {
        sub_resource: index,
    }
}

/// Checks initial data against the texture before anything is allocated for it.
pub(crate) fn validate_initial_data(
    texture: &TextureState,
    data: &[SubResourceData<'_>],
) -> Result<(), Error> {
    if data.len() != texture.sub_resource_count() as usize {
        logwise::warn_sync!(
            "Initial data for {given} sub-resources, texture has {count}",
            given = data.len(),
            count = texture.sub_resource_count()
        );
        return Err(Error::InvalidArgument("initial data count mismatch"));
    }
    let info = texture.format.info();
    for (sub, entry) in texture.sub_resources.iter().zip(data) {
        check_pitch(texture.format, sub.width, sub.height, entry.row_pitch, entry.slice_pitch)?;
        let needed = image_len(
            entry.row_pitch,
            entry.slice_pitch,
            info.row_bytes(sub.width),
            info.row_count(sub.height),
            sub.depth,
        );
        if entry.data.len() < needed {
            logwise::warn_sync!(
                "Initial data for sub-resource {index} holds {len} bytes, needs {needed}",
                index = sub.index,
                len = entry.data.len(),
                needed = needed
            );
            return Err(Error::InvalidArgument("initial data too small"));
        }
    }
    Ok(())
}

/// Caller pitches must cover a row, and a slice must cover its rows.
pub(crate) fn check_pitch(
    format: FormatId,
    width: u32,
    height: u32,
    row_pitch: u32,
    slice_pitch: u32,
) -> Result<(), Error> {
    let info = format.info();
    if row_pitch < info.row_bytes(width) {
        return Err(Error::InvalidArgument("row pitch smaller than a row"));
    }
    if slice_pitch != 0 {
        let slice = row_pitch
            .checked_mul(info.row_count(height))
            .ok_or(Error::InvalidArgument("row pitch overflows a slice"))?;
        if slice_pitch < slice {
            return Err(Error::InvalidArgument("slice pitch smaller than a slice"));
        }
    }
    Ok(())
}

/// Writes initial contents into the map binding, then makes the linear native copy current.
pub(crate) fn upload_initial(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    data: &SubResourceData<'_>,
) -> Result<(), Error> {
    let sub = &texture.sub_resources[index as usize];
    let map_binding = sub.map_binding;
    let region = TexelBox::whole(sub.width, sub.height, sub.depth);
    locations::prepare_location(texture, lease, index, map_binding)?;
    locations::write_host(
        texture,
        index,
        &region,
        data.data,
        data.row_pitch,
        data.slice_pitch,
    )?;
    locations::ensure(texture, lease, index, Location::TEXTURE_RGB)
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// The caller will not write; other locations stay valid.
        const READ_ONLY = 1 << 0;
        /// Previous contents are not needed and are not loaded.
        const DISCARD = 1 << 1;
    }
}

/// Where a mapped region lives inside the mapped bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub offset: usize,
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

/// Description of one sub-resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResourceDesc {
    pub format: FormatId,
    pub multisample_type: MultisampleType,
    pub multisample_quality: u32,
    pub usage: Usage,
    pub pool: Pool,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Bytes of host memory.
    pub size: u32,
}

impl Texture {
    pub fn sub_resource(&self, context: &mut Context<'_>, index: u32) -> Result<SubResourceDesc, Error> {
        self.with_state(context, |t, _| {
            t.check_index(index)?;
            let sub = &t.sub_resources[index as usize];
            Ok(SubResourceDesc {
                format: t.format,
                multisample_type: t.multisample_type,
                multisample_quality: t.multisample_quality,
                usage: t.usage,
                pool: t.pool,
                width: sub.width,
                height: sub.height,
                depth: sub.depth,
                size: t.host_len(index) as u32,
            })
        })
    }

    /// Where sub-resource `index` is currently valid.
    pub fn location_flags(&self, context: &mut Context<'_>, index: u32) -> Result<Location, Error> {
        self.with_state(context, |t, _| {
            t.check_index(index)?;
            Ok(t.sub_resources[index as usize].locations)
        })
    }

    /// Marks the top level of `layer` as modified behind the engine's back, over `region` or
    /// entirely.
    pub fn add_dirty_region(
        &self,
        context: &mut Context<'_>,
        layer: u32,
        region: Option<TexelBox>,
    ) -> Result<(), Error> {
        self.with_state(context, |t, lease| {
            if layer >= t.layer_count {
                logwise::warn_sync!(
                    "Layer {layer} out of range",
                    layer = layer
                );
                return Err(Error::InvalidArgument("layer out of range"));
            }
            let index = layer * t.level_count;
            if let Some(region) = &region {
                t.check_box(index, region)?;
            }
            let ops = t.ops;
            ops.add_dirty_region(t, lease, index, region.as_ref())
        })
    }

    /// Writes `data` into `region` of sub-resource `index` (the whole sub-resource for `None`).
    ///
    /// Only the written region of the native copies becomes stale.
    pub fn update_region(
        &self,
        context: &mut Context<'_>,
        index: u32,
        region: Option<TexelBox>,
        data: &[u8],
        row_pitch: u32,
        slice_pitch: u32,
    ) -> Result<(), Error> {
        self.with_state(context, |t, lease| {
            t.check_index(index)?;
            let sub = &t.sub_resources[index as usize];
            let whole = TexelBox::whole(sub.width, sub.height, sub.depth);
            let region = region.unwrap_or(whole);
            t.check_box(index, &region)?;
            check_pitch(t.format, region.width(), region.height(), row_pitch, slice_pitch)?;
            let sub = &t.sub_resources[index as usize];
            if sub.legacy_view.is_some() {
                return Err(Error::LegacyViewInUse);
            }
            if sub.map_count != 0 {
                return Err(Error::InvalidArgument("sub-resource is mapped"));
            }
            let map_binding = sub.map_binding;
            if region == whole {
                locations::prepare_location(t, lease, index, map_binding)?;
            } else {
                locations::ensure(t, lease, index, map_binding)?;
            }
            logwise::trace_sync!(
                "Updating {region} of sub-resource {index}",
                region = logwise::privacy::LogIt(&region),
                index = index
            );
            locations::write_host(t, index, &region, data, row_pitch, slice_pitch)
        })
    }

    /// Makes the map binding of sub-resource `index` current and marks it mapped.
    ///
    /// Unless `READ_ONLY` is given, every other location becomes stale over `region`.
    pub fn map(
        &self,
        context: &mut Context<'_>,
        index: u32,
        region: Option<TexelBox>,
        flags: MapFlags,
    ) -> Result<MappedRegion, Error> {
        self.with_state(context, |t, lease| {
            t.check_index(index)?;
            let sub = &t.sub_resources[index as usize];
            if sub.legacy_view.is_some() {
                return Err(Error::LegacyViewInUse);
            }
            if sub.map_count != 0 {
                logwise::warn_sync!(
                    "Sub-resource {index} is already mapped",
                    index = index
                );
                return Err(Error::InvalidArgument("sub-resource is already mapped"));
            }
            let region = region.unwrap_or(TexelBox::whole(sub.width, sub.height, sub.depth));
            t.check_box(index, &region)?;
            let map_binding = t.sub_resources[index as usize].map_binding;
            if flags.contains(MapFlags::DISCARD) && !flags.contains(MapFlags::READ_ONLY) {
                locations::prepare_location(t, lease, index, map_binding)?;
                locations::validate(t, index, map_binding);
            } else {
                locations::ensure(t, lease, index, map_binding)?;
            }
            if !flags.contains(MapFlags::READ_ONLY) {
                locations::invalidate_region(t, index, !map_binding, Some(&region));
            }
            let info = t.format.info();
            let (row_pitch, slice_pitch) = t.pitch(t.sub_resources[index as usize].level);
            t.sub_resources[index as usize].map_count += 1;
            Ok(MappedRegion {
                offset: region.front as usize * slice_pitch as usize
                    + (region.top / info.block_height) as usize * row_pitch as usize
                    + (region.left / info.block_width) as usize * info.byte_count as usize,
                row_pitch,
                slice_pitch,
            })
        })
    }

    /// Runs `f` over the whole host memory of a mapped sub-resource.
    pub fn with_mapped_bytes<R>(
        &self,
        context: &mut Context<'_>,
        index: u32,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, Error> {
        self.with_state(context, |t, _| {
            t.check_index(index)?;
            let sub = &t.sub_resources[index as usize];
            if sub.map_count == 0 {
                return Err(Error::InvalidArgument("sub-resource is not mapped"));
            }
            let map_binding = sub.map_binding;
            t.with_cpu_mut(index, map_binding, |bytes| Ok(f(bytes)))
        })
    }

    pub fn unmap(&self, context: &mut Context<'_>, index: u32) -> Result<(), Error> {
        self.with_state(context, |t, _| {
            t.check_index(index)?;
            let sub = &mut t.sub_resources[index as usize];
            if sub.map_count == 0 {
                logwise::warn_sync!(
                    "Sub-resource {index} is not mapped",
                    index = index
                );
                return Err(Error::InvalidArgument("sub-resource is not mapped"));
            }
            sub.map_count -= 1;
            Ok(())
        })
    }
}
