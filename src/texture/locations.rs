// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Location validity for sub-resources.

Every sub-resource carries a [`Location`] set naming where its current contents live. Writes
invalidate every location except the one written; reads call [`ensure`] to bring a location
current from the cheapest valid source.

```text
             ┌──────────┐  copy   ┌─────────────┐  copy  ┌─────┐
             │  SYSMEM  │◀───────▶│ USER_MEMORY │◀──────▶│ DIB │
             └──────────┘         └─────────────┘        └─────┘
                  │ ▲ upload / download (through a conversion when CONVERTED)
                  ▼ │
       ┌─────────────┐          ┌──────────────┐
       │ TEXTURE_RGB │          │ TEXTURE_SRGB │
       └─────────────┘          └──────────────┘
```

GPU locations never copy to each other directly; they go through host memory.
*/
use super::{TextureFlags, TextureState};
use crate::coordinates::TexelBox;
use crate::device::Lease;
use crate::error::Error;
use crate::imp::{ImageIndex, PixelData};
use crate::pixel_formats::FormatFlags;
use crate::pixel_formats::conversion::ConversionKind;
use bitflags::bitflags;

bitflags! {
    /// Where a sub-resource's contents are current.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Location: u32 {
        /// Contents are undefined and need no transfer to materialize.
        const DISCARDED = 1 << 0;
        /// Engine-owned host memory.
        const SYSMEM = 1 << 1;
        /// Caller-owned host memory.
        const USER_MEMORY = 1 << 2;
        /// Bits of the legacy bitmap.
        const DIB = 1 << 3;
        const TEXTURE_RGB = 1 << 4;
        const TEXTURE_SRGB = 1 << 5;

        const CPU = Self::SYSMEM.bits() | Self::USER_MEMORY.bits() | Self::DIB.bits();
        const GPU = Self::TEXTURE_RGB.bits() | Self::TEXTURE_SRGB.bits();
    }
}

impl Location {
    /// The native texture location for the linear or gamma variant.
    pub fn texture(srgb: bool) -> Location {
        if srgb {
            Location::TEXTURE_SRGB
        } else {
            Location::TEXTURE_RGB
        }
    }

    /// Index of the GPU variant this single GPU location names.
    pub(crate) fn variant(self) -> usize {
        usize::from(self == Location::TEXTURE_SRGB)
    }
}

/// Marks `location` current. Validating a GPU location means its dirty list is empty.
pub(crate) fn validate(texture: &mut TextureState, index: u32, location: Location) {
    let sub = &mut texture.sub_resources[index as usize];
    sub.locations.insert(location);
    for gpu in (location & Location::GPU).iter() {
        sub.dirty[gpu.variant()].mark_clean();
    }
    logwise::trace_sync!(
        "Sub-resource {index} of {id} now valid in {locations}",
        index = index,
        id = logwise::privacy::LogIt(&texture.id),
        locations = logwise::privacy::LogIt(&sub.locations)
    );
}

/// Marks `mask` stale over the whole sub-resource.
pub(crate) fn invalidate(texture: &mut TextureState, index: u32, mask: Location) {
    if mask.intersects(Location::GPU) {
        texture.set_dirty();
    }
    let sub = &mut texture.sub_resources[index as usize];
    for gpu in (mask & Location::GPU).iter() {
        sub.dirty[gpu.variant()].mark_whole();
    }
    clear_bits(texture, index, mask);
}

/// Marks `mask` stale over `region` only, so GPU copies can later upload just that region.
///
/// `None`, a region covering the sub-resource, or a planar format invalidates the whole
/// sub-resource.
pub(crate) fn invalidate_region(
    texture: &mut TextureState,
    index: u32,
    mask: Location,
    region: Option<&TexelBox>,
) {
    let info = texture.format.info();
    let (width, height, depth) = texture.sub_resources[index as usize].size();
    let region = match region {
        Some(r)
            if !info.flags.contains(FormatFlags::HEIGHT_SCALE)
                && *r != TexelBox::whole(width, height, depth) =>
        {
            *r
        }
        _ => return invalidate(texture, index, mask),
    };
    if mask.intersects(Location::GPU) {
        texture.set_dirty();
    }
    let sub = &mut texture.sub_resources[index as usize];
    for gpu in (mask & Location::GPU).iter() {
        let dirty = &mut sub.dirty[gpu.variant()];
        if sub.locations.contains(gpu) {
            dirty.mark_clean();
        }
        dirty.add(region);
    }
    clear_bits(texture, index, mask);
}

fn clear_bits(texture: &mut TextureState, index: u32, mask: Location) {
    let sub = &mut texture.sub_resources[index as usize];
    sub.locations.remove(mask);
    logwise::trace_sync!(
        "Sub-resource {index} of {id} invalidated {mask}, left {locations}",
        index = index,
        id = logwise::privacy::LogIt(&texture.id),
        mask = logwise::privacy::LogIt(&mask),
        locations = logwise::privacy::LogIt(&sub.locations)
    );
    if sub.locations.is_empty() {
        logwise::error_sync!(
            "Sub-resource {index} of {id} has no valid location left",
            index = index,
            id = logwise::privacy::LogIt(&texture.id)
        );
    }
}

/// Allocates whatever `location` needs to hold data, without transferring anything.
pub(crate) fn prepare_location(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    location: Location,
) -> Result<(), Error> {
    match location {
        Location::SYSMEM => {
            let len = texture.host_len(index);
            let sub = &mut texture.sub_resources[index as usize];
            if sub.sysmem.is_none() {
                let mut bytes = Vec::new();
                bytes.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
                bytes.resize(len, 0);
                sub.sysmem = Some(bytes);
            }
            Ok(())
        }
        Location::USER_MEMORY => {
            if texture.user_memory.is_none() {
                logwise::error_sync!(
                    "Texture {id} has no user memory",
                    id = logwise::privacy::LogIt(&texture.id)
                );
                return Err(Error::InvalidArgument("texture has no user memory"));
            }
            Ok(())
        }
        Location::DIB => super::legacy_view::create_bitmap(texture, lease, index),
        Location::TEXTURE_RGB => super::gpu_object::prepare(texture, lease, false),
        Location::TEXTURE_SRGB => super::gpu_object::prepare(texture, lease, true),
        _ => Ok(()),
    }
}

/// Makes `location` current for one sub-resource.
pub(crate) fn ensure(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    location: Location,
) -> Result<(), Error> {
    let current = texture.sub_resources[index as usize].locations;
    if current.contains(location) {
        return Ok(());
    }
    logwise::trace_sync!(
        "Loading sub-resource {index} of {id} into {location} from {current}",
        index = index,
        id = logwise::privacy::LogIt(&texture.id),
        location = logwise::privacy::LogIt(&location),
        current = logwise::privacy::LogIt(&current)
    );
    if !current.intersects(Location::CPU | Location::GPU) {
        if current.contains(Location::DISCARDED) {
            prepare_location(texture, lease, index, location)?;
            validate(texture, index, location);
            texture.sub_resources[index as usize]
                .locations
                .remove(Location::DISCARDED);
            return Ok(());
        }
        logwise::error_sync!(
            "Sub-resource {index} of {id} has no valid location to load {location} from",
            index = index,
            id = logwise::privacy::LogIt(&texture.id),
            location = logwise::privacy::LogIt(&location)
        );
        return Err(Error::NoValidLocation {
            sub_resource: index,
        });
    }
    prepare_location(texture, lease, index, location)?;
    if location.intersects(Location::CPU) {
        load_cpu(texture, lease, index, location)?;
    } else {
        load_gpu(texture, lease, index, location == Location::TEXTURE_SRGB)?;
    }
    validate(texture, index, location);
    Ok(())
}

fn load_cpu(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    destination: Location,
) -> Result<(), Error> {
    let sub = &texture.sub_resources[index as usize];
    let cpu_sources = [sub.map_binding, Location::SYSMEM, Location::USER_MEMORY, Location::DIB];
    if let Some(source) = cpu_sources
        .into_iter()
        .find(|s| *s != destination && sub.locations.contains(*s))
    {
        return copy_cpu(texture, index, source, destination);
    }
    for srgb in [false, true] {
        if sub.locations.contains(Location::texture(srgb)) {
            return download(texture, lease, index, srgb, destination);
        }
    }
    Err(Error::NoValidLocation {
        sub_resource: index,
    })
}

fn load_gpu(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    srgb: bool,
) -> Result<(), Error> {
    let sub = &texture.sub_resources[index as usize];
    let map_binding = sub.map_binding;
    let host_sources = [map_binding, Location::SYSMEM, Location::USER_MEMORY];
    if let Some(source) = host_sources
        .into_iter()
        .find(|s| sub.locations.contains(*s))
    {
        return upload(texture, lease, index, srgb, source);
    }
    if sub.locations.contains(Location::texture(!srgb)) {
        let host = if map_binding == Location::DIB {
            Location::SYSMEM
        } else {
            map_binding
        };
        ensure(texture, lease, index, host)?;
        return upload(texture, lease, index, srgb, host);
    }
    if sub.locations.contains(Location::DIB) {
        return upload(texture, lease, index, srgb, Location::DIB);
    }
    Err(Error::NoValidLocation {
        sub_resource: index,
    })
}

fn copy_cpu(
    texture: &mut TextureState,
    index: u32,
    source: Location,
    destination: Location,
) -> Result<(), Error> {
    let bytes = texture.with_cpu(index, source, |bytes| Ok(bytes.to_vec()))?;
    texture.with_cpu_mut(index, destination, |out| {
        let len = out.len().min(bytes.len());
        out[..len].copy_from_slice(&bytes[..len]);
        Ok(())
    })
}

/// Sends host texels from `source` to the GPU variant, limited to its dirty regions when known.
fn upload(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    srgb: bool,
    source: Location,
) -> Result<(), Error> {
    let variant = usize::from(srgb);
    let name = texture.gpu[variant].name.ok_or(Error::NoValidLocation {
        sub_resource: index,
    })?;
    let sub = &texture.sub_resources[index as usize];
    let image = ImageIndex {
        level: sub.level,
        layer: sub.layer,
    };
    let regions = match sub.dirty[variant].regions() {
        Some(regions) if !regions.is_empty() => regions.to_vec(),
        _ => vec![sub.storage_box(texture.format.info())],
    };
    let (row_pitch, slice_pitch) = texture.pitch(sub.level);
    let info = texture.format.info();
    let conversion = texture
        .flags
        .contains(TextureFlags::CONVERTED)
        .then_some(texture.conversion)
        .flatten();
    let key = conversion
        .filter(|c| c.kind == ConversionKind::ColorKey)
        .map(|_| texture.color_key.applied);
    texture.with_cpu(index, source, |bytes| {
        for region in &regions {
            let offset = region.front as usize * slice_pitch as usize
                + (region.top / info.block_height) as usize * row_pitch as usize
                + (region.left / info.block_width) as usize * info.byte_count as usize;
            let bytes = bytes
                .get(offset..)
                .ok_or(Error::InvalidArgument("region outside host memory"))?;
            logwise::trace_sync!(
                "Uploading {region} of sub-resource {index}",
                region = logwise::privacy::LogIt(region),
                index = index
            );
            match &conversion {
                Some(conversion) => {
                    let converted = conversion.convert(
                        bytes,
                        row_pitch,
                        slice_pitch,
                        region.width(),
                        region.height(),
                        region.depth(),
                        key,
                    )?;
                    lease.driver.upload(
                        name,
                        image,
                        region,
                        PixelData {
                            bytes: &converted.bytes,
                            row_pitch: converted.row_pitch,
                            slice_pitch: converted.slice_pitch,
                        },
                    )?;
                }
                None => lease.driver.upload(
                    name,
                    image,
                    region,
                    PixelData {
                        bytes,
                        row_pitch,
                        slice_pitch,
                    },
                )?,
            }
        }
        Ok(())
    })?;
    texture.sub_resources[index as usize].dirty[variant].mark_clean();
    Ok(())
}

/// Reads the whole sub-resource back from a GPU variant into a host location.
fn download(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
    srgb: bool,
    destination: Location,
) -> Result<(), Error> {
    let name = texture.gpu[usize::from(srgb)]
        .name
        .ok_or(Error::NoValidLocation {
            sub_resource: index,
        })?;
    let sub = &texture.sub_resources[index as usize];
    let image = ImageIndex {
        level: sub.level,
        layer: sub.layer,
    };
    let region = sub.storage_box(texture.format.info());
    let (row_pitch, slice_pitch) = texture.pitch(sub.level);
    let conversion = texture
        .flags
        .contains(TextureFlags::CONVERTED)
        .then_some(texture.conversion)
        .flatten();
    logwise::trace_sync!(
        "Downloading sub-resource {index} of {id}",
        index = index,
        id = logwise::privacy::LogIt(&texture.id)
    );
    match conversion {
        Some(conversion) => {
            if !conversion.is_reversible() {
                logwise::warn_sync!(
                    "Cannot read back converted sub-resource {index}",
                    index = index
                );
                return Err(Error::Unsupported("download of converted texture data"));
            }
            let storage = conversion.dst_info();
            let tight_row = storage.row_bytes(region.width());
            let tight_slice = tight_row * region.height();
            let mut staging = vec![0u8; tight_slice as usize * region.depth() as usize];
            lease
                .driver
                .download(name, image, &region, &mut staging, tight_row, tight_slice)?;
            texture.with_cpu_mut(index, destination, |out| {
                conversion.revert(
                    &staging,
                    region.width(),
                    region.height(),
                    region.depth(),
                    out,
                    row_pitch,
                    slice_pitch,
                )
            })
        }
        None => texture.with_cpu_mut(index, destination, |out| {
            lease
                .driver
                .download(name, image, &region, out, row_pitch, slice_pitch)
                .map_err(Error::from)
        }),
    }
}

/// Color-key policy: a change in the source-blit key since the native storage was converted
/// makes every sub-resource dirty.
fn check_color_key(texture: &mut TextureState, lease: &mut Lease<'_>) -> Result<(), Error> {
    if lease.config.shader_color_key {
        return Ok(());
    }
    let key = &texture.color_key;
    let has_key = key.has_src_blt();
    if key.applied_active == has_key && !(key.applied_active && key.applied != key.src_blt) {
        return Ok(());
    }
    logwise::trace_sync!("Reloading because of color key value change");
    let ops = texture.ops;
    for index in 0..texture.sub_resource_count() {
        ops.add_dirty_region(texture, lease, index, None)?;
    }
    texture.set_dirty();
    texture.color_key.applied = texture.color_key.src_blt;
    Ok(())
}

/// Brings every sub-resource current in one native variant.
pub(crate) fn load(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    srgb: bool,
) -> Result<(), Error> {
    let srgb = srgb && lease.needs_separate_srgb();
    check_color_key(texture, lease)?;
    let flag = TextureFlags::valid(srgb);
    if texture.flags.contains(flag) {
        logwise::trace_sync!(
            "Texture {id} already loaded",
            id = logwise::privacy::LogIt(&texture.id)
        );
        return Ok(());
    }
    let ops = texture.ops;
    for index in 0..texture.sub_resource_count() {
        if let Err(e) = ops.load_sub_resource(texture, lease, index, srgb) {
            texture.set_dirty();
            return Err(e);
        }
    }
    texture.flags.insert(flag);
    Ok(())
}

/// Writes caller texels into the map binding and invalidates everything else over `region`.
///
/// `data` holds `region` with the given pitches. The caller has already ensured the map binding
/// is current if the write is partial.
pub(crate) fn write_host(
    texture: &mut TextureState,
    index: u32,
    region: &TexelBox,
    data: &[u8],
    src_row_pitch: u32,
    src_slice_pitch: u32,
) -> Result<(), Error> {
    let sub = &texture.sub_resources[index as usize];
    let map_binding = sub.map_binding;
    let (row_pitch, slice_pitch) = texture.pitch(sub.level);
    let info = texture.format.info();
    let row_bytes = info.row_bytes(region.width()) as usize;
    let rows = info.row_count(region.height()) as usize;
    let needed = crate::pixel_formats::conversion::image_len(
        src_row_pitch,
        src_slice_pitch,
        row_bytes as u32,
        rows as u32,
        region.depth(),
    );
    if data.len() < needed {
        return Err(Error::InvalidArgument("source data is too small"));
    }
    texture.with_cpu_mut(index, map_binding, |out| {
        for z in 0..region.depth() as usize {
            for y in 0..rows {
                let src = z * src_slice_pitch as usize + y * src_row_pitch as usize;
                let dst = (region.front as usize + z) * slice_pitch as usize
                    + ((region.top / info.block_height) as usize + y) * row_pitch as usize
                    + (region.left / info.block_width) as usize * info.byte_count as usize;
                let dst_row = out
                    .get_mut(dst..dst + row_bytes)
                    .ok_or(Error::InvalidArgument("region outside host memory"))?;
                dst_row.copy_from_slice(&data[src..src + row_bytes]);
            }
        }
        Ok(())
    })?;
    validate(texture, index, map_binding);
    invalidate_region(texture, index, !map_binding, Some(region));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composites() {
        assert!(Location::CPU.contains(Location::DIB));
        assert!(!Location::CPU.intersects(Location::GPU));
        assert_eq!(Location::texture(true), Location::TEXTURE_SRGB);
        assert_eq!(Location::TEXTURE_SRGB.variant(), 1);
        assert_eq!(Location::TEXTURE_RGB.variant(), 0);
    }
}
