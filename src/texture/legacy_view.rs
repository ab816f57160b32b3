// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Legacy bitmap views of 2D sub-resources.

Older drawing APIs draw into a device-independent bitmap. A sub-resource can lend one out: the
bitmap is created on first use and becomes the [`Location::DIB`] copy of the sub-resource. While
a view is outstanding the bitmap is the only valid location, and the sub-resource counts as
mapped.

On release, textures whose authoritative host memory is not the bitmap (caller memory, or
pinned system memory) copy the bitmap back immediately, so the caller sees the drawing without
a further call.
*/
use super::locations::{self, Location};
use super::{ResourceType, Texture, TextureFlags, TextureState};
use crate::device::{Context, Lease};
use crate::error::Error;
use crate::pixel_formats::{FormatFlags, FormatId};

/// Identifies one legacy bitmap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LegacyViewHandle(u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BitmapCompression {
    /// Uncompressed, channel layout implied by the bit count.
    Rgb,
    /// Channel layout given by the masks.
    BitFields,
}

/// Header of a legacy bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapInfo {
    /// Texels per row, including pitch padding.
    pub width: i32,
    /// Negative: rows run top-down.
    pub height: i32,
    pub bit_count: u16,
    pub size_image: u32,
    pub compression: BitmapCompression,
    /// Red, green and blue masks, only for [`BitmapCompression::BitFields`].
    pub masks: Option<[u32; 3]>,
    /// Color table of palettized bitmaps, as blue, green, red, reserved.
    pub palette: Option<Vec<[u8; 4]>>,
}

#[derive(Debug)]
pub(crate) struct LegacyBitmap {
    pub(crate) handle: LegacyViewHandle,
    pub(crate) info: BitmapInfo,
    pub(crate) bits: Vec<u8>,
}

/// An outstanding view returned by [`Texture::acquire_legacy_view`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyView {
    pub handle: LegacyViewHandle,
    pub info: BitmapInfo,
}

fn bitmap_info(texture: &TextureState, index: u32) -> BitmapInfo {
    let info = texture.format.info();
    let sub = &texture.sub_resources[index as usize];
    let (row_pitch, slice_pitch) = texture.pitch(sub.level);
    let bit_fields = matches!(
        texture.format,
        FormatId::B5G5R5X1Unorm
            | FormatId::B5G5R5A1Unorm
            | FormatId::B4G4R4A4Unorm
            | FormatId::B4G4R4X4Unorm
            | FormatId::B2G3R3Unorm
            | FormatId::R10G10B10A2Unorm
            | FormatId::R8G8B8A8Unorm
            | FormatId::R8G8B8X8Unorm
            | FormatId::B10G10R10A2Unorm
            | FormatId::B5G6R5Unorm
            | FormatId::R16G16B16A16Unorm
    );
    let masks = bit_fields.then(|| {
        [
            info.red.mask() as u32,
            info.green.mask() as u32,
            info.blue.mask() as u32,
        ]
    });
    let palette = (info.byte_count == 1).then(|| vec![[0u8; 4]; 256]);
    BitmapInfo {
        width: (row_pitch / info.byte_count) as i32,
        height: -(sub.height as i32),
        bit_count: (info.byte_count * 8) as u16,
        size_image: slice_pitch,
        compression: if bit_fields {
            BitmapCompression::BitFields
        } else {
            BitmapCompression::Rgb
        },
        masks,
        palette,
    }
}

/// Creates the bitmap of a sub-resource if it has none yet.
pub(crate) fn create_bitmap(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    index: u32,
) -> Result<(), Error> {
    if texture.sub_resources[index as usize].bitmap.is_some() {
        return Ok(());
    }
    if !texture.format.info().flags.contains(FormatFlags::GETDC) {
        logwise::warn_sync!(
            "Cannot create a legacy bitmap for format {format}",
            format = logwise::privacy::LogIt(&texture.format)
        );
        return Err(Error::InvalidArgument("format has no legacy bitmap layout"));
    }
    let info = bitmap_info(texture, index);
    let len = texture.host_len(index);
    let mut bits = Vec::new();
    bits.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    bits.resize(len, 0);
    let handle = LegacyViewHandle(*lease.next_bitmap);
    *lease.next_bitmap += 1;
    logwise::trace_sync!(
        "Creating legacy bitmap {width}x{height}x{bits}",
        width = info.width,
        height = info.height,
        bits = info.bit_count
    );
    texture.sub_resources[index as usize].bitmap = Some(LegacyBitmap { handle, info, bits });
    Ok(())
}

pub(crate) fn destroy_bitmap(texture: &mut TextureState, index: u32) -> bool {
    texture.sub_resources[index as usize].bitmap.take().is_some()
}

impl Texture {
    /// Lends out the legacy bitmap of a 2D sub-resource, creating it on first use.
    ///
    /// The bitmap holds the current contents, and every other location is stale until the view
    /// is released.
    pub fn acquire_legacy_view(
        &self,
        context: &mut Context<'_>,
        index: u32,
    ) -> Result<LegacyView, Error> {
        self.with_state(context, |t, lease| {
            t.check_index(index)?;
            if t.resource_type != ResourceType::Texture2d {
                return Err(Error::InvalidArgument("legacy views need a 2D texture"));
            }
            if !t.format.info().flags.contains(FormatFlags::GETDC) {
                logwise::warn_sync!(
                    "Legacy view requested for format {format}",
                    format = logwise::privacy::LogIt(&t.format)
                );
                return Err(Error::InvalidArgument("format has no legacy bitmap layout"));
            }
            let sub = &t.sub_resources[index as usize];
            if sub.legacy_view.is_some() {
                logwise::warn_sync!(
                    "Legacy view of sub-resource {index} already in use",
                    index = index
                );
                return Err(Error::LegacyViewInUse);
            }
            if sub.map_count != 0 {
                return Err(Error::InvalidArgument("sub-resource is mapped"));
            }
            create_bitmap(t, lease, index)?;
            let sub = &mut t.sub_resources[index as usize];
            if sub.map_binding != Location::USER_MEMORY && !t.flags.contains(TextureFlags::PIN_SYSMEM)
            {
                sub.map_binding = Location::DIB;
            }
            locations::ensure(t, lease, index, Location::DIB)?;
            locations::invalidate(t, index, !Location::DIB);
            let sub = &mut t.sub_resources[index as usize];
            sub.map_count += 1;
            let bitmap = sub
                .bitmap
                .as_ref()
                .ok_or(Error::NoValidLocation {
                    sub_resource: index,
                })?;
            sub.legacy_view = Some(bitmap.handle);
            logwise::trace_sync!(
                "Lent legacy view {handle} of sub-resource {index}",
                handle = logwise::privacy::LogIt(&bitmap.handle),
                index = index
            );
            Ok(LegacyView {
                handle: bitmap.handle,
                info: bitmap.info.clone(),
            })
        })
    }

    /// Ends a legacy view.
    ///
    /// The view counts as a write: every location but the bitmap becomes stale, including
    /// native copies loaded while the view was out. Pinned or caller host memory is brought
    /// current before returning.
    pub fn release_legacy_view(
        &self,
        context: &mut Context<'_>,
        index: u32,
        handle: LegacyViewHandle,
    ) -> Result<(), Error> {
        self.with_state(context, |t, lease| {
            t.check_index(index)?;
            if t.resource_type != ResourceType::Texture2d {
                return Err(Error::InvalidArgument("legacy views need a 2D texture"));
            }
            let sub = &mut t.sub_resources[index as usize];
            if sub.legacy_view != Some(handle) {
                logwise::warn_sync!(
                    "Legacy view {handle} of sub-resource {index} is not outstanding",
                    handle = logwise::privacy::LogIt(&handle),
                    index = index
                );
                return Err(Error::NoLegacyView);
            }
            sub.legacy_view = None;
            sub.map_count = sub.map_count.saturating_sub(1);
            let map_binding = sub.map_binding;
            // the caller drew into the bitmap; native copies loaded meanwhile are stale
            if sub.locations.contains(Location::DIB) {
                locations::invalidate(t, index, !Location::DIB);
            }
            if map_binding == Location::USER_MEMORY
                || (t.flags.contains(TextureFlags::PIN_SYSMEM) && map_binding != Location::DIB)
            {
                locations::ensure(t, lease, index, map_binding)?;
                locations::invalidate(t, index, Location::DIB);
            }
            Ok(())
        })
    }

    /// Runs `f` over the bits of an outstanding legacy view.
    pub fn legacy_view_bits<R>(
        &self,
        context: &mut Context<'_>,
        index: u32,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, Error> {
        self.with_state(context, |t, _| {
            t.check_index(index)?;
            let sub = &t.sub_resources[index as usize];
            match (&sub.legacy_view, &sub.bitmap) {
                (Some(_), Some(bitmap)) => Ok(f(&bitmap.bits)),
                _ => Err(Error::NoLegacyView),
            }
        })
    }

    /// Runs `f` over the bits of an outstanding legacy view, for drawing into it.
    pub fn legacy_view_bits_mut<R>(
        &self,
        context: &mut Context<'_>,
        index: u32,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, Error> {
        self.with_state(context, |t, _| {
            t.check_index(index)?;
            let sub = &mut t.sub_resources[index as usize];
            match (&sub.legacy_view, &mut sub.bitmap) {
                (Some(_), Some(bitmap)) => Ok(f(&mut bitmap.bits)),
                _ => Err(Error::NoLegacyView),
            }
        })
    }
}
