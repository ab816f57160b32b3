// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Host-side blits between 2D sub-resources.
//!
//! Blits run on the authoritative host copies: the source is brought current in its map binding
//! and copied out, then written into the destination's map binding, which leaves the
//! destination's other locations stale over the written rectangle.
use super::locations::{self, Location};
use super::{ColorKey, ColorKeyFlags, ResourceType, Texture, TextureId, TextureState};
use crate::coordinates::{Rect, TexelBox};
use crate::device::{Context, Lease};
use crate::error::Error;
use crate::pixel_formats::{Float4, FormatFlags, FormatInfo};
use crate::sampler::FilterType;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BlitFlags: u32 {
        /// Fill the destination with [`BlitFx::fill_color`]; there is no source.
        const COLOR_FILL = 1 << 0;
        /// Skip source texels matching the source's blit key.
        const KEY_SRC = 1 << 1;
        /// Skip source texels matching [`BlitFx::src_color_key`].
        const KEY_SRC_OVERRIDE = 1 << 2;
        /// Only write destination texels matching the destination's blit key.
        const KEY_DEST = 1 << 3;
        /// Only write destination texels matching [`BlitFx::dst_color_key`].
        const KEY_DEST_OVERRIDE = 1 << 4;
    }
}

/// Extra blit parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BlitFx {
    pub fill_color: Float4,
    pub src_color_key: ColorKey,
    pub dst_color_key: ColorKey,
}

impl Default for BlitFx {
    fn default() -> Self {
        BlitFx {
            fill_color: Float4::TRANSPARENT_BLACK,
            src_color_key: ColorKey::default(),
            dst_color_key: ColorKey::default(),
        }
    }
}

/// Where a blit reads from.
#[derive(Debug, Copy, Clone)]
pub struct BlitSource<'a> {
    pub texture: &'a Texture,
    pub index: u32,
    /// `None` for the whole sub-resource.
    pub rect: Option<Rect>,
}

/// Source texels copied out of the source texture.
struct SourceImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    row_pitch: usize,
    key: Option<ColorKey>,
}

fn check_surface(texture: &TextureState, index: u32) -> Result<(), Error> {
    texture.check_index(index)?;
    if texture.resource_type != ResourceType::Texture2d {
        return Err(Error::InvalidArgument("blits need 2D textures"));
    }
    let sub = &texture.sub_resources[index as usize];
    if sub.legacy_view.is_some() {
        return Err(Error::LegacyViewInUse);
    }
    if sub.map_count != 0 {
        return Err(Error::InvalidArgument("sub-resource is mapped"));
    }
    Ok(())
}

fn check_rect(texture: &TextureState, index: u32, rect: Option<Rect>) -> Result<Rect, Error> {
    let sub = &texture.sub_resources[index as usize];
    let rect = rect.unwrap_or(Rect::whole(sub.width, sub.height));
    if rect.is_empty() || !rect.fits_within(sub.width, sub.height) {
        logwise::warn_sync!(
            "Blit rectangle {rect} outside sub-resource {index}",
            rect = logwise::privacy::LogIt(&rect),
            index = index
        );
        return Err(Error::InvalidArgument("blit rectangle outside sub-resource"));
    }
    let info = texture.format.info();
    if info.is_compressed()
        && !rect
            .to_box()
            .is_block_aligned(info.block_width, info.block_height, sub.width, sub.height)
    {
        return Err(Error::InvalidArgument("blit rectangle not block aligned"));
    }
    Ok(rect)
}

/// Whether texels can only be moved whole rows at a time.
fn raw_only(info: &FormatInfo) -> bool {
    info.is_compressed() || info.flags.contains(FormatFlags::HEIGHT_SCALE)
}

fn read_source(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    source: &BlitSource<'_>,
    flags: BlitFlags,
    fx: &BlitFx,
) -> Result<SourceImage, Error> {
    check_surface(texture, source.index)?;
    let rect = check_rect(texture, source.index, source.rect)?;
    let key = if flags.contains(BlitFlags::KEY_SRC_OVERRIDE) {
        Some(fx.src_color_key)
    } else if flags.contains(BlitFlags::KEY_SRC) {
        let key = texture.color_key.get(ColorKeyFlags::SRC_BLT);
        if key.is_none() {
            logwise::warn_sync!("Source key requested, but the source has none set");
        }
        key
    } else {
        None
    };
    let index = source.index;
    let map_binding = texture.sub_resources[index as usize].map_binding;
    locations::ensure(texture, lease, index, map_binding)?;
    let info = texture.format.info();
    let (row_pitch, _) = texture.pitch(texture.sub_resources[index as usize].level);
    let row_bytes = info.row_bytes(rect.width()) as usize;
    let rows = info.row_count(rect.height()) as usize;
    let bytes = texture.with_cpu(index, map_binding, |bytes| {
        let mut out = Vec::with_capacity(row_bytes * rows);
        for y in 0..rows {
            let start = ((rect.top / info.block_height) as usize + y) * row_pitch as usize
                + (rect.left / info.block_width) as usize * info.byte_count as usize;
            let row = bytes
                .get(start..start + row_bytes)
                .ok_or(Error::InvalidArgument("blit source outside host memory"))?;
            out.extend_from_slice(row);
        }
        Ok(out)
    })?;
    Ok(SourceImage {
        bytes,
        width: rect.width(),
        height: rect.height(),
        row_pitch: row_bytes,
        key,
    })
}

fn bilinear(info: &FormatInfo) -> bool {
    info.byte_count == 4
        && [info.red, info.green, info.blue]
            .iter()
            .all(|c| c.bits == 8 && c.shift % 8 == 0)
        && (info.alpha.bits == 0 || (info.alpha.bits == 8 && info.alpha.shift % 8 == 0))
}

/// Samples the source at destination texel (`x`, `y`) of a `dst_w` × `dst_h` rectangle.
#[allow(clippy::too_many_arguments)]
fn sample(
    src: &SourceImage,
    info: &FormatInfo,
    x: u32,
    y: u32,
    dst_w: u32,
    dst_h: u32,
    linear: bool,
    out: &mut [u8],
) {
    let bpp = info.byte_count as usize;
    if !linear {
        let sx = (x as u64 * src.width as u64 / dst_w as u64) as usize;
        let sy = (y as u64 * src.height as u64 / dst_h as u64) as usize;
        let start = sy * src.row_pitch + sx * bpp;
        out.copy_from_slice(&src.bytes[start..start + bpp]);
        return;
    }
    let fx = ((x as f32 + 0.5) * src.width as f32 / dst_w as f32 - 0.5).max(0.0);
    let fy = ((y as f32 + 0.5) * src.height as f32 / dst_h as f32 - 0.5).max(0.0);
    let x0 = (fx as u32).min(src.width - 1) as usize;
    let y0 = (fy as u32).min(src.height - 1) as usize;
    let x1 = (x0 + 1).min(src.width as usize - 1);
    let y1 = (y0 + 1).min(src.height as usize - 1);
    let (wx, wy) = (fx - x0 as f32, fy - y0 as f32);
    let texel = |tx: usize, ty: usize, c: usize| src.bytes[ty * src.row_pitch + tx * bpp + c] as f32;
    for (c, byte) in out.iter_mut().enumerate() {
        let top = texel(x0, y0, c) * (1.0 - wx) + texel(x1, y0, c) * wx;
        let bottom = texel(x0, y1, c) * (1.0 - wx) + texel(x1, y1, c) * wx;
        *byte = (top * (1.0 - wy) + bottom * wy).round() as u8;
    }
}

impl Texture {
    /// Copies or fills a rectangle of 2D sub-resource `dst_index`.
    ///
    /// Stretching is supported for uncompressed formats; `Linear` filtering applies to formats
    /// with 8-bit channels, others use the nearest texel. Source and destination formats must
    /// match. The source may be the destination itself.
    #[allow(clippy::too_many_arguments)]
    pub fn blit(
        &self,
        context: &mut Context<'_>,
        dst_index: u32,
        dst_rect: Option<Rect>,
        source: Option<BlitSource<'_>>,
        flags: BlitFlags,
        fx: &BlitFx,
        filter: FilterType,
    ) -> Result<(), Error> {
        if !Arc::ptr_eq(self.device(), context.device()) {
            return Err(Error::WrongDevice);
        }
        let (textures, mut lease) = context.split();
        let src = match (flags.contains(BlitFlags::COLOR_FILL), &source) {
            (true, _) => None,
            (false, Some(source)) => {
                if !Arc::ptr_eq(source.texture.device(), self.device()) {
                    return Err(Error::WrongDevice);
                }
                let id: TextureId = source.texture.id();
                let texture = textures.get_mut(&id).ok_or(Error::Destroyed)?;
                let format = texture.format;
                Some((format, read_source(texture, &mut lease, source, flags, fx)?))
            }
            (false, None) => return Err(Error::InvalidArgument("blit without a source")),
        };
        let texture = textures.get_mut(&self.id()).ok_or(Error::Destroyed)?;
        check_surface(texture, dst_index)?;
        let rect = check_rect(texture, dst_index, dst_rect)?;
        let info = texture.format.info();
        let dst_key = if flags.contains(BlitFlags::KEY_DEST_OVERRIDE) {
            Some(fx.dst_color_key)
        } else if flags.contains(BlitFlags::KEY_DEST) {
            texture.color_key.get(ColorKeyFlags::DST_BLT)
        } else {
            None
        };
        let fill = match &src {
            None => Some(info.encode_color(&fx.fill_color).ok_or_else(|| {
                logwise::warn_sync!(
                    "Cannot fill format {format}",
                    format = logwise::privacy::LogIt(&texture.format)
                );
                Error::Unsupported("color fill of this format")
            })?),
            Some((format, image)) => {
                if *format != texture.format {
                    logwise::warn_sync!(
                        "Blit from {src} to {dst} needs a format conversion",
                        src = logwise::privacy::LogIt(format),
                        dst = logwise::privacy::LogIt(&texture.format)
                    );
                    return Err(Error::Unsupported("format conversion blit"));
                }
                if raw_only(info)
                    && (image.width != rect.width()
                        || image.height != rect.height()
                        || image.key.is_some()
                        || dst_key.is_some())
                {
                    return Err(Error::Unsupported("stretched or keyed blit of a block format"));
                }
                None
            }
        };

        let index = dst_index;
        let sub = &texture.sub_resources[index as usize];
        let map_binding = sub.map_binding;
        let whole = rect == Rect::whole(sub.width, sub.height);
        if whole && dst_key.is_none() {
            locations::prepare_location(texture, &mut lease, index, map_binding)?;
        } else {
            locations::ensure(texture, &mut lease, index, map_binding)?;
        }
        let (row_pitch, _) = texture.pitch(texture.sub_resources[index as usize].level);
        let row_pitch = row_pitch as usize;
        let bpp = info.byte_count as usize;
        let linear = filter == FilterType::Linear
            && bilinear(info)
            && src
                .as_ref()
                .is_some_and(|(_, s)| s.width != rect.width() || s.height != rect.height());
        logwise::trace_sync!(
            "Blitting into {rect} of sub-resource {index}",
            rect = logwise::privacy::LogIt(&rect),
            index = index
        );
        texture.with_cpu_mut(index, map_binding, |bytes| {
            if let Some((_, image)) = src.as_ref().filter(|_| raw_only(info)) {
                let rows = info.row_count(rect.height()) as usize;
                for y in 0..rows {
                    let start = ((rect.top / info.block_height) as usize + y) * row_pitch
                        + (rect.left / info.block_width) as usize * bpp;
                    let row = &image.bytes[y * image.row_pitch..(y + 1) * image.row_pitch];
                    bytes
                        .get_mut(start..start + row.len())
                        .ok_or(Error::InvalidArgument("blit outside host memory"))?
                        .copy_from_slice(row);
                }
                return Ok(());
            }
            let mut texel = vec![0u8; bpp];
            for y in 0..rect.height() {
                for x in 0..rect.width() {
                    let start = (rect.top + y) as usize * row_pitch + (rect.left + x) as usize * bpp;
                    let out = bytes
                        .get_mut(start..start + bpp)
                        .ok_or(Error::InvalidArgument("blit outside host memory"))?;
                    if let Some(key) = dst_key {
                        if !key.contains(info.color_bits(info.read_texel(out))) {
                            continue;
                        }
                    }
                    match (&fill, &src) {
                        (Some(fill), _) => out.copy_from_slice(fill),
                        (None, Some((_, image))) => {
                            sample(image, info, x, y, rect.width(), rect.height(), linear, &mut texel);
                            if let Some(key) = image.key {
                                if key.contains(info.color_bits(info.read_texel(&texel))) {
                                    continue;
                                }
                            }
                            out.copy_from_slice(&texel);
                        }
                        (None, None) => {}
                    }
                }
            }
            Ok(())
        })?;
        locations::validate(texture, index, map_binding);
        let region: TexelBox = rect.to_box();
        locations::invalidate_region(texture, index, !map_binding, Some(&region));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, Device, DeviceConfig};
    use crate::imp::soft::SoftDriver;
    use crate::pixel_formats::FormatId;
    use crate::texture::TextureBuilder;

    fn read_all(texture: &Texture, context: &mut Context<'_>) -> Vec<u8> {
        texture
            .map(context, 0, None, crate::texture::MapFlags::READ_ONLY)
            .unwrap();
        let bytes = texture
            .with_mapped_bytes(context, 0, |b| b.to_vec())
            .unwrap();
        texture.unmap(context, 0).unwrap();
        bytes
    }

    #[test]
    fn test_fill() {
        let device = Device::new(
            Box::new(SoftDriver::new(Capabilities::default())),
            DeviceConfig::default(),
        );
        let mut context = device.acquire_context();
        let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 2, 2)
            .build(&mut context)
            .unwrap();
        let fx = BlitFx {
            fill_color: Float4 {
                r: 1.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
            ..BlitFx::default()
        };
        texture
            .blit(
                &mut context,
                0,
                Some(Rect::new(1, 0, 2, 1)),
                None,
                BlitFlags::COLOR_FILL,
                &fx,
                FilterType::Point,
            )
            .unwrap();
        let bytes = read_all(&texture, &mut context);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0xff, 0xff]);
    }

    #[test]
    fn test_stretch_with_source_key() {
        let device = Device::new(
            Box::new(SoftDriver::new(Capabilities::default())),
            DeviceConfig::default(),
        );
        let mut context = device.acquire_context();
        let src = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 2, 1)
            .build(&mut context)
            .unwrap();
        let dst = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 1)
            .build(&mut context)
            .unwrap();
        src.update_region(
            &mut context,
            0,
            None,
            &[1, 2, 3, 0xff, 9, 9, 9, 0xff],
            8,
            8,
        )
        .unwrap();
        let fx = BlitFx {
            src_color_key: ColorKey::single(0x090909),
            ..BlitFx::default()
        };
        dst.blit(
            &mut context,
            0,
            None,
            Some(BlitSource {
                texture: &src,
                index: 0,
                rect: None,
            }),
            BlitFlags::KEY_SRC_OVERRIDE,
            &fx,
            FilterType::Point,
        )
        .unwrap();
        let bytes = read_all(&dst, &mut context);
        assert_eq!(
            bytes,
            vec![1, 2, 3, 0xff, 1, 2, 3, 0xff, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_format_mismatch() {
        let device = Device::new(
            Box::new(SoftDriver::new(Capabilities::default())),
            DeviceConfig::default(),
        );
        let mut context = device.acquire_context();
        let src = TextureBuilder::new_2d(FormatId::B5G6R5Unorm, 2, 2)
            .build(&mut context)
            .unwrap();
        let dst = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 2, 2)
            .build(&mut context)
            .unwrap();
        let result = dst.blit(
            &mut context,
            0,
            None,
            Some(BlitSource {
                texture: &src,
                index: 0,
                rect: None,
            }),
            BlitFlags::empty(),
            &BlitFx::default(),
            FilterType::Point,
        );
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }
}
