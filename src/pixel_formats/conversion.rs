// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel conversions run between host memory and GPU storage.
//!
//! A texture whose host format cannot be stored directly on the device is uploaded through a
//! [`Conversion`]. Two kinds exist:
//!
//! - device conversions, when the device lacks a format (half floats are widened to 32-bit floats)
//! - color-key substitution, when a source color key has to be emulated with an alpha channel
//!
//! Conversions run on tightly packed output; callers pass the host pitch for the input.
use crate::device::Capabilities;
use crate::error::Error;
use crate::pixel_formats::{ChannelMask, FormatId, FormatInfo, f16};
use crate::texture::ColorKey;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConversionKind {
    /// 16-bit float channels to 32-bit float channels.
    HalfToFloat,
    /// Alpha-less or alpha-carrying formats to an alpha format, keyed texels get alpha 0.
    ColorKey,
}

/// A conversion from a host format to a storage format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub src: FormatId,
    pub dst: FormatId,
    pub kind: ConversionKind,
}

/// Converted texels, tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    pub bytes: Vec<u8>,
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

/// The conversion this device needs for `format`, if any.
pub fn device_conversion(format: FormatId, caps: &Capabilities) -> Option<Conversion> {
    match format {
        FormatId::R16Float if !caps.half_float_textures => Some(Conversion {
            src: FormatId::R16Float,
            dst: FormatId::R32Float,
            kind: ConversionKind::HalfToFloat,
        }),
        FormatId::R16G16B16A16Float if !caps.half_float_textures => Some(Conversion {
            src: FormatId::R16G16B16A16Float,
            dst: FormatId::R32G32B32A32Float,
            kind: ConversionKind::HalfToFloat,
        }),
        _ => None,
    }
}

/// The conversion emulating a source color key for `format`, if the format has one.
pub fn color_key_conversion(format: FormatId) -> Option<Conversion> {
    format.info().color_key_substitute.map(|dst| Conversion {
        src: format,
        dst,
        kind: ConversionKind::ColorKey,
    })
}

fn rescale(value: u64, from: ChannelMask, to: ChannelMask) -> u64 {
    if from.bits == 0 || to.bits == 0 {
        return 0;
    }
    if from.bits == to.bits {
        return value;
    }
    let from_max = (1u64 << from.bits) - 1;
    let to_max = (1u64 << to.bits) - 1;
    (value * to_max + from_max / 2) / from_max
}

fn move_channel(texel: u64, from: ChannelMask, to: ChannelMask) -> u64 {
    rescale(from.extract(texel), from, to) << to.shift
}

impl Conversion {
    pub fn src_info(&self) -> &'static FormatInfo {
        self.src.info()
    }

    pub fn dst_info(&self) -> &'static FormatInfo {
        self.dst.info()
    }

    /// Whether storage contents can be converted back to the host format without loss.
    pub fn is_reversible(&self) -> bool {
        match self.kind {
            ConversionKind::HalfToFloat => true,
            ConversionKind::ColorKey => {
                let s = self.src_info();
                let d = self.dst_info();
                s.alpha.bits == 0
                    && s.red.bits <= d.red.bits
                    && s.green.bits <= d.green.bits
                    && s.blue.bits <= d.blue.bits
            }
        }
    }

    fn convert_texel(&self, src: &[u8], dst: &mut [u8], key: Option<ColorKey>) {
        match self.kind {
            ConversionKind::HalfToFloat => {
                for (h, f) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                    let h = f16::from_le_bytes([h[0], h[1]]);
                    f.copy_from_slice(&h.to_f32().to_le_bytes());
                }
            }
            ConversionKind::ColorKey => {
                let s = self.src_info();
                let d = self.dst_info();
                let texel = s.read_texel(src);
                let keyed = key.is_some_and(|k| k.contains(s.color_bits(texel)));
                let mut out = move_channel(texel, s.red, d.red)
                    | move_channel(texel, s.green, d.green)
                    | move_channel(texel, s.blue, d.blue);
                if !keyed {
                    out |= d.alpha.mask();
                }
                d.write_texel(dst, out);
            }
        }
    }

    fn revert_texel(&self, src: &[u8], dst: &mut [u8]) {
        match self.kind {
            ConversionKind::HalfToFloat => {
                for (f, h) in src.chunks_exact(4).zip(dst.chunks_exact_mut(2)) {
                    let f = f32::from_le_bytes([f[0], f[1], f[2], f[3]]);
                    h.copy_from_slice(&f16::from_f32(f).to_le_bytes());
                }
            }
            ConversionKind::ColorKey => {
                let s = self.src_info();
                let d = self.dst_info();
                let texel = d.read_texel(src);
                let out = move_channel(texel, d.red, s.red)
                    | move_channel(texel, d.green, s.green)
                    | move_channel(texel, d.blue, s.blue);
                s.write_texel(dst, out);
            }
        }
    }

    /// Converts a `width` × `height` × `depth` image read from `src` with the given pitches.
    ///
    /// `key` is only consulted by color-key conversions.
    pub fn convert(
        &self,
        src: &[u8],
        src_row_pitch: u32,
        src_slice_pitch: u32,
        width: u32,
        height: u32,
        depth: u32,
        key: Option<ColorKey>,
    ) -> Result<ConvertedImage, Error> {
        let s = self.src_info();
        let d = self.dst_info();
        let row_pitch = d.row_bytes(width);
        let slice_pitch = row_pitch * height;
        let total = slice_pitch as usize * depth as usize;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(total)
            .map_err(|_| Error::OutOfMemory)?;
        bytes.resize(total, 0);
        let needed = image_len(src_row_pitch, src_slice_pitch, s.row_bytes(width), height, depth);
        if src.len() < needed {
            return Err(Error::InvalidArgument("conversion source is too small"));
        }
        let sb = s.byte_count as usize;
        let db = d.byte_count as usize;
        for z in 0..depth as usize {
            for y in 0..height as usize {
                let src_row = z * src_slice_pitch as usize + y * src_row_pitch as usize;
                let dst_row = z * slice_pitch as usize + y * row_pitch as usize;
                for x in 0..width as usize {
                    self.convert_texel(
                        &src[src_row + x * sb..src_row + (x + 1) * sb],
                        &mut bytes[dst_row + x * db..dst_row + (x + 1) * db],
                        key,
                    );
                }
            }
        }
        Ok(ConvertedImage {
            bytes,
            row_pitch,
            slice_pitch,
        })
    }

    /// Converts tightly packed storage texels back into host memory laid out with the given pitches.
    pub fn revert(
        &self,
        src: &[u8],
        width: u32,
        height: u32,
        depth: u32,
        dst: &mut [u8],
        dst_row_pitch: u32,
        dst_slice_pitch: u32,
    ) -> Result<(), Error> {
        if !self.is_reversible() {
            logwise::warn_sync!(
                "Cannot convert {dst} back to {src}",
                dst = logwise::privacy::LogIt(&self.dst),
                src = logwise::privacy::LogIt(&self.src)
            );
            return Err(Error::Unsupported("download of converted texture data"));
        }
        let s = self.src_info();
        let d = self.dst_info();
        let row_pitch = d.row_bytes(width) as usize;
        let slice_pitch = row_pitch * height as usize;
        let needed = image_len(dst_row_pitch, dst_slice_pitch, s.row_bytes(width), height, depth);
        if dst.len() < needed || src.len() < slice_pitch * depth as usize {
            return Err(Error::InvalidArgument("conversion destination is too small"));
        }
        let sb = s.byte_count as usize;
        let db = d.byte_count as usize;
        for z in 0..depth as usize {
            for y in 0..height as usize {
                let src_row = z * slice_pitch + y * row_pitch;
                let dst_row = z * dst_slice_pitch as usize + y * dst_row_pitch as usize;
                for x in 0..width as usize {
                    self.revert_texel(
                        &src[src_row + x * db..src_row + (x + 1) * db],
                        &mut dst[dst_row + x * sb..dst_row + (x + 1) * sb],
                    );
                }
            }
        }
        Ok(())
    }
}

/// Bytes spanned by an image with the given pitches, not counting trailing row padding.
pub(crate) fn image_len(row_pitch: u32, slice_pitch: u32, row_bytes: u32, rows: u32, depth: u32) -> usize {
    if rows == 0 || depth == 0 {
        return 0;
    }
    (depth as usize - 1) * slice_pitch as usize + (rows as usize - 1) * row_pitch as usize + row_bytes as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_to_float_round_trip() {
        let conversion = device_conversion(
            FormatId::R16Float,
            &Capabilities {
                half_float_textures: false,
                ..Capabilities::default()
            },
        )
        .unwrap();
        let mut src = Vec::new();
        for v in [0.5f32, -2.0, 1.0] {
            src.extend_from_slice(&f16::from_f32(v).to_le_bytes());
        }
        src.extend_from_slice(&[0, 0]); //row padding
        let converted = conversion.convert(&src, 8, 8, 3, 1, 1, None).unwrap();
        assert_eq!(converted.row_pitch, 12);
        assert_eq!(&converted.bytes[4..8], &(-2.0f32).to_le_bytes());

        let mut back = vec![0u8; 8];
        conversion
            .revert(&converted.bytes, 3, 1, 1, &mut back, 8, 8)
            .unwrap();
        assert_eq!(&back[..6], &src[..6]);
    }

    #[test]
    fn test_four_channel_half_to_float() {
        let conversion = device_conversion(
            FormatId::R16G16B16A16Float,
            &Capabilities {
                half_float_textures: false,
                ..Capabilities::default()
            },
        )
        .unwrap();
        assert_eq!(conversion.dst, FormatId::R32G32B32A32Float);
        let channels = [0.25f32, -1.0, 4.0, 1.0];
        let src: Vec<u8> = channels
            .iter()
            .flat_map(|c| f16::from_f32(*c).to_le_bytes())
            .collect();
        let converted = conversion.convert(&src, 8, 8, 1, 1, 1, None).unwrap();
        assert_eq!(converted.row_pitch, 16);
        let expected: Vec<u8> = channels.iter().flat_map(|c| c.to_le_bytes()).collect();
        assert_eq!(converted.bytes, expected);

        let mut back = vec![0u8; 8];
        conversion
            .revert(&converted.bytes, 1, 1, 1, &mut back, 8, 8)
            .unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn test_no_conversion_with_half_float_support() {
        assert!(device_conversion(FormatId::R16Float, &Capabilities::default()).is_none());
    }

    #[test]
    fn test_color_key_sets_alpha() {
        let conversion = color_key_conversion(FormatId::B8G8R8X8Unorm).unwrap();
        assert_eq!(conversion.dst, FormatId::B8G8R8A8Unorm);
        //magenta is keyed, green is not
        let src = [0xff, 0x00, 0xff, 0x12, 0x00, 0xff, 0x00, 0x34];
        let key = ColorKey {
            low: 0x00ff00ff,
            high: 0x00ff00ff,
        };
        let converted = conversion.convert(&src, 8, 8, 2, 1, 1, Some(key)).unwrap();
        assert_eq!(converted.bytes, vec![0xff, 0x00, 0xff, 0x00, 0x00, 0xff, 0x00, 0xff]);
        assert!(conversion.is_reversible());
    }

    #[test]
    fn test_565_key_is_not_reversible() {
        let conversion = color_key_conversion(FormatId::B5G6R5Unorm).unwrap();
        assert!(!conversion.is_reversible());
        let mut dst = [0u8; 2];
        assert!(conversion.revert(&[0, 0], 1, 1, 1, &mut dst, 2, 2).is_err());
        //white converts to white with alpha
        let converted = conversion.convert(&[0xff, 0xff], 2, 2, 1, 1, 1, None).unwrap();
        assert_eq!(converted.bytes, vec![0xff, 0xff]);
    }
}
