// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Decoding PNG files into initial texture data.
use crate::error::Error;
use crate::pixel_formats::FormatId;
use crate::texture::SubResourceData;
use png::ColorType;
use std::io::Cursor;

/// A decoded image, tightly packed in the requested format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub format: FormatId,
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub data: Vec<u8>,
}

impl DecodedImage {
    /// Borrows the image as initial data for a single sub-resource.
    pub fn as_sub_resource_data(&self) -> SubResourceData<'_> {
        SubResourceData {
            data: &self.data,
            row_pitch: self.row_pitch,
            slice_pitch: self.row_pitch * self.height,
        }
    }
}

/// Decodes PNG `bytes` into one of the 8-bit four-channel formats.
///
/// Palettes and 16-bit channels are normalized to 8 bits; gray images are expanded to color.
pub fn decode_png(bytes: &[u8], format: FormatId) -> Result<DecodedImage, Error> {
    let swap_red_blue = match format {
        FormatId::R8G8B8A8Unorm | FormatId::R8G8B8X8Unorm => false,
        FormatId::B8G8R8A8Unorm | FormatId::B8G8R8X8Unorm => true,
        _ => return Err(Error::Unsupported("png decode target format")),
    };
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder.read_info()?;
    let size = reader
        .output_buffer_size()
        .ok_or(Error::OutOfMemory)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
    buf.resize(size, 0);
    let info = reader.next_frame(&mut buf)?;

    let texels = info.width as usize * info.height as usize;
    let mut data = Vec::new();
    data.try_reserve_exact(texels * 4)
        .map_err(|_| Error::OutOfMemory)?;
    for y in 0..info.height as usize {
        let line = &buf[y * info.line_size..(y + 1) * info.line_size];
        for x in 0..info.width as usize {
            let [r, g, b, a] = match info.color_type {
                ColorType::Grayscale => [line[x]; 3].into_rgba(0xff),
                ColorType::GrayscaleAlpha => [line[2 * x]; 3].into_rgba(line[2 * x + 1]),
                ColorType::Rgb => [line[3 * x], line[3 * x + 1], line[3 * x + 2]].into_rgba(0xff),
                ColorType::Rgba => [line[4 * x], line[4 * x + 1], line[4 * x + 2], line[4 * x + 3]],
                ColorType::Indexed => return Err(Error::Unsupported("unexpanded png palette")),
            };
            if swap_red_blue {
                data.extend_from_slice(&[b, g, r, a]);
            } else {
                data.extend_from_slice(&[r, g, b, a]);
            }
        }
    }
    logwise::trace_sync!(
        "Decoded png {w}x{h}",
        w = info.width,
        h = info.height
    );
    Ok(DecodedImage {
        format,
        width: info.width,
        height: info.height,
        row_pitch: info.width * 4,
        data,
    })
}

trait IntoRgba {
    fn into_rgba(self, alpha: u8) -> [u8; 4];
}

impl IntoRgba for [u8; 3] {
    fn into_rgba(self, alpha: u8) -> [u8; 4] {
        [self[0], self[1], self[2], alpha]
    }
}
