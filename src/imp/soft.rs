// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A driver whose native textures live in host memory.
//!
//! Useful headless and in tests: every call is counted in [`DriverStats`], which can be
//! observed through a shared handle after the driver has been moved into a device.
use crate::coordinates::TexelBox;
use crate::device::Capabilities;
use crate::imp::{
    Driver, DriverError, ImageIndex, NativeTexture, PixelData, StorageDesc, TexParameter,
    TextureTarget,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Call counters of a [`SoftDriver`].
#[derive(Debug, Default)]
pub struct DriverStats {
    pub textures_created: AtomicU64,
    pub textures_deleted: AtomicU64,
    pub binds: AtomicU64,
    pub images_allocated: AtomicU64,
    pub uploads: AtomicU64,
    pub uploaded_bytes: AtomicU64,
    pub downloads: AtomicU64,
    pub parameters_set: AtomicU64,
    pub lod_bias_set: AtomicU64,
}

impl DriverStats {
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    pub fn textures_created(&self) -> u64 {
        self.textures_created.load(Ordering::Relaxed)
    }

    pub fn textures_deleted(&self) -> u64 {
        self.textures_deleted.load(Ordering::Relaxed)
    }

    pub fn images_allocated(&self) -> u64 {
        self.images_allocated.load(Ordering::Relaxed)
    }

    pub fn parameters_set(&self) -> u64 {
        self.parameters_set.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct SoftImage {
    storage: StorageDesc,
    row_pitch: usize,
    slice_pitch: usize,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct SoftTexture {
    target: TextureTarget,
    images: BTreeMap<ImageIndex, SoftImage>,
    parameters: Vec<TexParameter>,
}

/// Host-memory driver.
#[derive(Debug)]
pub struct SoftDriver {
    caps: Capabilities,
    textures: HashMap<NativeTexture, SoftTexture>,
    next_name: u64,
    bound: Option<(TextureTarget, NativeTexture)>,
    lod_bias: f32,
    memory_limit: Option<usize>,
    allocated: usize,
    stats: Arc<DriverStats>,
}

impl SoftDriver {
    pub fn new(caps: Capabilities) -> Self {
        SoftDriver {
            caps,
            textures: HashMap::new(),
            next_name: 1,
            bound: None,
            lod_bias: 0.0,
            memory_limit: None,
            allocated: 0,
            stats: Arc::new(DriverStats::default()),
        }
    }

    /// Fails allocations once `bytes` of image storage are live.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Shared handle to the call counters.
    pub fn stats(&self) -> Arc<DriverStats> {
        self.stats.clone()
    }

    fn image_mut(&mut self, texture: NativeTexture, image: ImageIndex) -> Result<&mut SoftImage, DriverError> {
        self.textures
            .get_mut(&texture)
            .ok_or(DriverError::NoSuchTexture(texture))?
            .images
            .get_mut(&image)
            .ok_or(DriverError::NoSuchImage(image))
    }
}

/// Byte offset and row length of a region inside an image.
fn region_layout(storage: &StorageDesc, row_pitch: usize, slice_pitch: usize, region: &TexelBox) -> Result<(usize, usize, u32), DriverError> {
    if !region.fits_within(storage.width, storage.height, storage.depth) {
        return Err(DriverError::OutOfBounds);
    }
    let info = storage.format.info();
    let offset = region.front as usize * slice_pitch
        + (region.top / info.block_height) as usize * row_pitch
        + (region.left / info.block_width) as usize * info.byte_count as usize;
    let row_bytes = info.row_bytes(region.width()) as usize;
    let rows = region.height().div_ceil(info.block_height);
    Ok((offset, row_bytes, rows))
}

impl Driver for SoftDriver {
    fn capabilities(&self) -> Capabilities {
        self.caps.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn create_texture(&mut self, target: TextureTarget) -> Result<NativeTexture, DriverError> {
        let name = NativeTexture(self.next_name);
        self.next_name += 1;
        self.textures.insert(
            name,
            SoftTexture {
                target,
                images: BTreeMap::new(),
                parameters: Vec::new(),
            },
        );
        DriverStats::bump(&self.stats.textures_created);
        Ok(name)
    }

    fn delete_texture(&mut self, texture: NativeTexture) {
        if let Some(t) = self.textures.remove(&texture) {
            self.allocated -= t.images.values().map(|i| i.bytes.len()).sum::<usize>();
            DriverStats::bump(&self.stats.textures_deleted);
        }
        if self.bound.is_some_and(|(_, b)| b == texture) {
            self.bound = None;
        }
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: NativeTexture) {
        debug_assert!(self.textures.get(&texture).is_none_or(|t| t.target == target));
        self.bound = Some((target, texture));
        DriverStats::bump(&self.stats.binds);
    }

    fn set_parameter(&mut self, texture: NativeTexture, parameter: TexParameter) {
        if let Some(t) = self.textures.get_mut(&texture) {
            t.parameters.push(parameter);
        }
        DriverStats::bump(&self.stats.parameters_set);
    }

    fn set_lod_bias(&mut self, bias: f32) {
        self.lod_bias = bias;
        DriverStats::bump(&self.stats.lod_bias_set);
    }

    fn allocate_image(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        storage: &StorageDesc,
    ) -> Result<(), DriverError> {
        let info = storage.format.info();
        if info.byte_count == 0 {
            return Err(DriverError::UnsupportedFormat(storage.format));
        }
        let row_pitch = info.row_bytes(storage.width) as usize;
        //storage heights already include any height scale
        let slice_pitch = row_pitch * storage.height.div_ceil(info.block_height) as usize;
        let len = slice_pitch * storage.depth as usize;
        let previous = self
            .textures
            .get(&texture)
            .ok_or(DriverError::NoSuchTexture(texture))?
            .images
            .get(&image)
            .map_or(0, |i| i.bytes.len());
        if let Some(limit) = self.memory_limit {
            if self.allocated - previous + len > limit {
                return Err(DriverError::OutOfMemory);
            }
        }
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| DriverError::OutOfMemory)?;
        bytes.resize(len, 0);
        self.allocated = self.allocated - previous + len;
        let t = self
            .textures
            .get_mut(&texture)
            .ok_or(DriverError::NoSuchTexture(texture))?;
        t.images.insert(
            image,
            SoftImage {
                storage: *storage,
                row_pitch,
                slice_pitch,
                bytes,
            },
        );
        DriverStats::bump(&self.stats.images_allocated);
        Ok(())
    }

    fn upload(
        &mut self,
        texture: NativeTexture,
        image: ImageIndex,
        region: &TexelBox,
        data: PixelData<'_>,
    ) -> Result<(), DriverError> {
        let stats = self.stats.clone();
        let img = self.image_mut(texture, image)?;
        let (offset, row_bytes, rows) = region_layout(&img.storage, img.row_pitch, img.slice_pitch, region)?;
        let mut uploaded = 0;
        for z in 0..region.depth() as usize {
            for y in 0..rows as usize {
                let src = z * data.slice_pitch as usize + y * data.row_pitch as usize;
                let dst = offset + z * img.slice_pitch + y * img.row_pitch;
                let src_row = data
                    .bytes
                    .get(src..src + row_bytes)
                    .ok_or(DriverError::OutOfBounds)?;
                img.bytes[dst..dst + row_bytes].copy_from_slice(src_row);
                uploaded += row_bytes as u64;
            }
        }
        DriverStats::bump(&stats.uploads);
        stats.uploaded_bytes.fetch_add(uploaded, Ordering::Relaxed);
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
        let stats = self.stats.clone();
        let img = self.image_mut(texture, image)?;
        let (offset, row_bytes, rows) = region_layout(&img.storage, img.row_pitch, img.slice_pitch, region)?;
        for z in 0..region.depth() as usize {
            for y in 0..rows as usize {
                let src = offset + z * img.slice_pitch + y * img.row_pitch;
                let dst = z * slice_pitch as usize + y * row_pitch as usize;
                let dst_row = out
                    .get_mut(dst..dst + row_bytes)
                    .ok_or(DriverError::OutOfBounds)?;
                dst_row.copy_from_slice(&img.bytes[src..src + row_bytes]);
            }
        }
        DriverStats::bump(&stats.downloads);
        Ok(())
    }
}

impl SoftDriver {
    /// The last value set for each kind of parameter on `texture`, in the order first set.
    pub fn parameters(&self, texture: NativeTexture) -> Vec<TexParameter> {
        let Some(t) = self.textures.get(&texture) else {
            return Vec::new();
        };
        let mut latest: Vec<TexParameter> = Vec::new();
        for p in &t.parameters {
            match latest
                .iter_mut()
                .find(|l| std::mem::discriminant(*l) == std::mem::discriminant(p))
            {
                Some(slot) => *slot = *p,
                None => latest.push(*p),
            }
        }
        latest
    }

    /// Storage of one image, if allocated.
    pub fn storage(&self, texture: NativeTexture, image: ImageIndex) -> Option<StorageDesc> {
        self.textures
            .get(&texture)?
            .images
            .get(&image)
            .map(|i| i.storage)
    }

    pub fn lod_bias(&self) -> f32 {
        self.lod_bias
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::Encoding;
    use crate::pixel_formats::FormatId;

    fn storage(width: u32, height: u32) -> StorageDesc {
        StorageDesc {
            format: FormatId::B8G8R8A8Unorm,
            encoding: Encoding::Linear,
            width,
            height,
            depth: 1,
        }
    }

    #[test]
    fn test_upload_download_region() {
        let mut driver = SoftDriver::new(Capabilities::default());
        let name = driver.create_texture(TextureTarget::Texture2d).unwrap();
        let image = ImageIndex { level: 0, layer: 0 };
        driver.allocate_image(name, image, &storage(4, 4)).unwrap();
        let data = [7u8; 8];
        driver
            .upload(
                name,
                image,
                &TexelBox::new(1, 1, 0, 3, 2, 1),
                PixelData {
                    bytes: &data,
                    row_pitch: 8,
                    slice_pitch: 8,
                },
            )
            .unwrap();
        let mut out = vec![0u8; 64];
        driver
            .download(name, image, &TexelBox::whole(4, 4, 1), &mut out, 16, 64)
            .unwrap();
        assert_eq!(&out[16..20], &[0, 0, 0, 0]);
        assert_eq!(&out[20..28], &[7; 8]);
        assert_eq!(driver.stats().uploads(), 1);
        assert_eq!(driver.stats().downloads(), 1);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut driver = SoftDriver::new(Capabilities::default());
        let name = driver.create_texture(TextureTarget::Texture2d).unwrap();
        let image = ImageIndex { level: 0, layer: 0 };
        driver.allocate_image(name, image, &storage(2, 2)).unwrap();
        let result = driver.upload(
            name,
            image,
            &TexelBox::whole(4, 4, 1),
            PixelData {
                bytes: &[0; 64],
                row_pitch: 16,
                slice_pitch: 64,
            },
        );
        assert!(matches!(result, Err(DriverError::OutOfBounds)));
    }

    #[test]
    fn test_memory_limit() {
        let mut driver = SoftDriver::new(Capabilities::default()).with_memory_limit(32);
        let name = driver.create_texture(TextureTarget::Texture2d).unwrap();
        let image = ImageIndex { level: 0, layer: 0 };
        assert!(driver.allocate_image(name, image, &storage(2, 2)).is_ok());
        //reallocating the same image reuses its budget
        assert!(driver.allocate_image(name, image, &storage(2, 4)).is_ok());
        assert!(matches!(
            driver.allocate_image(name, image, &storage(4, 4)),
            Err(DriverError::OutOfMemory)
        ));
    }
}
