// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Lending sub-resources to legacy drawing code.

use std::sync::Arc;
use texture_coherency::Error;
use texture_coherency::coordinates::TexelBox;
use texture_coherency::device::{Capabilities, Device, DeviceConfig};
use texture_coherency::imp::ImageIndex;
use texture_coherency::imp::soft::SoftDriver;
use texture_coherency::pixel_formats::FormatId;
use texture_coherency::texture::{
    BackingStore, CreateFlags, Location, MapFlags, MultisampleType, TextureBuilder, UserMemory,
};

const BITMAP_FORMATS: [FormatId; 15] = [
    FormatId::B8G8R8A8Unorm,
    FormatId::B8G8R8X8Unorm,
    FormatId::R8G8B8A8Unorm,
    FormatId::R8G8B8X8Unorm,
    FormatId::B8G8R8Unorm,
    FormatId::B5G6R5Unorm,
    FormatId::B5G5R5X1Unorm,
    FormatId::B5G5R5A1Unorm,
    FormatId::B4G4R4A4Unorm,
    FormatId::B4G4R4X4Unorm,
    FormatId::B2G3R3Unorm,
    FormatId::R10G10B10A2Unorm,
    FormatId::B10G10R10A2Unorm,
    FormatId::R16G16B16A16Unorm,
    FormatId::P8Uint,
];

fn soft_device() -> Arc<Device> {
    Device::new(
        Box::new(SoftDriver::new(Capabilities::default())),
        DeviceConfig::default(),
    )
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn update_then_view_round_trips() {
    let device = soft_device();
    let mut context = device.acquire_context();
    for (seed, format) in BITMAP_FORMATS.into_iter().enumerate() {
        let bytes_per_texel = format.info().byte_count as usize;
        let (width, height) = (5usize, 3usize);
        let texture = TextureBuilder::new_2d(format, width as u32, height as u32)
            .build(&mut context)
            .unwrap();
        let row = width * bytes_per_texel;
        let data = pattern(row * height, seed as u8);
        texture
            .update_region(
                &mut context,
                0,
                None,
                &data,
                row as u32,
                (row * height) as u32,
            )
            .unwrap();
        // loaded in between so the patch only dirties a region of the native copy
        texture.load(&mut context, false).unwrap();
        let patch = pattern(2 * 2 * bytes_per_texel, 0x55);
        texture
            .update_region(
                &mut context,
                0,
                Some(TexelBox::new(1, 1, 0, 3, 3, 1)),
                &patch,
                (2 * bytes_per_texel) as u32,
                (4 * bytes_per_texel) as u32,
            )
            .unwrap();

        let (pitch, _) = texture.pitch(&mut context, 0).unwrap();
        let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
        assert_eq!(view.info.height, -(height as i32));
        assert_eq!(view.info.bit_count as usize, bytes_per_texel * 8);
        texture
            .legacy_view_bits(&mut context, 0, |bits| {
                for y in 0..height {
                    for x in 0..width {
                        let got = &bits[y * pitch as usize + x * bytes_per_texel..][..bytes_per_texel];
                        let expected = if (1..3).contains(&x) && (1..3).contains(&y) {
                            let offset = ((y - 1) * 2 + (x - 1)) * bytes_per_texel;
                            &patch[offset..offset + bytes_per_texel]
                        } else {
                            let offset = y * row + x * bytes_per_texel;
                            &data[offset..offset + bytes_per_texel]
                        };
                        assert_eq!(got, expected, "{format:?} texel {x},{y}");
                    }
                }
            })
            .unwrap();
        texture
            .release_legacy_view(&mut context, 0, view.handle)
            .unwrap();
        texture.decref();
    }
}

#[test]
fn pinned_host_memory_resyncs_on_release() {
    let device = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .flags(CreateFlags::PIN_SYSMEM)
        .build(&mut context)
        .unwrap();
    let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
    texture
        .legacy_view_bits_mut(&mut context, 0, |bits| bits.fill(0x42))
        .unwrap();
    texture
        .release_legacy_view(&mut context, 0, view.handle)
        .unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::SYSMEM
    );

    texture
        .map(&mut context, 0, None, MapFlags::READ_ONLY)
        .unwrap();
    texture
        .with_mapped_bytes(&mut context, 0, |bytes| {
            assert!(bytes.iter().all(|b| *b == 0x42));
        })
        .unwrap();
    texture.unmap(&mut context, 0).unwrap();
}

#[test]
fn unpinned_bitmap_stays_authoritative() {
    let device = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .build(&mut context)
        .unwrap();
    let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
    texture
        .release_legacy_view(&mut context, 0, view.handle)
        .unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::DIB
    );
    texture.load(&mut context, false).unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::DIB | Location::TEXTURE_RGB
    );
}

#[test]
fn user_memory_resyncs_on_release() {
    let device = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .build(&mut context)
        .unwrap();
    let memory = UserMemory::new(vec![0; 64]);
    texture
        .replace_backing_store(
            &mut context,
            BackingStore {
                width: 4,
                height: 4,
                format: FormatId::B8G8R8A8Unorm,
                multisample_type: MultisampleType::None,
                multisample_quality: 0,
                memory: Some(memory.clone()),
                pitch: 0,
            },
        )
        .unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::USER_MEMORY
    );

    let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
    texture
        .legacy_view_bits_mut(&mut context, 0, |bits| {
            for (i, b) in bits.iter_mut().enumerate() {
                *b = i as u8;
            }
        })
        .unwrap();
    assert!(memory.lock().iter().all(|b| *b == 0));
    texture
        .release_legacy_view(&mut context, 0, view.handle)
        .unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::USER_MEMORY
    );
    let expected: Vec<u8> = (0..64).map(|i| i as u8).collect();
    assert_eq!(*memory.lock(), expected);
}

#[test]
fn outstanding_view_blocks_other_access() {
    let device = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B5G6R5Unorm, 4, 4)
        .build(&mut context)
        .unwrap();
    let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
    assert!(matches!(
        texture.map(&mut context, 0, None, MapFlags::empty()),
        Err(Error::LegacyViewInUse)
    ));
    assert!(matches!(
        texture.update_region(&mut context, 0, None, &[0; 32], 8, 32),
        Err(Error::LegacyViewInUse)
    ));
    texture
        .release_legacy_view(&mut context, 0, view.handle)
        .unwrap();
    assert!(matches!(
        texture.release_legacy_view(&mut context, 0, view.handle),
        Err(Error::NoLegacyView)
    ));
    assert!(matches!(
        texture.legacy_view_bits(&mut context, 0, |_| ()),
        Err(Error::NoLegacyView)
    ));
}

#[test]
fn mapped_sub_resource_cannot_be_lent() {
    let device = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8X8Unorm, 4, 4)
        .build(&mut context)
        .unwrap();
    texture
        .map(&mut context, 0, None, MapFlags::empty())
        .unwrap();
    assert!(matches!(
        texture.acquire_legacy_view(&mut context, 0),
        Err(Error::InvalidArgument(_))
    ));
    texture.unmap(&mut context, 0).unwrap();
    assert!(texture.acquire_legacy_view(&mut context, 0).is_ok());
}

#[test]
fn drawing_after_a_load_reaches_the_native_copy() {
    let driver = SoftDriver::new(Capabilities::default());
    let stats = driver.stats();
    let device = Device::new(Box::new(driver), DeviceConfig::default());
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .flags(CreateFlags::PIN_SYSMEM)
        .build(&mut context)
        .unwrap();
    let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 1);
    texture
        .legacy_view_bits_mut(&mut context, 0, |bits| bits.fill(0xaa))
        .unwrap();
    texture
        .release_legacy_view(&mut context, 0, view.handle)
        .unwrap();
    assert!(
        !texture
            .location_flags(&mut context, 0)
            .unwrap()
            .intersects(Location::GPU)
    );

    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 2);
    let name = texture.bind(&mut context, false).unwrap();
    let mut texels = [0u8; 64];
    context
        .driver_mut()
        .download(
            name,
            ImageIndex { level: 0, layer: 0 },
            &TexelBox::whole(4, 4, 1),
            &mut texels,
            16,
            64,
        )
        .unwrap();
    assert!(texels.iter().all(|b| *b == 0xaa));
}
