// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Location bookkeeping observed through the software driver's call counters.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use texture_coherency::Error;
use texture_coherency::coordinates::TexelBox;
use texture_coherency::device::{Capabilities, Context, Device, DeviceConfig, Diagnostic};
use texture_coherency::imp::ImageIndex;
use texture_coherency::imp::soft::{DriverStats, SoftDriver};
use texture_coherency::pixel_formats::{FormatId, f16};
use texture_coherency::texture::{
    BackingStore, CreateFlags, Location, MapFlags, MultisampleType, SubResourceData, Texture,
    TextureBuilder, TextureFlags,
};

fn soft_device(caps: Capabilities) -> (Arc<Device>, Arc<DriverStats>) {
    let driver = SoftDriver::new(caps);
    let stats = driver.stats();
    (
        Device::new(Box::new(driver), DeviceConfig::default()),
        stats,
    )
}

fn gradient(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

fn create_4x4(context: &mut Context<'_>, bytes: &[u8]) -> Texture {
    let data = [SubResourceData {
        data: bytes,
        row_pitch: 16,
        slice_pitch: 64,
    }];
    TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .data(&data)
        .build(context)
        .unwrap()
}

#[test]
fn initial_data_then_bind() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let bytes = gradient(64);
    let texture = create_4x4(&mut context, &bytes);
    assert_eq!(stats.uploads(), 1);

    texture.load(&mut context, false).unwrap();
    let locations = texture.location_flags(&mut context, 0).unwrap();
    assert!(locations.contains(Location::TEXTURE_RGB));
    assert!(locations.contains(Location::SYSMEM));
    assert!(!locations.contains(Location::TEXTURE_SRGB));
    assert_eq!(stats.uploads(), 1);
}

#[test]
fn load_is_idempotent() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 8, 8)
        .levels(4)
        .build(&mut context)
        .unwrap();
    texture.load(&mut context, false).unwrap();
    let uploads = stats.uploads();
    assert_eq!(uploads, 4);
    texture.load(&mut context, false).unwrap();
    texture.preload(&mut context).unwrap();
    assert_eq!(stats.uploads(), uploads);
}

#[test]
fn partial_update_uploads_dirty_region() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = create_4x4(&mut context, &gradient(64));
    texture.load(&mut context, false).unwrap();
    let bytes_before = stats.uploaded_bytes.load(Ordering::Relaxed);

    texture
        .update_region(
            &mut context,
            0,
            Some(TexelBox::new(1, 1, 0, 3, 3, 1)),
            &[0xab; 16],
            8,
            16,
        )
        .unwrap();
    let locations = texture.location_flags(&mut context, 0).unwrap();
    assert_eq!(locations, Location::SYSMEM);

    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 2);
    assert_eq!(stats.uploaded_bytes.load(Ordering::Relaxed) - bytes_before, 16);
    assert!(
        texture
            .location_flags(&mut context, 0)
            .unwrap()
            .contains(Location::TEXTURE_RGB | Location::SYSMEM)
    );
}

#[test]
fn update_invalidates_released_bitmap() {
    let (device, _stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let data = gradient(64);
    let sub_data = [SubResourceData {
        data: &data,
        row_pitch: 16,
        slice_pitch: 64,
    }];
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .flags(CreateFlags::PIN_SYSMEM)
        .data(&sub_data)
        .build(&mut context)
        .unwrap();
    let view = texture.acquire_legacy_view(&mut context, 0).unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::DIB
    );
    texture
        .release_legacy_view(&mut context, 0, view.handle)
        .unwrap();
    texture
        .update_region(
            &mut context,
            0,
            Some(TexelBox::new(0, 0, 0, 2, 2, 1)),
            &[0; 16],
            8,
            16,
        )
        .unwrap();
    texture.load(&mut context, false).unwrap();
    let locations = texture.location_flags(&mut context, 0).unwrap();
    assert!(locations.contains(Location::TEXTURE_RGB | Location::SYSMEM));
    assert!(!locations.contains(Location::DIB));
}

#[test]
fn block_format_without_support() {
    let (device, stats) = soft_device(Capabilities {
        dxtn: false,
        ..Capabilities::default()
    });
    let mut context = device.acquire_context();
    let result = TextureBuilder::new_2d(FormatId::Dxt1, 4, 4).build(&mut context);
    assert!(matches!(result, Err(Error::Unsupported(_))));
    assert_eq!(context.texture_count(), 0);
    assert_eq!(stats.textures_created(), 0);
    assert_eq!(stats.images_allocated(), 0);
    assert!(context.diagnostics().has_emitted(Diagnostic::DxtnUnsupported));
}

#[test]
fn failed_initial_upload_leaves_nothing_behind() {
    let driver = SoftDriver::new(Capabilities::default()).with_memory_limit(16);
    let stats = driver.stats();
    let device = Device::new(Box::new(driver), DeviceConfig::default());
    let mut context = device.acquire_context();
    let bytes = gradient(64);
    let data = [SubResourceData {
        data: &bytes,
        row_pitch: 16,
        slice_pitch: 64,
    }];
    let result = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .data(&data)
        .build(&mut context);
    assert!(matches!(result, Err(Error::OutOfMemory)));
    assert_eq!(context.texture_count(), 0);
    assert_eq!(stats.textures_created(), stats.textures_deleted());
}

#[test]
fn separate_gamma_variant() {
    let (device, stats) = soft_device(Capabilities {
        srgb_decode: false,
        ..Capabilities::default()
    });
    let mut context = device.acquire_context();
    let texture = create_4x4(&mut context, &gradient(64));
    texture.load(&mut context, true).unwrap();
    let locations = texture.location_flags(&mut context, 0).unwrap();
    assert!(locations.contains(Location::TEXTURE_SRGB | Location::TEXTURE_RGB));
    assert_eq!(stats.textures_created(), 2);

    texture
        .update_region(&mut context, 0, None, &gradient(64), 16, 64)
        .unwrap();
    let locations = texture.location_flags(&mut context, 0).unwrap();
    assert!(!locations.intersects(Location::TEXTURE_SRGB | Location::TEXTURE_RGB));
}

#[test]
fn gamma_shares_native_object_with_decode_control() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = create_4x4(&mut context, &gradient(64));
    texture.load(&mut context, true).unwrap();
    assert_eq!(stats.textures_created(), 1);
    let locations = texture.location_flags(&mut context, 0).unwrap();
    assert!(!locations.contains(Location::TEXTURE_SRGB));
}

#[test]
fn unload_keeps_host_copy() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let bytes = gradient(64);
    let texture = create_4x4(&mut context, &bytes);
    texture
        .update_region(&mut context, 0, None, &bytes, 16, 64)
        .unwrap();
    texture.load(&mut context, false).unwrap();
    texture.unload(&mut context).unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::SYSMEM
    );
    assert_eq!(stats.textures_deleted(), 1);
    assert_eq!(
        context
            .driver()
            .as_any()
            .downcast_ref::<SoftDriver>()
            .unwrap()
            .texture_count(),
        0
    );

    let uploads = stats.uploads();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), uploads + 1);
}

#[test]
fn map_for_writing_invalidates_native_copy() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = create_4x4(&mut context, &gradient(64));
    texture.load(&mut context, false).unwrap();

    let region = texture
        .map(&mut context, 0, None, MapFlags::READ_ONLY)
        .unwrap();
    assert_eq!(region.offset, 0);
    texture.unmap(&mut context, 0).unwrap();
    assert!(
        texture
            .location_flags(&mut context, 0)
            .unwrap()
            .contains(Location::TEXTURE_RGB)
    );

    let region = texture
        .map(
            &mut context,
            0,
            Some(TexelBox::new(2, 2, 0, 4, 4, 1)),
            MapFlags::empty(),
        )
        .unwrap();
    assert_eq!(region.offset, 2 * 16 + 2 * 4);
    texture
        .with_mapped_bytes(&mut context, 0, |bytes| {
            bytes[region.offset..region.offset + 8].fill(0xff);
        })
        .unwrap();
    texture.unmap(&mut context, 0).unwrap();
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::SYSMEM
    );
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 2);
}

#[test]
fn download_when_only_native_copy_is_current() {
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let volume = TextureBuilder::new_3d(FormatId::B8G8R8A8Unorm, 4, 4, 2)
        .build(&mut context)
        .unwrap();
    volume.load(&mut context, false).unwrap();
    assert_eq!(
        volume.location_flags(&mut context, 0).unwrap(),
        Location::TEXTURE_RGB
    );
    assert_eq!(stats.uploads(), 0);

    volume
        .map(&mut context, 0, None, MapFlags::READ_ONLY)
        .unwrap();
    assert_eq!(stats.downloads(), 1);
    assert_eq!(
        volume.location_flags(&mut context, 0).unwrap(),
        Location::SYSMEM | Location::TEXTURE_RGB
    );
    volume.unmap(&mut context, 0).unwrap();
}

fn assert_some_location(texture: &Texture, context: &mut Context<'_>, count: u32) {
    for index in 0..count {
        assert!(!texture.location_flags(context, index).unwrap().is_empty());
    }
}

#[test]
fn at_least_one_location_after_every_operation() {
    let (device, _stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B5G6R5Unorm, 8, 4)
        .levels(3)
        .build(&mut context)
        .unwrap();
    assert_some_location(&texture, &mut context, 3);
    texture.load(&mut context, false).unwrap();
    assert_some_location(&texture, &mut context, 3);
    texture
        .update_region(
            &mut context,
            1,
            Some(TexelBox::new(0, 0, 0, 2, 2, 1)),
            &[1; 8],
            4,
            8,
        )
        .unwrap();
    assert_some_location(&texture, &mut context, 3);
    let view = texture.acquire_legacy_view(&mut context, 2).unwrap();
    assert_some_location(&texture, &mut context, 3);
    texture
        .release_legacy_view(&mut context, 2, view.handle)
        .unwrap();
    assert_some_location(&texture, &mut context, 3);
    texture.load(&mut context, true).unwrap();
    assert_some_location(&texture, &mut context, 3);
    texture.add_dirty_region(&mut context, 0, None).unwrap();
    assert_some_location(&texture, &mut context, 3);
    texture.unload(&mut context).unwrap();
    assert_some_location(&texture, &mut context, 3);
}

#[test]
fn sampler_state_sent_once() {
    use texture_coherency::sampler::{AddressMode, SamplerDesc};
    let (device, stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = create_4x4(&mut context, &gradient(64));
    let name = texture.bind(&mut context, false).unwrap();
    let desc = SamplerDesc {
        address_u: AddressMode::Clamp,
        ..SamplerDesc::default()
    };
    texture.apply_sampler(&mut context, &desc).unwrap();
    let sent = stats.parameters_set();
    texture.apply_sampler(&mut context, &desc).unwrap();
    assert_eq!(stats.parameters_set(), sent);

    let soft = context
        .driver()
        .as_any()
        .downcast_ref::<SoftDriver>()
        .unwrap();
    assert!(
        soft.parameters(name)
            .contains(&texture_coherency::imp::TexParameter::WrapU(AddressMode::Clamp))
    );
}

#[test]
fn overflowing_sizes_are_rejected() {
    let (device, stats) = soft_device(Capabilities {
        max_texture_size: u32::MAX,
        ..Capabilities::default()
    });
    let mut context = device.acquire_context();
    let bytes = gradient(64);
    let texture = create_4x4(&mut context, &bytes);
    let uploads = stats.uploads();

    let result = texture.update_region(&mut context, 0, None, &bytes, u32::MAX / 2, 64);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(
        texture.location_flags(&mut context, 0).unwrap(),
        Location::SYSMEM | Location::TEXTURE_RGB
    );

    let result = texture.replace_backing_store(
        &mut context,
        BackingStore {
            width: 1 << 30,
            height: 1,
            format: FormatId::B8G8R8A8Unorm,
            multisample_type: MultisampleType::None,
            multisample_quality: 0,
            memory: None,
            pitch: 0,
        },
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    // nothing changed
    assert_eq!(texture.sub_resource(&mut context, 0).unwrap().width, 4);
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), uploads);

    let result = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 1 << 15, 1 << 15)
        .build(&mut context);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(context.texture_count(), 1);
}

#[test]
fn backing_store_above_the_device_maximum() {
    let (device, _stats) = soft_device(Capabilities::default());
    let mut context = device.acquire_context();
    let texture = create_4x4(&mut context, &gradient(64));
    let result = texture.replace_backing_store(
        &mut context,
        BackingStore {
            width: 32768,
            height: 4,
            format: FormatId::B8G8R8A8Unorm,
            multisample_type: MultisampleType::None,
            multisample_quality: 0,
            memory: None,
            pitch: 0,
        },
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn half_floats_widen_without_device_support() {
    let (device, _stats) = soft_device(Capabilities {
        half_float_textures: false,
        ..Capabilities::default()
    });
    let mut context = device.acquire_context();
    let channels = [0.5f32, 1.0, -2.0, 0.25];
    let bytes: Vec<u8> = channels
        .iter()
        .cycle()
        .take(16)
        .flat_map(|c| f16::from_f32(*c).to_le_bytes())
        .collect();
    let texture = TextureBuilder::new_2d(FormatId::R16G16B16A16Float, 2, 2)
        .data(&[SubResourceData {
            data: &bytes,
            row_pitch: 16,
            slice_pitch: 32,
        }])
        .build(&mut context)
        .unwrap();
    assert!(
        texture
            .flags(&mut context)
            .unwrap()
            .contains(TextureFlags::CONVERTED)
    );

    let name = texture.bind(&mut context, false).unwrap();
    let image = ImageIndex { level: 0, layer: 0 };
    let soft = context
        .driver()
        .as_any()
        .downcast_ref::<SoftDriver>()
        .unwrap();
    assert_eq!(
        soft.storage(name, image).unwrap().format,
        FormatId::R32G32B32A32Float
    );
    let mut texels = [0u8; 64];
    context
        .driver_mut()
        .download(name, image, &TexelBox::whole(2, 2, 1), &mut texels, 32, 64)
        .unwrap();
    let expected: Vec<u8> = channels.iter().flat_map(|c| c.to_le_bytes()).collect();
    assert_eq!(&texels[..16], &expected[..]);
    assert_eq!(&texels[48..], &expected[..]);
}
