// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Source color keys baked into native storage as alpha.

use std::sync::Arc;
use texture_coherency::device::{Capabilities, Context, Device, DeviceConfig};
use texture_coherency::imp::soft::{DriverStats, SoftDriver};
use texture_coherency::imp::{ImageIndex, StorageDesc};
use texture_coherency::pixel_formats::FormatId;
use texture_coherency::texture::{
    ColorKey, ColorKeyFlags, SubResourceData, Texture, TextureBuilder, TextureFlags,
};

fn soft_device(config: DeviceConfig) -> (Arc<Device>, Arc<DriverStats>) {
    let driver = SoftDriver::new(Capabilities::default());
    let stats = driver.stats();
    (Device::new(Box::new(driver), config), stats)
}

fn keyed_texture(context: &mut Context<'_>) -> Texture {
    let bytes = [0x10u8; 64];
    let data = [SubResourceData {
        data: &bytes,
        row_pitch: 16,
        slice_pitch: 64,
    }];
    TextureBuilder::new_2d(FormatId::B8G8R8X8Unorm, 4, 4)
        .data(&data)
        .build(context)
        .unwrap()
}

fn storage(texture: &Texture, context: &mut Context<'_>) -> StorageDesc {
    let name = texture.bind(context, false).unwrap();
    context
        .driver()
        .as_any()
        .downcast_ref::<SoftDriver>()
        .unwrap()
        .storage(name, ImageIndex { level: 0, layer: 0 })
        .unwrap()
}

#[test]
fn key_changes_force_reload() {
    let (device, stats) = soft_device(DeviceConfig::default());
    let mut context = device.acquire_context();
    let texture = keyed_texture(&mut context);
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 1);

    texture
        .set_color_key(
            &mut context,
            ColorKeyFlags::SRC_BLT,
            Some(ColorKey::single(0x0010_1010)),
        )
        .unwrap();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 2);
    assert!(
        texture
            .flags(&mut context)
            .unwrap()
            .contains(TextureFlags::CONVERTED)
    );
    assert_eq!(storage(&texture, &mut context).format, FormatId::B8G8R8A8Unorm);

    // unchanged key
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 2);

    texture
        .set_color_key(&mut context, ColorKeyFlags::SRC_BLT, Some(ColorKey::single(0)))
        .unwrap();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 3);

    texture
        .set_color_key(&mut context, ColorKeyFlags::SRC_BLT, None)
        .unwrap();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 4);
    assert!(
        !texture
            .flags(&mut context)
            .unwrap()
            .contains(TextureFlags::CONVERTED)
    );
    assert_eq!(storage(&texture, &mut context).format, FormatId::B8G8R8X8Unorm);
}

#[test]
fn destination_keys_do_not_touch_storage() {
    let (device, stats) = soft_device(DeviceConfig::default());
    let mut context = device.acquire_context();
    let texture = keyed_texture(&mut context);
    texture.load(&mut context, false).unwrap();
    texture
        .set_color_key(
            &mut context,
            ColorKeyFlags::DST_BLT | ColorKeyFlags::SRC_OVERLAY,
            Some(ColorKey { low: 1, high: 5 }),
        )
        .unwrap();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 1);
    assert_eq!(
        texture
            .color_key(&mut context, ColorKeyFlags::DST_BLT)
            .unwrap(),
        Some(ColorKey { low: 1, high: 5 })
    );
    assert_eq!(
        texture
            .color_key(&mut context, ColorKeyFlags::SRC_BLT)
            .unwrap(),
        None
    );
}

#[test]
fn shader_keys_never_convert() {
    let (device, stats) = soft_device(DeviceConfig {
        shader_color_key: true,
        ..DeviceConfig::default()
    });
    let mut context = device.acquire_context();
    let texture = keyed_texture(&mut context);
    texture
        .set_color_key(
            &mut context,
            ColorKeyFlags::SRC_BLT,
            Some(ColorKey::single(0x0010_1010)),
        )
        .unwrap();
    texture.load(&mut context, false).unwrap();
    assert_eq!(stats.uploads(), 1);
    assert_eq!(storage(&texture, &mut context).format, FormatId::B8G8R8X8Unorm);
}

#[test]
fn unknown_flags_rejected() {
    let (device, _stats) = soft_device(DeviceConfig::default());
    let mut context = device.acquire_context();
    let texture = keyed_texture(&mut context);
    let result = texture.set_color_key(
        &mut context,
        ColorKeyFlags::from_bits_retain(0x100),
        Some(ColorKey::single(0)),
    );
    assert!(result.is_err());
}
