// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Reference counting, teardown and swapchain delegation.

use std::sync::Arc;
use texture_coherency::Error;
use texture_coherency::device::{Capabilities, Device, DeviceConfig, Swapchain};
use texture_coherency::imp::soft::{DriverStats, SoftDriver};
use texture_coherency::pixel_formats::FormatId;
use texture_coherency::texture::{DrawBinding, SubResourceData, TextureBuilder};

fn soft_device() -> (Arc<Device>, Arc<DriverStats>) {
    let driver = SoftDriver::new(Capabilities::default());
    let stats = driver.stats();
    (
        Device::new(Box::new(driver), DeviceConfig::default()),
        stats,
    )
}

const BYTES: [u8; 64] = [0x80; 64];
const DATA: [SubResourceData<'static>; 1] = [SubResourceData {
    data: &BYTES,
    row_pitch: 16,
    slice_pitch: 64,
}];

#[test]
fn last_release_destroys() {
    let (device, stats) = soft_device();
    let texture = {
        let mut context = device.acquire_context();
        TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
            .data(&DATA)
            .build(&mut context)
            .unwrap()
    };
    assert_eq!(texture.incref(), 2);
    assert_eq!(texture.decref(), 1);
    assert_eq!(stats.textures_deleted(), 0);
    assert_eq!(texture.decref(), 0);
    assert_eq!(stats.textures_deleted(), 1);

    let mut context = device.acquire_context();
    assert_eq!(context.texture_count(), 0);
    assert!(matches!(
        texture.load(&mut context, false),
        Err(Error::Destroyed)
    ));
    // releasing again is logged and ignored
    drop(context);
    assert_eq!(texture.decref(), 0);
}

#[test]
fn teardown_waits_for_the_lease() {
    let (device, stats) = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .data(&DATA)
        .build(&mut context)
        .unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| assert_eq!(texture.decref(), 0));
    });
    assert_eq!(context.texture_count(), 1);
    assert_eq!(stats.textures_deleted(), 0);
    drop(context);

    assert_eq!(stats.textures_deleted(), 1);
    assert_eq!(device.acquire_context().texture_count(), 0);
}

#[test]
fn swapchain_owns_the_count_while_bound() {
    let (device, _stats) = soft_device();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .usage(texture_coherency::texture::Usage::RENDERTARGET)
        .build(&mut context)
        .unwrap();
    let swapchain = Swapchain::new();
    texture
        .on_bound_to_swapchain(&mut context, Some(swapchain.clone()))
        .unwrap();
    assert_eq!(
        texture.draw_binding(&mut context).unwrap(),
        DrawBinding::Drawable
    );
    assert_eq!(texture.incref(), 2);
    assert_eq!(swapchain.refcount(), 2);
    assert_eq!(texture.decref(), 1);
    assert_eq!(swapchain.refcount(), 1);
    // nothing was torn down
    assert_eq!(context.texture_count(), 1);

    texture.on_bound_to_swapchain(&mut context, None).unwrap();
    // unbound textures survive the swapchain
    assert_eq!(swapchain.decref(), 0);
    assert_eq!(context.texture_count(), 1);
    assert_eq!(texture.refcount(), 1);
    assert_eq!(
        texture.draw_binding(&mut context).unwrap(),
        DrawBinding::Texture
    );
}

#[test]
fn textures_stay_on_their_device() {
    let (first, _) = soft_device();
    let (second, _) = soft_device();
    let texture = {
        let mut context = first.acquire_context();
        TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
            .build(&mut context)
            .unwrap()
    };
    let mut context = second.acquire_context();
    assert!(matches!(
        texture.load(&mut context, false),
        Err(Error::WrongDevice)
    ));
    assert!(Arc::ptr_eq(texture.device(), &first));
}

#[test]
fn lod_only_for_managed_textures() {
    use texture_coherency::texture::Pool;
    let (device, _stats) = soft_device();
    let mut context = device.acquire_context();
    let managed = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 16, 16)
        .levels(5)
        .pool(Pool::Managed)
        .build(&mut context)
        .unwrap();
    assert_eq!(managed.set_mip_bias(&mut context, 2).unwrap(), 0);
    assert_eq!(managed.mip_bias(&mut context).unwrap(), 2);
    // clamped to the last level
    assert_eq!(managed.set_mip_bias(&mut context, 9).unwrap(), 2);
    assert_eq!(managed.mip_bias(&mut context).unwrap(), 4);

    let default = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 16, 16)
        .levels(5)
        .build(&mut context)
        .unwrap();
    assert_eq!(default.set_mip_bias(&mut context, 2).unwrap(), 0);
    assert_eq!(default.mip_bias(&mut context).unwrap(), 0);
}

#[test]
fn releasing_the_swapchain_tears_down_bound_textures() {
    let (device, stats) = soft_device();
    let swapchain = Swapchain::new();
    let (bound, other) = {
        let mut context = device.acquire_context();
        let bound = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
            .data(&DATA)
            .build(&mut context)
            .unwrap();
        let other = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
            .data(&DATA)
            .build(&mut context)
            .unwrap();
        bound
            .on_bound_to_swapchain(&mut context, Some(swapchain.clone()))
            .unwrap();
        (bound, other)
    };
    assert_eq!(bound.incref(), 2);
    assert_eq!(bound.decref(), 1);
    assert_eq!(stats.textures_deleted(), 0);
    assert_eq!(bound.decref(), 0);
    assert_eq!(stats.textures_deleted(), 1);

    let mut context = device.acquire_context();
    assert_eq!(context.texture_count(), 1);
    assert!(matches!(
        bound.load(&mut context, false),
        Err(Error::Destroyed)
    ));
    assert!(other.load(&mut context, false).is_ok());
    drop(context);
    // over-release is logged and ignored
    assert_eq!(swapchain.decref(), 0);
    assert_eq!(swapchain.refcount(), 0);
}

#[test]
fn swapchain_teardown_waits_for_the_lease() {
    let (device, stats) = soft_device();
    let swapchain = Swapchain::new();
    let mut context = device.acquire_context();
    let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
        .data(&DATA)
        .build(&mut context)
        .unwrap();
    texture
        .on_bound_to_swapchain(&mut context, Some(swapchain.clone()))
        .unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| assert_eq!(swapchain.decref(), 0));
    });
    assert_eq!(context.texture_count(), 1);
    drop(context);
    assert_eq!(stats.textures_deleted(), 1);
}
