// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Textures and their sub-resources.
//!
//! A texture is an array of sub-resources, one per mip level and layer. Each sub-resource may
//! be current in several [`Location`]s at once: host memory, caller-owned memory, a legacy
//! bitmap, and the linear and gamma native textures. Writes invalidate every other location;
//! reads bring the wanted location current on demand from the cheapest valid source.
//!
//! # Ownership
//!
//! Texture state lives in the device's arena and is only reachable through a [`Context`].
//! A [`Texture`] is a handle: an id, the device, and the reference count. Dropping the handle
//! does nothing; the texture is destroyed when [`Texture::decref`] brings the count to zero.
//!
//! # Examples
//!
//! ```
//! use texture_coherency::device::{Capabilities, Device, DeviceConfig};
//! use texture_coherency::imp::soft::SoftDriver;
//! use texture_coherency::pixel_formats::FormatId;
//! use texture_coherency::texture::{Location, TextureBuilder};
//!
//! let device = Device::new(Box::new(SoftDriver::new(Capabilities::default())), DeviceConfig::default());
//! let mut context = device.acquire_context();
//! let texture = TextureBuilder::new_2d(FormatId::B8G8R8A8Unorm, 4, 4)
//!     .build(&mut context)
//!     .unwrap();
//! texture.load(&mut context, false).unwrap();
//! let locations = texture.location_flags(&mut context, 0).unwrap();
//! assert!(locations.contains(Location::SYSMEM | Location::TEXTURE_RGB));
//! ```
mod adaptation;
mod blit;
mod builder;
mod dirty_tracking;
mod gpu_object;
mod legacy_view;
mod locations;
mod overlay;
mod sub_resource;
mod surface;
mod volume;

pub use blit::{BlitFlags, BlitFx, BlitSource};
pub use builder::TextureBuilder;
pub use legacy_view::{BitmapCompression, BitmapInfo, LegacyView, LegacyViewHandle};
pub use locations::Location;
pub use overlay::OverlayFlags;
pub use sub_resource::{MapFlags, MappedRegion, SubResourceDesc};

use crate::coordinates::TexelBox;
use crate::device::{Context, Device, Diagnostic, Lease, Swapchain};
use crate::error::Error;
use crate::imp::{NativeTexture, TextureTarget};
use crate::pixel_formats::conversion::Conversion;
use crate::pixel_formats::{FormatFlags, FormatId};
use crate::sampler::{FilterType, SamplerDesc};
use bitflags::bitflags;
use gpu_object::GpuTexture;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sub_resource::SubResource;

/// Identifies a texture within its device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// 2D texture or cube map; sub-resources are surfaces.
    Texture2d,
    /// Volume texture; sub-resources are volumes.
    Texture3d,
}

/// Memory pool a texture was created in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Pool {
    Default,
    /// Host copy kept by the runtime; the only pool honoring a LOD.
    Managed,
    SystemMem,
    /// Host only, never drawn with. Creation restrictions are relaxed.
    Scratch,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MultisampleType {
    None,
    /// Driver-chosen sample pattern; the quality level selects among supported counts.
    NonMaskable,
    Samples(u32),
}

bitflags! {
    /// How a texture will be used.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Usage: u32 {
        const RENDERTARGET = 1 << 0;
        const AUTOGENMIPMAP = 1 << 1;
        const OVERLAY = 1 << 2;
        /// Every surface keeps a legacy bitmap as its authoritative host copy.
        const OWNDC = 1 << 3;
        /// Six layers addressed as cube faces.
        const LEGACY_CUBEMAP = 1 << 4;
        const DYNAMIC = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        /// Keep host memory authoritative, even while a legacy view is outstanding.
        const PIN_SYSMEM = 1 << 0;
    }
}

bitflags! {
    /// Texture-level state.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        const RGB_ALLOCATED = 1 << 0;
        const SRGB_ALLOCATED = 1 << 1;
        /// Native storage uses a substituted format.
        const CONVERTED = 1 << 2;
        const PIN_SYSMEM = 1 << 3;
        const NORMALIZED_COORDS = 1 << 4;
        /// The coordinate matrix is the identity.
        const POW2_MAT_IDENT = 1 << 5;
        /// Non-power-of-two storage without mipmaps or wrapping.
        const COND_NP2 = 1 << 6;
        /// The gamma variant was bound last.
        const IS_SRGB = 1 << 7;
        /// Every sub-resource is current in the linear native texture.
        const RGB_VALID = 1 << 8;
        /// Every sub-resource is current in the gamma native texture.
        const SRGB_VALID = 1 << 9;
    }
}

impl TextureFlags {
    pub(crate) fn allocated(srgb: bool) -> TextureFlags {
        if srgb {
            TextureFlags::SRGB_ALLOCATED
        } else {
            TextureFlags::RGB_ALLOCATED
        }
    }

    pub(crate) fn valid(srgb: bool) -> TextureFlags {
        if srgb {
            TextureFlags::SRGB_VALID
        } else {
            TextureFlags::RGB_VALID
        }
    }
}

bitflags! {
    /// Which color keys a call refers to.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ColorKeyFlags: u32 {
        const DST_BLT = 0x02;
        const DST_OVERLAY = 0x04;
        const SRC_BLT = 0x08;
        const SRC_OVERLAY = 0x10;
    }
}

/// An inclusive range of raw texel color values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ColorKey {
    pub low: u32,
    pub high: u32,
}

impl ColorKey {
    pub const fn single(value: u32) -> ColorKey {
        ColorKey {
            low: value,
            high: value,
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.low && value <= self.high
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ColorKeyState {
    /// Keys currently set.
    pub(crate) flags: ColorKeyFlags,
    pub(crate) dst_blt: ColorKey,
    pub(crate) dst_overlay: ColorKey,
    pub(crate) src_blt: ColorKey,
    pub(crate) src_overlay: ColorKey,
    /// Native storage carries the source key as alpha.
    pub(crate) applied_active: bool,
    /// The source key the native storage was converted with.
    pub(crate) applied: ColorKey,
}

impl ColorKeyState {
    pub(crate) fn has_src_blt(&self) -> bool {
        self.flags.contains(ColorKeyFlags::SRC_BLT)
    }

    pub(crate) fn get(&self, flag: ColorKeyFlags) -> Option<ColorKey> {
        if !self.flags.contains(flag) {
            return None;
        }
        match flag {
            ColorKeyFlags::DST_BLT => Some(self.dst_blt),
            ColorKeyFlags::DST_OVERLAY => Some(self.dst_overlay),
            ColorKeyFlags::SRC_BLT => Some(self.src_blt),
            ColorKeyFlags::SRC_OVERLAY => Some(self.src_overlay),
            _ => None,
        }
    }
}

/// Where draws to the texture land.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DrawBinding {
    Texture,
    /// The swapchain's drawable.
    Drawable,
}

/// Everything needed to create a texture, apart from its level count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub resource_type: ResourceType,
    pub format: FormatId,
    pub multisample_type: MultisampleType,
    pub multisample_quality: u32,
    pub usage: Usage,
    pub pool: Pool,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Initial contents of one sub-resource.
#[derive(Debug, Copy, Clone)]
pub struct SubResourceData<'a> {
    pub data: &'a [u8],
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

/// Caller-owned memory that can replace a texture's host storage.
///
/// The caller keeps a clone to read what the engine writes.
#[derive(Debug, Clone)]
pub struct UserMemory(Arc<Mutex<Vec<u8>>>);

impl UserMemory {
    pub fn new(bytes: Vec<u8>) -> Self {
        UserMemory(Arc::new(Mutex::new(bytes)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// New backing for [`Texture::replace_backing_store`].
#[derive(Debug, Clone)]
pub struct BackingStore {
    pub width: u32,
    pub height: u32,
    pub format: FormatId,
    pub multisample_type: MultisampleType,
    pub multisample_quality: u32,
    /// Caller memory to use as host storage, or `None` for engine-owned memory.
    pub memory: Option<UserMemory>,
    /// Row pitch of `memory`; 0 means tightly packed.
    pub pitch: u32,
}

/// 2D/3D specific behavior, chosen at creation.
pub(crate) trait TextureOps: Sync {
    fn load_sub_resource(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        index: u32,
        srgb: bool,
    ) -> Result<(), Error>;

    fn add_dirty_region(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        index: u32,
        region: Option<&TexelBox>,
    ) -> Result<(), Error>;

    fn cleanup_sub_resource(&self, texture: &mut TextureState, lease: &mut Lease<'_>, index: u32);

    fn upload_data(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        index: u32,
        data: &SubResourceData<'_>,
    ) -> Result<(), Error>;

    fn prepare_texture(
        &self,
        texture: &mut TextureState,
        lease: &mut Lease<'_>,
        srgb: bool,
    ) -> Result<(), Error>;
}

/// A texture as stored in the device arena.
pub(crate) struct TextureState {
    pub(crate) id: TextureId,
    pub(crate) ops: &'static dyn TextureOps,
    pub(crate) resource_type: ResourceType,
    pub(crate) format: FormatId,
    pub(crate) usage: Usage,
    pub(crate) pool: Pool,
    pub(crate) multisample_type: MultisampleType,
    pub(crate) multisample_quality: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) level_count: u32,
    pub(crate) layer_count: u32,
    pub(crate) flags: TextureFlags,
    pub(crate) target: TextureTarget,
    pub(crate) pow2_matrix: [f32; 16],
    /// Linear and gamma native objects.
    pub(crate) gpu: [GpuTexture; 2],
    /// Conversion the native storage was allocated with.
    pub(crate) conversion: Option<Conversion>,
    pub(crate) color_key: ColorKeyState,
    pub(crate) lod: u32,
    pub(crate) filter_type: FilterType,
    /// Row alignment of engine-owned host memory.
    pub(crate) alignment: u32,
    /// Explicit row pitch of caller memory, 0 when computed.
    pub(crate) row_pitch: u32,
    pub(crate) user_memory: Option<UserMemory>,
    pub(crate) draw_binding: DrawBinding,
    pub(crate) sub_resources: Box<[SubResource]>,
}

impl std::fmt::Debug for TextureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureState")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("level_count", &self.level_count)
            .field("layer_count", &self.layer_count)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl TextureState {
    pub(crate) fn sub_resource_count(&self) -> u32 {
        self.level_count * self.layer_count
    }

    pub(crate) fn check_index(&self, index: u32) -> Result<(), Error> {
        if index >= self.sub_resource_count() {
            logwise::warn_sync!(
                "Sub-resource index {index} out of range for texture {id}",
                index = index,
                id = logwise::privacy::LogIt(&self.id)
            );
            return Err(Error::InvalidArgument("sub-resource index out of range"));
        }
        Ok(())
    }

    /// Width, height and depth of mip `level`.
    pub(crate) fn level_size(&self, level: u32) -> (u32, u32, u32) {
        (
            (self.width >> level).max(1),
            (self.height >> level).max(1),
            (self.depth >> level).max(1),
        )
    }

    /// Row and slice pitch of host memory for mip `level`.
    ///
    /// Creation and backing store replacement reject sizes whose pitches overflow, so the
    /// saturated fallback is never observed.
    pub(crate) fn pitch(&self, level: u32) -> (u32, u32) {
        let info = self.format.info();
        let (width, height, _) = self.level_size(level);
        if self.row_pitch != 0 {
            return (
                self.row_pitch,
                self.row_pitch.saturating_mul(info.row_count(height)),
            );
        }
        info.calculate_pitch(self.alignment, width, height)
            .unwrap_or((u32::MAX, u32::MAX))
    }

    /// Invalidates every native copy without touching host memory.
    pub(crate) fn set_dirty(&mut self) {
        self.flags
            .remove(TextureFlags::RGB_VALID | TextureFlags::SRGB_VALID);
    }
}

/// Tears down a texture whose reference count reached zero. Never fails.
pub(crate) fn teardown(mut texture: TextureState, lease: &mut Lease<'_>) {
    logwise::info_sync!(
        "Destroying texture {id}",
        id = logwise::privacy::LogIt(&texture.id)
    );
    let ops = texture.ops;
    for i in 0..texture.sub_resource_count() {
        ops.cleanup_sub_resource(&mut texture, lease, i);
    }
    gpu_object::delete_native(&mut texture, lease);
}

#[derive(Debug)]
struct TextureShared {
    id: TextureId,
    device: Arc<Device>,
    refcount: AtomicU32,
    swapchain: Mutex<Option<Arc<Swapchain>>>,
}

/// Handle to a texture.
#[derive(Debug)]
pub struct Texture {
    shared: Arc<TextureShared>,
}

impl Texture {
    /// Creates a texture of `level_count` mip levels, optionally filled with `data`.
    ///
    /// When `data` is given it needs one entry per sub-resource, in sub-resource index order.
    pub fn create(
        context: &mut Context<'_>,
        desc: &TextureDesc,
        level_count: u32,
        flags: CreateFlags,
        data: Option<&[SubResourceData<'_>]>,
    ) -> Result<Texture, Error> {
        logwise::trace_sync!(
            "Creating texture {desc} levels {levels} flags {flags}",
            desc = logwise::privacy::LogIt(desc),
            levels = level_count,
            flags = logwise::privacy::LogIt(&flags)
        );
        let device = context.device().clone();
        let id = device.next_texture_id();
        let (textures, mut lease) = context.split();
        let state = validate_and_build(id, desc, level_count, flags, data, &mut lease)?;
        textures.insert(id, state);
        if let Some(data) = data {
            let texture = textures
                .get_mut(&id)
                .ok_or(Error::Destroyed)?;
            if let Err(e) = upload_initial_data(texture, &mut lease, data) {
                logwise::warn_sync!(
                    "Initial upload failed: {e}",
                    e = logwise::privacy::LogIt(&e)
                );
                if let Some(texture) = textures.remove(&id) {
                    teardown(texture, &mut lease);
                }
                return Err(e);
            }
        }
        Ok(Texture {
            shared: Arc::new(TextureShared {
                id,
                device,
                refcount: AtomicU32::new(1),
                swapchain: Mutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> TextureId {
        self.shared.id
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.shared.device
    }

    fn swapchain(&self) -> Option<Arc<Swapchain>> {
        self.shared
            .swapchain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn incref(&self) -> u32 {
        if let Some(swapchain) = self.swapchain() {
            return swapchain.incref();
        }
        let refcount = self.shared.refcount.fetch_add(1, Ordering::AcqRel) + 1;
        logwise::trace_sync!(
            "Texture {id} refcount increased to {refcount}",
            id = logwise::privacy::LogIt(&self.shared.id),
            refcount = refcount
        );
        refcount
    }

    /// Drops one reference. At zero the texture is torn down, immediately if the context lease
    /// is free, otherwise when the holder releases it.
    pub fn decref(&self) -> u32 {
        if let Some(swapchain) = self.swapchain() {
            return swapchain.decref();
        }
        let previous = self
            .shared
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));
        let Ok(previous) = previous else {
            logwise::warn_sync!(
                "Texture {id} released more often than referenced",
                id = logwise::privacy::LogIt(&self.shared.id)
            );
            return 0;
        };
        let refcount = previous - 1;
        logwise::trace_sync!(
            "Texture {id} refcount decreased to {refcount}",
            id = logwise::privacy::LogIt(&self.shared.id),
            refcount = refcount
        );
        if refcount == 0 {
            self.shared.device.schedule_teardown(self.shared.id);
        }
        refcount
    }

    /// The count `incref`/`decref` operate on.
    pub fn refcount(&self) -> u32 {
        match self.swapchain() {
            Some(swapchain) => swapchain.refcount(),
            None => self.shared.refcount.load(Ordering::Acquire),
        }
    }

    pub(crate) fn with_state<R>(
        &self,
        context: &mut Context<'_>,
        f: impl FnOnce(&mut TextureState, &mut Lease<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if !Arc::ptr_eq(&self.shared.device, context.device()) {
            return Err(Error::WrongDevice);
        }
        let (textures, mut lease) = context.split();
        let texture = textures
            .get_mut(&self.shared.id)
            .ok_or(Error::Destroyed)?;
        f(texture, &mut lease)
    }

    /// Binds or unbinds the texture from a swapchain.
    ///
    /// While bound, reference counting is delegated to the swapchain and draws target its
    /// drawable. Releasing the swapchain's last reference tears the texture down.
    pub fn on_bound_to_swapchain(
        &self,
        context: &mut Context<'_>,
        swapchain: Option<Arc<Swapchain>>,
    ) -> Result<(), Error> {
        self.with_state(context, |texture, _| {
            texture.draw_binding = if swapchain.is_some() {
                DrawBinding::Drawable
            } else {
                DrawBinding::Texture
            };
            texture.set_dirty();
            Ok(())
        })?;
        let mut bound = self
            .shared
            .swapchain
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = bound.take() {
            previous.detach(self.shared.id);
        }
        if let Some(swapchain) = &swapchain {
            swapchain.attach(&self.shared.device, self.shared.id);
        }
        *bound = swapchain;
        Ok(())
    }

    pub fn desc(&self, context: &mut Context<'_>) -> Result<TextureDesc, Error> {
        self.with_state(context, |t, _| {
            Ok(TextureDesc {
                resource_type: t.resource_type,
                format: t.format,
                multisample_type: t.multisample_type,
                multisample_quality: t.multisample_quality,
                usage: t.usage,
                pool: t.pool,
                width: t.width,
                height: t.height,
                depth: t.depth,
            })
        })
    }

    pub fn level_count(&self, context: &mut Context<'_>) -> Result<u32, Error> {
        self.with_state(context, |t, _| Ok(t.level_count))
    }

    pub fn layer_count(&self, context: &mut Context<'_>) -> Result<u32, Error> {
        self.with_state(context, |t, _| Ok(t.layer_count))
    }

    pub fn flags(&self, context: &mut Context<'_>) -> Result<TextureFlags, Error> {
        self.with_state(context, |t, _| Ok(t.flags))
    }

    pub fn target(&self, context: &mut Context<'_>) -> Result<TextureTarget, Error> {
        self.with_state(context, |t, _| Ok(t.target))
    }

    pub fn draw_binding(&self, context: &mut Context<'_>) -> Result<DrawBinding, Error> {
        self.with_state(context, |t, _| Ok(t.draw_binding))
    }

    /// The matrix mapping texture coordinates onto padded or unnormalized storage, column major.
    pub fn pow2_matrix(&self, context: &mut Context<'_>) -> Result<[f32; 16], Error> {
        self.with_state(context, |t, _| Ok(t.pow2_matrix))
    }

    /// Row and slice pitch of host memory for mip `level`.
    pub fn pitch(&self, context: &mut Context<'_>, level: u32) -> Result<(u32, u32), Error> {
        self.with_state(context, |t, _| {
            if level >= t.level_count {
                return Err(Error::InvalidArgument("level out of range"));
            }
            Ok(t.pitch(level))
        })
    }

    /// Sets the most detailed mip level sampled. Only managed textures honor it; returns the
    /// previous value.
    pub fn set_mip_bias(&self, context: &mut Context<'_>, lod: u32) -> Result<u32, Error> {
        self.with_state(context, |t, _| {
            if t.pool != Pool::Managed {
                logwise::trace_sync!("Ignoring LOD on a texture outside the managed pool");
                return Ok(0);
            }
            let lod = lod.min(t.level_count - 1);
            let old = t.lod;
            if t.lod != lod {
                t.lod = lod;
                for gpu in &mut t.gpu {
                    gpu.base_level = u32::MAX;
                }
            }
            Ok(old)
        })
    }

    pub fn mip_bias(&self, context: &mut Context<'_>) -> Result<u32, Error> {
        self.with_state(context, |t, _| Ok(t.lod))
    }

    pub fn set_autogen_filter_type(
        &self,
        context: &mut Context<'_>,
        filter_type: FilterType,
    ) -> Result<(), Error> {
        self.with_state(context, |t, _| {
            if !t.usage.contains(Usage::AUTOGENMIPMAP) {
                logwise::warn_sync!("Autogen filter set on a texture without automatic mipmaps");
                return Err(Error::InvalidArgument("texture has no automatic mipmaps"));
            }
            if filter_type != t.filter_type {
                logwise::warn_sync!(
                    "Autogen filter {filter} is recorded but generation keeps the driver's filter",
                    filter = logwise::privacy::LogIt(&filter_type)
                );
            }
            t.filter_type = filter_type;
            Ok(())
        })
    }

    pub fn autogen_filter_type(&self, context: &mut Context<'_>) -> Result<FilterType, Error> {
        self.with_state(context, |t, _| Ok(t.filter_type))
    }

    /// Always fails: mipmaps are generated by the driver or not at all.
    pub fn generate_mipmaps(&self, context: &mut Context<'_>) -> Result<(), Error> {
        self.with_state(context, |t, _| {
            logwise::warn_sync!(
                "Explicit mipmap generation requested for texture {id}",
                id = logwise::privacy::LogIt(&t.id)
            );
            Err(Error::NotImplemented("explicit mipmap generation"))
        })
    }

    /// Sets or clears the color keys named by `flags`.
    pub fn set_color_key(
        &self,
        context: &mut Context<'_>,
        flags: ColorKeyFlags,
        key: Option<ColorKey>,
    ) -> Result<(), Error> {
        if flags.bits() & !ColorKeyFlags::all().bits() != 0 {
            logwise::warn_sync!(
                "Invalid color key flags {flags}",
                flags = flags.bits()
            );
            return Err(Error::InvalidArgument("unknown color key flags"));
        }
        self.with_state(context, |t, _| {
            for flag in flags.iter() {
                match key {
                    Some(key) => {
                        match flag {
                            ColorKeyFlags::DST_BLT => t.color_key.dst_blt = key,
                            ColorKeyFlags::DST_OVERLAY => t.color_key.dst_overlay = key,
                            ColorKeyFlags::SRC_BLT => t.color_key.src_blt = key,
                            ColorKeyFlags::SRC_OVERLAY => t.color_key.src_overlay = key,
                            _ => {}
                        }
                        t.color_key.flags.insert(flag);
                    }
                    None => t.color_key.flags.remove(flag),
                }
            }
            Ok(())
        })
    }

    /// The key set for a single flag, if any.
    pub fn color_key(
        &self,
        context: &mut Context<'_>,
        flag: ColorKeyFlags,
    ) -> Result<Option<ColorKey>, Error> {
        self.with_state(context, |t, _| Ok(t.color_key.get(flag)))
    }

    /// Brings every sub-resource current in the linear (`srgb == false`) or gamma native texture.
    pub fn load(&self, context: &mut Context<'_>, srgb: bool) -> Result<(), Error> {
        self.with_state(context, |t, lease| locations::load(t, lease, srgb))
    }

    /// Loads the variant bound last.
    pub fn preload(&self, context: &mut Context<'_>) -> Result<(), Error> {
        self.with_state(context, |t, lease| {
            let srgb = t.flags.contains(TextureFlags::IS_SRGB);
            locations::load(t, lease, srgb)
        })
    }

    /// Binds the linear or gamma native texture, creating it on first use.
    pub fn bind(&self, context: &mut Context<'_>, srgb: bool) -> Result<NativeTexture, Error> {
        self.with_state(context, |t, lease| gpu_object::bind(t, lease, srgb))
    }

    /// Sends the sampler state that differs from what the native texture last received.
    pub fn apply_sampler(&self, context: &mut Context<'_>, desc: &SamplerDesc) -> Result<(), Error> {
        self.with_state(context, |t, lease| gpu_object::apply_sampler(t, lease, desc))
    }

    /// Moves every sub-resource to host memory and deletes the native textures.
    pub fn unload(&self, context: &mut Context<'_>) -> Result<(), Error> {
        self.with_state(context, |t, lease| gpu_object::unload(t, lease))
    }

    /// Replaces the storage of a single-level 2D texture with new dimensions, format and
    /// optionally caller memory.
    pub fn replace_backing_store(
        &self,
        context: &mut Context<'_>,
        store: BackingStore,
    ) -> Result<(), Error> {
        self.with_state(context, |t, lease| surface::replace_backing_store(t, lease, store))
    }
}

fn validate_and_build(
    id: TextureId,
    desc: &TextureDesc,
    level_count: u32,
    flags: CreateFlags,
    data: Option<&[SubResourceData<'_>]>,
    lease: &mut Lease<'_>,
) -> Result<TextureState, Error> {
    let info = desc.format.info();
    if level_count == 0 {
        logwise::warn_sync!("Invalid level count 0");
        return Err(Error::InvalidArgument("level count must be at least 1"));
    }
    if !info.supports_multisample(desc.multisample_type, desc.multisample_quality) {
        logwise::warn_sync!(
            "Unsupported multisample {ms} quality {q} for {format}",
            ms = logwise::privacy::LogIt(&desc.multisample_type),
            q = desc.multisample_quality,
            format = logwise::privacy::LogIt(&desc.format)
        );
        return Err(Error::Unsupported("multisample type"));
    }
    if desc.format == FormatId::Unknown {
        logwise::warn_sync!("Texture with unknown format");
        return Err(Error::InvalidArgument("unknown format"));
    }
    if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
        return Err(Error::InvalidArgument("zero-sized texture"));
    }
    if info
        .calculate_pitch(lease.config.surface_alignment, desc.width, desc.height)
        .is_none()
    {
        logwise::warn_sync!(
            "Texture of {w}x{h} {format} overflows a 32-bit pitch",
            w = desc.width,
            h = desc.height,
            format = logwise::privacy::LogIt(&desc.format)
        );
        return Err(Error::InvalidArgument("texture too large for host memory"));
    }
    if desc.format.is_dxtn() {
        let supported = match desc.resource_type {
            ResourceType::Texture2d => lease.caps.dxtn,
            ResourceType::Texture3d => lease.caps.dxtn_3d,
        };
        if !supported {
            if desc.resource_type == ResourceType::Texture2d
                && lease.diagnostics.first_time(Diagnostic::DxtnUnsupported)
            {
                logwise::error_sync!(
                    "Format {format} requires S3TC support, which this device lacks",
                    format = logwise::privacy::LogIt(&desc.format)
                );
            } else {
                logwise::warn_sync!(
                    "Format {format} is not supported on this device",
                    format = logwise::privacy::LogIt(&desc.format)
                );
            }
            return Err(Error::Unsupported("block-compressed format"));
        }
    }
    if info.flags.contains(FormatFlags::HEIGHT_SCALE) && level_count != 1 {
        return Err(Error::InvalidArgument("planar formats cannot be mipmapped"));
    }
    let largest = desc.width.max(desc.height).max(match desc.resource_type {
        ResourceType::Texture2d => 1,
        ResourceType::Texture3d => desc.depth,
    });
    if level_count > 32 - largest.leading_zeros() {
        logwise::warn_sync!(
            "Level count {levels} too large for a {w}x{h}x{d} texture",
            levels = level_count,
            w = desc.width,
            h = desc.height,
            d = desc.depth
        );
        return Err(Error::InvalidArgument("too many levels"));
    }
    if desc.usage.contains(Usage::AUTOGENMIPMAP) {
        if !lease.caps.mipmap_generation {
            logwise::warn_sync!("Automatic mipmaps requested on a device without support");
            return Err(Error::Unsupported("automatic mipmap generation"));
        }
        if level_count != 1 {
            logwise::warn_sync!("Automatic mipmaps require a single level");
            return Err(Error::InvalidArgument("automatic mipmaps with several levels"));
        }
    }
    let mut state = match desc.resource_type {
        ResourceType::Texture2d => surface::create_state(id, desc, level_count, flags, lease)?,
        ResourceType::Texture3d => volume::create_state(id, desc, level_count, flags, lease)?,
    };
    if let Some(data) = data {
        sub_resource::validate_initial_data(&state, data)?;
    }
    state.flags.set(
        TextureFlags::PIN_SYSMEM,
        flags.contains(CreateFlags::PIN_SYSMEM),
    );
    logwise::info_sync!(
        "Created texture {id} {w}x{h}x{d} {format}",
        id = logwise::privacy::LogIt(&id),
        w = desc.width,
        h = desc.height,
        d = desc.depth,
        format = logwise::privacy::LogIt(&desc.format)
    );
    Ok(state)
}

fn upload_initial_data(
    texture: &mut TextureState,
    lease: &mut Lease<'_>,
    data: &[SubResourceData<'_>],
) -> Result<(), Error> {
    gpu_object::prepare(texture, lease, false)?;
    gpu_object::bind(texture, lease, false)?;
    let ops = texture.ops;
    for (i, entry) in data.iter().enumerate() {
        ops.upload_data(texture, lease, i as u32, entry)?;
    }
    Ok(())
}
