// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Devices, the context lease, and the swapchain collaborator.
//!
//! A [`Device`] owns a native [`Driver`] and every texture created on it. All location-mutating
//! work happens while a [`Context`] is held: the context is a lease on the device's single
//! rendering context, so only one thread moves texture data at a time, and holding
//! `&mut Context` is the proof that the lease is held.
//!
//! Reference counts live outside the lease. When a count reaches zero while another thread
//! holds the lease, the teardown is queued and runs when that lease is released.
use crate::imp::Driver;
use crate::texture::{TextureId, TextureState};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};

/// What the device can do.
///
/// Drivers report these; tests construct them directly to simulate older hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Textures of any size, mipmapped or not.
    pub non_power_of_two: bool,
    /// Rectangle textures addressed with unnormalized coordinates.
    pub texture_rectangle: bool,
    /// The driver emulates non-power-of-two 2D textures with normalized coordinates.
    pub normalized_texrect: bool,
    /// Automatic mipmap generation.
    pub mipmap_generation: bool,
    pub anisotropic_filtering: bool,
    /// Per-texture control over gamma decoding during sampling.
    pub srgb_decode: bool,
    pub texture_3d: bool,
    /// S3TC block formats on 2D textures.
    pub dxtn: bool,
    /// S3TC block formats on 3D textures.
    pub dxtn_3d: bool,
    pub half_float_textures: bool,
    pub lod_bias: bool,
    pub max_texture_size: u32,
    pub max_3d_texture_size: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            non_power_of_two: true,
            texture_rectangle: true,
            normalized_texrect: false,
            mipmap_generation: true,
            anisotropic_filtering: true,
            srgb_decode: true,
            texture_3d: true,
            dxtn: true,
            dxtn_3d: true,
            half_float_textures: true,
            lod_bias: true,
            max_texture_size: 16384,
            max_3d_texture_size: 2048,
        }
    }
}

/// Creation-time settings of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Row alignment, in bytes, of host memory the engine allocates.
    pub surface_alignment: u32,
    /// Color keys are applied by shaders, so textures never need alpha substitution.
    pub shader_color_key: bool,
    /// Samplers choose gamma decoding per draw, which makes one native object enough for both
    /// the linear and gamma views when the device also has decode control.
    pub srgb_read_write_control: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            surface_alignment: 4,
            shader_color_key: false,
            srgb_read_write_control: true,
        }
    }
}

/// Warnings emitted at most once per device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    DxtnUnsupported,
    AnisotropyUnsupported,
    /// A gamma-encoded variant was requested for a format without one.
    MissingGammaFormat,
    /// A scratch texture was created with non-power-of-two mipmaps on a device without support.
    ScratchNonPow2,
}

/// Record of which once-only warnings were already emitted.
#[derive(Debug, Default)]
pub struct Diagnostics {
    emitted: HashSet<Diagnostic>,
}

impl Diagnostics {
    /// Records `diagnostic` and returns whether this is its first occurrence.
    pub(crate) fn first_time(&mut self, diagnostic: Diagnostic) -> bool {
        self.emitted.insert(diagnostic)
    }

    pub fn has_emitted(&self, diagnostic: Diagnostic) -> bool {
        self.emitted.contains(&diagnostic)
    }
}

/// State only reachable through the lease.
pub(crate) struct ContextState {
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) textures: HashMap<TextureId, TextureState>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) next_bitmap: u64,
}

/// Borrowed view of everything except the texture arena, handed to texture operations.
pub(crate) struct Lease<'a> {
    pub(crate) driver: &'a mut dyn Driver,
    pub(crate) diagnostics: &'a mut Diagnostics,
    pub(crate) caps: &'a Capabilities,
    pub(crate) config: &'a DeviceConfig,
    pub(crate) next_bitmap: &'a mut u64,
}

impl Lease<'_> {
    /// Whether linear and gamma sampling need two native objects.
    pub(crate) fn needs_separate_srgb(&self) -> bool {
        !(self.caps.srgb_decode && self.config.srgb_read_write_control)
    }
}

impl ContextState {
    pub(crate) fn split<'a>(
        &'a mut self,
        device: &'a Device,
    ) -> (&'a mut HashMap<TextureId, TextureState>, Lease<'a>) {
        let ContextState {
            driver,
            textures,
            diagnostics,
            next_bitmap,
        } = self;
        (
            textures,
            Lease {
                driver: driver.as_mut(),
                diagnostics,
                caps: &device.caps,
                config: &device.config,
                next_bitmap,
            },
        )
    }

    fn run_teardown(&mut self, device: &Device, id: TextureId) {
        let (textures, mut lease) = self.split(device);
        if let Some(texture) = textures.remove(&id) {
            crate::texture::teardown(texture, &mut lease);
        }
    }
}

/// A device: one native driver, one context, and the textures created on it.
pub struct Device {
    caps: Capabilities,
    config: DeviceConfig,
    state: Mutex<ContextState>,
    pending_teardown: Mutex<Vec<TextureId>>,
    next_texture_id: AtomicU64,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("caps", &self.caps)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(driver: Box<dyn Driver>, config: DeviceConfig) -> Arc<Device> {
        let caps = driver.capabilities();
        logwise::info_sync!(
            "Creating device, caps {caps}",
            caps = logwise::privacy::LogIt(&caps)
        );
        Arc::new(Device {
            caps,
            config,
            state: Mutex::new(ContextState {
                driver,
                textures: HashMap::new(),
                diagnostics: Diagnostics::default(),
                next_bitmap: 1,
            }),
            pending_teardown: Mutex::new(Vec::new()),
            next_texture_id: AtomicU64::new(1),
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Takes the context lease, blocking while another thread holds it.
    ///
    /// Re-acquiring on a thread that already holds the lease deadlocks.
    pub fn acquire_context(self: &Arc<Self>) -> Context<'_> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut context = Context {
            device: self,
            state,
            _drain: DrainOnRelease(self),
        };
        context.run_pending_teardown();
        context
    }

    pub(crate) fn next_texture_id(&self) -> TextureId {
        TextureId(self.next_texture_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Destroys a texture whose reference count reached zero.
    ///
    /// Runs immediately when the lease is free, otherwise when the current holder releases it.
    pub(crate) fn schedule_teardown(&self, id: TextureId) {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                logwise::trace_sync!(
                    "Context busy, deferring teardown of {id}",
                    id = logwise::privacy::LogIt(&id)
                );
                self.pending_teardown
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(id);
                //the holder may have released between the two locks
                match self.state.try_lock() {
                    Ok(mut state) => self.drain_pending(&mut state),
                    Err(TryLockError::Poisoned(p)) => self.drain_pending(&mut p.into_inner()),
                    Err(TryLockError::WouldBlock) => {}
                }
                return;
            }
        };
        state.run_teardown(self, id);
    }

    fn drain_pending(&self, state: &mut ContextState) {
        let pending = std::mem::take(
            &mut *self
                .pending_teardown
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for id in pending {
            state.run_teardown(self, id);
        }
    }
}

/// The context lease. Released on drop.
pub struct Context<'d> {
    device: &'d Arc<Device>,
    state: MutexGuard<'d, ContextState>,
    // declared after `state` so it runs once the guard is released
    _drain: DrainOnRelease<'d>,
}

/// Runs teardowns queued while the lease was held.
///
/// A scheduler that found the lease busy queues its texture and retries the lock once. That
/// retry can land before the holder's guard is gone, so the queue is checked again after it is.
struct DrainOnRelease<'d>(&'d Device);

impl Drop for DrainOnRelease<'_> {
    fn drop(&mut self) {
        let device = self.0;
        while !device
            .pending_teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
        {
            match device.state.try_lock() {
                Ok(mut state) => device.drain_pending(&mut state),
                Err(TryLockError::Poisoned(p)) => device.drain_pending(&mut p.into_inner()),
                // the new holder drains on its own release
                Err(TryLockError::WouldBlock) => break,
            }
        }
    }
}

impl<'d> Context<'d> {
    pub fn device(&self) -> &'d Arc<Device> {
        self.device
    }

    pub fn capabilities(&self) -> &'d Capabilities {
        &self.device.caps
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.state.diagnostics
    }

    pub fn driver(&self) -> &dyn Driver {
        self.state.driver.as_ref()
    }

    /// Direct access to the native driver, for collaborators that draw with the textures.
    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.state.driver.as_mut()
    }

    /// Number of live textures on the device.
    pub fn texture_count(&self) -> usize {
        self.state.textures.len()
    }

    pub(crate) fn split(&mut self) -> (&mut HashMap<TextureId, TextureState>, Lease<'_>) {
        let device: &Device = self.device;
        self.state.split(device)
    }

    fn run_pending_teardown(&mut self) {
        let device: &Device = self.device;
        device.drain_pending(&mut self.state);
    }
}

/// The presentation chain a texture can be bound to.
///
/// While bound, a texture's reference count is the swapchain's. When that count reaches zero
/// every texture still bound is torn down.
#[derive(Debug)]
pub struct Swapchain {
    refcount: AtomicU32,
    bound: Mutex<Vec<(Weak<Device>, TextureId)>>,
}

impl Swapchain {
    pub fn new() -> Arc<Swapchain> {
        Arc::new(Swapchain {
            refcount: AtomicU32::new(1),
            bound: Mutex::new(Vec::new()),
        })
    }

    pub fn incref(&self) -> u32 {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops one reference. At zero the bound textures are torn down.
    pub fn decref(&self) -> u32 {
        let previous = self
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));
        let Ok(previous) = previous else {
            logwise::error_sync!("Swapchain released more often than referenced");
            return 0;
        };
        let refcount = previous - 1;
        if refcount == 0 {
            let bound = std::mem::take(
                &mut *self.bound.lock().unwrap_or_else(PoisonError::into_inner),
            );
            logwise::info_sync!(
                "Swapchain released, tearing down {count} bound textures",
                count = bound.len()
            );
            for (device, id) in bound {
                if let Some(device) = device.upgrade() {
                    device.schedule_teardown(id);
                }
            }
        }
        refcount
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn attach(&self, device: &Arc<Device>, id: TextureId) {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Arc::downgrade(device), id));
    }

    pub(crate) fn detach(&self, id: TextureId) {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(_, bound)| *bound != id);
    }
}
