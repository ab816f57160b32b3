// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Overlay placement for textures created with [`Usage::OVERLAY`].
//!
//! An overlay remembers which sub-resource it is shown on by id and index. A destination that
//! has since been destroyed reads as hidden.
use super::{ResourceType, Texture, TextureId, TextureState, Usage};
use crate::coordinates::Rect;
use crate::device::Context;
use crate::error::Error;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct OverlayFlags: u32 {
        const SHOW = 1 << 0;
        /// Hiding also erases both rectangles.
        const HIDE = 1 << 1;
    }
}

/// Signed destination rectangle; overlays may hang off the destination's edges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct DestRect {
    pub(crate) left: i32,
    pub(crate) top: i32,
    pub(crate) right: i32,
    pub(crate) bottom: i32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct OverlayState {
    pub(crate) src_rect: Rect,
    pub(crate) dst_rect: DestRect,
    /// Sub-resource the overlay is shown on.
    pub(crate) dest: Option<(TextureId, u32)>,
}

fn overlay_mut(texture: &mut TextureState, index: u32) -> Result<&mut OverlayState, Error> {
    if !texture.usage.contains(Usage::OVERLAY)
        || texture.resource_type != ResourceType::Texture2d
        || index >= texture.sub_resource_count()
    {
        logwise::warn_sync!(
            "Sub-resource {index} is not an overlay",
            index = index
        );
        return Err(Error::NotAnOverlay);
    }
    texture.sub_resources[index as usize]
        .overlay
        .as_mut()
        .ok_or(Error::NotAnOverlay)
}

impl Texture {
    /// Top-left corner of the overlay on its destination.
    pub fn overlay_position(&self, context: &mut Context<'_>, index: u32) -> Result<(i32, i32), Error> {
        if !Arc::ptr_eq(self.device(), context.device()) {
            return Err(Error::WrongDevice);
        }
        let (textures, _) = context.split();
        let texture = textures.get_mut(&self.id()).ok_or(Error::Destroyed)?;
        let overlay = overlay_mut(texture, index)?;
        let Some((dest, _)) = overlay.dest else {
            logwise::trace_sync!("Overlay not visible");
            return Err(Error::OverlayNotVisible);
        };
        let (left, top) = (overlay.dst_rect.left, overlay.dst_rect.top);
        if !textures.contains_key(&dest) {
            logwise::trace_sync!("Overlay destination destroyed");
            return Err(Error::OverlayNotVisible);
        }
        Ok((left, top))
    }

    /// Moves the overlay, keeping its size.
    pub fn set_overlay_position(
        &self,
        context: &mut Context<'_>,
        index: u32,
        x: i32,
        y: i32,
    ) -> Result<(), Error> {
        self.with_state(context, |t, _| {
            let rect = &mut overlay_mut(t, index)?.dst_rect;
            let (w, h) = (rect.right - rect.left, rect.bottom - rect.top);
            *rect = DestRect {
                left: x,
                top: y,
                right: x + w,
                bottom: y + h,
            };
            Ok(())
        })
    }

    /// Places the overlay on `destination`, and shows or hides it.
    ///
    /// Missing rectangles default to the whole source and the whole destination.
    #[allow(clippy::too_many_arguments)]
    pub fn update_overlay(
        &self,
        context: &mut Context<'_>,
        index: u32,
        src_rect: Option<Rect>,
        destination: &Texture,
        dst_index: u32,
        dst_rect: Option<Rect>,
        flags: OverlayFlags,
    ) -> Result<(), Error> {
        if !Arc::ptr_eq(self.device(), context.device())
            || !Arc::ptr_eq(destination.device(), context.device())
        {
            return Err(Error::WrongDevice);
        }
        let (textures, _) = context.split();
        let dst_size = {
            let dst = textures.get(&destination.id()).ok_or(Error::Destroyed)?;
            if dst.resource_type != ResourceType::Texture2d || dst_index >= dst.sub_resource_count()
            {
                logwise::warn_sync!("Invalid overlay destination");
                return Err(Error::InvalidArgument("invalid overlay destination"));
            }
            let sub = &dst.sub_resources[dst_index as usize];
            (sub.width, sub.height)
        };
        let texture = textures.get_mut(&self.id()).ok_or(Error::Destroyed)?;
        let (width, height) = {
            overlay_mut(texture, index)?;
            let sub = &texture.sub_resources[index as usize];
            (sub.width, sub.height)
        };
        let overlay = overlay_mut(texture, index)?;
        overlay.src_rect = src_rect.unwrap_or(Rect::whole(width, height));
        let dst_rect = dst_rect.unwrap_or(Rect::whole(dst_size.0, dst_size.1));
        overlay.dst_rect = DestRect {
            left: dst_rect.left as i32,
            top: dst_rect.top as i32,
            right: dst_rect.right as i32,
            bottom: dst_rect.bottom as i32,
        };
        let target = (destination.id(), dst_index);
        if overlay.dest.is_some_and(|d| d != target) || flags.contains(OverlayFlags::HIDE) {
            overlay.dest = None;
        }
        if flags.contains(OverlayFlags::SHOW) {
            overlay.dest = Some(target);
        } else if flags.contains(OverlayFlags::HIDE) {
            overlay.src_rect = Rect::default();
            overlay.dst_rect = DestRect::default();
            overlay.dest = None;
        }
        logwise::trace_sync!(
            "Overlay {index} now shown on {dest}",
            index = index,
            dest = logwise::privacy::LogIt(&overlay.dest)
        );
        Ok(())
    }
}
