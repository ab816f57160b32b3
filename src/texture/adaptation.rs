// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Fitting requested geometry onto what the device can store.
//!
//! Devices without non-power-of-two textures get one of three fallbacks, tried in order: a
//! rectangle texture addressed in texels, the driver's own normalized rectangle emulation, or
//! storage padded up to powers of two with a matrix stretching coordinates onto the used part.
use super::{Pool, TextureFlags};
use crate::device::{Capabilities, Diagnostic, Diagnostics};
use crate::error::Error;
use crate::imp::TextureTarget;

pub(crate) const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

fn diagonal(x: f32, y: f32) -> [f32; 16] {
    let mut matrix = IDENTITY;
    matrix[0] = x;
    matrix[5] = y;
    matrix
}

/// What [`plan_2d`] looks at.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Request {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) level_count: u32,
    pub(crate) cube: bool,
    pub(crate) compressed: bool,
    pub(crate) autogen_mipmap: bool,
    pub(crate) pool: Pool,
}

/// How a 2D texture will be stored.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Plan {
    pub(crate) target: TextureTarget,
    /// Whether storage is padded up to powers of two.
    pub(crate) padded: bool,
    pub(crate) flags: TextureFlags,
    pub(crate) matrix: [f32; 16],
}

pub(crate) fn plan_2d(
    request: &Request,
    caps: &Capabilities,
    diagnostics: &mut Diagnostics,
) -> Result<Plan, Error> {
    let normal_target = if request.cube {
        TextureTarget::CubeMap
    } else {
        TextureTarget::Texture2d
    };
    let (Some(pow2_width), Some(pow2_height)) = (
        request.width.checked_next_power_of_two(),
        request.height.checked_next_power_of_two(),
    ) else {
        return Err(Error::InvalidArgument("texture too large to pad"));
    };
    let npot = pow2_width != request.width || pow2_height != request.height;
    if caps.non_power_of_two || !npot {
        return Ok(Plan {
            target: normal_target,
            padded: false,
            flags: TextureFlags::NORMALIZED_COORDS | TextureFlags::POW2_MAT_IDENT,
            matrix: IDENTITY,
        });
    }
    if request.level_count != 1 || request.cube {
        if request.pool != Pool::Scratch {
            logwise::warn_sync!(
                "Attempted to create a mipmapped or cube texture of {w}x{h} without non-power-of-two support",
                w = request.width,
                h = request.height
            );
            return Err(Error::InvalidArgument(
                "non-power-of-two mipmapped texture on a device without support",
            ));
        }
        if diagnostics.first_time(Diagnostic::ScratchNonPow2) {
            logwise::warn_sync!(
                "Creating a scratch non-power-of-two mipmapped texture; it can never be drawn with"
            );
        }
    }
    if caps.texture_rectangle
        && request.level_count == 1
        && !request.cube
        && !request.compressed
        && !request.autogen_mipmap
    {
        logwise::trace_sync!(
            "Using a rectangle texture for {w}x{h}",
            w = request.width,
            h = request.height
        );
        return Ok(Plan {
            target: TextureTarget::Rectangle,
            padded: false,
            flags: TextureFlags::COND_NP2,
            matrix: diagonal(request.width as f32, request.height as f32),
        });
    }
    if caps.normalized_texrect {
        return Ok(Plan {
            target: normal_target,
            padded: false,
            flags: TextureFlags::NORMALIZED_COORDS
                | TextureFlags::COND_NP2
                | TextureFlags::POW2_MAT_IDENT,
            matrix: IDENTITY,
        });
    }
    logwise::trace_sync!(
        "Padding {w}x{h} to {pw}x{ph}",
        w = request.width,
        h = request.height,
        pw = pow2_width,
        ph = pow2_height
    );
    Ok(Plan {
        target: normal_target,
        padded: true,
        flags: TextureFlags::NORMALIZED_COORDS,
        matrix: diagonal(
            request.width as f32 / pow2_width as f32,
            request.height as f32 / pow2_height as f32,
        ),
    })
}

/// Volumes have no fallback: without non-power-of-two support they must be powers of two,
/// unless they are never drawn with.
pub(crate) fn check_volume(
    width: u32,
    height: u32,
    depth: u32,
    pool: Pool,
    caps: &Capabilities,
) -> Result<(), Error> {
    let pow2 = width.is_power_of_two() && height.is_power_of_two() && depth.is_power_of_two();
    if caps.non_power_of_two || pow2 {
        return Ok(());
    }
    if pool == Pool::Scratch {
        logwise::warn_sync!(
            "Creating a scratch non-power-of-two volume of {w}x{h}x{d}",
            w = width,
            h = height,
            d = depth
        );
        return Ok(());
    }
    logwise::warn_sync!(
        "Volume of {w}x{h}x{d} needs non-power-of-two support",
        w = width,
        h = height,
        d = depth
    );
    Err(Error::InvalidArgument("non-power-of-two volume"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: u32, height: u32) -> Request {
        Request {
            width,
            height,
            level_count: 1,
            cube: false,
            compressed: false,
            autogen_mipmap: false,
            pool: Pool::Default,
        }
    }

    fn old_caps() -> Capabilities {
        Capabilities {
            non_power_of_two: false,
            texture_rectangle: false,
            ..Capabilities::default()
        }
    }

    #[test]
    fn test_native_npot() {
        let plan = plan_2d(&request(5, 3), &Capabilities::default(), &mut Diagnostics::default()).unwrap();
        assert_eq!(plan.target, TextureTarget::Texture2d);
        assert!(!plan.padded);
        assert!(plan.flags.contains(TextureFlags::POW2_MAT_IDENT));
    }

    #[test]
    fn test_rectangle() {
        let caps = Capabilities {
            texture_rectangle: true,
            ..old_caps()
        };
        let plan = plan_2d(&request(5, 3), &caps, &mut Diagnostics::default()).unwrap();
        assert_eq!(plan.target, TextureTarget::Rectangle);
        assert!(plan.flags.contains(TextureFlags::COND_NP2));
        assert!(!plan.flags.contains(TextureFlags::NORMALIZED_COORDS));
        assert_eq!(plan.matrix[0], 5.0);
        assert_eq!(plan.matrix[5], 3.0);
    }

    #[test]
    fn test_normalized_emulation() {
        let caps = Capabilities {
            normalized_texrect: true,
            ..old_caps()
        };
        let plan = plan_2d(&request(5, 3), &caps, &mut Diagnostics::default()).unwrap();
        assert_eq!(plan.target, TextureTarget::Texture2d);
        assert_eq!(plan.matrix, IDENTITY);
        assert!(plan.flags.contains(TextureFlags::COND_NP2));
    }

    #[test]
    fn test_padded() {
        let plan = plan_2d(&request(6, 3), &old_caps(), &mut Diagnostics::default()).unwrap();
        assert!(plan.padded);
        assert_eq!(plan.matrix[0], 0.75);
        assert_eq!(plan.matrix[5], 0.75);
        assert!(!plan.flags.contains(TextureFlags::POW2_MAT_IDENT));
    }

    #[test]
    fn test_mipmapped_rejected_unless_scratch() {
        let mut r = request(6, 6);
        r.level_count = 2;
        let mut diagnostics = Diagnostics::default();
        assert!(matches!(
            plan_2d(&r, &old_caps(), &mut diagnostics),
            Err(Error::InvalidArgument(_))
        ));
        r.pool = Pool::Scratch;
        assert!(plan_2d(&r, &old_caps(), &mut diagnostics).unwrap().padded);
        assert!(diagnostics.has_emitted(Diagnostic::ScratchNonPow2));
    }

    #[test]
    fn test_unpaddable_size_rejected() {
        let r = request((1 << 31) + 1, 1);
        assert!(matches!(
            plan_2d(&r, &old_caps(), &mut Diagnostics::default()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_volume() {
        assert!(check_volume(4, 4, 4, Pool::Default, &old_caps()).is_ok());
        assert!(check_volume(3, 4, 4, Pool::Default, &old_caps()).is_err());
        assert!(check_volume(3, 4, 4, Pool::Scratch, &old_caps()).is_ok());
    }
}
