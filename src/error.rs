// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::DriverError;

/// Errors returned by texture operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller passed something malformed or the request conflicts with the current state.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The device or format cannot do what was asked.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("out of memory")]
    OutOfMemory,
    /// A sub-resource had no valid location to load from. This is an internal consistency defect.
    #[error("sub-resource {sub_resource} has no valid location")]
    NoValidLocation { sub_resource: u32 },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("a legacy view of this sub-resource is already outstanding")]
    LegacyViewInUse,
    #[error("no matching legacy view is outstanding")]
    NoLegacyView,
    #[error("texture is not an overlay")]
    NotAnOverlay,
    #[error("overlay is not visible")]
    OverlayNotVisible,
    /// The texture belongs to a different device than the context.
    #[error("texture belongs to another device")]
    WrongDevice,
    #[error("texture was destroyed")]
    Destroyed,
    #[error(transparent)]
    Driver(DriverError),
    #[error("png: {0}")]
    Png(#[from] png::DecodingError),
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::OutOfMemory => Error::OutOfMemory,
            DriverError::UnsupportedFormat(_) => Error::Unsupported("format rejected by driver"),
            other => Error::Driver(other),
        }
    }
}
