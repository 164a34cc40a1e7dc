use std::io;

use super::{propose::ProposeError, OutputId};
use crate::utils::{Physical, Size};

/// Errors thrown by the [`DrmDevice`](super::DrmDevice)
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The kernel device reported an error
    #[error("DRM access error: {errmsg} ({source})")]
    Access {
        /// Error message associated to the access error
        errmsg: &'static str,
        /// Underlying device error
        #[source]
        source: io::Error,
    },
    /// The monotonic clock used for feedback timing is not available
    #[error("Failed to initialize the monotonic clock")]
    Clock(#[source] io::Error),
    /// No primary plane can drive the crtc of a new output
    #[error("No primary plane available for crtc pipe {0}")]
    NoPrimaryPlane(u32),
    /// The output is not known to this device
    #[error("Output `{0}` is not known to the device")]
    UnknownOutput(OutputId),
    /// An output with this id was already added
    #[error("Output `{0}` was already added")]
    OutputExists(OutputId),
    /// A cursor buffer could not be allocated
    #[error("Failed to allocate a cursor buffer of size {size:?}")]
    CursorAllocation {
        /// Requested cursor size
        size: Size<i32, Physical>,
        /// Underlying device error
        #[source]
        source: io::Error,
    },
    /// The renderer framebuffer does not match the output mode
    #[error("Renderer framebuffer of size {fb:?} does not match the mode {mode:?}")]
    FramebufferSizeMismatch {
        /// Size of the framebuffer
        fb: (i32, i32),
        /// Size of the output mode
        mode: Size<i32, Physical>,
    },
    /// A strategy failed in a way that cannot be recovered from
    #[error(transparent)]
    Propose(#[from] ProposeError),
}
