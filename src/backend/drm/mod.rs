//! Hardware plane assignment for kms devices
//!
//! This module decides for every repaint of an output which [`View`](crate::view::View)s
//! can be scanned out directly by a hardware plane and which have to be composited
//! by the renderer.
//!
//! ## How to use it
//!
//! The kernel side is abstracted by the [`KmsDevice`] trait, which needs to offer
//! atomic test and commit of a [`PendingState`] as well as framebuffer import.
//! Wrap it in a [`DrmDevice`] together with the list of planes the device exposes
//! and add an output per active crtc:
//!
//! ```rust,ignore
//! let mut device = DrmDevice::new(kms, planes, DEFAULT_CURSOR_SIZE)?;
//! device.add_output(OutputDescriptor::new(OutputId::new(0), pipe, mode))?;
//! ```
//!
//! On every repaint create a [`PendingState`], call [`DrmDevice::assign_planes`]
//! with the view stack of each output (topmost view first), let the renderer draw
//! everything that was not assigned to a plane if [`AssignResult::needs_renderer`]
//! is set, attach the rendered buffer via [`DrmDevice::attach_renderer_framebuffer`]
//! and finally [`DrmDevice::commit`] the state.
//!
//! ```rust,ignore
//! let mut pending = device.pending_state();
//! let result = device.assign_planes(&mut pending, output, &views, &IdentityColorManager)?;
//! if result.needs_renderer {
//!     let buffer = renderer.render(views.iter().filter(|v| v.plane() == LogicalPlane::Renderer))?;
//!     let fb = device.import_renderer_buffer(&buffer, FramebufferType::GbmSurface)?;
//!     device.attach_renderer_framebuffer(&mut pending, output, fb)?;
//! }
//! device.commit(pending)?;
//! // once the kernel signals the page-flip
//! device.frame_done(output);
//! ```
//!
//! ### Strategies
//!
//! Assignment tries three strategies in order, see [`ProposeMode`]:
//! everything on planes, renderer output on the primary plane with additional
//! overlays, and finally renderer only. The last one never fails, so every repaint
//! ends up with a committable state.

use std::fmt;

mod assign;
mod cursor;
mod device;
mod error;
mod fb;
pub mod feedback;
mod kms;
mod output;
mod plane;
mod propose;
mod state;

#[cfg(any(test, feature = "test_device"))]
pub mod test;

pub use assign::{AssignResult, ViewPlacement};
pub use cursor::{CursorRing, CursorTracker, CURSOR_RING_SIZE};
pub use device::{DrmDevice, DEFAULT_CURSOR_SIZE};
pub use error::Error;
pub use fb::{Framebuffer, FramebufferCache, FramebufferType};
pub use kms::KmsDevice;
pub use output::{DrmOutput, OutputDescriptor};
pub use plane::{Plane, PlaneCapabilities, PlaneInfo, PlaneRegistry};
pub use propose::{plane_coords_for_view, PlaneCoords, ProposeError, ProposeMode};
pub use state::{OutputState, PendingState, PlaneState};

/// Kernel object id of a plane
///
/// With the `backend_drm` feature it converts from and to the handles of the
/// [`drm`](https://docs.rs/drm) crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaneHandle(pub u32);

/// Kernel id of an imported framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FbHandle(pub u32);

#[cfg(feature = "backend_drm")]
mod conversions {
    use drm::control::{framebuffer, from_u32, plane, PlaneType};

    use super::{FbHandle, PlaneHandle, PlaneKind};

    impl From<plane::Handle> for PlaneHandle {
        fn from(handle: plane::Handle) -> Self {
            PlaneHandle(Into::<u32>::into(handle))
        }
    }

    impl From<framebuffer::Handle> for FbHandle {
        fn from(handle: framebuffer::Handle) -> Self {
            FbHandle(Into::<u32>::into(handle))
        }
    }

    impl From<PlaneType> for PlaneKind {
        fn from(ty: PlaneType) -> Self {
            match ty {
                PlaneType::Primary => PlaneKind::Primary,
                PlaneType::Overlay => PlaneKind::Overlay,
                PlaneType::Cursor => PlaneKind::Cursor,
            }
        }
    }

    impl From<PlaneKind> for PlaneType {
        fn from(kind: PlaneKind) -> Self {
            match kind {
                PlaneKind::Primary => PlaneType::Primary,
                PlaneKind::Overlay => PlaneType::Overlay,
                PlaneKind::Cursor => PlaneType::Cursor,
            }
        }
    }

    impl PlaneHandle {
        /// The drm handle of this plane, `None` for the invalid id 0
        pub fn to_drm(self) -> Option<plane::Handle> {
            from_u32(self.0)
        }
    }

    impl FbHandle {
        /// The drm handle of this framebuffer, `None` for the invalid id 0
        pub fn to_drm(self) -> Option<framebuffer::Handle> {
            from_u32(self.0)
        }
    }

}

/// Identifies an output, doubling as its bit in view output masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u8);

impl OutputId {
    /// Maximum amount of outputs that can be tracked
    pub const MAX: u8 = 32;

    /// Create an output id
    ///
    /// Ids at or above [`OutputId::MAX`] are wrapped around.
    pub fn new(index: u8) -> OutputId {
        OutputId(index % Self::MAX)
    }

    /// Bit of this output in an output mask
    #[inline]
    pub fn mask(self) -> u32 {
        1u32 << self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output-{}", self.0)
    }
}

/// Kind of a hardware plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    /// The plane scanning out the main content of a crtc
    Primary,
    /// Additional plane stacked on top of the primary plane
    Overlay,
    /// Small fixed-size plane for cursor images
    Cursor,
}

/// The logical plane a view ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalPlane {
    /// Composited by the renderer into the primary plane
    Renderer,
    /// Scanned out by a dedicated hardware plane
    Hardware {
        /// Plane the view was assigned to
        handle: PlaneHandle,
        /// Kind of that plane
        kind: PlaneKind,
    },
}

/// Presentation feedback of a view after plane assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPresentationState {
    /// The client buffer is scanned out directly
    ZeroCopy,
    /// The content was copied, into the renderer output or a cursor buffer
    Composited,
    /// The view is not visible on the output
    Skipped,
}

bitflags::bitflags! {
    /// Reasons why a view could not be put on a hardware plane
    ///
    /// These are accumulated over all strategies of a repaint and drive the
    /// dmabuf feedback sent to clients.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FailureReasons: u32 {
        /// The view needs to be composited for reasons outside of its buffer, e.g. it spans outputs
        const FORCE_RENDERER = 1 << 0;
        /// No plane supports the format and modifier of the buffer
        const FB_FORMAT_INCOMPATIBLE = 1 << 1;
        /// The buffer uses an implicit modifier the kernel cannot import
        const DMABUF_MODIFIER_INVALID = 1 << 2;
        /// The kernel refused to import the buffer
        const ADD_FB_FAILED = 1 << 3;
        /// No plane was left to try
        const NO_PLANES_AVAILABLE = 1 << 4;
        /// Planes were tried but rejected by z-order, availability or the kernel
        const PLANES_REJECTED = 1 << 5;
        /// The output cannot guarantee the requested content protection
        const INADEQUATE_CONTENT_PROTECTION = 1 << 6;
        /// The plane cannot apply the required transform or scaling
        const INCOMPATIBLE_TRANSFORM = 1 << 7;
        /// The view has no buffer attached
        const NO_BUFFER = 1 << 8;
        /// The buffer does not fit onto the cursor plane
        const BUFFER_TOO_BIG = 1 << 9;
        /// The buffer kind cannot be scanned out
        const BUFFER_TYPE = 1 << 10;
        /// No gpu import path is available
        const NO_GBM = 1 << 11;
        /// The view needs a colour transform only the renderer can apply
        const NO_COLOR_TRANSFORM = 1 << 12;
        /// The view is below content that gets composited
        const OCCLUDED_BY_RENDERER = 1 << 13;
        /// The buffer has an acquire fence but the plane cannot wait on fences
        const FENCE_UNSUPPORTED = 1 << 14;
    }
}

bitflags::bitflags! {
    /// Switches to disable parts of the plane assignment
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScanoutFlags: u32 {
        /// Never use cursor planes
        const DISABLE_CURSOR_PLANE = 1 << 0;
        /// Never use overlay planes
        const DISABLE_OVERLAY_PLANES = 1 << 1;
        /// Composite everything, only the renderer output is scanned out
        const DISABLE_DIRECT_SCANOUT = 1 << 2;
    }
}
