//! Buffer types handed to the plane allocator
//!
//! Clients hand the compositor either [`dmabuf::Dmabuf`]s, which may be imported
//! as kernel framebuffers, or [`shm::ShmBuffer`]s living in CPU memory, which
//! can at best be copied into a cursor buffer.

pub mod dmabuf;
pub mod format;
pub mod shm;

pub use drm_fourcc::{
    DrmFormat as Format, DrmFourcc as Fourcc, DrmModifier as Modifier, UnrecognizedFourcc,
};

use crate::utils::{Buffer as BufferCoords, Rectangle, Size};

/// Common functionality of client buffers
pub trait Buffer {
    /// Size of the buffer
    fn size(&self) -> Size<i32, BufferCoords>;

    /// Width of the two-dimensional buffer
    fn width(&self) -> u32 {
        self.size().w as u32
    }

    /// Height of the two-dimensional buffer
    fn height(&self) -> u32 {
        self.size().h as u32
    }

    /// Returns the [`Format`] of this buffer
    fn format(&self) -> Format;

    /// The full buffer as a rectangle in buffer coordinates
    fn extent(&self) -> Rectangle<i32, BufferCoords> {
        Rectangle::from_size(self.size())
    }
}
