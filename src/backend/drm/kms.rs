use std::io;

use super::{FbHandle, PendingState};
use crate::backend::allocator::dmabuf::Dmabuf;
use crate::utils::{Physical, Size};

/// Kernel side of plane assignment
///
/// Implementations translate a [`PendingState`] into an atomic request.
/// Plane states that are disabled (without framebuffer) have to be turned off.
pub trait KmsDevice {
    /// Device number, used to target dmabuf feedback tranches
    fn device_id(&self) -> u64;

    /// Whether buffers can be imported through the gpu at all
    fn has_import_path(&self) -> bool;

    /// Validate the state without applying it
    ///
    /// Must not have any side effects, a failing test is an expected outcome.
    fn test_state(&self, state: &PendingState) -> io::Result<()>;

    /// Apply the state atomically for all outputs it contains
    fn commit_state(&self, state: &PendingState) -> io::Result<()>;

    /// Import a buffer as a kernel framebuffer
    fn add_framebuffer(&self, buffer: &Dmabuf) -> io::Result<FbHandle>;

    /// Allocate a framebuffer usable on cursor planes
    fn create_cursor_framebuffer(&self, size: Size<i32, Physical>) -> io::Result<FbHandle>;

    /// Overwrite the pixels of a cursor framebuffer
    ///
    /// `data` holds tightly packed rows of `stride` bytes in ARGB8888.
    fn write_cursor(&self, fb: FbHandle, data: &[u8], stride: u32) -> io::Result<()>;

    /// Release a framebuffer once its last user is gone
    fn remove_framebuffer(&self, fb: FbHandle);
}
