//! Kernel facing parts of the plane allocator
//!
//! - [`allocator`] contains the client buffer types that can end up on a plane.
//! - [`drm`] contains the plane assignment itself.

pub mod allocator;
pub mod drm;
