use std::io;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use super::{error::Error, fb::Framebuffer, kms::KmsDevice, FbHandle, FramebufferType};
use crate::backend::allocator::{shm::ShmBuffer, Buffer as _, Format, Fourcc, Modifier};
use crate::utils::{AliveTracker, Physical, Size};
use crate::view::{View, ViewId};

/// Number of cursor buffers per output
pub const CURSOR_RING_SIZE: usize = 2;

/// Cursor buffers of an output, written to in turns
///
/// The buffer being scanned out is never overwritten. The first upload of a
/// repaint goes to the next slot which becomes the current one, later uploads
/// of the same repaint rewrite that slot.
#[derive(Debug)]
pub struct CursorRing {
    slots: Vec<Framebuffer>,
    current: usize,
    size: Size<i32, Physical>,
}

impl CursorRing {
    /// Allocate the cursor buffers
    pub fn new(
        kms: &Rc<dyn KmsDevice>,
        size: Size<i32, Physical>,
        plane_mask: u32,
    ) -> Result<CursorRing, Error> {
        let slots = (0..CURSOR_RING_SIZE)
            .map(|_| {
                let handle = kms
                    .create_cursor_framebuffer(size)
                    .map_err(|source| Error::CursorAllocation { size, source })?;
                Ok(Framebuffer::new(
                    kms.clone(),
                    handle,
                    FramebufferType::Cursor,
                    Format {
                        code: Fourcc::Argb8888,
                        modifier: Modifier::Linear,
                    },
                    (size.w, size.h).into(),
                    plane_mask,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(CursorRing {
            slots,
            current: 0,
            size,
        })
    }

    /// Size of every cursor buffer
    pub fn size(&self) -> Size<i32, Physical> {
        self.size
    }

    /// The buffer written last
    pub fn current(&self) -> &Framebuffer {
        &self.slots[self.current]
    }

    /// Switch to the next buffer and return it
    pub fn advance(&mut self) -> &Framebuffer {
        self.current = (self.current + 1) % self.slots.len();
        &self.slots[self.current]
    }

    /// Copy `shm` into a cursor buffer, top-left aligned, and make it current
    ///
    /// With `reuse_current` the current buffer is rewritten, otherwise the ring
    /// advances first. The buffer `scanned_out` is skipped in both cases. The
    /// remainder of the cursor buffer is cleared.
    pub fn upload(
        &mut self,
        kms: &dyn KmsDevice,
        shm: &ShmBuffer,
        reuse_current: bool,
        scanned_out: Option<FbHandle>,
    ) -> io::Result<()> {
        let cursor_w = self.size.w.max(0) as usize;
        let cursor_h = self.size.h.max(0) as usize;
        let stride = cursor_w * 4;
        let mut data = vec![0u8; stride * cursor_h];

        let size = shm.size();
        let row_len = (size.w.max(0) as usize).min(cursor_w) * 4;
        let rows = (size.h.max(0) as usize).min(cursor_h);
        let src_stride = shm.stride() as usize;
        for (row, dst) in data.chunks_exact_mut(stride).take(rows).enumerate() {
            let start = row * src_stride;
            dst[..row_len].copy_from_slice(&shm.data()[start..start + row_len]);
        }

        if !reuse_current {
            self.advance();
        }
        if Some(self.current().handle()) == scanned_out {
            self.advance();
        }
        let fb = self.current().handle();
        trace!(fb = fb.0, reuse_current, "Uploading cursor image");
        kms.write_cursor(fb, &data, stride as u32)
    }
}

/// Remembers which view the cursor buffers currently show
///
/// The view is tracked weakly, a destroyed view is forgotten on the next poll.
#[derive(Debug, Default)]
pub struct CursorTracker {
    current: Option<(ViewId, Arc<AliveTracker>)>,
    uploaded_this_repaint: bool,
}

impl CursorTracker {
    /// Whether the cursor buffers already hold the content of `view`
    pub fn is(&mut self, view: &View) -> bool {
        self.poll();
        self.current.as_ref().is_some_and(|(id, _)| id == view.id())
    }

    /// Whether a cursor image was uploaded since [`CursorTracker::begin_repaint`]
    pub fn uploaded_this_repaint(&self) -> bool {
        self.uploaded_this_repaint
    }

    /// The tracked view, if still alive
    pub fn view(&self) -> Option<&ViewId> {
        self.current
            .as_ref()
            .filter(|(_, alive)| alive.alive())
            .map(|(id, _)| id)
    }

    pub(super) fn set(&mut self, view: &View) {
        self.current = Some((view.id().clone(), view.alive_tracker().clone()));
    }

    pub(super) fn mark_uploaded(&mut self) {
        self.uploaded_this_repaint = true;
    }

    /// Forget the tracked view
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Forget `view` if it is the tracked one
    pub fn invalidate(&mut self, view: &ViewId) {
        if self.current.as_ref().is_some_and(|(id, _)| id == view) {
            self.current = None;
        }
    }

    pub(super) fn begin_repaint(&mut self) {
        self.uploaded_this_repaint = false;
        self.poll();
    }

    fn poll(&mut self) {
        if self.current.as_ref().is_some_and(|(_, alive)| !alive.alive()) {
            self.current = None;
        }
    }
}
