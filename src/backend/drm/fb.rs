use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::{error::Error, kms::KmsDevice, plane::PlaneRegistry, FailureReasons, FbHandle};
use crate::backend::allocator::{
    dmabuf::{Dmabuf, WeakDmabuf},
    Buffer as _, Format, Modifier,
};
use crate::utils::{Buffer, Size};
use crate::view::{View, ViewBuffer};

/// Origin of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferType {
    /// A client buffer imported directly
    ClientBuffer,
    /// A dmabuf the compositor allocated itself
    Dmabuf,
    /// Output of the gpu renderer
    GbmSurface,
    /// Output of the software renderer
    PixmanDumb,
    /// One of the cursor buffers of an output
    Cursor,
}

impl FramebufferType {
    /// Whether framebuffers of this type hold renderer output
    pub fn is_renderer_output(&self) -> bool {
        matches!(self, FramebufferType::GbmSurface | FramebufferType::PixmanDumb)
    }
}

struct FramebufferInner {
    handle: FbHandle,
    ty: FramebufferType,
    format: Format,
    size: Size<i32, Buffer>,
    plane_mask: u32,
    kms: Rc<dyn KmsDevice>,
}

impl Drop for FramebufferInner {
    fn drop(&mut self) {
        trace!(fb = self.handle.0, "Removing framebuffer");
        self.kms.remove_framebuffer(self.handle);
    }
}

/// A kernel framebuffer
///
/// Framebuffers are reference counted, the kernel object is removed once the
/// last clone is dropped. Plane states hold clones for as long as the
/// framebuffer may be scanned out.
#[derive(Clone)]
pub struct Framebuffer(Rc<FramebufferInner>);

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.0.handle)
            .field("ty", &self.0.ty)
            .field("format", &self.0.format)
            .field("size", &self.0.size)
            .field("plane_mask", &format_args!("{:#b}", self.0.plane_mask))
            .finish()
    }
}

impl PartialEq for Framebuffer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Framebuffer {}

impl Framebuffer {
    pub(super) fn new(
        kms: Rc<dyn KmsDevice>,
        handle: FbHandle,
        ty: FramebufferType,
        format: Format,
        size: Size<i32, Buffer>,
        plane_mask: u32,
    ) -> Framebuffer {
        Framebuffer(Rc::new(FramebufferInner {
            handle,
            ty,
            format,
            size,
            plane_mask,
            kms,
        }))
    }

    /// Kernel handle
    pub fn handle(&self) -> FbHandle {
        self.0.handle
    }

    /// Origin of the framebuffer
    pub fn ty(&self) -> FramebufferType {
        self.0.ty
    }

    /// Pixel format and modifier
    pub fn format(&self) -> Format {
        self.0.format
    }

    /// Size in pixels
    pub fn size(&self) -> Size<i32, Buffer> {
        self.0.size
    }

    /// Planes able to scan out this framebuffer, by registry bit
    pub fn plane_mask(&self) -> u32 {
        self.0.plane_mask
    }

    /// Number of live references
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

/// Imported framebuffers of client buffers
///
/// Imports are keyed by the buffer, so a client reusing a buffer does not hit
/// the kernel again. Failed imports are remembered as well.
pub struct FramebufferCache {
    kms: Rc<dyn KmsDevice>,
    cache: HashMap<WeakDmabuf, Result<Framebuffer, FailureReasons>>,
}

impl fmt::Debug for FramebufferCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferCache")
            .field("entries", &self.cache.len())
            .finish()
    }
}

impl FramebufferCache {
    /// Create an empty cache importing through `kms`
    pub fn new(kms: Rc<dyn KmsDevice>) -> FramebufferCache {
        FramebufferCache {
            kms,
            cache: HashMap::new(),
        }
    }

    /// Number of cached imports, failed ones included
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get the framebuffer for the buffer of `view`, importing it if necessary
    #[profiling::function]
    pub fn acquire(&mut self, view: &View, planes: &PlaneRegistry) -> Result<Framebuffer, FailureReasons> {
        let Some(ViewBuffer::Dmabuf(dmabuf)) = view.buffer() else {
            return Err(FailureReasons::BUFFER_TYPE);
        };

        let key = dmabuf.weak();
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let result = self.import(dmabuf, planes);
        if let Err(reasons) = result.as_ref() {
            debug!(?reasons, "Unable to import client buffer");
        }
        self.cache.insert(key, result.clone());
        result
    }

    fn import(&self, dmabuf: &Dmabuf, planes: &PlaneRegistry) -> Result<Framebuffer, FailureReasons> {
        let format = dmabuf.format();
        if format.modifier == Modifier::Invalid && dmabuf.num_planes() > 1 {
            return Err(FailureReasons::DMABUF_MODIFIER_INVALID);
        }

        let plane_mask = planes.format_mask(format);
        if plane_mask == 0 {
            return Err(FailureReasons::FB_FORMAT_INCOMPATIBLE);
        }

        let handle = self.kms.add_framebuffer(dmabuf).map_err(|err| {
            debug!(?err, "Kernel refused framebuffer import");
            FailureReasons::ADD_FB_FAILED
        })?;
        trace!(fb = handle.0, ?format, "Imported client buffer");

        Ok(Framebuffer::new(
            self.kms.clone(),
            handle,
            FramebufferType::ClientBuffer,
            format,
            dmabuf.size(),
            plane_mask,
        ))
    }

    /// Import a buffer produced by the compositor itself
    ///
    /// These are not cached, the caller keeps the framebuffer alive together
    /// with its swapchain slot.
    pub fn import_renderer(
        &self,
        dmabuf: &Dmabuf,
        ty: FramebufferType,
        planes: &PlaneRegistry,
    ) -> Result<Framebuffer, Error> {
        let handle = self.kms.add_framebuffer(dmabuf).map_err(|source| Error::Access {
            errmsg: "Failed to import renderer buffer",
            source,
        })?;
        let format = dmabuf.format();
        Ok(Framebuffer::new(
            self.kms.clone(),
            handle,
            ty,
            format,
            dmabuf.size(),
            planes.format_mask(format),
        ))
    }

    /// Forget imports of buffers that were destroyed
    pub fn cleanup(&mut self) {
        self.cache.retain(|buffer, _| !buffer.is_gone());
    }
}
