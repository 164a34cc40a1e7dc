//! Views, the positioned surface content fed into plane assignment
//!
//! A [`View`] is owned by the surface-management layer of the compositor. It
//! describes where a buffer appears in the global compositor space, how it is
//! cropped and transformed and which parts of it are known to be opaque.
//!
//! The allocator only reads views during
//! [`DrmDevice::assign_planes`](crate::backend::drm::DrmDevice::assign_planes) and
//! writes back the outcome of the assignment through [`View::plane`] and
//! [`View::presentation_state`].
//!
//! Dropping a view notifies everyone tracking it, for example the output
//! remembering which view currently sits on its cursor plane.

use std::cell::{Cell, RefCell};
use std::os::unix::io::OwnedFd;
use std::rc::Rc;
use std::sync::Arc;

use crate::backend::allocator::{dmabuf::Dmabuf, format::has_alpha, shm::ShmBuffer, Buffer as _};
use crate::backend::drm::{
    feedback::DmabufFeedback, FailureReasons, LogicalPlane, OutputId, ViewPresentationState,
};
use crate::utils::{AliveTracker, Buffer, IsAlive, Logical, Rectangle, Region, Transform};

crate::utils::ids::id_gen!(view_ids);

/// A unique id for a [`View`]
///
/// The id will be re-used once all clones of it are dropped.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ViewId(Arc<InnerViewId>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct InnerViewId(usize);

impl Drop for InnerViewId {
    fn drop(&mut self) {
        view_ids::remove(self.0);
    }
}

impl ViewId {
    fn new() -> Self {
        ViewId(Arc::new(InnerViewId(view_ids::next())))
    }
}

/// Content currently attached to a view
#[derive(Debug, Clone)]
pub enum ViewBuffer {
    /// CPU memory, only usable on a cursor plane through a copy
    Shm(ShmBuffer),
    /// Importable GPU buffer
    Dmabuf(Dmabuf),
    /// A single colour without any backing buffer
    SolidColor([f32; 4]),
}

impl ViewBuffer {
    fn is_opaque_format(&self) -> bool {
        match self {
            ViewBuffer::Shm(shm) => !has_alpha(shm.fourcc()),
            ViewBuffer::Dmabuf(dmabuf) => !has_alpha(dmabuf.format().code),
            ViewBuffer::SolidColor(color) => color[3] >= 1.0,
        }
    }
}

/// Content protection level, ordered from weakest to strongest
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protection {
    /// No protection
    #[default]
    None,
    /// HDCP type 0
    Type0,
    /// HDCP type 1
    Type1,
}

/// How strictly the protection of a view has to be honoured
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionMode {
    /// The view may be shown on outputs with weaker protection
    #[default]
    Relaxed,
    /// The view must not be shown on outputs with weaker protection
    Enforced,
}

/// An acquire fence signalled once the GPU finished writing a buffer
#[derive(Debug, Clone)]
pub struct SyncFence(Arc<OwnedFd>);

impl SyncFence {
    /// Wrap a sync file descriptor
    pub fn new(fd: OwnedFd) -> Self {
        SyncFence(Arc::new(fd))
    }

    /// The underlying file descriptor
    pub fn fd(&self) -> &OwnedFd {
        &self.0
    }
}

/// Result of the colour pipeline for one view on one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTransform {
    /// No transform could be computed, the view cannot be shown
    Invalid,
    /// Pixels can be scanned out unmodified
    Identity,
    /// Pixels need to be converted by the renderer
    NonIdentity,
}

/// Read-only access to the colour management subsystem
pub trait ColorManager {
    /// The colour transform required to show `view` on `output`
    fn color_transform(&self, view: &View, output: OutputId) -> ColorTransform;
}

/// [`ColorManager`] for compositors without colour management
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityColorManager;

impl ColorManager for IdentityColorManager {
    fn color_transform(&self, _view: &View, _output: OutputId) -> ColorTransform {
        ColorTransform::Identity
    }
}

/// Positioned surface content of a single repaint
#[derive(Debug)]
pub struct View {
    id: ViewId,
    alive: Arc<AliveTracker>,
    buffer: Option<ViewBuffer>,
    geometry: Rectangle<i32, Logical>,
    src: Option<Rectangle<f64, Buffer>>,
    transform: Transform,
    alpha: f32,
    opaque_region: Region<Logical>,
    damage: Region<Logical>,
    output_mask: u32,
    fence: Option<SyncFence>,
    protection: Protection,
    protection_mode: ProtectionMode,
    feedback: Option<Rc<RefCell<DmabufFeedback>>>,

    plane: Cell<LogicalPlane>,
    presentation: Cell<ViewPresentationState>,
    failure_reasons: Cell<FailureReasons>,
    keep_buffer: Cell<bool>,
}

impl View {
    /// Create a view showing `buffer` at `geometry`
    ///
    /// The whole buffer is shown, the view is not on any output yet.
    pub fn new(geometry: Rectangle<i32, Logical>, buffer: Option<ViewBuffer>) -> View {
        View {
            id: ViewId::new(),
            alive: Arc::new(AliveTracker::default()),
            buffer,
            geometry,
            src: None,
            transform: Transform::Normal,
            alpha: 1.0,
            opaque_region: Region::new(),
            damage: Region::from_rect(Rectangle::from_size(geometry.size)),
            output_mask: 0,
            fence: None,
            protection: Protection::None,
            protection_mode: ProtectionMode::Relaxed,
            feedback: None,
            plane: Cell::new(LogicalPlane::Renderer),
            presentation: Cell::new(ViewPresentationState::Skipped),
            failure_reasons: Cell::new(FailureReasons::empty()),
            keep_buffer: Cell::new(false),
        }
    }

    /// Crop the buffer to `src` (viewport source rectangle)
    pub fn with_src(mut self, src: Rectangle<f64, Buffer>) -> Self {
        self.src = Some(src);
        self
    }

    /// Set the buffer transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the view-wide alpha multiplier
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the region known to be opaque, relative to the view location
    pub fn with_opaque_region(mut self, opaque: Region<Logical>) -> Self {
        self.opaque_region = opaque;
        self
    }

    /// Put the view on the given outputs
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = OutputId>) -> Self {
        self.output_mask = outputs.into_iter().fold(0, |mask, output| mask | output.mask());
        self
    }

    /// Require a fence to be waited upon before the buffer may be read
    pub fn with_fence(mut self, fence: SyncFence) -> Self {
        self.fence = Some(fence);
        self
    }

    /// Request content protection
    pub fn with_protection(mut self, protection: Protection, mode: ProtectionMode) -> Self {
        self.protection = protection;
        self.protection_mode = mode;
        self
    }

    /// Attach the dmabuf feedback state of the underlying surface
    pub fn with_feedback(mut self, feedback: Rc<RefCell<DmabufFeedback>>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Attach a new buffer with the damage of that commit, relative to the view location
    pub fn attach(&mut self, buffer: Option<ViewBuffer>, damage: Region<Logical>) {
        self.buffer = buffer;
        self.damage = damage;
    }

    /// Move the view
    pub fn set_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        self.geometry = geometry;
    }

    /// Forget the accumulated damage, called once a repaint consumed it
    pub fn clear_damage(&mut self) {
        self.damage = Region::new();
    }

    /// Id of this view
    pub fn id(&self) -> &ViewId {
        &self.id
    }

    pub(crate) fn alive_tracker(&self) -> &Arc<AliveTracker> {
        &self.alive
    }

    /// Currently attached buffer
    pub fn buffer(&self) -> Option<&ViewBuffer> {
        self.buffer.as_ref()
    }

    /// Whether a buffer the planes could show is attached
    pub fn has_valid_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Location and size in the global compositor space
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.geometry
    }

    /// Source rectangle in buffer coordinates
    ///
    /// Defaults to the whole buffer, or the geometry for buffer-less content.
    pub fn src(&self) -> Rectangle<f64, Buffer> {
        if let Some(src) = self.src {
            return src;
        }
        match &self.buffer {
            Some(ViewBuffer::Shm(shm)) => shm.extent().to_f64(),
            Some(ViewBuffer::Dmabuf(dmabuf)) => dmabuf.extent().to_f64(),
            _ => {
                let size = self.transform.transform_size(self.geometry.size.to_f64());
                Rectangle::from_size((size.w, size.h).into())
            }
        }
    }

    /// Buffer transform
    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Acquire fence of the attached buffer
    pub fn fence(&self) -> Option<&SyncFence> {
        self.fence.as_ref()
    }

    /// Damage since the last repaint, relative to the view location
    pub fn damage(&self) -> &Region<Logical> {
        &self.damage
    }

    /// Whether the view is shown on `output`
    pub fn is_on_output(&self, output: OutputId) -> bool {
        self.output_mask & output.mask() != 0
    }

    /// Whether the view is shown on other outputs than `output`
    pub fn spans_multiple_outputs(&self, output: OutputId) -> bool {
        self.output_mask != output.mask()
    }

    /// Requested protection and its strictness
    pub fn protection(&self) -> (Protection, ProtectionMode) {
        (self.protection, self.protection_mode)
    }

    /// Dmabuf feedback state of the underlying surface
    pub fn feedback(&self) -> Option<&Rc<RefCell<DmabufFeedback>>> {
        self.feedback.as_ref()
    }

    /// The opaque part of `clipped`, a rectangle of this view in global coordinates
    pub fn opaque_region_within(&self, clipped: Rectangle<i32, Logical>) -> Region<Logical> {
        if self.alpha < 1.0 {
            return Region::new();
        }
        match &self.buffer {
            Some(buffer) if buffer.is_opaque_format() => Region::from_rect(clipped),
            _ => self
                .opaque_region
                .translate(self.geometry.loc)
                .intersect_rect(clipped),
        }
    }

    /// The logical plane chosen by the last assignment
    pub fn plane(&self) -> LogicalPlane {
        self.plane.get()
    }

    /// How the view was presented by the last assignment
    pub fn presentation_state(&self) -> ViewPresentationState {
        self.presentation.get()
    }

    /// Why the view could not be put on a plane during the last assignment
    pub fn failure_reasons(&self) -> FailureReasons {
        self.failure_reasons.get()
    }

    /// Whether the surface layer should keep the CPU copy of the buffer alive
    pub fn keep_buffer(&self) -> bool {
        self.keep_buffer.get()
    }

    pub(crate) fn set_assignment(
        &self,
        plane: LogicalPlane,
        presentation: ViewPresentationState,
        reasons: FailureReasons,
        keep_buffer: bool,
    ) {
        self.plane.set(plane);
        self.presentation.set(presentation);
        self.failure_reasons.set(reasons);
        self.keep_buffer.set(keep_buffer);
    }
}

impl IsAlive for View {
    #[inline]
    fn alive(&self) -> bool {
        self.alive.alive()
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.alive.destroy_notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::allocator::Fourcc;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    fn shm(w: i32, h: i32, format: Fourcc) -> ViewBuffer {
        let stride = w as u32 * 4;
        let data = vec![0u8; (stride * h as u32) as usize];
        ViewBuffer::Shm(ShmBuffer::new(data, (w, h), stride, format).unwrap())
    }

    #[test]
    fn formats_without_alpha_are_fully_opaque() {
        let view = View::new(rect(10, 10, 32, 32), Some(shm(32, 32, Fourcc::Xrgb8888)));
        let clipped = rect(10, 10, 20, 32);
        assert_eq!(view.opaque_region_within(clipped), Region::from_rect(clipped));
    }

    #[test]
    fn alpha_formats_use_declared_opaque_region() {
        let view = View::new(rect(100, 100, 50, 50), Some(shm(50, 50, Fourcc::Argb8888)))
            .with_opaque_region(Region::from_rect(rect(0, 0, 10, 10)));
        assert_eq!(
            view.opaque_region_within(rect(100, 100, 50, 50)),
            Region::from_rect(rect(100, 100, 10, 10))
        );

        let faded = View::new(rect(0, 0, 50, 50), Some(shm(50, 50, Fourcc::Xrgb8888))).with_alpha(0.5);
        assert!(faded.opaque_region_within(rect(0, 0, 50, 50)).is_empty());
    }

    #[test]
    fn dropping_view_notifies_tracker() {
        let view = View::new(rect(0, 0, 1, 1), None);
        let tracker = view.alive_tracker().clone();
        assert!(tracker.alive());
        drop(view);
        assert!(!tracker.alive());
    }

    #[test]
    fn output_mask() {
        let view = View::new(rect(0, 0, 1, 1), None).with_outputs([OutputId::new(0), OutputId::new(2)]);
        assert!(view.is_on_output(OutputId::new(2)));
        assert!(!view.is_on_output(OutputId::new(1)));
        assert!(view.spans_multiple_outputs(OutputId::new(0)));
    }

    #[test]
    fn default_src_covers_buffer() {
        let view = View::new(rect(0, 0, 64, 64), Some(shm(32, 16, Fourcc::Argb8888)));
        assert_eq!(view.src(), Rectangle::from_size((32.0, 16.0).into()));
    }
}
