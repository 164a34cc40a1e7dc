//! Per-output plane assignment context

use super::{
    cursor::{CursorRing, CursorTracker},
    OutputId, PlaneHandle,
};
use crate::utils::{Logical, Physical, Point, Rectangle, Size, Transform};
use crate::view::{Protection, View};

/// Static configuration of an output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    /// Id of the output
    pub id: OutputId,
    /// Index of the crtc driving the output
    pub pipe: u32,
    /// Size of the current mode
    pub mode: Size<i32, Physical>,
    /// Position in the global compositor space
    pub location: Point<i32, Logical>,
    /// Integer scale factor
    pub scale: i32,
    /// Transform applied to the output content
    pub transform: Transform,
    /// Content protection currently established on the link
    pub protection: Protection,
}

impl OutputDescriptor {
    /// Describe an unscaled, untransformed output at the origin
    pub fn new(id: OutputId, pipe: u32, mode: impl Into<Size<i32, Physical>>) -> OutputDescriptor {
        OutputDescriptor {
            id,
            pipe,
            mode: mode.into(),
            location: (0, 0).into(),
            scale: 1,
            transform: Transform::Normal,
            protection: Protection::None,
        }
    }

    /// Move the output in the global compositor space
    pub fn with_location(mut self, location: impl Into<Point<i32, Logical>>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the scale factor, values below 1 are treated as 1
    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale.max(1);
        self
    }

    /// Set the output transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the established content protection
    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }
}

/// An output of a [`DrmDevice`](super::DrmDevice)
#[derive(Debug)]
pub struct DrmOutput {
    desc: OutputDescriptor,
    primary: PlaneHandle,
    cursor_plane: Option<PlaneHandle>,
    pub(super) cursor_ring: Option<CursorRing>,
    pub(super) cursor_tracker: CursorTracker,
}

impl DrmOutput {
    pub(super) fn new(
        desc: OutputDescriptor,
        primary: PlaneHandle,
        cursor_plane: Option<PlaneHandle>,
        cursor_ring: Option<CursorRing>,
    ) -> DrmOutput {
        DrmOutput {
            desc,
            primary,
            // a cursor plane is useless without buffers to show
            cursor_plane: cursor_plane.filter(|_| cursor_ring.is_some()),
            cursor_ring,
            cursor_tracker: CursorTracker::default(),
        }
    }

    /// Id of the output
    pub fn id(&self) -> OutputId {
        self.desc.id
    }

    /// Crtc index
    pub fn pipe(&self) -> u32 {
        self.desc.pipe
    }

    /// Size of the current mode
    pub fn mode(&self) -> Size<i32, Physical> {
        self.desc.mode
    }

    /// Static configuration
    pub fn descriptor(&self) -> &OutputDescriptor {
        &self.desc
    }

    /// Update position, scale, transform or protection
    ///
    /// The mode and crtc cannot be changed this way.
    pub fn set_descriptor(&mut self, desc: OutputDescriptor) {
        self.desc = OutputDescriptor {
            id: self.desc.id,
            pipe: self.desc.pipe,
            mode: self.desc.mode,
            scale: desc.scale.max(1),
            ..desc
        };
    }

    /// The primary plane of the crtc
    pub fn primary_plane(&self) -> PlaneHandle {
        self.primary
    }

    /// The cursor plane of the crtc, if cursor buffers could be allocated
    pub fn cursor_plane(&self) -> Option<PlaneHandle> {
        self.cursor_plane
    }

    /// Size of the cursor buffers
    pub fn cursor_size(&self) -> Option<Size<i32, Physical>> {
        self.cursor_ring.as_ref().map(CursorRing::size)
    }

    /// Tracker of the view shown by the cursor plane
    pub fn cursor_tracker(&self) -> &CursorTracker {
        &self.cursor_tracker
    }

    /// Area covered by the output in the global compositor space
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        let size = self.desc.transform.transform_size(self.desc.mode).to_logical(self.desc.scale);
        Rectangle::new(self.desc.location, size)
    }

    /// Whether `view` covers exactly the area of the output
    pub fn view_matches_entire_output(&self, view: &View) -> bool {
        view.geometry() == self.geometry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_accounts_for_scale_and_transform() {
        let desc = OutputDescriptor::new(OutputId::new(1), 0, (2560, 1440))
            .with_location((1920, 0))
            .with_scale(2)
            .with_transform(Transform::_90);
        let output = DrmOutput::new(desc, PlaneHandle(1), None, None);
        assert_eq!(output.geometry(), Rectangle::new((1920, 0).into(), (720, 1280).into()));
    }

    #[test]
    fn cursor_plane_requires_buffers() {
        let desc = OutputDescriptor::new(OutputId::new(0), 0, (1920, 1080));
        let output = DrmOutput::new(desc, PlaneHandle(1), Some(PlaneHandle(2)), None);
        assert_eq!(output.cursor_plane(), None);
        assert_eq!(output.cursor_size(), None);
    }
}
