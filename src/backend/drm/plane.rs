use std::cmp::Reverse;

use super::{output::DrmOutput, OutputState, PendingState, PlaneHandle, PlaneKind, PlaneState};
use crate::backend::allocator::{
    format::{format_supported, FormatSet},
    Format,
};

bitflags::bitflags! {
    /// Optional features of a plane
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlaneCapabilities: u32 {
        /// The plane can wait on an acquire fence (`IN_FENCE_FD`)
        const FENCE = 1 << 0;
        /// The plane supports rotation and reflection
        const ROTATION = 1 << 1;
        /// The plane can scale its source to a differently sized destination
        const SCALING = 1 << 2;
    }
}

/// Static description of a plane as exposed by the kernel
#[derive(Debug, Clone)]
pub struct PlaneInfo {
    /// Handle of the plane
    pub handle: PlaneHandle,
    /// Kind of the plane
    pub kind: PlaneKind,
    /// Lowest z-position the plane may be put at
    pub zpos_min: u64,
    /// Highest z-position the plane may be put at
    pub zpos_max: u64,
    /// Formats the plane can scan out
    pub formats: FormatSet,
    /// Bitmask of crtc pipes the plane can be used with
    pub possible_crtcs: u32,
    /// Optional features
    pub caps: PlaneCapabilities,
}

impl PlaneInfo {
    /// Describe a plane with an immutable z-position, usable on every crtc
    pub fn new(
        handle: PlaneHandle,
        kind: PlaneKind,
        zpos: u64,
        formats: impl IntoIterator<Item = Format>,
    ) -> Self {
        PlaneInfo {
            handle,
            kind,
            zpos_min: zpos,
            zpos_max: zpos,
            formats: formats.into_iter().collect(),
            possible_crtcs: u32::MAX,
            caps: PlaneCapabilities::empty(),
        }
    }
}

/// A hardware plane and its committed state
#[derive(Debug)]
pub struct Plane {
    info: PlaneInfo,
    index: usize,
    broken: bool,
    current: PlaneState,
}

impl Plane {
    /// Static description
    pub fn info(&self) -> &PlaneInfo {
        &self.info
    }

    /// Handle of the plane
    pub fn handle(&self) -> PlaneHandle {
        self.info.handle
    }

    /// Kind of the plane
    pub fn kind(&self) -> PlaneKind {
        self.info.kind
    }

    /// Bit of this plane in framebuffer plane masks
    pub fn mask(&self) -> u32 {
        1u32 << self.index
    }

    /// Whether the plane was disabled after misbehaving
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Whether the plane can be used on the crtc with index `pipe`
    pub fn supports_crtc(&self, pipe: u32) -> bool {
        pipe < 32 && self.info.possible_crtcs & (1 << pipe) != 0
    }

    /// Whether the plane can scan out `format`
    pub fn supports_format(&self, format: Format) -> bool {
        format_supported(&self.info.formats, format)
    }

    /// Last committed state
    pub fn current_state(&self) -> &PlaneState {
        &self.current
    }

    pub(super) fn set_current_state(&mut self, state: PlaneState) {
        self.current = state;
    }

    pub(super) fn current_state_mut(&mut self) -> &mut PlaneState {
        &mut self.current
    }
}

/// All planes of a device, in the order they are tried
#[derive(Debug)]
pub struct PlaneRegistry {
    planes: Vec<Plane>,
}

impl PlaneRegistry {
    /// Create a registry from the planes the kernel exposes
    ///
    /// Planes are ordered by descending `zpos_max`, cursor planes before overlays
    /// before primary planes on ties. Only the first 32 planes are used.
    pub fn new(infos: impl IntoIterator<Item = PlaneInfo>) -> Self {
        let mut infos = infos.into_iter().collect::<Vec<_>>();
        infos.sort_by_key(|info| (Reverse(info.zpos_max), kind_priority(info.kind)));
        if infos.len() > 32 {
            tracing::warn!("Ignoring {} planes beyond the first 32", infos.len() - 32);
            infos.truncate(32);
        }

        let planes = infos
            .into_iter()
            .enumerate()
            .map(|(index, info)| Plane {
                current: PlaneState::disabled(info.handle),
                info,
                index,
                broken: false,
            })
            .collect();
        PlaneRegistry { planes }
    }

    /// Iterate all planes in priority order
    pub fn iter(&self) -> impl Iterator<Item = &Plane> {
        self.planes.iter()
    }

    /// Look up a plane
    pub fn get(&self, handle: PlaneHandle) -> Option<&Plane> {
        self.planes.iter().find(|p| p.handle() == handle)
    }

    pub(super) fn get_mut(&mut self, handle: PlaneHandle) -> Option<&mut Plane> {
        self.planes.iter_mut().find(|p| p.handle() == handle)
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Plane> {
        self.planes.iter_mut()
    }

    /// Mark a plane as unusable, e.g. after the kernel rejected anything put on it
    pub fn set_broken(&mut self, handle: PlaneHandle, broken: bool) {
        if let Some(plane) = self.get_mut(handle) {
            plane.broken = broken;
        }
    }

    /// Planes whose bit is set in `mask`, in priority order
    pub fn candidates_for(&self, mask: u32) -> impl Iterator<Item = &Plane> {
        self.planes.iter().filter(move |p| mask & p.mask() != 0)
    }

    /// Mask of the non-cursor planes able to scan out `format`
    pub fn format_mask(&self, format: Format) -> u32 {
        self.planes
            .iter()
            .filter(|p| p.kind() != PlaneKind::Cursor && p.supports_format(format))
            .fold(0, |mask, p| mask | p.mask())
    }

    /// First plane of `kind` usable with the crtc `pipe` that is not in `taken`
    pub fn find_for_crtc(&self, kind: PlaneKind, pipe: u32, taken: &[PlaneHandle]) -> Option<&Plane> {
        self.planes
            .iter()
            .find(|p| p.kind() == kind && p.supports_crtc(pipe) && !taken.contains(&p.handle()))
    }

    /// Whether `plane` can be used for `output` within `pending`
    pub fn is_available(&self, plane: &Plane, output: &DrmOutput, pending: &PendingState) -> bool {
        if plane.broken {
            return false;
        }

        let current = plane.current_state();
        if !current.complete {
            return false;
        }
        if current.output.is_some_and(|owner| owner != output.id()) {
            return false;
        }
        if !plane.supports_crtc(output.pipe()) {
            return false;
        }

        !pending.is_claimed_by_other(plane.handle(), output.id())
    }

    /// Whether an enabled plane state in `state` already targets `plane`
    ///
    /// The renderer output counts as well, even though it shows no single view.
    pub fn has_view_assigned(plane: &Plane, state: &OutputState) -> bool {
        state.plane_state(plane.handle()).is_some_and(PlaneState::is_enabled)
    }
}

fn kind_priority(kind: PlaneKind) -> u8 {
    match kind {
        PlaneKind::Cursor => 0,
        PlaneKind::Overlay => 1,
        PlaneKind::Primary => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::allocator::{Fourcc, Modifier};

    fn linear(code: Fourcc) -> Format {
        Format {
            code,
            modifier: Modifier::Linear,
        }
    }

    fn registry() -> PlaneRegistry {
        PlaneRegistry::new([
            PlaneInfo::new(PlaneHandle(31), PlaneKind::Primary, 0, [linear(Fourcc::Xrgb8888)]),
            PlaneInfo::new(PlaneHandle(40), PlaneKind::Cursor, 3, [linear(Fourcc::Argb8888)]),
            PlaneInfo::new(PlaneHandle(35), PlaneKind::Overlay, 1, [linear(Fourcc::Argb8888)]),
            PlaneInfo::new(
                PlaneHandle(36),
                PlaneKind::Overlay,
                2,
                [linear(Fourcc::Argb8888), linear(Fourcc::Xrgb8888)],
            ),
        ])
    }

    #[test]
    fn planes_are_ordered_top_down() {
        let registry = registry();
        let order = registry.iter().map(|p| p.handle().0).collect::<Vec<_>>();
        assert_eq!(order, vec![40, 36, 35, 31]);
    }

    #[test]
    fn format_mask_skips_cursor_planes() {
        let registry = registry();
        let mask = registry.format_mask(linear(Fourcc::Argb8888));
        let planes = registry.candidates_for(mask).map(|p| p.handle().0).collect::<Vec<_>>();
        assert_eq!(planes, vec![36, 35]);

        let mask = registry.format_mask(linear(Fourcc::Xrgb8888));
        let planes = registry.candidates_for(mask).map(|p| p.handle().0).collect::<Vec<_>>();
        assert_eq!(planes, vec![36, 31]);

        assert_eq!(registry.format_mask(linear(Fourcc::Rgb565)), 0);
    }

    #[test]
    fn crtc_restrictions() {
        let mut info = PlaneInfo::new(PlaneHandle(50), PlaneKind::Primary, 0, [linear(Fourcc::Xrgb8888)]);
        info.possible_crtcs = 0b10;
        let registry = PlaneRegistry::new([info]);
        assert!(registry.find_for_crtc(PlaneKind::Primary, 0, &[]).is_none());
        assert!(registry.find_for_crtc(PlaneKind::Primary, 1, &[]).is_some());
        assert!(registry
            .find_for_crtc(PlaneKind::Primary, 1, &[PlaneHandle(50)])
            .is_none());
    }
}
