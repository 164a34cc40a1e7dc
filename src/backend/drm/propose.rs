use std::fmt;
use std::io;

use indexmap::{IndexMap, IndexSet};
use tracing::{instrument, trace, warn};

use super::{
    fb::{Framebuffer, FramebufferCache},
    kms::KmsDevice,
    output::DrmOutput,
    plane::{Plane, PlaneCapabilities, PlaneInfo, PlaneRegistry},
    state::{PendingState, PlaneState},
    FailureReasons, OutputState, PlaneKind, ScanoutFlags,
};
use crate::backend::allocator::{shm::ShmBuffer, Buffer as _, Fourcc};
use crate::utils::{Buffer, Logical, Physical, Rectangle, Region, Size, Transform};
use crate::view::{ColorManager, ColorTransform, ProtectionMode, View, ViewBuffer, ViewId};

/// Strategy used to build a state for an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposeMode {
    /// Every visible view is put on a plane, the renderer is not used
    PlanesOnly,
    /// The renderer output stays on the primary plane, views may go on overlays above it
    Mixed,
    /// Everything is composited, only the renderer output is scanned out
    RendererOnly,
}

impl ProposeMode {
    /// Whether the renderer has to draw for a state of this mode
    pub fn needs_renderer(&self) -> bool {
        !matches!(self, ProposeMode::PlanesOnly)
    }
}

impl fmt::Display for ProposeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProposeMode::PlanesOnly => "planes-only",
            ProposeMode::Mixed => "mixed",
            ProposeMode::RendererOnly => "renderer-only",
        })
    }
}

/// Reasons a strategy gave up on an output
#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    /// No renderer framebuffer of the mode size is committed to the primary plane
    #[error("No renderer framebuffer of the current mode size is committed")]
    NoRendererFramebuffer,
    /// Without renderer, no view ended up on the primary plane
    #[error("No view was placed on the primary plane")]
    NoScanoutView,
    /// A view could not be placed while the renderer is unavailable
    #[error("A view could not be placed on a plane: {reasons:?}")]
    ViewNotPlaced {
        /// Why the view could not be placed
        reasons: FailureReasons,
    },
    /// The kernel rejected the complete state
    #[error("The kernel rejected the proposed state")]
    TestFailed(#[source] io::Error),
}

/// Placement of a view on a plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneCoords {
    /// Source rectangle inside the buffer
    pub src: Rectangle<f64, Buffer>,
    /// Destination rectangle on the crtc
    pub dst: Rectangle<i32, Physical>,
    /// Transform the plane needs to apply
    pub transform: Transform,
}

/// Compute where `view` has to go on a plane described by `info` to appear correctly on `output`
///
/// The view is clipped to the output. Fails if the plane lacks the rotation or
/// scaling capabilities needed.
pub fn plane_coords_for_view(
    view: &View,
    output: &DrmOutput,
    info: &PlaneInfo,
) -> Result<PlaneCoords, FailureReasons> {
    let desc = output.descriptor();
    let output_geo = output.geometry();
    let geometry = view.geometry();
    let clipped = geometry
        .intersection(output_geo)
        .ok_or(FailureReasons::PLANES_REJECTED)?;

    let local =
        Rectangle::<i32, Logical>::new(clipped.loc - output_geo.loc, clipped.size).to_physical(desc.scale);
    let transformed_mode = desc.transform.transform_size(desc.mode);
    let dst = desc.transform.invert().transform_rect_in(local, &transformed_mode);

    // the visible part of the view, mapped into the buffer orientation
    let buffer_transform = view.transform().invert();
    let view_size = geometry.size.to_f64();
    let in_view =
        Rectangle::<f64, Logical>::new((clipped.loc - geometry.loc).to_f64(), clipped.size.to_f64());
    let oriented = buffer_transform.transform_rect_in(in_view, &view_size);
    let oriented_size = buffer_transform.transform_size(view_size);
    if oriented_size.is_empty() {
        return Err(FailureReasons::PLANES_REJECTED);
    }

    let view_src = view.src();
    let sx = view_src.size.w / oriented_size.w;
    let sy = view_src.size.h / oriented_size.h;
    let src = Rectangle::<f64, Buffer>::new(
        (
            (view_src.loc.x + oriented.loc.x * sx).max(0.0),
            (view_src.loc.y + oriented.loc.y * sy).max(0.0),
        )
            .into(),
        (oriented.size.w * sx, oriented.size.h * sy).into(),
    );

    let transform = desc.transform + view.transform().invert();
    if transform != Transform::Normal && !info.caps.contains(PlaneCapabilities::ROTATION) {
        return Err(FailureReasons::INCOMPATIBLE_TRANSFORM);
    }

    let shown = transform.transform_size(src.size);
    if is_scaled(shown, dst.size) && !info.caps.contains(PlaneCapabilities::SCALING) {
        return Err(FailureReasons::INCOMPATIBLE_TRANSFORM);
    }

    Ok(PlaneCoords { src, dst, transform })
}

fn is_scaled<A, B>(src: Size<f64, A>, dst: Size<i32, B>) -> bool {
    (src.w - dst.w as f64).abs() > 0.5 || (src.h - dst.h as f64).abs() > 0.5
}

fn next_zpos(info: &PlaneInfo, lowest_zpos: u64) -> u64 {
    if info.zpos_min == info.zpos_max || lowest_zpos == u64::MAX {
        info.zpos_max
    } else {
        info.zpos_max.min(lowest_zpos - 1)
    }
}

/// Everything a strategy needs to build the state of one output
pub(super) struct Proposer<'a> {
    pub kms: &'a dyn KmsDevice,
    pub planes: &'a PlaneRegistry,
    pub fb_cache: &'a mut FramebufferCache,
    pub output: &'a mut DrmOutput,
    pub flags: ScanoutFlags,
    pub colors: &'a dyn ColorManager,
}

/// Stacking constraints while walking the view list
struct Stacking {
    lowest_zpos: u64,
    scanout_zpos: Option<u64>,
}

impl<'a> Proposer<'a> {
    /// Build the state of the output for `views`, topmost first
    ///
    /// On success the state is part of `pending` and the visible views are
    /// returned. On failure `pending` holds no state for the output. Failure
    /// reasons of views that had to be composited are merged into `reasons`.
    #[instrument(level = "trace", skip_all, fields(output = %self.output.id(), %mode))]
    #[profiling::function]
    pub fn propose(
        &mut self,
        pending: &mut PendingState,
        views: &[&View],
        mode: ProposeMode,
        reasons: &mut IndexMap<ViewId, FailureReasons>,
    ) -> Result<IndexSet<ViewId>, ProposeError> {
        let result = self.propose_views(pending, views, mode, reasons);
        if let Err(err) = result.as_ref() {
            trace!(%err, "Discarding proposal");
            pending.remove(self.output.id());
        }
        result
    }

    fn propose_views(
        &mut self,
        pending: &mut PendingState,
        views: &[&View],
        mode: ProposeMode,
        reasons: &mut IndexMap<ViewId, FailureReasons>,
    ) -> Result<IndexSet<ViewId>, ProposeError> {
        let output_id = self.output.id();
        let primary = self.output.primary_plane();

        pending.remove(output_id);
        let mut state = OutputState::new_cleared(output_id, self.output.mode(), self.planes);
        let mut stacking = Stacking {
            lowest_zpos: u64::MAX,
            scanout_zpos: None,
        };
        if mode == ProposeMode::Mixed {
            let scanout = self.renderer_scanout_state()?;
            stacking.scanout_zpos = scanout.zpos;
            state.insert(scanout);
        }
        pending.insert(state);

        let output_geo = self.output.geometry();
        let mut occluded = Region::<Logical>::new();
        let mut renderer_region = Region::<Logical>::new();
        let mut visible = IndexSet::new();

        for view in views {
            let id = view.id();
            if !view.is_on_output(output_id) {
                continue;
            }
            let Some(clipped) = view.geometry().intersection(output_geo) else {
                continue;
            };
            let color = self.colors.color_transform(view, output_id);
            if color == ColorTransform::Invalid {
                trace!(?id, "No colour transform, skipping view");
                continue;
            }
            let view_region = Region::from_rect(clipped).subtract(&occluded);
            if view_region.is_empty() {
                trace!(?id, "View is fully occluded");
                continue;
            }
            visible.insert(id.clone());

            if mode == ProposeMode::RendererOnly {
                renderer_region = renderer_region.union(&view_region);
                occluded = occluded.union(&view.opaque_region_within(clipped));
                continue;
            }

            let mut forced = FailureReasons::empty();
            if view.spans_multiple_outputs(output_id) {
                forced |= FailureReasons::FORCE_RENDERER;
            }
            if !self.kms.has_import_path() {
                forced |= FailureReasons::NO_GBM;
            }
            if !view.has_valid_buffer() {
                forced |= FailureReasons::NO_BUFFER;
            }
            if color == ColorTransform::NonIdentity {
                forced |= FailureReasons::NO_COLOR_TRANSFORM;
            }
            if renderer_region.intersect(&view_region).not_empty() {
                forced |= FailureReasons::OCCLUDED_BY_RENDERER;
            }
            let (protection, protection_mode) = view.protection();
            if protection_mode == ProtectionMode::Enforced
                && protection > self.output.descriptor().protection
            {
                forced |= FailureReasons::INADEQUATE_CONTENT_PROTECTION;
            }

            let placed = if forced.is_empty() {
                self.find_plane_for_view(pending, view, mode, &mut stacking)
            } else {
                Err(forced)
            };

            if let Err(failed) = placed {
                trace!(?id, reasons = ?failed, "View goes to the renderer");
                *reasons.entry(id.clone()).or_default() |= failed;
                if mode == ProposeMode::PlanesOnly {
                    return Err(ProposeError::ViewNotPlaced { reasons: failed });
                }
                renderer_region = renderer_region.union(&view_region);
            }

            occluded = occluded.union(&view.opaque_region_within(clipped));
        }

        if mode == ProposeMode::RendererOnly {
            return Ok(visible);
        }

        if mode == ProposeMode::PlanesOnly {
            let scanout_placed = pending
                .output_state(output_id)
                .and_then(|state| state.plane_state(primary))
                .is_some_and(PlaneState::is_enabled);
            if !scanout_placed {
                return Err(ProposeError::NoScanoutView);
            }
        }

        assert!(
            pending.output_state(output_id).map_or(true, OutputState::check_zpos),
            "duplicate zpos in proposed state"
        );

        self.kms.test_state(pending).map_err(ProposeError::TestFailed)?;

        if mode == ProposeMode::Mixed {
            if let Some(state) = pending.output_state_mut(output_id) {
                state.release_speculative(primary, self.planes);
            }
        }

        Ok(visible)
    }

    /// The committed renderer output, standing in for the next one while testing
    fn renderer_scanout_state(&self) -> Result<PlaneState, ProposeError> {
        let output_id = self.output.id();
        let mode_size = self.output.mode();
        let primary = self
            .planes
            .get(self.output.primary_plane())
            .ok_or(ProposeError::NoRendererFramebuffer)?;

        let current = primary.current_state();
        let usable = current.output == Some(output_id)
            && current.fb.as_ref().is_some_and(|fb| {
                fb.ty().is_renderer_output() && fb.size() == Size::from((mode_size.w, mode_size.h))
            });
        if !usable {
            return Err(ProposeError::NoRendererFramebuffer);
        }

        Ok(PlaneState {
            view: None,
            zpos: Some(primary.info().zpos_min),
            complete: false,
            ..current.clone()
        })
    }

    fn find_plane_for_view(
        &mut self,
        pending: &mut PendingState,
        view: &View,
        mode: ProposeMode,
        stacking: &mut Stacking,
    ) -> Result<(), FailureReasons> {
        if let Some(ViewBuffer::Shm(shm)) = view.buffer() {
            return self.try_cursor(pending, view, shm, mode, stacking);
        }

        let fb = self.fb_cache.acquire(view, self.planes)?;
        let planes = self.planes;
        let output_id = self.output.id();
        let primary = self.output.primary_plane();
        let matches_output = self.output.view_matches_entire_output(view);
        let scanout_in_use = match (pending.output_state(output_id), planes.get(primary)) {
            (Some(state), Some(plane)) => PlaneRegistry::has_view_assigned(plane, state),
            _ => false,
        };

        let mut reasons = FailureReasons::NO_PLANES_AVAILABLE;
        for plane in planes.candidates_for(fb.plane_mask()) {
            match plane.kind() {
                PlaneKind::Primary => {
                    if plane.handle() != primary || mode != ProposeMode::PlanesOnly || !matches_output {
                        continue;
                    }
                }
                PlaneKind::Overlay => {
                    if self.flags.contains(ScanoutFlags::DISABLE_OVERLAY_PLANES) {
                        continue;
                    }
                    // fullscreen content belongs on the primary plane
                    if matches_output && !scanout_in_use {
                        continue;
                    }
                }
                PlaneKind::Cursor => continue,
            }

            let zpos = match self.check_plane(pending, plane, stacking) {
                Ok(zpos) => zpos,
                Err(rejected) => {
                    reasons |= rejected;
                    continue;
                }
            };
            match self.try_plane(pending, view, plane, &fb, zpos, mode) {
                Ok(()) => {
                    trace!(plane = plane.handle().0, zpos, "Placed view");
                    stacking.lowest_zpos = zpos;
                    return Ok(());
                }
                Err(failed) => reasons |= failed,
            }
        }

        Err(reasons)
    }

    /// Availability and stacking checks shared by all plane kinds
    ///
    /// Returns the z-position the plane would be put at.
    fn check_plane(
        &self,
        pending: &PendingState,
        plane: &Plane,
        stacking: &Stacking,
    ) -> Result<u64, FailureReasons> {
        let handle = plane.handle().0;
        if !self.planes.is_available(plane, &*self.output, pending) {
            trace!(plane = handle, "Plane not available");
            return Err(FailureReasons::PLANES_REJECTED);
        }
        if pending
            .output_state(self.output.id())
            .is_some_and(|state| PlaneRegistry::has_view_assigned(plane, state))
        {
            trace!(plane = handle, "Plane already in use");
            return Err(FailureReasons::PLANES_REJECTED);
        }
        if plane.info().zpos_min >= stacking.lowest_zpos {
            trace!(plane = handle, "Plane cannot be stacked below the views above");
            return Err(FailureReasons::PLANES_REJECTED);
        }
        let zpos = next_zpos(plane.info(), stacking.lowest_zpos);
        if stacking.scanout_zpos.is_some_and(|scanout| zpos <= scanout) {
            trace!(plane = handle, zpos, "Plane would end up below the renderer output");
            return Err(FailureReasons::PLANES_REJECTED);
        }
        Ok(zpos)
    }

    fn try_plane(
        &mut self,
        pending: &mut PendingState,
        view: &View,
        plane: &Plane,
        fb: &Framebuffer,
        zpos: u64,
        mode: ProposeMode,
    ) -> Result<(), FailureReasons> {
        let coords = plane_coords_for_view(view, &*self.output, plane.info())?;
        if view.fence().is_some() && !plane.info().caps.contains(PlaneCapabilities::FENCE) {
            return Err(FailureReasons::FENCE_UNSUPPORTED);
        }
        if plane.kind() == PlaneKind::Primary && coords.dst != Rectangle::from_size(self.output.mode()) {
            return Err(FailureReasons::PLANES_REJECTED);
        }

        let state = PlaneState {
            plane: plane.handle(),
            output: Some(self.output.id()),
            view: Some(view.id().clone()),
            fb: Some(fb.clone()),
            buffer: view.buffer().cloned(),
            src: coords.src,
            dst: coords.dst,
            transform: coords.transform,
            zpos: Some(zpos),
            fence: view.fence().cloned(),
            complete: false,
        };
        self.test_plane(pending, state, mode)
    }

    fn try_cursor(
        &mut self,
        pending: &mut PendingState,
        view: &View,
        shm: &ShmBuffer,
        mode: ProposeMode,
        stacking: &mut Stacking,
    ) -> Result<(), FailureReasons> {
        let planes = self.planes;
        let plane = self
            .output
            .cursor_plane()
            .filter(|_| !self.flags.contains(ScanoutFlags::DISABLE_CURSOR_PLANE))
            .and_then(|handle| planes.get(handle));
        let (Some(plane), Some(cursor_size)) = (plane, self.output.cursor_size()) else {
            return Err(FailureReasons::FB_FORMAT_INCOMPATIBLE);
        };
        if shm.fourcc() != Fourcc::Argb8888 {
            return Err(FailureReasons::FB_FORMAT_INCOMPATIBLE);
        }
        let size = shm.size();
        if size.w > cursor_size.w || size.h > cursor_size.h {
            return Err(FailureReasons::BUFFER_TOO_BIG);
        }

        let zpos = self.check_plane(pending, plane, stacking)?;

        let coords = plane_coords_for_view(view, &*self.output, plane.info())?;
        if coords.src.loc.x != 0.0 || coords.src.loc.y != 0.0 {
            trace!("Cursor view is clipped at its origin");
            return Err(FailureReasons::PLANES_REJECTED);
        }
        if is_scaled(coords.src.size, coords.dst.size) {
            return Err(FailureReasons::INCOMPATIBLE_TRANSFORM);
        }

        let output_id = self.output.id();
        let tracker = &mut self.output.cursor_tracker;
        let uploaded = tracker.uploaded_this_repaint();
        let needs_upload = !tracker.is(view) || (view.damage().not_empty() && !uploaded);
        let scanned_out = Some(plane.current_state())
            .filter(|current| current.output == Some(output_id))
            .and_then(|current| current.fb.as_ref())
            .map(Framebuffer::handle);
        let Some(ring) = self.output.cursor_ring.as_mut() else {
            return Err(FailureReasons::FB_FORMAT_INCOMPATIBLE);
        };
        if needs_upload {
            // a failed upload leaves the current slot undefined
            self.output.cursor_tracker.clear();
            if let Err(err) = ring.upload(self.kms, shm, uploaded, scanned_out) {
                warn!(?err, "Failed to upload cursor image");
                return Err(FailureReasons::PLANES_REJECTED);
            }
            self.output.cursor_tracker.mark_uploaded();
            self.output.cursor_tracker.set(view);
        }
        let fb = ring.current().clone();

        let state = PlaneState {
            plane: plane.handle(),
            output: Some(output_id),
            view: Some(view.id().clone()),
            fb: Some(fb),
            buffer: None,
            src: Rectangle::from_size((cursor_size.w as f64, cursor_size.h as f64).into()),
            dst: Rectangle::new(coords.dst.loc, cursor_size),
            transform: Transform::Normal,
            zpos: Some(zpos),
            fence: None,
            complete: false,
        };
        self.test_plane(pending, state, mode)?;
        stacking.lowest_zpos = zpos;
        Ok(())
    }

    /// Add `state` to the output and check it with the kernel
    ///
    /// Planes-only proposals are only tested as a whole.
    fn test_plane(
        &mut self,
        pending: &mut PendingState,
        state: PlaneState,
        mode: ProposeMode,
    ) -> Result<(), FailureReasons> {
        let handle = state.plane;
        let output_id = self.output.id();
        let mode_size = self.output.mode();
        let backup = pending.output_state_entry(output_id, mode_size).insert(state);
        if mode == ProposeMode::PlanesOnly {
            return Ok(());
        }

        match self.kms.test_state(pending) {
            Ok(()) => Ok(()),
            Err(err) => {
                trace!(plane = handle.0, ?err, "Kernel rejected plane");
                pending.output_state_entry(output_id, mode_size).restore(handle, backup);
                Err(FailureReasons::PLANES_REJECTED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::allocator::format::FormatSet;
    use crate::backend::drm::{OutputDescriptor, OutputId, PlaneHandle};

    fn output(desc: OutputDescriptor) -> DrmOutput {
        DrmOutput::new(desc, PlaneHandle(1), None, None)
    }

    fn info(caps: PlaneCapabilities) -> PlaneInfo {
        let mut info = PlaneInfo::new(PlaneHandle(1), PlaneKind::Overlay, 1, FormatSet::new());
        info.caps = caps;
        info
    }

    fn view(x: i32, y: i32, w: i32, h: i32) -> View {
        View::new(Rectangle::new((x, y).into(), (w, h).into()), None)
    }

    #[test]
    fn coords_are_clipped_to_output() {
        let output = output(OutputDescriptor::new(OutputId::new(0), 0, (1920, 1080)));
        let view = view(1800, -20, 200, 100);
        let coords = plane_coords_for_view(&view, &output, &info(PlaneCapabilities::empty())).unwrap();
        assert_eq!(coords.dst, Rectangle::new((1800, 0).into(), (120, 80).into()));
        assert_eq!(coords.src, Rectangle::new((0.0, 20.0).into(), (120.0, 80.0).into()));
        assert_eq!(coords.transform, Transform::Normal);
    }

    #[test]
    fn output_offset_and_scale() {
        let desc = OutputDescriptor::new(OutputId::new(1), 1, (2560, 1440))
            .with_location((1920, 0))
            .with_scale(2);
        let output = output(desc);
        let view = view(1920 + 100, 50, 64, 64).with_src(Rectangle::from_size((128.0, 128.0).into()));
        let coords = plane_coords_for_view(&view, &output, &info(PlaneCapabilities::empty())).unwrap();
        assert_eq!(coords.dst, Rectangle::new((200, 100).into(), (128, 128).into()));
        assert_eq!(coords.src.size, (128.0, 128.0).into());
    }

    #[test]
    fn scaling_needs_capability() {
        let output = output(OutputDescriptor::new(OutputId::new(0), 0, (1920, 1080)));
        let view = view(0, 0, 200, 200).with_src(Rectangle::from_size((100.0, 100.0).into()));
        assert_eq!(
            plane_coords_for_view(&view, &output, &info(PlaneCapabilities::empty())),
            Err(FailureReasons::INCOMPATIBLE_TRANSFORM)
        );
        assert!(plane_coords_for_view(&view, &output, &info(PlaneCapabilities::SCALING)).is_ok());
    }

    #[test]
    fn rotated_output_needs_rotation() {
        let desc = OutputDescriptor::new(OutputId::new(0), 0, (1080, 1920)).with_transform(Transform::_90);
        let output = output(desc);
        let view = view(0, 0, 100, 50);
        assert_eq!(
            plane_coords_for_view(&view, &output, &info(PlaneCapabilities::SCALING)),
            Err(FailureReasons::INCOMPATIBLE_TRANSFORM)
        );

        // a buffer already rotated like the output goes on any plane
        let view = view.with_transform(Transform::_90);
        let coords = plane_coords_for_view(&view, &output, &info(PlaneCapabilities::empty())).unwrap();
        assert_eq!(coords.transform, Transform::Normal);
    }

    #[test]
    fn zpos_counts_down() {
        let mut info = info(PlaneCapabilities::empty());
        info.zpos_min = 1;
        info.zpos_max = 8;
        assert_eq!(next_zpos(&info, u64::MAX), 8);
        assert_eq!(next_zpos(&info, 5), 4);
        assert_eq!(next_zpos(&info, 20), 8);
    }
}
