use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use super::{
    device::DrmDevice,
    error::Error,
    kms::KmsDevice,
    plane::Plane,
    propose::{ProposeError, ProposeMode, Proposer},
    state::{PendingState, PlaneState},
    FailureReasons, LogicalPlane, OutputId, PlaneKind, ScanoutFlags, ViewPresentationState,
};
use crate::backend::allocator::Buffer as _;
use crate::utils::{Monotonic, Time};
use crate::view::{ColorManager, View, ViewBuffer, ViewId};

/// Where a view ended up after plane assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewPlacement {
    /// Logical plane of the view
    pub plane: LogicalPlane,
    /// How the view is presented
    pub presentation: ViewPresentationState,
    /// Why the view did not make it onto a plane, accumulated over all strategies tried
    pub reasons: FailureReasons,
}

/// Outcome of [`DrmDevice::assign_planes`]
#[derive(Debug, Clone)]
pub struct AssignResult {
    /// The strategy that produced the state
    pub mode: ProposeMode,
    /// Whether the renderer has to draw the views placed on [`LogicalPlane::Renderer`]
    pub needs_renderer: bool,
    /// Placement of every view passed in, in the same order
    pub placements: IndexMap<ViewId, ViewPlacement>,
}

impl AssignResult {
    /// Views that have to be composited by the renderer
    pub fn renderer_views(&self) -> impl Iterator<Item = &ViewId> {
        self.placements
            .iter()
            .filter(|(_, p)| {
                p.plane == LogicalPlane::Renderer && p.presentation != ViewPresentationState::Skipped
            })
            .map(|(id, _)| id)
    }
}

static STRATEGIES: [ProposeMode; 3] = [
    ProposeMode::PlanesOnly,
    ProposeMode::Mixed,
    ProposeMode::RendererOnly,
];

impl<K: KmsDevice + 'static> DrmDevice<K> {
    /// Assign the `views` of `output`, topmost first, to planes
    ///
    /// The state for the output is added to `pending`, replacing any earlier
    /// state for it. Views are updated with their placement and their dmabuf
    /// feedback is refreshed. Unless direct scanout is disabled, all
    /// strategies are tried in order, the first one the kernel accepts wins.
    pub fn assign_planes(
        &mut self,
        pending: &mut PendingState,
        output: OutputId,
        views: &[&View],
        colors: &dyn ColorManager,
    ) -> Result<AssignResult, Error> {
        let now = self.clock.now();
        self.assign_planes_at(pending, output, views, colors, now)
    }

    /// [`DrmDevice::assign_planes`] with an explicit timestamp for feedback debouncing
    #[instrument(level = "debug", skip_all, fields(output = %output_id))]
    #[profiling::function]
    pub fn assign_planes_at(
        &mut self,
        pending: &mut PendingState,
        output_id: OutputId,
        views: &[&View],
        colors: &dyn ColorManager,
        now: Time<Monotonic>,
    ) -> Result<AssignResult, Error> {
        let output = self
            .outputs
            .get_mut(&output_id)
            .ok_or(Error::UnknownOutput(output_id))?;

        self.fb_cache.cleanup();
        output.cursor_tracker.begin_repaint();
        pending.remove(output_id);

        let strategies: &[ProposeMode] = if self.flags.contains(ScanoutFlags::DISABLE_DIRECT_SCANOUT) {
            &STRATEGIES[2..]
        } else {
            &STRATEGIES
        };

        let mut reasons = IndexMap::new();
        let mut outcome = Err(ProposeError::NoScanoutView);
        for &mode in strategies {
            let mut proposer = Proposer {
                kms: &*self.kms,
                planes: &self.planes,
                fb_cache: &mut self.fb_cache,
                output: &mut *output,
                flags: self.flags,
                colors,
            };
            outcome = proposer
                .propose(pending, views, mode, &mut reasons)
                .map(|visible| (mode, visible));
            match outcome.as_ref() {
                Ok(_) => break,
                Err(err) => debug!(%mode, %err, "Strategy failed"),
            }
        }
        let (mode, visible) = outcome?;

        let state = pending.output_state(output_id);
        let cursor_size = output.cursor_size();
        let mut placements = IndexMap::with_capacity(views.len());
        let mut scanout_formats = None;
        for view in views {
            let id = view.id();
            let view_reasons = reasons.get(id).copied().unwrap_or_default();

            let (plane, presentation) = if !visible.contains(id) {
                (LogicalPlane::Renderer, ViewPresentationState::Skipped)
            } else {
                match state.and_then(|s| s.plane_for_view(id)) {
                    Some(ps) => {
                        let kind = self.planes.get(ps.plane).map_or(PlaneKind::Overlay, Plane::kind);
                        let presentation = if kind == PlaneKind::Cursor {
                            ViewPresentationState::Composited
                        } else {
                            ViewPresentationState::ZeroCopy
                        };
                        (
                            LogicalPlane::Hardware {
                                handle: ps.plane,
                                kind,
                            },
                            presentation,
                        )
                    }
                    None => (LogicalPlane::Renderer, ViewPresentationState::Composited),
                }
            };

            let keep_buffer = match view.buffer() {
                Some(ViewBuffer::Dmabuf(_)) => true,
                Some(ViewBuffer::Shm(shm)) => cursor_size.is_some_and(|cursor| {
                    let size = shm.size();
                    size.w <= cursor.w && size.h <= cursor.h
                }),
                _ => false,
            };
            view.set_assignment(plane, presentation, view_reasons, keep_buffer);

            if presentation != ViewPresentationState::Skipped {
                if let Some(feedback) = view.feedback() {
                    let formats = scanout_formats.get_or_insert_with(|| {
                        self.planes
                            .get(output.primary_plane())
                            .map(|p| p.info().formats.clone())
                            .unwrap_or_default()
                    });
                    feedback
                        .borrow_mut()
                        .maybe_update(self.kms.device_id(), formats, view_reasons, now);
                }
            }

            trace!(?id, ?plane, ?presentation, reasons = ?view_reasons, "View placement");
            placements.insert(
                id.clone(),
                ViewPlacement {
                    plane,
                    presentation,
                    reasons: view_reasons,
                },
            );
        }

        let cursor_shown = output
            .cursor_plane()
            .and_then(|cursor| state.and_then(|s| s.plane_state(cursor)))
            .is_some_and(PlaneState::is_enabled);
        if !cursor_shown {
            output.cursor_tracker.clear();
        }

        debug!(
            %mode,
            planes = state.map_or(0, |s| s.enabled().count()),
            "Assigned planes"
        );
        Ok(AssignResult {
            mode,
            needs_renderer: mode.needs_renderer(),
            placements,
        })
    }
}
