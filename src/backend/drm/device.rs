use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::{
    cursor::CursorRing,
    error::Error,
    fb::{Framebuffer, FramebufferCache, FramebufferType},
    kms::KmsDevice,
    output::{DrmOutput, OutputDescriptor},
    plane::{PlaneInfo, PlaneRegistry},
    state::{PendingState, PlaneState},
    OutputId, PlaneHandle, PlaneKind, ScanoutFlags,
};
use crate::backend::allocator::dmabuf::Dmabuf;
use crate::utils::{Clock, Monotonic, Physical, Rectangle, Size, Transform};
use crate::view::ViewId;

/// Cursor buffer size used by most drivers
pub const DEFAULT_CURSOR_SIZE: (i32, i32) = (64, 64);

/// A kms device and the outputs it drives
///
/// Owns the plane registry and the framebuffer cache shared by all outputs of
/// the device, so planes can move between outputs from one repaint to the next.
pub struct DrmDevice<K: KmsDevice + 'static> {
    pub(super) kms: Rc<K>,
    pub(super) planes: PlaneRegistry,
    pub(super) fb_cache: FramebufferCache,
    pub(super) outputs: IndexMap<OutputId, DrmOutput>,
    pub(super) cursor_size: Size<i32, Physical>,
    pub(super) flags: ScanoutFlags,
    pub(super) clock: Clock<Monotonic>,
}

impl<K: KmsDevice + 'static> fmt::Debug for DrmDevice<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrmDevice")
            .field("device_id", &self.kms.device_id())
            .field("planes", &self.planes)
            .field("fb_cache", &self.fb_cache)
            .field("outputs", &self.outputs)
            .field("cursor_size", &self.cursor_size)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl<K: KmsDevice + 'static> DrmDevice<K> {
    /// Wrap a kms device exposing `planes`
    ///
    /// `cursor_size` is the size of the buffers allocated for cursor planes,
    /// as reported by the driver.
    pub fn new(
        kms: K,
        planes: impl IntoIterator<Item = PlaneInfo>,
        cursor_size: impl Into<Size<i32, Physical>>,
    ) -> Result<Self, Error> {
        let kms = Rc::new(kms);
        let planes = PlaneRegistry::new(planes);
        let clock = Clock::new().map_err(Error::Clock)?;
        let cursor_size = cursor_size.into();
        info!(
            device_id = kms.device_id(),
            planes = planes.iter().count(),
            ?cursor_size,
            "Initialized plane allocator"
        );

        Ok(DrmDevice {
            fb_cache: FramebufferCache::new(kms.clone()),
            kms,
            planes,
            outputs: IndexMap::new(),
            cursor_size,
            flags: ScanoutFlags::empty(),
            clock,
        })
    }

    /// The underlying kms device
    pub fn kms(&self) -> &K {
        &self.kms
    }

    /// Planes of the device
    pub fn planes(&self) -> &PlaneRegistry {
        &self.planes
    }

    /// Mark a plane as unusable or usable again
    pub fn set_plane_broken(&mut self, plane: PlaneHandle, broken: bool) {
        warn!(plane = plane.0, broken, "Changing plane health");
        self.planes.set_broken(plane, broken);
    }

    /// Imported client buffers
    pub fn framebuffer_cache(&self) -> &FramebufferCache {
        &self.fb_cache
    }

    /// Disable parts of the plane assignment
    pub fn set_scanout_flags(&mut self, flags: ScanoutFlags) {
        debug!(?flags, "Updating scanout flags");
        self.flags = flags;
    }

    /// Currently active scanout flags
    pub fn scanout_flags(&self) -> ScanoutFlags {
        self.flags
    }

    /// Look up an output
    pub fn output(&self, output: OutputId) -> Option<&DrmOutput> {
        self.outputs.get(&output)
    }

    /// Update position, scale, transform or protection of an output
    pub fn update_output(&mut self, desc: OutputDescriptor) -> Result<(), Error> {
        let output = self
            .outputs
            .get_mut(&desc.id)
            .ok_or(Error::UnknownOutput(desc.id))?;
        output.set_descriptor(desc);
        Ok(())
    }

    /// Start driving an output
    ///
    /// Picks the primary and cursor plane of its crtc. Failing to allocate
    /// cursor buffers is not fatal, the output simply gets no cursor plane.
    pub fn add_output(&mut self, desc: OutputDescriptor) -> Result<&DrmOutput, Error> {
        let id = desc.id;
        if self.outputs.contains_key(&id) {
            return Err(Error::OutputExists(id));
        }

        let taken = self
            .outputs
            .values()
            .flat_map(|o| [Some(o.primary_plane()), o.cursor_plane()])
            .flatten()
            .collect::<Vec<_>>();
        let primary = self
            .planes
            .find_for_crtc(PlaneKind::Primary, desc.pipe, &taken)
            .ok_or(Error::NoPrimaryPlane(desc.pipe))?
            .handle();

        let cursor = self.planes.find_for_crtc(PlaneKind::Cursor, desc.pipe, &taken);
        let cursor_ring = cursor.and_then(|plane| {
            let kms: Rc<dyn KmsDevice> = self.kms.clone();
            match CursorRing::new(&kms, self.cursor_size, plane.mask()) {
                Ok(ring) => Some(ring),
                Err(err) => {
                    warn!(output = %id, %err, "Cursor plane disabled");
                    None
                }
            }
        });
        let cursor = cursor.map(|plane| plane.handle());

        info!(
            output = %id,
            pipe = desc.pipe,
            primary = primary.0,
            cursor = ?cursor.map(|c| c.0),
            "Added output"
        );
        let output = DrmOutput::new(desc, primary, cursor, cursor_ring);
        Ok(self.outputs.entry(id).or_insert(output))
    }

    /// Stop driving an output
    ///
    /// The planes it used become available to other outputs.
    pub fn remove_output(&mut self, output: OutputId) -> Option<DrmOutput> {
        let removed = self.outputs.shift_remove(&output)?;
        for plane in self.planes.iter_mut() {
            if plane.current_state().output == Some(output) {
                let handle = plane.handle();
                plane.set_current_state(PlaneState::disabled(handle));
            }
        }
        info!(output = %output, "Removed output");
        Some(removed)
    }

    /// Forget everything tied to a destroyed view
    pub fn view_destroyed(&mut self, view: &ViewId) {
        for output in self.outputs.values_mut() {
            output.cursor_tracker.invalidate(view);
        }
    }

    /// A fresh pending state to fill for the next repaint
    pub fn pending_state(&self) -> PendingState {
        PendingState::new()
    }

    /// Import a buffer the compositor rendered into
    pub fn import_renderer_buffer(&self, buffer: &Dmabuf, ty: FramebufferType) -> Result<Framebuffer, Error> {
        self.fb_cache.import_renderer(buffer, ty, &self.planes)
    }

    /// Put the renderer output on the primary plane of `output`
    ///
    /// The framebuffer has to match the current mode.
    pub fn attach_renderer_framebuffer(
        &self,
        pending: &mut PendingState,
        output: OutputId,
        fb: Framebuffer,
    ) -> Result<(), Error> {
        let drm_output = self.outputs.get(&output).ok_or(Error::UnknownOutput(output))?;
        let mode = drm_output.mode();
        let size = fb.size();
        if size.w != mode.w || size.h != mode.h {
            return Err(Error::FramebufferSizeMismatch {
                fb: (size.w, size.h),
                mode,
            });
        }

        let primary = self
            .planes
            .get(drm_output.primary_plane())
            .ok_or(Error::NoPrimaryPlane(drm_output.pipe()))?;
        let state = PlaneState {
            plane: primary.handle(),
            output: Some(output),
            view: None,
            fb: Some(fb),
            buffer: None,
            src: Rectangle::from_size((mode.w as f64, mode.h as f64).into()),
            dst: Rectangle::from_size(mode),
            transform: Transform::Normal,
            zpos: Some(primary.info().zpos_min),
            fence: None,
            complete: false,
        };
        pending.output_state_entry(output, mode).insert(state);
        Ok(())
    }

    /// Commit `pending` to the kernel
    ///
    /// The committed plane states become the current ones, planes showing
    /// something stay busy until [`DrmDevice::frame_done`].
    #[profiling::function]
    pub fn commit(&mut self, pending: PendingState) -> Result<(), Error> {
        self.kms.commit_state(&pending).map_err(|source| Error::Access {
            errmsg: "Failed to commit plane state",
            source,
        })?;

        for state in pending.iter() {
            for ps in state.plane_states() {
                let Some(plane) = self.planes.get_mut(ps.plane) else {
                    continue;
                };
                if ps.is_enabled() {
                    plane.set_current_state(PlaneState {
                        output: Some(state.output()),
                        complete: false,
                        ..ps.clone()
                    });
                } else {
                    plane.set_current_state(PlaneState::disabled(ps.plane));
                }
            }
        }
        Ok(())
    }

    /// The kernel finished showing the last commit of `output`
    pub fn frame_done(&mut self, output: OutputId) {
        for plane in self.planes.iter_mut() {
            let current = plane.current_state_mut();
            if current.output == Some(output) {
                current.complete = true;
            }
        }
    }
}
