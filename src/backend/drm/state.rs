use indexmap::IndexMap;
use smallvec::SmallVec;

use super::{fb::Framebuffer, plane::PlaneRegistry, OutputId, PlaneHandle};
use crate::utils::{Buffer, Physical, Rectangle, Size, Transform};
use crate::view::{SyncFence, ViewBuffer, ViewId};

/// Configuration of a single plane
///
/// A state without framebuffer disables the plane.
#[derive(Debug, Clone)]
pub struct PlaneState {
    /// The plane this state applies to
    pub plane: PlaneHandle,
    /// Output the plane is (or was) bound to
    pub output: Option<OutputId>,
    /// View shown by the plane, `None` for renderer output and cursor placeholders
    pub view: Option<ViewId>,
    /// Framebuffer to scan out
    pub fb: Option<Framebuffer>,
    /// Client buffer kept alive while it is being scanned out
    pub buffer: Option<ViewBuffer>,
    /// Source rectangle inside the framebuffer
    pub src: Rectangle<f64, Buffer>,
    /// Destination rectangle on the crtc
    pub dst: Rectangle<i32, Physical>,
    /// Rotation and reflection applied by the plane
    pub transform: Transform,
    /// Stacking position, `None` keeps the plane's current value
    pub zpos: Option<u64>,
    /// Acquire fence the plane has to wait on
    pub fence: Option<SyncFence>,
    /// Whether the kernel finished showing this state
    ///
    /// Planes with an incomplete committed state cannot be reused until
    /// the page-flip completed.
    pub complete: bool,
}

impl PlaneState {
    /// A state turning `plane` off
    pub fn disabled(plane: PlaneHandle) -> PlaneState {
        PlaneState {
            plane,
            output: None,
            view: None,
            fb: None,
            buffer: None,
            src: Rectangle::default(),
            dst: Rectangle::default(),
            transform: Transform::Normal,
            zpos: None,
            fence: None,
            complete: true,
        }
    }

    /// Whether the plane shows anything in this state
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.fb.is_some()
    }

    /// Source rectangle in 16.16 fixed point, as expected by the kernel
    pub fn src_fixed(&self) -> Rectangle<u32, Buffer> {
        let fixed = |v: f64| (v.max(0.0) * 65536.0).round() as u32;
        Rectangle::new(
            (fixed(self.src.loc.x), fixed(self.src.loc.y)).into(),
            (fixed(self.src.size.w), fixed(self.src.size.h)).into(),
        )
    }
}

/// Proposed plane states of one output
#[derive(Debug, Clone)]
pub struct OutputState {
    output: OutputId,
    mode: Size<i32, Physical>,
    planes: SmallVec<[PlaneState; 4]>,
}

impl OutputState {
    /// Start an empty proposal for `output`
    ///
    /// Every plane currently committed for this output gets a disabled
    /// placeholder, so a commit turns it off unless a new state replaces it.
    pub fn new_cleared(output: OutputId, mode: Size<i32, Physical>, planes: &PlaneRegistry) -> OutputState {
        let planes = planes
            .iter()
            .filter(|p| p.current_state().output == Some(output) && p.current_state().is_enabled())
            .map(|p| PlaneState {
                output: Some(output),
                ..PlaneState::disabled(p.handle())
            })
            .collect();
        OutputState { output, mode, planes }
    }

    /// Output of this state
    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Mode size the plane states refer to
    pub fn mode(&self) -> Size<i32, Physical> {
        self.mode
    }

    /// All plane states, enabled or not
    pub fn plane_states(&self) -> impl Iterator<Item = &PlaneState> {
        self.planes.iter()
    }

    /// Enabled plane states
    pub fn enabled(&self) -> impl Iterator<Item = &PlaneState> {
        self.planes.iter().filter(|ps| ps.is_enabled())
    }

    /// The state proposed for `plane`
    pub fn plane_state(&self, plane: PlaneHandle) -> Option<&PlaneState> {
        self.planes.iter().find(|ps| ps.plane == plane)
    }

    /// The enabled state showing `view`
    pub fn plane_for_view(&self, view: &ViewId) -> Option<&PlaneState> {
        self.enabled().find(|ps| ps.view.as_ref() == Some(view))
    }

    /// Insert or replace the state of a plane, returning the replaced state
    pub fn insert(&mut self, state: PlaneState) -> Option<PlaneState> {
        match self.planes.iter_mut().find(|ps| ps.plane == state.plane) {
            Some(slot) => Some(std::mem::replace(slot, state)),
            None => {
                self.planes.push(state);
                None
            }
        }
    }

    /// Undo an [`OutputState::insert`] with the state it returned
    pub fn restore(&mut self, plane: PlaneHandle, backup: Option<PlaneState>) {
        match backup {
            Some(backup) => {
                self.insert(backup);
            }
            None => self.planes.retain(|ps| ps.plane != plane),
        }
    }

    /// Whether all enabled planes have distinct z-positions
    pub fn check_zpos(&self) -> bool {
        let mut seen = SmallVec::<[u64; 4]>::new();
        for zpos in self.enabled().filter_map(|ps| ps.zpos) {
            if seen.contains(&zpos) {
                return false;
            }
            seen.push(zpos);
        }
        true
    }

    /// Drop a speculatively held state again
    ///
    /// Used for the renderer plane, whose old framebuffer only served as a
    /// stand-in while testing. A plane this output has enabled keeps a disabled
    /// placeholder, until the freshly rendered framebuffer gets attached.
    pub fn release_speculative(&mut self, plane: PlaneHandle, planes: &PlaneRegistry) {
        let committed = planes
            .get(plane)
            .map(|p| p.current_state())
            .is_some_and(|current| current.output == Some(self.output) && current.is_enabled());
        if committed {
            self.insert(PlaneState {
                output: Some(self.output),
                ..PlaneState::disabled(plane)
            });
        } else {
            self.planes.retain(|ps| ps.plane != plane);
        }
    }
}

/// Plane states of all outputs of a device, committed together
#[derive(Debug, Default)]
pub struct PendingState {
    outputs: IndexMap<OutputId, OutputState>,
}

impl PendingState {
    /// An empty pending state
    pub fn new() -> PendingState {
        PendingState::default()
    }

    /// State of `output`, if any was proposed yet
    pub fn output_state(&self, output: OutputId) -> Option<&OutputState> {
        self.outputs.get(&output)
    }

    /// Mutable state of `output`, if any was proposed yet
    pub fn output_state_mut(&mut self, output: OutputId) -> Option<&mut OutputState> {
        self.outputs.get_mut(&output)
    }

    pub(super) fn output_state_entry(
        &mut self,
        output: OutputId,
        mode: Size<i32, Physical>,
    ) -> &mut OutputState {
        self.outputs.entry(output).or_insert_with(|| OutputState {
            output,
            mode,
            planes: SmallVec::new(),
        })
    }

    /// Add or replace the state of an output
    pub fn insert(&mut self, state: OutputState) -> Option<OutputState> {
        self.outputs.insert(state.output, state)
    }

    /// Drop the state of an output
    pub fn remove(&mut self, output: OutputId) -> Option<OutputState> {
        self.outputs.shift_remove(&output)
    }

    /// Iterate the output states in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &OutputState> {
        self.outputs.values()
    }

    /// Whether no output state was proposed
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Whether another output than `output` already enabled `plane`
    pub fn is_claimed_by_other(&self, plane: PlaneHandle, output: OutputId) -> bool {
        self.outputs
            .values()
            .filter(|state| state.output != output)
            .any(|state| state.plane_state(plane).is_some_and(PlaneState::is_enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(handle: u32, zpos: u64) -> PlaneState {
        PlaneState {
            zpos: Some(zpos),
            ..PlaneState::disabled(PlaneHandle(handle))
        }
    }

    #[test]
    fn insert_and_restore() {
        let mut state = OutputState {
            output: OutputId::new(0),
            mode: (1920, 1080).into(),
            planes: SmallVec::new(),
        };
        let first = placeholder(1, 0);
        assert!(state.insert(first).is_none());

        let backup = state.insert(placeholder(1, 3));
        assert_eq!(state.plane_state(PlaneHandle(1)).and_then(|ps| ps.zpos), Some(3));
        state.restore(PlaneHandle(1), backup);
        assert_eq!(state.plane_state(PlaneHandle(1)).and_then(|ps| ps.zpos), Some(0));

        let backup = state.insert(placeholder(2, 1));
        state.restore(PlaneHandle(2), backup);
        assert!(state.plane_state(PlaneHandle(2)).is_none());
    }

    #[test]
    fn src_in_fixed_point() {
        let state = PlaneState {
            src: Rectangle::new((0.5, 2.0).into(), (64.0, 32.25).into()),
            ..PlaneState::disabled(PlaneHandle(1))
        };
        let fixed = state.src_fixed();
        assert_eq!(fixed.loc.x, 1 << 15);
        assert_eq!(fixed.loc.y, 2 << 16);
        assert_eq!(fixed.size.w, 64 << 16);
        assert_eq!(fixed.size.h, (32 << 16) + (1 << 14));
    }
}
