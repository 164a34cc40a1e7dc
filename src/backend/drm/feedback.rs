//! Dmabuf feedback driven by plane assignment
//!
//! Clients advertising dmabuf feedback receive a list of tranches, each naming
//! a target device and the formats preferred for it. Besides the always present
//! renderer tranche, a surface may get a scanout tranche listing the formats of
//! the primary plane, hinting the client to allocate buffers that can be put on
//! a plane directly.
//!
//! Whether the scanout tranche is advertised follows the outcome of plane
//! assignment. A change is only sent after the same condition persisted for
//! [`FEEDBACK_DEBOUNCE`], so a view briefly failing does not make clients
//! reallocate their buffers back and forth.

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace};

use super::FailureReasons;
use crate::backend::allocator::format::FormatSet;
use crate::utils::{Monotonic, Time};

/// Time a feedback change has to be requested consistently before it is applied
pub const FEEDBACK_DEBOUNCE: Duration = Duration::from_secs(2);

bitflags::bitflags! {
    /// Flags of a feedback tranche
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TrancheFlags: u32 {
        /// Buffers allocated for this tranche can be scanned out
        const SCANOUT = 1;
    }
}

/// What a tranche is meant for, highest priority last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TranchePreference {
    /// Formats the renderer can sample from
    Renderer,
    /// Formats a plane can scan out
    Scanout,
}

/// A group of formats preferred for one target device
#[derive(Debug, Clone)]
pub struct FeedbackTranche {
    /// Device number the buffers should be allocated on
    pub target_device: u64,
    /// Tranche flags
    pub flags: TrancheFlags,
    /// Preference of the tranche
    pub preference: TranchePreference,
    /// Preferred formats
    pub formats: FormatSet,
    /// Whether the tranche is currently advertised
    pub active: bool,
}

/// Transport of dmabuf feedback to the client
pub trait FeedbackSender {
    /// Replace the feedback of the client by `tranches`, ordered by preference
    fn send_all(&mut self, main_device: u64, tranches: &[&FeedbackTranche]);
}

/// Change of the scanout tranche waiting to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    /// Start advertising the scanout tranche
    Add,
    /// Stop advertising the scanout tranche
    Remove,
}

/// Dmabuf feedback state of a surface
pub struct DmabufFeedback {
    main_device: u64,
    tranches: Vec<FeedbackTranche>,
    pending: Option<(FeedbackAction, Time<Monotonic>)>,
    sender: Box<dyn FeedbackSender>,
}

impl fmt::Debug for DmabufFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmabufFeedback")
            .field("main_device", &self.main_device)
            .field("tranches", &self.tranches)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl DmabufFeedback {
    /// Create the feedback of a surface with an active renderer tranche
    pub fn new(main_device: u64, renderer_formats: FormatSet, sender: Box<dyn FeedbackSender>) -> Self {
        DmabufFeedback {
            main_device,
            tranches: vec![FeedbackTranche {
                target_device: main_device,
                flags: TrancheFlags::empty(),
                preference: TranchePreference::Renderer,
                formats: renderer_formats,
                active: true,
            }],
            pending: None,
            sender,
        }
    }

    /// The main device of the feedback
    pub fn main_device(&self) -> u64 {
        self.main_device
    }

    /// All tranches, active or not
    pub fn tranches(&self) -> &[FeedbackTranche] {
        &self.tranches
    }

    /// The change currently being debounced
    pub fn pending_action(&self) -> Option<FeedbackAction> {
        self.pending.map(|(action, _)| action)
    }

    /// Add a tranche
    pub fn add_tranche(&mut self, tranche: FeedbackTranche) {
        self.tranches.push(tranche);
    }

    /// Find the tranche matching `target_device`, `flags` and `preference`
    pub fn find_tranche(
        &mut self,
        target_device: u64,
        flags: TrancheFlags,
        preference: TranchePreference,
    ) -> Option<&mut FeedbackTranche> {
        self.tranches
            .iter_mut()
            .find(|t| t.target_device == target_device && t.flags == flags && t.preference == preference)
    }

    /// Add an inactive tranche and return it
    pub fn create_tranche(
        &mut self,
        target_device: u64,
        flags: TrancheFlags,
        preference: TranchePreference,
        formats: FormatSet,
    ) -> &mut FeedbackTranche {
        let index = self.tranches.len();
        self.tranches.push(FeedbackTranche {
            target_device,
            flags,
            preference,
            formats,
            active: false,
        });
        &mut self.tranches[index]
    }

    /// Send the active tranches, scanout tranches first
    pub fn send_all(&mut self) {
        let mut active = self.tranches.iter().filter(|t| t.active).collect::<Vec<_>>();
        active.sort_by(|a, b| b.preference.cmp(&a.preference));
        self.sender.send_all(self.main_device, &active);
    }

    /// Update the scanout tranche after plane assignment failed with `reasons`
    ///
    /// `device` and `formats` describe the scanout tranche, usually the kms
    /// device and the formats of the primary plane. Returns whether new
    /// feedback was sent.
    pub(crate) fn maybe_update(
        &mut self,
        device: u64,
        formats: &FormatSet,
        reasons: FailureReasons,
        now: Time<Monotonic>,
    ) -> bool {
        let scanout = self.find_tranche(device, TrancheFlags::SCANOUT, TranchePreference::Scanout);
        let scanout_active = match scanout {
            Some(tranche) => tranche.active,
            None => {
                self.create_tranche(
                    device,
                    TrancheFlags::SCANOUT,
                    TranchePreference::Scanout,
                    formats.clone(),
                );
                false
            }
        };

        let action = if reasons.contains(FailureReasons::FORCE_RENDERER) {
            scanout_active.then_some(FeedbackAction::Remove)
        } else if reasons.intersects(
            FailureReasons::FB_FORMAT_INCOMPATIBLE
                | FailureReasons::DMABUF_MODIFIER_INVALID
                | FailureReasons::ADD_FB_FAILED,
        ) {
            (!scanout_active).then_some(FeedbackAction::Add)
        } else {
            None
        };

        let Some(action) = action else {
            self.pending = None;
            return false;
        };

        match self.pending {
            Some((pending, since)) if pending == action => {
                if since.duration_since(now) < FEEDBACK_DEBOUNCE {
                    return false;
                }
            }
            _ => {
                trace!(?action, "Arming dmabuf feedback change");
                self.pending = Some((action, now));
                return false;
            }
        }

        if let Some(tranche) = self.find_tranche(device, TrancheFlags::SCANOUT, TranchePreference::Scanout) {
            tranche.active = action == FeedbackAction::Add;
        }
        debug!(?action, "Updating dmabuf feedback");
        self.send_all();
        self.pending = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::backend::allocator::{Format, Fourcc, Modifier};

    #[derive(Default)]
    struct Recorder(Rc<RefCell<Vec<Vec<TranchePreference>>>>);

    impl FeedbackSender for Recorder {
        fn send_all(&mut self, _main_device: u64, tranches: &[&FeedbackTranche]) {
            self.0.borrow_mut().push(tranches.iter().map(|t| t.preference).collect());
        }
    }

    fn formats() -> FormatSet {
        [Format {
            code: Fourcc::Xrgb8888,
            modifier: Modifier::Linear,
        }]
        .into_iter()
        .collect()
    }

    fn at(millis: u64) -> Time<Monotonic> {
        Time::from(Duration::from_millis(millis))
    }

    #[test]
    fn scanout_tranche_added_after_debounce() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut feedback = DmabufFeedback::new(1, formats(), Box::new(Recorder(sent.clone())));
        let reasons = FailureReasons::FB_FORMAT_INCOMPATIBLE;

        assert!(!feedback.maybe_update(1, &formats(), reasons, at(0)));
        assert_eq!(feedback.pending_action(), Some(FeedbackAction::Add));
        assert!(!feedback.maybe_update(1, &formats(), reasons, at(1_999)));
        assert!(feedback.maybe_update(1, &formats(), reasons, at(2_000)));

        assert_eq!(
            *sent.borrow(),
            vec![vec![TranchePreference::Scanout, TranchePreference::Renderer]]
        );
        assert_eq!(feedback.pending_action(), None);

        // already active, nothing left to do
        assert!(!feedback.maybe_update(1, &formats(), reasons, at(5_000)));
        assert_eq!(feedback.pending_action(), None);
    }

    #[test]
    fn interrupted_condition_resets_debounce() {
        let mut feedback = DmabufFeedback::new(1, formats(), Box::<Recorder>::default());
        let reasons = FailureReasons::ADD_FB_FAILED;

        assert!(!feedback.maybe_update(1, &formats(), reasons, at(0)));
        assert!(!feedback.maybe_update(1, &formats(), FailureReasons::empty(), at(1_000)));
        assert_eq!(feedback.pending_action(), None);
        assert!(!feedback.maybe_update(1, &formats(), reasons, at(2_500)));
        assert!(!feedback.maybe_update(1, &formats(), reasons, at(4_000)));
        assert!(feedback.maybe_update(1, &formats(), reasons, at(4_500)));
    }

    #[test]
    fn forced_renderer_removes_active_tranche() {
        let mut feedback = DmabufFeedback::new(1, formats(), Box::<Recorder>::default());
        feedback
            .create_tranche(1, TrancheFlags::SCANOUT, TranchePreference::Scanout, formats())
            .active = true;

        let reasons = FailureReasons::FORCE_RENDERER | FailureReasons::FB_FORMAT_INCOMPATIBLE;
        assert!(!feedback.maybe_update(1, &formats(), reasons, at(0)));
        assert_eq!(feedback.pending_action(), Some(FeedbackAction::Remove));
        assert!(feedback.maybe_update(1, &formats(), reasons, at(3_000)));

        let active = feedback.tranches().iter().filter(|t| t.active).count();
        assert_eq!(active, 1);
    }
}
