//! # Clear picker front
//!
//! Sweep the front of the picker with two short pushes of the closed fingers. Run before homing so
//! that nothing sticking out of the picker catches on the decks.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use std::sync::Arc;

// Internal
use crate::control_system::{ControlSystem, GripperFingerState};
use crate::motion::PreHomeAction;
use crate::params::HalParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Clears the picker front before the axes are homed.
///
/// Holds the control system rather than the controller service, since the motion service owns the
/// action and the controller service owns the motion service.
pub struct PickerFrontClearer {
    control: Arc<ControlSystem>,
    params: Arc<HalParams>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PickerFrontClearer {
    pub fn new(control: Arc<ControlSystem>, params: Arc<HalParams>) -> Self {
        Self { control, params }
    }
}

impl PreHomeAction for PickerFrontClearer {
    fn before_home(&self) {
        info!("Clear the picker front before homing.");
        if !clear_picker_front(&self.control, &self.params) {
            warn!("Unable to clear the picker front.");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Push anything at the front of the picker back out. Returns `false` if the gripper did not
/// respond.
pub fn clear_picker_front(control: &ControlSystem, params: &HalParams) -> bool {
    let push_ms = params.timing.push_time_ms;

    control.set_finger(GripperFingerState::Rent);
    if !control.retract_arm().success() {
        control.set_finger(GripperFingerState::Rent);
        if !control.retract_arm().success() {
            return false;
        }
    }

    if !control.set_finger(GripperFingerState::Closed).success() {
        return false;
    }
    control.timed_extend(push_ms);

    if !control.set_finger(GripperFingerState::Rent).success()
        || !control.retract_arm().success()
        || !control.set_finger(GripperFingerState::Closed).success()
    {
        return false;
    }
    control.timed_extend(push_ms);

    control.retract_arm().success() && control.set_finger(GripperFingerState::Rent).success()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops::fixture::rig;
    use crate::sensors::PickerInput;

    #[test]
    fn test_two_pushes() {
        let rig = rig();
        assert!(clear_picker_front(&rig.ctx.control, &rig.ctx.params));
        assert_eq!(rig.board.sent().count("ARM EXTEND TIMED"), 2);
        assert!(rig.board.picker_input(PickerInput::FingerRent));
    }

    #[test]
    fn test_stuck_finger_fails() {
        let rig = rig();
        rig.board.stall("GRIPPER CLOSE");
        assert!(!clear_picker_front(&rig.ctx.control, &rig.ctx.params));
        assert!(!rig.board.sent().contains("ARM EXTEND TIMED"));
    }

    #[test]
    fn test_runs_before_homing() {
        let mut params = crate::ops::fixture::params();
        params.behaviour.clear_picker_on_home = true;
        let rig = crate::ops::fixture::rig_with(params);
        rig.ctx.motion.set_pre_home_action(Arc::new(PickerFrontClearer::new(
            rig.ctx.control.clone(),
            rig.ctx.params.clone(),
        )));

        assert!(rig.ctx.motion.init_axes(true).is_success());
        assert_eq!(rig.board.sent().count("ARM EXTEND TIMED"), 2);
    }
}
