//! # Motion control service
//!
//! Gate in front of the motion controller. No axis moves unless every registered veto allows it,
//! and with home validation enabled nothing moves until both axes have been homed. A controller
//! which stops answering mid-job is reset and the move retried once.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use util::raise_error;

// Internal
use super::{
    Axis, ControllerPosition, ExecutionContext, HardwareCorrectionEvent,
    HardwareCorrectionStatistic, LimitResponse, MotionController, MoveMode, MoveTarget, MoveVeto,
    OffsetMoveData, PreHomeAction,
};
use crate::control_system::AxisHomer;
use crate::decks::DeckGeometry;
use crate::error::ErrorCode;
use crate::inventory::{InventoryStore, Location};
use crate::params::HalParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// X position the picker backs off to between the two X homing passes.
///
/// Units: steps
const X_HOME_BACKOFF: i32 = -200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MotionControlService {
    controller: Mutex<Box<dyn MotionController>>,
    params: Arc<HalParams>,
    decks: Arc<dyn DeckGeometry>,
    inventory: Arc<dyn InventoryStore>,
    context: Arc<dyn ExecutionContext>,
    vetoes: RwLock<Vec<Arc<dyn MoveVeto>>>,
    pre_home: RwLock<Option<Arc<dyn PreHomeAction>>>,
    state: Mutex<MotionState>,
}

#[derive(Debug, Clone, Default)]
struct MotionState {
    x_homed: bool,
    y_homed: bool,
    current_location: Option<Location>,
    at_vend_door: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionControlService {
    pub fn new(
        controller: Box<dyn MotionController>,
        params: Arc<HalParams>,
        decks: Arc<dyn DeckGeometry>,
        inventory: Arc<dyn InventoryStore>,
        context: Arc<dyn ExecutionContext>,
    ) -> Self {
        Self {
            controller: Mutex::new(controller),
            params,
            decks,
            inventory,
            context,
            vetoes: RwLock::new(Vec::new()),
            pre_home: RwLock::new(None),
            state: Mutex::new(MotionState::default()),
        }
    }

    // ---- VETOES ----

    pub fn add_veto(&self, veto: Arc<dyn MoveVeto>) {
        if let Ok(mut v) = self.vetoes.write() {
            v.push(veto);
        }
    }

    pub fn remove_veto(&self, veto: &Arc<dyn MoveVeto>) {
        if let Ok(mut v) = self.vetoes.write() {
            v.retain(|o| !Arc::ptr_eq(o, veto));
        }
    }

    /// Set the action run before homing when clearing the picker on home is enabled.
    pub fn set_pre_home_action(&self, action: Arc<dyn PreHomeAction>) {
        if let Ok(mut p) = self.pre_home.write() {
            *p = Some(action);
        }
    }

    // ---- CONTROLLER ----

    pub fn initialize(&self) -> bool {
        self.lock_controller().on_startup()
    }

    pub fn communication_ok(&self) -> bool {
        self.lock_controller().communication_ok()
    }

    pub fn read_positions(&self) -> ControllerPosition {
        self.lock_controller().read_positions()
    }

    pub fn read_limits(&self) -> LimitResponse {
        self.lock_controller().read_limits()
    }

    /// Apply new parameters to the controller's command templates.
    pub fn reconfigure(&self, params: Arc<HalParams>) {
        self.lock_controller().reconfigure(params);
    }

    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            state.x_homed = false;
            state.y_homed = false;
        }
        self.lock_controller().on_shutdown();
    }

    // ---- MOVES ----

    /// Move to absolute coordinates. With `check` set the axes must be homed and the vetoes are
    /// run first.
    pub fn move_absolute(&self, axis: Axis, x: Option<i32>, y: Option<i32>, check: bool) -> ErrorCode {
        let target = match MoveTarget::from_parts(axis, x, y) {
            Some(t) => t,
            None => raise_error!("Move on axis {} is missing a coordinate", axis),
        };

        if check {
            let homed = self.axes_initialized();
            if !homed.is_success() {
                return homed;
            }
            self.move_with_check(&target)
        } else {
            self.lock_controller().move_to_target(&target)
        }
    }

    pub fn move_to(&self, deck: i32, slot: i32, mode: MoveMode) -> ErrorCode {
        self.move_to_with_offsets(deck, slot, mode, &OffsetMoveData::default())
    }

    pub fn move_to_location(&self, location: &Location, mode: MoveMode) -> ErrorCode {
        self.move_to(location.deck, location.slot, mode)
    }

    /// Move in front of a slot, approaching it as `mode` requires.
    pub fn move_to_with_offsets(
        &self,
        deck_number: i32,
        slot: i32,
        mode: MoveMode,
        offsets: &OffsetMoveData,
    ) -> ErrorCode {
        let deck = match self.decks.get_by_number(deck_number) {
            Some(d) => d.clone(),
            None => return ErrorCode::DeckOutOfRange,
        };
        if !deck.is_slot_valid(slot) {
            return ErrorCode::SlotOutOfRange;
        }

        let homed = self.axes_initialized();
        if !homed.is_success() {
            log_move_error(deck_number, slot, homed);
            return homed;
        }

        let motion = &self.params.motion;
        let approach = if deck.is_qlm {
            motion.qlm_y_offset
        } else {
            motion.deck_y_offset
        };
        let y_step = motion.gear_y.step_ratio() as i32;

        let mut y = deck.y_offset;
        match mode {
            MoveMode::Put => y += approach * y_step,
            MoveMode::Get => y -= approach * y_step,
            MoveMode::None => (),
        }

        let mut x = match deck.get_slot_offset(slot) {
            Ok(x) => x,
            Err(e) => {
                error!("Slot offset of deck {} slot {}: {}", deck_number, slot, e);
                return ErrorCode::SlotOutOfRange;
            }
        };

        if deck.is_qlm {
            self.qlm_approach(x, y, mode);
        }

        if let Some(dx) = offsets.x_offset {
            x += dx;
        }
        if let Some(dy) = offsets.y_offset {
            y += dy;
        }

        let target = MoveTarget::XY { x, y };
        let mut result = self.move_with_check(&target);
        match result {
            ErrorCode::ArcusNotResponsive => {
                if self.reset_motion_controller_checked() {
                    result = self.move_with_check(&target);
                }
            }
            ErrorCode::LowerLimitError if !self.params.behaviour.lower_limit_as_error => {
                result = ErrorCode::Timeout;
            }
            _ => (),
        }

        log_move_error(deck_number, slot, result);
        if result.is_success() {
            let location = self.inventory.get(deck_number, slot);
            let mut state = self.lock_state();
            state.at_vend_door = false;
            state.current_location = location;
        }
        result
    }

    /// Move to the vend door.
    pub fn move_vend(&self, mode: MoveMode) -> ErrorCode {
        let homed = self.axes_initialized();
        if !homed.is_success() {
            log_move_vend_error(homed);
            return homed;
        }

        let vetoed = self.check_and_reset();
        if !vetoed.is_success() {
            log_move_vend_error(vetoed);
            return vetoed;
        }

        let mut result = self.lock_controller().move_to_vend(mode);
        if result == ErrorCode::ArcusNotResponsive && self.reset_motion_controller_checked() {
            result = self.lock_controller().move_to_vend(mode);
        }

        log_move_vend_error(result);
        self.lock_state().at_vend_door = result.is_success();
        result
    }

    /// Pre-position short of a QLM slot so the final move comes in along X.
    fn qlm_approach(&self, x: i32, y: i32, mode: MoveMode) {
        let pos = self.read_positions();
        let current_x = match (pos.read_ok(), pos.x) {
            (true, Some(cx)) => cx,
            _ => return,
        };

        let target = MoveTarget::XY {
            x: x - self.params.motion.qlm_approach_offset,
            y,
        };
        let approach = match mode {
            MoveMode::None | MoveMode::Get => true,
            MoveMode::Put => x < current_x,
        };

        if approach {
            let result = self.move_with_check(&target);
            info!("QLM approach move returned {}", result);
        }
    }

    // ---- HOMING ----

    pub fn init_axes(&self, fast: bool) -> ErrorCode {
        if self.params.behaviour.restart_controller_during_user_jobs && !self.communication_ok() {
            let reset = self.on_reset();
            self.context
                .insert_correction_stat(HardwareCorrectionStatistic::Arcus, reset.is_success());
            if !reset.is_success() {
                on_reset_failure(reset);
                return reset;
            }
        }

        self.on_init_axes(fast)
    }

    pub fn home_axis(&self, axis: Axis) -> ErrorCode {
        self.home_axis_checked(axis)
    }

    pub fn is_initialized(&self) -> bool {
        self.axes_initialized().is_success()
    }

    fn on_init_axes(&self, fast: bool) -> ErrorCode {
        if self.params.behaviour.clear_picker_on_home {
            let action = self.pre_home.read().ok().and_then(|p| p.clone());
            if let Some(a) = action {
                a.before_home();
            }
        }

        info!("Home the X motor.");
        let passes = if fast { 1 } else { 2 };
        for pass in 0..passes {
            let homed = self.home_axis_checked(Axis::X);
            if !homed.is_success() {
                return homed;
            }

            if pass == 0 {
                let backoff = self
                    .lock_controller()
                    .move_to_target(&MoveTarget::X(X_HOME_BACKOFF));
                info!("X home backoff returned {}", backoff);
            }
        }

        info!("Home the Y Motor.");
        self.home_axis_checked(Axis::Y)
    }

    fn home_axis_checked(&self, axis: Axis) -> ErrorCode {
        let vetoed = self.check_and_reset();
        if !vetoed.is_success() {
            return vetoed;
        }

        self.set_homed(axis, false);
        let result = self.lock_controller().home_axis(axis);
        if result.is_success() {
            self.set_homed(axis, true);
        } else {
            error!("HOME {} returned an error status {}", axis, result);
        }
        result
    }

    fn set_homed(&self, axis: Axis, homed: bool) {
        let mut state = self.lock_state();
        match axis {
            Axis::X => state.x_homed = homed,
            Axis::Y => state.y_homed = homed,
            Axis::XY => (),
        }
    }

    fn axes_initialized(&self) -> ErrorCode {
        if !self.params.behaviour.validate_controller_home_status {
            return ErrorCode::Success;
        }

        let state = self.lock_state();
        if !state.x_homed {
            info!("The X axis did not init.");
        }
        if !state.y_homed {
            info!("The Y axis did not init.");
        }

        if state.x_homed && state.y_homed {
            ErrorCode::Success
        } else {
            ErrorCode::MotorNotHomed
        }
    }

    // ---- RESET ----

    /// Reset the controller and home the axes again.
    pub fn reset(&self, quick: bool) -> ErrorCode {
        let mut result = self.on_reset();
        if result.is_success() {
            result = self.on_init_axes(quick);
        }

        if result.is_success() {
            info!("RESET of motion controller returned {}", result);
        } else {
            on_reset_failure(result);
        }
        result
    }

    /// Whether the controller answers, resetting it if it does not.
    pub fn test_and_reset(&self) -> bool {
        self.communication_ok() || self.reset(true).is_success()
    }

    fn on_reset(&self) -> ErrorCode {
        self.shutdown();
        if !self.lock_controller().on_reset_device_driver() {
            return ErrorCode::ArcusNotResponsive;
        }

        self.initialize();
        if self.communication_ok() {
            ErrorCode::Success
        } else {
            ErrorCode::ArcusNotResponsive
        }
    }

    /// Reset the controller as a hardware correction, if resets during jobs are allowed.
    fn reset_motion_controller_checked(&self) -> bool {
        if !self.params.behaviour.restart_controller_during_user_jobs {
            return false;
        }

        let mut event = HardwareCorrectionEvent::new(HardwareCorrectionStatistic::Arcus);
        self.context.hardware_correction_start(&event);
        event.correction_ok = self.reset(true).is_success();
        self.context.hardware_correction_end(&event);
        self.context
            .insert_correction_stat(HardwareCorrectionStatistic::Arcus, event.correction_ok);
        event.correction_ok
    }

    // ---- VETO CHECK ----

    fn move_with_check(&self, target: &MoveTarget) -> ErrorCode {
        let vetoed = self.check_and_reset();
        if !vetoed.is_success() {
            return vetoed;
        }
        self.lock_controller().move_to_target(target)
    }

    /// Run every veto, then forget the cached location since the picker is about to move.
    fn check_and_reset(&self) -> ErrorCode {
        if let Ok(vetoes) = self.vetoes.read() {
            for veto in vetoes.iter() {
                let result = veto.can_move();
                if !result.is_success() {
                    error!("Move veto returned code {}", result);
                    return result;
                }
            }
        }

        let mut state = self.lock_state();
        state.current_location = None;
        state.at_vend_door = false;
        ErrorCode::Success
    }

    // ---- LOCATION ----

    pub fn current_location(&self) -> Option<Location> {
        self.lock_state().current_location.clone()
    }

    pub fn at_vend_door(&self) -> bool {
        self.lock_state().at_vend_door
    }

    pub fn printable_location(&self) -> String {
        let state = self.lock_state();
        match (&state.current_location, state.at_vend_door) {
            (Some(l), _) => l.to_string(),
            (None, true) => "Vend Door".into(),
            (None, false) => "Location unknown".into(),
        }
    }

    fn lock_controller(&self) -> MutexGuard<Box<dyn MotionController>> {
        match self.controller.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_state(&self) -> MutexGuard<MotionState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AxisHomer for MotionControlService {
    fn home_axis(&self, axis: Axis) -> ErrorCode {
        self.home_axis_checked(axis)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn log_move_error(deck: i32, slot: i32, result: ErrorCode) {
    if !result.is_success() {
        error!(
            "MOVE Deck = {} Slot = {} returned an error status {}",
            deck, slot, result
        );
    }
}

fn log_move_vend_error(result: ErrorCode) {
    if !result.is_success() {
        error!("MOVEVEND returned an error status {}", result);
    }
}

fn on_reset_failure(result: ErrorCode) {
    error!("Reset of motion controller returned error {}", result);
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::decks::DeckTable;
    use crate::inventory::MemoryInventory;
    use crate::motion::{DoorSensorResult, LogExecutionContext};
    use crate::params::DeckParams;
    use crate::sim::{ArcusSim, FixedDoor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVeto {
        calls: AtomicUsize,
        result: ErrorCode,
    }

    impl MoveVeto for CountingVeto {
        fn can_move(&self) -> ErrorCode {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn params() -> HalParams {
        let mut params = HalParams::default();
        params.decks = vec![
            DeckParams {
                number: 1,
                y_offset: -18760,
                number_of_slots: 90,
                ..Default::default()
            },
            DeckParams {
                number: 2,
                y_offset: -40000,
                is_qlm: true,
                number_of_slots: 90,
                ..Default::default()
            },
        ];
        params
    }

    fn service(sim: &ArcusSim, params: HalParams) -> MotionControlService {
        let params = Arc::new(params);
        let decks = Arc::new(DeckTable::new(&params.decks).unwrap());
        let inventory = Arc::new(MemoryInventory::new(decks.as_ref()));
        let controller = sim.controller(params.clone(), Arc::new(FixedDoor(DoorSensorResult::Ok)));

        MotionControlService::new(
            Box::new(controller),
            params,
            decks,
            inventory,
            Arc::new(LogExecutionContext),
        )
    }

    #[test]
    fn test_move_requires_homed_axes() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());

        assert_eq!(motion.move_to(1, 1, MoveMode::Get), ErrorCode::MotorNotHomed);
        assert_eq!(motion.move_to(9, 1, MoveMode::Get), ErrorCode::DeckOutOfRange);
        assert_eq!(motion.move_to(1, 91, MoveMode::Get), ErrorCode::SlotOutOfRange);
        assert!(!motion.is_initialized());
    }

    #[test]
    fn test_init_axes_homes_x_twice_then_y() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());

        assert_eq!(motion.init_axes(false), ErrorCode::Success);
        assert!(motion.is_initialized());
        assert_eq!(sim.sent().count("HOMEX-"), 2);
        assert_eq!(sim.sent().count("HOMEY+"), 1);
        assert!(sim.sent().contains("X-200"));

        sim.sent().clear();
        assert_eq!(motion.init_axes(true), ErrorCode::Success);
        assert_eq!(sim.sent().count("HOMEX-"), 1);
    }

    #[test]
    fn test_get_and_put_approach_offsets() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        motion.init_axes(true);

        assert_eq!(motion.move_to(1, 1, MoveMode::Get), ErrorCode::Success);
        assert_eq!(sim.position(), (780, -18760 - 50 * 8));
        assert_eq!(motion.printable_location(), "Deck = 1 Slot = 1");

        assert_eq!(motion.move_to(1, 1, MoveMode::Put), ErrorCode::Success);
        assert_eq!(sim.position().1, -18760 + 50 * 8);

        let offsets = OffsetMoveData {
            x_offset: Some(10),
            y_offset: Some(-5),
        };
        assert_eq!(
            motion.move_to_with_offsets(1, 1, MoveMode::None, &offsets),
            ErrorCode::Success
        );
        assert_eq!(sim.position(), (790, -18765));
    }

    #[test]
    fn test_qlm_get_pre_approaches() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        motion.init_axes(true);
        sim.sent().clear();

        assert_eq!(motion.move_to(2, 1, MoveMode::Get), ErrorCode::Success);
        assert!(sim.sent().contains("X280"));
        assert_eq!(sim.position().0, 780);
    }

    #[test]
    fn test_veto_blocks_and_clears_location() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        motion.init_axes(true);
        assert_eq!(motion.move_to(1, 1, MoveMode::Get), ErrorCode::Success);

        let veto = Arc::new(CountingVeto {
            calls: AtomicUsize::new(0),
            result: ErrorCode::DoorOpen,
        });
        let handle: Arc<dyn MoveVeto> = veto.clone();
        motion.add_veto(handle.clone());

        sim.sent().clear();
        assert_eq!(motion.move_to(1, 2, MoveMode::Get), ErrorCode::DoorOpen);
        assert_eq!(veto.calls.load(Ordering::SeqCst), 1);
        assert!(!sim.sent().commands().iter().any(|c| c.starts_with("X")));

        motion.remove_veto(&handle);
        assert_eq!(motion.move_to(1, 2, MoveMode::Get), ErrorCode::Success);
        assert_eq!(veto.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresponsive_resets_and_retries() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        motion.init_axes(true);

        sim.set_unresponsive(true);
        assert_eq!(motion.move_to(1, 3, MoveMode::Get), ErrorCode::Success);
        assert_eq!(sim.resets(), 1);
        assert!(motion.current_location().is_some());
    }

    #[test]
    fn test_unresponsive_without_restart() {
        let sim = ArcusSim::new();
        let mut p = params();
        p.behaviour.restart_controller_during_user_jobs = false;
        let motion = service(&sim, p);
        motion.init_axes(true);

        sim.set_unresponsive(true);
        assert_eq!(motion.move_to(1, 3, MoveMode::Get), ErrorCode::ArcusNotResponsive);
        assert_eq!(sim.resets(), 0);
        assert_eq!(motion.printable_location(), "Location unknown");
    }

    #[test]
    fn test_lower_limit_downgraded() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        motion.init_axes(true);

        sim.queue_status(Axis::Y, &["16"]);
        assert_eq!(motion.move_to(1, 3, MoveMode::Get), ErrorCode::Timeout);
    }

    #[test]
    fn test_move_vend() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        assert_eq!(motion.move_vend(MoveMode::Put), ErrorCode::MotorNotHomed);

        motion.init_axes(true);
        assert_eq!(motion.move_vend(MoveMode::Put), ErrorCode::Success);
        assert!(motion.at_vend_door());
        assert_eq!(motion.printable_location(), "Vend Door");
    }

    #[test]
    fn test_shutdown_clears_homed() {
        let sim = ArcusSim::new();
        let motion = service(&sim, params());
        motion.init_axes(true);
        assert!(motion.is_initialized());

        motion.shutdown();
        assert!(!motion.is_initialized());
    }
}
