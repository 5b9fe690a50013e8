//! # Control system
//!
//! The interface operations use to drive the picker, track, roller and vend door. Door and track
//! states are cached here: a state is set to unknown before its command is sent and only set to
//! the requested value when the command succeeds.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, Level};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

// Internal
use super::{
    AudioChannelState, AxisHomer, BoardVersionResponse, CenterDiskMethod, ControlBoard,
    ControlSystemObserver, ControlSystemRevision, CoreBoard, GripperFingerState, QlmOperation,
    QlmStatus, RollerPosition, RollerState, TrackState, VendDoorState,
};
use crate::core_cmd::CoreResponse;
use crate::counters::{PersistentCounters, TimeoutCounter};
use crate::error::ErrorCode;
use crate::motion::Axis;
use crate::params::HalParams;
use crate::runtime::Runtime;
use crate::sensors::{AuxInput, PickerInput, PickerSensorReadResult, ReadInputsResult};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pause between shutting down and reinitialising on a restart.
///
/// Units: milliseconds
const RESTART_PAUSE_MS: u64 = 1200;

/// Pause between the roller moves of a centring.
///
/// Units: milliseconds
const CENTER_PAUSE_MS: u64 = 250;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ControlSystem {
    board: CoreBoard,
    runtime: Arc<dyn Runtime>,
    params: Arc<HalParams>,
    counters: Arc<dyn PersistentCounters>,
    observers: RwLock<Vec<Arc<dyn ControlSystemObserver>>>,
    state: Mutex<CachedState>,
}

#[derive(Debug, Clone, Copy)]
struct CachedState {
    initialized: bool,
    vend_door: VendDoorState,
    track: TrackState,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlSystem {
    pub fn new(
        board: CoreBoard,
        runtime: Arc<dyn Runtime>,
        params: Arc<HalParams>,
        counters: Arc<dyn PersistentCounters>,
    ) -> Self {
        Self {
            board,
            runtime,
            params,
            counters,
            observers: RwLock::new(Vec::new()),
            state: Mutex::new(CachedState {
                initialized: false,
                vend_door: VendDoorState::Unknown,
                track: TrackState::Unknown,
            }),
        }
    }

    // ---- OBSERVERS ----

    pub fn add_handler(&self, observer: Arc<dyn ControlSystemObserver>) {
        if let Ok(mut obs) = self.observers.write() {
            if !obs.iter().any(|o| Arc::ptr_eq(o, &observer)) {
                obs.push(observer);
            }
        }
    }

    pub fn remove_handler(&self, observer: &Arc<dyn ControlSystemObserver>) {
        if let Ok(mut obs) = self.observers.write() {
            obs.retain(|o| !Arc::ptr_eq(o, observer));
        }
    }

    fn notify<F: Fn(&dyn ControlSystemObserver)>(&self, f: F) {
        if let Ok(obs) = self.observers.read() {
            for o in obs.iter() {
                f(o.as_ref());
            }
        }
    }

    // ---- LIFECYCLE ----

    pub fn initialize(&self) -> CoreResponse {
        let response = self.board.initialize();
        self.lock_state().initialized = response.success();

        if response.success() {
            self.notify(|o| o.on_system_initialize(ErrorCode::Success));
            let door = self.board.read_vend_door_state();
            self.lock_state().vend_door = door;
        }

        response
    }

    pub fn shutdown(&self) -> bool {
        self.notify(|o| o.on_system_shutdown());
        self.lock_state().initialized = false;
        self.board.shutdown()
    }

    pub fn restart(&self) -> bool {
        if !self.shutdown() {
            return false;
        }
        self.runtime.wait(RESTART_PAUSE_MS);
        self.initialize().success()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().initialized
    }

    // ---- SERIAL BOARD ----

    pub fn set_audio(&self, state: AudioChannelState) -> CoreResponse {
        self.board.set_audio(state)
    }

    /// Switch the ring light, optionally waiting afterwards for the light to settle.
    pub fn toggle_ring_light(&self, on: bool, sleep_after_ms: Option<u64>) -> CoreResponse {
        let response = self.board.set_ringlight(on);
        if let (true, Some(ms)) = (response.success(), sleep_after_ms) {
            self.runtime.wait(ms);
        }
        response
    }

    pub fn get_board_version(&self, board: ControlBoard) -> BoardVersionResponse {
        self.board.get_board_version(board)
    }

    pub fn get_revision(&self) -> ControlSystemRevision {
        self.board.get_revision()
    }

    // ---- VEND DOOR ----

    pub fn vend_door_rent(&self) -> CoreResponse {
        self.set_vend_door(VendDoorState::Rent, TimeoutCounter::VendDoorRent)
    }

    pub fn vend_door_close(&self) -> CoreResponse {
        self.set_vend_door(VendDoorState::Closed, TimeoutCounter::VendDoorClose)
    }

    /// Cached vend door state.
    pub fn vend_door_state(&self) -> VendDoorState {
        self.lock_state().vend_door
    }

    /// Vend door state read from the aux sensors.
    pub fn read_vend_door_position(&self) -> VendDoorState {
        self.board.read_vend_door_state()
    }

    fn set_vend_door(&self, state: VendDoorState, counter: TimeoutCounter) -> CoreResponse {
        self.lock_state().vend_door = VendDoorState::Unknown;

        let response = self.board.set_vend_door(state);
        if response.success() {
            self.lock_state().vend_door = state;
        } else {
            self.counters.increment_timeout(counter);
        }
        response
    }

    // ---- TRACK ----

    pub fn track_open(&self) -> CoreResponse {
        self.set_track(TrackState::Open, TimeoutCounter::TrackOpen)
    }

    pub fn track_close(&self) -> CoreResponse {
        self.set_track(TrackState::Closed, TimeoutCounter::TrackClose)
    }

    /// Open then close the track.
    pub fn track_cycle(&self) -> ErrorCode {
        if !self.track_open().success() {
            ErrorCode::TrackOpenTimeout
        } else if !self.track_close().success() {
            ErrorCode::TrackCloseTimeout
        } else {
            ErrorCode::Success
        }
    }

    /// Cached track state.
    pub fn track_state(&self) -> TrackState {
        self.lock_state().track
    }

    fn set_track(&self, state: TrackState, counter: TimeoutCounter) -> CoreResponse {
        self.lock_state().track = TrackState::Unknown;

        let response = self.board.set_track(state);
        if response.success() {
            self.lock_state().track = state;
        } else {
            self.counters.increment_timeout(counter);
        }
        response
    }

    // ---- GRIPPER ----

    /// Extend the arm for the configured push time.
    pub fn timed_extend_default(&self) {
        self.timed_extend(self.params.timing.push_time_ms);
    }

    pub fn timed_extend(&self, duration_ms: u64) {
        self.board.timed_arm_extend(duration_ms);
    }

    pub fn extend_arm(&self, timeout_ms: u64) -> CoreResponse {
        let response = self.board.extend_arm(timeout_ms);
        if !response.success() {
            self.counters.increment_timeout(TimeoutCounter::GripperExtend);
        }
        response
    }

    pub fn retract_arm(&self) -> CoreResponse {
        let response = self
            .board
            .retract_arm(self.params.timing.gripper_arm_extend_retract_timeout_ms);
        if !response.success() {
            self.counters.increment_timeout(TimeoutCounter::GripperRetract);
        }
        response
    }

    pub fn set_finger(&self, state: GripperFingerState) -> CoreResponse {
        let response = self.board.set_finger(state);
        if !response.success() {
            self.counters.increment_timeout(match state {
                GripperFingerState::Closed => TimeoutCounter::FingerClose,
                GripperFingerState::Open => TimeoutCounter::FingerOpen,
                GripperFingerState::Rent => TimeoutCounter::FingerRent,
            });
        }
        response
    }

    // ---- ROLLER ----

    pub fn start_roller_in(&self) -> CoreResponse {
        self.set_roller_state(RollerState::In)
    }

    pub fn start_roller_out(&self) -> CoreResponse {
        self.set_roller_state(RollerState::Out)
    }

    pub fn stop_roller(&self) -> CoreResponse {
        self.set_roller_state(RollerState::Stop)
    }

    pub fn set_roller_state(&self, state: RollerState) -> CoreResponse {
        self.board.set_roller(state)
    }

    /// Roll the disk to a sensor, logging the sensors if it does not get there. `None` uses the
    /// default roll timeout.
    pub fn roller_to_position(&self, position: RollerPosition, timeout_ms: Option<u64>) -> CoreResponse {
        self.roller_to(position, timeout_ms, true)
    }

    /// As [`ControlSystem::roller_to_position`] but without logging the sensors on failure.
    pub fn roller_to_position_quiet(
        &self,
        position: RollerPosition,
        timeout_ms: Option<u64>,
    ) -> CoreResponse {
        self.roller_to(position, timeout_ms, false)
    }

    fn roller_to(&self, position: RollerPosition, timeout_ms: Option<u64>, log_sensors: bool) -> CoreResponse {
        let timeout = timeout_ms.unwrap_or(self.params.timing.default_roll_sensor_timeout_ms);

        let response = self.board.roller_to_position(position, timeout);
        if !response.success() && log_sensors && !response.comm_error() {
            error!("Roller to {} timed out.", position);
            self.log_picker_sensor_state(Level::Error);
        }
        response
    }

    /// Centre a disk in the picker by rolling it to one end and back, then cycling the track.
    pub fn center(&self, method: CenterDiskMethod) -> ErrorCode {
        let (first, second) = match method {
            CenterDiskMethod::None => return ErrorCode::Success,
            CenterDiskMethod::DrumAndBack => (RollerPosition::Position1, RollerPosition::Position5),
            CenterDiskMethod::DrumAndFront => (RollerPosition::Position6, RollerPosition::Position3),
        };

        let mut result = ErrorCode::Success;
        for position in [first, second].iter() {
            if !self.roller_to_position_quiet(*position, None).success() {
                result = position.timeout_code();
                error!("Center disk: Roller {} timed out.", position);
            }
            self.runtime.spin_wait(CENTER_PAUSE_MS);
        }

        self.track_cycle();
        result
    }

    // ---- SENSORS ----

    pub fn set_sensors(&self, on: bool) -> CoreResponse {
        self.board.set_picker_sensors(on)
    }

    pub fn read_picker_inputs(&self) -> ReadInputsResult<PickerInput> {
        let result = self.board.read_picker_inputs();
        if !result.success() {
            error!("Read Picker inputs failed with error {}", result.error());
        }
        result
    }

    pub fn read_aux_inputs(&self) -> ReadInputsResult<AuxInput> {
        let result = self.board.read_aux_inputs();
        if !result.success() {
            error!("Read AUX inputs failed with error {}", result.error());
        }
        result
    }

    /// Read the picker presence sensors with the track closed.
    pub fn read_picker_sensors(&self) -> PickerSensorReadResult {
        self.read_picker_sensors_with(true)
    }

    /// Read the picker presence sensors. The sensor bar is lit only for the read and is always
    /// switched off again.
    pub fn read_picker_sensors_with(&self, close_track: bool) -> PickerSensorReadResult {
        if close_track && self.track_state() != TrackState::Closed && !self.track_close().success() {
            return PickerSensorReadResult::failed(ErrorCode::TrackCloseTimeout);
        }

        let lit = self.board.set_picker_sensors(true);
        let result = if lit.success() {
            let spin = self.params.timing.picker_sensor_spin_time_ms;
            self.runtime.spin_wait(spin);
            let read = self.board.read_picker_inputs();
            self.runtime.spin_wait(spin);
            PickerSensorReadResult::from_read(read)
        } else {
            PickerSensorReadResult::failed(lit.error())
        };

        self.board.set_picker_sensors(false);
        result
    }

    pub fn log_picker_sensor_state(&self, level: Level) {
        self.read_picker_sensors().log(level);
    }

    pub fn log_inputs(&self, board: ControlBoard, level: Level) {
        match board {
            ControlBoard::Picker => self.board.read_picker_inputs().log(level),
            _ => self.board.read_aux_inputs().log(level),
        }
    }

    // ---- QLM ----

    pub fn get_qlm_status(&self) -> QlmStatus {
        self.board.get_qlm_status()
    }

    /// Engage the QLM. X is homed through `homer` first, the lifter must not move off an unhomed
    /// picker.
    pub fn engage_qlm(&self, homer: &dyn AxisHomer) -> ErrorCode {
        self.on_lifter_operation(QlmOperation::Engage, Some(homer))
    }

    /// Disengage the QLM, homing X through `homer` first.
    pub fn disengage_qlm(&self, homer: &dyn AxisHomer) -> ErrorCode {
        self.on_lifter_operation(QlmOperation::Disengage, Some(homer))
    }

    /// Engage the QLM without homing. Only for callers which have just homed X themselves.
    pub fn engage_qlm_unhomed(&self) -> ErrorCode {
        self.on_lifter_operation(QlmOperation::Engage, None)
    }

    /// Disengage the QLM without homing.
    pub fn disengage_qlm_unhomed(&self) -> ErrorCode {
        self.on_lifter_operation(QlmOperation::Disengage, None)
    }

    pub fn lock_qlm_door(&self) -> CoreResponse {
        self.board.on_qlm(QlmOperation::LockDoor)
    }

    pub fn unlock_qlm_door(&self) -> CoreResponse {
        self.board.on_qlm(QlmOperation::UnlockDoor)
    }

    pub fn drop_qlm(&self) -> CoreResponse {
        self.board.on_qlm(QlmOperation::Drop)
    }

    pub fn lift_qlm(&self) -> CoreResponse {
        self.board.on_qlm(QlmOperation::Lift)
    }

    pub fn halt_qlm_lifter(&self) -> CoreResponse {
        self.board.on_qlm(QlmOperation::Halt)
    }

    fn on_lifter_operation(&self, op: QlmOperation, homer: Option<&dyn AxisHomer>) -> ErrorCode {
        if self.params.is_vmz_machine() {
            return ErrorCode::Timeout;
        }

        if let Some(h) = homer {
            if h.home_axis(Axis::X) != ErrorCode::Success {
                return ErrorCode::HomeXTimeout;
            }
        }

        let response = self.board.on_qlm(op);
        let result = if response.success() {
            ErrorCode::Success
        } else {
            ErrorCode::Timeout
        };
        info!("{} returned status {}.", op, result);

        if !response.success() {
            self.counters.increment_timeout(match op {
                QlmOperation::Engage => TimeoutCounter::QlmEngage,
                _ => TimeoutCounter::QlmDisengage,
            });
        }

        result
    }

    fn lock_state(&self) -> MutexGuard<CachedState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::counters::CounterStore;
    use crate::sim::CoreBoardSim;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        initialized: AtomicUsize,
        shutdown: AtomicUsize,
    }

    impl ControlSystemObserver for CountingObserver {
        fn on_system_initialize(&self, _status: ErrorCode) {
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        fn on_system_shutdown(&self) {
            self.shutdown.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingHomer;

    impl AxisHomer for FailingHomer {
        fn home_axis(&self, _axis: Axis) -> ErrorCode {
            ErrorCode::Timeout
        }
    }

    /// Homes successfully, remembering which axes it was asked for.
    struct RecordingHomer(std::cell::RefCell<Vec<Axis>>);

    impl AxisHomer for RecordingHomer {
        fn home_axis(&self, axis: Axis) -> ErrorCode {
            self.0.borrow_mut().push(axis);
            ErrorCode::Success
        }
    }

    fn system(sim: &CoreBoardSim) -> (ControlSystem, Arc<CounterStore>) {
        let counters = Arc::new(CounterStore::in_memory());
        (sim.control_system(Arc::new(HalParams::default()), counters.clone()), counters)
    }

    #[test]
    fn test_lifecycle_notifies_once_per_observer() {
        let sim = CoreBoardSim::new();
        let (cs, _) = system(&sim);
        let obs = Arc::new(CountingObserver {
            initialized: AtomicUsize::new(0),
            shutdown: AtomicUsize::new(0),
        });
        let handler: Arc<dyn ControlSystemObserver> = obs.clone();
        cs.add_handler(handler.clone());
        cs.add_handler(handler.clone());

        assert!(cs.initialize().success());
        assert!(cs.is_initialized());
        assert_eq!(cs.vend_door_state(), VendDoorState::Closed);
        assert!(cs.restart());

        assert_eq!(obs.initialized.load(Ordering::SeqCst), 2);
        assert_eq!(obs.shutdown.load(Ordering::SeqCst), 1);

        cs.remove_handler(&handler);
        cs.shutdown();
        assert_eq!(obs.shutdown.load(Ordering::SeqCst), 1);
        assert!(!cs.is_initialized());
    }

    #[test]
    fn test_failed_close_leaves_door_unknown() {
        let sim = CoreBoardSim::new();
        let (cs, counters) = system(&sim);
        assert!(cs.vend_door_rent().success());
        assert_eq!(cs.vend_door_state(), VendDoorState::Rent);

        sim.stall("VEND CLOSE");
        assert!(cs.vend_door_close().timed_out());
        assert_eq!(cs.vend_door_state(), VendDoorState::Unknown);
        assert_eq!(counters.value("VendDoorCloseTimeout"), 1);
    }

    #[test]
    fn test_track_state_and_cycle() {
        let sim = CoreBoardSim::new();
        let (cs, counters) = system(&sim);
        assert_eq!(cs.track_cycle(), ErrorCode::Success);
        assert_eq!(cs.track_state(), TrackState::Closed);

        sim.stall("TRACK OPEN");
        assert_eq!(cs.track_cycle(), ErrorCode::TrackOpenTimeout);
        assert_eq!(cs.track_state(), TrackState::Unknown);
        assert_eq!(counters.value("TrackOpenTimeout"), 1);
    }

    #[test]
    fn test_sensor_read_closes_track_and_unlights() {
        let sim = CoreBoardSim::new();
        let (cs, _) = system(&sim);
        sim.set_picker_input(PickerInput::Sensor3, true);

        let read = cs.read_picker_sensors();
        assert!(read.success());
        assert_eq!(read.presence_count(), 1);

        let sent = sim.sent().commands();
        let close = sent.iter().position(|c| c == "TRACK CLOSE").unwrap();
        let on = sent.iter().position(|c| c == "SENSOR ON").unwrap();
        let inputs = sent.iter().position(|c| c == "INPUTS").unwrap();
        assert!(close < on && on < inputs);
        assert_eq!(sent.last().map(String::as_str), Some("SENSOR OFF"));

        // Track already closed, no second close
        sim.sent().clear();
        cs.read_picker_sensors();
        assert!(!sim.sent().contains("TRACK CLOSE"));
    }

    #[test]
    fn test_sensor_read_track_failure() {
        let sim = CoreBoardSim::new();
        let (cs, _) = system(&sim);
        sim.stall("TRACK CLOSE");

        let read = cs.read_picker_sensors();
        assert_eq!(read.error(), ErrorCode::TrackCloseTimeout);
        assert!(!sim.sent().contains("SENSOR ON"));
    }

    #[test]
    fn test_finger_counters() {
        let sim = CoreBoardSim::new();
        let (cs, counters) = system(&sim);
        sim.stall("GRIPPER CLOSE");

        assert!(!cs.set_finger(GripperFingerState::Closed).success());
        assert_eq!(counters.value("FingerCloseTimeout"), 1);
        assert_eq!(sim.sent().count("GRIPPER CLOSE"), 2);
    }

    #[test]
    fn test_center_order() {
        let sim = CoreBoardSim::new();
        let (cs, _) = system(&sim);

        assert_eq!(cs.center(CenterDiskMethod::DrumAndBack), ErrorCode::Success);
        let sent = sim.sent().commands();
        let p1 = sent.iter().position(|c| c == "ROLLER POS1").unwrap();
        let p5 = sent.iter().position(|c| c == "ROLLER POS5").unwrap();
        assert!(p1 < p5);

        sim.stall("ROLLER POS3");
        assert_eq!(cs.center(CenterDiskMethod::DrumAndFront), ErrorCode::RollerToPos3Timeout);
    }

    #[test]
    fn test_lifter_operations() {
        let sim = CoreBoardSim::new();
        let (cs, counters) = system(&sim);

        assert_eq!(cs.engage_qlm(&FailingHomer), ErrorCode::HomeXTimeout);
        assert!(!sim.sent().contains("QLM ENGAGE"));

        assert_eq!(cs.engage_qlm_unhomed(), ErrorCode::Success);

        sim.stall("QLM DISENGAGE");
        assert_eq!(cs.disengage_qlm_unhomed(), ErrorCode::Timeout);
        assert_eq!(counters.value("QlmDisengageTimeout"), 1);
    }

    #[test]
    fn test_lifter_operations_home_x() {
        let sim = CoreBoardSim::new();
        let (cs, _) = system(&sim);
        let homer = RecordingHomer(std::cell::RefCell::new(Vec::new()));

        assert_eq!(cs.engage_qlm(&homer), ErrorCode::Success);
        assert_eq!(cs.disengage_qlm(&homer), ErrorCode::Success);

        assert_eq!(*homer.0.borrow(), vec![Axis::X, Axis::X]);
        assert!(sim.sent().contains("QLM ENGAGE"));
        assert!(sim.sent().contains("QLM DISENGAGE"));
    }
}
