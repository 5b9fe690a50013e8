//! # Simulated hardware
//!
//! In-memory stand-ins for the I/O boards and the Arcus motion controller. Both are built on
//! [`ScriptedChannel`], so everything above the channel runs unchanged. They back the unit tests
//! and the `--sim` mode of the executable.
//!
//! The board simulation keeps the input banks of the picker and aux boards. Actuator commands
//! update the matching inputs when they complete, and a command can be stalled (its status bit
//! stays set so the executor times out) or made to fail at the channel. Extra effects are attached
//! with [`CoreBoardSim::on_command`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use comms_if::sim::{ScriptedChannel, SentLog};
use comms_if::{AddressSelector, ChannelError, ChannelResponse};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

// Internal
use crate::control_system::{ControlSystem, CoreBoard};
use crate::core_cmd::{CoreCommandExecutor, STATUS_QUERY};
use crate::counters::PersistentCounters;
use crate::motion::{
    ArcusController, Axis, DeviceResetter, DoorSensor, DoorSensorResult, MotionErrorLog,
};
use crate::params::HalParams;
use crate::runtime::SimRuntime;
use crate::sensors::{AuxInput, InputBank, PickerInput, INPUT_COUNT};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of bits in the status reply.
const STATUS_BITS: usize = 6;

/// Digits before the separator in an inputs reply.
const INPUTS_FIRST_GROUP: usize = 16;

/// Status reported by a motor which is still moving.
const MOTOR_RUNNING_STATUS: &str = "4";

const SELECTORS: [AddressSelector; 4] = [
    AddressSelector::H001,
    AddressSelector::H002,
    AddressSelector::H101,
    AddressSelector::H555,
];

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Effect run when a command completes.
pub type CommandHook = Box<dyn FnMut(&mut SimInputs) + Send>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Input banks of the simulated boards.
#[derive(Debug, Clone)]
pub struct SimInputs {
    picker: [bool; INPUT_COUNT],
    aux: [bool; INPUT_COUNT],
}

/// Simulated picker, aux and serial boards behind one channel.
pub struct CoreBoardSim {
    state: Arc<Mutex<BoardState>>,
    log: SentLog,
    runtime: Arc<SimRuntime>,
}

struct BoardState {
    selected: Option<AddressSelector>,
    busy: [bool; STATUS_BITS],
    stalled: HashSet<String>,
    failing: HashSet<String>,
    unresponsive: HashSet<AddressSelector>,
    inputs: SimInputs,
    hooks: Vec<(String, CommandHook)>,
}

/// Simulated Arcus controller with absolute X and Y positions.
pub struct ArcusSim {
    state: Arc<Mutex<ArcusState>>,
    log: SentLog,
    runtime: Arc<SimRuntime>,
}

#[derive(Debug, Default)]
struct ArcusState {
    x: i32,
    y: i32,
    status_x: VecDeque<String>,
    status_y: VecDeque<String>,
    hold_x: bool,
    hold_y: bool,
    motor_error: VecDeque<String>,
    unresponsive: bool,
    limit_bits: i32,
    resets: usize,
}

/// Driver reset which brings an unresponsive simulated controller back.
struct SimResetter {
    state: Arc<Mutex<ArcusState>>,
}

/// Door sensor with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedDoor(pub DoorSensorResult);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimInputs {
    pub fn picker(&self, input: PickerInput) -> bool {
        self.picker[input.index()]
    }

    pub fn set_picker(&mut self, input: PickerInput, active: bool) {
        self.picker[input.index()] = active;
    }

    pub fn aux(&self, input: AuxInput) -> bool {
        self.aux[input.index()]
    }

    pub fn set_aux(&mut self, input: AuxInput, active: bool) {
        self.aux[input.index()] = active;
    }

    /// Clear all six presence sensors.
    pub fn clear_presence(&mut self) {
        for s in PickerInput::SENSORS.iter() {
            self.set_picker(*s, false);
        }
    }

    /// Set the presence sensors of a disk sitting across `sensors`.
    pub fn set_presence(&mut self, sensors: &[PickerInput]) {
        self.clear_presence();
        for s in sensors {
            self.set_picker(*s, true);
        }
    }
}

impl Default for SimInputs {
    /// Arm retracted, vend door closed, QLM lifter down.
    fn default() -> Self {
        let mut inputs = Self {
            picker: [false; INPUT_COUNT],
            aux: [false; INPUT_COUNT],
        };
        inputs.set_picker(PickerInput::Retract, true);
        inputs.set_aux(AuxInput::VendDoorClosed, true);
        inputs.set_aux(AuxInput::QlmDown, true);
        inputs
    }
}

impl CoreBoardSim {
    pub fn new() -> Self {
        Self::with_runtime(Arc::new(SimRuntime::new()))
    }

    /// Create a board simulation running on an existing clock.
    pub fn with_runtime(runtime: Arc<SimRuntime>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState {
                selected: None,
                busy: [false; STATUS_BITS],
                stalled: HashSet::new(),
                failing: HashSet::new(),
                unresponsive: HashSet::new(),
                inputs: SimInputs::default(),
                hooks: Vec::new(),
            })),
            log: SentLog::default(),
            runtime,
        }
    }

    /// Every selector and command sent to the boards.
    pub fn sent(&self) -> SentLog {
        self.log.clone()
    }

    pub fn runtime(&self) -> Arc<SimRuntime> {
        self.runtime.clone()
    }

    /// A new channel onto the simulated boards.
    pub fn channel(&self) -> ScriptedChannel {
        let state = self.state.clone();
        ScriptedChannel::with_log("SIM-CORE", self.log.clone(), move |cmd| {
            let mut s = lock(&state);
            s.respond(cmd)
        })
    }

    pub fn core_board(&self, params: Arc<HalParams>) -> CoreBoard {
        let executor = CoreCommandExecutor::new(
            Box::new(self.channel()),
            self.runtime.clone(),
            params.timing.selector_timeout_ms,
            params.timing.command_wait_ms,
            params.behaviour.enable_command_trace,
        );
        CoreBoard::new(executor, self.runtime.clone(), params)
    }

    pub fn control_system(
        &self,
        params: Arc<HalParams>,
        counters: Arc<dyn PersistentCounters>,
    ) -> ControlSystem {
        ControlSystem::new(
            self.core_board(params.clone()),
            self.runtime.clone(),
            params,
            counters,
        )
    }

    /// Keep the status bit of `command` set, so that it never completes.
    pub fn stall(&self, command: &str) {
        lock(&self.state).stalled.insert(command.to_string());
    }

    pub fn release(&self, command: &str) {
        lock(&self.state).stalled.remove(command);
    }

    /// Make the exchange of `command` fail at the channel.
    pub fn fail_command(&self, command: &str) {
        lock(&self.state).failing.insert(command.to_string());
    }

    pub fn set_picker_input(&self, input: PickerInput, active: bool) {
        lock(&self.state).inputs.set_picker(input, active);
    }

    pub fn set_aux_input(&self, input: AuxInput, active: bool) {
        lock(&self.state).inputs.set_aux(input, active);
    }

    pub fn picker_input(&self, input: PickerInput) -> bool {
        lock(&self.state).inputs.picker(input)
    }

    pub fn aux_input(&self, input: AuxInput) -> bool {
        lock(&self.state).inputs.aux(input)
    }

    /// Run `f` on the input banks.
    pub fn update_inputs<F: FnOnce(&mut SimInputs)>(&self, f: F) {
        f(&mut lock(&self.state).inputs);
    }

    /// Make a board stop answering its selector.
    pub fn set_unresponsive(&self, selector: AddressSelector, unresponsive: bool) {
        let mut s = lock(&self.state);
        if unresponsive {
            s.unresponsive.insert(selector);
        } else {
            s.unresponsive.remove(&selector);
        }
    }

    /// Run `hook` each time `command` completes, after its own effect on the inputs.
    pub fn on_command<F>(&self, command: &str, hook: F)
    where
        F: FnMut(&mut SimInputs) + Send + 'static,
    {
        lock(&self.state)
            .hooks
            .push((command.to_string(), Box::new(hook)));
    }
}

impl Default for CoreBoardSim {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    fn respond(&mut self, cmd: &str) -> ChannelResponse {
        if let Some(selector) = SELECTORS.iter().find(|s| s.as_str() == cmd) {
            if self.unresponsive.contains(selector) {
                return ChannelResponse::failed(ChannelError::Timeout(5000));
            }
            self.selected = Some(*selector);
            return reply("OK");
        }

        if cmd == STATUS_QUERY {
            let bits: String = self.busy.iter().map(|b| if *b { '1' } else { '0' }).collect();
            return reply(&format!("{} OK", bits));
        }

        if self.failing.contains(cmd) {
            return ChannelResponse::failed(ChannelError::Timeout(8000));
        }

        match cmd {
            "INPUTS" => {
                let bank = match self.selected {
                    Some(AddressSelector::H002) => &self.inputs.aux,
                    _ => &self.inputs.picker,
                };
                return reply(&format_inputs(bank));
            }
            "VERSION" => {
                let board = match self.selected {
                    Some(AddressSelector::H002) => "AUX",
                    Some(AddressSelector::H101) => "SER",
                    _ => "PCB",
                };
                return reply(&format!("{} 1.0 OK", board));
            }
            _ => (),
        }

        if let Some(bit) = status_bit(cmd) {
            if self.stalled.contains(cmd) {
                self.busy[bit] = true;
                return reply("OK");
            }
            self.busy[bit] = false;
        }

        apply_effect(cmd, &mut self.inputs);
        let inputs = &mut self.inputs;
        for (c, hook) in self.hooks.iter_mut() {
            if c == cmd {
                hook(inputs);
            }
        }

        reply("OK")
    }
}

impl ArcusSim {
    pub fn new() -> Self {
        Self::with_runtime(Arc::new(SimRuntime::new()))
    }

    pub fn with_runtime(runtime: Arc<SimRuntime>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ArcusState::default())),
            log: SentLog::default(),
            runtime,
        }
    }

    pub fn sent(&self) -> SentLog {
        self.log.clone()
    }

    pub fn runtime(&self) -> Arc<SimRuntime> {
        self.runtime.clone()
    }

    /// A new channel onto the simulated controller.
    pub fn channel(&self) -> ScriptedChannel {
        let state = self.state.clone();
        ScriptedChannel::with_log("SIM-ARCUS", self.log.clone(), move |cmd| {
            let mut s = lock(&state);
            s.respond(cmd)
        })
    }

    pub fn controller(&self, params: Arc<HalParams>, door: Arc<dyn DoorSensor>) -> ArcusController {
        ArcusController::new(
            Box::new(self.channel()),
            self.runtime.clone(),
            params,
            door,
            self.resetter(),
            MotionErrorLog::null(),
        )
    }

    /// Driver reset which brings the simulated controller back when it is unresponsive.
    pub fn resetter(&self) -> Box<dyn DeviceResetter> {
        Box::new(SimResetter {
            state: self.state.clone(),
        })
    }

    /// Queue replies to the status query of `axis`. Once drained the motor reports stopped.
    pub fn queue_status(&self, axis: Axis, replies: &[&str]) {
        let mut s = lock(&self.state);
        let queue = match axis {
            Axis::X => &mut s.status_x,
            _ => &mut s.status_y,
        };
        queue.extend(replies.iter().map(|r| r.to_string()));
    }

    /// Report `axis` as running on every status query.
    pub fn hold_running(&self, axis: Axis, running: bool) {
        let mut s = lock(&self.state);
        match axis {
            Axis::X => s.hold_x = running,
            _ => s.hold_y = running,
        }
    }

    /// Queue replies to the Y motor error query. Once drained no error is reported.
    pub fn queue_motor_error(&self, replies: &[&str]) {
        lock(&self.state)
            .motor_error
            .extend(replies.iter().map(|r| r.to_string()));
    }

    pub fn set_unresponsive(&self, unresponsive: bool) {
        lock(&self.state).unresponsive = unresponsive;
    }

    pub fn set_position(&self, x: i32, y: i32) {
        let mut s = lock(&self.state);
        s.x = x;
        s.y = y;
    }

    pub fn position(&self) -> (i32, i32) {
        let s = lock(&self.state);
        (s.x, s.y)
    }

    /// Set the limit bits reported in the status dump.
    pub fn set_limit_bits(&self, bits: i32) {
        lock(&self.state).limit_bits = bits;
    }

    /// Number of driver resets so far.
    pub fn resets(&self) -> usize {
        lock(&self.state).resets
    }
}

impl Default for ArcusSim {
    fn default() -> Self {
        Self::new()
    }
}

impl ArcusState {
    fn respond(&mut self, cmd: &str) -> ChannelResponse {
        if self.unresponsive {
            return ChannelResponse::failed(ChannelError::Timeout(5000));
        }

        let text = match cmd {
            "MSTX" => motor_status(self.hold_x, &mut self.status_x),
            "MSTY" => motor_status(self.hold_y, &mut self.status_y),
            "MIOY" => self.motor_error.pop_front().unwrap_or_else(|| "0".into()),
            "EX" => self.x.to_string(),
            "PY" => self.y.to_string(),
            "???" => {
                let mut fields = vec!["0".to_string(); 28];
                fields[13] = format!("{}.", self.limit_bits);
                fields.join(",")
            }
            "HOMEX-" | "EX=0" | "PX=0" => {
                self.x = 0;
                "OK".into()
            }
            "HOMEY+" | "EY=0" | "PY=0" => {
                self.y = 0;
                "OK".into()
            }
            _ => {
                self.apply_move(cmd);
                "OK".into()
            }
        };

        ChannelResponse::ok(format!("{}\r\x04", text).into_bytes())
    }

    /// Apply `X{n}`, `Y{n}` or `Y{y}X{x}` as an absolute move.
    fn apply_move(&mut self, cmd: &str) {
        if let Some(rest) = cmd.strip_prefix('Y') {
            let (y, x) = match rest.find('X') {
                Some(i) => (&rest[..i], Some(&rest[i + 1..])),
                None => (rest, None),
            };
            if let Ok(y) = y.parse() {
                self.y = y;
            }
            if let Some(Ok(x)) = x.map(str::parse) {
                self.x = x;
            }
        } else if let Some(rest) = cmd.strip_prefix('X') {
            if let Ok(x) = rest.parse() {
                self.x = x;
            }
        }
    }
}

impl DeviceResetter for SimResetter {
    fn reset_driver(&self) -> bool {
        let mut s = lock(&self.state);
        s.unresponsive = false;
        s.resets += 1;
        true
    }
}

impl DoorSensor for FixedDoor {
    fn query(&self) -> DoorSensorResult {
        self.0
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn reply(text: &str) -> ChannelResponse {
    ChannelResponse::ok(format!("{}\r\n", text).into_bytes())
}

fn motor_status(hold: bool, queue: &mut VecDeque<String>) -> String {
    if hold {
        return MOTOR_RUNNING_STATUS.into();
    }
    queue.pop_front().unwrap_or_else(|| "0".into())
}

/// Status bit of a polled command.
fn status_bit(cmd: &str) -> Option<usize> {
    match cmd {
        "GRIPPER CLOSE" | "GRIPPER OPEN" | "GRIPPER RENT" => Some(0),
        "ARM EXTEND" | "ARM RETRACT" => Some(1),
        c if c.starts_with("ROLLER POS") => Some(2),
        "TRACK OPEN" | "TRACK CLOSE" => Some(3),
        "VEND RENT" | "VEND CLOSE" => Some(4),
        "QLM ENGAGE" | "QLM DISENGAGE" => Some(5),
        _ => None,
    }
}

fn apply_effect(cmd: &str, inputs: &mut SimInputs) {
    match cmd {
        "ARM EXTEND" => {
            inputs.set_picker(PickerInput::Extend, true);
            inputs.set_picker(PickerInput::Retract, false);
        }
        "ARM RETRACT" => {
            inputs.set_picker(PickerInput::Extend, false);
            inputs.set_picker(PickerInput::Retract, true);
        }
        "GRIPPER RENT" => inputs.set_picker(PickerInput::FingerRent, true),
        "GRIPPER OPEN" | "GRIPPER CLOSE" => inputs.set_picker(PickerInput::FingerRent, false),
        "VEND RENT" => {
            inputs.set_aux(AuxInput::VendDoorRent, true);
            inputs.set_aux(AuxInput::VendDoorClosed, false);
        }
        "VEND CLOSE" => {
            inputs.set_aux(AuxInput::VendDoorRent, false);
            inputs.set_aux(AuxInput::VendDoorClosed, true);
        }
        "QLM ENGAGE" => {
            inputs.set_aux(AuxInput::QlmUp, true);
            inputs.set_aux(AuxInput::QlmDown, false);
        }
        "QLM DISENGAGE" => {
            inputs.set_aux(AuxInput::QlmUp, false);
            inputs.set_aux(AuxInput::QlmDown, true);
        }
        _ => (),
    }
}

/// Format an input bank the way the boards do: sixteen digits, a space, four digits, then `R`.
fn format_inputs(bank: &[bool; INPUT_COUNT]) -> String {
    let digits: String = bank.iter().map(|b| if *b { '1' } else { '0' }).collect();
    format!(
        "{} {}R OK",
        &digits[..INPUTS_FIRST_GROUP],
        &digits[INPUTS_FIRST_GROUP..]
    )
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::CommandChannel;
    use crate::sensors::decode_validated;

    #[test]
    fn test_inputs_reply_layout() {
        let mut inputs = SimInputs::default();
        inputs.set_picker(PickerInput::Sensor1, true);

        let text = format_inputs(&inputs.picker);
        assert_eq!(text, "1000000100000000 0000R OK");
        assert!(decode_validated(&text).is_ok());
    }

    #[test]
    fn test_stalled_command_stays_busy() {
        let sim = CoreBoardSim::new();
        sim.stall("TRACK OPEN");
        let mut chan = sim.channel();

        chan.send_recv("H001", 100);
        chan.send_recv("TRACK OPEN", 100);
        assert_eq!(chan.send_recv("S", 100).text(), "000100 OK\r\n");

        sim.release("TRACK OPEN");
        chan.send_recv("TRACK OPEN", 100);
        assert_eq!(chan.send_recv("S", 100).text(), "000000 OK\r\n");
    }

    #[test]
    fn test_hooks_run_after_effect() {
        let sim = CoreBoardSim::new();
        sim.on_command("ROLLER IN", |i| i.set_presence(&[PickerInput::Sensor1]));
        let mut chan = sim.channel();

        chan.send_recv("ROLLER IN", 100);
        assert!(sim.picker_input(PickerInput::Sensor1));
        chan.send_recv("ARM EXTEND", 100);
        assert!(sim.picker_input(PickerInput::Extend));
        assert!(!sim.picker_input(PickerInput::Retract));
    }

    #[test]
    fn test_arcus_moves() {
        let sim = ArcusSim::new();
        let mut chan = sim.channel();

        chan.send_recv("Y-300X150", 100);
        assert_eq!(sim.position(), (150, -300));
        chan.send_recv("X20", 100);
        assert_eq!(sim.position(), (20, -300));
        chan.send_recv("HOMEY+", 100);
        assert_eq!(sim.position(), (20, 0));
        assert_eq!(chan.send_recv("EX", 100).text(), "20\r\x04");
    }
}
