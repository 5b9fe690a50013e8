//! # Arcus motion controller
//!
//! Text protocol driver for the Arcus stepper controller. Commands are short ASCII instructions,
//! replies are terminated by CR and EOT. Every absolute move is made twice: a coarse pass at the
//! normal speed profile, then an error correction pass at low speed with a tightened tolerance.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use comms_if::{CommandChannel, CR};
use log::{debug, error, info, log_enabled, Level};
use std::sync::Arc;

// Internal
use super::{
    parse_position, Axis, ControllerPosition, DeviceResetter, DoorSensor, DoorSensorResult,
    LimitResponse, MotionController, MotionErrorLog, MotorWaitDecoder, MoveMode, MoveOperation,
    MoveTarget,
};
use crate::error::ErrorCode;
use crate::params::HalParams;
use crate::runtime::{ExecutionTimer, Runtime};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const HALT_MOTOR_COMMAND: &str = "RSTOP";
const NOP_COMMAND: &str = "NOP";

/// Timeout of the settling waits around a home.
///
/// Units: milliseconds
const HOME_SETTLE_TIMEOUT_MS: u64 = 5000;

/// Units: milliseconds
const HOME_X_TIMEOUT_MS: u64 = 64_000;

/// Units: milliseconds
const HOME_Y_TIMEOUT_MS: u64 = 60_000;

/// Units: milliseconds
const DROPBACK_TIMEOUT_MS: u64 = 6000;

/// Time given to the device after a driver reset.
///
/// Units: milliseconds
const DRIVER_RESET_SETTLE_MS: u64 = 3000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Motion controller driven over the Arcus text protocol.
pub struct ArcusController {
    channel: Box<dyn CommandChannel>,
    runtime: Arc<dyn Runtime>,
    params: Arc<HalParams>,
    door: Arc<dyn DoorSensor>,
    resetter: Box<dyn DeviceResetter>,
    error_log: MotionErrorLog,

    init_commands: Vec<String>,
    error_correct_preamble: Vec<String>,
    move_preamble: Vec<String>,
}

/// Driver reset which gives the device time to settle. The port is reopened by the following
/// startup.
pub struct SettleResetter {
    runtime: Arc<dyn Runtime>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArcusController {
    pub fn new(
        channel: Box<dyn CommandChannel>,
        runtime: Arc<dyn Runtime>,
        params: Arc<HalParams>,
        door: Arc<dyn DoorSensor>,
        resetter: Box<dyn DeviceResetter>,
        error_log: MotionErrorLog,
    ) -> Self {
        let mut controller = Self {
            channel,
            runtime,
            params,
            door,
            resetter,
            error_log,
            init_commands: Vec::new(),
            error_correct_preamble: Vec::new(),
            move_preamble: Vec::new(),
        };
        controller.compute_move_commands();
        info!("[ArcusMotionController] created");
        controller
    }

    fn compute_move_commands(&mut self) {
        info!("Re-computing move commands.");
        let motion = &self.params.motion;

        self.init_commands = vec![
            "$".into(),
            "$".into(),
            "$".into(),
            HALT_MOTOR_COMMAND.into(),
            "MECLEARX".into(),
            "MECLEARY".into(),
            "MECLEARZ".into(),
            "MECLEARU".into(),
            "I1=4204544".into(),
            "I2=3136".into(),
            format!("I3={}", motion.gear_x.encoder_ratio()),
            "I4=0".into(),
            "I5=0".into(),
            "I6=0".into(),
            "I7=10".into(),
            "I8=0".into(),
            "I9=2000".into(),
            "I10=0".into(),
            "I11=2".into(),
        ];

        self.error_correct_preamble = vec![
            format!("LSPD {}", motion.gear_x.step_ratio() as i32 * 100),
            format!(
                "I7={}",
                if self.params.behaviour.widen_arcus_tolerance {
                    5
                } else {
                    2
                }
            ),
        ];

        let speed = &motion.move_xy_speed;
        self.move_preamble = vec![
            "$".into(),
            HALT_MOTOR_COMMAND.into(),
            "MECLEARY".into(),
            "MECLEARX".into(),
            speed.high_speed_command(&motion.gear_y),
            speed.low_speed_command(&motion.gear_y),
            speed.acceleration_command(),
            "ABS".into(),
            "I7=15".into(),
            "I2=3136".into(),
        ];
    }

    /// Send one instruction and return the reply up to its first CR, `None` on a channel failure.
    pub fn send_recv_raw(&mut self, command: &str) -> Option<String> {
        if command.is_empty() || command.eq_ignore_ascii_case(NOP_COMMAND) {
            return Some("OK".into());
        }

        let trace = log_enabled!(Level::Debug) || self.params.behaviour.enable_arcus_trace;
        let response = self
            .channel
            .send_recv(command, self.params.timing.motion_controller_timeout_ms);

        if !response.comm_ok {
            let cause = response.error.map(|e| e.to_string()).unwrap_or_default();
            info!("ArcusMotionControl.SendCommand(): channel error returned {}", cause);
            self.error_log.write(&format!(
                "[ArcusMotionController] Send command {}; error = {}",
                command,
                ErrorCode::ArcusNotResponsive
            ));
            if trace {
                self.error_log.write(&format!(
                    "ArcusMotionController: Instruction={}, Error = {}",
                    command,
                    ErrorCode::ArcusNotResponsive
                ));
            }
            return None;
        }

        let end = response
            .index_of(CR)
            .unwrap_or_else(|| response.raw.len().saturating_sub(1));
        let reply = String::from_utf8_lossy(&response.raw[..end]).into_owned();

        if trace {
            self.error_log.write(&format!(
                "ArcusMotionController: Instruction={}, Response={}",
                command, reply
            ));
        }
        Some(reply)
    }

    /// Send each command in turn, stopping at the first channel failure.
    fn send_all(&mut self, commands: &[String]) -> bool {
        commands.iter().all(|c| self.send_recv_raw(c).is_some())
    }

    fn send_checked(&mut self, command: &str) -> Result<(), ErrorCode> {
        match self.send_recv_raw(command) {
            Some(_) => Ok(()),
            None => Err(ErrorCode::ArcusNotResponsive),
        }
    }

    fn halt_motor(&mut self) {
        self.send_recv_raw(HALT_MOTOR_COMMAND);
    }

    fn write_to_log(&self, msg: &str) {
        self.error_log.write(msg);
    }

    // ---- WAITING ----

    /// Poll the motor status of `axis` until it stops, the door opens or `timeout_ms` elapses.
    fn wait_motor(&mut self, timeout_ms: u64, axis: Axis, operation: MoveOperation) -> ErrorCode {
        let pause = self.params.timing.arcus_motor_query_pause_ms;
        let command = format!("MST{}", axis);
        let timer = ExecutionTimer::start(self.runtime.clone());

        loop {
            let door = self.door.query();
            if door != DoorSensorResult::Ok {
                self.write_to_log(&format!(
                    "Door sensor query returned {}: halting motion.",
                    door
                ));
                self.halt_motor();
                return ErrorCode::DoorOpen;
            }

            let response = match self.send_recv_raw(&command) {
                Some(r) => r,
                None => return ErrorCode::ArcusNotResponsive,
            };

            let (decoded, running) = MotorWaitDecoder::decode(&response, operation);
            if !running {
                if !decoded.error.is_success() {
                    let msg = decoded.format_error(axis, &response);
                    error!("{}", msg);
                    self.write_to_log(&msg);
                }
                return decoded.error;
            }

            self.runtime.spin_wait(pause);

            if timer.elapsed_ms() >= timeout_ms {
                let msg = decoded.format_error(axis, &response);
                error!("{}", msg);
                self.write_to_log(&msg);
                self.halt_motor();
                return ErrorCode::Timeout;
            }
        }
    }

    fn wait(&mut self, timeout_ms: u64, axis: Axis) -> Result<(), ErrorCode> {
        self.wait_motor(timeout_ms, axis, MoveOperation::Normal)
            .into_result()
    }

    // ---- HOMING ----

    fn home_x(&mut self) -> Result<(), ErrorCode> {
        let motion = &self.params.motion;
        let speed = &motion.init_x_speed;
        let preamble = vec![
            "$".to_string(),
            HALT_MOTOR_COMMAND.into(),
            "MECLEARX".into(),
            "I1=4204544".into(),
            speed.high_speed_command(&motion.gear_x),
            speed.low_speed_command(&motion.gear_x),
            speed.acceleration_command(),
            "INC".into(),
            "EX=0".into(),
            "PX=0".into(),
            "I2=3072".into(),
        ];

        if !self.send_all(&preamble) {
            return Err(ErrorCode::ArcusNotResponsive);
        }
        self.wait(HOME_SETTLE_TIMEOUT_MS, Axis::X)?;

        self.send_checked("HOMEX-")?;
        self.wait(HOME_X_TIMEOUT_MS, Axis::X)?;

        self.send_checked("I2=3136")?;
        self.send_checked("I7=15")?;
        self.wait(HOME_SETTLE_TIMEOUT_MS, Axis::X)?;

        self.send_checked("MECLEARX")
    }

    fn home_y(&mut self) -> Result<(), ErrorCode> {
        let motion = &self.params.motion;
        let speed = &motion.init_y_speed;
        let drop_back = motion.home_y_drop_back;
        let preamble = vec![
            "$".to_string(),
            HALT_MOTOR_COMMAND.into(),
            "MECLEARY".into(),
            speed.high_speed_command(&motion.gear_y),
            speed.low_speed_command(&motion.gear_y),
            speed.acceleration_command(),
            "INC".into(),
            "EY=0".into(),
            "PY=0".into(),
        ];

        if !self.send_all(&preamble) {
            return Err(ErrorCode::ArcusNotResponsive);
        }

        if drop_back != 0 {
            let distance = -drop_back.abs();
            self.send_checked("MIOY")?;
            self.send_checked(&format!("Y{}", distance))?;
            self.wait_motor(DROPBACK_TIMEOUT_MS, Axis::Y, MoveOperation::Dropback)
                .into_result()?;
            self.send_checked("MECLEARY")?;
        }

        self.send_checked("HOMEY+")?;
        self.wait(HOME_Y_TIMEOUT_MS, Axis::Y)
    }

    // ---- MOVES ----

    fn move_absolute(&mut self, target: &MoveTarget) -> ErrorCode {
        let preamble = self.move_preamble.clone();
        if !self.send_all(&preamble) {
            return ErrorCode::ArcusNotResponsive;
        }

        let moved = match *target {
            MoveTarget::X(x) => self.move_x(x),
            MoveTarget::Y(y) => self.move_y(y),
            MoveTarget::XY { x, y } => self.move_xy(x, y),
        };
        let result = ErrorCode::from(moved);

        let motor = self.is_motor_errored(Axis::XY);
        if !motor.is_success() {
            return motor;
        }

        if self.params.behaviour.print_encoder_position_after_move {
            let pos = self.read_positions();
            match (pos.x, pos.y) {
                (Some(x), Some(y)) => info!(
                    "MoveAbsoluteInternal: encoder positions (x,y) = {}, {}.",
                    x, y
                ),
                _ => info!("Unable to determine encoder position from ARCUS."),
            }
        }

        result
    }

    fn move_x(&mut self, x: i32) -> Result<(), ErrorCode> {
        let timeout = self.params.timing.move_timeout_ms;
        let command = format!("X{}", x);

        self.send_checked(&command)?;
        self.wait(timeout, Axis::X)?;

        let correct = self.error_correct_preamble.clone();
        if !self.send_all(&correct) {
            return Err(ErrorCode::ArcusNotResponsive);
        }
        self.send_checked(&command)?;
        self.wait(timeout, Axis::X)?;

        self.send_checked("I7=10")
    }

    fn move_y(&mut self, y: i32) -> Result<(), ErrorCode> {
        let timeout = self.params.timing.move_timeout_ms;
        self.send_checked(&format!("Y{}", y))?;
        self.wait(timeout, Axis::Y)
    }

    fn move_xy(&mut self, x: i32, y: i32) -> Result<(), ErrorCode> {
        let timeout = self.params.timing.move_timeout_ms;
        let combined = format!("Y{}X{}", y, x);

        if self.params.behaviour.arcus_smooth_move {
            self.send_checked(&combined)?;
        } else {
            self.send_checked(&format!("X{}", x))?;
            self.send_checked(&format!("Y{}", y))?;
        }
        self.wait(timeout, Axis::Y)?;
        self.wait(timeout, Axis::X)?;

        let correct = self.error_correct_preamble.clone();
        if !self.send_all(&correct) {
            return Err(ErrorCode::ArcusNotResponsive);
        }
        self.send_checked(&combined)?;
        self.wait(timeout, Axis::Y)?;
        self.wait(timeout, Axis::X)?;

        self.send_checked("I7=10")
    }

    // ---- MOTOR ERRORS ----

    /// Clear a transient Y motor error, re-homing Y if one is latched.
    fn clear_y_motor_error(&mut self) -> ErrorCode {
        let status = self.is_motor_errored(Axis::Y);
        if status != ErrorCode::MotorError {
            return status;
        }

        let home = self.home_axis(Axis::Y);
        debug!("ClearYMotorError: home Y returned {}", home);
        self.is_motor_errored(Axis::Y)
    }

    /// Read and clear the Y motor error register. Values 1 to 7 are a latched motor error.
    fn is_motor_errored(&mut self, axis: Axis) -> ErrorCode {
        if axis == Axis::X {
            return ErrorCode::Success;
        }

        let status = self.send_recv_raw("MIOY");
        let cleared = self.send_recv_raw("MECLEARY");

        match (status.and_then(|s| s.trim().parse::<i32>().ok()), cleared) {
            (Some(v), Some(_)) if (1..8).contains(&v) => ErrorCode::MotorError,
            (Some(_), Some(_)) => ErrorCode::Success,
            _ => ErrorCode::ArcusNotResponsive,
        }
    }
}

impl MotionController for ArcusController {
    fn on_startup(&mut self) -> bool {
        if !self.channel.open() {
            error!(
                "[ArcusMotionControl] Unable to open port {}.",
                self.channel.display_name()
            );
            self.channel.close();
            return false;
        }

        let init = self.init_commands.clone();
        for command in init.iter() {
            self.send_recv_raw(command);
        }
        true
    }

    fn on_shutdown(&mut self) -> bool {
        self.channel.close()
    }

    fn read_limits(&mut self) -> LimitResponse {
        let reply = self.send_recv_raw("???");
        let limits = LimitResponse::parse(reply.as_deref());
        if !limits.read_ok() {
            self.write_to_log(&format!(
                "[ReadLimits] The response is incorrect {}",
                reply.as_deref().unwrap_or("NONE")
            ));
        }
        limits
    }

    fn communication_ok(&mut self) -> bool {
        match self.send_recv_raw("$") {
            Some(r) => {
                debug!("Arcus comm ok: command returns {}", r);
                r.starts_with("OK")
            }
            None => false,
        }
    }

    fn read_positions(&mut self) -> ControllerPosition {
        ControllerPosition {
            x: self.send_recv_raw("EX").and_then(|r| parse_position(&r)),
            y: self.send_recv_raw("PY").and_then(|r| parse_position(&r)),
        }
    }

    fn move_to_target(&mut self, target: &MoveTarget) -> ErrorCode {
        let cleared = self.clear_y_motor_error();
        if !cleared.is_success() {
            return cleared;
        }
        self.move_absolute(target)
    }

    fn move_to_vend(&mut self, mode: MoveMode) -> ErrorCode {
        let mut y = self.params.motion.vend_y_position;
        let offset = self.params.motion.vend_position_receive_offset;
        if offset != 0 {
            match mode {
                MoveMode::Put => y += offset,
                MoveMode::Get => y -= offset,
                MoveMode::None => (),
            }
        }

        if self.params.behaviour.query_position_for_vend_move {
            let pos = self.read_positions();
            if pos.read_ok() && pos.y == Some(y) {
                debug!("[ArcusMotionController] Picker currently at position Y = {}", y);
                return ErrorCode::Success;
            }
        }

        let cleared = self.clear_y_motor_error();
        if !cleared.is_success() {
            return cleared;
        }
        self.move_absolute(&MoveTarget::Y(y))
    }

    fn home_axis(&mut self, axis: Axis) -> ErrorCode {
        let result = match axis {
            Axis::X => self.home_x(),
            _ => self.home_y(),
        };
        result.into()
    }

    fn on_reset_device_driver(&mut self) -> bool {
        self.on_shutdown();
        let reset = self.resetter.reset_driver();
        info!(
            "Arcus device reset returned {}",
            reset.to_string().to_ascii_uppercase()
        );
        reset
    }

    fn reconfigure(&mut self, params: Arc<HalParams>) {
        info!("[ArcusMotionControl] On configuration end.");
        self.params = params;
        self.compute_move_commands();
    }
}

impl SettleResetter {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self { runtime }
    }
}

impl DeviceResetter for SettleResetter {
    fn reset_driver(&self) -> bool {
        self.runtime.wait(DRIVER_RESET_SETTLE_MS);
        true
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::motion::MotionControlLimit;
    use crate::sim::{ArcusSim, FixedDoor};

    fn controller(sim: &ArcusSim, params: HalParams) -> ArcusController {
        sim.controller(Arc::new(params), Arc::new(FixedDoor(DoorSensorResult::Ok)))
    }

    fn count_prefix(commands: &[String], prefix: &str) -> usize {
        commands.iter().filter(|c| c.starts_with(prefix)).count()
    }

    #[test]
    fn test_startup_sends_init_list() {
        let sim = ArcusSim::new();
        let mut arcus = controller(&sim, HalParams::default());

        assert!(arcus.on_startup());
        let sent = sim.sent().commands();
        assert_eq!(sent.len(), 19);
        assert_eq!(&sent[..4], &["$", "$", "$", "RSTOP"]);
        assert!(sent.contains(&"I3=13041778".to_string()));
        assert_eq!(sent.last().map(String::as_str), Some("I11=2"));
    }

    #[test]
    fn test_nop_is_not_sent() {
        let sim = ArcusSim::new();
        let mut arcus = controller(&sim, HalParams::default());

        assert_eq!(arcus.send_recv_raw("NOP").as_deref(), Some("OK"));
        assert_eq!(arcus.send_recv_raw("").as_deref(), Some("OK"));
        assert!(sim.sent().commands().is_empty());
    }

    #[test]
    fn test_xy_move_makes_two_passes() {
        let sim = ArcusSim::new();
        let mut arcus = controller(&sim, HalParams::default());

        let r = arcus.move_to_target(&MoveTarget::XY { x: 1200, y: -20000 });
        assert_eq!(r, ErrorCode::Success);
        assert_eq!(sim.position(), (1200, -20000));

        let sent = sim.sent().commands();
        assert_eq!(sim.sent().count("X1200"), 1);
        assert_eq!(sim.sent().count("Y-20000"), 1);
        assert_eq!(sim.sent().count("Y-20000X1200"), 1);
        assert_eq!(count_prefix(&sent, "MSTY"), 2);
        assert_eq!(count_prefix(&sent, "MSTX"), 2);
        assert!(sim.sent().contains("LSPD 800"));
        assert!(sim.sent().contains("I7=2"));
        assert_eq!(sent.iter().rev().find(|c| c.starts_with("I7=")).map(String::as_str), Some("I7=10"));
    }

    #[test]
    fn test_failed_first_pass_skips_correction() {
        let sim = ArcusSim::new();
        sim.queue_status(Axis::Y, &["8"]);
        let mut arcus = controller(&sim, HalParams::default());

        let r = arcus.move_to_target(&MoveTarget::XY { x: 10, y: 20 });
        assert_eq!(r, ErrorCode::UpperLimitError);
        assert!(!sim.sent().contains("Y20X10"));
        assert!(!sim.sent().contains("I7=2"));
    }

    #[test]
    fn test_smooth_move_sends_combined() {
        let sim = ArcusSim::new();
        let mut params = HalParams::default();
        params.behaviour.arcus_smooth_move = true;
        params.behaviour.widen_arcus_tolerance = true;
        let mut arcus = controller(&sim, params);

        assert_eq!(arcus.move_to_target(&MoveTarget::XY { x: 10, y: 20 }), ErrorCode::Success);
        assert_eq!(sim.sent().count("Y20X10"), 2);
        assert!(!sim.sent().contains("X10"));
        assert!(sim.sent().contains("I7=5"));
    }

    #[test]
    fn test_wait_times_out_and_halts() {
        let sim = ArcusSim::new();
        sim.hold_running(Axis::X, true);
        let mut params = HalParams::default();
        params.timing.move_timeout_ms = 1000;
        let mut arcus = controller(&sim, params);

        let r = arcus.move_to_target(&MoveTarget::X(50));
        assert_eq!(r, ErrorCode::Timeout);
        assert!(sim.runtime().now_ms() >= 1000);
        assert!(sim.sent().commands().iter().filter(|c| *c == "RSTOP").count() >= 2);
    }

    #[test]
    fn test_open_door_halts_motion() {
        let sim = ArcusSim::new();
        let mut arcus = sim.controller(
            Arc::new(HalParams::default()),
            Arc::new(FixedDoor(DoorSensorResult::FrontDoor)),
        );

        assert_eq!(arcus.move_to_target(&MoveTarget::Y(100)), ErrorCode::DoorOpen);
        assert!(!sim.sent().contains("MSTY"));
    }

    #[test]
    fn test_unresponsive_controller() {
        let sim = ArcusSim::new();
        sim.set_unresponsive(true);
        let mut arcus = controller(&sim, HalParams::default());

        assert_eq!(arcus.move_to_target(&MoveTarget::Y(100)), ErrorCode::ArcusNotResponsive);
        assert!(!arcus.communication_ok());
        assert!(!arcus.read_positions().read_ok());
        assert!(!arcus.read_limits().read_ok());
    }

    #[test]
    fn test_y_motor_error_rehomes() {
        let sim = ArcusSim::new();
        sim.queue_motor_error(&["3", "0"]);
        let mut arcus = controller(&sim, HalParams::default());

        assert_eq!(arcus.move_to_target(&MoveTarget::Y(-500)), ErrorCode::Success);
        assert!(sim.sent().contains("HOMEY+"));
        assert_eq!(sim.position().1, -500);
    }

    #[test]
    fn test_home_y_dropback_accepts_lower_limit() {
        let sim = ArcusSim::new();
        sim.queue_status(Axis::Y, &["16"]);
        let mut params = HalParams::default();
        params.motion.home_y_drop_back = 400;
        let mut arcus = controller(&sim, params);

        assert_eq!(arcus.home_axis(Axis::Y), ErrorCode::Success);
        let sent = sim.sent().commands();
        let drop = sent.iter().position(|c| c == "Y-400").unwrap();
        let home = sent.iter().position(|c| c == "HOMEY+").unwrap();
        assert!(drop < home);
    }

    #[test]
    fn test_home_y_lower_limit_is_fatal_without_dropback() {
        let sim = ArcusSim::new();
        sim.queue_status(Axis::Y, &["16"]);
        let mut arcus = controller(&sim, HalParams::default());

        assert_eq!(arcus.home_axis(Axis::Y), ErrorCode::LowerLimitError);
    }

    #[test]
    fn test_home_x_sequence() {
        let sim = ArcusSim::new();
        let mut arcus = controller(&sim, HalParams::default());

        assert_eq!(arcus.home_axis(Axis::X), ErrorCode::Success);
        let sent = sim.sent().commands();
        assert!(sent.contains(&"HSPD 24000".to_string()));
        assert!(sent.contains(&"I2=3072".to_string()));
        assert_eq!(sent.last().map(String::as_str), Some("MECLEARX"));
    }

    #[test]
    fn test_vend_move_skipped_when_there() {
        let sim = ArcusSim::new();
        sim.set_position(0, -86200 + 100);
        let mut arcus = controller(&sim, HalParams::default());

        assert_eq!(arcus.move_to_vend(MoveMode::Put), ErrorCode::Success);
        assert!(!sim.sent().commands().iter().any(|c| c.starts_with("Y")));

        assert_eq!(arcus.move_to_vend(MoveMode::Get), ErrorCode::Success);
        assert_eq!(sim.position().1, -86300);
    }

    #[test]
    fn test_limits_and_positions() {
        let sim = ArcusSim::new();
        sim.set_position(120, -400);
        sim.set_limit_bits(16);
        let mut arcus = controller(&sim, HalParams::default());

        let pos = arcus.read_positions();
        assert_eq!((pos.x, pos.y), (Some(120), Some(-400)));

        let limits = arcus.read_limits();
        assert_eq!(limits.is_limit_blocked(MotionControlLimit::Upper), Some(true));
        assert_eq!(limits.is_limit_blocked(MotionControlLimit::Lower), Some(false));
        assert!(arcus.communication_ok());
    }
}
