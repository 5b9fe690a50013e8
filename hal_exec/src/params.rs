//! # HAL parameters
//!
//! Every tunable of the hardware control core. Loaded from `params/hal_exec.toml`; any key missing
//! from the file takes the default listed here, so an empty file describes a standard kiosk.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use comms_if::PortConfig;
use crate::motion::{MotorGear, MotorSpeed};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the hardware abstraction layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HalParams {
    pub ports: PortParams,
    pub timing: TimingParams,
    pub motion: MotionParams,
    pub behaviour: BehaviourParams,
    pub decks: Vec<DeckParams>,
}

/// Serial ports of the two command channels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortParams {
    /// I/O control board port.
    pub controller: PortConfig,

    /// Arcus motion controller port.
    pub motion_controller: PortConfig,
}

/// Timeouts, pauses and spin times.
///
/// Units: milliseconds, unless noted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingParams {
    // ---- CORE COMMANDS ----
    /// Timeout for sending the board address selector.
    pub selector_timeout_ms: u64,

    /// Timeout for the command itself once the board is selected.
    pub command_wait_ms: u64,

    // ---- GRIPPER ----
    /// Duration of a timed push with the closed finger.
    pub push_time_ms: u64,

    /// Duration of the first, short, push when rolling a disk into a slot.
    pub roll_in_extend_time_ms: u64,

    /// Extend timeout used to probe whether a slot is occupied.
    pub test_extend_time_ms: u64,

    /// Extend and retract timeout for the gripper arm.
    pub gripper_arm_extend_retract_timeout_ms: u64,

    /// Extend duration when pulling from the QLM deck.
    pub qlm_extend_time_ms: u64,

    // ---- SENSORS ----
    /// Pause with the sensor bar lit before and after reading the picker sensors.
    pub picker_sensor_spin_time_ms: u64,

    /// Poll period when waiting for a sensor to reach a state.
    pub wait_sensor_pause_ms: u64,

    /// Poll period when waiting for the picker to clear.
    pub clear_sensor_pause_delay_ms: u64,

    /// Default timeout when rolling a disk to a sensor.
    pub default_roll_sensor_timeout_ms: u64,

    /// Time allowed for a user to present a disk at the door.
    pub accept_disk_timeout_ms: u64,

    /// Extra roller time after a pushed out disk clears sensor 4.
    pub push_out_sleep_time_ms: u64,

    // ---- MOTION CONTROLLER ----
    /// Pause between writing to the motion controller and reading its reply.
    pub arcus_write_pause_ms: u64,

    /// Poll period of the motor status query.
    pub arcus_motor_query_pause_ms: u64,

    /// Timeout of a single exchange with the motion controller.
    pub motion_controller_timeout_ms: u64,

    /// Timeout for an axis to reach its target.
    pub move_timeout_ms: u64,
}

/// Motion geometry and speed profiles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    pub gear_x: MotorGear,
    pub gear_y: MotorGear,

    /// Speed profile when homing X.
    pub init_x_speed: MotorSpeed,

    /// Speed profile when homing Y.
    pub init_y_speed: MotorSpeed,

    /// Speed profile for normal moves.
    pub move_xy_speed: MotorSpeed,

    /// Y position of the vend door.
    ///
    /// Units: steps
    pub vend_y_position: i32,

    /// Adjustment of the vend position for put (added) and get (subtracted) moves.
    ///
    /// Units: steps
    pub vend_position_receive_offset: i32,

    /// Signed move away from the Y limit before homing, zero to disable.
    ///
    /// Units: steps
    pub home_y_drop_back: i32,

    /// X distance short of a QLM slot at which the approach move stops.
    ///
    /// Units: steps
    pub qlm_approach_offset: i32,

    /// Y approach offset for the QLM deck, scaled by the Y step ratio.
    pub qlm_y_offset: i32,

    /// Y approach offset for all other decks, scaled by the Y step ratio.
    pub deck_y_offset: i32,
}

/// Policy switches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviourParams {
    // ---- MACHINE ----
    /// Non-zero merchandising mode marks a VMZ machine, which has a front door sensor.
    pub merch_mode: u32,

    pub enable_secure_disk_validator: bool,

    // ---- DIAGNOSTICS ----
    pub enable_command_trace: bool,
    pub enable_arcus_trace: bool,
    pub print_encoder_position_after_move: bool,
    pub track_hardware_corrections: bool,

    // ---- MOTION ----
    pub arcus_smooth_move: bool,
    pub widen_arcus_tolerance: bool,
    pub query_position_for_vend_move: bool,
    pub lower_limit_as_error: bool,
    pub validate_controller_home_status: bool,
    pub restart_controller_during_user_jobs: bool,
    pub clear_picker_on_home: bool,
    pub check_gripper_arm_sensors_on_move: bool,
    pub gripper_rent_on_move: bool,

    // ---- SENSORS ----
    /// Require the strict layout of an inputs response.
    pub validate_inputs_read_response: bool,

    // ---- GRIPPER AND DOOR ----
    pub move_vend_door_to_aux_sensor: bool,
    pub qlm_timed_extend: bool,
    pub additional_put_push: bool,
    pub aggressive_clear_picker_on_put: bool,
    pub track_push_out_failures: bool,

    // ---- INVENTORY ----
    pub mark_duplicates_unknown: bool,
    pub mark_original_matrix_unknown: bool,

    // ---- COUNTS ----
    /// Pull attempts when taking a disk out of a slot.
    pub number_of_pulls: u32,

    /// Removal polls when presenting a disk at the door.
    pub vend_disk_poll_count: u32,

    /// Push attempts when rejecting a disk at the door.
    pub reject_at_door_attempts: u32,
}

/// Geometry of one deck.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeckParams {
    pub number: i32,

    /// Units: steps
    pub y_offset: i32,

    pub is_qlm: bool,
    pub number_of_slots: i32,

    /// Units: steps
    pub slot_width: f64,

    /// Every slot number divisible by this is a sell-thru slot.
    pub sell_thru_slots: Option<i32>,

    /// X offset of a sell-thru slot within its quadrant.
    ///
    /// Units: steps
    pub sell_thru_offset: Option<i32>,

    pub quadrants: Vec<QuadrantParams>,
}

/// A run of slots sharing one X offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuadrantParams {
    /// Units: steps
    pub offset: i32,

    pub start_slot: Option<i32>,
    pub end_slot: Option<i32>,
    pub excluded: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HalParams {
    /// Whether the machine has the VMZ front door.
    pub fn is_vmz_machine(&self) -> bool {
        self.behaviour.merch_mode != 0
    }
}

impl Default for HalParams {
    fn default() -> Self {
        Self {
            ports: PortParams::default(),
            timing: TimingParams::default(),
            motion: MotionParams::default(),
            behaviour: BehaviourParams::default(),
            decks: Vec::new(),
        }
    }
}

impl Default for PortParams {
    fn default() -> Self {
        Self {
            controller: PortConfig {
                port_name: "COM1".into(),
                baud_rate: 9600,
            },
            motion_controller: PortConfig {
                port_name: "COM3".into(),
                baud_rate: 115200,
            },
        }
    }
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            selector_timeout_ms: 5000,
            command_wait_ms: 8000,
            push_time_ms: 350,
            roll_in_extend_time_ms: 120,
            test_extend_time_ms: 800,
            gripper_arm_extend_retract_timeout_ms: 2000,
            qlm_extend_time_ms: 1500,
            picker_sensor_spin_time_ms: 20,
            wait_sensor_pause_ms: 100,
            clear_sensor_pause_delay_ms: 300,
            default_roll_sensor_timeout_ms: 6000,
            accept_disk_timeout_ms: 15000,
            push_out_sleep_time_ms: 50,
            arcus_write_pause_ms: 20,
            arcus_motor_query_pause_ms: 75,
            motion_controller_timeout_ms: 5000,
            move_timeout_ms: 30000,
        }
    }
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            gear_x: MotorGear::new(10.0, 398, 114, 8),
            gear_y: MotorGear::new(20.0, 0, 0, 4),
            init_x_speed: MotorSpeed::new(600, 3000, 300),
            init_y_speed: MotorSpeed::new(800, 2400, 300),
            move_xy_speed: MotorSpeed::new(500, 15000, 500),
            vend_y_position: -86200,
            vend_position_receive_offset: 100,
            home_y_drop_back: 0,
            qlm_approach_offset: 500,
            qlm_y_offset: 50,
            deck_y_offset: 50,
        }
    }
}

impl Default for BehaviourParams {
    fn default() -> Self {
        Self {
            merch_mode: 0,
            enable_secure_disk_validator: false,
            enable_command_trace: false,
            enable_arcus_trace: false,
            print_encoder_position_after_move: false,
            track_hardware_corrections: true,
            arcus_smooth_move: false,
            widen_arcus_tolerance: false,
            query_position_for_vend_move: true,
            lower_limit_as_error: false,
            validate_controller_home_status: true,
            restart_controller_during_user_jobs: true,
            clear_picker_on_home: false,
            check_gripper_arm_sensors_on_move: true,
            gripper_rent_on_move: true,
            validate_inputs_read_response: true,
            move_vend_door_to_aux_sensor: true,
            qlm_timed_extend: false,
            additional_put_push: false,
            aggressive_clear_picker_on_put: false,
            track_push_out_failures: true,
            mark_duplicates_unknown: true,
            mark_original_matrix_unknown: true,
            number_of_pulls: 2,
            vend_disk_poll_count: 15,
            reject_at_door_attempts: 10,
        }
    }
}

impl Default for DeckParams {
    fn default() -> Self {
        Self {
            number: 1,
            y_offset: -18760,
            is_qlm: false,
            number_of_slots: 90,
            slot_width: 166.6667,
            sell_thru_slots: None,
            sell_thru_offset: None,
            quadrants: Vec::new(),
        }
    }
}

impl Default for QuadrantParams {
    fn default() -> Self {
        Self {
            offset: 780,
            start_slot: None,
            end_slot: None,
            excluded: false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let params: HalParams = util::params::parse(
            r#"
            [timing]
            move_timeout_ms = 12000

            [behaviour]
            merch_mode = 2
            arcus_smooth_move = true

            [[decks]]
            number = 3
            y_offset = -40000
            is_qlm = true
            "#,
        )
        .unwrap();

        assert_eq!(params.timing.move_timeout_ms, 12000);
        assert_eq!(params.timing.push_time_ms, 350);
        assert!(params.behaviour.arcus_smooth_move);
        assert!(params.is_vmz_machine());
        assert_eq!(params.motion.vend_y_position, -86200);

        assert_eq!(params.decks.len(), 1);
        assert_eq!(params.decks[0].number, 3);
        assert_eq!(params.decks[0].number_of_slots, 90);
        assert!(params.decks[0].is_qlm);
    }

    #[test]
    fn test_empty_file_is_default() {
        let params: HalParams = util::params::parse("").unwrap();
        assert!(!params.is_vmz_machine());
        assert_eq!(params.ports.motion_controller.baud_rate, 115200);
        assert_eq!(params.behaviour.number_of_pulls, 2);
    }
}
