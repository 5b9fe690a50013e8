//! # Motor gears and speed profiles

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Gearing between the stepper motor and the controller's step and encoder units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorGear {
    /// Divided by 10 and multiplied by the step resolution to give the step ratio.
    pub step_ratio: f64,

    /// Pulse units, each worth 4096 encoder units per step.
    pub pulse_ratio: i32,

    /// Units: encoder units
    pub encoder_ratio: i32,

    /// Units: encoder units
    pub step_resolution: i32,
}

/// Speed profile of one kind of move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorSpeed {
    /// Start speed.
    ///
    /// Units: pulses/second
    pub low: i32,

    /// Target speed.
    ///
    /// Units: pulses/second
    pub high: i32,

    /// Time to ramp from low to high speed.
    ///
    /// Units: milliseconds
    pub acceleration_time: i32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorGear {
    pub fn new(step_ratio: f64, pulse_ratio: i32, encoder_ratio: i32, step_resolution: i32) -> Self {
        Self {
            step_ratio,
            pulse_ratio,
            encoder_ratio,
            step_resolution,
        }
    }

    /// The multiplied step ratio.
    pub fn step_ratio(&self) -> f64 {
        self.step_resolution as f64 * (self.step_ratio / 10.0)
    }

    /// Value written to the encoder ratio register.
    pub fn encoder_ratio(&self) -> i32 {
        self.pulse_ratio * 4096 * self.step_ratio() as i32 + self.encoder_ratio
    }
}

impl MotorSpeed {
    pub fn new(low: i32, high: i32, acceleration_time: i32) -> Self {
        Self {
            low,
            high,
            acceleration_time,
        }
    }

    pub fn high_speed_command(&self, gear: &MotorGear) -> String {
        format!("HSPD {}", self.high as f64 * gear.step_ratio())
    }

    pub fn low_speed_command(&self, gear: &MotorGear) -> String {
        format!("LSPD {}", self.low as f64 * gear.step_ratio())
    }

    pub fn acceleration_command(&self) -> String {
        format!("ACCEL {}", self.acceleration_time)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gear_ratios() {
        let x = MotorGear::new(10.0, 398, 114, 8);
        assert_eq!(x.step_ratio(), 8.0);
        assert_eq!(x.encoder_ratio(), 13_041_778);

        let y = MotorGear::new(20.0, 0, 0, 4);
        assert_eq!(y.step_ratio(), 8.0);
        assert_eq!(y.encoder_ratio(), 0);
    }

    #[test]
    fn test_speed_commands() {
        let gear = MotorGear::new(20.0, 0, 0, 4);
        let speed = MotorSpeed::new(800, 2400, 300);

        assert_eq!(speed.high_speed_command(&gear), "HSPD 19200");
        assert_eq!(speed.low_speed_command(&gear), "LSPD 6400");
        assert_eq!(speed.acceleration_command(), "ACCEL 300");
    }
}
