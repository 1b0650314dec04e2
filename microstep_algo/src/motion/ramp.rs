//! Physical-unit adapter in front of the trajectory engine.
//!
//! The engine works in counts, counts/cycle and counts/cycle²; everything
//! outside this module works in electrical revolutions and seconds. The
//! conversion is fixed by two build-time constants: the cycle period and
//! the count of increments per electrical revolution. The latter is a
//! power of two so one revolution is a bitmask of the position, not a
//! modulo.

use core::f32::consts::TAU;

use super::trajectory::{Snapshot, Trajectory};

/// Seconds per trajectory cycle. The periodic tick driving [`Ramp::cycle`]
/// must run at exactly this period.
pub const CYCLE_TIME: f32 = 0.0001;

pub const POSITION_SHIFT: u32 = 23;

/// Increments per electrical revolution.
pub const POSITION_SCALE: i64 = 1 << POSITION_SHIFT;

const POSITION_MASK: i64 = POSITION_SCALE - 1;

/// Kinematic limits applied at init, in electrical revolutions per second
/// and per squared second.
pub const DEFAULT_SPEED: f32 = 50.0;
pub const DEFAULT_ACCEL: f32 = 50.0;

// Physical values past this bound would push the converted counts out of
// the engine's i32 working range.
const SETPOINT_LIMIT: f32 = 100_000.0;

/// Rejected physical configuration. The engine divides by the programmed
/// acceleration, so bad values stop here and never reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    SpeedOutOfRange,
    AccelOutOfRange,
}

fn speed_to_counts(speed: f32) -> i32 {
    libm::roundf(speed * POSITION_SCALE as f32 * CYCLE_TIME) as i32
}

fn accel_to_counts(accel: f32) -> i32 {
    libm::roundf(accel * POSITION_SCALE as f32 * CYCLE_TIME * CYCLE_TIME) as i32
}

pub struct Ramp {
    traj: Trajectory,
}

impl Ramp {
    pub fn new() -> Self {
        let mut traj = Trajectory::new();
        traj.set_max_speed(speed_to_counts(DEFAULT_SPEED));
        traj.set_max_accel(accel_to_counts(DEFAULT_ACCEL));
        Self { traj }
    }

    /// Speed limit in electrical revolutions per second.
    pub fn set_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        if !(0.0..=SETPOINT_LIMIT).contains(&speed) {
            return Err(ConfigError::SpeedOutOfRange);
        }
        self.traj.set_max_speed(speed_to_counts(speed));
        self.traj.update();
        Ok(())
    }

    /// Acceleration in electrical revolutions per squared second. Must be
    /// positive; a value whose conversion rounds to zero counts is floored
    /// to one count per squared cycle.
    pub fn set_accel(&mut self, accel: f32) -> Result<(), ConfigError> {
        if !(accel > 0.0 && accel <= SETPOINT_LIMIT) {
            return Err(ConfigError::AccelOutOfRange);
        }
        self.traj.set_max_accel(accel_to_counts(accel).max(1));
        self.traj.update();
        Ok(())
    }

    /// Engages jog mode in the positive direction.
    pub fn start(&mut self) {
        self.traj.set_jog(1);
    }

    /// Stops any movement in progress with the programmed deceleration.
    pub fn brake(&mut self) {
        self.traj.brake();
    }

    /// Relocates the axis to `position` counts. Only valid while stopped.
    pub fn jump(&mut self, position: i64) {
        self.traj.jump(position);
    }

    /// Targets an absolute position in counts.
    pub fn move_to(&mut self, target: i64) {
        self.traj.set_target(target);
        self.traj.update();
    }

    /// Advances the trajectory by one cycle and returns the electrical
    /// angle of the filtered position, in radians within [0, 2π).
    pub fn cycle(&mut self) -> f32 {
        self.traj.step();
        let phase = self.traj.filtered_position() & POSITION_MASK;
        phase as f32 / POSITION_SCALE as f32 * TAU
    }

    pub fn snapshot(&self) -> Snapshot {
        self.traj.snapshot()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.traj
    }
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new()
    }
}
