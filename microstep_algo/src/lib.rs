#![cfg_attr(not(test), no_std)]

pub mod command;
pub mod commutation;
pub mod motion;

use commutation::Commutator;
use motion::ramp::{ConfigError, Ramp};
use motion::trajectory::Snapshot;

/// One stepper axis: trajectory generation, jerk filtering, unit
/// conversion and commutation, driven by a fixed-rate tick.
///
/// `tick()` belongs to the timer interrupt and nothing else; the command
/// methods may be called from a lower-priority context at any time. Each
/// setpoint is a single scalar write, observed by the tick on this cycle
/// or the next; callers must not assume two setpoints written together
/// become visible together.
pub struct StepperController {
    ramp: Ramp,          // trajectory engine behind its unit adapter
    commutator: Commutator, // electrical angle to H-bridge duties
}

impl StepperController {
    /// `range` is the PWM duty register span (0..range-1), normally the
    /// timer's max compare value.
    pub fn new(range: u16) -> Self {
        Self {
            ramp: Ramp::new(),
            commutator: Commutator::new(range),
        }
    }

    /// Runs one trajectory cycle and returns the four coil duties, in
    /// channel order [A+, A-, B+, B-]. Call at exactly the cycle rate.
    pub fn tick(&mut self) -> [u16; 4] {
        let angle = self.ramp.cycle();
        self.commutator.duties(angle)
    }

    /// Speed limit in electrical revolutions per second.
    pub fn set_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        self.ramp.set_speed(speed)
    }

    /// Acceleration in electrical revolutions per squared second.
    pub fn set_accel(&mut self, accel: f32) -> Result<(), ConfigError> {
        self.ramp.set_accel(accel)
    }

    /// Begins jogging in the positive direction.
    pub fn start(&mut self) {
        self.ramp.start();
    }

    /// Controlled stop with the programmed deceleration. Safe to call
    /// from an out-of-band path at any time.
    pub fn brake(&mut self) {
        self.ramp.brake();
    }

    /// Relocates the axis while stopped.
    pub fn jump(&mut self, position: i64) {
        self.ramp.jump(position);
    }

    /// Targets an absolute position in counts.
    pub fn move_to(&mut self, target: i64) {
        self.ramp.move_to(target);
    }

    /// Diagnostic copy of the trajectory state.
    pub fn snapshot(&self) -> Snapshot {
        self.ramp.snapshot()
    }
}
