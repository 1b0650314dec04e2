//! S-curve trajectory generator.
//!
//! Works in whole cycles: `step()` must be called once per cycle at a fixed
//! rate, and computes the next position of the trajectory. Position is in
//! counts, velocity in counts per cycle, acceleration in counts per squared
//! cycle. Physical units stop at the ramp adapter.
//!
//! While the movement is stopped any setpoint may be written; writing a
//! target or a jog direction starts the movement on the next cycle. While a
//! movement is in progress setpoints may still be written, but `update()`
//! must then be called so the generator re-plans from the current state.
//! Skipping `update()` after a mid-motion setpoint change is undefined
//! behavior.
//!
//! A finite movement accelerates toward `target`, cruises at `max_speed`
//! and decelerates to land on the target with zero velocity. A jog movement
//! (`jog` of +1 or -1) accelerates in that direction and cruises forever;
//! the target is ignored. `brake()` turns either into a controlled stop at
//! the position reachable with `max_accel`.
//!
//! The raw profile is trapezoidal in velocity. A boxcar filter over the
//! last [`JERK_TIME`] raw positions gives the observed trajectory
//! acceleration continuity as well; the filter delays the end of the
//! movement by up to `JERK_TIME` cycles, which the `settling` countdown
//! accounts for.

use super::jerk_filter::JerkFilter;

/// Window length of the jerk filter, in cycles. Power of two.
pub const JERK_TIME: usize = 16;

/// Same-cycle transition chains are short (at most WAIT, START, ACC,
/// CONST_SPEED, DEC_TO_ZERO, STANDSTILL); the cap bounds re-dispatch even
/// if the transition graph is edited later.
const DISPATCH_CAP: u32 = 8;

/// Trajectory generator phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrajState {
    /// At rest, watching the setpoints for a reason to move.
    Wait,
    /// Plans the travel direction for a new or re-planned movement.
    Start,
    /// Speed magnitude below the limit, or pointing the wrong way.
    Acc,
    /// Speed above the limit (the limit was lowered mid-motion).
    Dec,
    /// Cruise at `max_speed` in the travel direction.
    ConstSpeed,
    /// Final approach: analytic deceleration that lands on the target.
    DecToZero,
    /// Snaps to the exact target and clears the motion flags.
    Standstill,
    /// Entered by `brake()`; retargets to the nearest reachable stop.
    Brake,
}

/// Per-axis trajectory state. Owned, one instance per motor axis.
pub struct Trajectory {
    // setpoints
    max_accel: i32,
    max_speed: i32,
    target: i64,
    jog: i32,

    // planning state
    dir: i32, // direction in which we plan to reach the target (not always the start direction)
    state: TrajState,

    // raw outputs
    position: i64,
    velocity: i32,
    moving: bool,

    // output stage
    filter: JerkFilter<JERK_TIME>,
    filtered: i64,
    settling: u32,
}

/// Diagnostic snapshot of one axis, safe to copy out of the control context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub position: i64,
    pub velocity: i32,
    pub filtered: i64,
    pub state: TrajState,
    pub moving: bool,
    pub settling: u32,
}

impl Trajectory {
    pub const fn new() -> Self {
        Self {
            max_accel: 1,
            max_speed: 0,
            target: 0,
            jog: 0,
            dir: 0,
            state: TrajState::Wait,
            position: 0,
            velocity: 0,
            moving: false,
            filter: JerkFilter::new(),
            filtered: 0,
            settling: 0,
        }
    }

    /// Computes the next position in the trajectory. Call once per cycle.
    pub fn step(&mut self) {
        let accel = self.max_accel;
        let speed = self.max_speed;
        let mut target = self.target;
        let x = self.position;
        let v = self.velocity;
        let mut dir = self.dir;

        let mut nx = x;
        let mut nv = v;
        // squared speed overflows i32 well inside the working range
        let vv = (v as i64) * (v as i64);

        for _ in 0..DISPATCH_CAP {
            match self.state {
                TrajState::Wait => {
                    if target == x && self.jog == 0 {
                        break;
                    }
                    self.moving = true;
                    self.settling = JERK_TIME as u32;
                    self.state = TrajState::Start;
                }

                TrajState::Start => {
                    if self.jog != 0 {
                        dir = self.jog;
                    } else {
                        dir = (target - x).signum() as i32;
                        if dir == 0 {
                            // On the target but possibly still moving: bleed
                            // the speed off away from it, then come back.
                            dir = -v.signum();
                            if dir == 0 {
                                self.state = TrajState::Standstill;
                                continue;
                            }
                        } else {
                            let remaining = (target - x) * dir as i64;
                            let brake_accel = (vv / (remaining * 2) + 1) as i32;
                            if v.signum() == dir && brake_accel >= accel {
                                // Braking flat out still overshoots; pass the
                                // target and return from the far side.
                                dir = -dir;
                            }
                        }
                    }
                    self.state = if v * dir < speed {
                        TrajState::Acc
                    } else {
                        TrajState::Dec
                    };
                }

                TrajState::Acc => {
                    nv = v + accel * dir;
                    nx = x + (v as i64 + nv as i64) / 2;
                    if nv.signum() == dir && self.jog == 0 {
                        let remaining = (target - nx) * dir as i64;
                        if remaining <= 0 {
                            self.state = TrajState::Standstill;
                            continue;
                        }
                        let brake_accel = (vv / (remaining * 2) + 1) as i32;
                        if brake_accel > accel {
                            self.state = TrajState::DecToZero;
                            continue;
                        }
                    }
                    if nv * dir > speed {
                        self.state = TrajState::ConstSpeed;
                        continue;
                    }
                    break;
                }

                TrajState::Dec => {
                    nv = v - accel * dir;
                    nx = x + (v as i64 + nv as i64) / 2;
                    if nv * dir <= speed {
                        self.state = TrajState::ConstSpeed;
                        continue;
                    }
                    break;
                }

                TrajState::ConstSpeed => {
                    nv = speed * dir;
                    nx = x + (v as i64 + nv as i64) / 2;
                    if self.jog != 0 {
                        break;
                    }
                    let remaining = (target - nx) * dir as i64;
                    if remaining <= 0 {
                        self.state = TrajState::Standstill;
                        continue;
                    }
                    let brake_accel = (vv / (remaining * 2) + 1) as i32;
                    if brake_accel > accel {
                        self.state = TrajState::DecToZero;
                        continue;
                    }
                    break;
                }

                TrajState::DecToZero => {
                    let remaining = (target - x) * dir as i64;
                    if remaining <= 0 {
                        self.state = TrajState::Standstill;
                        continue;
                    }
                    // Minimal deceleration that still lands on the target,
                    // floored at one count per cycle so the approach cannot
                    // stall.
                    let mut decel = ((vv + remaining) / (remaining * 2)) as i32;
                    if decel <= 0 {
                        decel = 1;
                    }
                    nv = v - decel * dir;
                    nx = x + (v as i64 + nv as i64) / 2;
                    if nv.signum() != dir {
                        // crossed zero speed: overshoot, snap to target
                        self.state = TrajState::Standstill;
                        continue;
                    }
                    break;
                }

                TrajState::Standstill => {
                    nv = 0;
                    nx = target;
                    dir = 0;
                    self.moving = false;
                    self.state = TrajState::Wait;
                    break;
                }

                TrajState::Brake => {
                    dir = v.signum();
                    let brake_dist = vv / (2 * accel as i64);
                    target = x + brake_dist * dir as i64;
                    self.target = target;
                    self.jog = 0;
                    self.state = TrajState::DecToZero;
                }
            }
        }

        self.position = nx;
        self.velocity = nv;
        self.dir = dir;

        self.filtered = self.filter.push(nx);
        if !self.moving && self.settling > 0 {
            self.settling -= 1;
        }
    }

    /// Re-plans the movement from the current position and velocity. Call
    /// after every setpoint change made while the movement is in progress.
    pub fn update(&mut self) {
        if self.moving {
            self.state = TrajState::Start;
        }
    }

    /// Forces a controlled stop of a movement in progress. The target is
    /// overwritten with the position reachable by decelerating at
    /// `max_accel` from the current speed, jog mode is cancelled, and the
    /// stop proceeds as a normal final approach. No `update()` needed.
    /// Does nothing while at rest.
    pub fn brake(&mut self) {
        match self.state {
            TrajState::Acc
            | TrajState::Dec
            | TrajState::ConstSpeed
            | TrajState::DecToZero => self.state = TrajState::Brake,
            _ => {}
        }
    }

    /// Abruptly relocates the axis: position becomes `position`, velocity
    /// zero, motion flags cleared, and the jerk filter history is flushed
    /// so the filtered position reads `position` immediately. Only valid
    /// while stopped. No `update()` needed.
    pub fn jump(&mut self, position: i64) {
        self.target = position;
        self.jog = 0;
        self.position = position;
        self.velocity = 0;
        self.state = TrajState::Wait;
        self.moving = false;

        self.filter.fill(position);
        self.filtered = position;
        self.settling = 0;
    }

    /// Target position for finite movements, in counts.
    pub fn set_target(&mut self, target: i64) {
        self.target = target;
    }

    /// Jog direction; any nonzero value is reduced to its sign and selects
    /// infinite movement in that direction. Zero selects finite mode.
    pub fn set_jog(&mut self, dir: i32) {
        self.jog = dir.signum();
    }

    /// Speed limit in counts per cycle.
    pub fn set_max_speed(&mut self, speed: i32) {
        self.max_speed = speed.max(0);
    }

    /// Acceleration in counts per squared cycle. Floored at one count: the
    /// braking math divides by it.
    pub fn set_max_accel(&mut self, accel: i32) {
        self.max_accel = accel.max(1);
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn max_speed(&self) -> i32 {
        self.max_speed
    }

    pub fn max_accel(&self) -> i32 {
        self.max_accel
    }

    /// Raw position, ahead of the jerk filter.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    /// Position after the jerk filter. This is what commutation consumes.
    pub fn filtered_position(&self) -> i64 {
        self.filtered
    }

    /// True while the raw engine is not at rest. The filtered trajectory
    /// lags; consumers that depend on it must wait for `settling() == 0`.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Cycles the filtered trajectory still needs to converge on the raw
    /// one after the raw engine stops. Zero means fully settled.
    pub fn settling(&self) -> u32 {
        self.settling
    }

    pub fn state(&self) -> TrajState {
        self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            position: self.position,
            velocity: self.velocity,
            filtered: self.filtered,
            state: self.state,
            moving: self.moving,
            settling: self.settling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(max_speed: i32, max_accel: i32) -> Trajectory {
        let mut traj = Trajectory::new();
        traj.set_max_speed(max_speed);
        traj.set_max_accel(max_accel);
        traj
    }

    fn run_to_rest(traj: &mut Trajectory) -> u32 {
        let mut cycles = 0;
        loop {
            traj.step();
            cycles += 1;
            if !traj.is_moving() {
                return cycles;
            }
            assert!(cycles < 100_000, "trajectory never settled");
        }
    }

    #[test]
    fn idle_without_setpoints() {
        let mut traj = engine(500, 10);
        for _ in 0..5 {
            traj.step();
        }
        assert_eq!(traj.position(), 0);
        assert_eq!(traj.velocity(), 0);
        assert!(!traj.is_moving());
        assert_eq!(traj.state(), TrajState::Wait);
    }

    #[test]
    fn converges_exactly_on_target() {
        let mut traj = engine(500, 10);
        traj.set_target(10000);

        let mut cycles = 0;
        let mut peak_v = 0;
        loop {
            traj.step();
            cycles += 1;
            peak_v = peak_v.max(traj.velocity());
            // never past the target in the travel direction
            assert!(traj.position() <= 10000);
            if !traj.is_moving() {
                break;
            }
        }
        assert_eq!(traj.position(), 10000);
        assert_eq!(traj.velocity(), 0);
        // this move is triangular: too short to reach the speed limit
        assert_eq!(peak_v, 320);
        assert_eq!(cycles, 63);
    }

    #[test]
    fn long_move_cruises_at_the_limit() {
        let mut traj = engine(500, 10);
        traj.set_target(1_000_000);

        let mut accel_cycles = 0;
        let mut decel_cycles = 0;
        let mut cruised = false;
        let mut prev_v = 0;
        loop {
            traj.step();
            assert!(traj.velocity() <= 500);
            if traj.state() == TrajState::ConstSpeed {
                cruised = true;
                assert_eq!(traj.velocity(), 500);
            }
            if traj.velocity() > prev_v {
                accel_cycles += 1;
            } else if traj.velocity() < prev_v {
                decel_cycles += 1;
            }
            prev_v = traj.velocity();
            if !traj.is_moving() {
                break;
            }
        }
        assert!(cruised);
        assert_eq!(traj.position(), 1_000_000);
        assert_eq!(accel_cycles, 500 / 10);
        // the analytic final approach dithers around max_accel and its
        // one-count floor stretches the tail by a few cycles
        assert_eq!(decel_cycles, 53);
    }

    #[test]
    fn brake_mirrors_the_acceleration_ramp() {
        let mut traj = engine(500, 10);
        traj.set_jog(1);

        let mut ramp_up = 0;
        while traj.velocity() < 500 {
            traj.step();
            ramp_up += 1;
        }
        traj.brake();
        let ramp_down = run_to_rest(&mut traj);
        assert_eq!(ramp_up, 50);
        assert_eq!(ramp_down, ramp_up);
    }

    #[test]
    fn brake_stops_at_the_computed_position() {
        let mut traj = engine(500, 10);
        traj.set_jog(1);
        for _ in 0..200 {
            traj.step();
        }
        assert_eq!(traj.state(), TrajState::ConstSpeed);
        let x = traj.position();
        let v = traj.velocity() as i64;
        assert_eq!(v, 500);

        traj.brake();
        let expected = x + v * v / (2 * 10);
        loop {
            traj.step();
            // a brake never reverses
            assert!(traj.velocity() >= 0);
            if !traj.is_moving() {
                break;
            }
        }
        assert_eq!(traj.target(), expected);
        assert_eq!(traj.position(), expected);
        assert_eq!(traj.velocity(), 0);
    }

    #[test]
    fn brake_during_acceleration() {
        let mut traj = engine(500, 10);
        traj.set_target(1_000_000);
        for _ in 0..30 {
            traj.step();
        }
        assert_eq!(traj.state(), TrajState::Acc);
        let x = traj.position();
        let v = traj.velocity() as i64;
        assert_eq!((x, v), (4500, 300));

        traj.brake();
        run_to_rest(&mut traj);
        assert_eq!(traj.position(), x + v * v / (2 * 10));
    }

    #[test]
    fn brake_at_rest_is_a_no_op() {
        let mut traj = engine(500, 10);
        traj.brake();
        assert_eq!(traj.state(), TrajState::Wait);
        traj.step();
        assert!(!traj.is_moving());
        assert_eq!(traj.position(), 0);
    }

    #[test]
    fn jump_relocates_without_filter_lag() {
        let mut traj = engine(500, 10);
        traj.set_target(100);
        run_to_rest(&mut traj);

        traj.jump(100);
        assert_eq!(traj.position(), 100);
        assert_eq!(traj.filtered_position(), 100);
        assert_eq!(traj.velocity(), 0);
        assert!(!traj.is_moving());
        assert_eq!(traj.settling(), 0);

        // stays put: the target moved with the position
        traj.step();
        assert!(!traj.is_moving());
        assert_eq!(traj.filtered_position(), 100);
    }

    #[test]
    fn settling_runs_a_full_window_after_raw_stop() {
        let mut traj = engine(500, 10);
        traj.set_target(100);
        let cycles = run_to_rest(&mut traj);
        assert_eq!(cycles, 7);

        // raw is done, filtered is not
        assert_eq!(traj.settling(), JERK_TIME as u32 - 1);
        for expected in (1..JERK_TIME as u32 - 1).rev() {
            traj.step();
            assert_eq!(traj.settling(), expected);
            assert!(traj.filtered_position() < 100);
        }
        traj.step();
        assert_eq!(traj.settling(), 0);
        assert_eq!(traj.filtered_position(), 100);

        // and it stays settled
        traj.step();
        assert_eq!(traj.settling(), 0);
        assert_eq!(traj.filtered_position(), 100);
    }

    #[test]
    fn settling_rearms_when_motion_restarts() {
        let mut traj = engine(500, 10);
        traj.set_target(100);
        run_to_rest(&mut traj);
        traj.step();
        assert!(traj.settling() > 0);

        traj.set_target(200);
        traj.step();
        assert!(traj.is_moving());
        assert_eq!(traj.settling(), JERK_TIME as u32);
    }

    #[test]
    fn jog_ramps_up_and_holds() {
        let mut traj = engine(500, 10);
        traj.set_jog(1);
        for _ in 0..100 {
            traj.step();
        }
        assert_eq!(traj.velocity(), 500);
        assert_eq!(traj.state(), TrajState::ConstSpeed);

        // holds indefinitely
        let x = traj.position();
        for _ in 0..100 {
            traj.step();
        }
        assert_eq!(traj.velocity(), 500);
        assert_eq!(traj.position(), x + 100 * 500);
    }

    #[test]
    fn lowering_the_speed_limit_never_reverses_a_jog() {
        let mut traj = engine(500, 10);
        traj.set_jog(1);
        for _ in 0..100 {
            traj.step();
        }

        traj.set_max_speed(200);
        traj.update();
        traj.step();
        assert_eq!(traj.state(), TrajState::Dec);
        for _ in 0..100 {
            traj.step();
            assert!(traj.velocity() >= 200);
        }
        assert_eq!(traj.velocity(), 200);
        assert_eq!(traj.state(), TrajState::ConstSpeed);
    }

    #[test]
    fn retarget_behind_reverses_exactly_once() {
        let mut traj = engine(500, 10);
        traj.set_target(1_000_000);
        for _ in 0..300 {
            traj.step();
        }
        assert_eq!(traj.state(), TrajState::ConstSpeed);

        traj.set_target(0);
        traj.update();
        let mut reversals = 0;
        let mut prev_sign = 1;
        loop {
            traj.step();
            let sign = traj.velocity().signum();
            if sign != 0 && sign != prev_sign {
                reversals += 1;
                prev_sign = sign;
            }
            if !traj.is_moving() {
                break;
            }
        }
        assert_eq!(traj.position(), 0);
        assert_eq!(traj.velocity(), 0);
        assert_eq!(reversals, 1);
    }

    #[test]
    fn cancelling_a_jog_onto_the_current_position_comes_back() {
        let mut traj = engine(500, 10);
        traj.set_jog(1);
        for _ in 0..100 {
            traj.step();
        }
        let here = traj.position();

        // target the spot we are flying over at full speed
        traj.set_jog(0);
        traj.set_target(here);
        traj.update();

        let mut overshoot = 0;
        loop {
            traj.step();
            overshoot = overshoot.max(traj.position() - here);
            if !traj.is_moving() {
                break;
            }
        }
        // passes the target by the braking distance, then returns exactly
        assert_eq!(overshoot, 500 * 500 / (2 * 10));
        assert_eq!(traj.position(), here);
        assert_eq!(traj.velocity(), 0);
    }

    #[test]
    fn negative_moves_are_symmetric_to_positive_ones() {
        let mut traj = engine(500, 10);
        traj.set_target(-300);
        run_to_rest(&mut traj);
        assert_eq!(traj.position(), -300);
        assert_eq!(traj.velocity(), 0);
    }

    #[test]
    fn setter_floors_keep_the_state_well_formed() {
        let mut traj = engine(500, 10);
        traj.set_max_accel(0);
        assert_eq!(traj.max_accel(), 1);
        traj.set_max_accel(-7);
        assert_eq!(traj.max_accel(), 1);
        traj.set_max_speed(-1);
        assert_eq!(traj.max_speed(), 0);

        traj.set_max_speed(500);
        traj.set_jog(42);
        // reduced to a sign: first cycle accelerates by one floored count
        traj.step();
        assert!(traj.is_moving());
        assert_eq!(traj.velocity(), traj.max_accel());
    }
}
