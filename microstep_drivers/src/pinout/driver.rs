//! Pin assignments for the stepper power stage.
use super::PinDef;
use super::{PinMode, Port};

/// Reset pin for the H-bridge driver
pub const RESET: PinDef = PinDef {
    port: Port::B,
    pin: 2,
    mode: PinMode::Output,
};

/// Enable pin for the H-bridge driver
pub const ENABLE: PinDef = PinDef {
    port: Port::A,
    pin: 4,
    mode: PinMode::Output,
};

/// Coil A, positive half-bridge (TIM2 CH2)
pub const PWM_A1: PinDef = PinDef {
    port: Port::A,
    pin: 1,
    mode: PinMode::Alt(1),
};

/// Coil A, negative half-bridge (TIM2 CH1)
pub const PWM_A2: PinDef = PinDef {
    port: Port::A,
    pin: 0,
    mode: PinMode::Alt(1),
};

/// Coil B, positive half-bridge (TIM2 CH3)
pub const PWM_B1: PinDef = PinDef {
    port: Port::B,
    pin: 10,
    mode: PinMode::Alt(1),
};

/// Coil B, negative half-bridge (TIM2 CH4)
pub const PWM_B2: PinDef = PinDef {
    port: Port::B,
    pin: 11,
    mode: PinMode::Alt(1),
};
