use super::PinDef;
use super::{PinMode, Port};

/// Status LED, set once the axis is up.
pub const GRN: PinDef = PinDef {
    port: Port::B,
    pin: 14,
    mode: PinMode::Output,
};
