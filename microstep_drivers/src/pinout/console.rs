//! Serial console pins (USART2).
use super::PinDef;
use super::{PinMode, Port};

pub const TX: PinDef = PinDef {
    port: Port::A,
    pin: 2,
    mode: PinMode::Alt(7),
};

pub const RX: PinDef = PinDef {
    port: Port::A,
    pin: 3,
    mode: PinMode::Alt(7),
};
