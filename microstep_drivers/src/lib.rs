#![no_std]

pub mod pinout;
pub mod pwm;
