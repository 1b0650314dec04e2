use hal::{
    clocks::Clocks,
    pac::TIM2,
    timer::{
        Alignment, CaptureCompareDma, CountDir, OutputCompare, TimChannel, Timer, TimerConfig,
        TimerInterrupt, UpdateReqSrc,
    },
};

use super::pinout;

/// Center-aligned PWM on TIM2 driving the four half-bridges. The update
/// interrupt of this timer is the base tick the trajectory cycle is
/// derived from.
pub struct TimPWM {
    tim: Timer<TIM2>,
}

impl TimPWM {
    pub fn new(tim2: TIM2, clock_cfg: &Clocks, tick_hz: u32) -> Self {
        let mut timer = Timer::new_tim2(
            tim2,
            tick_hz as f32,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Center1,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            clock_cfg,
        );
        // Enable update interrupt for the timer
        timer.enable_interrupt(TimerInterrupt::Update);
        // Start the timer
        timer.enable();

        TimPWM { tim: timer }
    }

    pub fn get_timer(&mut self) -> &mut Timer<TIM2> {
        &mut self.tim
    }

    pub fn begin(&mut self) {
        // Enable PWM outputs on channels 1 to 4 with initial duty cycle 0.0
        self.tim
            .enable_pwm_output(TimChannel::C1, OutputCompare::Pwm1, 0.0);
        self.tim
            .enable_pwm_output(TimChannel::C2, OutputCompare::Pwm1, 0.0);
        self.tim
            .enable_pwm_output(TimChannel::C3, OutputCompare::Pwm1, 0.0);
        self.tim
            .enable_pwm_output(TimChannel::C4, OutputCompare::Pwm1, 0.0);

        pinout::driver::PWM_A1.init();
        pinout::driver::PWM_A2.init();
        pinout::driver::PWM_B1.init();
        pinout::driver::PWM_B2.init();
    }

    /// Duty register span; commutation scales its outputs to 0..range-1.
    pub fn range(&mut self) -> u16 {
        self.tim.get_max_duty().min(u16::MAX as u32) as u16
    }

    /// Writes the four half-bridge compare values, given in register
    /// units and in coil order [A+, A-, B+, B-]. Channel mapping follows
    /// the power stage wiring (A+ on CH2, A- on CH1, B+ on CH3, B- on
    /// CH4).
    pub fn apply_duties(&mut self, duties: [u16; 4]) {
        self.tim.set_duty(TimChannel::C2, duties[0] as u32);
        self.tim.set_duty(TimChannel::C1, duties[1] as u32);
        self.tim.set_duty(TimChannel::C3, duties[2] as u32);
        self.tim.set_duty(TimChannel::C4, duties[3] as u32);
    }
}
