#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use hal::{
    self,
    clocks::Clocks,
    pac,
    timer::TimerInterrupt,
    usart::{Usart, UsartConfig, UsartInterrupt},
};

use microstep_algo::command::{Command, CommandReader, ESC_BYTE};
use microstep_algo::StepperController;

use cortex_m;

/// Base PWM/update tick. Divided by [`CYCLE_DIVIDER`] this gives the
/// 10 kHz trajectory cycle the core's CYCLE_TIME constant assumes.
const BASE_TICK_HZ: u32 = 80_000;
const CYCLE_DIVIDER: u32 = 8;

const CONSOLE_BAUD: u32 = 115_200;

#[rtic::app(device = pac, peripherals = true, dispatchers = [TIM7])]
mod app {
    use super::*;

    use microstep_drivers::*;

    #[shared]
    struct Shared {
        controller: StepperController,
    }

    #[local]
    struct Local {
        timer_pwm: pwm::TimPWM,
        divider: u32,
        console: Usart<pac::USART2>,
        reader: CommandReader,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk();
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1_000_000);

        init_driver_pins();
        let mut led_grn = pinout::led::GRN.init();

        let mut timer_pwm = pwm::TimPWM::new(dp.TIM2, &clock_cfg, BASE_TICK_HZ);
        timer_pwm.begin();

        let range = timer_pwm.range();
        defmt::debug!(
            "STEPPER: cycle rate {} Hz, duty range {}",
            BASE_TICK_HZ / CYCLE_DIVIDER,
            range
        );
        let controller = StepperController::new(range);

        pinout::console::TX.init();
        pinout::console::RX.init();
        let mut console = Usart::new(
            dp.USART2,
            CONSOLE_BAUD,
            UsartConfig::default(),
            &clock_cfg,
        );
        console.enable_interrupt(UsartInterrupt::ReadNotEmpty);

        led_grn.set_high();

        (
            Shared { controller },
            Local {
                timer_pwm,
                divider: 0,
                console,
                reader: CommandReader::new(),
            },
        )
    }

    fn init_driver_pins() {
        let mut dr_reset = pinout::driver::RESET.init();
        dr_reset.set_high();

        let mut dr_en = pinout::driver::ENABLE.init();
        dr_en.set_high();
    }

    /// Base tick. Every CYCLE_DIVIDER-th interrupt runs one trajectory
    /// cycle and refreshes the four compare registers.
    #[task(binds = TIM2, priority = 2, shared = [controller], local = [timer_pwm, divider])]
    fn tim2_period_elapsed(mut cx: tim2_period_elapsed::Context) {
        cx.local
            .timer_pwm
            .get_timer()
            .clear_interrupt(TimerInterrupt::Update);

        *cx.local.divider += 1;
        if *cx.local.divider < CYCLE_DIVIDER {
            return;
        }
        *cx.local.divider = 0;

        let duties = cx.shared.controller.lock(|controller| controller.tick());
        cx.local.timer_pwm.apply_duties(duties);
    }

    /// Console receive. The escape byte brakes immediately, bypassing the
    /// line collector, so a stop gets through mid-line.
    #[task(binds = USART2, priority = 1, shared = [controller], local = [console, reader])]
    fn console_rx(mut cx: console_rx::Context) {
        cx.local
            .console
            .clear_interrupt(UsartInterrupt::ReadNotEmpty);
        let byte = cx.local.console.read_one();

        if byte == ESC_BYTE {
            defmt::warn!("CONSOLE: escape, braking");
            cx.shared.controller.lock(|controller| controller.brake());
            return;
        }

        if let Some(cmd) = cx.local.reader.push(byte) {
            command_exec::spawn(cmd).ok();
        }
    }

    #[task(priority = 1, shared = [controller])]
    async fn command_exec(mut cx: command_exec::Context, cmd: Command) {
        cx.shared.controller.lock(|controller| match cmd {
            Command::SetSpeed(speed) => match controller.set_speed(speed) {
                Ok(()) => defmt::info!("CONSOLE: speed {} rev/s", speed),
                Err(err) => defmt::warn!("CONSOLE: speed rejected: {}", err),
            },
            Command::SetAccel(accel) => match controller.set_accel(accel) {
                Ok(()) => defmt::info!("CONSOLE: accel {} rev/s2", accel),
                Err(err) => defmt::warn!("CONSOLE: accel rejected: {}", err),
            },
            Command::Start => {
                defmt::info!("CONSOLE: jog start");
                controller.start();
            }
            Command::Brake => {
                defmt::info!("CONSOLE: brake");
                controller.brake();
            }
            Command::Jump(position) => {
                if controller.snapshot().moving {
                    defmt::warn!("CONSOLE: jump refused while moving");
                } else {
                    defmt::info!("CONSOLE: jump to {}", position);
                    controller.jump(position);
                }
            }
            Command::MoveTo(target) => {
                defmt::info!("CONSOLE: move to {}", target);
                controller.move_to(target);
            }
            Command::Status => {
                defmt::info!("CONSOLE: {}", controller.snapshot());
            }
        });
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
