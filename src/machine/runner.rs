use super::{Machine, MachineError};
use crate::u4;

/// Default instruction rate of the host loop.
pub const DEFAULT_CPU_HZ: f32 = 700.0;
pub const TIMER_HZ: f32 = 60.0;

const TIMER_TIME_STEP: f32 = 1.0 / TIMER_HZ;

/// Host-side pacing loop that turns elapsed wall-clock time into timer ticks and steps.
pub struct Runner {
    machine: Machine,
    cpu_time_step: f32,
    cpu_dt_accumulator: f32,
    timer_dt_accumulator: f32,
    halted: bool,
}

impl Runner {
    pub fn new(machine: Machine, cpu_hz: f32) -> Self {
        Self {
            machine,
            cpu_time_step: 1.0 / cpu_hz,
            cpu_dt_accumulator: 0.0,
            timer_dt_accumulator: 0.0,
            halted: false,
        }
    }

    /// Advance the machine by `dt` seconds.
    ///
    /// Ticks the timers once per elapsed 1/60s and steps once per elapsed instruction period.
    /// The first step error halts the runner and is returned; later calls do nothing.
    pub fn update(&mut self, dt: f32) -> Result<(), MachineError> {
        if self.halted {
            return Ok(());
        }

        self.cpu_dt_accumulator += dt;
        self.timer_dt_accumulator += dt;

        while self.timer_dt_accumulator >= TIMER_TIME_STEP {
            self.timer_dt_accumulator -= TIMER_TIME_STEP;
            self.machine.tick_timers();
        }

        while self.cpu_dt_accumulator >= self.cpu_time_step {
            self.cpu_dt_accumulator -= self.cpu_time_step;

            if let Err(e) = self.machine.step() {
                self.halted = true;
                self.cpu_dt_accumulator = 0.0;
                return Err(e);
            }

            if self.machine.is_awaiting_key() {
                // Polling again before new input arrives cannot make progress
                self.cpu_dt_accumulator = 0.0;
                break;
            }
        }

        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.machine.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.machine.set_key(key, pressed)
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.machine.pixel(x, y)
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}
