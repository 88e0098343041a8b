//! The four 16-bit timers.
//!
//! Each timer accumulates CPU cycles into `clock`; whenever the accumulator
//! reaches the prescaler the counter increments. On a 16-bit overflow the
//! counter reloads and optionally raises its interrupt; if the next timer is
//! in cascade mode it increments once per overflow instead of counting
//! cycles, ignoring its own prescaler.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{InterruptControl, INT_TIMER0};

#[derive(Serialize, Deserialize)]
pub struct Timer {
    /// TMxCNT_L writes land here; reads return `counter`.
    pub reload: u16,
    pub counter: u16,
    /// TMxCNT_H as last written.
    pub control: u16,
    pub enabled: bool,
    pub irq_enable: bool,
    pub cascade: bool,
    pub prescaler: u32,
    clock: u32,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            reload: 0,
            counter: 0,
            control: 0,
            enabled: false,
            irq_enable: false,
            cascade: false,
            prescaler: 1,
            clock: 0,
        }
    }
}

const fn prescaler_from_control(control: u16) -> u32 {
    match control & 0b11 {
        0 => 1,
        1 => 64,
        2 => 256,
        _ => 1024,
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Timers {
    pub timers: [Timer; 4],
}

impl Timers {
    pub fn write_control(&mut self, index: usize, value: u16) {
        let timer = &mut self.timers[index];
        let was_enabled = timer.enabled;

        timer.control = value;
        timer.enabled = value.get_bit(7);
        timer.irq_enable = value.get_bit(6);
        timer.cascade = value.get_bit(2);
        timer.prescaler = prescaler_from_control(value);

        // Enable rising edge reloads the counter and restarts the
        // prescaler window.
        if timer.enabled && !was_enabled {
            timer.counter = timer.reload;
            timer.clock = 0;
        }
    }

    pub fn write_reload(&mut self, index: usize, value: u16) {
        let timer = &mut self.timers[index];
        timer.reload = value;

        if !timer.enabled {
            timer.counter = value;
        }
    }

    /// Advance every cycle-driven timer by `cycles` CPU cycles, chaining
    /// cascade overflows and raising timer interrupts.
    pub fn tick(&mut self, cycles: u32, interrupts: &mut InterruptControl) {
        for index in 0..4 {
            let timer = &self.timers[index];
            if !timer.enabled || (timer.cascade && index > 0) {
                continue;
            }

            self.timers[index].clock += cycles;
            while self.timers[index].clock >= self.timers[index].prescaler {
                self.timers[index].clock -= self.timers[index].prescaler;
                self.increment(index, interrupts);
            }
        }
    }

    fn increment(&mut self, index: usize, interrupts: &mut InterruptControl) {
        let timer = &mut self.timers[index];
        timer.counter = timer.counter.wrapping_add(1);
        if timer.counter != 0 {
            return;
        }

        timer.counter = timer.reload;
        if timer.irq_enable {
            interrupts.raise(INT_TIMER0 << index);
        }

        if index < 3 && self.timers[index + 1].enabled && self.timers[index + 1].cascade {
            self.increment(index + 1, interrupts);
        }
    }
}
