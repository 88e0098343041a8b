pub mod dma;
pub mod internal_memory;
pub mod interrupt_control;
pub mod keypad;
pub mod lcd;
pub mod rtc;
pub mod sound;
pub mod timers;
