pub mod app;
pub mod config;
pub mod cpu;
pub mod display;
pub mod error;
pub mod input;
pub mod memory;
pub mod quirks;
pub mod registers;
pub mod timers;
