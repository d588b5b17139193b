// Library exports for the watchdog process supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod process;
