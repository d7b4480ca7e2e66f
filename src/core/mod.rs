//! Shared building blocks: geo math, configuration, clocks and display helpers.

pub mod clock;
pub mod config;
pub mod constants;
pub mod format;
pub mod geo;
