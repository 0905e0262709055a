pub mod audio;
pub mod bus;
pub mod cli;
pub mod config;
pub mod display;
pub mod driver;
pub mod error;
pub mod ipc;
pub mod signal;
pub mod visualizer;
