// Library exports for the vigil workload supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logs;
pub mod process;
pub mod state;
pub mod supervisor;
pub mod telemetry;
