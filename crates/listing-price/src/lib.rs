pub mod cleaning;
pub mod config;
pub mod error;
pub mod serving;
pub mod telemetry;
