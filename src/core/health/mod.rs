//! Health monitoring

pub mod checker;

pub use checker::HealthChecker;
