//! Background workers

pub mod expiry;

pub use expiry::run_expiry_sweep;
