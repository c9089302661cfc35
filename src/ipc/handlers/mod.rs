pub mod access;
pub mod core;
pub mod ranking;
pub mod reports;
pub mod students;
