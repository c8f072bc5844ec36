// Library module for dircache
// Re-exports modules for use in integration tests and external crates

pub mod app;
pub mod config;
pub mod fs;
pub mod sync;
