//! Shared library surface for the seaway server binaries and tests.

pub mod api;
pub mod backoff;
pub mod config;
pub mod state;
pub mod worker;
