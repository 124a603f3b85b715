//! engage actor host library.
//!
//! This crate primarily ships an `actor-host` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod actors;
pub mod api;
pub mod clock;
pub mod config;
pub mod protocol;
pub mod state;
