//! Core config, errors, and status protocol for Easel.

pub mod config;
pub mod error;
pub mod protocol;
