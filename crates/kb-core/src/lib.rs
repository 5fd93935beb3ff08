//! Shared entities, configuration, and error taxonomy for the job execution substrate.
//!
//! This crate has no I/O of its own. It defines the vocabulary (`entities`), the
//! process-wide `Config`, and the error taxonomy (`error`) that every other `kb-*`
//! crate builds on, the same role `orbit-core-interface` played for the storage
//! abstraction layer this workspace is descended from.

pub mod config;
pub mod entities;
pub mod error;
pub mod time;

pub use config::Config;
pub use error::{CoreError, ErrorKind};
