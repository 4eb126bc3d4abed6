//! Collective-communication topology for the flowrelay execution engine.
//!
//! When one task of an execution group broadcasts to (or gathers from) every
//! other task in the group, sending to each task directly wastes network
//! fan-out. This crate builds the relay pipeline instead: an ordered chain of
//! per-worker hand-offs in which a single gateway task per worker carries the
//! inter-worker traffic and co-located tasks are reached in process. The
//! pipeline is built once per placement assignment and queried read-only by
//! the message-dispatch layer.

pub mod collective;
mod config;
mod error;
pub mod worker;

pub use crate::config::{Settings, config, load_placement};
pub use crate::error::{Error, Result};
