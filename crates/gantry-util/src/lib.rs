#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared helpers for gantry: filesystem, hashing, and path rendering.
//!
//! Everything here is a pure function with no tracing dependency; the
//! crates that orchestrate builds own observability.

pub mod fs;
pub mod hash;
pub mod paths;
