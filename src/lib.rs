//! platstep: deterministic 2D axis-aligned physics stepping for
//! authoritative platformer servers.
//!
//! A [`world::World`] owns a flat body collection and a region-hashed broad
//! phase. Each update splits the elapsed time into sub-steps of at most
//! [`world::MAX_STEP_MS`] and runs a fixed pipeline per sub-step: integrate,
//! purge, re-index, detect, resolve. The host gets body positions mutated in
//! place and an ordered list of [`types::SensorEvent`]s back from each call.
//!
//! `+Y` is down, distances are points, time is milliseconds; `force` inputs
//! on descriptors are points per second and divided by 1000 on ingest.

pub mod body;
pub mod broadphase;
pub mod narrowphase;
pub mod types;
pub mod world;

pub use crate::body::Body;
pub use crate::types::*;
pub use crate::world::{World, MAX_STEP_MS};
