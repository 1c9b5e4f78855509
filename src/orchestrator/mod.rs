//! Application-level orchestration.
//!
//! This module owns the batch lifecycle (submit, drive, cancel) and post-request
//! processing such as status bookkeeping and persistence. CLI layers call into this
//! module to keep responsibilities separated.

mod cancel;
mod controller;
mod post_process;

pub(crate) use controller::{BatchOutcome, Orchestrator, RequestOutcome};
