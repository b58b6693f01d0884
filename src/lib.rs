//! Build Open Job Description job bundles from templates.
//!
//! Jobs, steps and environments are each backed by a template file and a set
//! of caller overrides. Building checks that both sides declare the same
//! parameters, resolves typed values, and emits a job bundle ready for
//! submission to a render farm.

pub mod config;
pub mod errors;
pub mod models;
pub mod open_job;

pub use errors::{OpenJobError, Result};
