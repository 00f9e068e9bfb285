//! PepperQC library crate.
//!
//! Severity evaluation for media QC findings and the job pipeline that
//! drives it. The binary wires these modules into a service; the library
//! is exposed for integration testing.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod notification;
pub mod pipeline;

pub use error::{Error, Result};
