//! # sky-core
//!
//! Core types, randomness, and error handling for SkyStat.
//!
//! This crate provides:
//! - The common error type and `Result` alias
//! - [`RandomStateService`], the explicitly passed, seedable random source
//! - Fit parameters and fit-parameter sets
//! - Trial result records and tables
//! - Task timing (`TimeLord`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parameters;
pub mod random;
pub mod timing;
pub mod types;

pub use error::{Error, Result};
pub use parameters::{FitParameter, FitParameterSet};
pub use random::RandomStateService;
pub use timing::{TaskSummary, TimeLord, timed};
pub use types::{TrialRecord, TrialTable};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
