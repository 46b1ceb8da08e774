//! Embeddable core library for kitty.
//!
//! Provides a clap-free, I/O-abstracted entry point suitable for linking
//! into other host processes.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`InputSource`](ports::InputSource): load the group's input document
//! - [`PlanSource`](ports::PlanSource): load a plan artifact for checking
//! - [`WritePort`](ports::WritePort): write files and create directories
//!
//! The [`adapters`] module provides default filesystem-backed implementations.
//!
//! # Entry points
//!
//! - [`run_settle`](pipeline::run_settle): compute a plan + report
//! - [`run_check`](pipeline::run_check): re-validate an existing plan

pub mod adapters;
pub mod pipeline;
pub mod ports;
pub mod settings;

// Re-export the domain's search types so embedders don't need kitty-domain directly.
pub use kitty_domain::{CancelFlag, EpsilonScope, MAX_GROUP_SIZE, StopReason};
