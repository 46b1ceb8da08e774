//! BDD harness (cucumber-rs).
//!
//! This crate exists to keep scenario tests isolated from the production crates.
//! The scenarios live in `features/` and drive the `kitty` binary.
