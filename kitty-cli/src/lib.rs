//! Library half of the `kitty` binary: config discovery and merging, kept
//! outside `main.rs` so it can be tested and reused.

pub mod config;
