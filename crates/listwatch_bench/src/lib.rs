//! Benchmarks for the list-watch engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
