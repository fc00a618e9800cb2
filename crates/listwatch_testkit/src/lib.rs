//! # List-Watch Testkit
//!
//! Test utilities for the list-watch engine.
//!
//! This crate provides:
//! - VPC fixtures and a sink that records every call
//! - Property-based test generators using proptest
//! - A loopback adapter wiring the engine to the in-memory server
//! - A churn driver for convergence and stress runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use listwatch_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn converges() {
//!     let server = Arc::new(ResourceServer::default());
//!     let api = Arc::new(LoopbackApi::new(Arc::clone(&server)));
//!     // ... start a ListWatcher over `api`
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod churn;
pub mod fixtures;
pub mod generators;
pub mod loopback;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::churn::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::loopback::*;
}

pub use churn::*;
pub use fixtures::*;
pub use generators::*;
pub use loopback::*;
