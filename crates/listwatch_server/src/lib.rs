//! # List-Watch Resource Server
//!
//! In-memory implementation of the remote resource API consumed by the
//! list-watch engine.
//!
//! This crate provides:
//! - A versioned resource store with a bounded change log
//! - `SearchStream` handling (full snapshot terminated by a bookmark)
//! - `Watch` handling (log replay followed by live changes)
//! - Explicit fault injection hooks
//!
//! # Architecture
//!
//! Every mutation takes the next sequence number from the store. Versions
//! are minted from sequence numbers as zero-padded decimal strings, so they
//! compare correctly both numerically and lexicographically.
//!
//! Each call is served by its own task feeding a bounded channel. Dropping
//! the returned stream aborts the task.
//!
//! # Fault injection
//!
//! ```rust,ignore
//! use listwatch_server::{ResourceServer, ServerConfig};
//!
//! let server = ResourceServer::new(ServerConfig::default());
//!
//! // Refuse calls outright
//! server.faults().set_unavailable(true);
//!
//! // Fail or stall the next List calls
//! server.faults().fail_next_lists(1);
//! server.faults().stall_next_lists(1);
//!
//! // End every open Watch with a fault
//! server.faults().abort_watches();
//!
//! // Abort any stream about to deliver this resource
//! server.faults().abort_on_name(Some("vpc-fault".into()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod faults;
mod server;
mod store;
mod stream;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use faults::{FaultInjector, ListFault};
pub use server::{ResourceServer, ServerStream};
pub use store::{Change, ResourceStore};
pub use stream::ResponseStream;
