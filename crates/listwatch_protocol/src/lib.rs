//! # List-Watch Protocol
//!
//! Wire types and CBOR codecs for the list-watch resource API.
//!
//! This crate provides:
//! - `ResourceKey` and `ResourceVersion`, the identity and progress marker of
//!   every replicated resource
//! - The `Resource` trait and the `Vpc` resource
//! - Stream deltas (`WatchResponse`) and the two stream requests
//!   (`SearchStreamRequest`, `WatchRequest`)
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod messages;
mod resource;

pub use error::{ProtocolError, ProtocolResult};
pub use key::{ResourceKey, ResourceVersion};
pub use messages::{SearchStreamRequest, WatchDeltaType, WatchRequest, WatchResponse};
pub use resource::{Resource, Vpc, VpcMetadata, VpcPhase, VpcSpec, VpcStatus};
